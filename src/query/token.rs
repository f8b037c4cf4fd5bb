// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use crate::query::predicate::Registry;

/// Kind of a single command-line argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Uri,
    And,
    Or,
    Not,
    Open,
    Close,
    Predicate,
    Action,
    Sort,
    ReverseSort,
}

/// Classifies `arg` without looking at its neighbours.
///
/// This never fails: a dash-prefixed word that is neither an operator nor a
/// registered predicate is an action, and whether that action exists is
/// decided later by the parser.
pub fn classify(arg: &str, registry: &Registry) -> Token {
    match arg {
        "(" => Token::Open,
        ")" => Token::Close,
        "!" | "-not" => Token::Not,
        "-a" | "-and" => Token::And,
        "-o" | "-or" => Token::Or,
        "-sort" => Token::Sort,
        "-rsort" => Token::ReverseSort,
        _ if registry.contains(arg) => Token::Predicate,
        _ if arg.starts_with('-') => Token::Action,
        _ => Token::Uri,
    }
}

/// Number of arguments an action consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Everything up to a `;` (or a `{} +`), as for `-exec`.
    Command,
}

/// Returns the arity of a known action, `None` for unknown ones.
pub fn action_arity(token: &str) -> Option<Arity> {
    Some(match token {
        "-print" | "-print0" | "-ls" | "-count" | "-delete" | "-quit"
        | "-prune" => Arity::Fixed(0),
        "-fprint" | "-fprint0" | "-fls" | "-printf" => Arity::Fixed(1),
        "-fprintf" => Arity::Fixed(2),
        "-exec" | "-execdir" | "-ok" | "-okdir" => Arity::Command,
        _ => return None,
    })
}
