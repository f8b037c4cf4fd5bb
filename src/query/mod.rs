// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Compilation of find-style expressions into filter trees.
//!
//! Arguments are classified one at a time ([`classify`]) against a
//! predicate [`Registry`], then consumed by the [`Parser`], which hands
//! predicate arguments over to the matching [`PredicateBuilder`].

pub mod error;
pub mod glob;
pub mod parser;
pub mod perm;
pub mod predicate;
pub mod token;
pub mod window;

pub use self::error::Error;
pub use self::glob::glob_to_regex;
pub use self::parser::{ActionToken, Parsed, Parser};
pub use self::predicate::{BuildContext, Builtin, PredicateBuilder, Registry};
pub use self::token::{classify, Token};

use crate::filter::{Filter, Sort};

/// Compiles a standalone filter expression, as found in configuration files.
///
/// Unlike on the command line, actions are rejected.
pub fn compile_filter(
    args: &[String],
    registry: &Registry,
    context: BuildContext,
) -> Result<(Option<Filter>, Vec<Sort>), Error> {
    let mut parser = Parser::new(args, registry, context);
    match parser.parse()? {
        Parsed::Complete { filter, .. } => Ok((filter, parser.into_sorts())),
        Parsed::Action { action, .. } => {
            Err(Error::UnexpectedAction { token: action.name })
        }
    }
}
