// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! The filter abstract syntax tree shared by the query compiler, the policy
//! engine and the backends.
//!
//! A filter is either a comparison leaf (a [`Field`] of the entry, an
//! [`Operator`] and an operand [`Value`]) or a boolean combinator over child
//! filters. Trees are built once, never mutated afterwards, and evaluated
//! either by a backend or locally with [`matches_locally`].
//!
//! Leaves never hold shell syntax: globs are translated to anchored regular
//! expressions and relative time windows are frozen to absolute timestamps
//! before a leaf is created.

pub mod eval;
pub mod pattern;
pub mod print;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub use self::eval::matches_locally;
pub use self::pattern::{Pattern, NEWLINE_GUARD};

/// Part of an entry's metadata a comparison targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Path,
    Symlink,
    Type,
    Mode,
    Size,
    Blocks,
    Uid,
    Gid,
    Ino,
    Nlink,
    Atime,
    Mtime,
    Ctime,
    /// An inode extended attribute, by key.
    Xattr(String),
}

/// Kind of the operand a field compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Unsigned,
    Timestamp,
}

impl Field {

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Name | Field::Path | Field::Symlink | Field::Type
            | Field::Xattr(_) => FieldKind::Text,
            Field::Atime | Field::Mtime | Field::Ctime => FieldKind::Timestamp,
            Field::Mode | Field::Size | Field::Blocks | Field::Uid
            | Field::Gid | Field::Ino | Field::Nlink => FieldKind::Unsigned,
        }
    }
}

impl Display for Field {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let name = match self {
            Field::Name => "name",
            Field::Path => "path",
            Field::Symlink => "symlink",
            Field::Type => "type",
            Field::Mode => "mode",
            Field::Size => "size",
            Field::Blocks => "blocks",
            Field::Uid => "uid",
            Field::Gid => "gid",
            Field::Ino => "ino",
            Field::Nlink => "nlink",
            Field::Atime => "atime",
            Field::Mtime => "mtime",
            Field::Ctime => "ctime",
            Field::Xattr(key) => return write!(fmt, "xattr:{}", key),
        };
        write!(fmt, "{}", name)
    }
}

impl FromStr for Field {
    type Err = ();

    fn from_str(s: &str) -> Result<Field, ()> {
        Ok(match s {
            "name" => Field::Name,
            "path" => Field::Path,
            "symlink" => Field::Symlink,
            "type" => Field::Type,
            "mode" => Field::Mode,
            "size" => Field::Size,
            "blocks" => Field::Blocks,
            "uid" => Field::Uid,
            "gid" => Field::Gid,
            "ino" => Field::Ino,
            "nlink" => Field::Nlink,
            "atime" => Field::Atime,
            "mtime" => Field::Mtime,
            "ctime" => Field::Ctime,
            _ => match s.strip_prefix("xattr:") {
                Some(key) if !key.is_empty() => Field::Xattr(key.to_owned()),
                _ => return Err(()),
            },
        })
    }
}

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Regular expression search; the operand is a [`Value::Pattern`].
    Regex,
    /// Presence test; the operand is [`Value::Bool`].
    Exists,
    /// Every bit of the operand mask is set in the field.
    AllSet,
    /// At least one bit of the operand mask is set in the field.
    AnySet,
}

impl Display for Operator {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let symbol = match self {
            Operator::Equal => "==",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Regex => "=~",
            Operator::Exists => "exists",
            Operator::AllSet => "all-set",
            Operator::AnySet => "any-set",
        };
        write!(fmt, "{}", symbol)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Operator, ()> {
        Ok(match s {
            "==" => Operator::Equal,
            "<" => Operator::Less,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterOrEqual,
            "=~" | "=~i" => Operator::Regex,
            "exists" => Operator::Exists,
            "all-set" => Operator::AllSet,
            "any-set" => Operator::AnySet,
            _ => return Err(()),
        })
    }
}

/// Operand of a filter leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Integer(i64),
    String(String),
    Pattern(Pattern),
    Bool(bool),
}

impl Display for Value {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        match self {
            Value::Unsigned(value) => write!(fmt, "{}", value),
            Value::Integer(value) => write!(fmt, "{}", value),
            Value::String(value) => write!(fmt, "{}", value),
            Value::Pattern(pattern) => write!(fmt, "{}", pattern.source()),
            Value::Bool(value) => write!(fmt, "{}", value),
        }
    }
}

/// Ordering of results requested with `-sort` or `-rsort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: Field,
    pub ascending: bool,
}

/// A node of the filter tree.
///
/// Invariants: `And` and `Or` hold at least one child; `Not` holds exactly
/// one by construction. Use [`Filter::all`] and [`Filter::any`] to build
/// compound nodes from a list and [`Filter::validate`] to check trees built
/// by hand.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: Field,
        op: Operator,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {

    pub fn compare(field: Field, op: Operator, value: Value) -> Filter {
        Filter::Compare { field, op, value }
    }

    pub fn and(left: Filter, right: Filter) -> Filter {
        Filter::And(vec![left, right])
    }

    pub fn or(left: Filter, right: Filter) -> Filter {
        Filter::Or(vec![left, right])
    }

    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    /// Conjunction of `children`: `None` when empty, the child itself when
    /// there is only one.
    pub fn all(mut children: Vec<Filter>) -> Option<Filter> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Filter::And(children)),
        }
    }

    /// Disjunction of `children`, with the same collapsing rules as
    /// [`Filter::all`].
    pub fn any(mut children: Vec<Filter>) -> Option<Filter> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Filter::Or(children)),
        }
    }

    /// Checks the structural invariants of the whole tree.
    pub fn validate(&self) -> Result<(), InvalidFilter> {
        match self {
            Filter::Compare { field, op, value } => {
                validate_leaf(field, *op, value)
            }
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(InvalidFilter::EmptyCompound);
                }
                children.iter().try_for_each(Filter::validate)
            }
            Filter::Not(child) => child.validate(),
        }
    }
}

/// Conjunction of two optional filters, where `None` means "everything".
pub fn and_optional(left: Option<Filter>, right: Option<Filter>)
    -> Option<Filter>
{
    match (left, right) {
        (Some(left), Some(right)) => Some(Filter::and(left, right)),
        (left, None) => left,
        (None, right) => right,
    }
}

/// A structural invariant violation found by [`Filter::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidFilter {
    EmptyCompound,
    OperandMismatch { field: Field, op: Operator },
}

impl std::error::Error for InvalidFilter {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl Display for InvalidFilter {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        use InvalidFilter::*;

        match *self {
            EmptyCompound => write!(fmt, "logical filter without operands"),
            OperandMismatch { ref field, op } => write!(
                fmt,
                "operand does not fit operator '{}' on field '{}'",
                op,
                field
            ),
        }
    }
}

fn validate_leaf(field: &Field, op: Operator, value: &Value)
    -> Result<(), InvalidFilter>
{
    let fits = match (op, value) {
        (Operator::Regex, Value::Pattern(_)) => true,
        (Operator::Regex, _) => false,
        (Operator::Exists, Value::Bool(_)) => true,
        (Operator::Exists, _) => false,
        (Operator::AllSet, Value::Unsigned(_)) => true,
        (Operator::AnySet, Value::Unsigned(_)) => true,
        (Operator::AllSet, _) | (Operator::AnySet, _) => false,
        (_, Value::Pattern(_)) | (_, Value::Bool(_)) => false,
        (_, _) => true,
    };

    if fits {
        Ok(())
    } else {
        Err(InvalidFilter::OperandMismatch { field: field.clone(), op })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_above(n: u64) -> Filter {
        Filter::compare(Field::Size, Operator::Greater, Value::Unsigned(n))
    }

    #[test]
    fn test_all_collapses() {
        assert_eq!(Filter::all(vec![]), None);
        assert_eq!(Filter::all(vec![size_above(1)]), Some(size_above(1)));
        assert_eq!(
            Filter::all(vec![size_above(1), size_above(2)]),
            Some(Filter::And(vec![size_above(1), size_above(2)]))
        );
    }

    #[test]
    fn test_and_optional() {
        assert_eq!(and_optional(None, None), None);
        assert_eq!(and_optional(Some(size_above(1)), None),
                   Some(size_above(1)));
        assert_eq!(and_optional(None, Some(size_above(2))),
                   Some(size_above(2)));
        assert_eq!(and_optional(Some(size_above(1)), Some(size_above(2))),
                   Some(Filter::and(size_above(1), size_above(2))));
    }

    #[test]
    fn test_validate_rejects_empty_compound() {
        assert_eq!(Filter::Or(vec![]).validate(),
                   Err(InvalidFilter::EmptyCompound));
        assert_eq!(Filter::not(Filter::And(vec![])).validate(),
                   Err(InvalidFilter::EmptyCompound));
    }

    #[test]
    fn test_validate_rejects_operand_mismatch() {
        let filter = Filter::compare(
            Field::Name, Operator::Regex, Value::String("a".to_owned()));
        assert!(matches!(filter.validate(),
                         Err(InvalidFilter::OperandMismatch { .. })));
    }

    #[test]
    fn test_field_names_round_trip() {
        for name in &["name", "path", "size", "mtime", "xattr:user.tier"] {
            let field: Field = name.parse().unwrap();
            assert_eq!(field.to_string(), *name);
        }
        assert!("xattr:".parse::<Field>().is_err());
        assert!("bogus".parse::<Field>().is_err());
    }
}
