// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::cmp::Ordering;

use crate::filter::{Field, Filter, Operator, Value};
use crate::fs::{Entry, FileKind};

/// Evaluates `filter` against an entry that is already fully in memory.
///
/// Comparisons on attributes the entry does not carry (no symlink target, a
/// missing extended attribute) are false, except for `exists` which reports
/// the absence. Operands of the wrong kind never match.
pub fn matches_locally(filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::Compare { field, op, value } => {
            check_compare(entry, field, *op, value)
        }
        Filter::And(children) => {
            children.iter().all(|child| matches_locally(child, entry))
        }
        Filter::Or(children) => {
            children.iter().any(|child| matches_locally(child, entry))
        }
        Filter::Not(child) => !matches_locally(child, entry),
    }
}

/// A field of an entry as read for comparison.
enum Actual<'a> {
    Unsigned(u64),
    Integer(i64),
    Text(&'a str),
    Kind(FileKind),
}

fn read_field<'a>(entry: &'a Entry, field: &Field) -> Option<Actual<'a>> {
    let stat = &entry.stat;
    Some(match field {
        Field::Name => Actual::Text(&entry.name),
        Field::Path => Actual::Text(&entry.path),
        Field::Symlink => Actual::Text(entry.symlink.as_deref()?),
        Field::Type => Actual::Kind(stat.kind),
        Field::Mode => Actual::Unsigned(u64::from(stat.mode)),
        Field::Size => Actual::Unsigned(stat.size),
        Field::Blocks => Actual::Unsigned(stat.blocks),
        Field::Uid => Actual::Unsigned(u64::from(stat.uid)),
        Field::Gid => Actual::Unsigned(u64::from(stat.gid)),
        Field::Ino => Actual::Unsigned(stat.ino),
        Field::Nlink => Actual::Unsigned(stat.nlink),
        Field::Atime => Actual::Integer(stat.atime),
        Field::Mtime => Actual::Integer(stat.mtime),
        Field::Ctime => Actual::Integer(stat.ctime),
        Field::Xattr(key) => Actual::Text(entry.xattrs.get(key)?),
    })
}

fn check_compare(entry: &Entry, field: &Field, op: Operator, value: &Value)
    -> bool
{
    let actual = read_field(entry, field);

    if op == Operator::Exists {
        return match value {
            Value::Bool(expected) => actual.is_some() == *expected,
            _ => false,
        };
    }

    let actual = match actual {
        Some(actual) => actual,
        None => return false,
    };

    match op {
        Operator::Regex => match (&actual, value) {
            (Actual::Text(text), Value::Pattern(pattern)) => {
                pattern.is_match(text)
            }
            (Actual::Kind(kind), Value::Pattern(pattern)) => {
                pattern.is_match(&kind.letter().to_string())
            }
            _ => false,
        },
        Operator::AllSet => match (&actual, value) {
            (Actual::Unsigned(bits), Value::Unsigned(mask)) => {
                bits & mask == *mask
            }
            _ => false,
        },
        Operator::AnySet => match (&actual, value) {
            // An empty mask is satisfied by anything, as in find(1).
            (Actual::Unsigned(_), Value::Unsigned(0)) => true,
            (Actual::Unsigned(bits), Value::Unsigned(mask)) => {
                bits & mask != 0
            }
            _ => false,
        },
        _ => match ordering(&actual, value) {
            Some(ordering) => holds(op, ordering),
            None => false,
        },
    }
}

fn holds(op: Operator, ordering: Ordering) -> bool {
    match op {
        Operator::Equal => ordering == Ordering::Equal,
        Operator::Less => ordering == Ordering::Less,
        Operator::LessOrEqual => ordering != Ordering::Greater,
        Operator::Greater => ordering == Ordering::Greater,
        Operator::GreaterOrEqual => ordering != Ordering::Less,
        _ => false,
    }
}

/// Orders the actual value relative to the operand, if they are comparable.
fn ordering(actual: &Actual, value: &Value) -> Option<Ordering> {
    let number = match value {
        Value::Unsigned(value) => Some(i128::from(*value)),
        Value::Integer(value) => Some(i128::from(*value)),
        _ => None,
    };

    match (actual, value, number) {
        (Actual::Unsigned(actual), _, Some(number)) => {
            Some(i128::from(*actual).cmp(&number))
        }
        (Actual::Integer(actual), _, Some(number)) => {
            Some(i128::from(*actual).cmp(&number))
        }
        (Actual::Text(actual), Value::String(expected), _) => {
            Some((*actual).cmp(expected.as_str()))
        }
        (Actual::Kind(kind), Value::String(expected), _) => {
            Some(kind.letter().to_string().as_str().cmp(expected.as_str()))
        }
        _ => None,
    }
}
