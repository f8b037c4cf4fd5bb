// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Rendering of filter trees back into query tokens.
//!
//! Leaves are printed with the canonical `-compare FIELD OP VALUE` predicate
//! and every compound child is parenthesized, so parsing the printed tokens
//! yields a tree equal to the original one.

use std::fmt::{Display, Formatter};

use crate::filter::{Filter, Operator, Value};

impl Filter {

    /// Returns the query tokens describing this filter.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![];
        push_args(self, &mut args);
        args
    }
}

impl Display for Filter {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.to_args().join(" "))
    }
}

fn push_args(filter: &Filter, args: &mut Vec<String>) {
    match filter {
        Filter::Compare { field, op, value } => {
            args.push(String::from("-compare"));
            args.push(field.to_string());
            args.push(operator_token(*op, value));
            args.push(value.to_string());
        }
        Filter::And(children) => push_joined(children, "-and", args),
        Filter::Or(children) => push_joined(children, "-or", args),
        Filter::Not(child) => {
            args.push(String::from("!"));
            push_grouped(child, args);
        }
    }
}

fn push_joined(children: &[Filter], operator: &str, args: &mut Vec<String>) {
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            args.push(operator.to_owned());
        }
        push_grouped(child, args);
    }
}

fn push_grouped(filter: &Filter, args: &mut Vec<String>) {
    match filter {
        Filter::And(_) | Filter::Or(_) => {
            args.push(String::from("("));
            push_args(filter, args);
            args.push(String::from(")"));
        }
        _ => push_args(filter, args),
    }
}

fn operator_token(op: Operator, value: &Value) -> String {
    match value {
        Value::Pattern(pattern) if pattern.is_case_insensitive() => {
            String::from("=~i")
        }
        _ => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Field, Pattern};

    #[test]
    fn test_print_leaf() {
        let filter = Filter::compare(
            Field::Size, Operator::Greater, Value::Unsigned(1024));
        assert_eq!(filter.to_args(), vec!["-compare", "size", ">", "1024"]);
    }

    #[test]
    fn test_print_case_insensitive_pattern() {
        let pattern = Pattern::new("^a$", true).unwrap();
        let filter = Filter::compare(
            Field::Name, Operator::Regex, Value::Pattern(pattern));
        assert_eq!(filter.to_string(), "-compare name =~i ^a$");
    }

    #[test]
    fn test_print_groups_compound_children() {
        let a = Filter::compare(Field::Uid, Operator::Equal, Value::Unsigned(1));
        let b = Filter::compare(Field::Gid, Operator::Equal, Value::Unsigned(2));
        let filter = Filter::And(vec![
            Filter::Or(vec![a.clone(), b.clone()]),
            Filter::not(Filter::and(a, b)),
        ]);
        assert_eq!(
            filter.to_string(),
            "( -compare uid == 1 -or -compare gid == 2 ) -and \
             ! ( -compare uid == 1 -and -compare gid == 2 )"
        );
    }
}
