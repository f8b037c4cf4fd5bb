// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Policies: ordered rules deciding what happens to every indexed entry.
//!
//! A policy is built once from its configuration ([`config`]) and stays
//! immutable while the execution loop ([`engine`]) runs it. Rule selection
//! is first-match-wins; actions are resolved through a per-run
//! [`ActionCache`] and applied by [`apply`].

pub mod action;
pub mod apply;
pub mod config;
pub mod engine;

use crate::filter::{matches_locally, Filter, Sort};
use crate::fs::Entry;

pub use self::action::{select_action, Action, ActionCache, ActionKind, Prepared};
pub use self::apply::{apply, ApplyError};
pub use self::config::ConfigError;
pub use self::engine::{run, RunError, RunStats};

/// One rule of a policy. A rule without a filter matches every entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub filter: Option<Filter>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    /// Entries not matching this filter are left alone.
    pub filter: Option<Filter>,
    /// Order in which the index is asked to return entries.
    pub sort: Vec<Sort>,
    pub rules: Vec<Rule>,
    /// Action for entries passing the filter but matching no rule.
    pub fallback: Action,
}

/// Outcome of matching an entry against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The policy filter rejected the entry.
    Excluded,
    /// Index of the first matching rule.
    Matched(usize),
    /// No rule matched; the fallback applies.
    Unmatched,
}

impl Policy {

    /// Name of the rule behind `selection`, for logging.
    pub fn rule_name(&self, selection: Selection) -> &str {
        match selection {
            Selection::Matched(index) => &self.rules[index].name,
            Selection::Unmatched => "fallback",
            Selection::Excluded => "excluded",
        }
    }
}

/// Finds the rule applying to `entry`.
pub fn select_rule(policy: &Policy, entry: &Entry) -> Selection {
    if let Some(filter) = &policy.filter {
        if !matches_locally(filter, entry) {
            return Selection::Excluded;
        }
    }

    let matched = policy.rules.iter().position(|rule| match &rule.filter {
        Some(filter) => matches_locally(filter, entry),
        None => true,
    });

    match matched {
        Some(index) => Selection::Matched(index),
        None => Selection::Unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Parameters;
    use crate::filter::{Field, Operator, Value};
    use crate::fs::Stat;
    use crate::query::glob_to_regex;
    use crate::filter::Pattern;

    fn action(kind: ActionKind) -> Action {
        Action { kind, parameters: Parameters::new() }
    }

    fn policy() -> Policy {
        let name = Pattern::new(&glob_to_regex("*.tmp"), false).unwrap();
        Policy {
            name: String::from("purge"),
            filter: Some(Filter::compare(
                Field::Name, Operator::Regex, Value::Pattern(name))),
            sort: vec![],
            rules: vec![
                Rule {
                    name: String::from("large"),
                    filter: Some(Filter::compare(
                        Field::Size, Operator::Greater,
                        Value::Unsigned(1 << 30))),
                    action: action(ActionKind::Migrate),
                },
                Rule {
                    name: String::from("rest"),
                    filter: None,
                    action: action(ActionKind::Delete),
                },
            ],
            fallback: action(ActionKind::Noop),
        }
    }

    fn entry(path: &str, size: u64) -> Entry {
        Entry::new(path, Stat { size, ..Stat::default() })
    }

    #[test]
    fn test_select_rule() {
        let policy = policy();
        assert_eq!(select_rule(&policy, &entry("/a.tmp", 2 << 30)),
                   Selection::Matched(0));
        assert_eq!(select_rule(&policy, &entry("/b.tmp", 10)),
                   Selection::Matched(1));
        assert_eq!(select_rule(&policy, &entry("/c.log", 5)),
                   Selection::Excluded);
    }

    #[test]
    fn test_select_rule_unmatched() {
        let mut policy = policy();
        policy.rules.pop();
        assert_eq!(select_rule(&policy, &entry("/b.tmp", 10)),
                   Selection::Unmatched);
        assert_eq!(policy.rule_name(Selection::Unmatched), "fallback");
        assert_eq!(policy.rule_name(Selection::Matched(0)), "large");
    }

    #[test]
    fn test_select_rule_without_filter() {
        let mut policy = policy();
        policy.filter = None;
        assert_eq!(select_rule(&policy, &entry("/c.log", 5)),
                   Selection::Matched(1));
    }
}
