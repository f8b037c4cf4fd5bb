// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Policy actions and the per-run cache resolving them.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

use log::debug;

use crate::backend::{Capabilities, Parameters};
use crate::policy::{Policy, Selection};

/// Parameter holding the command template of `cmd:` actions.
pub const COMMAND_PARAMETER: &str = "command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Delete,
    Migrate,
    Log,
    Print,
    Count,
    Noop,
    /// An external command, run once per entry.
    Command,
}

impl ActionKind {

    /// Whether applying the action changes data.
    pub fn is_destructive(self) -> bool {
        match self {
            ActionKind::Delete | ActionKind::Migrate | ActionKind::Command => true,
            _ => false,
        }
    }

    /// Whether `capabilities` allow the action at all.
    pub fn is_supported(self, capabilities: &Capabilities) -> bool {
        match self {
            ActionKind::Delete => capabilities.delete,
            ActionKind::Migrate => capabilities.migrate,
            _ => true,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ActionKind::Delete => "common:delete",
            ActionKind::Migrate => "common:migrate",
            ActionKind::Log => "common:log",
            ActionKind::Print => "common:print",
            ActionKind::Count => "common:count",
            ActionKind::Noop => "common:noop",
            ActionKind::Command => "cmd",
        };
        write!(fmt, "{}", name)
    }
}

/// An action as configured: its kind and opaque parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub parameters: Parameters,
}

impl Action {

    pub fn noop() -> Action {
        Action {
            kind: ActionKind::Noop,
            parameters: Parameters::new(),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    /// Parses `common:<name>` or `cmd:<template>`.
    fn from_str(string: &str) -> Result<Action, String> {
        let mut parameters = Parameters::new();

        let kind = match string {
            "common:delete" => ActionKind::Delete,
            "common:migrate" => ActionKind::Migrate,
            "common:log" => ActionKind::Log,
            "common:print" => ActionKind::Print,
            "common:count" => ActionKind::Count,
            "common:noop" => ActionKind::Noop,
            _ => match string.strip_prefix("cmd:") {
                Some(template) if !template.trim().is_empty() => {
                    split_command(template)?;
                    parameters.insert(String::from(COMMAND_PARAMETER),
                                      template.to_owned());
                    ActionKind::Command
                }
                Some(_) => return Err(String::from("empty command")),
                None => return Err(String::from("unknown action")),
            },
        };

        Ok(Action { kind, parameters })
    }
}

/// An action ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Name of the rule the action belongs to.
    pub rule: String,
    pub kind: ActionKind,
    pub parameters: Parameters,
    /// Command line of `cmd:` actions, `{}` still unsubstituted.
    pub argv: Vec<String>,
}

/// Per-kind state, created on first use of a kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindState {
    /// Whether the live backend can perform the action.
    pub supported: bool,
    pub applied: usize,
    pub failed: usize,
}

/// State shared by all action invocations of one policy run.
///
/// Every rule slot (plus one for the fallback) is resolved at most once.
/// State per action kind is created at most once and lives until
/// [`ActionCache::release`].
pub struct ActionCache {
    capabilities: Capabilities,
    slots: Vec<Option<Rc<Prepared>>>,
    kinds: BTreeMap<ActionKind, KindState>,
    initializations: usize,
    released: bool,
}

impl ActionCache {

    /// Creates an empty cache for `policy`, acting on a backend with the
    /// given capabilities.
    pub fn new(policy: &Policy, capabilities: Capabilities) -> ActionCache {
        ActionCache {
            capabilities,
            slots: vec![None; policy.rules.len() + 1],
            kinds: BTreeMap::new(),
            initializations: 0,
            released: false,
        }
    }

    /// Number of action kinds initialised so far.
    pub fn initializations(&self) -> usize {
        self.initializations
    }

    pub fn state(&self, kind: ActionKind) -> Option<&KindState> {
        self.kinds.get(&kind)
    }

    /// Records the outcome of applying an action of `kind`.
    pub fn record(&mut self, kind: ActionKind, success: bool) {
        if let Some(state) = self.kinds.get_mut(&kind) {
            if success {
                state.applied += 1;
            } else {
                state.failed += 1;
            }
        }
    }

    /// Drops all cached state and returns the final per-kind counters.
    /// Calling it again returns nothing.
    pub fn release(&mut self) -> BTreeMap<ActionKind, KindState> {
        if self.released {
            return BTreeMap::new();
        }
        self.released = true;
        self.slots.clear();

        debug!("releasing action cache ({} kinds)", self.kinds.len());
        std::mem::take(&mut self.kinds)
    }

    fn init_kind(&mut self, kind: ActionKind) {
        let capabilities = self.capabilities;
        let initializations = &mut self.initializations;
        self.kinds.entry(kind).or_insert_with(|| {
            *initializations += 1;
            let supported = kind.is_supported(&capabilities);
            debug!("initialising action '{}' (supported: {})", kind, supported);
            KindState { supported, ..KindState::default() }
        });
    }
}

impl Drop for ActionCache {
    fn drop(&mut self) {
        self.release();
    }
}

/// Resolves the action to apply for `selection`, or `None` for excluded
/// entries.
pub fn select_action(
    policy: &Policy,
    cache: &mut ActionCache,
    selection: Selection,
) -> Option<Rc<Prepared>> {
    let slot = match selection {
        Selection::Excluded => return None,
        Selection::Matched(index) => index,
        Selection::Unmatched => policy.rules.len(),
    };

    if let Some(Some(prepared)) = cache.slots.get(slot) {
        return Some(Rc::clone(prepared));
    }

    let action = match selection {
        Selection::Matched(index) => &policy.rules[index].action,
        _ => &policy.fallback,
    };
    cache.init_kind(action.kind);

    // Templates are checked when parsed; a bad one ends up as an empty
    // command, which fails when applied.
    let argv = match action.parameters.get(COMMAND_PARAMETER) {
        Some(template) if action.kind == ActionKind::Command => {
            split_command(template).unwrap_or_default()
        }
        _ => vec![],
    };
    let prepared = Rc::new(Prepared {
        rule: policy.rule_name(selection).to_owned(),
        kind: action.kind,
        parameters: action.parameters.clone(),
        argv,
    });

    if let Some(entry) = cache.slots.get_mut(slot) {
        *entry = Some(Rc::clone(&prepared));
    }
    Some(prepared)
}

/// Splits a command template into words the way a shell would, without
/// any expansion.
///
/// Single quotes keep everything literally. Inside double quotes a backslash
/// only escapes `"` and `\`. Elsewhere a backslash escapes any character.
pub fn split_command(template: &str) -> Result<Vec<String>, String> {
    let mut words = vec![];
    let mut word: Option<String> = None;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if let Some(word) = word.take() {
                    words.push(word);
                }
            }
            '\'' => {
                let word = word.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(String::from("unterminated quote")),
                    }
                }
            }
            '"' => {
                let word = word.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ '"') | Some(c @ '\\') => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => {
                                return Err(String::from("unterminated quote"))
                            }
                        },
                        Some(c) => word.push(c),
                        None => return Err(String::from("unterminated quote")),
                    }
                }
            }
            '\\' => match chars.next() {
                Some(c) => word.get_or_insert_with(String::new).push(c),
                None => return Err(String::from("trailing backslash")),
            },
            c => word.get_or_insert_with(String::new).push(c),
        }
    }

    if let Some(word) = word {
        words.push(word);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Rule;

    fn policy() -> Policy {
        let rule = |name: &str, action: &str| Rule {
            name: String::from(name),
            filter: None,
            action: action.parse().unwrap(),
        };
        Policy {
            name: String::from("test"),
            filter: None,
            sort: vec![],
            rules: vec![
                rule("first", "common:delete"),
                rule("second", "cmd:echo {}"),
                rule("third", "common:delete"),
            ],
            fallback: Action::noop(),
        }
    }

    #[test]
    fn test_parse_action() {
        let action = "cmd:archive --to tape {}".parse::<Action>().unwrap();
        assert_eq!(action.kind, ActionKind::Command);
        assert_eq!(action.parameters.get(COMMAND_PARAMETER).unwrap(),
                   "archive --to tape {}");

        assert_eq!("common:count".parse::<Action>().unwrap().kind,
                   ActionKind::Count);
        assert!("common:shred".parse::<Action>().is_err());
        assert!("cmd: ".parse::<Action>().is_err());
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("archive --to tape {}").unwrap(),
                   vec!["archive", "--to", "tape", "{}"]);
        assert_eq!(split_command("tag 'cold data' \"{}\"").unwrap(),
                   vec!["tag", "cold data", "{}"]);
        assert_eq!(split_command(r#"echo "a \"b\" \n" c\ d ''"#).unwrap(),
                   vec!["echo", r#"a "b" \n"#, "c d", ""]);
        assert!(split_command("echo 'open").is_err());
        assert!(split_command("echo \"open").is_err());
        assert!(split_command("echo \\").is_err());
        assert!("cmd:echo 'open".parse::<Action>().is_err());
    }

    #[test]
    fn test_select_action() {
        let policy = policy();
        let mut cache = ActionCache::new(&policy, Capabilities::default());

        assert!(select_action(&policy, &mut cache, Selection::Excluded).is_none());

        let command = select_action(&policy, &mut cache, Selection::Matched(1))
            .unwrap();
        assert_eq!(command.rule, "second");
        assert_eq!(command.argv, vec!["echo", "{}"]);

        let fallback = select_action(&policy, &mut cache, Selection::Unmatched)
            .unwrap();
        assert_eq!(fallback.kind, ActionKind::Noop);
        assert_eq!(fallback.rule, "fallback");
    }

    #[test]
    fn test_kinds_initialised_once() {
        let policy = policy();
        let mut cache = ActionCache::new(&policy, Capabilities::default());

        for _ in 0..1000 {
            select_action(&policy, &mut cache, Selection::Matched(0));
            select_action(&policy, &mut cache, Selection::Matched(2));
        }
        assert_eq!(cache.initializations(), 1);
        assert!(!cache.state(ActionKind::Delete).unwrap().supported);

        let first = select_action(&policy, &mut cache, Selection::Matched(0));
        let again = select_action(&policy, &mut cache, Selection::Matched(0));
        assert!(Rc::ptr_eq(&first.unwrap(), &again.unwrap()));
    }

    #[test]
    fn test_release_once() {
        let policy = policy();
        let mut cache = ActionCache::new(&policy, Capabilities::default());
        select_action(&policy, &mut cache, Selection::Matched(0));
        cache.record(ActionKind::Delete, true);
        cache.record(ActionKind::Delete, false);

        let released = cache.release();
        let delete = released.get(&ActionKind::Delete).unwrap();
        assert_eq!((delete.applied, delete.failed), (1, 1));
        assert!(cache.release().is_empty());
    }
}
