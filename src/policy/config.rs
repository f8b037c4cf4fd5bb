// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! YAML policy files.
//!
//! ```yaml
//! fileclasses:
//!   scratch: -name *.tmp
//!   large: [-size, +1G]
//! name: purge-scratch
//! filter: -class scratch
//! action: common:log
//! rules:
//!   - name: large
//!     filter: -class large
//!     action: common:migrate
//!     parameters: { target: archive }
//!   - name: rest
//!     action: common:delete
//! ```
//!
//! Filters are find expressions, written either as one whitespace-separated
//! string or as a list of tokens. Fileclasses name a filter once; `-class
//! NAME` refers to it from any later filter, including later fileclasses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::backend::Parameters;
use crate::filter::{Filter, Sort};
use crate::policy::{Action, Policy, Rule};
use crate::query::{self, compile_filter, BuildContext, PredicateBuilder, Registry};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Yaml(serde_yaml::Error),
    /// The filter of a rule (or of the policy) does not compile.
    Filter {
        rule: String,
        source: query::Error,
    },
    Action {
        rule: String,
        action: String,
        reason: String,
    },
    /// A parameter or filter token is not a scalar.
    NotScalar {
        rule: String,
        key: String,
    },
    /// Sort directives are only allowed in the policy filter.
    Sort {
        rule: String,
    },
    InvalidClass {
        class: String,
        reason: &'static str,
    },
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml(error) => Some(error),
            ConfigError::Filter { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ConfigError::*;

        match *self {
            Io { ref path, ref source } => write!(
                fmt,
                "cannot read policy '{}': {}",
                path.display(),
                source
            ),
            Yaml(ref error) => write!(fmt, "malformed policy: {}", error),
            Filter { ref rule, ref source } => {
                write!(fmt, "invalid filter of '{}': {}", rule, source)
            }
            Action { ref rule, ref action, ref reason } => write!(
                fmt,
                "invalid action '{}' of '{}': {}",
                action,
                rule,
                reason
            ),
            NotScalar { ref rule, ref key } => write!(
                fmt,
                "'{}' of '{}' must be a string, a number or a boolean",
                key,
                rule
            ),
            Sort { ref rule } => write!(
                fmt,
                "sort directives are not allowed in the filter of '{}'",
                rule
            ),
            InvalidClass { ref class, reason } => {
                write!(fmt, "invalid fileclass '{}': {}", class, reason)
            }
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> ConfigError {
        ConfigError::Yaml(error)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expression {
    Line(String),
    Tokens(Vec<YamlValue>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyConfig {
    #[serde(default)]
    fileclasses: Mapping,
    name: String,
    #[serde(default)]
    filter: Option<Expression>,
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    parameters: BTreeMap<String, YamlValue>,
    #[serde(default)]
    rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    filter: Option<Expression>,
    action: String,
    #[serde(default)]
    parameters: BTreeMap<String, YamlValue>,
}

fn default_action() -> String {
    String::from("common:noop")
}

/// Reads the policy stored at `path`.
pub fn load<P: AsRef<Path>>(
    path: P,
    registry: &Registry,
    context: BuildContext,
) -> Result<Policy, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Io { path: path.to_owned(), source }
    })?;
    parse(&text, registry, context)
}

/// Parses a policy from its YAML text. Filters are compiled against
/// `registry` with `context` as the reference instant.
pub fn parse(
    text: &str,
    registry: &Registry,
    context: BuildContext,
) -> Result<Policy, ConfigError> {
    let config = serde_yaml::from_str::<PolicyConfig>(text)?;

    let mut registry = registry.clone();
    let mut classes = BTreeMap::new();
    registry.register(Box::new(ClassPredicate { classes: classes.clone() }));
    for (name, expression) in &config.fileclasses {
        let name = match name {
            YamlValue::String(name) if !name.is_empty() => name.clone(),
            _ => {
                return Err(ConfigError::InvalidClass {
                    class: format!("{:?}", name),
                    reason: "name must be a non-empty string",
                })
            }
        };
        let expression = serde_yaml::from_value::<Expression>(expression.clone())?;

        let filter = match compile(&name, Some(&expression), &registry, context)? {
            (Some(filter), sorts) if sorts.is_empty() => filter,
            (Some(_), _) => return Err(ConfigError::Sort { rule: name }),
            (None, _) => {
                return Err(ConfigError::InvalidClass {
                    class: name,
                    reason: "empty filter",
                })
            }
        };

        debug!("declared fileclass '{}': {}", name, filter);
        classes.insert(name, filter);
        registry.register(Box::new(ClassPredicate { classes: classes.clone() }));
    }
    let registry = &registry;

    let (filter, sort) =
        compile(&config.name, config.filter.as_ref(), registry, context)?;
    let fallback = action(&config.name, &config.action, &config.parameters)?;

    let mut rules = Vec::with_capacity(config.rules.len());
    for (index, rule) in config.rules.iter().enumerate() {
        let name = match &rule.name {
            Some(name) => name.clone(),
            None => format!("rule #{}", index + 1),
        };
        let (filter, sorts) =
            compile(&name, rule.filter.as_ref(), registry, context)?;
        if !sorts.is_empty() {
            return Err(ConfigError::Sort { rule: name });
        }
        let action = action(&name, &rule.action, &rule.parameters)?;
        rules.push(Rule { name, filter, action });
    }

    Ok(Policy {
        name: config.name,
        filter,
        sort,
        rules,
        fallback,
    })
}

fn compile(
    rule: &str,
    expression: Option<&Expression>,
    registry: &Registry,
    context: BuildContext,
) -> Result<(Option<Filter>, Vec<Sort>), ConfigError> {
    let args = match expression {
        None => return Ok((None, vec![])),
        Some(Expression::Line(line)) => {
            line.split_whitespace().map(String::from).collect::<Vec<_>>()
        }
        Some(Expression::Tokens(tokens)) => tokens
            .iter()
            .map(|token| {
                scalar(token).ok_or_else(|| ConfigError::NotScalar {
                    rule: rule.to_owned(),
                    key: String::from("filter"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    compile_filter(&args, registry, context).map_err(|source| {
        ConfigError::Filter { rule: rule.to_owned(), source }
    })
}

fn action(
    rule: &str,
    name: &str,
    parameters: &BTreeMap<String, YamlValue>,
) -> Result<Action, ConfigError> {
    let mut action = name.parse::<Action>().map_err(|reason| {
        ConfigError::Action {
            rule: rule.to_owned(),
            action: name.to_owned(),
            reason,
        }
    })?;

    let mut resolved = Parameters::new();
    for (key, value) in parameters {
        let value = scalar(value).ok_or_else(|| ConfigError::NotScalar {
            rule: rule.to_owned(),
            key: key.clone(),
        })?;
        resolved.insert(key.clone(), value);
    }
    // Parameters derived from the action string take precedence.
    resolved.append(&mut action.parameters);
    action.parameters = resolved;

    Ok(action)
}

/// `-class NAME`: the filter of a fileclass declared earlier.
struct ClassPredicate {
    classes: BTreeMap<String, Filter>,
}

impl PredicateBuilder for ClassPredicate {

    fn token(&self) -> &str {
        "-class"
    }

    fn build(&self, args: &[String], _: &BuildContext)
        -> Result<Filter, query::Error>
    {
        let name = match args {
            [name] => name,
            _ => {
                return Err(query::Error::MissingArgument {
                    token: self.token().to_owned(),
                })
            }
        };

        match self.classes.get(name) {
            Some(filter) => Ok(filter.clone()),
            None => Err(query::Error::invalid_argument(
                self.token(), name, "unknown fileclass"
            )),
        }
    }
}

fn scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(string) => Some(string.clone()),
        YamlValue::Number(number) => Some(number.to_string()),
        YamlValue::Bool(boolean) => Some(boolean.to_string()),
        _ => None,
    }
}
