// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Predicates and the registry mapping their names to leaf builders.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::filter::{Field, FieldKind, Filter, Operator, Pattern, Value};
use crate::fs::FileKind;
use crate::query::error::Error;
use crate::query::glob::glob_to_regex;
use crate::query::perm::perm_filter;
use crate::query::window::{numeric_filter, size_filter, time_filter, TimeUnit};

/// State shared by all builders of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildContext {
    /// Reference instant of relative time windows, in seconds since epoch.
    pub now: i64,
}

impl BuildContext {

    pub fn new(now: i64) -> BuildContext {
        BuildContext { now }
    }

    /// A context anchored at the current wall-clock time.
    pub fn current() -> BuildContext {
        BuildContext::new(chrono::Utc::now().timestamp())
    }
}

/// A named predicate that turns its arguments into a filter.
pub trait PredicateBuilder {
    /// The token naming the predicate, dash included (e.g. `-name`).
    fn token(&self) -> &str;

    /// Number of arguments following the token.
    fn arity(&self) -> usize {
        1
    }

    fn build(&self, args: &[String], context: &BuildContext)
        -> Result<Filter, Error>;
}

/// Predicates every query understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Name,
    Iname,
    Path,
    Regex,
    Iregex,
    Lname,
    Ilname,
    Type,
    Empty,
    Size,
    Perm,
    Xattr,
    Uid,
    Gid,
    Inum,
    Links,
    Blocks,
    Amin,
    Cmin,
    Mmin,
    Atime,
    Ctime,
    Mtime,
    Compare,
}

const BUILTINS: &[Builtin] = &[
    Builtin::Name,
    Builtin::Iname,
    Builtin::Path,
    Builtin::Regex,
    Builtin::Iregex,
    Builtin::Lname,
    Builtin::Ilname,
    Builtin::Type,
    Builtin::Empty,
    Builtin::Size,
    Builtin::Perm,
    Builtin::Xattr,
    Builtin::Uid,
    Builtin::Gid,
    Builtin::Inum,
    Builtin::Links,
    Builtin::Blocks,
    Builtin::Amin,
    Builtin::Cmin,
    Builtin::Mmin,
    Builtin::Atime,
    Builtin::Ctime,
    Builtin::Mtime,
    Builtin::Compare,
];

impl PredicateBuilder for Builtin {

    fn token(&self) -> &str {
        match self {
            Builtin::Name => "-name",
            Builtin::Iname => "-iname",
            Builtin::Path => "-path",
            Builtin::Regex => "-regex",
            Builtin::Iregex => "-iregex",
            Builtin::Lname => "-lname",
            Builtin::Ilname => "-ilname",
            Builtin::Type => "-type",
            Builtin::Empty => "-empty",
            Builtin::Size => "-size",
            Builtin::Perm => "-perm",
            Builtin::Xattr => "-xattr",
            Builtin::Uid => "-uid",
            Builtin::Gid => "-gid",
            Builtin::Inum => "-inum",
            Builtin::Links => "-links",
            Builtin::Blocks => "-blocks",
            Builtin::Amin => "-amin",
            Builtin::Cmin => "-cmin",
            Builtin::Mmin => "-mmin",
            Builtin::Atime => "-atime",
            Builtin::Ctime => "-ctime",
            Builtin::Mtime => "-mtime",
            Builtin::Compare => "-compare",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Builtin::Empty => 0,
            Builtin::Compare => 3,
            _ => 1,
        }
    }

    fn build(&self, args: &[String], context: &BuildContext)
        -> Result<Filter, Error>
    {
        let token = self.token();
        match self {
            Builtin::Empty => Ok(Filter::And(vec![
                Filter::compare(Field::Size, Operator::Equal, Value::Unsigned(0)),
                type_filter(FileKind::File),
            ])),
            Builtin::Compare => compare_filter(token, args),
            _ => match args {
                [arg] => self.build_unary(token, arg, context),
                _ => Err(Error::MissingArgument { token: token.to_owned() }),
            },
        }
    }
}

impl Builtin {

    fn build_unary(self, token: &str, arg: &str, context: &BuildContext)
        -> Result<Filter, Error>
    {
        let invalid = |reason: String| Error::invalid_argument(token, arg, reason);

        match self {
            Builtin::Name => glob_filter(token, Field::Name, arg, false),
            Builtin::Iname => glob_filter(token, Field::Name, arg, true),
            Builtin::Path => glob_filter(token, Field::Path, arg, false),
            Builtin::Lname => glob_filter(token, Field::Symlink, arg, false),
            Builtin::Ilname => glob_filter(token, Field::Symlink, arg, true),
            Builtin::Regex => regex_filter(token, Field::Path, arg, false),
            Builtin::Iregex => regex_filter(token, Field::Path, arg, true),
            Builtin::Type => {
                let mut chars = arg.chars();
                match (chars.next().and_then(FileKind::from_letter), chars.next()) {
                    (Some(kind), None) => Ok(type_filter(kind)),
                    _ => Err(invalid(String::from(
                        "expected one of 'b', 'c', 'd', 'f', 'l', 'p', 's'"
                    ))),
                }
            }
            Builtin::Size => size_filter(arg).map_err(invalid),
            Builtin::Perm => perm_filter(arg).map_err(invalid),
            Builtin::Xattr => {
                if arg.is_empty() {
                    return Err(invalid(String::from("empty attribute name")));
                }
                Ok(Filter::compare(
                    Field::Xattr(arg.to_owned()),
                    Operator::Exists,
                    Value::Bool(true),
                ))
            }
            Builtin::Uid => numeric_filter(Field::Uid, arg).map_err(invalid),
            Builtin::Gid => numeric_filter(Field::Gid, arg).map_err(invalid),
            Builtin::Inum => numeric_filter(Field::Ino, arg).map_err(invalid),
            Builtin::Links => numeric_filter(Field::Nlink, arg).map_err(invalid),
            Builtin::Blocks => {
                numeric_filter(Field::Blocks, arg).map_err(invalid)
            }
            Builtin::Amin => {
                time_filter(Field::Atime, arg, TimeUnit::Minutes, context.now)
                    .map_err(invalid)
            }
            Builtin::Cmin => {
                time_filter(Field::Ctime, arg, TimeUnit::Minutes, context.now)
                    .map_err(invalid)
            }
            Builtin::Mmin => {
                time_filter(Field::Mtime, arg, TimeUnit::Minutes, context.now)
                    .map_err(invalid)
            }
            Builtin::Atime => {
                time_filter(Field::Atime, arg, TimeUnit::Days, context.now)
                    .map_err(invalid)
            }
            Builtin::Ctime => {
                time_filter(Field::Ctime, arg, TimeUnit::Days, context.now)
                    .map_err(invalid)
            }
            Builtin::Mtime => {
                time_filter(Field::Mtime, arg, TimeUnit::Days, context.now)
                    .map_err(invalid)
            }
            Builtin::Empty | Builtin::Compare => {
                Err(Error::MissingArgument { token: token.to_owned() })
            }
        }
    }
}

fn type_filter(kind: FileKind) -> Filter {
    Filter::compare(
        Field::Type,
        Operator::Equal,
        Value::String(kind.letter().to_string()),
    )
}

fn compile(token: &str, source: &str, pattern: &str, case_insensitive: bool)
    -> Result<Pattern, Error>
{
    Pattern::new(source, case_insensitive).map_err(|error| {
        Error::InvalidPattern {
            token: token.to_owned(),
            pattern: pattern.to_owned(),
            source: error,
        }
    })
}

fn glob_filter(token: &str, field: Field, glob: &str, case_insensitive: bool)
    -> Result<Filter, Error>
{
    let pattern = compile(token, &glob_to_regex(glob), glob, case_insensitive)?;
    Ok(Filter::compare(field, Operator::Regex, Value::Pattern(pattern)))
}

fn regex_filter(token: &str, field: Field, regex: &str, case_insensitive: bool)
    -> Result<Filter, Error>
{
    let pattern = compile(token, regex, regex, case_insensitive)?;
    Ok(Filter::compare(field, Operator::Regex, Value::Pattern(pattern)))
}

/// Builds a leaf from `-compare FIELD OP VALUE`.
fn compare_filter(token: &str, args: &[String]) -> Result<Filter, Error> {
    let (field, op, value) = match args {
        [field, op, value] => (field, op, value),
        _ => return Err(Error::MissingArgument { token: token.to_owned() }),
    };
    let invalid = |argument: &str, reason: &str| {
        Error::invalid_argument(token, argument, reason)
    };

    let parsed_field = field.parse::<Field>()
        .map_err(|_| invalid(field, "unknown field"))?;
    let parsed_op = op.parse::<Operator>()
        .map_err(|_| invalid(op, "unknown operator"))?;

    let parsed_value = match parsed_op {
        Operator::Regex => {
            let pattern = compile(token, value, value, op == "=~i")?;
            Value::Pattern(pattern)
        }
        Operator::Exists => match value.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid(value, "expected 'true' or 'false'")),
        },
        Operator::AllSet | Operator::AnySet => match value.parse::<u64>() {
            Ok(mask) => Value::Unsigned(mask),
            Err(_) => return Err(invalid(value, "expected a bit mask")),
        },
        _ => match parsed_field.kind() {
            FieldKind::Text => Value::String(value.clone()),
            FieldKind::Unsigned => match value.parse::<u64>() {
                Ok(number) => Value::Unsigned(number),
                Err(_) => return Err(invalid(value, "expected an unsigned integer")),
            },
            FieldKind::Timestamp => match value.parse::<i64>() {
                Ok(number) => Value::Integer(number),
                Err(_) => return Err(invalid(value, "expected a timestamp")),
            },
        },
    };

    Ok(Filter::compare(parsed_field, parsed_op, parsed_value))
}

/// Maps predicate tokens to their builders.
///
/// Starts with the builtin predicates; backends add their own with
/// [`Registry::register`] before any argument is classified.
///
/// Cloning is cheap: builders are shared between the clones.
#[derive(Clone)]
pub struct Registry {
    builders: HashMap<String, Rc<dyn PredicateBuilder>>,
}

impl Registry {

    pub fn new() -> Registry {
        let mut registry = Registry { builders: HashMap::new() };
        for builtin in BUILTINS {
            registry.register(Box::new(*builtin));
        }
        registry
    }

    /// Adds a predicate, replacing any previous one with the same token.
    pub fn register(&mut self, builder: Box<dyn PredicateBuilder>) {
        let token = builder.token().to_owned();
        if self.builders.insert(token.clone(), Rc::from(builder)).is_some() {
            debug!("predicate '{}' overridden", token);
        }
    }

    pub fn get(&self, token: &str) -> Option<&dyn PredicateBuilder> {
        self.builders.get(token).map(|builder| &**builder)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.builders.contains_key(token)
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::matches_locally;
    use crate::fs::{Entry, Stat};

    fn build(token: &str, args: &[&str]) -> Result<Filter, Error> {
        let registry = Registry::new();
        let builder = registry.get(token).unwrap();
        let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
        builder.build(&args, &BuildContext::new(1_000_000))
    }

    fn entry(path: &str, kind: FileKind, size: u64) -> Entry {
        Entry::new(path, Stat { kind, size, ..Stat::default() })
    }

    #[test]
    fn test_name_and_iname() {
        let report = entry("/report.TXT", FileKind::File, 1);
        let name = build("-name", &["*.txt"]).unwrap();
        let iname = build("-iname", &["*.txt"]).unwrap();
        assert!(!matches_locally(&name, &report));
        assert!(matches_locally(&iname, &report));
        assert!(matches_locally(&name, &entry("/report.txt", FileKind::File, 1)));
    }

    #[test]
    fn test_path_glob_spans_directories() {
        let filter = build("-path", &["/a/*/c"]).unwrap();
        assert!(matches_locally(&filter, &entry("/a/b/c", FileKind::File, 1)));
        assert!(matches_locally(&filter, &entry("/a/b/x/c", FileKind::File, 1)));
        assert!(!matches_locally(&filter, &entry("/a/c", FileKind::File, 1)));
    }

    #[test]
    fn test_type() {
        let filter = build("-type", &["d"]).unwrap();
        assert!(matches_locally(&filter, &entry("/d", FileKind::Directory, 0)));
        assert!(!matches_locally(&filter, &entry("/f", FileKind::File, 0)));
        assert!(build("-type", &["x"]).is_err());
        assert!(build("-type", &["fd"]).is_err());
        assert!(build("-type", &[""]).is_err());
    }

    #[test]
    fn test_empty() {
        let filter = build("-empty", &[]).unwrap();
        assert!(matches_locally(&filter, &entry("/f", FileKind::File, 0)));
        assert!(!matches_locally(&filter, &entry("/f", FileKind::File, 1)));
        assert!(!matches_locally(&filter, &entry("/d", FileKind::Directory, 0)));
    }

    #[test]
    fn test_xattr() {
        let mut tagged = entry("/f", FileKind::File, 0);
        tagged.xattrs.insert("user.tier".to_owned(), "cold".to_owned());
        let filter = build("-xattr", &["user.tier"]).unwrap();
        assert!(matches_locally(&filter, &tagged));
        assert!(!matches_locally(&filter, &entry("/g", FileKind::File, 0)));
        assert!(build("-xattr", &[""]).is_err());
    }

    #[test]
    fn test_invalid_arguments_name_the_token() {
        match build("-size", &["12q"]) {
            Err(Error::InvalidArgument { token, argument, .. }) => {
                assert_eq!(token, "-size");
                assert_eq!(argument, "12q");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match build("-name", &["[abc"]) {
            Err(Error::InvalidPattern { token, pattern, .. }) => {
                assert_eq!(token, "-name");
                assert_eq!(pattern, "[abc");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            build("-compare", &["size", ">=", "10"]).unwrap(),
            Filter::compare(Field::Size, Operator::GreaterOrEqual,
                            Value::Unsigned(10))
        );
        assert_eq!(
            build("-compare", &["mtime", "<", "-5"]).unwrap(),
            Filter::compare(Field::Mtime, Operator::Less, Value::Integer(-5))
        );
        assert_eq!(
            build("-compare", &["xattr:user.tier", "==", "cold"]).unwrap(),
            Filter::compare(Field::Xattr("user.tier".to_owned()),
                            Operator::Equal,
                            Value::String("cold".to_owned()))
        );
        assert!(build("-compare", &["size", "==", "big"]).is_err());
        assert!(build("-compare", &["bogus", "==", "1"]).is_err());
        assert!(build("-compare", &["size", "~", "1"]).is_err());
        assert!(build("-compare", &["name", "exists", "maybe"]).is_err());
    }

    #[test]
    fn test_register_backend_predicate() {
        struct Owner;

        impl PredicateBuilder for Owner {
            fn token(&self) -> &str {
                "-owner"
            }

            fn build(&self, args: &[String], _: &BuildContext)
                -> Result<Filter, Error>
            {
                Ok(Filter::compare(Field::Xattr("user.owner".to_owned()),
                                   Operator::Equal,
                                   Value::String(args[0].clone())))
            }
        }

        let mut registry = Registry::new();
        assert!(!registry.contains("-owner"));
        registry.register(Box::new(Owner));
        assert!(registry.contains("-owner"));
        assert_eq!(registry.get("-owner").unwrap().arity(), 1);
    }
}
