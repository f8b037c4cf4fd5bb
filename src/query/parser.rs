// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Recursive-descent parser for find-style expressions.
//!
//! The grammar, with `OR` binding loosest and adjacency meaning `AND`:
//!
//! ```text
//! expr   := term (OR term)*
//! term   := factor (AND? factor)*
//! factor := NOT factor | '(' expr ')' | predicate
//! ```
//!
//! Parsing stops at the end of the arguments or at the first action token.
//! Sort directives may appear wherever a factor may and do not contribute to
//! the filter.

use log::trace;

use crate::filter::{Field, Filter, Sort};
use crate::query::error::Error;
use crate::query::predicate::{BuildContext, Registry};
use crate::query::token::{action_arity, classify, Arity, Token};

/// An action token together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub name: String,
    pub args: Vec<String>,
}

/// Outcome of parsing one expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// The arguments ran out. `filter` is `None` for an empty expression.
    Complete {
        filter: Option<Filter>,
        cursor: usize,
    },
    /// The expression was ended by an action, which is already consumed.
    Action {
        filter: Option<Filter>,
        action: ActionToken,
        cursor: usize,
    },
}

/// Fields `-sort` and `-rsort` accept.
const SORT_FIELDS: &[&str] = &[
    "atime", "blocks", "ctime", "ino", "mtime", "name", "path", "size", "type",
];

pub struct Parser<'a> {
    args: &'a [String],
    cursor: usize,
    registry: &'a Registry,
    context: BuildContext,
    sorts: Vec<Sort>,
}

impl<'a> Parser<'a> {

    pub fn new(
        args: &'a [String],
        registry: &'a Registry,
        context: BuildContext,
    ) -> Parser<'a> {
        Parser {
            args,
            cursor: 0,
            registry,
            context,
            sorts: vec![],
        }
    }

    /// Position of the next unconsumed argument.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.args.len()
    }

    /// Sort directives seen so far, in order.
    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn into_sorts(self) -> Vec<Sort> {
        self.sorts
    }

    /// Parses an expression from the cursor up to the end of the arguments
    /// or the first action.
    pub fn parse(&mut self) -> Result<Parsed, Error> {
        let filter = self.expr()?;

        match self.peek() {
            None => Ok(Parsed::Complete {
                filter,
                cursor: self.cursor,
            }),
            Some(Token::Action) => {
                let action = self.action()?;
                trace!("expression ended by action '{}'", action.name);
                Ok(Parsed::Action {
                    filter,
                    action,
                    cursor: self.cursor,
                })
            }
            Some(_) => Err(Error::UnbalancedClose),
        }
    }

    /// Consumes a `-o` or `-a` directly following an action and returns it.
    pub fn resume_operator(&mut self) -> Option<Token> {
        match self.peek() {
            Some(token @ Token::Or) | Some(token @ Token::And) => {
                self.cursor += 1;
                Some(token)
            }
            _ => None,
        }
    }

    fn peek(&self) -> Option<Token> {
        self.args
            .get(self.cursor)
            .map(|arg| classify(arg, self.registry))
    }

    fn current(&self) -> String {
        self.args.get(self.cursor).cloned().unwrap_or_default()
    }

    fn expr(&mut self) -> Result<Option<Filter>, Error> {
        let mut terms = vec![];
        if let Some(term) = self.term()? {
            terms.push(term);
        }

        while let Some(Token::Or) = self.peek() {
            let operator = self.current();
            if terms.is_empty() {
                return Err(Error::MissingOperand { operator });
            }
            self.cursor += 1;

            match self.term()? {
                Some(term) => terms.push(term),
                None => return Err(Error::MissingOperand { operator }),
            }
        }

        Ok(Filter::any(terms))
    }

    fn term(&mut self) -> Result<Option<Filter>, Error> {
        let mut factors = vec![];

        loop {
            match self.peek() {
                None | Some(Token::Close) | Some(Token::Action)
                | Some(Token::Or) => break,
                Some(Token::And) => {
                    let operator = self.current();
                    self.cursor += 1;
                    if factors.is_empty() || !self.at_factor() {
                        return Err(Error::MissingOperand { operator });
                    }
                }
                Some(Token::Sort) => self.sort(true)?,
                Some(Token::ReverseSort) => self.sort(false)?,
                Some(_) => factors.push(self.factor()?),
            }
        }

        Ok(Filter::all(factors))
    }

    fn at_factor(&self) -> bool {
        match self.peek() {
            Some(Token::Not) | Some(Token::Open) | Some(Token::Predicate)
            | Some(Token::Uri) => true,
            _ => false,
        }
    }

    fn factor(&mut self) -> Result<Filter, Error> {
        let token = self.current();

        match self.peek() {
            Some(Token::Not) => {
                self.cursor += 1;
                if !self.at_factor() {
                    return Err(Error::MissingOperand { operator: token });
                }
                Ok(Filter::not(self.factor()?))
            }
            Some(Token::Open) => {
                self.cursor += 1;
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::Close) => self.cursor += 1,
                    _ => return Err(Error::UnbalancedOpen),
                }
                inner.ok_or(Error::EmptyParentheses)
            }
            Some(Token::Predicate) => self.predicate(),
            Some(Token::Uri) => Err(Error::PathAfterExpression { token }),
            _ => Err(Error::MissingOperand { operator: token }),
        }
    }

    fn predicate(&mut self) -> Result<Filter, Error> {
        let token = &self.args[self.cursor];
        let builder = match self.registry.get(token) {
            Some(builder) => builder,
            None => return Err(Error::UnknownAction { token: token.clone() }),
        };

        let start = self.cursor + 1;
        let end = start + builder.arity();
        if end > self.args.len() {
            return Err(Error::MissingArgument { token: token.clone() });
        }

        let filter = builder.build(&self.args[start..end], &self.context)?;
        self.cursor = end;
        Ok(filter)
    }

    fn action(&mut self) -> Result<ActionToken, Error> {
        let name = self.current();
        let start = self.cursor + 1;

        let end = match action_arity(&name) {
            Some(Arity::Fixed(count)) => start + count,
            Some(Arity::Command) => {
                match command_end(&self.args[start..]) {
                    Some(length) => start + length,
                    None => return Err(Error::MissingArgument { token: name }),
                }
            }
            None => return Err(Error::UnknownAction { token: name }),
        };
        if end > self.args.len() {
            return Err(Error::MissingArgument { token: name });
        }

        let args = self.args[start..end].to_vec();
        self.cursor = end;
        Ok(ActionToken { name, args })
    }

    fn sort(&mut self, ascending: bool) -> Result<(), Error> {
        let token = self.current();
        let name = match self.args.get(self.cursor + 1) {
            Some(name) => name,
            None => return Err(Error::MissingArgument { token }),
        };

        if !SORT_FIELDS.contains(&name.as_str()) {
            return Err(Error::invalid_argument(
                &token, name, "not a sortable field"
            ));
        }
        let field = name.parse::<Field>().map_err(|_| {
            Error::invalid_argument(&token, name, "not a sortable field")
        })?;

        self.sorts.push(Sort { field, ascending });
        self.cursor += 2;
        Ok(())
    }
}

/// Returns the number of arguments of an `-exec`-like action, terminator
/// included.
fn command_end(args: &[String]) -> Option<usize> {
    for (index, arg) in args.iter().enumerate() {
        if arg == ";" {
            return Some(index + 1);
        }
        if arg == "+" && index > 0 && args[index - 1] == "{}" {
            return Some(index + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Operator, Value};

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    fn parse(line: &str) -> Result<Parsed, Error> {
        let registry = Registry::new();
        let args = args(line);
        Parser::new(&args, &registry, BuildContext::new(0)).parse()
    }

    fn parse_filter(line: &str) -> Option<Filter> {
        match parse(line).unwrap() {
            Parsed::Complete { filter, .. } => filter,
            Parsed::Action { .. } => panic!("unexpected action"),
        }
    }

    fn uid(n: u64) -> Filter {
        Filter::compare(Field::Uid, Operator::Equal, Value::Unsigned(n))
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse_filter(""), None);
    }

    #[test]
    fn test_implicit_and() {
        assert_eq!(parse_filter("-uid 1 -uid 2"),
                   Some(Filter::And(vec![uid(1), uid(2)])));
        assert_eq!(parse_filter("-uid 1 -a -uid 2"),
                   Some(Filter::And(vec![uid(1), uid(2)])));
    }

    #[test]
    fn test_or_binds_loosest() {
        assert_eq!(
            parse_filter("-uid 1 -uid 2 -o -uid 3"),
            Some(Filter::Or(vec![
                Filter::And(vec![uid(1), uid(2)]),
                uid(3),
            ]))
        );
    }

    #[test]
    fn test_not_and_parentheses() {
        assert_eq!(
            parse_filter("! ( -uid 1 -or -uid 2 ) -uid 3"),
            Some(Filter::And(vec![
                Filter::not(Filter::Or(vec![uid(1), uid(2)])),
                uid(3),
            ]))
        );
        assert_eq!(parse_filter("-not -not -uid 1"),
                   Some(Filter::not(Filter::not(uid(1)))));
        assert_eq!(parse_filter("( ( -uid 1 ) )"), Some(uid(1)));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(matches!(parse("( -name x"), Err(Error::UnbalancedOpen)));
        assert!(matches!(parse("-name x )"), Err(Error::UnbalancedClose)));
        assert!(matches!(parse("( -name x -print )"),
                         Err(Error::UnbalancedOpen)));
        assert!(matches!(parse("( )"), Err(Error::EmptyParentheses)));
    }

    #[test]
    fn test_missing_operands() {
        assert!(matches!(parse("-o -uid 1"), Err(Error::MissingOperand { .. })));
        assert!(matches!(parse("-uid 1 -o"), Err(Error::MissingOperand { .. })));
        assert!(matches!(parse("-a -uid 1"), Err(Error::MissingOperand { .. })));
        assert!(matches!(parse("-uid 1 -a"), Err(Error::MissingOperand { .. })));
        assert!(matches!(parse("-uid 1 -a -o -uid 2"),
                         Err(Error::MissingOperand { .. })));
        assert!(matches!(parse("!"), Err(Error::MissingOperand { .. })));
    }

    #[test]
    fn test_missing_argument() {
        match parse("-uid 1 -name") {
            Err(Error::MissingArgument { token }) => assert_eq!(token, "-name"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(parse("-compare size =="),
                         Err(Error::MissingArgument { .. })));
        assert!(matches!(parse("-fprint"), Err(Error::MissingArgument { .. })));
        assert!(matches!(parse("-exec rm {}"),
                         Err(Error::MissingArgument { .. })));
    }

    #[test]
    fn test_unknown_action() {
        match parse("-uid 1 -frobnicate") {
            Err(Error::UnknownAction { token }) => {
                assert_eq!(token, "-frobnicate")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_path_after_expression() {
        assert!(matches!(parse("-uid 1 /tmp"),
                         Err(Error::PathAfterExpression { .. })));
    }

    #[test]
    fn test_action_ends_expression() {
        let args = args("-uid 1 -fprint out.txt -o -uid 2 -print");
        let registry = Registry::new();
        let mut parser = Parser::new(&args, &registry, BuildContext::new(0));

        assert_eq!(parser.parse().unwrap(), Parsed::Action {
            filter: Some(uid(1)),
            action: ActionToken {
                name: String::from("-fprint"),
                args: vec![String::from("out.txt")],
            },
            cursor: 4,
        });
        assert_eq!(parser.resume_operator(), Some(Token::Or));
        assert_eq!(parser.parse().unwrap(), Parsed::Action {
            filter: Some(uid(2)),
            action: ActionToken {
                name: String::from("-print"),
                args: vec![],
            },
            cursor: 8,
        });
        assert!(parser.is_done());
    }

    #[test]
    fn test_exec_arguments() {
        match parse("-exec rm {} ; -uid 1").unwrap() {
            Parsed::Action { action, cursor, .. } => {
                assert_eq!(action.args, args("rm {} ;"));
                assert_eq!(cursor, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sort_directives() {
        let args = args("-sort size -uid 1 -rsort name");
        let registry = Registry::new();
        let mut parser = Parser::new(&args, &registry, BuildContext::new(0));

        assert_eq!(parser.parse().unwrap(), Parsed::Complete {
            filter: Some(uid(1)),
            cursor: 6,
        });
        assert_eq!(parser.into_sorts(), vec![
            Sort { field: Field::Size, ascending: true },
            Sort { field: Field::Name, ascending: false },
        ]);

        assert!(matches!(parse("-sort"), Err(Error::MissingArgument { .. })));
        assert!(matches!(parse("-sort uid"),
                         Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_round_trip() {
        let lines = [
            "-name *.txt",
            "-iname *.TXT -o -size +1M",
            "! ( -uid 1 -o -gid 2 ) -perm /u+x",
            "-amin 5 -type f -empty",
            "( -uid 1 -uid 2 ) -o ( -uid 3 ! -uid 4 )",
            "-xattr user.tier -path /a/* -regex ^/a.*b$",
            "-not -not -links +2",
            "-compare mtime <= -10 -o -mtime -3",
        ];

        for line in lines.iter() {
            let filter = parse_filter(line).unwrap();
            let printed = filter.to_args();

            let registry = Registry::new();
            let mut parser =
                Parser::new(&printed, &registry, BuildContext::new(0));
            match parser.parse().unwrap() {
                Parsed::Complete { filter: reparsed, .. } => {
                    assert_eq!(reparsed, Some(filter), "line: {}", line);
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}
