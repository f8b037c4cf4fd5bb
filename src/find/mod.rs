// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! The find command: query expressions with actions over one or more
//! backends.
//!
//! Leading arguments name the backends to search. The rest is a query
//! expression interleaved with actions. Each action runs over the entries
//! matching the expression parsed before it; a `-o` right after an action
//! restricts what follows to the entries that expression did not match.

pub mod action;
pub mod ls;
pub mod printf;

use std::fs::File;
use std::io::{BufWriter, Write};

use log::{debug, error, info};

use crate::backend::{self, collect_entries, Backend, Fetch, FilterOptions};
use crate::backend::{Projection, Uri};
use crate::filter::{and_optional, Filter, Sort};
use crate::fs::Entry;
use crate::query::{self, classify, BuildContext, Parsed, Parser, Registry};
use crate::query::Token;

pub use self::action::{FindAction, Output, Sink};

/// An error type for failures of the find command.
#[derive(Debug)]
pub enum Error {
    /// The expression is malformed.
    Query(query::Error),
    Backend(backend::Error),
    /// Writing the output of an action failed.
    Io(std::io::Error),
    /// The action is recognised but not supported.
    Reserved(String),
    /// Some entries could not be deleted.
    Failures(usize),
}

impl Error {

    /// Whether the error is a mistake on the command line.
    pub fn is_usage(&self) -> bool {
        match self {
            Error::Query(_) => true,
            Error::Backend(backend::Error::InvalidUri { .. }) => true,
            _ => false,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(error) => Some(error),
            Error::Backend(error) => Some(error),
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Error::*;

        match *self {
            Query(ref error) => write!(fmt, "{}", error),
            Backend(ref error) => write!(fmt, "{}", error),
            Io(ref error) => write!(fmt, "failed to write output: {}", error),
            Reserved(ref token) => {
                write!(fmt, "action '{}' is not implemented", token)
            }
            Failures(count) => {
                write!(fmt, "failed to delete {} entries", count)
            }
        }
    }
}

impl From<query::Error> for Error {
    fn from(error: query::Error) -> Error {
        Error::Query(error)
    }
}

impl From<backend::Error> for Error {
    fn from(error: backend::Error) -> Error {
        Error::Backend(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::Io(error)
    }
}

/// Splits `args` into the leading backend URIs and the expression.
///
/// Without any URI, the current directory is searched.
pub fn split_uris(args: &[String]) -> Result<(Vec<Uri>, &[String]), Error> {
    let registry = Registry::new();
    let count = args
        .iter()
        .take_while(|arg| classify(arg, &registry) == Token::Uri)
        .count();

    let mut uris = args[..count]
        .iter()
        .map(|arg| arg.parse::<Uri>())
        .collect::<Result<Vec<_>, _>>()?;
    if uris.is_empty() {
        uris.push(Uri::Posix(".".into()));
    }

    Ok((uris, &args[count..]))
}

/// Runs a find command line, writing standard output to `out`.
pub fn run(
    args: &[String],
    context: BuildContext,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let (uris, expression) = split_uris(args)?;

    let backends = uris
        .iter()
        .map(backend::open)
        .collect::<Result<Vec<_>, _>>()?;
    run_on(backends, expression, context, out)
}

/// Runs a find expression over already opened backends.
pub fn run_on(
    backends: Vec<Box<dyn Backend>>,
    expression: &[String],
    context: BuildContext,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let mut registry = Registry::new();
    for backend in &backends {
        for predicate in backend.predicates() {
            registry.register(predicate);
        }
    }

    let mut executor = Executor {
        backends,
        out,
        now: context.now,
        failures: 0,
    };
    let mut parser = Parser::new(expression, &registry, context);

    // Entries left to later actions, and the expression accumulated since
    // the last `-o`.
    let mut outer: Option<Filter> = None;
    let mut term: Option<Filter> = None;
    let mut acted = false;

    loop {
        match parser.parse()? {
            Parsed::Complete { filter, .. } => {
                if !acted {
                    let filter = and_optional(outer, and_optional(term, filter));
                    executor.execute(filter.as_ref(), parser.sorts(),
                                     &FindAction::print())?;
                }
                break;
            }
            Parsed::Action { filter, action, .. } => {
                let find_action = FindAction::from_token(&action)?;
                term = and_optional(term, filter);
                acted = true;

                let filter = and_optional(outer.clone(), term.clone());
                let flow = executor.execute(filter.as_ref(), parser.sorts(),
                                            &find_action)?;
                if let Flow::Quit = flow {
                    break;
                }

                if let Some(Token::Or) = parser.resume_operator() {
                    if parser.is_done() {
                        return Err(query::Error::MissingOperand {
                            operator: expression[parser.cursor() - 1].clone(),
                        }.into());
                    }
                    match term.take() {
                        Some(term) => {
                            outer = and_optional(outer, Some(Filter::not(term)))
                        }
                        // Everything was matched already.
                        None => break,
                    }
                }
                if parser.is_done() {
                    break;
                }
            }
        }
    }

    executor.finish()
}

enum Flow {
    Continue,
    Quit,
}

struct Executor<'w> {
    backends: Vec<Box<dyn Backend>>,
    out: &'w mut dyn Write,
    /// Reference instant of `-ls` timestamps.
    now: i64,
    failures: usize,
}

impl<'w> Executor<'w> {

    fn execute(
        &mut self,
        filter: Option<&Filter>,
        sort: &[Sort],
        action: &FindAction,
    ) -> Result<Flow, Error> {
        debug!("running {:?} on {}", action,
               filter.map_or(String::from("everything"), Filter::to_string));

        let options = FilterOptions {
            one: *action == FindAction::Quit,
            sort: sort.to_vec(),
            ..FilterOptions::default()
        };

        match action {
            FindAction::Write { sink: Sink::Stdout, output } => {
                let out = &mut *self.out;
                Self::write(&self.backends, filter, &options, output, self.now,
                            out)?;
            }
            FindAction::Write { sink: Sink::File(path), output } => {
                let file = File::create(path)?;
                let mut out = BufWriter::new(file);
                Self::write(&self.backends, filter, &options, output, self.now,
                            &mut out)?;
                out.flush()?;
            }
            FindAction::Count => {
                let mut count = 0;
                for backend in &self.backends {
                    let mut iter = backend.filter(filter, &options,
                                                  &Projection::all())?;
                    count += for_each(iter.as_mut(), |_| Ok(()))?;
                }
                writeln!(self.out, "{} matching entries", count)?;
            }
            FindAction::Delete => self.delete(filter, &options)?,
            FindAction::Quit => {
                for backend in &self.backends {
                    let mut iter = backend.filter(filter, &options,
                                                  &Projection::all())?;
                    if for_each(iter.as_mut(), |_| Ok(()))? > 0 {
                        return Ok(Flow::Quit);
                    }
                }
            }
        }

        Ok(Flow::Continue)
    }

    fn write(
        backends: &[Box<dyn Backend>],
        filter: Option<&Filter>,
        options: &FilterOptions,
        output: &Output,
        now: i64,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        for backend in backends {
            let mut iter = backend.filter(filter, options, &Projection::all())?;
            for_each(iter.as_mut(), |entry| {
                match output {
                    Output::Path(terminator) => {
                        out.write_all(entry.path.as_bytes())?;
                        out.write_all(&[*terminator])?;
                    }
                    Output::Ls => writeln!(out, "{}", ls::format_ls(&entry, now))?,
                    Output::Printf(format) => {
                        out.write_all(format.render(&entry).as_bytes())?
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Deletes matching entries, deepest first so that directories are
    /// emptied before their own removal.
    fn delete(
        &mut self,
        filter: Option<&Filter>,
        options: &FilterOptions,
    ) -> Result<(), Error> {
        for backend in self.backends.iter_mut() {
            let mut entries = {
                let mut iter = backend.filter(filter, options,
                                              &Projection::all())?;
                collect_entries(iter.as_mut())?
            };
            entries.sort_by_key(|entry| std::cmp::Reverse(entry.depth()));

            for entry in entries {
                if entry.path == "/" {
                    debug!("not deleting the root of '{}'", backend.name());
                    continue;
                }
                if let Err(error) = backend.remove(&entry) {
                    error!("cannot delete '{}': {}", entry.path, error);
                    self.failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Flushes the output and the backends.
    fn finish(mut self) -> Result<(), Error> {
        self.out.flush()?;
        for backend in self.backends.iter_mut() {
            backend.flush()?;
        }

        if self.failures > 0 {
            return Err(Error::Failures(self.failures));
        }
        info!("find completed");
        Ok(())
    }
}

/// Calls `f` on every entry of `iter` and returns how many there were.
fn for_each<F>(iter: &mut dyn backend::EntryIter, mut f: F) -> Result<usize, Error>
where
    F: FnMut(Entry) -> Result<(), Error>,
{
    let mut count = 0;
    loop {
        match iter.fetch() {
            Fetch::Entry(entry) => {
                f(entry)?;
                count += 1;
            }
            Fetch::Again => std::thread::yield_now(),
            Fetch::End => return Ok(count),
            Fetch::Error(error) => return Err(error.into()),
        }
    }
}
