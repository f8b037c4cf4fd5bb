// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::path::PathBuf;

use crate::find::printf::Format;
use crate::find::Error;
use crate::query::{ActionToken, Error as QueryError};

/// Where an action writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    File(PathBuf),
}

/// What an action does with each matching entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// The path followed by the given terminator.
    Path(u8),
    Ls,
    Printf(Format),
}

/// An action of the find command line, with its arguments resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindAction {
    Write { sink: Sink, output: Output },
    /// Counts matching entries and reports the total once done.
    Count,
    Delete,
    /// Stops everything at the first matching entry.
    Quit,
}

/// Actions that are recognised but not implemented.
const RESERVED: &[&str] = &["-exec", "-execdir", "-ok", "-okdir", "-prune"];

impl FindAction {

    pub fn from_token(token: &ActionToken) -> Result<FindAction, Error> {
        let name = token.name.as_str();
        if RESERVED.contains(&name) {
            return Err(Error::Reserved(token.name.clone()));
        }

        let arg = |index: usize| {
            token.args.get(index).ok_or_else(|| QueryError::MissingArgument {
                token: token.name.clone(),
            })
        };
        let file = |index: usize| -> Result<Sink, QueryError> {
            Ok(Sink::File(PathBuf::from(arg(index)?)))
        };
        let format = |index: usize| -> Result<Format, QueryError> {
            let format = arg(index)?;
            Format::parse(format).map_err(|reason| {
                QueryError::invalid_argument(name, format, reason)
            })
        };

        let action = match name {
            "-print" => FindAction::Write {
                sink: Sink::Stdout,
                output: Output::Path(b'\n'),
            },
            "-print0" => FindAction::Write {
                sink: Sink::Stdout,
                output: Output::Path(b'\0'),
            },
            "-fprint" => FindAction::Write {
                sink: file(0)?,
                output: Output::Path(b'\n'),
            },
            "-fprint0" => FindAction::Write {
                sink: file(0)?,
                output: Output::Path(b'\0'),
            },
            "-ls" => FindAction::Write {
                sink: Sink::Stdout,
                output: Output::Ls,
            },
            "-fls" => FindAction::Write {
                sink: file(0)?,
                output: Output::Ls,
            },
            "-printf" => FindAction::Write {
                sink: Sink::Stdout,
                output: Output::Printf(format(0)?),
            },
            "-fprintf" => FindAction::Write {
                sink: file(0)?,
                output: Output::Printf(format(1)?),
            },
            "-count" => FindAction::Count,
            "-delete" => FindAction::Delete,
            "-quit" => FindAction::Quit,
            _ => {
                return Err(QueryError::UnknownAction {
                    token: token.name.clone(),
                }.into())
            }
        };

        Ok(action)
    }

    /// Default action of an expression without any.
    pub fn print() -> FindAction {
        FindAction::Write {
            sink: Sink::Stdout,
            output: Output::Path(b'\n'),
        }
    }
}
