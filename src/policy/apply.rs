// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::io::Write;
use std::process::{Command, ExitStatus};

use log::{debug, info, warn};

use crate::backend::{self, Backend};
use crate::fs::Entry;
use crate::policy::action::{ActionKind, Prepared};

/// A failure of one action on one entry. Never fatal to a run.
#[derive(Debug)]
pub enum ApplyError {
    /// The live backend cannot perform the action.
    NotSupported {
        action: ActionKind,
        backend: String,
    },
    Backend(backend::Error),
    /// The external command could not be started.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The external command ran but failed.
    Status {
        command: String,
        status: ExitStatus,
    },
    Output(std::io::Error),
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplyError::Backend(error) => Some(error),
            ApplyError::Spawn { source, .. } => Some(source),
            ApplyError::Output(error) => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ApplyError::*;

        match *self {
            NotSupported { action, ref backend } => write!(
                fmt,
                "action '{}' is not supported by the {} backend",
                action,
                backend
            ),
            Backend(ref error) => write!(fmt, "{}", error),
            Spawn { ref command, ref source } => {
                write!(fmt, "cannot run '{}': {}", command, source)
            }
            Status { ref command, status } => {
                write!(fmt, "'{}' failed: {}", command, status)
            }
            Output(ref error) => write!(fmt, "failed to write output: {}", error),
        }
    }
}

impl From<backend::Error> for ApplyError {
    fn from(error: backend::Error) -> ApplyError {
        match error {
            backend::Error::Unsupported { backend, operation } => {
                let action = match operation {
                    "migrate" => ActionKind::Migrate,
                    _ => ActionKind::Delete,
                };
                ApplyError::NotSupported { action, backend }
            }
            error => ApplyError::Backend(error),
        }
    }
}

/// Applies `action` to `entry`.
///
/// Deletions and migrations act on the `live` backend and are then mirrored
/// to the `index` when it supports them. With `dry_run`, actions
/// changing data are only logged.
pub fn apply(
    action: &Prepared,
    entry: &Entry,
    index: &mut dyn Backend,
    live: &mut dyn Backend,
    out: &mut dyn Write,
    dry_run: bool,
) -> Result<(), ApplyError> {
    if !action.kind.is_supported(&live.capabilities()) {
        return Err(ApplyError::NotSupported {
            action: action.kind,
            backend: live.name().to_owned(),
        });
    }

    if dry_run && action.kind.is_destructive() {
        info!("[{}] would apply '{}' to '{}'", action.rule, action.kind,
              entry.path);
        return Ok(());
    }

    match action.kind {
        ActionKind::Delete => {
            live.remove(entry)?;
            if index.capabilities().delete {
                if let Err(error) = index.remove(entry) {
                    warn!("'{}' deleted but still indexed: {}", entry.path, error);
                }
            }
            Ok(())
        }
        ActionKind::Migrate => {
            live.migrate(entry, &action.parameters)?;
            if index.capabilities().migrate {
                if let Err(error) = index.migrate(entry, &action.parameters) {
                    warn!("'{}' migrated but not reindexed: {}", entry.path, error);
                }
            }
            Ok(())
        }
        ActionKind::Command => run_command(action, entry, live),
        ActionKind::Log => {
            info!("[{}] {}", action.rule, entry.path);
            Ok(())
        }
        ActionKind::Print => {
            writeln!(out, "{}", entry.path).map_err(ApplyError::Output)
        }
        ActionKind::Count | ActionKind::Noop => Ok(()),
    }
}

fn run_command(
    action: &Prepared,
    entry: &Entry,
    live: &dyn Backend,
) -> Result<(), ApplyError> {
    let path = match live.absolute_path(entry) {
        Some(path) => path.to_string_lossy().into_owned(),
        None => entry.path.clone(),
    };

    let argv = action
        .argv
        .iter()
        .map(|arg| arg.replace("{}", &path))
        .collect::<Vec<_>>();
    let command = argv.join(" ");

    let (program, args) = match argv.split_first() {
        Some(split) => split,
        None => {
            return Err(ApplyError::Spawn {
                command,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput, "empty command"),
            })
        }
    };

    debug!("running '{}'", command);
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| ApplyError::Spawn {
            command: command.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ApplyError::Status { command, status })
    }
}
