// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! The policy execution loop.
//!
//! Entries flow from the index through a small state machine: each one is
//! re-read from the live backend, matched against the rules, given an
//! action and finally acted upon. Per-entry problems are logged and
//! skipped; only a hard failure of the index iterator aborts the run.

use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::backend::{self, Backend, EntryIter, Fetch, FilterOptions, Projection};
use crate::fs::Entry;
use crate::policy::action::{select_action, ActionCache, ActionKind, KindState};
use crate::policy::action::Prepared;
use crate::policy::apply::apply;
use crate::policy::{select_rule, Policy, Selection};

/// A failure ending a policy run.
#[derive(Debug)]
pub enum RunError {
    /// The index refused the query.
    Filter(backend::Error),
    /// The index iterator failed.
    Iteration(backend::Error),
    /// Pending changes of a backend could not be persisted.
    Flush {
        backend: String,
        source: backend::Error,
    },
    Output(std::io::Error),
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Filter(error) => Some(error),
            RunError::Iteration(error) => Some(error),
            RunError::Flush { source, .. } => Some(source),
            RunError::Output(error) => Some(error),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use RunError::*;

        match *self {
            Filter(ref error) => write!(fmt, "querying the index failed: {}", error),
            Iteration(ref error) => {
                write!(fmt, "reading the index failed: {}", error)
            }
            Flush { ref backend, ref source } => {
                write!(fmt, "flushing the {} backend failed: {}", backend, source)
            }
            Output(ref error) => write!(fmt, "failed to write output: {}", error),
        }
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Entries returned by the index.
    pub fetched: usize,
    /// Entries gone (or unreadable) on the live backend.
    pub vanished: usize,
    /// Entries rejected by the policy filter.
    pub excluded: usize,
    /// Entries handled by the fallback action.
    pub unmatched: usize,
    pub applied: usize,
    pub failed: usize,
    /// Final counters of every action kind used.
    pub kinds: BTreeMap<ActionKind, KindState>,
}

impl RunStats {

    /// Entries that made it past live validation.
    pub fn processed(&self) -> usize {
        self.fetched - self.vanished
    }
}

enum State {
    Fetching,
    Validating(Entry),
    Matching(Entry),
    Selecting(Entry, Selection),
    Applying(Entry, Rc<Prepared>),
    Done,
    Aborted(RunError),
}

/// Runs `policy` over the entries of `index`, acting on `live`.
///
/// The index is queried with the policy filter and sort order; `options`
/// tunes the query and carries the dry-run switch. Both backends are
/// flushed and released once the run ends, whatever its outcome.
pub fn run(
    policy: &Policy,
    mut index: Box<dyn Backend>,
    mut live: Box<dyn Backend>,
    options: &FilterOptions,
    out: &mut dyn Write,
) -> Result<RunStats, RunError> {
    let started = Instant::now();
    info!("running policy '{}' ({} rules)", policy.name, policy.rules.len());

    let mut options = options.clone();
    if options.sort.is_empty() {
        options.sort = policy.sort.clone();
    }

    let mut iter = match index.filter(policy.filter.as_ref(), &options,
                                      &Projection::all()) {
        Ok(iter) => iter,
        Err(error) => {
            let _ = release(&mut *live, &mut *index);
            return Err(RunError::Filter(error));
        }
    };

    let mut cache = ActionCache::new(policy, live.capabilities());
    let mut stats = RunStats::default();

    let outcome = drive(policy, iter.as_mut(), &mut *index, &mut *live,
                        &mut cache, &mut stats, out, options.dry_run);

    stats.kinds = cache.release();
    drop(cache);
    let flushed = release(&mut *live, &mut *index);
    drop(live);
    drop(index);
    drop(iter);

    outcome?;
    flushed?;

    if let Some(count) = stats.kinds.get(&ActionKind::Count) {
        writeln!(out, "{} matching entries", count.applied)
            .map_err(RunError::Output)?;
    }

    info!(
        "policy '{}' done in {}: {} processed, {} vanished, {} excluded, \
         {} unmatched, {} applied, {} failed",
        policy.name,
        humantime::format_duration(started.elapsed()),
        stats.processed(),
        stats.vanished,
        stats.excluded,
        stats.unmatched,
        stats.applied,
        stats.failed,
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn drive(
    policy: &Policy,
    iter: &mut dyn EntryIter,
    index: &mut dyn Backend,
    live: &mut dyn Backend,
    cache: &mut ActionCache,
    stats: &mut RunStats,
    out: &mut dyn Write,
    dry_run: bool,
) -> Result<(), RunError> {
    let mut state = State::Fetching;

    loop {
        state = match state {
            State::Fetching => match iter.fetch() {
                Fetch::Entry(entry) => {
                    stats.fetched += 1;
                    State::Validating(entry)
                }
                Fetch::Again => {
                    std::thread::yield_now();
                    State::Fetching
                }
                Fetch::End => State::Done,
                Fetch::Error(error) => State::Aborted(RunError::Iteration(error)),
            },
            State::Validating(stale) => match live.get_fresh(&stale) {
                Ok(Some(fresh)) => State::Matching(fresh),
                Ok(None) => {
                    warn!("'{}' vanished since it was indexed", stale.path);
                    stats.vanished += 1;
                    State::Fetching
                }
                Err(error) => {
                    warn!("cannot check '{}': {}", stale.path, error);
                    stats.vanished += 1;
                    State::Fetching
                }
            },
            State::Matching(entry) => match select_rule(policy, &entry) {
                Selection::Excluded => {
                    trace!("'{}' excluded by the policy filter", entry.path);
                    stats.excluded += 1;
                    State::Fetching
                }
                selection => {
                    if selection == Selection::Unmatched {
                        stats.unmatched += 1;
                    }
                    State::Selecting(entry, selection)
                }
            },
            State::Selecting(entry, selection) => {
                match select_action(policy, cache, selection) {
                    Some(action) => State::Applying(entry, action),
                    None => State::Fetching,
                }
            }
            State::Applying(entry, action) => {
                trace!("applying '{}' to '{}'", action.kind, entry.path);
                match apply(&action, &entry, index, live, out, dry_run) {
                    Ok(()) => {
                        stats.applied += 1;
                        cache.record(action.kind, true);
                    }
                    Err(error) => {
                        warn!("[{}] '{}' on '{}' failed: {}",
                              action.rule, action.kind, entry.path, error);
                        stats.failed += 1;
                        cache.record(action.kind, false);
                    }
                }
                State::Fetching
            }
            State::Done => return Ok(()),
            State::Aborted(error) => return Err(error),
        };
    }
}

/// Flushes the live backend, then the index. Both are attempted; the first
/// failure is returned.
fn release(live: &mut dyn Backend, index: &mut dyn Backend) -> Result<(), RunError> {
    let live = flush(live);
    let index = flush(index);
    live.and(index)
}

fn flush(backend: &mut dyn Backend) -> Result<(), RunError> {
    debug!("releasing the {} backend", backend.name());
    backend.flush().map_err(|source| {
        warn!("flushing the {} backend failed: {}", backend.name(), source);
        RunError::Flush {
            backend: backend.name().to_owned(),
            source,
        }
    })
}
