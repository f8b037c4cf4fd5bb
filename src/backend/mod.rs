// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Storage backends: sources of entries and targets of actions.
//!
//! A backend answers filter queries with an [`EntryIter`], re-reads single
//! entries on demand and, depending on its [`Capabilities`], removes or
//! migrates them. Backends may contribute predicates of their own to the
//! query language.

pub mod posix;
pub mod snapshot;
pub mod uri;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;

use crate::filter::{matches_locally, Field, Filter, Sort};
use crate::fs::Entry;
use crate::query::PredicateBuilder;

pub use self::posix::PosixBackend;
pub use self::snapshot::SnapshotBackend;
pub use self::uri::{open, Uri};

/// Free-form action parameters, e.g. the target tier of a migration.
pub type Parameters = BTreeMap<String, String>;

/// Result of pulling one item out of an [`EntryIter`].
#[derive(Debug)]
pub enum Fetch {
    Entry(Entry),
    /// No more entries, ever.
    End,
    /// Nothing available right now; fetching again may yield more.
    Again,
    Error(Error),
}

/// A stream of entries returned by [`Backend::filter`].
///
/// Iterators own their data and do not borrow the backend that created
/// them.
pub trait EntryIter {
    fn fetch(&mut self) -> Fetch;
}

/// Tuning of a filter query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    /// Number of matching entries to skip.
    pub skip: usize,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Whether per-entry read errors are logged and skipped instead of
    /// ending the iteration.
    pub skip_error: bool,
    /// Stop after the first match.
    pub one: bool,
    /// Report actions instead of applying them.
    pub dry_run: bool,
    pub sort: Vec<Sort>,
}

/// Parts of an entry the caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub xattrs: bool,
    pub symlink: bool,
}

impl Projection {

    pub fn all() -> Projection {
        Projection { xattrs: true, symlink: true }
    }

    fn apply(&self, mut entry: Entry) -> Entry {
        if !self.xattrs {
            entry.xattrs.clear();
        }
        if !self.symlink {
            entry.symlink = None;
        }
        entry
    }
}

impl Default for Projection {
    fn default() -> Projection {
        Projection::all()
    }
}

/// Operations a backend supports beyond reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub delete: bool,
    pub migrate: bool,
    pub xattrs: bool,
}

pub trait Backend {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Predicates this backend adds to the query language.
    fn predicates(&self) -> Vec<Box<dyn PredicateBuilder>> {
        vec![]
    }

    /// Returns the entries matching `filter` (all of them for `None`).
    fn filter(
        &self,
        filter: Option<&Filter>,
        options: &FilterOptions,
        projection: &Projection,
    ) -> Result<Box<dyn EntryIter>, Error>;

    /// Re-reads the current state of `entry`. `Ok(None)` means the entry
    /// no longer exists.
    fn get_fresh(&self, entry: &Entry) -> Result<Option<Entry>, Error>;

    /// Removes `entry`. Removing an entry that is already gone succeeds.
    fn remove(&mut self, entry: &Entry) -> Result<(), Error> {
        let _ = entry;
        Err(self.unsupported("delete"))
    }

    /// Moves `entry` to another storage tier.
    fn migrate(&mut self, entry: &Entry, parameters: &Parameters)
        -> Result<(), Error>
    {
        let _ = (entry, parameters);
        Err(self.unsupported("migrate"))
    }

    /// Location of `entry` on the local filesystem, if it has one.
    fn absolute_path(&self, entry: &Entry) -> Option<PathBuf> {
        let _ = entry;
        None
    }

    /// Persists pending changes. Called once before the backend is dropped.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            backend: self.name().to_owned(),
            operation,
        }
    }
}

/// An error type for failures of backend operations.
#[derive(Debug)]
pub enum Error {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidUri {
        uri: String,
        reason: &'static str,
    },
    Snapshot {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    /// The entry path resolves outside of the backend root.
    OutsideRoot(String),
    Unsupported {
        backend: String,
        operation: &'static str,
    },
    Iteration(String),
    Migrate(String),
}

impl Error {

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Error {
        Error::Io { path: path.into(), source }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            Error::Snapshot { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Error::*;

        match *self {
            Io { ref path, ref source } => {
                write!(fmt, "I/O error on '{}': {}", path.display(), source)
            }
            InvalidUri { ref uri, reason } => {
                write!(fmt, "invalid URI '{}': {}", uri, reason)
            }
            Snapshot { ref path, line, ref source } => write!(
                fmt,
                "malformed snapshot '{}' at line {}: {}",
                path.display(),
                line,
                source
            ),
            OutsideRoot(ref path) => {
                write!(fmt, "path '{}' escapes the backend root", path)
            }
            Unsupported { ref backend, operation } => write!(
                fmt,
                "operation '{}' is not supported by the {} backend",
                operation,
                backend
            ),
            Iteration(ref message) => write!(fmt, "iteration failed: {}", message),
            Migrate(ref message) => write!(fmt, "migration failed: {}", message),
        }
    }
}

/// A raw stream of entries, before filtering.
pub(crate) type Source = Box<dyn Iterator<Item = Result<Entry, Error>>>;

/// Applies a filter and query options to a raw stream of entries.
pub(crate) fn select(
    source: Source,
    filter: Option<&Filter>,
    options: &FilterOptions,
    projection: &Projection,
) -> Box<dyn EntryIter> {
    let mut remaining = options.limit;
    if options.one {
        remaining = Some(remaining.map_or(1, |limit| limit.min(1)));
    }

    let mut selection = Selection {
        source,
        filter: filter.cloned(),
        skip: options.skip,
        remaining,
        skip_error: options.skip_error,
        projection: *projection,
        done: false,
    };

    if !options.sort.is_empty() {
        selection.source = selection.sorted(&options.sort);
        selection.filter = None;
    }

    Box::new(selection)
}

struct Selection {
    source: Source,
    filter: Option<Filter>,
    skip: usize,
    remaining: Option<usize>,
    skip_error: bool,
    projection: Projection,
    done: bool,
}

impl Selection {

    fn accepts(&self, entry: &Entry) -> bool {
        match &self.filter {
            Some(filter) => matches_locally(filter, entry),
            None => true,
        }
    }

    /// Drains the source, keeping matching entries in the requested order.
    /// A fatal error is kept and reported after the sorted entries.
    fn sorted(&mut self, sort: &[Sort]) -> Source {
        let mut entries = vec![];
        let mut failure = None;

        while let Some(item) = self.source.next() {
            match item {
                Ok(entry) => {
                    if self.accepts(&entry) {
                        entries.push(entry);
                    }
                }
                Err(error) if self.skip_error => {
                    warn!("skipping unreadable entry: {}", error);
                }
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        entries.sort_by(|left, right| compare_entries(left, right, sort));
        Box::new(entries.into_iter().map(Ok).chain(failure.map(Err)))
    }
}

impl EntryIter for Selection {

    fn fetch(&mut self) -> Fetch {
        if self.done || self.remaining == Some(0) {
            return Fetch::End;
        }

        loop {
            let entry = match self.source.next() {
                Some(Ok(entry)) => entry,
                Some(Err(error)) if self.skip_error => {
                    warn!("skipping unreadable entry: {}", error);
                    continue;
                }
                Some(Err(error)) => {
                    self.done = true;
                    return Fetch::Error(error);
                }
                None => {
                    self.done = true;
                    return Fetch::End;
                }
            };

            if !self.accepts(&entry) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Fetch::Entry(self.projection.apply(entry));
        }
    }
}

fn compare_entries(left: &Entry, right: &Entry, sort: &[Sort]) -> Ordering {
    for key in sort {
        let ordering = compare_field(left, right, &key.field);
        let ordering = if key.ascending { ordering } else { ordering.reverse() };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_field(left: &Entry, right: &Entry, field: &Field) -> Ordering {
    let (l, r) = (&left.stat, &right.stat);
    match field {
        Field::Name => left.name.cmp(&right.name),
        Field::Path => left.path.cmp(&right.path),
        Field::Type => l.kind.letter().cmp(&r.kind.letter()),
        Field::Size => l.size.cmp(&r.size),
        Field::Blocks => l.blocks.cmp(&r.blocks),
        Field::Ino => l.ino.cmp(&r.ino),
        Field::Atime => l.atime.cmp(&r.atime),
        Field::Mtime => l.mtime.cmp(&r.mtime),
        Field::Ctime => l.ctime.cmp(&r.ctime),
        _ => Ordering::Equal,
    }
}

/// Drains `iter`, retrying while it reports [`Fetch::Again`].
pub fn collect_entries(iter: &mut dyn EntryIter) -> Result<Vec<Entry>, Error> {
    let mut entries = vec![];
    loop {
        match iter.fetch() {
            Fetch::Entry(entry) => entries.push(entry),
            Fetch::Again => std::thread::yield_now(),
            Fetch::End => return Ok(entries),
            Fetch::Error(error) => return Err(error),
        }
    }
}
