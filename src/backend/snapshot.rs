// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! An in-memory backend loaded from a snapshot of indexed entries.
//!
//! A snapshot is a JSON-lines file, one serialized [`Entry`] per line. It
//! serves as the (possibly stale) metadata index of a policy run, and it can
//! also act as a live backend: removals and migrations change the in-memory
//! copy, which is written back on [`Backend::flush`].

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::backend::{
    select, Backend, Capabilities, EntryIter, Error, FilterOptions, Parameters,
    Projection, Source,
};
use crate::filter::{Field, Filter, Operator, Value};
use crate::fs::Entry;
use crate::query::{BuildContext, PredicateBuilder};
use crate::query::Error as QueryError;

/// Extended attribute recording the storage tier of an entry.
pub const TIER_XATTR: &str = "user.tier";

pub struct SnapshotBackend {
    path: Option<PathBuf>,
    entries: Vec<Entry>,
    /// Position of each entry in `entries`, by path.
    index: HashMap<String, usize>,
    dirty: bool,
}

impl SnapshotBackend {

    /// Loads the snapshot stored at `path`. Blank lines are ignored.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SnapshotBackend, Error> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|error| Error::io(path, error))?;

        let mut entries = vec![];
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|error| Error::io(path, error))?;
            if line.trim().is_empty() {
                continue;
            }

            let entry = serde_json::from_str::<Entry>(&line)
                .map_err(|error| Error::Snapshot {
                    path: path.to_owned(),
                    line: number + 1,
                    source: error,
                })?;
            entries.push(entry);
        }

        debug!("loaded {} entries from '{}'", entries.len(), path.display());
        let mut backend = SnapshotBackend::from_entries(entries);
        backend.path = Some(path.to_owned());
        Ok(backend)
    }

    /// Creates a snapshot that only lives in memory.
    pub fn from_entries(entries: Vec<Entry>) -> SnapshotBackend {
        let mut backend = SnapshotBackend {
            path: None,
            entries,
            index: HashMap::new(),
            dirty: false,
        };
        backend.reindex();
        backend
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.index.get(path).map(|position| &self.entries[*position])
    }

    /// Writes the snapshot to `path`, one entry per line.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let io_error = |error: std::io::Error| Error::io(path, error);

        let file = std::fs::File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            let line = serde_json::to_string(entry).map_err(|error| {
                Error::Snapshot {
                    path: path.to_owned(),
                    line: 0,
                    source: error,
                }
            })?;
            writeln!(writer, "{}", line).map_err(io_error)?;
        }
        writer.flush().map_err(io_error)
    }

    fn reindex(&mut self) {
        self.index = self.entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.path.clone(), position))
            .collect();
    }
}

impl Backend for SnapshotBackend {

    fn name(&self) -> &str {
        "snapshot"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete: true,
            migrate: true,
            xattrs: true,
        }
    }

    fn predicates(&self) -> Vec<Box<dyn PredicateBuilder>> {
        vec![Box::new(TierPredicate)]
    }

    fn filter(
        &self,
        filter: Option<&Filter>,
        options: &FilterOptions,
        projection: &Projection,
    ) -> Result<Box<dyn EntryIter>, Error> {
        let entries = self.entries.clone();
        let source: Source = Box::new(entries.into_iter().map(Ok));
        Ok(select(source, filter, options, projection))
    }

    fn get_fresh(&self, entry: &Entry) -> Result<Option<Entry>, Error> {
        Ok(self.get(&entry.path).cloned())
    }

    fn remove(&mut self, entry: &Entry) -> Result<(), Error> {
        if let Some(position) = self.index.get(&entry.path).copied() {
            self.entries.remove(position);
            self.reindex();
            self.dirty = true;
        }
        Ok(())
    }

    fn migrate(&mut self, entry: &Entry, parameters: &Parameters)
        -> Result<(), Error>
    {
        let target = parameters.get("target").ok_or_else(|| {
            Error::Migrate(String::from("missing 'target' parameter"))
        })?;

        let position = match self.index.get(&entry.path) {
            Some(position) => *position,
            None => {
                return Err(Error::Migrate(format!(
                    "no entry at '{}'", entry.path
                )))
            }
        };

        self.entries[position]
            .xattrs
            .insert(String::from(TIER_XATTR), target.clone());
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        match &self.path {
            Some(path) if self.dirty => {
                info!("writing snapshot back to '{}'", path.display());
                self.save(path)?;
                self.dirty = false;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// `-tier NAME`: entries stored in the given tier.
pub struct TierPredicate;

impl PredicateBuilder for TierPredicate {

    fn token(&self) -> &str {
        "-tier"
    }

    fn build(&self, args: &[String], _: &BuildContext)
        -> Result<Filter, QueryError>
    {
        let tier = match args {
            [tier] if !tier.is_empty() => tier,
            [tier] => {
                return Err(QueryError::invalid_argument(
                    self.token(), tier, "empty tier name"
                ))
            }
            _ => {
                return Err(QueryError::MissingArgument {
                    token: self.token().to_owned(),
                })
            }
        };

        Ok(Filter::compare(
            Field::Xattr(String::from(TIER_XATTR)),
            Operator::Equal,
            Value::String(tier.clone()),
        ))
    }
}
