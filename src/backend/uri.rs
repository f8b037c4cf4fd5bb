// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::path::PathBuf;
use std::str::FromStr;

use log::debug;

use crate::backend::{Backend, Error, PosixBackend, SnapshotBackend};

const SCHEME: &str = "rbh:";

/// Location of a backend.
///
/// URIs have the form `rbh:<backend>:<path>`. Anything without the `rbh:`
/// scheme is taken as a plain directory served by the POSIX backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    Posix(PathBuf),
    Snapshot(PathBuf),
}

impl Uri {

    /// Whether `arg` looks like a backend location rather than a token of
    /// a query expression.
    pub fn is_uri(arg: &str) -> bool {
        arg.starts_with(SCHEME)
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(string: &str) -> Result<Uri, Error> {
        let invalid = |reason| Error::InvalidUri {
            uri: string.to_owned(),
            reason,
        };

        let rest = match string.strip_prefix(SCHEME) {
            Some(rest) => rest,
            None if string.is_empty() => return Err(invalid("empty path")),
            None => return Ok(Uri::Posix(PathBuf::from(string))),
        };

        let mut parts = rest.splitn(2, ':');
        let backend = parts.next().unwrap_or_default();
        let path = match parts.next() {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            Some(_) => return Err(invalid("empty path")),
            None => return Err(invalid("expected 'rbh:<backend>:<path>'")),
        };

        match backend {
            "posix" => Ok(Uri::Posix(path)),
            "snapshot" => Ok(Uri::Snapshot(path)),
            _ => Err(invalid("unknown backend")),
        }
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Uri::Posix(path) => write!(fmt, "rbh:posix:{}", path.display()),
            Uri::Snapshot(path) => write!(fmt, "rbh:snapshot:{}", path.display()),
        }
    }
}

/// Opens the backend at `uri`.
pub fn open(uri: &Uri) -> Result<Box<dyn Backend>, Error> {
    debug!("opening backend '{}'", uri);
    match uri {
        Uri::Posix(root) => Ok(Box::new(PosixBackend::open(root)?)),
        Uri::Snapshot(path) => Ok(Box::new(SnapshotBackend::load(path)?)),
    }
}
