// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Filesystem entries as seen by every backend.
//!
//! An [`Entry`] is a fully materialized snapshot of one filesystem object:
//! its namespace path (relative to the backend root, always starting with
//! `/`), its name, the `stat`-like attributes and its extended attributes.
//! Entries are what the index iterator yields, what the live backend returns
//! on re-validation and what filters are evaluated against.

pub mod list;
pub mod path;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use self::list::{list_dir, ListDir, Listed};
pub use self::path::{normalize, relative_to, resolve_under};

/// Type of a filesystem object, mirroring the `S_IFMT` classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Block,
    Char,
    Directory,
    File,
    Symlink,
    Fifo,
    Socket,
}

impl FileKind {

    /// Returns the one-letter code used by `-type` and `%y`.
    pub fn letter(self) -> char {
        match self {
            FileKind::Block => 'b',
            FileKind::Char => 'c',
            FileKind::Directory => 'd',
            FileKind::File => 'f',
            FileKind::Symlink => 'l',
            FileKind::Fifo => 'p',
            FileKind::Socket => 's',
        }
    }

    pub fn from_letter(letter: char) -> Option<FileKind> {
        match letter {
            'b' => Some(FileKind::Block),
            'c' => Some(FileKind::Char),
            'd' => Some(FileKind::Directory),
            'f' => Some(FileKind::File),
            'l' => Some(FileKind::Symlink),
            'p' => Some(FileKind::Fifo),
            's' => Some(FileKind::Socket),
            _ => None,
        }
    }

    /// Returns the character `ls -l` prints in front of the mode bits.
    pub fn ls_letter(self) -> char {
        match self {
            FileKind::File => '-',
            other => other.letter(),
        }
    }

    /// Classifies raw `st_mode` bits.
    pub fn from_mode(mode: u32) -> FileKind {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFBLK as u32 => FileKind::Block,
            m if m == libc::S_IFCHR as u32 => FileKind::Char,
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            m if m == libc::S_IFIFO as u32 => FileKind::Fifo,
            m if m == libc::S_IFSOCK as u32 => FileKind::Socket,
            _ => FileKind::File,
        }
    }
}

impl Default for FileKind {
    fn default() -> FileKind {
        FileKind::File
    }
}

/// `stat`-like attributes of an entry. Timestamps are seconds since epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stat {
    pub kind: FileKind,
    /// Permission bits, including setuid/setgid/sticky (`07777`).
    pub mode: u32,
    pub size: u64,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
    pub uid: u32,
    pub gid: u32,
    pub ino: u64,
    pub nlink: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// One indexed filesystem object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the backend root, e.g. `/dir/file`. The root itself
    /// is `/`.
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub symlink: Option<String>,
    #[serde(default)]
    pub stat: Stat,
    #[serde(default)]
    pub xattrs: BTreeMap<String, String>,
}

impl Entry {

    /// Creates an entry for `path`, deriving its name from the last path
    /// component.
    pub fn new(path: &str, stat: Stat) -> Entry {
        Entry {
            path: path.to_owned(),
            name: name_of(path).to_owned(),
            symlink: None,
            stat,
            xattrs: BTreeMap::new(),
        }
    }

    /// Number of path separators below the root (`/` is at depth 0).
    pub fn depth(&self) -> usize {
        if self.path == "/" {
            return 0;
        }
        self.path.matches('/').count()
    }
}

/// Returns the last component of a `/`-separated path (`/` for the root).
pub fn name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}
