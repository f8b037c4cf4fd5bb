// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! A backend walking a live POSIX directory tree.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::backend::{
    select, Backend, Capabilities, EntryIter, Error, FilterOptions, Projection,
};
use crate::filter::Filter;
use crate::fs::{list_dir, normalize, relative_to, resolve_under};
use crate::fs::{Entry, FileKind, Stat};

pub struct PosixBackend {
    root: PathBuf,
}

impl PosixBackend {

    /// Opens the tree rooted at `root`, which must exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<PosixBackend, Error> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            normalize(root)
        } else {
            let cwd = std::env::current_dir().map_err(|e| Error::io(root, e))?;
            normalize(&cwd.join(root))
        };

        std::fs::symlink_metadata(&root).map_err(|e| Error::io(&root, e))?;
        Ok(PosixBackend { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, entry: &Entry) -> Result<PathBuf, Error> {
        resolve_under(&self.root, &entry.path)
            .ok_or_else(|| Error::OutsideRoot(entry.path.clone()))
    }
}

impl Backend for PosixBackend {

    fn name(&self) -> &str {
        "posix"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete: true,
            migrate: false,
            xattrs: cfg!(target_family = "unix"),
        }
    }

    fn filter(
        &self,
        filter: Option<&Filter>,
        options: &FilterOptions,
        projection: &Projection,
    ) -> Result<Box<dyn EntryIter>, Error> {
        let walk = Walk::new(&self.root)?;
        Ok(select(Box::new(walk), filter, options, projection))
    }

    fn get_fresh(&self, entry: &Entry) -> Result<Option<Entry>, Error> {
        let path = self.resolve(entry)?;
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::io(path, error)),
        };
        Ok(Some(read_entry(&entry.path, &path, &metadata)))
    }

    fn remove(&mut self, entry: &Entry) -> Result<(), Error> {
        let path = self.resolve(entry)?;
        if path == self.root {
            return Err(Error::OutsideRoot(entry.path.clone()));
        }

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("'{}' already removed", path.display());
                return Ok(());
            }
            Err(error) => return Err(Error::io(path, error)),
        };

        let result = if metadata.is_dir() {
            std::fs::remove_dir(&path)
        } else {
            std::fs::remove_file(&path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::io(path, error)),
        }
    }

    fn absolute_path(&self, entry: &Entry) -> Option<PathBuf> {
        resolve_under(&self.root, &entry.path)
    }
}

/// Implements `Iterator` over every object below a root directory,
/// the root included. Symbolic links are never followed.
struct Walk {
    root: PathBuf,
    /// Results buffered to be returned.
    outputs: Vec<Entry>,
    /// Directories remaining to be listed.
    directories: Vec<PathBuf>,
}

impl Walk {

    fn new(root: &Path) -> Result<Walk, Error> {
        let metadata = std::fs::symlink_metadata(root)
            .map_err(|error| Error::io(root, error))?;

        let mut walk = Walk {
            root: root.to_owned(),
            outputs: vec![read_entry("/", root, &metadata)],
            directories: vec![],
        };
        if metadata.is_dir() {
            walk.directories.push(root.to_owned());
        }
        Ok(walk)
    }

    /// Lists `directory`, buffering its children and queueing the
    /// subdirectories.
    fn list(&mut self, directory: &Path) {
        let listed = match list_dir(directory) {
            Ok(listed) => listed,
            Err(error) => {
                warn!("listing directory '{}' failed: {}",
                      directory.display(), error);
                return;
            }
        };

        let mut children = listed.collect::<Vec<_>>();
        // Reversed, so that popping returns children in name order.
        children.sort_by(|left, right| right.path.cmp(&left.path));

        for child in children {
            let relative = match relative_to(&self.root, &child.path) {
                Some(relative) => relative,
                None => {
                    warn!("skipping non UTF-8 path '{}'", child.path.display());
                    continue;
                }
            };

            if child.metadata.is_dir() {
                self.directories.push(child.path.clone());
            }
            self.outputs.push(read_entry(&relative, &child.path,
                                         &child.metadata));
        }
    }
}

impl std::iter::Iterator for Walk {
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Result<Entry, Error>> {
        loop {
            if let Some(entry) = self.outputs.pop() {
                return Some(Ok(entry));
            }

            let directory = self.directories.pop()?;
            self.list(&directory);
        }
    }
}

/// Builds the entry `relative` from the object at `path`.
fn read_entry(relative: &str, path: &Path, metadata: &Metadata) -> Entry {
    let mut entry = Entry::new(relative, stat(metadata));

    if metadata.file_type().is_symlink() {
        match std::fs::read_link(path) {
            Ok(target) => entry.symlink = target.to_str().map(String::from),
            Err(error) => {
                warn!("failed to read link '{}': {}", path.display(), error)
            }
        }
    }

    entry.xattrs = read_xattrs(path);
    entry
}

#[cfg(target_family = "unix")]
fn stat(metadata: &Metadata) -> Stat {
    use std::os::unix::fs::MetadataExt;

    Stat {
        kind: FileKind::from_mode(metadata.mode()),
        mode: metadata.mode() & 0o7777,
        size: metadata.size(),
        blocks: metadata.blocks(),
        uid: metadata.uid(),
        gid: metadata.gid(),
        ino: metadata.ino(),
        nlink: metadata.nlink(),
        atime: metadata.atime(),
        mtime: metadata.mtime(),
        ctime: metadata.ctime(),
    }
}

#[cfg(not(target_family = "unix"))]
fn stat(metadata: &Metadata) -> Stat {
    let kind = if metadata.is_dir() {
        FileKind::Directory
    } else if metadata.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    };

    Stat {
        kind,
        size: metadata.len(),
        ..Stat::default()
    }
}

#[cfg(target_family = "unix")]
fn read_xattrs(path: &Path) -> BTreeMap<String, String> {
    let mut xattrs = BTreeMap::new();

    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(error) => {
            debug!("failed to list xattrs of '{}': {}", path.display(), error);
            return xattrs;
        }
    };

    for name in names {
        let key = match name.to_str() {
            Some(key) => key.to_owned(),
            None => continue,
        };

        match xattr::get(path, &name) {
            Ok(Some(value)) => {
                xattrs.insert(key, String::from_utf8_lossy(&value).into_owned());
            }
            Ok(None) => (),
            Err(error) => warn!(
                "failed to read xattr '{}' of '{}': {}",
                key,
                path.display(),
                error
            ),
        }
    }

    xattrs
}

#[cfg(not(target_family = "unix"))]
fn read_xattrs(_: &Path) -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::collect_entries;
    use crate::filter::{Field, Operator, Pattern, Value};

    fn tree() -> tempfile::TempDir {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tempdir.path().join("a").join("b")).unwrap();
        std::fs::write(tempdir.path().join("a").join("x.txt"), "abc").unwrap();
        std::fs::write(tempdir.path().join("a").join("b").join("y.log"), "")
            .unwrap();
        std::fs::write(tempdir.path().join("z.txt"), "").unwrap();
        tempdir
    }

    fn paths(backend: &PosixBackend, filter: Option<&Filter>) -> Vec<String> {
        let mut iter = backend
            .filter(filter, &FilterOptions::default(), &Projection::all())
            .unwrap();
        let mut paths = collect_entries(iter.as_mut())
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    #[test]
    fn test_walk_whole_tree() {
        let tempdir = tree();
        let backend = PosixBackend::open(tempdir.path()).unwrap();
        assert_eq!(paths(&backend, None), vec![
            "/", "/a", "/a/b", "/a/b/y.log", "/a/x.txt", "/z.txt",
        ]);
    }

    #[test]
    fn test_walk_with_filter() {
        let tempdir = tree();
        let backend = PosixBackend::open(tempdir.path()).unwrap();
        let pattern = Pattern::new(r"^.*\.txt(?!\n)$", false).unwrap();
        let filter = Filter::compare(
            Field::Name, Operator::Regex, Value::Pattern(pattern));
        assert_eq!(paths(&backend, Some(&filter)), vec!["/a/x.txt", "/z.txt"]);
    }

    #[test]
    fn test_walk_reads_stat() {
        let tempdir = tree();
        let backend = PosixBackend::open(tempdir.path()).unwrap();
        let entry = backend
            .get_fresh(&Entry::new("/a/x.txt", Stat::default()))
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "x.txt");
        assert_eq!(entry.stat.size, 3);
        assert_eq!(entry.stat.kind, FileKind::File);
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn test_walk_reads_symlink() {
        let tempdir = tree();
        std::os::unix::fs::symlink("z.txt", tempdir.path().join("link"))
            .unwrap();
        let backend = PosixBackend::open(tempdir.path()).unwrap();
        let entry = backend
            .get_fresh(&Entry::new("/link", Stat::default()))
            .unwrap()
            .unwrap();
        assert_eq!(entry.stat.kind, FileKind::Symlink);
        assert_eq!(entry.symlink.as_deref(), Some("z.txt"));
    }

    #[test]
    fn test_get_fresh_missing() {
        let tempdir = tree();
        let backend = PosixBackend::open(tempdir.path()).unwrap();
        let missing = Entry::new("/nope", Stat::default());
        assert!(backend.get_fresh(&missing).unwrap().is_none());

        let escaping = Entry::new("/../etc", Stat::default());
        assert!(matches!(backend.get_fresh(&escaping),
                         Err(Error::OutsideRoot(_))));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tempdir = tree();
        let mut backend = PosixBackend::open(tempdir.path()).unwrap();
        let entry = Entry::new("/z.txt", Stat::default());

        backend.remove(&entry).unwrap();
        assert!(!tempdir.path().join("z.txt").exists());
        backend.remove(&entry).unwrap();
    }

    #[test]
    fn test_remove_refuses_non_empty_directory_and_root() {
        let tempdir = tree();
        let mut backend = PosixBackend::open(tempdir.path()).unwrap();

        assert!(backend.remove(&Entry::new("/a", Stat::default())).is_err());
        assert!(backend.remove(&Entry::new("/", Stat::default())).is_err());
        assert!(tempdir.path().join("a").exists());
    }

    #[test]
    fn test_migrate_is_unsupported() {
        let tempdir = tree();
        let mut backend = PosixBackend::open(tempdir.path()).unwrap();
        let entry = Entry::new("/z.txt", Stat::default());
        assert!(matches!(
            backend.migrate(&entry, &Default::default()),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_open_missing_root() {
        let tempdir = tempfile::tempdir().unwrap();
        assert!(PosixBackend::open(tempdir.path().join("missing")).is_err());
    }
}
