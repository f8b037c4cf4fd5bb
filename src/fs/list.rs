// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use log::warn;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// A raw directory child: its absolute path and `lstat` metadata.
#[derive(Debug, Clone)]
pub struct Listed {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Returns an iterator over the children of the directory at `path`.
///
/// Children that cannot be stat'ed are skipped with a warning. Symbolic links
/// are never followed.
pub fn list_dir<P: AsRef<Path>>(path: P) -> std::io::Result<ListDir> {
    let iter = std::fs::read_dir(path)?;
    Ok(ListDir { iter })
}

pub struct ListDir {
    iter: std::fs::ReadDir,
}

impl std::iter::Iterator for ListDir {

    type Item = Listed;

    fn next(&mut self) -> Option<Listed> {
        for entry in &mut self.iter {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("directory iteration error: {}", error);
                    continue
                },
            };

            let path = entry.path();
            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!("failed to stat '{}': {}", path.display(), error);
                    continue
                },
            };

            return Some(Listed { path, metadata });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_empty_dir() {
        let tempdir = tempfile::tempdir().unwrap();
        let listed = list_dir(tempdir.path()).unwrap().collect::<Vec<_>>();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_list_dir_with_children() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("a"), "").unwrap();
        std::fs::create_dir(tempdir.path().join("b")).unwrap();

        let mut listed = list_dir(tempdir.path()).unwrap().collect::<Vec<_>>();
        listed.sort_by(|x, y| x.path.cmp(&y.path));

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, tempdir.path().join("a"));
        assert!(listed[0].metadata.is_file());
        assert_eq!(listed[1].path, tempdir.path().join("b"));
        assert!(listed[1].metadata.is_dir());
    }

    #[test]
    fn test_list_missing_dir() {
        let tempdir = tempfile::tempdir().unwrap();
        assert!(list_dir(tempdir.path().join("missing")).is_err());
    }
}
