// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::path::{Component, Path, PathBuf};

/// Inlines `.` and `..` components in paths.
/// Returns unchanged input for non-absolute paths.
pub fn normalize(path: &Path) -> PathBuf {
    if !path.is_absolute() {
        return path.to_path_buf();
    }

    let mut components = vec![];
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(components.last(), Some(Component::RootDir)) {
                    components.pop();
                }
            }
            _ => {
                components.push(c);
            }
        }
    }

    components.iter().collect::<PathBuf>()
}

/// Resolves an entry path (`/a/b`, relative to a backend root) against the
/// root directory on disk.
///
/// Returns `None` when the lexically normalized result escapes `root`, e.g.
/// for `/../etc/passwd`.
pub fn resolve_under(root: &Path, relative: &str) -> Option<PathBuf> {
    let joined = root.join(relative.trim_start_matches('/'));
    let resolved = normalize(&joined);
    if resolved.starts_with(normalize(root)) {
        Some(resolved)
    } else {
        None
    }
}

/// Turns an absolute on-disk path into an entry path relative to `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let mut relative = String::from("/");
    relative.push_str(stripped.to_str()?);
    Some(relative)
}
