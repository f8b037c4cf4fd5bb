// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! `ls -dils`-like rendering of entries.

use chrono::{Datelike, Local, TimeZone};

use crate::fs::{Entry, FileKind};

const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;

/// Renders `kind` and `mode` the way `ls -l` does, e.g. `drwxr-sr-x`.
pub fn symbolic_mode(kind: FileKind, mode: u32) -> String {
    let mut result = String::with_capacity(10);
    result.push(kind.ls_letter());

    let classes = [(6, SETUID, 's'), (3, SETGID, 's'), (0, STICKY, 't')];
    for &(shift, special, letter) in classes.iter() {
        let bits = (mode >> shift) & 0o7;
        result.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        result.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        result.push(match (bits & 0o1 != 0, mode & special != 0) {
            (true, true) => letter,
            (false, true) => letter.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    }

    result
}

/// Formats a modification time as `ls` does: with the time of day for this
/// year's timestamps and with the year otherwise.
pub fn ls_timestamp(timestamp: i64, now: i64) -> String {
    let (time, now) = match (
        Local.timestamp_opt(timestamp, 0).single(),
        Local.timestamp_opt(now, 0).single(),
    ) {
        (Some(time), Some(now)) => (time, now),
        _ => return String::from("????????????"),
    };

    if time.year() == now.year() {
        time.format("%b %e %H:%M").to_string()
    } else {
        time.format("%b %e  %Y").to_string()
    }
}

/// Renders one `-ls` line, without the trailing newline.
pub fn format_ls(entry: &Entry, now: i64) -> String {
    let stat = &entry.stat;
    let mut line = format!(
        "{:>9} {:>6} {} {:>3} {:<8} {:<8} {:>8} {} {}",
        stat.ino,
        (stat.blocks + 1) / 2,
        symbolic_mode(stat.kind, stat.mode),
        stat.nlink,
        stat.uid,
        stat.gid,
        stat.size,
        ls_timestamp(stat.mtime, now),
        entry.path,
    );

    if let Some(target) = &entry.symlink {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}
