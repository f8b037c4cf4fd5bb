// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Format strings of `-printf` and `-fprintf`.

use std::fmt::Write;

use chrono::{Local, TimeZone};

use crate::find::ls::symbolic_mode;
use crate::fs::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Directive(char),
}

/// A parsed `-printf` format.
///
/// Directives are validated when the format is parsed so that a typo is a
/// usage error rather than a failure halfway through the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pieces: Vec<Piece>,
}

const DIRECTIVES: &str = "abcdfgGhiklmMnpPsuUyt%";

impl Format {

    pub fn parse(format: &str) -> Result<Format, String> {
        let mut pieces = vec![];
        let mut literal = String::new();
        let mut chars = format.chars();

        while let Some(c) = chars.next() {
            match c {
                '%' => {
                    let directive = chars.next().ok_or_else(|| {
                        String::from("trailing '%' in format")
                    })?;
                    if !DIRECTIVES.contains(directive) {
                        return Err(format!(
                            "unsupported directive '%{}'", directive
                        ));
                    }
                    if directive == '%' {
                        literal.push('%');
                        continue;
                    }
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Directive(directive));
                }
                '\\' => match chars.next() {
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some('0') => literal.push('\0'),
                    Some('\\') => literal.push('\\'),
                    Some(other) => {
                        return Err(format!("unsupported escape '\\{}'", other))
                    }
                    None => return Err(String::from("trailing '\\' in format")),
                },
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Format { pieces })
    }

    /// Renders the format for `entry`.
    pub fn render(&self, entry: &Entry) -> String {
        let mut output = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => output.push_str(text),
                Piece::Directive(directive) => {
                    directive_value(&mut output, *directive, entry)
                }
            }
        }
        output
    }
}

fn directive_value(output: &mut String, directive: char, entry: &Entry) {
    let stat = &entry.stat;

    // Writing into a `String` cannot fail.
    let _ = match directive {
        'a' => write!(output, "{}", ctime(stat.atime)),
        'b' => write!(output, "{}", stat.blocks),
        'c' => write!(output, "{}", ctime(stat.ctime)),
        'd' => write!(output, "{}", entry.depth()),
        'f' => write!(output, "{}", entry.name),
        'g' | 'G' => write!(output, "{}", stat.gid),
        'h' => write!(output, "{}", dirname(&entry.path)),
        'i' => write!(output, "{}", stat.ino),
        'k' => write!(output, "{}", (stat.blocks + 1) / 2),
        'l' => write!(output, "{}", entry.symlink.as_deref().unwrap_or("")),
        'm' => write!(output, "{:o}", stat.mode & 0o7777),
        'M' => write!(output, "{}", symbolic_mode(stat.kind, stat.mode)),
        'n' => write!(output, "{}", stat.nlink),
        'p' => write!(output, "{}", entry.path),
        'P' => {
            let relative = entry.path.strip_prefix('/').unwrap_or(&entry.path);
            write!(output, "{}", relative)
        }
        's' => write!(output, "{}", stat.size),
        't' => write!(output, "{}", ctime(stat.mtime)),
        'u' | 'U' => write!(output, "{}", stat.uid),
        'y' => write!(output, "{}", stat.kind.letter()),
        _ => Ok(()),
    };
}

/// Formats a timestamp like `ctime(3)`, without the trailing newline.
fn ctime(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format("%a %b %e %H:%M:%S %Y").to_string(),
        None => timestamp.to_string(),
    }
}

fn dirname(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}
