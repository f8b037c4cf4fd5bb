// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use regex::{Regex, RegexBuilder};

/// Trailing guard appended to every translated shell pattern. It keeps `$`
/// from matching right before a final newline.
pub const NEWLINE_GUARD: &str = r"(?!\n)$";

/// A compiled regular expression stored in a filter leaf.
///
/// The source text is kept verbatim (it is what gets printed and compared);
/// the compiled form is derived from it. Equality only looks at the source
/// and the case sensitivity.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    case_insensitive: bool,
    regex: Regex,
}

impl Pattern {

    pub fn new(source: &str, case_insensitive: bool)
        -> Result<Pattern, regex::Error>
    {
        let regex = RegexBuilder::new(&engine_source(source))
            .case_insensitive(case_insensitive)
            .build()?;

        Ok(Pattern {
            source: source.to_owned(),
            case_insensitive,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Searches `text` for the pattern. Anchors, if any, are part of the
    /// pattern itself.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Pattern) -> bool {
        self.source == other.source
            && self.case_insensitive == other.case_insensitive
    }
}

/// Rewrites the newline guard into the engine's end-of-text assertion.
///
/// The `regex` crate has no look-around; `\z` matches only at the very end
/// of the haystack, which is what the guard expresses.
fn engine_source(source: &str) -> String {
    if source.ends_with(NEWLINE_GUARD) {
        let stem = &source[..source.len() - NEWLINE_GUARD.len()];
        format!(r"{}\z", stem)
    } else {
        source.to_owned()
    }
}
