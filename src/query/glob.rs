// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use crate::filter::NEWLINE_GUARD;

/// Translates a shell glob into an anchored regular expression.
///
/// Unescaped `*` and `?` become `.*` and `.`; characters that are literal in
/// a glob but special in a regex (`.|+(){}`) get escaped; bracket classes are
/// copied as they are. A backslash survives only in front of a character
/// that is special to the shell or to the regex, otherwise it is dropped.
///
/// The translation never fails. The result may still be rejected by the
/// regex compiler, e.g. for an unclosed bracket class.
pub fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 8);
    regex.push('^');

    let mut escaped = false;
    for c in glob.chars() {
        if escaped {
            match c {
                '\\' | '*' | '?' | '.' | '|' | '+' | '(' | ')' | '{' | '}'
                | '[' | ']' => regex.push('\\'),
                _ => (),
            }
            regex.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' => escaped = true,
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '|' | '+' | '(' | ')' | '{' | '}' => {
                regex.push('\\');
                regex.push(c);
            }
            _ => regex.push(c),
        }
    }

    // A dangling backslash stands for itself.
    if escaped {
        regex.push_str("\\\\");
    }

    regex.push_str(NEWLINE_GUARD);
    regex
}
