// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Permission modes for `-perm`, in octal or `chmod`-like symbolic form.

use crate::filter::{Field, Filter, Operator, Value};

const USER: u32 = 0o4700;
const GROUP: u32 = 0o2070;
const OTHER: u32 = 0o1007;
const ALL_BITS: u32 = 0o7777;

/// Builds the filter for `-perm MODE`, `-perm -MODE` and `-perm /MODE`.
pub fn perm_filter(input: &str) -> Result<Filter, String> {
    let (op, mode) = match input.chars().next() {
        Some('-') => (Operator::AllSet, &input[1..]),
        Some('/') => (Operator::AnySet, &input[1..]),
        Some(_) => (Operator::Equal, input),
        None => return Err(String::from("empty mode")),
    };

    let mode = parse_mode(mode)?;
    Ok(Filter::compare(Field::Mode, op, Value::Unsigned(u64::from(mode))))
}

/// Parses an octal mode (at most `07777`) or a comma-separated list of
/// symbolic clauses applied in order to an empty mode.
pub fn parse_mode(input: &str) -> Result<u32, String> {
    match input.chars().next() {
        Some(c) if c.is_ascii_digit() => parse_octal(input),
        Some(_) => input.split(',').try_fold(0, parse_clause),
        None => Err(String::from("empty mode")),
    }
}

fn parse_octal(input: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(input, 8)
        .map_err(|_| format!("invalid octal mode '{}'", input))?;
    if mode > ALL_BITS {
        return Err(format!("octal mode '{}' out of range", input));
    }
    Ok(mode)
}

/// Applies one `[ugoa]*([-+=]([rwxXst]*|[ugo]))+` clause to `mode`.
fn parse_clause(mode: u32, clause: &str) -> Result<u32, String> {
    let invalid = || format!("invalid symbolic mode '{}'", clause);

    let mut chars = clause.chars().peekable();

    let mut who = 0;
    while let Some(&c) = chars.peek() {
        who |= match c {
            'u' => USER,
            'g' => GROUP,
            'o' => OTHER,
            'a' => USER | GROUP | OTHER,
            _ => break,
        };
        chars.next();
    }

    let mut mode = mode;
    let mut actions = 0;
    while let Some(op) = chars.next() {
        if !matches!(op, '-' | '+' | '=') {
            return Err(invalid());
        }

        let mut perm = 0;
        match chars.peek() {
            Some(&source) if matches!(source, 'u' | 'g' | 'o') => {
                chars.next();
                perm = copy_class(mode, source, who);
            }
            _ => {
                while let Some(&c) = chars.peek() {
                    if matches!(c, '-' | '+' | '=') {
                        break;
                    }
                    perm |= perm_bits(c, who, mode).ok_or_else(invalid)?;
                    chars.next();
                }
            }
        }

        mode = match op {
            '-' => mode & !perm,
            '+' => mode | perm,
            _ => {
                let cleared = if who == 0 { ALL_BITS } else { who };
                (mode & !cleared) | perm
            }
        };
        actions += 1;
    }

    if actions == 0 {
        return Err(invalid());
    }
    Ok(mode)
}

/// Bits a single permission letter stands for, restricted to `who` (an
/// empty `who` means everybody).
fn perm_bits(letter: char, who: u32, mode: u32) -> Option<u32> {
    let target = if who == 0 { USER | GROUP | OTHER } else { who };
    let bits = match letter {
        'r' => 0o444,
        'w' => 0o222,
        'x' => 0o111,
        'X' if mode & 0o111 != 0 => 0o111,
        'X' => 0,
        's' => 0o6000,
        't' => 0o1000,
        _ => return None,
    };
    Some(bits & target)
}

/// Copies the permission bits of class `source` to the classes in `who`.
fn copy_class(mode: u32, source: char, who: u32) -> u32 {
    let rwx = match source {
        'u' => (mode >> 6) & 0o7,
        'g' => (mode >> 3) & 0o7,
        _ => mode & 0o7,
    };

    let target = if who == 0 { USER | GROUP | OTHER } else { who };
    let spread = (rwx << 6) | (rwx << 3) | rwx;
    spread & target & 0o777
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octal() {
        assert_eq!(parse_mode("644"), Ok(0o644));
        assert_eq!(parse_mode("0755"), Ok(0o755));
        assert_eq!(parse_mode("7777"), Ok(0o7777));
        assert!(parse_mode("17777").is_err());
        assert!(parse_mode("8").is_err());
        assert!(parse_mode("64a").is_err());
    }

    #[test]
    fn test_symbolic() {
        let table = [
            ("u+r", 0o400),
            ("u=rw,go=r", 0o644),
            ("a+x", 0o111),
            ("+w", 0o222),
            ("ug+rwx,o-x", 0o770),
            ("u+rwx,g=u", 0o770),
            ("a=rwx,o-w", 0o775),
            ("u+s", 0o4000),
            ("g+s", 0o2000),
            ("+t", 0o1000),
            ("a+X", 0),
            ("u+x,a+X", 0o111),
        ];

        for (input, expected) in table.iter() {
            assert_eq!(parse_mode(input), Ok(*expected), "mode: {}", input);
        }
    }

    #[test]
    fn test_symbolic_rejects_garbage() {
        assert!(parse_mode("u").is_err());
        assert!(parse_mode("u+q").is_err());
        assert!(parse_mode("u+r,").is_err());
        assert!(parse_mode("z+r").is_err());
        assert!(parse_mode("").is_err());
    }

    #[test]
    fn test_perm_filter_operators() {
        assert_eq!(
            perm_filter("-u+x").unwrap(),
            Filter::compare(Field::Mode, Operator::AllSet,
                            Value::Unsigned(0o100))
        );
        assert_eq!(
            perm_filter("/111").unwrap(),
            Filter::compare(Field::Mode, Operator::AnySet,
                            Value::Unsigned(0o111))
        );
        assert_eq!(
            perm_filter("644").unwrap(),
            Filter::compare(Field::Mode, Operator::Equal,
                            Value::Unsigned(0o644))
        );
    }
}
