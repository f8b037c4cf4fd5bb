// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Relative windows: `N`, `+N` and `-N` numerals for times, sizes and plain
//! counters.
//!
//! Windows are frozen into absolute bounds when the filter is built; a time
//! window is resolved against the `now` of the build context, never against
//! the clock at match time.

use std::convert::TryFrom;

use lazy_static::lazy_static;
use regex::Regex;

use crate::filter::{Field, Filter, Operator, Value};

/// How a numeral relates to the value it is compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// No sign: exactly `N`, within the unit's resolution.
    Exact,
    /// `+N`: more than `N`.
    AtLeast,
    /// `-N`: less than `N`.
    AtMost,
}

/// A signed numeral with an optional unit suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<'a> {
    pub qualifier: Qualifier,
    pub magnitude: u64,
    /// Whatever follows the digits.
    pub suffix: &'a str,
}

/// Splits `input` into its qualifier, magnitude and suffix.
pub fn parse_window(input: &str) -> Result<Window, String> {
    lazy_static! {
        static ref WINDOW: Regex =
            Regex::new(r"^(?P<sign>[+-]?)(?P<digits>[0-9]+)(?s:(?P<suffix>.*))$")
                .unwrap();
    }

    let captures = WINDOW
        .captures(input)
        .ok_or_else(|| String::from("expected at least one digit"))?;

    let qualifier = match &captures["sign"] {
        "+" => Qualifier::AtLeast,
        "-" => Qualifier::AtMost,
        _ => Qualifier::Exact,
    };

    let magnitude = captures["digits"]
        .parse::<u64>()
        .map_err(|_| String::from("number out of range"))?;

    let suffix = captures.name("suffix").map_or("", |suffix| suffix.as_str());

    Ok(Window {
        qualifier,
        magnitude,
        suffix,
    })
}

const MINUTE: i64 = 60;
const DAY: i64 = 24 * 60 * MINUTE;

/// Unit of a relative time predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Days,
}

impl TimeUnit {

    pub fn seconds(self) -> i64 {
        match self {
            TimeUnit::Minutes => MINUTE,
            TimeUnit::Days => DAY,
        }
    }
}

/// Builds the filter for `-amin`, `-mtime` and the like.
///
/// With `then = now - N units`: `+N` is `t < then`, `-N` is `t > then` and
/// `N` is `then - 1 unit < t <= then`, i.e. an age in `[N, N + 1)` units.
pub fn time_filter(field: Field, input: &str, unit: TimeUnit, now: i64)
    -> Result<Filter, String>
{
    let window = parse_window(input)?;
    if !window.suffix.is_empty() {
        return Err(format!("unexpected trailing '{}'", window.suffix));
    }

    let out_of_range = || String::from("time window out of range");

    let delta = i64::try_from(window.magnitude)
        .ok()
        .and_then(|magnitude| magnitude.checked_mul(unit.seconds()))
        .ok_or_else(out_of_range)?;
    let then = now.checked_sub(delta).ok_or_else(out_of_range)?;

    let compare = |op, bound| Filter::compare(
        field.clone(), op, Value::Integer(bound)
    );

    Ok(match window.qualifier {
        Qualifier::AtLeast => compare(Operator::Less, then),
        Qualifier::AtMost => compare(Operator::Greater, then),
        Qualifier::Exact => {
            let earliest = then
                .checked_sub(unit.seconds())
                .ok_or_else(out_of_range)?;
            Filter::And(vec![
                compare(Operator::Greater, earliest),
                compare(Operator::LessOrEqual, then),
            ])
        }
    })
}

fn size_unit(suffix: &str) -> Option<u64> {
    Some(match suffix {
        "c" => 1,
        "w" => 2,
        "" | "b" => 512,
        "k" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        _ => return None,
    })
}

/// Builds the filter for `-size`.
///
/// Sizes are rounded up to the unit: `+N` is `size > N*u`, `-N` is
/// `size <= (N-1)*u` and `N` is `(N-1)*u < size <= N*u`. Only `+0` may have
/// a zero magnitude.
pub fn size_filter(input: &str) -> Result<Filter, String> {
    let window = parse_window(input)?;
    let unit = size_unit(window.suffix)
        .ok_or_else(|| format!("unknown size unit '{}'", window.suffix))?;
    if window.magnitude == 0 && window.qualifier != Qualifier::AtLeast {
        return Err(String::from("size must be at least one unit"));
    }

    let out_of_range = || String::from("size out of range");
    let upper = window.magnitude.checked_mul(unit).ok_or_else(out_of_range)?;
    let lower = upper.saturating_sub(unit);

    let compare = |op, bound| Filter::compare(
        Field::Size, op, Value::Unsigned(bound)
    );

    Ok(match window.qualifier {
        Qualifier::AtLeast => compare(Operator::Greater, upper),
        Qualifier::AtMost => compare(Operator::LessOrEqual, lower),
        Qualifier::Exact => Filter::And(vec![
            compare(Operator::Greater, lower),
            compare(Operator::LessOrEqual, upper),
        ]),
    })
}

/// Builds the filter for plain counters such as `-uid` or `-links`:
/// `+N` is greater, `-N` is less and `N` is equal.
pub fn numeric_filter(field: Field, input: &str) -> Result<Filter, String> {
    let window = parse_window(input)?;
    if !window.suffix.is_empty() {
        return Err(format!("unexpected trailing '{}'", window.suffix));
    }

    let op = match window.qualifier {
        Qualifier::AtLeast => Operator::Greater,
        Qualifier::AtMost => Operator::Less,
        Qualifier::Exact => Operator::Equal,
    };
    Ok(Filter::compare(field, op, Value::Unsigned(window.magnitude)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::matches_locally;
    use crate::fs::{Entry, Stat};

    const NOW: i64 = 1_600_000_000;

    fn accessed(seconds_ago: i64) -> Entry {
        Entry::new("/file", Stat { atime: NOW - seconds_ago, ..Stat::default() })
    }

    fn sized(size: u64) -> Entry {
        Entry::new("/file", Stat { size, ..Stat::default() })
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("+5k").unwrap(), Window {
            qualifier: Qualifier::AtLeast,
            magnitude: 5,
            suffix: "k",
        });
        assert_eq!(parse_window("-0").unwrap().qualifier, Qualifier::AtMost);
        assert!(parse_window("").is_err());
        assert!(parse_window("+").is_err());
        assert!(parse_window("abc").is_err());
        assert!(parse_window("99999999999999999999999").is_err());
    }

    #[test]
    fn test_amin_boundaries() {
        // (argument, seconds since access, expected match)
        let table = [
            ("+5", 300, false),
            ("+5", 301, true),
            ("+5", 299, false),
            ("-5", 299, true),
            ("-5", 300, false),
            ("-5", 0, true),
            ("5", 299, false),
            ("5", 300, true),
            ("5", 359, true),
            ("5", 360, false),
            ("0", 0, true),
            ("0", 59, true),
            ("0", 60, false),
        ];

        for (input, ago, expected) in table.iter() {
            let filter =
                time_filter(Field::Atime, input, TimeUnit::Minutes, NOW)
                    .unwrap();
            assert_eq!(matches_locally(&filter, &accessed(*ago)), *expected,
                       "-amin {} against {}s ago", input, ago);
        }
    }

    #[test]
    fn test_time_days() {
        let filter = time_filter(Field::Atime, "+1", TimeUnit::Days, NOW)
            .unwrap();
        assert!(matches_locally(&filter, &accessed(DAY + 1)));
        assert!(!matches_locally(&filter, &accessed(DAY)));
    }

    #[test]
    fn test_time_rejects_garbage() {
        assert!(time_filter(Field::Atime, "5m", TimeUnit::Minutes, NOW).is_err());
        assert!(time_filter(Field::Atime, "x", TimeUnit::Minutes, NOW).is_err());
        assert!(time_filter(Field::Atime, "+18446744073709551615",
                            TimeUnit::Days, NOW).is_err());
    }

    #[test]
    fn test_size_boundaries() {
        let table = [
            ("+1k", 1024, false),
            ("+1k", 1025, true),
            ("-2k", 1024, true),
            ("-2k", 1025, false),
            ("2k", 1024, false),
            ("2k", 1025, true),
            ("2k", 2048, true),
            ("2k", 2049, false),
            ("1", 512, true),
            ("1", 0, false),
            ("10c", 10, true),
            ("+1G", 2 << 30, true),
            ("+0", 0, false),
            ("+0", 1, true),
            ("+0c", 1, true),
        ];

        for (input, size, expected) in table.iter() {
            let filter = size_filter(input).unwrap();
            assert_eq!(matches_locally(&filter, &sized(*size)), *expected,
                       "-size {} against {} bytes", input, size);
        }
    }

    #[test]
    fn test_size_rejects_garbage() {
        assert!(size_filter("0").is_err());
        assert!(size_filter("-0").is_err());
        assert!(size_filter("0k").is_err());
        assert!(size_filter("1x").is_err());
        assert!(size_filter("1kk").is_err());
        assert!(size_filter("+99999999999T").is_err());
    }

    #[test]
    fn test_numeric_filter() {
        assert_eq!(
            numeric_filter(Field::Uid, "+10").unwrap(),
            Filter::compare(Field::Uid, Operator::Greater, Value::Unsigned(10))
        );
        assert_eq!(
            numeric_filter(Field::Nlink, "2").unwrap(),
            Filter::compare(Field::Nlink, Operator::Equal, Value::Unsigned(2))
        );
        assert!(numeric_filter(Field::Uid, "1k").is_err());
    }
}
