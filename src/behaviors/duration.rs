//! Parsing of duration strings such as `"1m30s"` or `"-1.5h"`.
//!
//! A duration is an optional sign followed by one or more `<number><unit>`
//! terms. Numbers may carry a fraction. Units are `ns`, `us` (also `µs` and
//! `μs`), `ms`, `s`, `m`, and `h`. A bare `0` needs no unit.

use chrono::TimeDelta;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

// Fraction digits beyond this cannot change a nanosecond count.
const MAX_FRACTION_DIGITS: usize = 20;

/// Errors returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// The string does not follow the duration grammar.
    #[error("invalid duration '{0}'")]
    Invalid(String),
    /// A number was not followed by a unit.
    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),
    /// A unit is not recognised.
    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit {
        /// The full input.
        input: String,
        /// The unrecognised unit.
        unit: String,
    },
    /// The value does not fit in a signed 64-bit nanosecond count.
    #[error("duration '{0}' is out of range")]
    OutOfRange(String),
}

/// Parses a duration string.
///
/// # Errors
///
/// Returns [`DurationParseError`] when the input is empty, malformed, uses an
/// unknown unit, or overflows.
pub fn parse_duration(input: &str) -> Result<TimeDelta, DurationParseError> {
    let (negative, unsigned) = input.strip_prefix('-').map_or_else(
        || (false, input.strip_prefix('+').unwrap_or(input)),
        |rest| (true, rest),
    );
    if unsigned == "0" {
        return Ok(TimeDelta::zero());
    }
    if unsigned.is_empty() {
        return Err(DurationParseError::Invalid(input.to_owned()));
    }

    let mut total: u128 = 0;
    let mut rest = unsigned;
    while !rest.is_empty() {
        let (nanos, remaining) = parse_term(input, rest)?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| DurationParseError::OutOfRange(input.to_owned()))?;
        rest = remaining;
    }

    let magnitude = i64::try_from(total)
        .map_err(|_| DurationParseError::OutOfRange(input.to_owned()))?;
    Ok(TimeDelta::nanoseconds(if negative { -magnitude } else { magnitude }))
}

/// Parses one `<number><unit>` term, returning its nanoseconds and the rest.
fn parse_term<'a>(input: &str, term: &'a str) -> Result<(u128, &'a str), DurationParseError> {
    let (whole, after_whole) = split_digits(term);
    let (fraction, after_number) = after_whole
        .strip_prefix('.')
        .map_or(("", after_whole), split_digits);
    if whole.is_empty() && fraction.is_empty() {
        return Err(DurationParseError::Invalid(input.to_owned()));
    }

    let unit_end = after_number
        .find(|c: char| c == '.' || c.is_ascii_digit())
        .unwrap_or(after_number.len());
    let (unit, remaining) = after_number.split_at(unit_end);
    if unit.is_empty() {
        return Err(DurationParseError::MissingUnit(input.to_owned()));
    }
    let scale = unit_scale(unit).ok_or_else(|| DurationParseError::UnknownUnit {
        input: input.to_owned(),
        unit: unit.to_owned(),
    })?;

    let out_of_range = || DurationParseError::OutOfRange(input.to_owned());
    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| out_of_range())?
    };
    let whole_nanos = whole_value.checked_mul(scale).ok_or_else(out_of_range)?;
    let nanos = whole_nanos
        .checked_add(fraction_nanos(fraction, scale))
        .ok_or_else(out_of_range)?;
    Ok((nanos, remaining))
}

fn split_digits(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Scales a fractional part, truncating below one nanosecond.
#[expect(
    clippy::integer_division,
    reason = "sub-nanosecond remainders are discarded"
)]
fn fraction_nanos(fraction: &str, scale: u128) -> u128 {
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for digit in fraction.bytes().take(MAX_FRACTION_DIGITS) {
        numerator = numerator * 10 + u128::from(digit - b'0');
        denominator *= 10;
    }
    numerator * scale / denominator
}

fn unit_scale(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}
