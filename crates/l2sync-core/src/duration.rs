//! Duration strings in the `168h` / `1h30m` / `500ms` notation
//!
//! A duration is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit suffix. Valid units are `ns`, `us`
//! (or `µs`), `ms`, `s`, `m` and `h`. The bare string `"0"` is accepted.
//! Negative durations are rejected.

use crate::error::{Error, Result};
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration string such as `"168h"`, `"30m"` or `"1h30m"`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::invalid_input("empty duration"));
    }
    if s.starts_with('-') {
        return Err(Error::invalid_input(format!(
            "negative duration not allowed: {input}"
        )));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let scale = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => {
                return Err(Error::invalid_input(format!(
                    "missing unit in duration: {input}"
                )));
            }
            other => {
                return Err(Error::invalid_input(format!(
                    "unknown unit '{other}' in duration: {input}"
                )));
            }
        };

        total = total
            .checked_add(component_nanos(number, scale, input)?)
            .ok_or_else(|| Error::invalid_input(format!("duration overflows: {input}")))?;
    }

    let nanos = u64::try_from(total)
        .map_err(|_| Error::invalid_input(format!("duration overflows: {input}")))?;
    Ok(Duration::from_nanos(nanos))
}

fn component_nanos(number: &str, scale: u128, input: &str) -> Result<u128> {
    let invalid = || Error::invalid_input(format!("invalid duration: {input}"));

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

    if !fraction.is_empty() {
        // digits beyond nanosecond precision only add noise
        let fraction = &fraction[..fraction.len().min(18)];
        let value: u128 = fraction.parse().map_err(|_| invalid())?;
        let denominator = 10u128.pow(fraction.len() as u32);
        nanos += value * scale / denominator;
    }

    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("168h").unwrap(), Duration::from_secs(168 * 3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m0.25s").unwrap(), Duration::from_millis(120_250));
    }

    #[test]
    fn zero_is_accepted() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "h", "10", "10x", "-5m", "1..5s", "abc", "1h 30m"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
