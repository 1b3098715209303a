//! Duration text in the `1m30s` / `500ms` / `-1s` form.
//!
//! Timeout annotations and the persisted service list both carry durations
//! as text in this form, so parsing and formatting have to round-trip the
//! exact strings existing deployments already hold.

use std::fmt;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Error returned by [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParseError {
    input: String,
    reason: &'static str,
}

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for DurationParseError {}

/// Parse a duration string into signed nanoseconds.
///
/// Accepts an optional sign followed by one or more `<number><unit>`
/// groups, where the number may carry a fraction and the unit is one of
/// `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`. A bare `0` is also accepted.
///
/// # Example
///
/// ```rust
/// use mesh_core::duration::parse_duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), 90_000_000_000);
/// assert_eq!(parse_duration("-1.5s").unwrap(), -1_500_000_000);
/// assert!(parse_duration("90").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<i64, DurationParseError> {
    let fail = |reason| DurationParseError {
        input: input.to_string(),
        reason,
    };

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(fail("empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(fail("expected a number"));
        }

        let unit_len = after_number
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map_or(after_number.len(), |(idx, _)| idx);
        let (unit, tail) = after_number.split_at(unit_len);
        let scale = match unit {
            "ns" => 1,
            "us" | "\u{00b5}s" | "\u{03bc}s" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            "" => return Err(fail("missing unit")),
            _ => return Err(fail("unknown unit")),
        };

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| fail("number overflow"))?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(|| fail("number overflow"))?;

        // Fraction digits beyond nanosecond precision contribute nothing.
        let mut divisor: u128 = 1;
        let mut fraction: u128 = 0;
        for digit in frac_digits.bytes().take(18) {
            fraction = fraction * 10 + u128::from(digit - b'0');
            divisor *= 10;
        }
        value += fraction * scale / divisor;

        total = total.checked_add(value).ok_or_else(|| fail("number overflow"))?;
        if total > i64::MAX as u128 {
            return Err(fail("number overflow"));
        }
        rest = tail;
    }

    // Bounded by i64::MAX above.
    let magnitude = total as i64;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Format signed nanoseconds in the shortest `1h2m3.5s` style form.
///
/// Durations under one second use the largest sub-second unit that keeps
/// the integer part non-zero (`500ms`, `1.5µs`, `10ns`); zero is `0s`.
///
/// # Example
///
/// ```rust
/// use mesh_core::duration::format_duration;
///
/// assert_eq!(format_duration(60_000_000_000), "1m0s");
/// assert_eq!(format_duration(1_500_000_000), "1.5s");
/// assert_eq!(format_duration(-1_000_000_000), "-1s");
/// ```
#[must_use]
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }

    let sign = if nanos < 0 { "-" } else { "" };
    let magnitude = u128::from(nanos.unsigned_abs());

    let body = if magnitude < NANOS_PER_SECOND {
        let (unit, scale) = if magnitude < NANOS_PER_MICRO {
            ("ns", 1)
        } else if magnitude < NANOS_PER_MILLI {
            ("\u{00b5}s", NANOS_PER_MICRO)
        } else {
            ("ms", NANOS_PER_MILLI)
        };
        format!("{}{unit}", with_fraction(magnitude, scale))
    } else {
        let whole_seconds = magnitude / NANOS_PER_SECOND;
        let fraction = fraction_suffix(magnitude % NANOS_PER_SECOND, NANOS_PER_SECOND);
        let seconds = format!("{}{fraction}s", whole_seconds % 60);

        let minutes = whole_seconds / 60;
        if minutes == 0 {
            seconds
        } else if minutes < 60 {
            format!("{minutes}m{seconds}")
        } else {
            format!("{}h{}m{seconds}", minutes / 60, minutes % 60)
        }
    };

    format!("{sign}{body}")
}

fn with_fraction(value: u128, scale: u128) -> String {
    format!("{}{}", value / scale, fraction_suffix(value % scale, scale))
}

fn fraction_suffix(remainder: u128, scale: u128) -> String {
    if remainder == 0 {
        return String::new();
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{remainder:0width$}");
    format!(".{}", digits.trim_end_matches('0'))
}
