//! Compound TTL parsing (`90m`, `2h30m`, `1d`, `45s`).
//!
//! The input is scanned for `<integer><unit>` fragments; anything between
//! fragments is ignored and every fragment adds to the total.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use crate::{Result, ShareError};

static FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)\s*([smhd])").expect("valid TTL regex"));

/// TTL applied when none is given.
pub fn default_ttl() -> Duration {
    Duration::days(1)
}

/// Parse a TTL string into a duration.
///
/// `None` and blank input yield one day. A total of zero, including input
/// with no recognizable fragment, is rejected.
pub fn parse_ttl(text: Option<&str>) -> Result<Duration> {
    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Ok(default_ttl()),
    };

    let invalid = || ShareError::InvalidDuration(text.to_string());
    let mut total_secs: i64 = 0;

    for caps in FRAGMENT_RE.captures_iter(text) {
        let n: i64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_secs = match caps[2].to_ascii_lowercase().as_str() {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            _ => unreachable!("regex only matches s/m/h/d"),
        };
        total_secs = n
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(invalid)?;
    }

    if total_secs == 0 {
        return Err(invalid());
    }

    Duration::try_seconds(total_secs).ok_or_else(invalid)
}

/// Render a duration compactly, largest units first (`1d2h`, `45s`).
pub fn format_ttl(ttl: Duration) -> String {
    let mut secs = ttl.num_seconds();
    if secs <= 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_ttl(Some("45s")).unwrap(), Duration::seconds(45));
        assert_eq!(parse_ttl(Some("90m")).unwrap(), Duration::minutes(90));
        assert_eq!(parse_ttl(Some("2h")).unwrap(), Duration::hours(2));
        assert_eq!(parse_ttl(Some("3d")).unwrap(), Duration::days(3));
    }

    #[test]
    fn test_compound_is_order_independent() {
        let a = parse_ttl(Some("1h30m")).unwrap();
        let b = parse_ttl(Some("30m1h")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Duration::minutes(90));
    }

    #[test]
    fn test_duplicate_units_sum() {
        assert_eq!(parse_ttl(Some("1h1h")).unwrap(), Duration::hours(2));
    }

    #[test]
    fn test_case_insensitive_and_garbage_between() {
        assert_eq!(
            parse_ttl(Some("2H, then 15M please")).unwrap(),
            Duration::minutes(135)
        );
        assert_eq!(parse_ttl(Some("1 d")).unwrap(), Duration::days(1));
    }

    #[test]
    fn test_empty_defaults_to_one_day() {
        assert_eq!(parse_ttl(None).unwrap(), Duration::days(1));
        assert_eq!(parse_ttl(Some("")).unwrap(), Duration::days(1));
    }

    #[test]
    fn test_zero_and_unmatched_rejected() {
        assert!(matches!(
            parse_ttl(Some("0s")),
            Err(ShareError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_ttl(Some("0h0m")),
            Err(ShareError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_ttl(Some("soon")),
            Err(ShareError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_ttl(Some("12")),
            Err(ShareError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(parse_ttl(Some("99999999999999999999d")).is_err());
        assert!(parse_ttl(Some("9223372036854775807d")).is_err());
    }

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(Duration::days(1)), "1d");
        assert_eq!(format_ttl(Duration::minutes(150)), "2h30m");
        assert_eq!(format_ttl(Duration::seconds(45)), "45s");
    }
}
