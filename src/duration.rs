//! Human duration strings (`250ms`, `15s`, `1m30s`, `2h`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{QprofError, QprofResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct QprofDuration(pub Duration);

impl QprofDuration {
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl FromStr for QprofDuration {
    type Err = QprofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

impl fmt::Display for QprofDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.0))
    }
}

impl Serialize for QprofDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(self.0))
    }
}

impl<'de> Deserialize<'de> for QprofDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// Parses a sequence of `<integer><unit>` groups. `0` alone is accepted.
pub fn parse_duration(input: &str) -> QprofResult<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(QprofError::InvalidArgument("empty duration".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(QprofError::InvalidArgument(format!(
                "invalid duration {input:?}: expected a number"
            )));
        }
        let (num, tail) = rest.split_at(digits);
        let value: u64 = num
            .parse()
            .map_err(|e| QprofError::InvalidArgument(format!("invalid duration {input:?}: {e}")))?;
        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let part = match unit {
            "ns" => Duration::from_nanos(value),
            "us" | "µs" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "" => {
                return Err(QprofError::InvalidArgument(format!(
                    "invalid duration {input:?}: missing unit"
                )));
            }
            other => {
                return Err(QprofError::InvalidArgument(format!(
                    "invalid duration {input:?}: unknown unit {other:?}"
                )));
            }
        };
        total = total.saturating_add(part);
        rest = next;
    }
    Ok(total)
}

pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d.subsec_nanos() != 0 {
        return format!("{d:?}");
    }
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("1m30s").expect("parse"), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").expect("parse"), Duration::from_millis(250));
        assert_eq!(parse_duration("2h").expect("parse"), Duration::from_secs(7200));
        assert_eq!(parse_duration("0").expect("parse"), Duration::ZERO);
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn formats_whole_and_fractional_durations() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(QprofDuration(Duration::from_secs(15)).to_string(), "15s");
    }
}
