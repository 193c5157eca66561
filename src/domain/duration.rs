//! Compound duration strings such as `"90s"`, `"10m"`, `"1h30m"` or `"250ms"`.

use std::time::Duration;

use super::error::DomainError;

const UNITS: [(&str, f64); 7] = [
    ("ns", 1.0),
    ("us", 1_000.0),
    ("µs", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Parses a duration string made of one or more `<number><unit>` terms.
///
/// A bare `"0"` is accepted as the zero duration. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_duration(input, "empty duration"));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.starts_with('-') {
        return Err(DomainError::invalid_duration(input, "duration must not be negative"));
    }
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DomainError::invalid_duration(input, "expected a number"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| DomainError::invalid_duration(input, "malformed number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|ch: char| ch.is_ascii_digit() || ch == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                if unit.is_empty() {
                    DomainError::invalid_duration(input, "missing unit")
                } else {
                    DomainError::invalid_duration(input, format!("unknown unit `{unit}`"))
                }
            })?;
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(DomainError::invalid_duration(input, "duration out of range"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Formats a duration using the largest whole units, e.g. `1h30m` or `250ms`.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    let total_ms = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 || total_ms == 0 {
        return format!("{}ns", duration.as_nanos());
    }
    if total_ms % 1_000 != 0 {
        return format!("{total_ms}ms");
    }

    let mut secs = duration.as_secs();
    let mut out = String::new();
    let hours = secs / 3_600;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
        secs %= 3_600;
    }
    let minutes = secs / 60;
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
        secs %= 60;
    }
    if secs > 0 {
        out.push_str(&format!("{secs}s"));
    }
    out
}
