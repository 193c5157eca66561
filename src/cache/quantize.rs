//! Time-bucketed expiry with per-discriminator phase offsets.

use std::time::Duration;

use time::OffsetDateTime;

use super::keys::digest64;

/// Maps `now` onto a time bucket for `discriminator`.
///
/// With a non-zero `duration`, all instants inside one `duration`-long window share a
/// bucket. The window boundaries are shifted by a phase derived from the discriminator,
/// so different paths roll over at different instants. A zero `duration` disables caching:
/// the full-resolution timestamp is returned, which differs on practically every call.
pub fn quantize(now: OffsetDateTime, duration: Duration, discriminator: &str) -> i64 {
    let now_ns = now.unix_timestamp_nanos();
    if duration.is_zero() {
        return now_ns as i64;
    }

    let span = duration.as_nanos() as i128;
    let offset = phase(duration, discriminator).as_nanos() as i128;
    now_ns.saturating_add(offset).div_euclid(span) as i64
}

/// Offset applied to the bucket boundaries of `discriminator`.
pub fn phase(duration: Duration, discriminator: &str) -> Duration {
    let duration_ns = duration.as_nanos();
    if duration_ns == 0 {
        return Duration::ZERO;
    }
    let phase = u128::from(digest64(discriminator.as_bytes())) % duration_ns;
    Duration::from_nanos(phase as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ns: i128) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(ns).unwrap()
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn zero_duration_changes_every_call() {
        let a = quantize(at(1_000), Duration::ZERO, "index.html");
        let b = quantize(at(1_001), Duration::ZERO, "index.html");
        assert_ne!(a, b);
    }

    #[test]
    fn instants_inside_one_window_share_a_bucket() {
        let discriminator = "blog/post1.html";
        let phase = phase(MINUTE, discriminator).as_nanos() as i128;
        let minute = MINUTE.as_nanos() as i128;
        // First instant of a window for this discriminator.
        let start = 1_700_000_000 * 1_000_000_000 / minute * minute + minute - phase;

        let first = quantize(at(start), MINUTE, discriminator);
        let last = quantize(at(start + minute - 1), MINUTE, discriminator);
        let next = quantize(at(start + minute), MINUTE, discriminator);
        assert_eq!(first, last);
        assert_eq!(next, first + 1);
    }

    #[test]
    fn discriminators_roll_over_at_different_instants() {
        let names: Vec<String> = (0..32).map(|i| format!("page{i}.html")).collect();
        let phases: std::collections::HashSet<Duration> =
            names.iter().map(|name| phase(MINUTE, name)).collect();
        assert!(phases.len() > 1);
    }

    #[test]
    fn quantize_is_deterministic() {
        let now = at(1_700_000_123_456_789_000);
        assert_eq!(
            quantize(now, MINUTE, "photos/cat.html"),
            quantize(now, MINUTE, "photos/cat.html")
        );
    }

    #[test]
    fn instants_before_the_epoch_are_supported() {
        let bucket = quantize(at(-1), Duration::from_secs(1), "x");
        assert!(bucket <= 0);
    }
}
