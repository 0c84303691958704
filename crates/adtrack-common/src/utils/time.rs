use chrono::{DateTime, TimeDelta, Utc};

/// Target chain block time.
pub const BLOCK_DURATION_SECS: i64 = 12;

const BLOCKS_PER_DAY: u64 = 86_400 / BLOCK_DURATION_SECS as u64;

/// `blocks` worth of chain time, or `None` when it does not fit a [`TimeDelta`].
pub fn blocks_to_duration(blocks: u64) -> Option<TimeDelta> {
    let secs = i64::try_from(blocks).ok()?.checked_mul(BLOCK_DURATION_SECS)?;
    TimeDelta::try_seconds(secs)
}

/// Whole blocks in `days`, saturating.
pub fn days_to_blocks(days: u64) -> u64 {
    days.saturating_mul(BLOCKS_PER_DAY)
}

/// Block height implied by wall-clock time, counting from the unix epoch.
pub fn block_at(time: DateTime<Utc>) -> u64 {
    (time.timestamp() / BLOCK_DURATION_SECS).max(0) as u64
}

/// `time - delta`, pinned to the earliest representable instant on overflow.
pub fn saturating_sub(time: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    time.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The instant `blocks` before `time`. Windows reaching past the earliest
/// representable instant start there.
pub fn blocks_before(time: DateTime<Utc>, blocks: u64) -> DateTime<Utc> {
    match blocks_to_duration(blocks) {
        Some(delta) => saturating_sub(time, delta),
        None => DateTime::<Utc>::MIN_UTC,
    }
}

/// Hours as a [`TimeDelta`], saturating at [`TimeDelta::MAX`].
pub fn hours(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_hours)
        .unwrap_or(TimeDelta::MAX)
}

/// Seconds as a [`TimeDelta`], saturating at [`TimeDelta::MAX`].
pub fn seconds(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Days as a [`TimeDelta`], saturating at [`TimeDelta::MAX`].
pub fn days(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_days)
        .unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn test_block_conversions() {
        assert_eq!(blocks_to_duration(300), Some(TimeDelta::hours(1)));
        assert_eq!(days_to_blocks(30), 216_000);
        assert_eq!(days_to_blocks(u64::MAX), u64::MAX);

        let time = Utc.with_ymd_and_hms(1970, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(block_at(time), 300);
        assert_eq!(blocks_before(time, 300), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_oversized_windows_saturate() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(blocks_to_duration(1_000_000_000_000_000_000), None);
        assert_eq!(blocks_to_duration(u64::MAX), None);
        assert_eq!(blocks_to_duration(1_000_000_000_000_000), None);
        assert_eq!(blocks_before(now, 100_000_000_000_000), DateTime::<Utc>::MIN_UTC);
        assert_eq!(blocks_before(now, u64::MAX), DateTime::<Utc>::MIN_UTC);

        // fits a TimeDelta but not the calendar
        let far = blocks_to_duration(700_000_000_000).unwrap();
        assert_eq!(saturating_sub(now, far), DateTime::<Utc>::MIN_UTC);

        assert_eq!(hours(u64::MAX), TimeDelta::MAX);
        assert_eq!(days(u64::MAX), TimeDelta::MAX);
        assert_eq!(seconds(3600), TimeDelta::hours(1));
        assert_eq!(saturating_sub(now, hours(u64::MAX)), DateTime::<Utc>::MIN_UTC);
    }
}
