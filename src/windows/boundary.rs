//! Reset boundaries for daily and weekly windows
//!
//! This is the only place the reset rule is computed. Everything that needs
//! a window edge (usage gates, cache expiry, activity-day keys, compaction
//! cutoffs) goes through [`reset_boundary`].

use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};

/// Hour of day (UTC) at which daily windows roll over
pub const DAILY_RESET_HOUR: u32 = 4;

/// Day on which weekly windows roll over, at [`DAILY_RESET_HOUR`]
pub const WEEKLY_RESET_DAY: Weekday = Weekday::Mon;

const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Daily,
    Weekly,
}

impl WindowKind {
    pub fn period(self) -> Duration {
        match self {
            WindowKind::Daily => Duration::seconds(SECS_PER_DAY),
            WindowKind::Weekly => Duration::seconds(SECS_PER_WEEK),
        }
    }

    /// Seconds since the Unix epoch of the first reset instant
    fn anchor_secs(self) -> i64 {
        let hour = i64::from(DAILY_RESET_HOUR) * 3_600;
        match self {
            WindowKind::Daily => hour,
            WindowKind::Weekly => {
                // 1970-01-01 was a Thursday.
                let thursday = i64::from(Weekday::Thu.num_days_from_monday());
                let target = i64::from(WEEKLY_RESET_DAY.num_days_from_monday());
                (target - thursday).rem_euclid(7) * SECS_PER_DAY + hour
            }
        }
    }
}

/// Most recent reset instant at or before `now`
pub fn reset_boundary(kind: WindowKind, now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = (now.timestamp() - kind.anchor_secs()).rem_euclid(kind.period().num_seconds());
    now - Duration::seconds(offset) - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

/// First reset instant strictly after `now`
pub fn next_reset(kind: WindowKind, now: DateTime<Utc>) -> DateTime<Utc> {
    reset_boundary(kind, now) + kind.period()
}

/// Calendar key of the daily window containing `at`
pub fn day_key(at: DateTime<Utc>) -> NaiveDate {
    reset_boundary(WindowKind::Daily, at).date_naive()
}
