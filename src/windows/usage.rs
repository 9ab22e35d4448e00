//! Usage counting against window caps
//!
//! These read raw events, so they work on the uncompacted tail; compaction
//! always keeps more than a week of tail.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Event, EventType, GoalNurturedData};

use super::boundary::{day_key, next_reset, reset_boundary, WindowKind};

/// Per-window caps, enforced at read time only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCaps {
    pub nurtures_per_goal_per_day: u32,
    pub reflections_per_week: u32,
}

impl Default for UsageCaps {
    fn default() -> Self {
        Self {
            nurtures_per_goal_per_day: 1,
            reflections_per_week: 3,
        }
    }
}

/// Remaining allowance in the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowance {
    pub cap: u32,
    /// May exceed `cap` when several devices acted before syncing
    pub used: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

impl Allowance {
    fn new(kind: WindowKind, cap: u32, used: usize, now: DateTime<Utc>) -> Self {
        let used = u32::try_from(used).unwrap_or(u32::MAX);
        Self {
            cap,
            used,
            remaining: available(cap, used),
            resets_at: next_reset(kind, now),
        }
    }

    /// "Already done" for this window
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// `max(0, capacity - used)`
pub fn available(capacity: u32, used: u32) -> u32 {
    capacity.saturating_sub(used)
}

/// Distinct events of a type at or after `boundary`
pub fn usage_since(events: &[Event], event_type: &EventType, boundary: DateTime<Utc>) -> usize {
    count_unique(
        events
            .iter()
            .filter(|e| &e.event_type == event_type && e.timestamp >= boundary),
    )
}

/// Distinct nurture events for one goal at or after `boundary`
pub fn nurtures_since(events: &[Event], goal_id: &str, boundary: DateTime<Utc>) -> usize {
    count_unique(events.iter().filter(|e| {
        e.event_type == EventType::GoalNurtured
            && e.timestamp >= boundary
            && e
                .parse_data::<GoalNurturedData>()
                .map(|d| d.goal_id == goal_id)
                .unwrap_or(false)
    }))
}

pub fn nurture_allowance(
    events: &[Event],
    goal_id: &str,
    caps: &UsageCaps,
    now: DateTime<Utc>,
) -> Allowance {
    let boundary = reset_boundary(WindowKind::Daily, now);
    let used = nurtures_since(events, goal_id, boundary);
    Allowance::new(WindowKind::Daily, caps.nurtures_per_goal_per_day, used, now)
}

pub fn reflection_allowance(events: &[Event], caps: &UsageCaps, now: DateTime<Utc>) -> Allowance {
    let boundary = reset_boundary(WindowKind::Weekly, now);
    let used = usage_since(events, &EventType::ReflectionRecorded, boundary);
    Allowance::new(WindowKind::Weekly, caps.reflections_per_week, used, now)
}

/// Consecutive active days ending today, or yesterday when today is still empty
pub fn streak(activity_days: &BTreeSet<NaiveDate>, now: DateTime<Utc>) -> u32 {
    let today = day_key(now);
    let mut day = if activity_days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut count = 0;
    while activity_days.contains(&day) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}

fn count_unique<'a>(events: impl Iterator<Item = &'a Event>) -> usize {
    events
        .map(|e| e.client_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, ReflectionRecordedData};
    use chrono::{Duration, TimeZone};

    fn nurture(goal: &str, id: &str, at: DateTime<Utc>) -> Event {
        let payload = EventPayload::GoalNurtured(GoalNurturedData {
            goal_id: goal.to_string(),
            text: "did the thing".to_string(),
        });
        Event::new(&payload, at, id).unwrap()
    }

    fn reflection(id: &str, at: DateTime<Utc>) -> Event {
        let payload = EventPayload::ReflectionRecorded(ReflectionRecordedData {
            facet_id: "health".to_string(),
            text: "slept well".to_string(),
            cue_id: None,
        });
        Event::new(&payload, at, id).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_available_never_negative() {
        assert_eq!(available(3, 1), 2);
        assert_eq!(available(1, 2), 0);
    }

    #[test]
    fn test_usage_counts_only_current_window() {
        let events = vec![
            nurture("g-1", "a", noon() - Duration::days(1)),
            nurture("g-1", "b", noon() - Duration::hours(2)),
            nurture("g-2", "c", noon() - Duration::hours(1)),
        ];
        let boundary = reset_boundary(WindowKind::Daily, noon());

        assert_eq!(usage_since(&events, &EventType::GoalNurtured, boundary), 2);
        assert_eq!(nurtures_since(&events, "g-1", boundary), 1);
        assert_eq!(nurtures_since(&events, "g-3", boundary), 0);
    }

    #[test]
    fn test_duplicate_client_ids_count_once() {
        let event = nurture("g-1", "a", noon());
        let events = vec![event.clone(), event];
        let allowance = nurture_allowance(&events, "g-1", &UsageCaps::default(), noon());
        assert_eq!(allowance.used, 1);
    }

    #[test]
    fn test_over_cap_usage_is_tolerated() {
        // Two devices nurtured the same goal before syncing
        let events = vec![
            nurture("g-1", "phone", noon() - Duration::hours(1)),
            nurture("g-1", "laptop", noon() - Duration::minutes(30)),
        ];
        let allowance = nurture_allowance(&events, "g-1", &UsageCaps::default(), noon());

        assert_eq!(allowance.used, 2);
        assert_eq!(allowance.remaining, 0);
        assert!(allowance.is_exhausted());
        assert_eq!(allowance.resets_at, Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_reflection_allowance_is_weekly() {
        // 2024-03-14 is a Thursday; the week started Monday 2024-03-11 04:00
        let events = vec![
            reflection("r-1", Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap()),
            reflection("r-2", Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap()),
            reflection("r-3", Utc.with_ymd_and_hms(2024, 3, 13, 9, 0, 0).unwrap()),
        ];
        let allowance = reflection_allowance(&events, &UsageCaps::default(), noon());

        assert_eq!(allowance.used, 2);
        assert_eq!(allowance.remaining, 1);
    }

    #[test]
    fn test_streak() {
        let days: BTreeSet<NaiveDate> = [11, 12, 13, 9]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .collect();

        // Thursday noon, nothing logged yet today
        assert_eq!(streak(&days, noon()), 3);
        // 03:00 on the 14th still belongs to the 13th's window
        assert_eq!(streak(&days, Utc.with_ymd_and_hms(2024, 3, 14, 3, 0, 0).unwrap()), 3);
        assert_eq!(streak(&days, noon() + Duration::days(2)), 0);
        assert_eq!(streak(&BTreeSet::new(), noon()), 0);
    }
}
