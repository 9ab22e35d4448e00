//! Cache for window-scoped query results
//!
//! An entry is reused only while both hold: no event was added since it was
//! computed, and the window it was computed in has not rolled over. The event
//! count alone is not enough; a day can end without anything being logged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::boundary::{next_reset, WindowKind};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    event_count: usize,
    valid_until: DateTime<Utc>,
}

/// Keyed cache of window query results
#[derive(Debug, Clone)]
pub struct WindowCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T: Clone> WindowCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cached value for `key`, if still valid at `now` for a log of `event_count` events
    pub fn get(&self, key: &str, event_count: usize, now: DateTime<Utc>) -> Option<T> {
        self.entries
            .get(key)
            .filter(|e| e.event_count == event_count && now < e.valid_until)
            .map(|e| e.value.clone())
    }

    /// Store a value computed at `now` for the window `kind`
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: T,
        kind: WindowKind,
        event_count: usize,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                event_count,
                valid_until: next_reset(kind, now),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for WindowCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_hit_within_window() {
        let mut cache = WindowCache::new();
        cache.insert("k", 7u32, WindowKind::Daily, 10, noon());

        assert_eq!(cache.get("k", 10, noon() + Duration::hours(15)), Some(7));
    }

    #[test]
    fn test_new_event_invalidates() {
        let mut cache = WindowCache::new();
        cache.insert("k", 7u32, WindowKind::Daily, 10, noon());

        assert_eq!(cache.get("k", 11, noon()), None);
    }

    #[test]
    fn test_reset_boundary_invalidates_without_new_events() {
        let mut cache = WindowCache::new();
        cache.insert("k", 7u32, WindowKind::Daily, 10, noon());

        // 2024-03-15 04:00 is the next daily reset
        let after_reset = Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap();
        assert_eq!(cache.get("k", 10, after_reset - Duration::seconds(1)), Some(7));
        assert_eq!(cache.get("k", 10, after_reset), None);
    }

    #[test]
    fn test_weekly_entry_outlives_daily_reset() {
        let mut cache = WindowCache::new();
        cache.insert("w", 1u32, WindowKind::Weekly, 3, noon());

        assert_eq!(cache.get("w", 3, noon() + Duration::days(2)), Some(1));
        assert_eq!(cache.get("w", 3, noon() + Duration::days(4)), None);
    }
}
