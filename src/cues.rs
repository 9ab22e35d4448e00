//! Reflection cue rotation
//!
//! Remembers the last few cues shown so the same prompt does not come up
//! twice in a row. Purely in memory: losing it on restart only means a cue
//! may repeat.

use std::collections::VecDeque;

pub const DEFAULT_RECENT_CUES: usize = 5;

#[derive(Debug, Clone)]
pub struct RecentlyShown {
    capacity: usize,
    recent: VecDeque<String>,
}

impl RecentlyShown {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn contains(&self, cue_id: &str) -> bool {
        self.recent.iter().any(|c| c == cue_id)
    }

    /// Record a cue as shown, evicting the oldest when full
    pub fn record(&mut self, cue_id: &str) {
        self.recent.retain(|c| c != cue_id);
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(cue_id.to_string());
    }

    /// Pick the first candidate not shown recently and record it
    ///
    /// When every candidate was shown recently, the one shown longest ago
    /// wins.
    pub fn pick<'a>(&mut self, candidates: &'a [String]) -> Option<&'a str> {
        let chosen = candidates
            .iter()
            .find(|c| !self.contains(c))
            .or_else(|| {
                candidates
                    .iter()
                    .min_by_key(|c| self.recent.iter().position(|r| r == *c))
            })?;
        self.record(chosen);
        Some(chosen.as_str())
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Default for RecentlyShown {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CUES)
    }
}
