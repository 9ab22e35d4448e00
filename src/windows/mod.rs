//! Time-windowed queries layered on top of the log
//!
//! - `boundary`: the single daily/weekly reset rule
//! - `usage`: counting actions inside the current window against caps
//! - `cache`: query cache that expires at the next reset boundary

mod boundary;
mod cache;
mod usage;

pub use boundary::{
    day_key, next_reset, reset_boundary, WindowKind, DAILY_RESET_HOUR, WEEKLY_RESET_DAY,
};
pub use cache::WindowCache;
pub use usage::{
    available, nurture_allowance, nurtures_since, reflection_allowance, streak, usage_since,
    Allowance, UsageCaps,
};
