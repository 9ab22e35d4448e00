//! Time helpers for locally recorded events

use chrono::{DateTime, Duration, Utc};

/// Timestamp for a new local event, strictly after `last`
///
/// Two actions in the same instant on one device would otherwise fall back
/// to the client id tie-break and could fold out of order.
pub fn strictly_after(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

/// Best-effort name for this device
///
/// Falls back through the host name variables to the login name, the same
/// order a shell prompt would use.
pub fn default_device() -> String {
    ["HOSTNAME", "COMPUTERNAME", "USER", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "unknown-device".to_string())
}
