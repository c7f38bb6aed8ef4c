//! Wall-clock helpers
//!
//! Metadata records store creation time in seconds and expiry in
//! milliseconds since the Unix epoch.

use chrono::Utc;

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Seconds since the Unix epoch
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
