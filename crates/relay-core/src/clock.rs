//! Wall-clock helper.
//!
//! Breaker windows and credential expiry are stored as float seconds since
//! the Unix epoch so they survive being logged and compared across tasks.

use chrono::Utc;

/// Returns the current time as seconds since the Unix epoch.
pub fn now_epoch_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
