//! # Wall-Clock Helpers
//!
//! Pseudonym bookkeeping is done in epoch milliseconds (UTC), the unit the
//! entitlement server's refresh interval is converted into.

use chrono::Utc;

/// One hour in milliseconds.
pub const HOUR_IN_MILLIS: i64 = 60 * 60 * 1000;

/// Current UTC wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
