//! Back-off schedules for failed pseudonym retrievals.
//!
//! The engine itself retries only the stale-token case. Everything else is
//! surfaced to the caller, which reschedules according to the failure
//! reason. Each schedule is a fixed list of delays; once it is exhausted
//! the caller stops retrying until something else triggers a retrieval.

use std::time::Duration;

use crate::error::FailureReason;

const MINUTE_SECS: u64 = 60;
const HOUR_SECS: u64 = 60 * MINUTE_SECS;

/// Delays after HTTPS connection failures: 30s, 1min, 1h, 3h, 9h.
pub const CONNECTION_ERROR_DELAYS: [Duration; 5] = [
    Duration::from_secs(30),
    Duration::from_secs(MINUTE_SECS),
    Duration::from_secs(HOUR_SECS),
    Duration::from_secs(3 * HOUR_SECS),
    Duration::from_secs(9 * HOUR_SECS),
];

/// Delays after transient server failures: 5, 15, 30, 60, 120 minutes.
pub const SERVER_ERROR_DELAYS: [Duration; 5] = [
    Duration::from_secs(5 * MINUTE_SECS),
    Duration::from_secs(15 * MINUTE_SECS),
    Duration::from_secs(30 * MINUTE_SECS),
    Duration::from_secs(60 * MINUTE_SECS),
    Duration::from_secs(120 * MINUTE_SECS),
];

/// Fixed back-off sequence. Callers keep their own retry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: &'static [Duration],
}

impl RetrySchedule {
    pub const CONNECTION_ERROR: Self = Self {
        delays: &CONNECTION_ERROR_DELAYS,
    };
    pub const SERVER_ERROR: Self = Self {
        delays: &SERVER_ERROR_DELAYS,
    };

    /// Schedule for a failure reason. Non-transient failures are not retried.
    pub fn for_reason(reason: FailureReason) -> Option<Self> {
        match reason {
            FailureReason::HttpsConnectionFailure => Some(Self::CONNECTION_ERROR),
            FailureReason::TransientFailure => Some(Self::SERVER_ERROR),
            FailureReason::NonTransientFailure => None,
        }
    }

    /// Delay before retry number `retries_so_far + 1`, or `None` once
    /// the schedule is exhausted.
    pub fn delay(&self, retries_so_far: usize) -> Option<Duration> {
        self.delays.get(retries_so_far).copied()
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }
}
