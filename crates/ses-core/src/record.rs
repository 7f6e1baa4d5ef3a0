//! # Pseudonym Record
//!
//! An immutable pseudonym issued by the entitlement server together with
//! the bookkeeping needed to decide when it expires and when it should be
//! refreshed.
//!
//! ## Timing Model
//!
//! All values are epoch milliseconds. Given `acquired_at` and `ttl`:
//!
//! ```text
//! expires_at              = acquired_at + ttl
//! effective_refresh_ahead = min(REFRESH_AHEAD_MILLIS, ttl / 2)
//! refresh point           = expires_at - effective_refresh_ahead
//! ```
//!
//! Capping the refresh-ahead window at half the TTL keeps the refresh point
//! after the acquisition time for small TTLs. A record is *old enough to
//! refresh* once it has been held for `MIN_REFRESH_INTERVAL_MILLIS` or once
//! the refresh point has been reached, whichever comes first. This rate
//! limits refreshes triggered by authentication errors.

use std::fmt;

use crate::error::RecordError;
use crate::identity::Imsi;
use crate::temporal::now_millis;

/// TTL used when the server does not send a positive refresh interval (2 days).
pub const DEFAULT_PSEUDONYM_TTL_MILLIS: i64 = 2 * 24 * 60 * 60 * 1000;

/// How long before expiry a pseudonym should be refreshed (30 minutes).
pub const REFRESH_AHEAD_MILLIS: i64 = 30 * 60 * 1000;

/// Minimum age before an authentication error may trigger a refresh (12 hours).
pub const MIN_REFRESH_INTERVAL_MILLIS: i64 = 12 * 60 * 60 * 1000;

/// Maximum pseudonym length in bytes (RFC 3748 §3.1 EAP MTU).
pub const EAP_MTU: usize = 1020;

/// Number of leading pseudonym characters left visible in log output.
const VISIBLE_PSEUDONYM_CHARS: usize = 7;

/// Check that a server-issued pseudonym is usable as an EAP identity.
pub fn validate_pseudonym(pseudonym: &str) -> Result<(), RecordError> {
    if pseudonym.is_empty() {
        return Err(RecordError::EmptyPseudonym);
    }
    if pseudonym.len() > EAP_MTU {
        return Err(RecordError::PseudonymTooLong {
            len: pseudonym.len(),
            max: EAP_MTU,
        });
    }
    Ok(())
}

/// A pseudonym and the IMSI it stands in for.
///
/// Custom `Debug` and `Display` implementations mask both the pseudonym
/// and the IMSI.
#[derive(Clone, PartialEq, Eq)]
pub struct PseudonymRecord {
    pseudonym: String,
    owner: Imsi,
    ttl_millis: i64,
    acquired_at_millis: i64,
}

impl PseudonymRecord {
    /// Record acquired now with the default TTL.
    pub fn new(pseudonym: impl Into<String>, owner: Imsi) -> Self {
        Self {
            pseudonym: pseudonym.into(),
            owner,
            ttl_millis: DEFAULT_PSEUDONYM_TTL_MILLIS,
            acquired_at_millis: now_millis(),
        }
    }

    /// Record acquired now with an explicit TTL.
    pub fn with_ttl(
        pseudonym: impl Into<String>,
        owner: Imsi,
        ttl_millis: i64,
    ) -> Result<Self, RecordError> {
        Self::with_timestamp(pseudonym, owner, ttl_millis, now_millis())
    }

    /// Record with an explicit TTL and acquisition time.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NonPositiveTtl`] if `ttl_millis <= 0`.
    pub fn with_timestamp(
        pseudonym: impl Into<String>,
        owner: Imsi,
        ttl_millis: i64,
        acquired_at_millis: i64,
    ) -> Result<Self, RecordError> {
        if ttl_millis <= 0 {
            return Err(RecordError::NonPositiveTtl { ttl_millis });
        }
        Ok(Self {
            pseudonym: pseudonym.into(),
            owner,
            ttl_millis,
            acquired_at_millis,
        })
    }

    /// New record for a replacement pseudonym, keeping owner and TTL and
    /// restarting the clock now.
    pub fn with_pseudonym(&self, pseudonym: impl Into<String>) -> Self {
        Self {
            pseudonym: pseudonym.into(),
            owner: self.owner.clone(),
            ttl_millis: self.ttl_millis,
            acquired_at_millis: now_millis(),
        }
    }

    pub fn pseudonym(&self) -> &str {
        &self.pseudonym
    }

    pub fn owner(&self) -> &Imsi {
        &self.owner
    }

    pub fn ttl_millis(&self) -> i64 {
        self.ttl_millis
    }

    pub fn acquired_at_millis(&self) -> i64 {
        self.acquired_at_millis
    }

    pub fn expires_at_millis(&self) -> i64 {
        self.acquired_at_millis.saturating_add(self.ttl_millis)
    }

    /// Refresh-ahead window, capped at half the TTL.
    pub fn effective_refresh_ahead_millis(&self) -> i64 {
        REFRESH_AHEAD_MILLIS.min(self.ttl_millis / 2)
    }

    /// The instant from which the record should be refreshed.
    pub fn refresh_at_millis(&self) -> i64 {
        self.expires_at_millis() - self.effective_refresh_ahead_millis()
    }

    pub fn time_since_acquired(&self) -> i64 {
        self.time_since_acquired_at(now_millis())
    }

    pub fn time_since_acquired_at(&self, now: i64) -> i64 {
        now - self.acquired_at_millis
    }

    /// Whether the TTL has elapsed. A record is expired at exactly
    /// `expires_at`.
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(now_millis())
    }

    pub fn has_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at_millis()
    }

    /// Milliseconds until the refresh point, floored at zero.
    pub fn time_left_to_refresh(&self) -> i64 {
        self.time_left_to_refresh_at(now_millis())
    }

    pub fn time_left_to_refresh_at(&self, now: i64) -> i64 {
        (self.refresh_at_millis() - now).max(0)
    }

    /// Whether a refresh may be requested without hammering the server.
    pub fn is_old_enough_to_refresh(&self) -> bool {
        self.is_old_enough_to_refresh_at(now_millis())
    }

    pub fn is_old_enough_to_refresh_at(&self, now: i64) -> bool {
        self.time_since_acquired_at(now) >= MIN_REFRESH_INTERVAL_MILLIS
            || now >= self.refresh_at_millis()
    }

    /// The pseudonym with all but its first few characters hidden.
    pub fn masked_pseudonym(&self) -> String {
        if self.pseudonym.chars().count() >= VISIBLE_PSEUDONYM_CHARS {
            let head: String = self
                .pseudonym
                .chars()
                .take(VISIBLE_PSEUDONYM_CHARS)
                .collect();
            format!("{head}***")
        } else {
            self.pseudonym.clone()
        }
    }
}

impl fmt::Display for PseudonymRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pseudonym={} imsi={} acquired_at={} ttl={}ms refresh_ahead={}ms",
            self.masked_pseudonym(),
            self.owner,
            self.acquired_at_millis,
            self.ttl_millis,
            self.effective_refresh_ahead_millis(),
        )
    }
}

impl fmt::Debug for PseudonymRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudonymRecord")
            .field("pseudonym", &self.masked_pseudonym())
            .field("owner", &self.owner)
            .field("ttl_millis", &self.ttl_millis)
            .field("acquired_at_millis", &self.acquired_at_millis)
            .finish()
    }
}
