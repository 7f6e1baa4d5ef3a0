//! # Subscriber Identity Newtypes
//!
//! `Imsi` is the permanent subscriber identifier the pseudonym stands in
//! for. It is personal data: its `Display` and `Debug` output is masked to
//! the last three digits, and it deliberately does not implement
//! `Serialize`.
//!
//! `CarrierId` identifies the carrier whose entitlement server issued a
//! pseudonym. Callers key their per-carrier state on it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Minimum IMSI length: MCC (3) + MNC (2) + at least one MSIN digit.
const IMSI_MIN_LEN: usize = 6;

/// Maximum IMSI length per 3GPP TS 23.003.
const IMSI_MAX_LEN: usize = 15;

/// International Mobile Subscriber Identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Imsi(String);

impl Imsi {
    /// Validate and wrap an IMSI. Accepts 6 to 15 ASCII digits.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.len() < IMSI_MIN_LEN || value.len() > IMSI_MAX_LEN {
            return Err(IdentityError::InvalidImsi {
                reason: format!(
                    "IMSI must be {IMSI_MIN_LEN}-{IMSI_MAX_LEN} digits, got {} characters",
                    value.len()
                ),
            });
        }
        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentityError::InvalidImsi {
                reason: "IMSI must contain only ASCII digits".into(),
            });
        }
        Ok(Self(value))
    }

    /// Access the clear-text IMSI. Only the wire layer should need this.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an IMSI reported by the SIM.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// The IMSI with everything but the last three digits hidden.
    pub fn masked(&self) -> String {
        let tail = &self.0[self.0.len().saturating_sub(3)..];
        format!("***{tail}")
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Imsi").field(&self.masked()).finish()
    }
}

/// Carrier identifier, as assigned by the device's carrier database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarrierId(pub i32);

impl CarrierId {
    /// Access the raw carrier number.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "carrier:{}", self.0)
    }
}
