//! # Error Types
//!
//! Errors raised by the validated constructors in this crate. Both use
//! `thiserror` and carry enough context to be logged without the caller
//! having to re-describe the input.

use thiserror::Error;

/// Identifier validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// IMSI is not 6 to 15 ASCII digits.
    #[error("invalid IMSI: {reason}")]
    InvalidImsi {
        /// Description of the validation failure.
        reason: String,
    },
}

/// Pseudonym record construction failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// TTL must be strictly positive.
    #[error("pseudonym TTL must be positive, got {ttl_millis}ms")]
    NonPositiveTtl {
        /// The rejected TTL.
        ttl_millis: i64,
    },

    /// The server returned an empty pseudonym.
    #[error("pseudonym is empty")]
    EmptyPseudonym,

    /// The pseudonym does not fit in a single EAP packet.
    #[error("pseudonym is {len} bytes, exceeds EAP MTU of {max} bytes")]
    PseudonymTooLong {
        /// Length of the rejected pseudonym in bytes.
        len: usize,
        /// The limit that was exceeded.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = IdentityError::InvalidImsi {
            reason: "too short".into(),
        };
        assert!(err.to_string().contains("too short"));

        let err = RecordError::NonPositiveTtl { ttl_millis: -5 };
        assert!(err.to_string().contains("-5"));

        let err = RecordError::PseudonymTooLong { len: 1021, max: 1020 };
        assert!(err.to_string().contains("1021"));
        assert!(err.to_string().contains("1020"));
    }
}
