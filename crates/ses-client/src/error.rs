//! Entitlement client error types.
//!
//! Every failure of a pseudonym retrieval is reported as one of three
//! coarse reasons so that callers can make a simple retry decision:
//!
//! | Reason | Meaning | Caller action |
//! |--------|---------|---------------|
//! | [`FailureReason::HttpsConnectionFailure`] | server unreachable, TLS or I/O failure, non-200 status | retry with connection back-off |
//! | [`FailureReason::TransientFailure`] | server or protocol condition expected to clear | retry later with server back-off |
//! | [`FailureReason::NonTransientFailure`] | authentication rejected, unsupported request, unknown code | do not retry blindly |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Externally visible failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    HttpsConnectionFailure,
    TransientFailure,
    NonTransientFailure,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpsConnectionFailure => write!(f, "HTTP connection failure"),
            Self::TransientFailure => write!(f, "Transient failure"),
            Self::NonTransientFailure => write!(f, "Non-transient failure"),
        }
    }
}

/// Classified failure of a pseudonym retrieval.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// The HTTPS exchange itself failed. Never retried by the engine.
    #[error("HTTPS connection failure: {0}")]
    Transport(#[from] TransportError),

    /// The server or protocol reported a condition expected to clear.
    #[error("transient failure: {message}")]
    Transient {
        /// Human-readable description.
        message: String,
    },

    /// The request was rejected in a way retrying will not fix.
    #[error("non-transient failure: {message}")]
    NonTransient {
        /// Human-readable description.
        message: String,
    },
}

impl EntitlementError {
    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub(crate) fn non_transient(message: impl Into<String>) -> Self {
        Self::NonTransient {
            message: message.into(),
        }
    }

    /// Map to the three-reason taxonomy.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Transport(_) => FailureReason::HttpsConnectionFailure,
            Self::Transient { .. } => FailureReason::TransientFailure,
            Self::NonTransient { .. } => FailureReason::NonTransientFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_mapping() {
        let err = EntitlementError::Transport(TransportError::Connect {
            reason: "refused".into(),
        });
        assert_eq!(err.reason(), FailureReason::HttpsConnectionFailure);
        assert_eq!(
            EntitlementError::transient("x").reason(),
            FailureReason::TransientFailure
        );
        assert_eq!(
            EntitlementError::non_transient("x").reason(),
            FailureReason::NonTransientFailure
        );
    }

    #[test]
    fn failure_reason_display_names() {
        assert_eq!(
            FailureReason::HttpsConnectionFailure.to_string(),
            "HTTP connection failure"
        );
        assert_eq!(FailureReason::TransientFailure.to_string(), "Transient failure");
        assert_eq!(
            FailureReason::NonTransientFailure.to_string(),
            "Non-transient failure"
        );
    }

    #[test]
    fn error_display_carries_message() {
        let err = EntitlementError::non_transient("Authentication failed");
        assert!(err.to_string().contains("Authentication failed"));
        let err = EntitlementError::Transport(TransportError::Timeout { elapsed_ms: 30_000 });
        assert!(err.to_string().contains("30000"));
    }

    #[test]
    fn failure_reason_serde() {
        let json = serde_json::to_string(&FailureReason::TransientFailure).expect("serialize");
        assert_eq!(json, "\"TRANSIENT_FAILURE\"");
    }
}
