//! EAP-AKA computation boundary.
//!
//! The SIM stack owns the AKA keys. The engine only hands it the server's
//! challenge and forwards whatever it returns.

/// Result of running an EAP-AKA challenge through the SIM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AkaResponse {
    /// EAP-Response/AKA-Challenge payload to send back to the server.
    pub response: Option<String>,
    /// EAP-Response/AKA-Synchronization-Failure payload (AUTS). Present when
    /// the SIM rejected the challenge's sequence number.
    pub synchronization_failure: Option<String>,
}

impl AkaResponse {
    /// A successful challenge response.
    pub fn challenge(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            synchronization_failure: None,
        }
    }

    /// A SIM re-synchronisation request.
    pub fn synchronization_failure(auts: impl Into<String>) -> Self {
        Self {
            response: None,
            synchronization_failure: Some(auts.into()),
        }
    }

    /// The challenge response, if the SIM produced a non-empty one.
    pub fn challenge_response(&self) -> Option<&str> {
        self.response.as_deref().filter(|r| !r.is_empty())
    }
}

/// Computes EAP-AKA responses for server challenges.
pub trait EapAkaResponder: Send + Sync {
    /// Run `challenge` (the server's base64 EAP-Request) through the SIM.
    ///
    /// `None` means the SIM could not be queried at all.
    fn compute(&self, challenge: &str) -> Option<AkaResponse>;
}
