//! # Entitlement Engine
//!
//! Runs the two-step EAP-AKA exchange that yields an IMSI pseudonym:
//!
//! 1. **Auth Challenge.** Skipped while an AKA token is cached. Otherwise
//!    the server answers a bare `3gppAuthentication` request with an
//!    EAP-AKA challenge, which the SIM turns into a challenge response.
//! 2. **Get-Pseudonym.** Carries the cached token or the fresh challenge
//!    response and returns the pseudonym with its refresh interval.
//!
//! A full authentication leaves a reusable AKA token behind. When the
//! server rejects a cached token (it answers the Get-Pseudonym step with
//! a new challenge) the engine drops the token and starts over, at most
//! once per call.
//!
//! ## Concurrency
//!
//! The engine is blocking and holds its token without synchronization.
//! Callers serialize access; [`crate::worker::EntitlementWorker`] does so
//! by owning the engine on a single thread.

use std::fmt;
use std::sync::Arc;

use ses_core::{CarrierId, PseudonymRecord};
use url::Url;
use zeroize::Zeroizing;

use crate::aka::EapAkaResponder;
use crate::config::{validate_server_url, ConfigError};
use crate::error::EntitlementError;
use crate::message::{ChallengeResponse, PseudonymResponse, ResponseCode};
use crate::request::RequestFactory;
use crate::transport::{EntitlementRequest, Transport};

/// Initial pass plus one retry after a stale token.
const MAX_ATTEMPTS: usize = 2;

/// Result of classifying the authentication part of a Get-Pseudonym answer.
#[derive(Debug, PartialEq, Eq)]
enum AuthOutcome {
    Authenticated,
    /// The cached token was rejected and has been cleared.
    TokenRejected,
}

/// Client for one subscriber's pseudonym.
pub struct EntitlementEngine {
    factory: RequestFactory,
    server_url: Url,
    transport: Arc<dyn Transport>,
    aka: Arc<dyn EapAkaResponder>,
    cached_token: Option<Zeroizing<String>>,
}

impl fmt::Debug for EntitlementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitlementEngine")
            .field("imsi", self.factory.imsi())
            .field("server_url", &self.server_url.host_str())
            .field("transport", &self.transport.transport_name())
            .field("has_cached_token", &self.cached_token.is_some())
            .finish()
    }
}

impl EntitlementEngine {
    /// Create an engine. Fails unless `server_url` is a valid `https` URL.
    pub fn new(
        factory: RequestFactory,
        server_url: &str,
        transport: Arc<dyn Transport>,
        aka: Arc<dyn EapAkaResponder>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            factory,
            server_url: validate_server_url(server_url)?,
            transport,
            aka,
            cached_token: None,
        })
    }

    /// Whether a token from an earlier full authentication is cached.
    pub fn has_cached_token(&self) -> bool {
        self.cached_token.is_some()
    }

    /// Forget the cached token, forcing a full authentication next time.
    pub fn clear_cached_token(&mut self) {
        self.cached_token = None;
    }

    /// Retrieve a pseudonym for `carrier_id`.
    ///
    /// `Ok(None)` means the exchange succeeded but the server's pseudonym
    /// was missing, empty or longer than the EAP MTU.
    pub fn fetch_pseudonym(
        &mut self,
        carrier_id: CarrierId,
    ) -> Result<Option<PseudonymRecord>, EntitlementError> {
        let result = self.run_exchange(carrier_id);
        match &result {
            Ok(Some(record)) => tracing::debug!(
                carrier = %carrier_id,
                pseudonym = %record.masked_pseudonym(),
                ttl_ms = record.ttl_millis(),
                "pseudonym retrieved"
            ),
            Ok(None) => tracing::warn!(carrier = %carrier_id, "server returned no valid pseudonym"),
            Err(e) => tracing::warn!(
                carrier = %carrier_id,
                reason = %e.reason(),
                error = %e,
                "pseudonym retrieval failed"
            ),
        }
        result
    }

    fn run_exchange(
        &mut self,
        carrier_id: CarrierId,
    ) -> Result<Option<PseudonymRecord>, EntitlementError> {
        for attempt in 0..MAX_ATTEMPTS {
            let challenge_response = if self.cached_token.is_none() {
                self.authenticate(carrier_id)?
            } else {
                None
            };

            let response = self.request_pseudonym(challenge_response.as_deref())?;

            match self.classify_auth(&response, challenge_response.as_deref())? {
                AuthOutcome::Authenticated => {}
                AuthOutcome::TokenRejected => {
                    tracing::info!(
                        carrier = %carrier_id,
                        attempt,
                        "cached AKA token rejected, retrying with full authentication"
                    );
                    continue;
                }
            }

            classify_pseudonym_code(response.pseudonym_response_code)?;
            return Ok(response.to_record(self.factory.imsi()));
        }

        // The retry runs without a token, so a second rejection already
        // failed inside classify_auth.
        Err(EntitlementError::transient("AKA token rejected after retry"))
    }

    /// Auth Challenge round-trip followed by the SIM computation.
    ///
    /// Returns the challenge response, or `None` if the server sent an
    /// empty challenge.
    fn authenticate(&self, carrier_id: CarrierId) -> Result<Option<String>, EntitlementError> {
        let body = self.send(self.factory.auth_request()?)?;
        let challenge = ChallengeResponse::parse(&body);
        classify_challenge_code(challenge.auth_response_code)?;

        let Some(eap_challenge) = challenge.eap_aka_challenge.filter(|c| !c.is_empty()) else {
            tracing::debug!(carrier = %carrier_id, "server sent an empty AKA challenge");
            return Ok(None);
        };

        let aka = self
            .aka
            .compute(&eap_challenge)
            .ok_or_else(|| EntitlementError::non_transient("cannot get challenge response"))?;
        match aka.challenge_response() {
            Some(rsp) => Ok(Some(rsp.to_string())),
            None => {
                if aka.synchronization_failure.is_some() {
                    tracing::debug!(carrier = %carrier_id, "SIM requested AKA re-synchronization");
                }
                Err(EntitlementError::transient("challenge message not valid"))
            }
        }
    }

    fn request_pseudonym(
        &self,
        challenge_response: Option<&str>,
    ) -> Result<PseudonymResponse, EntitlementError> {
        let token = self.cached_token.as_ref().map(|t| t.as_str());
        let body = self.send(self.factory.pseudonym_request(token, challenge_response)?)?;
        Ok(PseudonymResponse::parse(&body))
    }

    fn send(&self, body: serde_json::Value) -> Result<String, EntitlementError> {
        let request = EntitlementRequest {
            url: self.server_url.clone(),
            body,
        };
        let response = self.transport.send(&request)?;
        Ok(response.body)
    }

    /// Authentication code of the Get-Pseudonym answer. Owns the token cache.
    fn classify_auth(
        &mut self,
        response: &PseudonymResponse,
        challenge_response: Option<&str>,
    ) -> Result<AuthOutcome, EntitlementError> {
        match response.auth_response_code {
            ResponseCode::REQUEST_SUCCESSFUL => {
                // Only a full authentication issues a token worth keeping.
                let full_auth = challenge_response.is_some_and(|r| !r.is_empty());
                if let Some(token) = response.aka_token.as_deref().filter(|t| !t.is_empty()) {
                    if full_auth {
                        self.cached_token = Some(Zeroizing::new(token.to_string()));
                    }
                }
                Ok(AuthOutcome::Authenticated)
            }
            ResponseCode::AKA_CHALLENGE => {
                if self.cached_token.is_none() {
                    return Err(EntitlementError::transient(
                        "server asked for a new challenge without a cached token",
                    ));
                }
                self.cached_token = None;
                Ok(AuthOutcome::TokenRejected)
            }
            ResponseCode::AKA_AUTH_FAILED => {
                Err(EntitlementError::non_transient("authentication failed"))
            }
            ResponseCode::INVALID_REQUEST => Err(EntitlementError::non_transient("invalid request")),
            ResponseCode::SERVER_ERROR => Err(EntitlementError::transient("server error")),
            code => Err(EntitlementError::non_transient(format!(
                "unknown error, authentication response code {code}"
            ))),
        }
    }
}

/// Response code of the Auth Challenge step.
fn classify_challenge_code(code: ResponseCode) -> Result<(), EntitlementError> {
    match code {
        ResponseCode::AKA_CHALLENGE => Ok(()),
        // Seen when the request lands on a different server instance.
        ResponseCode::INVALID_REQUEST | ResponseCode::SERVER_ERROR => Err(
            EntitlementError::transient(format!("server transient problem, response code {code}")),
        ),
        code => Err(EntitlementError::non_transient(format!(
            "cannot get authentication challenge, response code {code}"
        ))),
    }
}

/// Pseudonym code of the Get-Pseudonym step.
fn classify_pseudonym_code(code: ResponseCode) -> Result<(), EntitlementError> {
    match code {
        ResponseCode::REQUEST_SUCCESSFUL => Ok(()),
        ResponseCode::INVALID_REQUEST
        | ResponseCode::SERVER_ERROR
        | ResponseCode::THREE_GPP_AUTH_ONGOING => Err(EntitlementError::transient(format!(
            "server transient problem, response code {code}"
        ))),
        code => Err(EntitlementError::non_transient(format!(
            "cannot get IMSI pseudonym, response code {code}"
        ))),
    }
}
