//! # Entitlement Server Messages
//!
//! Requests and responses are JSON arrays of objects, each tagged with a
//! `message-id`. A single generic walker, [`parse_message_array`], routes
//! every object to a field extractor chosen by its message id and fills a
//! plain data struct per response kind.
//!
//! ## Parsing Never Fails
//!
//! An empty body, a body that is not a JSON array, non-object entries and
//! unknown message ids are logged and skipped. Fields that are missing keep
//! their sentinel value ([`ResponseCode::UNSET`] or `None`), which the
//! engine classifies as a non-transient "unknown" failure. Malformed input
//! therefore has fully deterministic behaviour instead of surfacing a parse
//! error from deep inside the protocol.

use std::fmt;

use serde_json::{Map, Value};
use ses_core::{validate_pseudonym, Imsi, PseudonymRecord, HOUR_IN_MILLIS};

pub(crate) const KEY_MESSAGE_ID: &str = "message-id";
pub(crate) const KEY_RESPONSE_CODE: &str = "response-code";
pub(crate) const KEY_AKA_CHALLENGE: &str = "aka-challenge";
pub(crate) const KEY_AKA_TOKEN: &str = "aka-token";
pub(crate) const KEY_IMSI_PSEUDONYM: &str = "imsi-pseudonym";
pub(crate) const KEY_REFRESH_INTERVAL: &str = "refresh-interval";

/// Message identifier tagging each array entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl MessageId {
    /// `3gppAuthentication`: challenge request / token re-authentication.
    pub const AUTHENTICATION: Self = Self(1);
    /// `getImsiPseudonym`.
    pub const GET_IMSI_PSEUDONYM: Self = Self(2);
    /// Entry without a usable message id.
    pub const UNSET: Self = Self(-1);
}

/// Server response code carried by each response entry.
///
/// Codes are compared with the associated constants; anything else is an
/// unrecognised code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub i64);

impl ResponseCode {
    /// No entry carried this code, or the body could not be parsed.
    pub const UNSET: Self = Self(-1);
    pub const REQUEST_SUCCESSFUL: Self = Self(1000);
    pub const AKA_CHALLENGE: Self = Self(1003);
    pub const INVALID_REQUEST: Self = Self(1004);
    pub const AKA_AUTH_FAILED: Self = Self(1006);
    /// Not applicable to this subscriber, or the pseudonym cannot be retrieved.
    pub const FORBIDDEN_REQUEST: Self = Self(1007);
    pub const SERVER_ERROR: Self = Self(1111);
    pub const THREE_GPP_AUTH_ONGOING: Self = Self(1112);
    /// Method not supported by the installed server version.
    pub const UNSUPPORTED_OPERATION: Self = Self(9999);

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::UNSET => "UNSET",
            Self::REQUEST_SUCCESSFUL => "REQUEST_SUCCESSFUL",
            Self::AKA_CHALLENGE => "AKA_CHALLENGE",
            Self::INVALID_REQUEST => "INVALID_REQUEST",
            Self::AKA_AUTH_FAILED => "AKA_AUTH_FAILED",
            Self::FORBIDDEN_REQUEST => "FORBIDDEN_REQUEST",
            Self::SERVER_ERROR => "SERVER_ERROR",
            Self::THREE_GPP_AUTH_ONGOING => "3GPP_AUTH_ONGOING",
            Self::UNSUPPORTED_OPERATION => "UNSUPPORTED_OPERATION",
            _ => return None,
        })
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Fills one field group of `T` from a response entry.
pub type FieldExtractor<T> = fn(&mut T, &Map<String, Value>);

/// Walk a JSON-array response body, dispatching each object to the
/// extractor registered for its message id.
pub fn parse_message_array<T: Default>(body: &str, handlers: &[(MessageId, FieldExtractor<T>)]) -> T {
    let mut parsed = T::default();
    if body.trim().is_empty() {
        tracing::warn!("empty entitlement response body");
        return parsed;
    }
    let entries = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            tracing::warn!(len = body.len(), "entitlement response is not a JSON array");
            return parsed;
        }
        Err(e) => {
            tracing::warn!(error = %e, len = body.len(), "entitlement response is not valid JSON");
            return parsed;
        }
    };

    for entry in &entries {
        let Some(object) = entry.as_object() else {
            tracing::debug!("skipping non-object entry in entitlement response");
            continue;
        };
        let id = opt_i64(object, KEY_MESSAGE_ID).map_or(MessageId::UNSET, MessageId);
        match handlers.iter().find(|(handled, _)| *handled == id) {
            Some((_, extract)) => extract(&mut parsed, object),
            None => tracing::warn!(message_id = id.0, "unexpected message id in entitlement response"),
        }
    }
    parsed
}

/// Integer field. Accepts JSON numbers and numeric strings.
fn opt_i64(object: &Map<String, Value>, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String field. Scalars are stringified; `null`, arrays and objects are absent.
fn opt_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn response_code(object: &Map<String, Value>) -> ResponseCode {
    opt_i64(object, KEY_RESPONSE_CODE).map_or(ResponseCode::UNSET, ResponseCode)
}

// -- Auth Challenge response ---------------------------------------------------

/// Response to the initial `3gppAuthentication` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    pub auth_response_code: ResponseCode,
    pub eap_aka_challenge: Option<String>,
}

impl Default for ChallengeResponse {
    fn default() -> Self {
        Self {
            auth_response_code: ResponseCode::UNSET,
            eap_aka_challenge: None,
        }
    }
}

impl ChallengeResponse {
    pub fn parse(body: &str) -> Self {
        let handlers: [(MessageId, FieldExtractor<Self>); 1] =
            [(MessageId::AUTHENTICATION, Self::extract_authentication)];
        parse_message_array(body, &handlers)
    }

    fn extract_authentication(&mut self, object: &Map<String, Value>) {
        self.auth_response_code = response_code(object);
        self.eap_aka_challenge = opt_string(object, KEY_AKA_CHALLENGE);
    }
}

// -- Get-Pseudonym response ----------------------------------------------------

/// Response to the combined authentication + `getImsiPseudonym` request.
#[derive(Clone, PartialEq, Eq)]
pub struct PseudonymResponse {
    pub auth_response_code: ResponseCode,
    pub aka_token: Option<String>,
    pub pseudonym_response_code: ResponseCode,
    pub imsi_pseudonym: Option<String>,
    pub refresh_interval_hours: Option<i64>,
}

impl fmt::Debug for PseudonymResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudonymResponse")
            .field("auth_response_code", &self.auth_response_code)
            .field("aka_token", &self.aka_token.as_ref().map(|_| "[REDACTED]"))
            .field("pseudonym_response_code", &self.pseudonym_response_code)
            .field("imsi_pseudonym", &self.imsi_pseudonym.as_ref().map(|p| p.len()))
            .field("refresh_interval_hours", &self.refresh_interval_hours)
            .finish()
    }
}

impl Default for PseudonymResponse {
    fn default() -> Self {
        Self {
            auth_response_code: ResponseCode::UNSET,
            aka_token: None,
            pseudonym_response_code: ResponseCode::UNSET,
            imsi_pseudonym: None,
            refresh_interval_hours: None,
        }
    }
}

impl PseudonymResponse {
    pub fn parse(body: &str) -> Self {
        let handlers: [(MessageId, FieldExtractor<Self>); 2] = [
            (MessageId::AUTHENTICATION, Self::extract_authentication),
            (MessageId::GET_IMSI_PSEUDONYM, Self::extract_pseudonym),
        ];
        parse_message_array(body, &handlers)
    }

    fn extract_authentication(&mut self, object: &Map<String, Value>) {
        self.auth_response_code = response_code(object);
        self.aka_token = opt_string(object, KEY_AKA_TOKEN);
    }

    fn extract_pseudonym(&mut self, object: &Map<String, Value>) {
        self.pseudonym_response_code = response_code(object);
        self.imsi_pseudonym = opt_string(object, KEY_IMSI_PSEUDONYM);
        self.refresh_interval_hours = opt_i64(object, KEY_REFRESH_INTERVAL);
    }

    /// Build a record for `owner` if both response codes are successful and
    /// the pseudonym is usable. A missing, empty or oversized pseudonym
    /// yields `None`.
    pub fn to_record(&self, owner: &Imsi) -> Option<PseudonymRecord> {
        if self.auth_response_code != ResponseCode::REQUEST_SUCCESSFUL
            || self.pseudonym_response_code != ResponseCode::REQUEST_SUCCESSFUL
        {
            return None;
        }
        let pseudonym = self.imsi_pseudonym.as_deref()?;
        if let Err(e) = validate_pseudonym(pseudonym) {
            tracing::warn!(error = %e, "discarding unusable pseudonym from entitlement server");
            return None;
        }
        match self.refresh_interval_hours {
            Some(hours) if hours > 0 => {
                PseudonymRecord::with_ttl(pseudonym, owner.clone(), hours.saturating_mul(HOUR_IN_MILLIS))
                    .ok()
            }
            _ => Some(PseudonymRecord::new(pseudonym, owner.clone())),
        }
    }
}
