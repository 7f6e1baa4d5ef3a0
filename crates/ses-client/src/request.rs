//! # Request Construction
//!
//! Builds the JSON-array request bodies sent to the entitlement server.
//! Every request starts with a `3gppAuthentication` entry describing the
//! device and subscriber; the pseudonym request appends a
//! `getImsiPseudonym` entry and carries either the cached AKA token or the
//! freshly computed challenge response in the authentication entry.
//!
//! ## Device Identity
//!
//! `device-id` is the base64 encoding of the IMEISV (14 IMEI digits followed
//! by the 2-digit software version) and is mandatory. A device that cannot
//! report its IMEISV fails with a transient error: the value normally
//! becomes available once the modem is up.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use ses_core::Imsi;

use crate::error::EntitlementError;
use crate::message::{MessageId, KEY_AKA_TOKEN, KEY_MESSAGE_ID};

pub(crate) const METHOD_3GPP_AUTHENTICATION: &str = "3gppAuthentication";
pub(crate) const METHOD_GET_IMSI_PSEUDONYM: &str = "getImsiPseudonym";

const KEY_METHOD: &str = "method";
const KEY_DEVICE_ID: &str = "device-id";
const KEY_DEVICE_TYPE: &str = "device-type";
const KEY_OS_TYPE: &str = "os-type";
const KEY_DEVICE_NAME: &str = "device-name";
const KEY_IMSI_EAP: &str = "imsi-eap";
const KEY_AKA_CHALLENGE_RSP: &str = "aka-challenge-rsp";

const IMEI_LENGTH: usize = 14;
const DEVICE_TYPE_SIM: i64 = 0;
const OS_TYPE_DEFAULT: i64 = 0;

/// What the SIM and device report about the subscriber.
#[derive(Clone)]
pub struct SubscriberInfo {
    /// Permanent subscriber identifier; owner of every pseudonym fetched.
    pub imsi: Imsi,
    /// SIM operator code (MCC followed by a 2 or 3 digit MNC).
    pub sim_operator: Option<String>,
    /// Device IMEI. Truncated to 14 digits on the wire.
    pub imei: Option<String>,
    /// 2-digit device software version number.
    pub software_version: Option<String>,
    /// Device model name sent as `device-name`.
    pub device_model: String,
}

impl fmt::Debug for SubscriberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberInfo")
            .field("imsi", &self.imsi)
            .field("sim_operator", &self.sim_operator)
            .field("imei", &self.imei.as_ref().map(|_| "[REDACTED]"))
            .field("software_version", &self.software_version)
            .field("device_model", &self.device_model)
            .finish()
    }
}

/// Builds request bodies for one subscriber.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    subscriber: SubscriberInfo,
}

impl RequestFactory {
    pub fn new(subscriber: SubscriberInfo) -> Self {
        Self { subscriber }
    }

    pub fn imsi(&self) -> &Imsi {
        &self.subscriber.imsi
    }

    /// `[3gppAuthentication]` without credentials, asking for a challenge.
    pub fn auth_request(&self) -> Result<Value, EntitlementError> {
        Ok(Value::Array(vec![Value::Object(
            self.authentication_entry(None, None)?,
        )]))
    }

    /// `[3gppAuthentication, getImsiPseudonym]`. Empty credentials are omitted.
    pub fn pseudonym_request(
        &self,
        aka_token: Option<&str>,
        challenge_response: Option<&str>,
    ) -> Result<Value, EntitlementError> {
        let auth = self.authentication_entry(aka_token, challenge_response)?;
        let get_pseudonym = json!({
            KEY_MESSAGE_ID: MessageId::GET_IMSI_PSEUDONYM.0,
            KEY_METHOD: METHOD_GET_IMSI_PSEUDONYM,
        });
        Ok(Value::Array(vec![Value::Object(auth), get_pseudonym]))
    }

    fn authentication_entry(
        &self,
        aka_token: Option<&str>,
        challenge_response: Option<&str>,
    ) -> Result<Map<String, Value>, EntitlementError> {
        let device_id = self
            .device_id()
            .ok_or_else(|| EntitlementError::transient("IMEISV is unavailable"))?;

        let mut entry = Map::new();
        entry.insert(KEY_MESSAGE_ID.into(), json!(MessageId::AUTHENTICATION.0));
        entry.insert(KEY_METHOD.into(), json!(METHOD_3GPP_AUTHENTICATION));
        entry.insert(KEY_DEVICE_ID.into(), json!(device_id));
        entry.insert(KEY_DEVICE_TYPE.into(), json!(DEVICE_TYPE_SIM));
        entry.insert(KEY_OS_TYPE.into(), json!(OS_TYPE_DEFAULT));
        entry.insert(KEY_DEVICE_NAME.into(), json!(self.subscriber.device_model));
        if let Some(nai) = self.imsi_eap() {
            entry.insert(KEY_IMSI_EAP.into(), json!(nai));
        }
        if let Some(token) = aka_token.filter(|t| !t.is_empty()) {
            entry.insert(KEY_AKA_TOKEN.into(), json!(token));
        }
        if let Some(rsp) = challenge_response.filter(|r| !r.is_empty()) {
            entry.insert(KEY_AKA_CHALLENGE_RSP.into(), json!(rsp));
        }
        Ok(entry)
    }

    /// Base64 IMEISV, or `None` if either half is unknown.
    fn device_id(&self) -> Option<String> {
        let imei = self.subscriber.imei.as_deref().filter(|s| !s.is_empty())?;
        let svn = self
            .subscriber
            .software_version
            .as_deref()
            .filter(|s| !s.is_empty())?;
        let imei: String = imei.chars().take(IMEI_LENGTH).collect();
        Some(general_purpose::STANDARD.encode(format!("{imei}{svn}")))
    }

    /// Permanent EAP-AKA identity in NAI form.
    fn imsi_eap(&self) -> Option<String> {
        let operator = self.subscriber.sim_operator.as_deref()?;
        if operator.len() < 5 || !operator.is_ascii() {
            return None;
        }
        let (mcc, mnc) = operator.split_at(3);
        Some(format!(
            "0{}@nai.epc.mnc{mnc}.mcc{mcc}.3gppnetwork.org",
            self.subscriber.imsi.as_str()
        ))
    }
}
