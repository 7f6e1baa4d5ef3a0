//! # ses-client: Service Entitlement Client
//!
//! Retrieves IMSI pseudonyms from a carrier's service entitlement server
//! (SES) so that EAP-AKA Wi-Fi authentication never has to expose the
//! permanent IMSI.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► EntitlementWorker ──► EntitlementEngine ──► Transport (HTTPS)
//!   ▲              │ (one thread)        │
//!   │              │                     └──► EapAkaResponder (SIM)
//!   └── PendingFetch / PseudonymCallback
//! ```
//!
//! - [`request`] builds the JSON-array request bodies.
//! - [`message`] parses responses through one generic, table-driven parser.
//! - [`engine`] runs the challenge/response exchange, owns the AKA token and
//!   classifies every outcome into [`FailureReason`].
//! - [`worker`] serializes engine access on a dedicated thread.
//! - [`manager`] keeps per-carrier records and decides when to retrieve next.
//!
//! ## Crate Policy
//!
//! - Pseudonyms, IMSIs and AKA tokens never appear unmasked in logs or
//!   `Debug` output.
//! - Parsing never fails. Malformed bodies degrade into unset response codes
//!   that classify as non-transient failures.
//! - No `unsafe` code. No `.unwrap()` outside tests.

pub mod aka;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod message;
pub mod request;
pub mod retry;
pub mod transport;
pub mod worker;

pub use aka::{AkaResponse, EapAkaResponder};
pub use config::{ConfigError, EntitlementConfig};
pub use engine::EntitlementEngine;
pub use error::{EntitlementError, FailureReason};
pub use manager::{ManagerError, PseudonymManager, PseudonymUpdateListener};
pub use message::{ChallengeResponse, MessageId, PseudonymResponse, ResponseCode};
pub use request::{RequestFactory, SubscriberInfo};
pub use retry::RetrySchedule;
pub use transport::{
    EntitlementRequest, EntitlementResponse, HttpsTransport, Transport, TransportConfig,
    TransportError,
};
pub use worker::{EntitlementWorker, PendingFetch, PseudonymCallback, WorkerError};
