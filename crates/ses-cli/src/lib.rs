//! # ses-cli: CLI Tool for the SES Stack
//!
//! Provides the `ses` command-line interface around `ses-client`.
//!
//! ## Subcommands
//!
//! - `ses fetch`: retrieve one IMSI pseudonym and print it as JSON.
//! - `ses watch`: keep a pseudonym fresh, following the manager's refresh
//!   and back-off decisions until interrupted.
//!
//! The SIM is reached through an external program (`--aka-command`) that is
//! run as `<program> <challenge>` and prints the EAP-AKA response:
//!
//! ```bash
//! ses fetch --imsi 310260000000001 --imei 35209900176148 \
//!     --software-version 01 --sim-operator 310260 \
//!     --aka-command ./sim-aka --server-url https://ses.carrier.example/
//! ```

pub mod aka;
pub mod fetch;
pub mod subscriber;
pub mod watch;

use serde_json::{json, Value};
use ses_client::FailureReason;
use ses_core::{CarrierId, PseudonymRecord};

/// JSON line describing a retrieved pseudonym.
pub fn record_json(carrier_id: CarrierId, record: &PseudonymRecord) -> Value {
    json!({
        "carrier_id": carrier_id.as_i32(),
        "pseudonym": record.pseudonym(),
        "ttl_millis": record.ttl_millis(),
        "acquired_at": rfc3339(record.acquired_at_millis()),
        "refresh_at": rfc3339(record.refresh_at_millis()),
        "expires_at": rfc3339(record.expires_at_millis()),
    })
}

/// JSON line describing a failed retrieval.
pub fn failure_json(carrier_id: CarrierId, reason: FailureReason, description: &str) -> Value {
    json!({
        "carrier_id": carrier_id.as_i32(),
        "reason": reason,
        "description": description,
    })
}

fn rfc3339(millis: i64) -> Option<String> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis).map(|t| t.to_rfc3339())
}
