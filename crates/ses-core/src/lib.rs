//! # ses-core: Foundational Types for the SES Stack
//!
//! Leaf crate of the workspace. It defines the value types that the
//! entitlement client produces and that callers keep around between
//! refreshes: the subscriber identifiers and the [`PseudonymRecord`].
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `Imsi` and `CarrierId` are
//!    validated newtypes. The IMSI never prints in clear text.
//!
//! 2. **Immutable records.** A `PseudonymRecord` is never mutated. A refresh
//!    produces a new record; every timing property is derived on read.
//!
//! 3. **Explicit clocks.** Every time-dependent accessor has an `*_at`
//!    variant taking epoch milliseconds, so boundary behaviour is testable
//!    without sleeping.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ses-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod record;
pub mod temporal;

pub use error::{IdentityError, RecordError};
pub use identity::{CarrierId, Imsi};
pub use record::{
    validate_pseudonym, PseudonymRecord, DEFAULT_PSEUDONYM_TTL_MILLIS, EAP_MTU,
    MIN_REFRESH_INTERVAL_MILLIS, REFRESH_AHEAD_MILLIS,
};
pub use temporal::{now_millis, HOUR_IN_MILLIS};
