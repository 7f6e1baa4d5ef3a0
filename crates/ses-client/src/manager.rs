//! # Pseudonym Manager
//!
//! Per-carrier bookkeeping around the engine: the current record, retry
//! counters and the time of the last failed retrieval. Every operation
//! returns a scheduling decision (`Some(delay)` to retrieve after `delay`,
//! `None` for nothing to do) and leaves the timer itself to the caller.
//!
//! ## Failure Timestamp
//!
//! Scheduling a retrieval stamps the carrier's last-failure time before the
//! retrieval actually runs. A success resets it to zero. A device that
//! keeps failing (or never gets to run the retrieval) therefore always has a
//! recent failure time, and [`PseudonymManager::retrieve_on_failure_timeout_expired`]
//! only fires once that time is a full week old.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use ses_core::{
    now_millis, validate_pseudonym, CarrierId, Imsi, PseudonymRecord, RecordError,
};

use crate::error::FailureReason;
use crate::retry::RetrySchedule;

/// Retrieval after a failure timeout is attempted once a week.
pub const FAILURE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Rate-limited retrievals are spread uniformly over this window.
pub const RATE_LIMIT_JITTER: Duration = Duration::from_secs(10);

/// Notified whenever a carrier's pseudonym changes through a retrieval.
pub trait PseudonymUpdateListener: Send + Sync {
    fn on_updated(&self, carrier_id: CarrierId, pseudonym: &str);
}

/// Manager operation failure.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// An in-band pseudonym arrived for a carrier with no stored record.
    #[error("no pseudonym record for {carrier_id}")]
    NoRecord { carrier_id: CarrierId },

    #[error("invalid in-band pseudonym: {0}")]
    InvalidPseudonym(#[from] RecordError),
}

#[derive(Debug, Default)]
struct CarrierState {
    record: Option<PseudonymRecord>,
    connection_retries: usize,
    server_retries: usize,
    /// Epoch ms of the last failure, 0 after a success.
    last_failure_millis: i64,
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// In-memory pseudonym cache with retry scheduling.
pub struct PseudonymManager {
    carriers: HashMap<CarrierId, CarrierState>,
    listeners: Vec<Arc<dyn PseudonymUpdateListener>>,
    clock: Clock,
}

impl fmt::Debug for PseudonymManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudonymManager")
            .field("carriers", &self.carriers)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for PseudonymManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PseudonymManager {
    /// Manager driven by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(now_millis)
    }

    /// Manager driven by `clock` (epoch milliseconds).
    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            carriers: HashMap::new(),
            listeners: Vec::new(),
            clock: Arc::new(clock),
        }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn register_listener(&mut self, listener: Arc<dyn PseudonymUpdateListener>) {
        if !self.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    pub fn unregister_listener(&mut self, listener: &Arc<dyn PseudonymUpdateListener>) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Stored record regardless of validity.
    pub fn record(&self, carrier_id: CarrierId) -> Option<&PseudonymRecord> {
        self.carriers.get(&carrier_id)?.record.as_ref()
    }

    /// Stored record if it has not expired and belongs to `current_imsi`.
    pub fn valid_record(
        &self,
        carrier_id: CarrierId,
        current_imsi: &Imsi,
    ) -> Option<&PseudonymRecord> {
        let record = self.record(carrier_id)?;
        if record.has_expired_at(self.now()) {
            return None;
        }
        if !current_imsi.matches(record.owner().as_str()) {
            tracing::warn!(carrier = %carrier_id, "stored pseudonym belongs to a different IMSI");
            return None;
        }
        Some(record)
    }

    /// Epoch ms of the last failure for `carrier_id`; 0 if none.
    pub fn last_failure_millis(&self, carrier_id: CarrierId) -> i64 {
        self.carriers
            .get(&carrier_id)
            .map_or(0, |s| s.last_failure_millis)
    }

    /// Retrieve now if there is no valid record, else when it needs refreshing.
    pub fn retrieve_if_needed(&mut self, carrier_id: CarrierId, current_imsi: &Imsi) -> Duration {
        let now = self.now();
        let delay_ms = self
            .valid_record(carrier_id, current_imsi)
            .map_or(0, |r| r.time_left_to_refresh_at(now));
        self.schedule(carrier_id, millis(delay_ms))
    }

    /// Retrieve after an authentication error, if the current record is old
    /// enough to refresh. The delay is jittered over [`RATE_LIMIT_JITTER`].
    pub fn retrieve_with_rate_limit(&mut self, carrier_id: CarrierId) -> Option<Duration> {
        let now = self.now();
        let Some(record) = self.record(carrier_id) else {
            tracing::warn!(carrier = %carrier_id, "rate-limited retrieval without a stored pseudonym");
            return None;
        };
        if !record.is_old_enough_to_refresh_at(now) {
            tracing::debug!(carrier = %carrier_id, "pseudonym too recent to refresh");
            return None;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..RATE_LIMIT_JITTER.as_millis() as u64);
        Some(self.schedule(carrier_id, Duration::from_millis(jitter_ms)))
    }

    /// Retrieve now if there is no valid record and the last failure is at
    /// least [`FAILURE_TIMEOUT`] old.
    pub fn retrieve_on_failure_timeout_expired(
        &mut self,
        carrier_id: CarrierId,
        current_imsi: &Imsi,
    ) -> Option<Duration> {
        if self.valid_record(carrier_id, current_imsi).is_some() {
            return None;
        }
        let last_failure = self.last_failure_millis(carrier_id);
        let timeout_ms = FAILURE_TIMEOUT.as_millis() as i64;
        if last_failure > 0 && self.now() - last_failure >= timeout_ms {
            Some(self.schedule(carrier_id, Duration::ZERO))
        } else {
            None
        }
    }

    /// Store a freshly retrieved record. Returns the refresh delay.
    pub fn on_success(&mut self, carrier_id: CarrierId, record: PseudonymRecord) -> Duration {
        tracing::info!(
            carrier = %carrier_id,
            pseudonym = %record.masked_pseudonym(),
            "pseudonym updated"
        );
        for listener in &self.listeners {
            listener.on_updated(carrier_id, record.pseudonym());
        }
        let delay = self.store(carrier_id, record);
        let state = self.carriers.entry(carrier_id).or_default();
        state.last_failure_millis = 0;
        state.connection_retries = 0;
        state.server_retries = 0;
        delay
    }

    /// Record a failed retrieval and pick the next retry, if any.
    pub fn on_failure(&mut self, carrier_id: CarrierId, reason: FailureReason) -> Option<Duration> {
        let now = self.now();
        let state = self.carriers.entry(carrier_id).or_default();
        state.last_failure_millis = now;

        let schedule = RetrySchedule::for_reason(reason)?;
        let retries = match reason {
            FailureReason::HttpsConnectionFailure => &mut state.connection_retries,
            _ => &mut state.server_retries,
        };
        let Some(delay) = schedule.delay(*retries) else {
            tracing::warn!(
                carrier = %carrier_id,
                reason = %reason,
                max_retries = schedule.max_retries(),
                "retry schedule exhausted"
            );
            return None;
        };
        *retries += 1;
        tracing::info!(
            carrier = %carrier_id,
            reason = %reason,
            retry = *retries,
            delay_secs = delay.as_secs(),
            "scheduling pseudonym retry"
        );
        Some(self.schedule(carrier_id, delay))
    }

    /// Replace the stored pseudonym with one learned during EAP
    /// authentication. Owner and TTL carry over; the clock restarts.
    pub fn set_in_band_pseudonym(
        &mut self,
        carrier_id: CarrierId,
        pseudonym: &str,
    ) -> Result<Duration, ManagerError> {
        validate_pseudonym(pseudonym)?;
        let current = self
            .record(carrier_id)
            .ok_or(ManagerError::NoRecord { carrier_id })?;
        let record = PseudonymRecord::with_timestamp(
            pseudonym,
            current.owner().clone(),
            current.ttl_millis(),
            self.now(),
        )?;
        tracing::debug!(
            carrier = %carrier_id,
            pseudonym = %record.masked_pseudonym(),
            "in-band pseudonym stored"
        );
        Ok(self.store(carrier_id, record))
    }

    fn store(&mut self, carrier_id: CarrierId, record: PseudonymRecord) -> Duration {
        let delay = millis(record.time_left_to_refresh_at(self.now()));
        self.carriers.entry(carrier_id).or_default().record = Some(record);
        self.schedule(carrier_id, delay)
    }

    fn schedule(&mut self, carrier_id: CarrierId, delay: Duration) -> Duration {
        let now = self.now();
        self.carriers.entry(carrier_id).or_default().last_failure_millis = now;
        delay
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use ses_core::{DEFAULT_PSEUDONYM_TTL_MILLIS, HOUR_IN_MILLIS, MIN_REFRESH_INTERVAL_MILLIS, REFRESH_AHEAD_MILLIS};

    use super::*;

    const START: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * HOUR_IN_MILLIS;

    fn imsi() -> Imsi {
        Imsi::new("310260000000001").unwrap()
    }

    fn carrier() -> CarrierId {
        CarrierId(1)
    }

    fn manager() -> (PseudonymManager, Arc<AtomicI64>) {
        let now = Arc::new(AtomicI64::new(START));
        let clock = now.clone();
        (
            PseudonymManager::with_clock(move || clock.load(Ordering::SeqCst)),
            now,
        )
    }

    fn record_at(acquired_at: i64, ttl: i64) -> PseudonymRecord {
        PseudonymRecord::with_timestamp("pseudo-1234567", imsi(), ttl, acquired_at).unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(CarrierId, String)>>);

    impl PseudonymUpdateListener for Recorder {
        fn on_updated(&self, carrier_id: CarrierId, pseudonym: &str) {
            self.0.lock().unwrap().push((carrier_id, pseudonym.to_string()));
        }
    }

    #[test]
    fn retrieve_immediately_without_record() {
        let (mut mgr, _) = manager();
        assert_eq!(mgr.retrieve_if_needed(carrier(), &imsi()), Duration::ZERO);
        assert_eq!(mgr.last_failure_millis(carrier()), START);
    }

    #[test]
    fn retrieve_at_refresh_point_with_valid_record() {
        let (mut mgr, _) = manager();
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        let delay = mgr.retrieve_if_needed(carrier(), &imsi());
        assert_eq!(delay.as_millis() as i64, DAY_MS - REFRESH_AHEAD_MILLIS);
    }

    #[test]
    fn record_for_other_imsi_is_not_valid() {
        let (mut mgr, _) = manager();
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        let other = Imsi::new("310260000000002").unwrap();
        assert!(mgr.valid_record(carrier(), &other).is_none());
        assert!(mgr.valid_record(carrier(), &imsi()).is_some());
        assert_eq!(mgr.retrieve_if_needed(carrier(), &other), Duration::ZERO);
    }

    #[test]
    fn expired_record_is_not_valid() {
        let (mut mgr, now) = manager();
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        now.store(START + DAY_MS, Ordering::SeqCst);
        assert!(mgr.valid_record(carrier(), &imsi()).is_none());
        assert!(mgr.record(carrier()).is_some());
    }

    #[test]
    fn success_notifies_listeners_and_resets_failure() {
        let (mut mgr, _) = manager();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn PseudonymUpdateListener> = recorder.clone();
        mgr.register_listener(listener.clone());
        mgr.register_listener(listener.clone());

        mgr.on_failure(carrier(), FailureReason::TransientFailure);
        assert_eq!(mgr.last_failure_millis(carrier()), START);

        mgr.on_success(carrier(), record_at(START, DAY_MS));
        assert_eq!(mgr.last_failure_millis(carrier()), 0);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[(carrier(), "pseudo-1234567".to_string())]
        );

        mgr.unregister_listener(&listener);
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn connection_failures_back_off_then_stop() {
        let (mut mgr, _) = manager();
        let delays: Vec<Option<u64>> = (0..6)
            .map(|_| {
                mgr.on_failure(carrier(), FailureReason::HttpsConnectionFailure)
                    .map(|d| d.as_secs())
            })
            .collect();
        assert_eq!(
            delays,
            vec![Some(30), Some(60), Some(3_600), Some(10_800), Some(32_400), None]
        );
    }

    #[test]
    fn transient_failures_use_server_schedule() {
        let (mut mgr, _) = manager();
        assert_eq!(
            mgr.on_failure(carrier(), FailureReason::TransientFailure),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            mgr.on_failure(carrier(), FailureReason::TransientFailure),
            Some(Duration::from_secs(900))
        );
        // Independent counter.
        assert_eq!(
            mgr.on_failure(carrier(), FailureReason::HttpsConnectionFailure),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn success_resets_retry_counters() {
        let (mut mgr, _) = manager();
        mgr.on_failure(carrier(), FailureReason::TransientFailure);
        mgr.on_failure(carrier(), FailureReason::TransientFailure);
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        assert_eq!(
            mgr.on_failure(carrier(), FailureReason::TransientFailure),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn non_transient_failure_is_not_retried() {
        let (mut mgr, _) = manager();
        assert_eq!(mgr.on_failure(carrier(), FailureReason::NonTransientFailure), None);
        assert_eq!(mgr.last_failure_millis(carrier()), START);
    }

    #[test]
    fn failure_timeout_fires_after_seven_days() {
        let (mut mgr, now) = manager();
        assert_eq!(mgr.retrieve_on_failure_timeout_expired(carrier(), &imsi()), None);

        mgr.on_failure(carrier(), FailureReason::NonTransientFailure);
        now.store(START + 7 * DAY_MS - 1, Ordering::SeqCst);
        assert_eq!(mgr.retrieve_on_failure_timeout_expired(carrier(), &imsi()), None);

        now.store(START + 7 * DAY_MS, Ordering::SeqCst);
        assert_eq!(
            mgr.retrieve_on_failure_timeout_expired(carrier(), &imsi()),
            Some(Duration::ZERO)
        );
        // Scheduling restamps the failure time.
        assert_eq!(mgr.last_failure_millis(carrier()), START + 7 * DAY_MS);
    }

    #[test]
    fn failure_timeout_ignored_with_valid_record() {
        let (mut mgr, now) = manager();
        mgr.on_success(carrier(), record_at(START, 30 * DAY_MS));
        mgr.on_failure(carrier(), FailureReason::NonTransientFailure);
        now.store(START + 8 * DAY_MS, Ordering::SeqCst);
        assert_eq!(mgr.retrieve_on_failure_timeout_expired(carrier(), &imsi()), None);
    }

    #[test]
    fn rate_limit_requires_old_enough_record() {
        let (mut mgr, now) = manager();
        assert_eq!(mgr.retrieve_with_rate_limit(carrier()), None);

        mgr.on_success(carrier(), record_at(START, DEFAULT_PSEUDONYM_TTL_MILLIS));
        assert_eq!(mgr.retrieve_with_rate_limit(carrier()), None);

        now.store(START + MIN_REFRESH_INTERVAL_MILLIS, Ordering::SeqCst);
        for _ in 0..20 {
            let delay = mgr.retrieve_with_rate_limit(carrier()).unwrap();
            assert!(delay < RATE_LIMIT_JITTER);
        }
    }

    #[test]
    fn in_band_pseudonym_keeps_owner_and_ttl() {
        let (mut mgr, now) = manager();
        assert!(matches!(
            mgr.set_in_band_pseudonym(carrier(), "inband-1"),
            Err(ManagerError::NoRecord { .. })
        ));

        mgr.on_success(carrier(), record_at(START, DAY_MS));
        now.store(START + HOUR_IN_MILLIS, Ordering::SeqCst);
        let delay = mgr.set_in_band_pseudonym(carrier(), "inband-1").unwrap();
        assert_eq!(delay.as_millis() as i64, DAY_MS - REFRESH_AHEAD_MILLIS);

        let record = mgr.record(carrier()).unwrap();
        assert_eq!(record.pseudonym(), "inband-1");
        assert_eq!(record.owner(), &imsi());
        assert_eq!(record.ttl_millis(), DAY_MS);
        assert_eq!(record.acquired_at_millis(), START + HOUR_IN_MILLIS);
    }

    #[test]
    fn in_band_pseudonym_is_validated() {
        let (mut mgr, _) = manager();
        mgr.on_success(carrier(), record_at(START, DAY_MS));
        assert!(matches!(
            mgr.set_in_band_pseudonym(carrier(), ""),
            Err(ManagerError::InvalidPseudonym(RecordError::EmptyPseudonym))
        ));
        assert_eq!(mgr.record(carrier()).unwrap().pseudonym(), "pseudo-1234567");
    }
}
