//! `ses watch`: keep a pseudonym fresh until interrupted.
//!
//! The loop sleeps for whatever the [`PseudonymManager`] decides: the
//! record's refresh point after a success, the back-off delay after a
//! retryable failure, and the failure timeout once retries are exhausted.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ses_client::manager::FAILURE_TIMEOUT;
use ses_client::{
    EntitlementWorker, FailureReason, PseudonymManager, PseudonymUpdateListener, WorkerError,
};
use ses_core::{CarrierId, Imsi};

use crate::subscriber::SubscriberArgs;
use crate::{failure_json, record_json};

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub subscriber: SubscriberArgs,
}

/// Logs every pseudonym update.
struct LogListener;

impl PseudonymUpdateListener for LogListener {
    fn on_updated(&self, carrier_id: CarrierId, _pseudonym: &str) {
        tracing::info!(carrier = %carrier_id, "pseudonym refreshed");
    }
}

pub fn run_watch(args: &WatchArgs) -> Result<u8> {
    let runtime = tokio::runtime::Runtime::new()?;
    let worker = args.subscriber.spawn_worker(runtime.handle().clone())?;
    let imsi = args.subscriber.imsi()?;
    let carrier = args.subscriber.carrier();

    let mut manager = PseudonymManager::new();
    manager.register_listener(Arc::new(LogListener));

    let outcome = runtime.block_on(async {
        tokio::select! {
            result = watch_loop(&worker, &mut manager, carrier, &imsi) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                Ok(())
            }
        }
    });
    worker.shutdown()?;
    outcome.map(|()| 0)
}

async fn watch_loop(
    worker: &EntitlementWorker,
    manager: &mut PseudonymManager,
    carrier: CarrierId,
    imsi: &Imsi,
) -> Result<()> {
    let mut delay = manager.retrieve_if_needed(carrier, imsi);
    loop {
        tracing::debug!(carrier = %carrier, delay_secs = delay.as_secs(), "next retrieval");
        tokio::time::sleep(delay).await;

        let next = match worker.submit(carrier)?.await {
            Ok(Some(record)) => {
                println!("{}", record_json(carrier, &record));
                Some(manager.on_success(carrier, record))
            }
            Ok(None) => {
                let reason = FailureReason::NonTransientFailure;
                println!("{}", failure_json(carrier, reason, "no valid pseudonym received"));
                manager.on_failure(carrier, reason)
            }
            Err(WorkerError::Entitlement(e)) => {
                println!("{}", failure_json(carrier, e.reason(), &e.to_string()));
                manager.on_failure(carrier, e.reason())
            }
            Err(e) => return Err(e.into()),
        };

        delay = match next {
            Some(delay) => delay,
            None => {
                tracing::warn!(
                    carrier = %carrier,
                    timeout_days = FAILURE_TIMEOUT.as_secs() / 86_400,
                    "no retry scheduled, waiting for the failure timeout"
                );
                tokio::time::sleep(FAILURE_TIMEOUT).await;
                match manager.retrieve_on_failure_timeout_expired(carrier, imsi) {
                    Some(delay) => delay,
                    None => manager.retrieve_if_needed(carrier, imsi),
                }
            }
        };
    }
}
