//! `ses fetch`: retrieve one pseudonym.

use anyhow::Result;
use clap::Args;
use ses_client::{FailureReason, WorkerError};

use crate::subscriber::SubscriberArgs;
use crate::{failure_json, record_json};

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub subscriber: SubscriberArgs,
}

/// Exit code 0 with the record on stdout, 1 with the failure on stdout.
pub fn run_fetch(args: &FetchArgs) -> Result<u8> {
    let runtime = tokio::runtime::Runtime::new()?;
    let carrier = args.subscriber.carrier();
    let worker = args.subscriber.spawn_worker(runtime.handle().clone())?;

    let result = runtime.block_on(worker.submit(carrier)?);
    worker.shutdown()?;

    let (line, code) = match result {
        Ok(Some(record)) => (record_json(carrier, &record), 0),
        Ok(None) => (
            failure_json(
                carrier,
                FailureReason::NonTransientFailure,
                "no valid pseudonym received",
            ),
            1,
        ),
        Err(WorkerError::Entitlement(e)) => (failure_json(carrier, e.reason(), &e.to_string()), 1),
        Err(e) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string_pretty(&line)?);
    Ok(code)
}
