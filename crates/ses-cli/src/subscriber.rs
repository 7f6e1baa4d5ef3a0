//! Arguments shared by `fetch` and `watch`, and the worker they build.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use ses_client::config::DEFAULT_TIMEOUT_SECS;
use ses_client::{
    EntitlementConfig, EntitlementEngine, EntitlementWorker, HttpsTransport, RequestFactory,
    SubscriberInfo, TransportConfig,
};
use ses_core::{CarrierId, Imsi};
use tokio::runtime::Handle;

use crate::aka::CommandAkaResponder;

#[derive(Args, Debug, Clone)]
pub struct SubscriberArgs {
    /// Subscriber IMSI.
    #[arg(long)]
    pub imsi: String,

    /// Carrier identifier attached to results.
    #[arg(long, default_value_t = 1)]
    pub carrier_id: i32,

    /// Device IMEI (14 or more digits).
    #[arg(long)]
    pub imei: String,

    /// 2-digit device software version.
    #[arg(long)]
    pub software_version: String,

    /// SIM operator code (MCC + MNC). Enables the `imsi-eap` identity.
    #[arg(long)]
    pub sim_operator: Option<String>,

    /// Device name reported to the server.
    #[arg(long, default_value = "ses-cli")]
    pub device_model: String,

    /// Program computing EAP-AKA responses, run as `<program> <challenge>`.
    #[arg(long)]
    pub aka_command: PathBuf,

    /// Entitlement server URL (https only).
    #[arg(long, env = "SES_SERVER_URL")]
    pub server_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "SES_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl SubscriberArgs {
    pub fn carrier(&self) -> CarrierId {
        CarrierId(self.carrier_id)
    }

    pub fn imsi(&self) -> Result<Imsi> {
        Imsi::new(self.imsi.as_str()).context("invalid --imsi")
    }

    pub fn config(&self) -> Result<EntitlementConfig> {
        let mut config = EntitlementConfig::new(&self.server_url).context("invalid --server-url")?;
        config.timeout_secs = self.timeout_secs;
        Ok(config)
    }

    /// Build the engine and move it onto a worker thread inside `runtime`.
    pub fn spawn_worker(&self, runtime: Handle) -> Result<EntitlementWorker> {
        let config = self.config()?;
        tracing::debug!(?config, "entitlement configuration");

        let factory = RequestFactory::new(SubscriberInfo {
            imsi: self.imsi()?,
            sim_operator: self.sim_operator.clone(),
            imei: Some(self.imei.clone()),
            software_version: Some(self.software_version.clone()),
            device_model: self.device_model.clone(),
        });
        let transport = HttpsTransport::new(TransportConfig::from(&config))
            .context("failed to build HTTPS transport")?;
        let engine = EntitlementEngine::new(
            factory,
            config.server_url.as_str(),
            Arc::new(transport),
            Arc::new(CommandAkaResponder::new(&self.aka_command)),
        )?;
        Ok(EntitlementWorker::spawn(engine, runtime)?)
    }
}
