//! Webconsole configuration polling
//!
//! Periodically fetches the desired PLMN list from the webconsole and emits
//! a snapshot to the registration controller whenever it changes. Transient
//! failures double the polling interval up to a cap; a success resets it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ausf_sbi::models::PlmnId;
use ausf_sbi::{SbiClient, SbiRequest};

pub const INITIAL_POLLING_INTERVAL: Duration = Duration::from_secs(5);
pub const POLLING_MAX_BACKOFF: Duration = Duration::from_secs(40);
const POLLING_BACKOFF_FACTOR: u32 = 2;
pub const POLLING_PATH: &str = "/nfconfig/plmn";

/// Poller state: the last observed config and the current interval.
pub struct NfConfigPoller {
    current_plmn_config: Vec<PlmnId>,
    interval: Duration,
}

impl NfConfigPoller {
    pub fn new() -> Self {
        Self {
            current_plmn_config: Vec::new(),
            interval: INITIAL_POLLING_INTERVAL,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A successful poll resets the interval. Returns the new snapshot when
    /// it differs (order-sensitive) from the last observed one.
    pub fn on_success(&mut self, new_plmn_config: Vec<PlmnId>) -> Option<Vec<PlmnId>> {
        self.interval = INITIAL_POLLING_INTERVAL;
        if self.current_plmn_config == new_plmn_config {
            log::debug!("PLMN config did not change");
            return None;
        }
        log::info!("PLMN config changed, new list: {new_plmn_config:?}");
        self.current_plmn_config = new_plmn_config.clone();
        Some(new_plmn_config)
    }

    /// A failed poll doubles the interval up to [`POLLING_MAX_BACKOFF`].
    pub fn on_failure(&mut self) -> Duration {
        self.interval = (self.interval * POLLING_BACKOFF_FACTOR).min(POLLING_MAX_BACKOFF);
        self.interval
    }
}

impl Default for NfConfigPoller {
    fn default() -> Self {
        Self::new()
    }
}

/// One GET of the PLMN endpoint. Each request carries its own 5 s timeout,
/// independent of the polling interval.
async fn fetch_plmn_config(client: &SbiClient) -> Result<Vec<PlmnId>> {
    let request = SbiRequest::get(POLLING_PATH).with_header("Accept", "application/json");
    let response = client
        .send_request(request)
        .await
        .with_context(|| format!("HTTP GET {POLLING_PATH} failed"))?;

    let content_type = response
        .http
        .get_header("Content-Type")
        .map(String::as_str)
        .unwrap_or("");
    if !content_type.contains("application/json") {
        bail!("unexpected Content-Type: got {content_type}, want application/json");
    }

    match response.status {
        200 => response
            .json::<Vec<PlmnId>>()
            .context("failed to parse PLMN config JSON"),
        400 | 500 => bail!("server returned {} error code", response.status),
        status => bail!("unexpected status code: {status}"),
    }
}

/// Poll the webconsole until cancelled, emitting changed snapshots into the
/// registration controller's channel.
pub async fn start_polling_service(
    webui_uri: String,
    plmn_tx: mpsc::Sender<Vec<PlmnId>>,
    cancel: CancellationToken,
) {
    let client = match SbiClient::from_uri(&webui_uri) {
        // The webconsole is not an SBI peer; it speaks plain HTTP/1.1.
        Ok(client) => Arc::new(client.with_http1()),
        Err(e) => {
            log::error!("invalid webuiUri [{webui_uri}]: {e}");
            return;
        }
    };

    log::info!("config polling service started against {webui_uri}");
    let mut poller = NfConfigPoller::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("config polling service shutting down");
                return;
            }
            _ = tokio::time::sleep(poller.interval()) => {}
        }

        match fetch_plmn_config(&client).await {
            Ok(new_plmn_config) => {
                log::debug!("configuration polled successfully");
                if let Some(snapshot) = poller.on_success(new_plmn_config) {
                    if plmn_tx.send(snapshot).await.is_err() {
                        log::warn!("registration controller is gone, polling stops");
                        return;
                    }
                }
            }
            Err(e) => {
                let next = poller.on_failure();
                log::error!(
                    "error polling network configuration, will retry in {}s: {e:#}",
                    next.as_secs()
                );
            }
        }
    }
}
