//! AUSF daemon entry point
//!
//! Loads the configuration, builds the context and clients, starts the SBI
//! server and the long-lived tasks (config poller, registration controller,
//! cache sweeper, metrics exporter) and tears everything down on SIGINT or
//! SIGTERM, deregistering from the NRF on the way out.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ausf_sbi::cache::run_cache_sweeper;
use ausf_sbi::{SbiServer, SbiServerConfig};

use ausfd::config::AusfConfig;
use ausfd::consumer::{HttpNrfClient, HttpUdmClient, NrfClient};
use ausfd::context::AusfContext;
use ausfd::producer::UeAuthEngine;
use ausfd::registration::{start_nf_registration_service, HeartbeatState};
use ausfd::sbi::AusfSbiHandler;
use ausfd::{metrics, polling};

/// AUSF - Authentication Server Function
#[derive(Parser, Debug)]
#[command(name = "ausfd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core Authentication Server Function", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(long = "cfg")]
    cfg: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AusfConfig::load(&args.cfg)?;

    env_logger::Builder::new()
        .filter_level(config.log_level())
        .format_timestamp_millis()
        .init();

    log::info!("AUSF v{} starting", env!("CARGO_PKG_VERSION"));

    // TLS session keys go next to the config file unless the operator
    // already points the keylog elsewhere.
    if config.sbi_scheme() == "https" && std::env::var_os("SSLKEYLOGFILE").is_none() {
        let keylog = args
            .cfg
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("ausf-keylog");
        std::env::set_var("SSLKEYLOGFILE", &keylog);
        log::info!("TLS keylog file: {}", keylog.display());
    }

    let ctx = AusfContext::new(&config);
    log::info!(
        "AUSF context initialized: nfId={} sbi={}",
        ctx.nf_id(),
        ctx.ipv4_uri()
    );

    if let Err(e) = metrics::init_metrics() {
        log::warn!("metrics exporter not started: {e}");
    }

    let nrf: Arc<dyn NrfClient> = Arc::new(
        HttpNrfClient::new(&ctx.nrf_uri)
            .with_context(|| format!("invalid nrfUri [{}]", ctx.nrf_uri))?,
    );
    let engine = Arc::new(UeAuthEngine::new(
        ctx.clone(),
        nrf.clone(),
        Arc::new(HttpUdmClient::new()),
    ));
    let handler = AusfSbiHandler::new(engine, nrf.clone());

    // SBI server; a bind failure aborts startup.
    let addr: SocketAddr = format!("{}:{}", ctx.binding_ipv4, ctx.sbi_port)
        .parse()
        .with_context(|| format!("invalid SBI address {}:{}", ctx.binding_ipv4, ctx.sbi_port))?;
    let mut server_config = SbiServerConfig::new(addr);
    if let (Some(pem), Some(key)) = (&ctx.tls_pem, &ctx.tls_key) {
        server_config = server_config.with_tls(pem, key);
    }
    let server = SbiServer::new(server_config);
    {
        let handler = handler.clone();
        server
            .start(move |request: ausf_sbi::SbiRequest| {
                let handler = handler.clone();
                async move { handler.handle(request).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!("SBI server failed to start: {e}"))?;
    }
    log::info!("SBI server listening on {addr}");

    let cancel = CancellationToken::new();
    let heartbeat = HeartbeatState::new();
    let (plmn_tx, plmn_rx) = mpsc::channel(16);

    let registration_handle = tokio::spawn(start_nf_registration_service(
        ctx.clone(),
        nrf.clone(),
        plmn_rx,
        cancel.child_token(),
        heartbeat.clone(),
    ));

    let polling_handle = tokio::spawn(polling::start_polling_service(
        ctx.webui_uri.clone(),
        plmn_tx,
        cancel.child_token(),
    ));

    let sweeper_handle = ctx.discovery_cache().map(|cache| {
        tokio::spawn(run_cache_sweeper(
            cache,
            ctx.nrf_cache_eviction_interval,
            cancel.child_token(),
        ))
    });

    log::info!("AUSF ready");
    wait_for_shutdown_signal().await;

    log::info!("shutting down");
    cancel.cancel();

    // The registration service deregisters from the NRF before it exits.
    let _ = registration_handle.await;
    let _ = polling_handle.await;
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }
    server
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("SBI server failed to stop: {e}"))?;

    log::info!("AUSF stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    log::warn!("SIGTERM handler not installed: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("received SIGINT"),
            _ = sigterm.recv() => log::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
