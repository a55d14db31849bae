//! Vizier Cloud Connector
//!
//! Keeps this Vizier registered with the cloud broker: opens the broker
//! stream, registers, installs the TLS certs the broker hands out, then
//! heartbeats until shut down. Any connection failure exits the process with
//! a non-zero status so the orchestrator restarts it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vzconn_agent::{
    health_router, ConnectorConfig, Controller, HttpCertApplier, KubeVizierInfo,
    StaticVizierInfo, VizierIdentity, VizierInfo, WsConnector,
};
use vzconn_core::VizierId;

#[derive(Parser, Debug)]
#[command(name = "cloud-connector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ID of this Vizier.
    #[arg(long, env = "VIZIER_ID")]
    vizier_id: VizierId,

    /// Key the broker uses to sign JWTs for this Vizier.
    #[arg(long, env = "PL_JWT_SIGNING_KEY", hide_env_values = true)]
    jwt_signing_key: String,

    /// Broker WebSocket URL.
    #[arg(long, env = "VZCONN_URL")]
    vzconn_url: String,

    /// Base URL of the cert manager.
    #[arg(long, env = "CERT_MGR_URL")]
    cert_mgr_url: String,

    /// Fixed proxy address; skips the Kubernetes lookup when set.
    #[arg(long, env = "VIZIER_ADDRESS")]
    vizier_address: Option<String>,

    /// Service whose load balancer fronts the Vizier proxy.
    #[arg(long, env = "PROXY_SERVICE", default_value = "vizier-proxy-service")]
    proxy_service: String,

    /// Namespace the Vizier runs in.
    #[arg(long, env = "POD_NAMESPACE", default_value = "pl")]
    namespace: String,

    /// Address for the health server.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:50800")]
    listen_addr: String,

    /// Seconds between heartbeats.
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECONDS", default_value_t = 5)]
    heartbeat_interval_seconds: u64,

    /// Seconds to wait for a registration or heartbeat ack.
    #[arg(long, env = "ACK_TIMEOUT_SECONDS", default_value_t = 2)]
    ack_timeout_seconds: u64,

    /// Times to listen for the registration ack.
    #[arg(long, env = "REGISTER_ATTEMPTS", default_value_t = 5)]
    register_attempts: u32,
}

impl Args {
    fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_seconds),
            ack_timeout: Duration::from_secs(self.ack_timeout_seconds),
            register_attempts: self.register_attempts,
        }
    }
}

async fn vizier_info(args: &Args) -> Arc<dyn VizierInfo> {
    if let Some(address) = &args.vizier_address {
        tracing::info!(address = %address, "Using configured Vizier address");
        return Arc::new(StaticVizierInfo::new(address.clone()));
    }

    match KubeVizierInfo::try_default(args.namespace.clone(), args.proxy_service.clone()).await {
        Ok(info) => Arc::new(info),
        Err(e) => {
            tracing::warn!(error = %e, "Kubernetes unavailable - Vizier address will be empty");
            Arc::new(StaticVizierInfo::unavailable())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vzconn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.connector_config();

    tracing::info!(
        vizier_id = %args.vizier_id,
        vzconn_url = %args.vzconn_url,
        cert_mgr_url = %args.cert_mgr_url,
        listen_addr = %args.listen_addr,
        heartbeat_interval = ?config.heartbeat_interval,
        ack_timeout = ?config.ack_timeout,
        register_attempts = config.register_attempts,
        "Starting Cloud Connector"
    );

    let identity = VizierIdentity::new(args.vizier_id, args.jwt_signing_key.clone());
    let cert_applier =
        Arc::new(HttpCertApplier::new(args.cert_mgr_url.clone()).context("cert manager client")?);
    let connector = Arc::new(WsConnector::new(args.vzconn_url.clone()));
    let vizier_info = vizier_info(&args).await;

    let mut controller = Controller::new(identity, connector, cert_applier, vizier_info, config);

    // Health server
    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", args.listen_addr))?;
    let app = health_router(controller.subscribe());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });
    tracing::info!(listen_addr = %args.listen_addr, "Health server listening");

    if let Err(e) = controller.start().await {
        tracing::error!(error = %e, phase = ?e.phase(), "Failed to start cloud connector stream");
        std::process::exit(1);
    }

    let stop = controller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            stop.stop();
        }
    });

    if let Err(e) = controller.wait().await {
        tracing::error!(error = %e, "Cloud connector stream failed");
        std::process::exit(1);
    }

    tracing::info!("Cloud connector stopped");
    Ok(())
}
