//! Connection lifecycle controller.
//!
//! The controller owns the broker stream and drives it through its phases:
//!
//! - `Idle` → `Connecting` (start)
//! - `Connecting` → `Registering` (stream open) or `Failed`
//! - `Registering` → `ProvisioningCerts` (ack OK) or `Failed`
//! - `ProvisioningCerts` → `Heartbeating` (certs applied) or `Failed`
//! - `Heartbeating` → `Stopped` (stop) or `Failed`
//!
//! Setup runs on the caller's task; the heartbeat loop runs on its own task
//! and is the only phase the stop signal affects. A controller is single-use:
//! once stopped or failed it cannot be started again.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::certs::CertApplier;
use crate::clock::{Clock, SystemClock};
use crate::error::{ConnectorError, Phase, Result};
use crate::heartbeat::Heartbeater;
use crate::registration::register_vizier;
use crate::ssl::request_and_handle_ssl_certs;
use crate::stream::Connector;
use crate::types::{ConnectionState, ConnectorConfig, VizierIdentity};
use crate::vizier_info::VizierInfo;

/// Cloneable handle that stops a controller's heartbeat loop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    /// Signal the heartbeat loop to exit. Further calls have no effect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Drives one connection to the broker from stream open to shutdown.
pub struct Controller {
    identity: VizierIdentity,
    connector: Arc<dyn Connector>,
    cert_applier: Arc<dyn CertApplier>,
    vizier_info: Arc<dyn VizierInfo>,
    clock: Arc<dyn Clock>,
    config: ConnectorConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ConnectionState>>,
    heartbeat_handle: Option<JoinHandle<Result<()>>>,
}

impl Controller {
    /// Create a controller using the system clock.
    #[must_use]
    pub fn new(
        identity: VizierIdentity,
        connector: Arc<dyn Connector>,
        cert_applier: Arc<dyn CertApplier>,
        vizier_info: Arc<dyn VizierInfo>,
        config: ConnectorConfig,
    ) -> Self {
        Self::with_clock(
            identity,
            connector,
            cert_applier,
            vizier_info,
            config,
            Arc::new(SystemClock),
        )
    }

    /// Create a controller with the given clock.
    #[must_use]
    pub fn with_clock(
        identity: VizierIdentity,
        connector: Arc<dyn Connector>,
        cert_applier: Arc<dyn CertApplier>,
        vizier_info: Arc<dyn VizierInfo>,
        config: ConnectorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            identity,
            connector,
            cert_applier,
            vizier_info,
            clock,
            config,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            heartbeat_handle: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// A handle that can stop this controller from another task.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Open the stream, register, provision certs, then start heartbeating.
    ///
    /// Returns once the heartbeat loop has been spawned; use [`Self::wait`] to
    /// observe how it ends.
    ///
    /// # Errors
    ///
    /// Returns a fatal error, tagged with the failing [`Phase`], if any setup
    /// step fails. Returns `ConnectorError::Internal` if the controller was
    /// already started or stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != ConnectionState::Idle || self.cancel.is_cancelled() {
            return Err(ConnectorError::Internal(format!(
                "controller cannot start from state {:?}",
                self.state()
            )));
        }
        self.config.validate()?;

        let vizier_id = self.identity.vizier_id;
        tracing::info!(vizier_id = %vizier_id, "Starting cloud connector stream");

        match self.run_setup().await {
            Ok(heartbeater) => {
                self.state.send_replace(ConnectionState::Heartbeating);
                let cancel = self.cancel.clone();
                let state = Arc::clone(&self.state);
                self.heartbeat_handle = Some(tokio::spawn(async move {
                    let result = heartbeater
                        .run(cancel)
                        .await
                        .map_err(|e| e.in_phase(Phase::Heartbeat));
                    state.send_replace(if result.is_ok() {
                        ConnectionState::Stopped
                    } else {
                        ConnectionState::Failed
                    });
                    result
                }));
                tracing::info!(vizier_id = %vizier_id, "Cloud connector started heartbeats");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    async fn run_setup(&self) -> Result<Heartbeater> {
        self.state.send_replace(ConnectionState::Connecting);
        let stream = self
            .connector
            .connect()
            .await
            .map_err(|e| e.in_phase(Phase::Connect))?;

        self.state.send_replace(ConnectionState::Registering);
        register_vizier(
            &stream,
            &self.identity,
            self.vizier_info.as_ref(),
            &self.config,
        )
        .await
        .map_err(|e| e.in_phase(Phase::Register))?;

        self.state.send_replace(ConnectionState::ProvisioningCerts);
        request_and_handle_ssl_certs(&stream, &self.identity, self.cert_applier.as_ref())
            .await
            .map_err(|e| e.in_phase(Phase::ProvisionCerts))?;

        Ok(Heartbeater::new(
            stream,
            self.identity.vizier_id,
            Arc::clone(&self.vizier_info),
            Arc::clone(&self.clock),
            &self.config,
        ))
    }

    /// Stop the heartbeat loop. Has no effect on a setup already in progress.
    pub fn stop(&self) {
        tracing::info!(vizier_id = %self.identity.vizier_id, "Stopping cloud connector");
        self.cancel.cancel();
    }

    /// Wait for the heartbeat loop to end.
    ///
    /// # Errors
    ///
    /// Returns the fatal heartbeat error that ended the loop, or
    /// `ConnectorError::Internal` if the controller was never started or the
    /// heartbeat task panicked.
    pub async fn wait(&mut self) -> Result<()> {
        let handle = self.heartbeat_handle.take().ok_or_else(|| {
            ConnectorError::Internal("controller has no running heartbeat loop".to_string())
        })?;

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                self.state.send_replace(ConnectionState::Failed);
                Err(ConnectorError::Internal(format!("heartbeat task failed: {e}")))
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // A dropped controller must not leave heartbeats running.
        self.cancel.cancel();
    }
}
