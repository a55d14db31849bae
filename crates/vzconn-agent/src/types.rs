//! Configuration and state types for the connector.

use std::fmt;
use std::time::Duration;

use vzconn_core::VizierId;

use crate::error::{ConnectorError, Result};

/// Identity the Vizier presents to the broker.
#[derive(Clone)]
pub struct VizierIdentity {
    /// The Vizier's unique ID.
    pub vizier_id: VizierId,
    /// Shared signing secret used to authenticate the Vizier.
    pub jwt_signing_key: String,
}

impl VizierIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(vizier_id: VizierId, jwt_signing_key: impl Into<String>) -> Self {
        Self {
            vizier_id,
            jwt_signing_key: jwt_signing_key.into(),
        }
    }
}

impl fmt::Debug for VizierIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VizierIdentity")
            .field("vizier_id", &self.vizier_id)
            .field("jwt_signing_key", &"<redacted>")
            .finish()
    }
}

/// Timing and retry configuration for the connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Pause between the end of one heartbeat and the start of the next.
    pub heartbeat_interval: Duration,
    /// How long to wait for a registration or heartbeat ack.
    pub ack_timeout: Duration,
    /// How many times to wait for a registration ack before giving up.
    pub register_attempts: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(2),
            register_attempts: 5,
        }
    }
}

impl ConnectorConfig {
    /// Check that the configuration can drive a connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Config` for a zero timeout, interval or attempt budget.
    pub fn validate(&self) -> Result<()> {
        if self.register_attempts == 0 {
            return Err(ConnectorError::Config(
                "register_attempts must be at least 1".to_string(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConnectorError::Config(
                "ack_timeout must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConnectorError::Config(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable state of a connection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started.
    Idle,
    /// Opening the broker stream.
    Connecting,
    /// Waiting for the registration ack.
    Registering,
    /// Fetching and applying TLS material.
    ProvisioningCerts,
    /// Heartbeat loop running.
    Heartbeating,
    /// Heartbeat loop exited after a stop request.
    Stopped,
    /// A fatal error ended the connection.
    Failed,
}

impl ConnectionState {
    /// Returns true once setup has completed and heartbeats are flowing.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Heartbeating)
    }

    /// Returns true if the controller can no longer make progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}
