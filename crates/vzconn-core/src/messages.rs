//! Message schemas carried between a Vizier and the connection broker.
//!
//! Every request/response pair travels inside an [`Envelope`](crate::Envelope)
//! under one topic:
//!
//! | Topic       | Request                  | Response                 |
//! |-------------|--------------------------|--------------------------|
//! | `register`  | [`RegisterVizierRequest`] | [`RegisterVizierAck`]    |
//! | `ssl`       | [`VizierSslCertRequest`]  | [`VizierSslCertResponse`] |
//! | `heartbeat` | [`VizierHeartbeat`]       | [`VizierHeartbeatAck`]   |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::VizierId;

/// Announces a Vizier to the broker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVizierRequest {
    /// The Vizier being registered.
    pub vizier_id: VizierId,
    /// Shared signing secret used to authenticate the Vizier.
    pub jwt_key: String,
    /// Externally reachable address of the Vizier proxy, or empty if unknown.
    pub address: String,
}

impl fmt::Debug for RegisterVizierRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterVizierRequest")
            .field("vizier_id", &self.vizier_id)
            .field("jwt_key", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// Outcome reported by the broker for a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Status was not set by the broker.
    Unknown,
    /// Registration accepted.
    Ok,
    /// Registration rejected.
    Failed,
    /// The Vizier is not known to the broker.
    NotFound,
}

/// Broker reply to a [`RegisterVizierRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVizierAck {
    /// Registration outcome.
    pub status: RegistrationStatus,
}

/// Requests TLS material for the Vizier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizierSslCertRequest {
    /// The Vizier requesting certificates.
    pub vizier_id: VizierId,
}

/// TLS key and certificate issued by the broker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizierSslCertResponse {
    /// Private key bytes (PEM).
    pub key: Vec<u8>,
    /// Certificate bytes (PEM).
    pub cert: Vec<u8>,
}

impl fmt::Debug for VizierSslCertResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VizierSslCertResponse")
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .finish()
    }
}

/// Periodic liveness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizierHeartbeat {
    /// The Vizier sending the heartbeat.
    pub vizier_id: VizierId,
    /// Send time in unix seconds.
    pub time: i64,
    /// Sequence number of this heartbeat.
    pub sequence_number: u64,
    /// Externally reachable address of the Vizier proxy, or empty if unknown.
    pub address: String,
}

/// Broker acknowledgment of a [`VizierHeartbeat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizierHeartbeatAck {
    /// Echo of the acknowledged heartbeat's sequence number.
    pub sequence_number: u64,
}
