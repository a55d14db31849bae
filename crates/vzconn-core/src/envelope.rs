//! Topic-tagged envelopes multiplexed over the broker stream.
//!
//! An [`Envelope`] pairs a [`Topic`] with a [`Payload`]. The payload is a
//! closed sum over the message schemas in [`crate::messages`], so a receiver
//! can decode any envelope without knowing in advance which schema it holds
//! and then ask for the one it expects with [`unwrap`].
//!
//! On the wire an envelope is a single CBOR document ([`encode`] / [`decode`]).
//!
//! # Example
//!
//! ```
//! use vzconn_core::envelope::{self, Topic};
//! use vzconn_core::messages::VizierHeartbeatAck;
//!
//! let env = envelope::wrap(VizierHeartbeatAck { sequence_number: 3 }, Topic::Heartbeat);
//! let bytes = envelope::encode(&env).unwrap();
//! let ack: VizierHeartbeatAck = envelope::unwrap(envelope::decode(&bytes).unwrap()).unwrap();
//! assert_eq!(ack.sequence_number, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::messages::{
    RegisterVizierAck, RegisterVizierRequest, VizierHeartbeat, VizierHeartbeatAck,
    VizierSslCertRequest, VizierSslCertResponse,
};

/// Stream topic an envelope is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Registration handshake.
    Register,
    /// TLS credential provisioning.
    Ssl,
    /// Liveness heartbeats.
    Heartbeat,
    /// Any topic this build does not know about.
    #[serde(other)]
    Unknown,
}

impl Topic {
    /// Return the wire name of the topic.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Ssl => "ssl",
            Self::Heartbeat => "heartbeat",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-tagged message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// See [`RegisterVizierRequest`].
    RegisterVizierRequest(RegisterVizierRequest),
    /// See [`RegisterVizierAck`].
    RegisterVizierAck(RegisterVizierAck),
    /// See [`VizierSslCertRequest`].
    VizierSslCertRequest(VizierSslCertRequest),
    /// See [`VizierSslCertResponse`].
    VizierSslCertResponse(VizierSslCertResponse),
    /// See [`VizierHeartbeat`].
    VizierHeartbeat(VizierHeartbeat),
    /// See [`VizierHeartbeatAck`].
    VizierHeartbeatAck(VizierHeartbeatAck),
}

impl Payload {
    /// Return the type tag of the contained message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::RegisterVizierRequest(_) => RegisterVizierRequest::TYPE_NAME,
            Self::RegisterVizierAck(_) => RegisterVizierAck::TYPE_NAME,
            Self::VizierSslCertRequest(_) => VizierSslCertRequest::TYPE_NAME,
            Self::VizierSslCertResponse(_) => VizierSslCertResponse::TYPE_NAME,
            Self::VizierHeartbeat(_) => VizierHeartbeat::TYPE_NAME,
            Self::VizierHeartbeatAck(_) => VizierHeartbeatAck::TYPE_NAME,
        }
    }
}

/// A message schema that can travel inside a [`Payload`].
pub trait Message: Sized {
    /// Type tag of the schema.
    const TYPE_NAME: &'static str;

    /// Wrap the message in its payload variant.
    fn into_payload(self) -> Payload;

    /// Extract the message, handing the payload back if it holds another schema.
    ///
    /// # Errors
    ///
    /// Returns the original payload when its tag is not `Self::TYPE_NAME`.
    fn from_payload(payload: Payload) -> std::result::Result<Self, Payload>;
}

macro_rules! impl_message {
    ($($ty:ident => $name:literal),* $(,)?) => {
        $(
            impl Message for $ty {
                const TYPE_NAME: &'static str = $name;

                fn into_payload(self) -> Payload {
                    Payload::$ty(self)
                }

                fn from_payload(payload: Payload) -> std::result::Result<Self, Payload> {
                    match payload {
                        Payload::$ty(msg) => Ok(msg),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_message! {
    RegisterVizierRequest => "register_vizier_request",
    RegisterVizierAck => "register_vizier_ack",
    VizierSslCertRequest => "vizier_ssl_cert_request",
    VizierSslCertResponse => "vizier_ssl_cert_response",
    VizierHeartbeat => "vizier_heartbeat",
    VizierHeartbeatAck => "vizier_heartbeat_ack",
}

/// A topic-tagged message exchanged over the broker stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic the message belongs to.
    pub topic: Topic,
    /// The message itself.
    pub payload: Payload,
}

/// Errors produced by the envelope codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload holds a different schema than the caller asked for.
    #[error("payload type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Type tag the caller asked for.
        expected: &'static str,
        /// Type tag actually present.
        got: &'static str,
    },

    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// The bytes are not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(String),
}

/// Wrap a message under the given topic.
#[must_use]
pub fn wrap<M: Message>(message: M, topic: Topic) -> Envelope {
    Envelope {
        topic,
        payload: message.into_payload(),
    }
}

/// Extract a message of the expected schema from an envelope.
///
/// The topic is not checked; only the payload's type tag decides.
///
/// # Errors
///
/// Returns `CodecError::TypeMismatch` if the payload holds another schema.
pub fn unwrap<M: Message>(envelope: Envelope) -> Result<M, CodecError> {
    M::from_payload(envelope.payload).map_err(|other| CodecError::TypeMismatch {
        expected: M::TYPE_NAME,
        got: other.type_name(),
    })
}

/// Serialize an envelope to its CBOR wire form.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(envelope, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Parse an envelope from its CBOR wire form.
///
/// # Errors
///
/// Returns `CodecError::Decode` for malformed bytes or an unknown payload tag.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
