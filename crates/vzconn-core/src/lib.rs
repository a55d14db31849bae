//! Core types for the Vizier cloud connector.
//!
//! This crate provides what both ends of the broker stream agree on:
//!
//! - **Identifiers**: the strongly-typed [`VizierId`]
//! - **Messages**: request/response schemas for registration, TLS provisioning
//!   and heartbeats
//! - **Envelopes**: the topic-tagged wrapper and its CBOR wire codec
//!
//! # Example
//!
//! ```
//! use vzconn_core::envelope::{self, Topic};
//! use vzconn_core::messages::VizierSslCertRequest;
//! use vzconn_core::VizierId;
//!
//! let vizier_id: VizierId = "11111111-1111-1111-1111-111111111111".parse().unwrap();
//! let env = envelope::wrap(VizierSslCertRequest { vizier_id }, Topic::Ssl);
//! assert_eq!(env.topic.as_str(), "ssl");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod envelope;
pub mod ids;
pub mod messages;

pub use envelope::{CodecError, Envelope, Message, Payload, Topic};
pub use ids::{IdError, VizierId};
pub use messages::{
    RegisterVizierAck, RegisterVizierRequest, RegistrationStatus, VizierHeartbeat,
    VizierHeartbeatAck, VizierSslCertRequest, VizierSslCertResponse,
};
