//! Vizier-side cloud connector.
//!
//! This crate keeps a Vizier attached to the cloud broker. A [`Controller`]
//! opens one bidirectional stream and walks it through three phases:
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │   Register   │───▶│  Provision   │───▶│  Heartbeat   │──▶ stop
//! │ (1 send,     │    │  TLS certs   │    │ (every 5s,   │
//! │  5 listens)  │    │              │    │  seq checked)│
//! └──────────────┘    └──────────────┘    └──────────────┘
//!        │                   │                   │
//!        └───────────────────┴───────────────────┘
//!                            ▼
//!                   fatal error to supervisor
//! ```
//!
//! Every failure is fatal: the controller returns it, tagged with the
//! [`Phase`] it happened in, and leaves recovery to whatever supervises the
//! process.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use vzconn_agent::{
//!     ConnectorConfig, Controller, HttpCertApplier, StaticVizierInfo, VizierIdentity,
//!     WsConnector,
//! };
//! use vzconn_core::VizierId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = VizierIdentity::new(VizierId::generate(), "jwt-signing-key");
//! let mut controller = Controller::new(
//!     identity,
//!     Arc::new(WsConnector::new("wss://vzconn.example.com/connect")),
//!     Arc::new(HttpCertApplier::new("http://cert-mgr:50900")?),
//!     Arc::new(StaticVizierInfo::new("34.1.2.3")),
//!     ConnectorConfig::default(),
//! );
//!
//! controller.start().await?;
//! let stop = controller.stop_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     stop.stop();
//! });
//! controller.wait().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod certs;
pub mod clock;
pub mod controller;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod registration;
pub mod ssl;
pub mod stream;
pub mod timeout;
pub mod types;
pub mod vizier_info;
pub mod ws;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use certs::{CertApplier, HttpCertApplier};
pub use clock::{Clock, FixedClock, SystemClock};
pub use controller::{Controller, StopHandle};
pub use error::{ConnectorError, Phase, Result, Severity};
pub use health::health_router;
pub use heartbeat::Heartbeater;
pub use registration::register_vizier;
pub use ssl::request_and_handle_ssl_certs;
pub use stream::{BrokerStream, Connector};
pub use timeout::{do_with_timeout, Deferred};
pub use types::{ConnectionState, ConnectorConfig, VizierIdentity};
pub use vizier_info::{KubeVizierInfo, StaticVizierInfo, VizierInfo};
pub use ws::{WsBrokerStream, WsConnector};
