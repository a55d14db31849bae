//! The duplex stream between a Vizier and the broker.
//!
//! The connector only ever talks to the broker through [`BrokerStream`]. A
//! stream delivers envelopes in order; implementations serialize concurrent
//! `send` and `recv` calls themselves, so both methods take `&self` and a
//! stream can be shared behind an `Arc` with a timed receive that outlives its
//! caller's interest.

use std::sync::Arc;

use async_trait::async_trait;
use vzconn_core::Envelope;

use crate::error::Result;

/// A live, ordered, bidirectional stream of envelopes.
#[async_trait]
pub trait BrokerStream: Send + Sync {
    /// Send one envelope to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be encoded or written.
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope from the broker.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::StreamClosed` once the broker has closed the
    /// stream, or another error if the next message cannot be read or decoded.
    async fn recv(&self) -> Result<Envelope>;
}

/// Opens broker streams.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new stream to the broker.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::StreamOpen` if the broker cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn BrokerStream>>;
}
