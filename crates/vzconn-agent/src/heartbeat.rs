//! Heartbeat loop.
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//!       ┌─────────┐  send   ┌──────────┐  ack seq ok  ┌─┴─────┐
//!  ────▶│ Running │────────▶│ AwaitAck │─────────────▶│ Sleep │
//!       └────┬────┘         └────┬─────┘              └───────┘
//!            │ cancelled         │ send error / timeout /
//!            ▼                   │ decode error / seq mismatch
//!       ┌─────────┐              ▼
//!       │ Stopped │          (fatal)
//!       └─────────┘
//! ```
//!
//! Every tick gets exactly one attempt. The sequence counter advances as soon
//! as a heartbeat is sent, whatever happens to its ack.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vzconn_core::envelope::{self, Topic};
use vzconn_core::{VizierHeartbeat, VizierHeartbeatAck, VizierId};

use crate::clock::Clock;
use crate::error::{ConnectorError, Result};
use crate::stream::BrokerStream;
use crate::timeout::do_with_timeout;
use crate::types::ConnectorConfig;
use crate::vizier_info::{resolve_address, VizierInfo};

/// Sends sequence-numbered heartbeats and checks their acks.
pub struct Heartbeater {
    stream: Arc<dyn BrokerStream>,
    vizier_id: VizierId,
    vizier_info: Arc<dyn VizierInfo>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    ack_timeout: Duration,
    sequence_number: u64,
}

impl Heartbeater {
    /// Create a heartbeater whose sequence starts at 0.
    #[must_use]
    pub fn new(
        stream: Arc<dyn BrokerStream>,
        vizier_id: VizierId,
        vizier_info: Arc<dyn VizierInfo>,
        clock: Arc<dyn Clock>,
        config: &ConnectorConfig,
    ) -> Self {
        Self {
            stream,
            vizier_id,
            vizier_info,
            clock,
            interval: config.heartbeat_interval,
            ack_timeout: config.ack_timeout,
            sequence_number: 0,
        }
    }

    /// The sequence number the next heartbeat will carry.
    #[must_use]
    pub const fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Send heartbeats until `cancel` fires.
    ///
    /// Cancellation is checked before every send and interrupts the pause
    /// between heartbeats; an in-flight ack wait is always finished first.
    ///
    /// # Errors
    ///
    /// Returns the first heartbeat failure. All of them are fatal.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    vizier_id = %self.vizier_id,
                    next_sequence_number = self.sequence_number,
                    "Heartbeats stopped"
                );
                return Ok(());
            }

            self.handle_heartbeat().await?;

            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Send one heartbeat and wait for its ack.
    ///
    /// # Errors
    ///
    /// Returns the send error, `ConnectorError::Timeout` if no ack arrives in
    /// time, a codec error for an undecodable ack, or
    /// `ConnectorError::SequenceMismatch` for an ack of another heartbeat.
    pub async fn handle_heartbeat(&mut self) -> Result<()> {
        let address = resolve_address(self.vizier_info.as_ref()).await;

        let sent_sequence_number = self.sequence_number;
        let heartbeat = VizierHeartbeat {
            vizier_id: self.vizier_id,
            time: self.clock.now().timestamp(),
            sequence_number: sent_sequence_number,
            address,
        };

        self.stream
            .send(envelope::wrap(heartbeat, Topic::Heartbeat))
            .await?;
        self.sequence_number += 1;

        let stream = Arc::clone(&self.stream);
        do_with_timeout(
            async move {
                let resp = stream.recv().await?;
                let ack: VizierHeartbeatAck = envelope::unwrap(resp)?;
                if ack.sequence_number != sent_sequence_number {
                    return Err(ConnectorError::SequenceMismatch {
                        expected: sent_sequence_number,
                        got: ack.sequence_number,
                    });
                }
                Ok(())
            },
            self.ack_timeout,
        )
        .await?;

        tracing::trace!(
            vizier_id = %self.vizier_id,
            sequence_number = sent_sequence_number,
            "Heartbeat acknowledged"
        );
        Ok(())
    }
}
