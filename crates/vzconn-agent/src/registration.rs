//! Registration handshake.
//!
//! The Vizier announces itself once, then listens for the broker's ack up to
//! `register_attempts` times. A retry only re-listens: the request is never
//! sent again, so a request lost on the wire exhausts the budget.

use std::sync::Arc;

use vzconn_core::envelope::{self, Topic};
use vzconn_core::{RegisterVizierAck, RegisterVizierRequest, RegistrationStatus};

use crate::error::{ConnectorError, Result};
use crate::stream::BrokerStream;
use crate::timeout::do_with_timeout;
use crate::types::{ConnectorConfig, VizierIdentity};
use crate::vizier_info::{resolve_address, VizierInfo};

/// Register the Vizier with the broker and wait for a positive ack.
///
/// # Errors
///
/// Returns the send error if the request cannot be sent, or
/// `ConnectorError::RegistrationExhausted` carrying the last attempt's error.
pub async fn register_vizier(
    stream: &Arc<dyn BrokerStream>,
    identity: &VizierIdentity,
    vizier_info: &dyn VizierInfo,
    config: &ConnectorConfig,
) -> Result<()> {
    let address = resolve_address(vizier_info).await;

    let request = RegisterVizierRequest {
        vizier_id: identity.vizier_id,
        jwt_key: identity.jwt_signing_key.clone(),
        address,
    };
    stream
        .send(envelope::wrap(request, Topic::Register))
        .await?;
    tracing::debug!(vizier_id = %identity.vizier_id, "Sent registration request");

    let mut last_err = None;
    for attempt in 1..=config.register_attempts {
        let stream = Arc::clone(stream);
        match do_with_timeout(await_register_ack(stream), config.ack_timeout).await {
            Ok(()) => {
                tracing::info!(
                    vizier_id = %identity.vizier_id,
                    attempt,
                    "Vizier registered"
                );
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    vizier_id = %identity.vizier_id,
                    attempt,
                    max_attempts = config.register_attempts,
                    error = %e,
                    "Registration ack not received"
                );
                last_err = Some(e);
            }
        }
    }

    Err(ConnectorError::RegistrationExhausted {
        attempts: config.register_attempts,
        last: Box::new(last_err.unwrap_or_else(|| {
            ConnectorError::Config("register_attempts must be at least 1".to_string())
        })),
    })
}

async fn await_register_ack(stream: Arc<dyn BrokerStream>) -> Result<()> {
    let resp = stream.recv().await?;
    let ack: RegisterVizierAck = envelope::unwrap(resp)?;
    if ack.status == RegistrationStatus::Ok {
        Ok(())
    } else {
        Err(ConnectorError::RegistrationRejected(ack.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pair;
    use crate::vizier_info::StaticVizierInfo;
    use std::time::Duration;
    use vzconn_core::{Payload, VizierHeartbeatAck, VizierId};

    fn identity() -> VizierIdentity {
        VizierIdentity::new(
            "11111111-1111-1111-1111-111111111111".parse::<VizierId>().unwrap(),
            "signing-key",
        )
    }

    fn ack(status: RegistrationStatus) -> RegisterVizierAck {
        RegisterVizierAck { status }
    }

    #[tokio::test(start_paused = true)]
    async fn ok_on_first_attempt() {
        let (stream, mut broker) = memory_pair();
        broker.reply(ack(RegistrationStatus::Ok), Topic::Register);

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::new("34.1.2.3"),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 1);

        let sent = broker.try_next_sent().unwrap();
        assert_eq!(sent.topic, Topic::Register);
        let Payload::RegisterVizierRequest(req) = sent.payload else {
            panic!("expected a registration request");
        };
        assert_eq!(req.vizier_id, identity().vizier_id);
        assert_eq!(req.jwt_key, "signing-key");
        assert_eq!(req.address, "34.1.2.3");
    }

    #[tokio::test(start_paused = true)]
    async fn address_failure_sends_empty_address() {
        let (stream, mut broker) = memory_pair();
        broker.reply(ack(RegistrationStatus::Ok), Topic::Register);

        let dyn_stream: Arc<dyn BrokerStream> = stream;
        register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap();

        let sent = broker.try_next_sent().unwrap();
        let req: RegisterVizierRequest = envelope::unwrap(sent).unwrap();
        assert_eq!(req.address, "");
    }

    #[tokio::test(start_paused = true)]
    async fn non_ok_then_ok_uses_two_attempts_and_one_send() {
        let (stream, _broker) = {
            let (stream, broker) = memory_pair();
            broker.reply(ack(RegistrationStatus::Failed), Topic::Register);
            broker.reply(ack(RegistrationStatus::Ok), Topic::Register);
            (stream, broker)
        };

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_message_type_consumes_an_attempt() {
        let (stream, broker) = memory_pair();
        broker.reply(VizierHeartbeatAck { sequence_number: 0 }, Topic::Heartbeat);
        broker.reply(ack(RegistrationStatus::Ok), Topic::Register);

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(stream.recv_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_rejections() {
        let (stream, broker) = memory_pair();
        for _ in 0..6 {
            broker.reply(ack(RegistrationStatus::NotFound), Topic::Register);
        }

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        let err = register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap_err();

        match err {
            ConnectorError::RegistrationExhausted { attempts, last } => {
                assert_eq!(attempts, 5);
                assert!(matches!(
                    *last,
                    ConnectorError::RegistrationRejected(RegistrationStatus::NotFound)
                ));
            }
            other => panic!("expected RegistrationExhausted, got {other:?}"),
        }
        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_broker_times_out_every_attempt() {
        let (stream, _broker) = memory_pair();

        let started = tokio::time::Instant::now();
        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        let err = register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap_err();

        let ConnectorError::RegistrationExhausted { attempts, last } = err else {
            panic!("expected RegistrationExhausted");
        };
        assert_eq!(attempts, 5);
        assert!(matches!(*last, ConnectorError::Timeout(d) if d == Duration::from_secs(2)));
        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 5);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn late_ack_is_consumed_by_the_abandoned_receive() {
        let (stream, broker) = memory_pair();
        // Arrives after the first attempt timed out but while its receive is
        // still pending.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            broker.reply(ack(RegistrationStatus::Ok), Topic::Register);
            std::future::pending::<()>().await;
        });

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        let err = register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap_err();

        let ConnectorError::RegistrationExhausted { attempts, last } = err else {
            panic!("expected RegistrationExhausted");
        };
        assert_eq!(attempts, 5);
        assert!(matches!(*last, ConnectorError::Timeout(d) if d == Duration::from_secs(2)));
        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_is_returned_without_waiting() {
        let (stream, _broker) = memory_pair();
        stream.fail_sends();

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        let err = register_vizier(
            &dyn_stream,
            &identity(),
            &StaticVizierInfo::unavailable(),
            &ConnectorConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::Send(_)));
        assert_eq!(stream.recv_count(), 0);
    }
}
