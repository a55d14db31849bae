//! TLS credential provisioning over the broker stream.

use std::sync::Arc;

use vzconn_core::envelope::{self, Topic};
use vzconn_core::{VizierSslCertRequest, VizierSslCertResponse};

use crate::certs::CertApplier;
use crate::error::{ConnectorError, Result};
use crate::stream::BrokerStream;
use crate::types::VizierIdentity;

/// Request SSL certs from the broker and hand them to the cert manager.
///
/// The response is awaited with a single, unbounded receive.
///
/// # Errors
///
/// Returns an error if the exchange with the broker fails, if the cert manager
/// cannot be reached, or `ConnectorError::CertUpdateRejected` if it reports
/// that the update did not apply.
pub async fn request_and_handle_ssl_certs(
    stream: &Arc<dyn BrokerStream>,
    identity: &VizierIdentity,
    cert_applier: &dyn CertApplier,
) -> Result<()> {
    let request = VizierSslCertRequest {
        vizier_id: identity.vizier_id,
    };
    stream.send(envelope::wrap(request, Topic::Ssl)).await?;

    let resp = stream.recv().await?;
    let certs: VizierSslCertResponse = envelope::unwrap(resp)?;
    tracing::debug!(
        vizier_id = %identity.vizier_id,
        key_bytes = certs.key.len(),
        cert_bytes = certs.cert.len(),
        "Received SSL certs"
    );

    if !cert_applier.update_certs(&certs.key, &certs.cert).await? {
        return Err(ConnectorError::CertUpdateRejected);
    }

    tracing::info!(vizier_id = %identity.vizier_id, "SSL certs applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_pair, RecordingCertApplier};
    use vzconn_core::{Payload, RegisterVizierAck, RegistrationStatus, VizierId};

    fn identity() -> VizierIdentity {
        VizierIdentity::new(VizierId::generate(), "signing-key")
    }

    fn certs() -> VizierSslCertResponse {
        VizierSslCertResponse {
            key: b"key-pem".to_vec(),
            cert: b"cert-pem".to_vec(),
        }
    }

    #[tokio::test]
    async fn certs_forwarded_to_applier() {
        let (stream, mut broker) = memory_pair();
        broker.reply(certs(), Topic::Ssl);
        let applier = RecordingCertApplier::new(true);
        let identity = identity();

        let dyn_stream: Arc<dyn BrokerStream> = stream.clone();
        request_and_handle_ssl_certs(&dyn_stream, &identity, &applier)
            .await
            .unwrap();

        assert_eq!(
            applier.calls(),
            vec![(b"key-pem".to_vec(), b"cert-pem".to_vec())]
        );
        let sent = broker.try_next_sent().unwrap();
        assert_eq!(sent.topic, Topic::Ssl);
        assert_eq!(
            sent.payload,
            Payload::VizierSslCertRequest(VizierSslCertRequest {
                vizier_id: identity.vizier_id
            })
        );
        assert_eq!(stream.send_count(), 1);
        assert_eq!(stream.recv_count(), 1);
    }

    #[tokio::test]
    async fn applier_not_ok_is_an_error() {
        let (stream, broker) = memory_pair();
        broker.reply(certs(), Topic::Ssl);
        let applier = RecordingCertApplier::new(false);

        let dyn_stream: Arc<dyn BrokerStream> = stream;
        let err = request_and_handle_ssl_certs(&dyn_stream, &identity(), &applier)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::CertUpdateRejected));
        assert_eq!(applier.calls().len(), 1);
    }

    #[tokio::test]
    async fn unexpected_response_type_is_an_error() {
        let (stream, broker) = memory_pair();
        broker.reply(
            RegisterVizierAck {
                status: RegistrationStatus::Ok,
            },
            Topic::Register,
        );
        let applier = RecordingCertApplier::new(true);

        let dyn_stream: Arc<dyn BrokerStream> = stream;
        let err = request_and_handle_ssl_certs(&dyn_stream, &identity(), &applier)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Codec(_)));
        assert!(applier.calls().is_empty());
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let (stream, broker) = memory_pair();
        drop(broker);
        let applier = RecordingCertApplier::new(true);

        let dyn_stream: Arc<dyn BrokerStream> = stream;
        let err = request_and_handle_ssl_certs(&dyn_stream, &identity(), &applier)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::StreamClosed));
    }
}
