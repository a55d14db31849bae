//! Hand-off of TLS material to the cert manager.
//!
//! The broker issues the Vizier's key and certificate over the stream; the
//! cert manager is the component that actually installs them. This module
//! provides the `CertApplier` seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// Applies TLS key/cert material.
#[async_trait]
pub trait CertApplier: Send + Sync {
    /// Install `key` and `cert`.
    ///
    /// Returns `Ok(false)` when the cert manager processed the request but did
    /// not apply the material.
    ///
    /// # Errors
    ///
    /// Returns an error if the cert manager cannot be reached or fails the request.
    async fn update_certs(&self, key: &[u8], cert: &[u8]) -> Result<bool>;
}

/// HTTP client for the cert manager service.
#[derive(Debug, Clone)]
pub struct HttpCertApplier {
    client: reqwest::Client,
    base_url: String,
}

/// Request body for a cert update. Key and cert are base64 encoded.
#[derive(Debug, Serialize)]
struct UpdateCertsRequest {
    key: String,
    cert: String,
}

#[derive(Debug, Deserialize)]
struct UpdateCertsResponse {
    ok: bool,
}

/// Error response from the cert manager.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpCertApplier {
    /// Create a new cert manager client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the cert manager (e.g., "http://vizier-certmgr:50900")
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Config` if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ConnectorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new cert manager client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the cert manager.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CertApplier for HttpCertApplier {
    async fn update_certs(&self, key: &[u8], cert: &[u8]) -> Result<bool> {
        let url = format!("{}/v1/certs", self.base_url);
        let request = UpdateCertsRequest {
            key: BASE64.encode(key),
            cert: BASE64.encode(cert),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectorError::CertManager(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<UpdateCertsResponse>()
                .await
                .map_err(|e| ConnectorError::CertManager(format!("invalid response: {e}")))?;
            tracing::debug!(ok = body.ok, "Cert manager processed cert update");
            Ok(body.ok)
        } else {
            let error = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("cert manager returned status {status}"));

            tracing::error!(status = %status, error = %error, "Failed to update certs");
            Err(ConnectorError::CertManager(error))
        }
    }
}
