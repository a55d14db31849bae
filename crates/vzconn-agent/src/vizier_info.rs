//! Lookup of the Vizier's externally reachable address.
//!
//! The address rides along on registration and on every heartbeat, but it is
//! best-effort: a failed lookup is logged and replaced by an empty string.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::Client;

use crate::error::{ConnectorError, Result};

/// Fetches information about the running Vizier.
#[async_trait]
pub trait VizierInfo: Send + Sync {
    /// Return the externally reachable address of the Vizier proxy.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::AddressLookup` if the address is not known.
    async fn get_address(&self) -> Result<String>;
}

/// Resolve the proxy address, falling back to an empty string on failure.
pub async fn resolve_address(vizier_info: &dyn VizierInfo) -> String {
    match vizier_info.get_address().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::info!(error = %e, "Unable to get vizier proxy address");
            String::new()
        }
    }
}

/// A fixed, configured address.
#[derive(Debug, Clone, Default)]
pub struct StaticVizierInfo {
    address: Option<String>,
}

impl StaticVizierInfo {
    /// Always report `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
        }
    }

    /// Never know the address.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { address: None }
    }
}

#[async_trait]
impl VizierInfo for StaticVizierInfo {
    async fn get_address(&self) -> Result<String> {
        self.address
            .clone()
            .ok_or_else(|| ConnectorError::AddressLookup("no address configured".to_string()))
    }
}

/// Reads the proxy address from the load balancer status of a Kubernetes
/// `Service`.
pub struct KubeVizierInfo {
    client: Client,
    namespace: String,
    service_name: String,
}

impl KubeVizierInfo {
    /// Create a lookup for `service_name` in `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            service_name: service_name.into(),
        }
    }

    /// Connect with in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Config` if no Kubernetes client can be built.
    pub async fn try_default(
        namespace: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ConnectorError::Config(format!("failed to create kube client: {e}")))?;
        Ok(Self::new(client, namespace, service_name))
    }
}

#[async_trait]
impl VizierInfo for KubeVizierInfo {
    async fn get_address(&self) -> Result<String> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let service = services
            .get(&self.service_name)
            .await
            .map_err(|e| ConnectorError::AddressLookup(e.to_string()))?;

        address_from_service(&service).ok_or_else(|| {
            ConnectorError::AddressLookup(format!(
                "service {}/{} has no load balancer ingress",
                self.namespace, self.service_name
            ))
        })
    }
}

/// Extract the first load balancer ingress address (IP preferred over hostname).
fn address_from_service(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|ingress| {
            ingress
                .ip
                .clone()
                .filter(|ip| !ip.is_empty())
                .or_else(|| ingress.hostname.clone().filter(|h| !h.is_empty()))
        })
}
