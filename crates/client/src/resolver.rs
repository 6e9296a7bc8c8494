//! One-shot service lookups against the name directory.
//!
//! The directory is the single source of truth for current service placement,
//! so [`RegistryResolver`] performs no caching: every call is a fresh lookup.
//! Staleness here would defeat discovery-based failover.
//!
//! # Wire format
//!
//! The registry is an etcd-style key-value store. A lookup is
//! `GET {registry}/v2/keys/{service}`; a successful response carries a node
//! whose value is a JSON registration record:
//!
//! ```json
//! {"node": {"value": "{\"ip\": \"10.0.0.5\", \"port\": 9090}"}}
//! ```
//!
//! The port is accepted as a number or a string, matching the loosely typed
//! records services register themselves with.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::connection::ServiceDescriptor;
use crate::error::{ClientError, Result};

/// Per-lookup request timeout; resolver failures are retried by the
/// supervisor, so individual lookups fail fast.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot directory lookup.
///
/// Stateless per call: implementations must not cache placements.
#[async_trait]
pub trait Resolve: Send + Sync + 'static {
    /// Look up the current placement of `service_name`.
    ///
    /// Fails with [`ClientError::DirectoryUnreachable`] when the directory
    /// cannot be contacted and [`ClientError::ServiceNotFound`] when it
    /// responds but holds no registration.
    async fn resolve(&self, service_name: &str) -> Result<ServiceDescriptor>;
}

/// Resolver backed by an etcd-style HTTP registry.
#[derive(Debug, Clone)]
pub struct RegistryResolver {
    http: reqwest::Client,
    base: Url,
}

#[derive(Deserialize)]
struct KeysResponse {
    node: KeysNode,
}

#[derive(Deserialize)]
struct KeysNode {
    value: String,
}

#[derive(Deserialize)]
struct Registration {
    ip: String,
    port: PortValue,
}

/// Services register ports as numbers or strings; tolerate both.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl RegistryResolver {
    /// Create a resolver for the given (already normalized) registry URL.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn lookup_url(&self, service_name: &str) -> Result<Url> {
        let mut url = self.base.clone();
        // The name becomes a single path segment; characters like '/', '?'
        // or spaces in it must not restructure the URL.
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidConfig(format!("Registry URL {} cannot be a base", self.base))
            })?
            .pop_if_empty()
            .extend(["v2", "keys", service_name]);
        Ok(url)
    }

    fn parse_registration(service_name: &str, value: &str) -> Result<ServiceDescriptor> {
        let invalid = |reason: String| ClientError::InvalidRegistration {
            name: service_name.to_string(),
            reason,
        };

        let record: Registration =
            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?;

        let port = match record.port {
            PortValue::Number(port) => port,
            PortValue::Text(text) => text
                .trim()
                .parse::<u16>()
                .map_err(|e| invalid(format!("port {text:?}: {e}")))?,
        };

        if record.ip.trim().is_empty() {
            return Err(invalid("empty ip field".to_string()));
        }

        Ok(ServiceDescriptor {
            name: service_name.to_string(),
            host: record.ip,
            port,
        })
    }
}

#[async_trait]
impl Resolve for RegistryResolver {
    async fn resolve(&self, service_name: &str) -> Result<ServiceDescriptor> {
        let url = self.lookup_url(service_name)?;
        tracing::debug!(%url, "Looking up service placement");

        let response = self
            .http
            .get(url.clone())
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::DirectoryUnreachable {
                url: url.to_string(),
                source: e,
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::ServiceNotFound(service_name.to_string()));
        }

        let response =
            response
                .error_for_status()
                .map_err(|e| ClientError::DirectoryUnreachable {
                    url: url.to_string(),
                    source: e,
                })?;

        let keys: KeysResponse =
            response
                .json()
                .await
                .map_err(|e| ClientError::InvalidRegistration {
                    name: service_name.to_string(),
                    reason: e.to_string(),
                })?;

        let descriptor = Self::parse_registration(service_name, &keys.node.value)?;
        tracing::debug!(%descriptor, "Resolved service placement");
        Ok(descriptor)
    }
}
