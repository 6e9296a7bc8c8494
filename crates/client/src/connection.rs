//! Service descriptors and registry URL normalization.
//!
//! This module provides the types describing *where* things are on the
//! network:
//! - [`ServiceDescriptor`]: the current placement of a named service, as
//!   reported by the directory
//! - [`normalize_registry_url`]: tolerant parsing of the directory address
//!
//! # URL Normalization
//!
//! The [`normalize_registry_url`] function handles common input formats:
//! - Bare host:port (e.g., `10.0.0.5:2379` → `http://10.0.0.5:2379`)
//! - Missing port (e.g., `http://localhost` → `http://localhost:2379`)
//! - IPv6 addresses (e.g., `[::1]:2379` → `http://[::1]:2379`)

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Default port for the name directory (etcd's well-known client port).
pub const DEFAULT_REGISTRY_PORT: u16 = 2379;

/// Default directory address when no configuration is provided.
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:2379";

/// Current network placement of a named service.
///
/// Produced by the resolver for each successful lookup, consumed by the
/// connection supervisor, and discarded once a connection attempt using it
/// either succeeds or is superseded by a newer lookup. It has no identity
/// beyond its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name the descriptor was resolved for.
    pub name: String,
    /// Host or IP address the service is currently reachable at.
    pub host: String,
    /// Port the service is currently listening on.
    pub port: u16,
}

impl ServiceDescriptor {
    /// Returns the gRPC endpoint URI for this placement.
    ///
    /// IPv6 hosts are bracketed so the result is always a valid authority.
    #[must_use]
    pub fn endpoint_uri(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

/// Registry URL validation error with user-friendly messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input was empty or whitespace-only
    EmptyInput,
    /// URL parsing failed
    InvalidUrl(String),
    /// No host was found in the URL
    MissingHost,
    /// Port could not be set (should not happen with valid hosts)
    InvalidPort(String),
    /// Unsupported URL scheme (only http/https allowed)
    UnsupportedScheme(String),
}

impl std::error::Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "Registry address cannot be empty"),
            Self::InvalidUrl(e) => write!(f, "Invalid URL: {e}"),
            Self::MissingHost => write!(f, "URL must include a host"),
            Self::InvalidPort(e) => write!(f, "Invalid port: {e}"),
            Self::UnsupportedScheme(s) => write!(f, "Unsupported scheme '{s}' (use http or https)"),
        }
    }
}

/// Normalize a registry URL string.
///
/// - Adds `http://` scheme if missing
/// - Adds the default port (2379) if missing
/// - Trims whitespace
/// - Rejects non-http(s) schemes
pub fn normalize_registry_url(input: &str) -> Result<Url, AddressError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(AddressError::EmptyInput);
    }

    // Add scheme if missing
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| AddressError::InvalidUrl(e.to_string()))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AddressError::UnsupportedScheme(scheme));
    }

    if url.host().is_none() {
        return Err(AddressError::MissingHost);
    }

    if url.port().is_none() {
        url.set_port(Some(DEFAULT_REGISTRY_PORT))
            .map_err(|()| AddressError::InvalidPort("Cannot set port on this URL".to_string()))?;
    }

    Ok(url)
}
