//! Startup configuration for the inventory client.
//!
//! Configuration is loaded from:
//! 1. `inventory-client.toml` (base configuration)
//! 2. Environment variables (prefixed with `INVENTORY_`)
//!
//! All fields have defaults, so an empty configuration is valid and points
//! the client at a local registry. There is no runtime reconfiguration; the
//! configuration is read once at startup.
//!
//! # Example
//! ```no_run
//! use inventory_client::config::ClientConfig;
//!
//! let config = ClientConfig::load()?;
//! println!("Looking up '{}' via {}", config.service_name, config.registry_url);
//! # Ok::<(), figment::Error>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::connection::{normalize_registry_url, DEFAULT_REGISTRY_URL};
use crate::error::{ClientError, Result};
use crate::transport::ChannelConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "inventory-client.toml";

/// Service name the inventory server registers itself under.
pub const DEFAULT_SERVICE_NAME: &str = "InventoryManagementSystem";

/// Client configuration, supplied once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name directory address (normalized on use; default port 2379).
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Service name to resolve in the directory.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Fixed delay between discovery retries while the connection is degraded.
    #[serde(default = "default_reconnect_backoff", with = "humantime_serde")]
    pub reconnect_backoff: Duration,

    /// Path of the durable order-id counter file.
    #[serde(default = "default_counter_path")]
    pub counter_path: PathBuf,

    /// gRPC channel tuning.
    #[serde(default)]
    pub channel: ChannelConfig,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_counter_path() -> PathBuf {
    PathBuf::from("order-id.counter")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            service_name: default_service_name(),
            reconnect_backoff: default_reconnect_backoff(),
            counter_path: default_counter_path(),
            channel: ChannelConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `inventory-client.toml` and `INVENTORY_`-prefixed
    /// environment variables.
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific TOML file, merged with environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("INVENTORY_"))
            .extract()
    }

    /// Validate the configuration and return the normalized registry URL.
    pub fn validated_registry_url(&self) -> Result<Url> {
        if self.service_name.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "service_name cannot be empty".to_string(),
            ));
        }
        normalize_registry_url(&self.registry_url)
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))
    }
}
