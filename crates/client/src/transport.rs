//! gRPC transport construction.
//!
//! The [`Connect`] trait is the seam between the connection supervisor and
//! the actual transport: production code uses [`GrpcConnector`] to build a
//! tuned tonic channel, while tests substitute an in-memory transport with
//! failure injection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

use crate::connection::ServiceDescriptor;
use crate::error::Result;

/// gRPC channel configuration for connection reliability.
///
/// These settings are tuned for a client that maintains a persistent
/// connection to a service that can be rescheduled at any time, with emphasis
/// on fast failure detection: keepalive pings surface a dead peer without
/// waiting for the next request to time out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Connection timeout (how long to wait for initial connection)
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Request timeout (default timeout for individual RPC calls)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// HTTP/2 keepalive interval (how often to send keepalive pings)
    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Duration,
    /// Keepalive timeout (how long to wait for keepalive response)
    #[serde(with = "humantime_serde")]
    pub keepalive_timeout: Duration,
    /// Whether to send keepalive pings even when idle
    pub keepalive_while_idle: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(60),
            keepalive_while_idle: true,
        }
    }
}

/// Builds a transport channel for a resolved service placement.
///
/// Implementations must prove reachability: a returned channel is live at the
/// moment `connect` resolves, not merely lazily constructed.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    /// Transport handle type produced on success.
    type Channel: Clone + Send + Sync + 'static;

    /// Establish a channel to the given placement.
    async fn connect(&self, descriptor: &ServiceDescriptor) -> Result<Self::Channel>;
}

/// Production connector building tonic channels from [`ChannelConfig`].
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector {
    config: ChannelConfig,
}

impl GrpcConnector {
    /// Create a connector with the given channel tuning.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connect for GrpcConnector {
    type Channel = Channel;

    async fn connect(&self, descriptor: &ServiceDescriptor) -> Result<Channel> {
        let endpoint = Endpoint::from_shared(descriptor.endpoint_uri())?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .http2_keep_alive_interval(self.config.keepalive_interval)
            .keep_alive_timeout(self.config.keepalive_timeout)
            .keep_alive_while_idle(self.config.keepalive_while_idle)
            .tcp_nodelay(true);

        tracing::debug!(%descriptor, "Connecting gRPC channel");
        // Eager connect: construction alone does not prove reachability.
        let channel = endpoint.connect().await?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.keepalive_while_idle);
    }

    #[tokio::test]
    async fn test_connect_refused_port_fails() {
        // Bind then drop a listener so the port is known to refuse connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = GrpcConnector::new(ChannelConfig {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        });
        let descriptor = ServiceDescriptor {
            name: "InventoryManagementSystem".to_string(),
            host: "127.0.0.1".to_string(),
            port,
        };

        let result = connector.connect(&descriptor).await;
        assert!(result.is_err(), "Should fail to connect to closed port");
    }
}
