//! gRPC client library for the inventory management service.
//!
//! This crate provides a high-level client that discovers the inventory
//! service through an etcd-style name directory, supervises the connection
//! across service restarts and rescheduling, and mints crash-safe order
//! identifiers from a durable on-disk counter. It is UI-agnostic and can be
//! used by CLI tools, test harnesses, and alternative frontends.

pub mod client;
pub mod config;
pub mod connection;
pub mod counter;
pub mod error;
pub mod resolver;
pub mod supervisor;
pub mod transport;

pub use client::{InventoryClient, OrderConfirmation};
pub use config::{ClientConfig, CONFIG_FILE, DEFAULT_SERVICE_NAME};
pub use connection::{
    normalize_registry_url, AddressError, ServiceDescriptor, DEFAULT_REGISTRY_PORT,
    DEFAULT_REGISTRY_URL,
};
pub use counter::DurableCounter;
pub use error::{ClientError, Result};
pub use resolver::{RegistryResolver, Resolve};
pub use supervisor::{ConnectionState, ConnectionSupervisor, ReadyHandle};
pub use transport::{ChannelConfig, Connect, GrpcConnector};
