//! Client error types.

use thiserror::Error;

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the inventory client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The name directory could not be contacted at all.
    #[error("Directory unreachable at {url}: {source}")]
    DirectoryUnreachable {
        /// Directory address that was queried.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The directory responded but holds no registration for the service.
    #[error("Service '{0}' not found in directory")]
    ServiceNotFound(String),

    /// The directory responded with a registration that cannot be parsed.
    #[error("Invalid registration for service '{name}': {reason}")]
    InvalidRegistration {
        /// Service whose registration was malformed.
        name: String,
        /// What was wrong with the record.
        reason: String,
    },

    /// The supervisor was shut down; no further connections will be made.
    #[error("Connection supervisor is shut down")]
    SupervisorClosed,

    /// gRPC transport error (connection failed, TLS error, etc.).
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status error (server returned an error).
    #[error("gRPC status error: {0}")]
    RpcStatus(#[from] tonic::Status),

    /// The counter file could not be opened, locked, read, or written.
    #[error("Counter I/O error on {path}: {source}")]
    CounterIo {
        /// Counter file path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The counter file content is not a decimal integer.
    #[error("Counter file {path} is corrupt: {content:?}")]
    CounterCorrupt {
        /// Counter file path.
        path: std::path::PathBuf,
        /// Offending content (truncated).
        content: String,
    },

    /// Another execution context holds the counter file lock.
    #[error("Counter file {0} is locked by another process")]
    CounterBusy(std::path::PathBuf),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
