//! Protocol buffer definitions for the inventory service.
//!
//! This crate contains:
//! - Message and service bindings for `proto/inventory.proto`
//! - Conversion helpers between wire strings and domain types
//!
//! # Bindings
//!
//! The bindings in [`inventory`] are vendored tonic-build output rather than
//! generated at build time, so building the workspace does not require
//! `protoc`. `proto/inventory.proto` is the authoritative schema; regenerate
//! and re-vendor the module when it changes.

pub mod convert;

/// Inventory service protocol buffer types and client/server bindings.
pub mod inventory;

// Re-export commonly used types at crate root
pub use inventory::*;
