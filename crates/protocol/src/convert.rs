//! Conversion helpers between wire strings and domain types.
//!
//! The `operation_type` field on [`InventoryOperationRequest`] is a plain
//! string on the wire; [`OperationType`] gives callers a typed view of it.
//!
//! [`InventoryOperationRequest`]: crate::inventory::InventoryOperationRequest

use std::fmt;
use std::str::FromStr;

/// Kind of inventory operation carried by an `InventoryOperationRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Add stock for an existing item.
    Update,
    /// Place an order against an item.
    Order,
}

impl OperationType {
    /// Wire representation of the operation type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Order => "ORDER",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = UnknownOperationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPDATE" => Ok(Self::Update),
            "ORDER" => Ok(Self::Order),
            other => Err(UnknownOperationType(other.to_string())),
        }
    }
}

/// Error returned when a wire string is not a known operation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperationType(pub String);

impl fmt::Display for UnknownOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation type '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperationType {}
