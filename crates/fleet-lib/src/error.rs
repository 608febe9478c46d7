//! Error types for the fleet resolution engine
//!
//! Callers need to tell three situations apart:
//! - misconfiguration (fatal for the current computation, never retried here)
//! - vendor fetch failures (the calling controller applies its own backoff)
//! - capacity shortages (nothing can be launched right now)

use std::time::Duration;
use thiserror::Error;

/// Top-level error returned by catalog and selection operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("vendor fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(#[from] CapacityShortage),
}

impl FleetError {
    /// True when the error means "nothing to launch now" rather than a malfunction
    pub fn is_insufficient_capacity(&self) -> bool {
        matches!(self, FleetError::InsufficientCapacity(_))
    }

    /// True when retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FleetError::Config(_) => false,
            FleetError::Fetch(e) => !matches!(e, FetchError::Decode { .. }),
            FleetError::InsufficientCapacity(_) => true,
        }
    }

    /// Short machine-readable code used by the HTTP layer and metrics
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::Config(_) => "configuration",
            FleetError::Fetch(_) => "vendor_fetch",
            FleetError::InsufficientCapacity(shortage) => shortage.reason(),
        }
    }
}

/// Malformed overrides or cluster settings
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("expected percentage value for {signal} to be a float but got {value:?}")]
    InvalidPercentage { signal: String, value: String },

    #[error("invalid quantity {value:?} for resource {resource}")]
    InvalidQuantity { resource: String, value: String },

    #[error("unable to parse kubernetes version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("vm memory overhead fraction {0} must be within [0.0, 1.0]")]
    InvalidOverheadFraction(f64),

    #[error("no subnets found for node class {0}")]
    NoSubnets(String),
}

/// Failures talking to (or decoding data from) the cloud vendor
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("{operation} failed: {message}")]
    Request { operation: String, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("unable to decode {operation} response: {message}")]
    Decode { operation: String, message: String },
}

impl FetchError {
    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn decode(operation: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Decode {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Reasons a launch cannot be satisfied right now
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityShortage {
    #[error("all requested instance types were unavailable during launch")]
    NoCandidates,

    #[error("instance type {0} has no compatible offering")]
    NoCompatibleOffering(String),

    #[error("subnet for {0} not found")]
    NoSubnet(String),

    #[error("unable to resolve zone for id {0:?}")]
    UnknownZone(String),
}

impl CapacityShortage {
    pub fn reason(&self) -> &'static str {
        match self {
            CapacityShortage::NoCandidates => "no_candidates",
            CapacityShortage::NoCompatibleOffering(_) => "no_compatible_offering",
            CapacityShortage::NoSubnet(_) => "no_subnet",
            CapacityShortage::UnknownZone(_) => "unknown_zone",
        }
    }
}

pub type Result<T, E = FleetError> = std::result::Result<T, E>;
