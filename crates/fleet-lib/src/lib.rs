//! Instance fleet resolution engine
//!
//! This crate provides the core functionality for:
//! - Building the schedulable instance type catalog from vendor quota surveys
//! - Capacity and overhead calculation (kube-reserved, system-reserved, eviction)
//! - Picking a launch target for a scheduling request
//! - Failure tracking and a time-windowed offering blocklist
//! - Health checks and observability

pub mod blocklist;
pub mod capacity;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod failure;
pub mod health;
pub mod instancetype;
pub mod models;
pub mod observability;
pub mod offering;
pub mod quantity;
pub mod requirements;
pub mod resolver;
pub mod selection;
pub mod tiered;
pub mod ttl;
pub mod zone;

pub use blocklist::{BlockEntry, FailureCache, FailureCacheConfig, FailureKey, Scope};
pub use catalog::{CatalogBuilder, CatalogConfig, CatalogSources};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CapacityShortage, ConfigError, FetchError, FleetError, Result};
pub use failure::{EscalationPolicy, FailureOutcome, FailureReport, FailureTracker};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use instancetype::InstanceType;
pub use models::*;
pub use observability::{FleetMetrics, StructuredLogger};
pub use offering::{Offering, Offerings};
pub use requirements::{Operator, Requirement, Requirements};
pub use resolver::{FleetResolver, FleetResolverConfig};
pub use selection::{CandidateFilter, SchedulingRequest, Selection, SelectionEngine};
pub use zone::{ZoneResolver, ZoneTable};
