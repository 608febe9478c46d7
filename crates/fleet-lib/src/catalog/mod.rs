//! Instance type catalog assembly
//!
//! The catalog builder pulls quota surveys, ENI limit tables and cluster
//! metadata from vendor-facing sources, consults the failure cache, and emits
//! the full set of schedulable instance types for a node class.

mod builder;
mod cache;


pub use builder::{CatalogBuilder, CatalogConfig, CatalogSources};
pub use cache::{SurveyCache, DEFAULT_SURVEY_TTL};

use crate::error::FetchError;
use crate::models::{CapacityType, ClusterInfo, PodLimits, RawInstanceTypeQuota};

pub use async_trait::async_trait;

/// Vendor quota survey for a set of zones under one charge mode
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// List quota records for `zones`; `refresh` asks the vendor to bypass its own cache
    async fn instance_type_quotas(
        &self,
        zones: &[String],
        capacity_type: CapacityType,
        refresh: bool,
    ) -> Result<Vec<RawInstanceTypeQuota>, FetchError>;
}

/// Per-zone ENI/pod limit lookup
#[async_trait]
pub trait PodLimitSource: Send + Sync {
    /// ENI limits for every instance type in `zone`; empty when the zone has no data
    async fn pod_limits(&self, zone: &str) -> Result<Vec<PodLimits>, FetchError>;
}

/// Cluster metadata lookup
#[async_trait]
pub trait ClusterInfoSource: Send + Sync {
    async fn cluster_info(&self) -> Result<ClusterInfo, FetchError>;
}
