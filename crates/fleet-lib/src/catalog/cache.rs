//! Short-lived cache of vendor survey results

use crate::clock::Clock;
use crate::models::{CapacityType, ClusterInfo, RawInstanceTypeQuota, ZonePodLimits};
use crate::ttl::TtlCache;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of cached survey results
pub const DEFAULT_SURVEY_TTL: Duration = Duration::from_secs(10 * 60);

/// Zone sets are kept sorted so equal sets produce equal keys
type ZoneSet = Vec<String>;

/// Survey results keyed by charge mode and subnet-zone set
#[derive(Debug)]
pub struct SurveyCache {
    quotas: TtlCache<(CapacityType, ZoneSet), Arc<Vec<RawInstanceTypeQuota>>>,
    pod_limits: TtlCache<ZoneSet, Arc<ZonePodLimits>>,
    cluster: TtlCache<(), Arc<ClusterInfo>>,
}

impl SurveyCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            quotas: TtlCache::new(ttl, clock.clone()),
            pod_limits: TtlCache::new(ttl, clock.clone()),
            cluster: TtlCache::new(ttl, clock),
        }
    }

    pub fn quotas(
        &self,
        capacity_type: CapacityType,
        zones: &[String],
    ) -> Option<Arc<Vec<RawInstanceTypeQuota>>> {
        self.quotas.get(&(capacity_type, zones.to_vec()))
    }

    pub fn put_quotas(
        &self,
        capacity_type: CapacityType,
        zones: &[String],
        records: Arc<Vec<RawInstanceTypeQuota>>,
    ) {
        self.quotas.insert((capacity_type, zones.to_vec()), records);
    }

    pub fn pod_limits(&self, zones: &[String]) -> Option<Arc<ZonePodLimits>> {
        self.pod_limits.get(&zones.to_vec())
    }

    pub fn put_pod_limits(&self, zones: &[String], limits: Arc<ZonePodLimits>) {
        self.pod_limits.insert(zones.to_vec(), limits);
    }

    pub fn cluster_info(&self) -> Option<Arc<ClusterInfo>> {
        self.cluster.get(&())
    }

    pub fn put_cluster_info(&self, info: Arc<ClusterInfo>) {
        self.cluster.insert((), info);
    }

    /// Drop every cached survey
    pub fn flush(&self) {
        self.quotas.clear();
        self.pod_limits.clear();
        self.cluster.clear();
    }
}
