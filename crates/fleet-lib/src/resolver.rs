//! Collaborator-facing entry point tying catalog, selection and failure
//! tracking to one shared failure cache

use crate::blocklist::{FailureCache, FailureCacheConfig};
use crate::catalog::{CatalogBuilder, CatalogConfig, CatalogSources};
use crate::clock::Clock;
use crate::error::{ConfigError, Result};
use crate::failure::{EscalationPolicy, FailureOutcome, FailureReport, FailureTracker};
use crate::instancetype::InstanceType;
use crate::models::NodeClass;
use crate::observability::StructuredLogger;
use crate::selection::{
    CandidateFilter, SchedulingRequest, Selection, SelectionEngine, DEFAULT_MAX_INSTANCE_TYPES,
};
use std::sync::Arc;

/// Tuning for every engine component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetResolverConfig {
    pub catalog: CatalogConfig,
    pub failures: FailureCacheConfig,
    pub escalation: EscalationPolicy,
    pub max_instance_types: usize,
}

impl Default for FleetResolverConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            failures: FailureCacheConfig::default(),
            escalation: EscalationPolicy::default(),
            max_instance_types: DEFAULT_MAX_INSTANCE_TYPES,
        }
    }
}

pub struct FleetResolver {
    catalog: CatalogBuilder,
    selection: SelectionEngine,
    tracker: FailureTracker,
    failures: Arc<FailureCache>,
}

impl FleetResolver {
    pub fn new(
        sources: CatalogSources,
        config: FleetResolverConfig,
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
    ) -> Result<Self, ConfigError> {
        let failures = Arc::new(FailureCache::new(
            config.failures,
            clock.clone(),
            logger.clone(),
        ));
        let selection = SelectionEngine::new(failures.clone(), sources.zones.clone(), logger.clone())
            .with_max_instance_types(config.max_instance_types);
        let tracker = FailureTracker::new(failures.clone(), config.escalation, logger.clone());
        let catalog = CatalogBuilder::new(sources, failures.clone(), clock, config.catalog, logger)?;
        Ok(Self {
            catalog,
            selection,
            tracker,
            failures,
        })
    }

    /// Swap the candidate filter hook used before ranking
    pub fn with_candidate_filter(mut self, filter: Arc<dyn CandidateFilter>) -> Self {
        self.selection = self.selection.with_filter(filter);
        self
    }

    pub fn failures(&self) -> &Arc<FailureCache> {
        &self.failures
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        self.tracker.policy()
    }

    pub async fn list_instance_types(
        &self,
        node_class: &NodeClass,
        refresh: bool,
    ) -> Result<Vec<InstanceType>> {
        self.catalog.list_instance_types(node_class, refresh).await
    }

    pub fn select_instance_type(
        &self,
        node_class: &NodeClass,
        candidates: Vec<InstanceType>,
        request: &SchedulingRequest,
    ) -> Result<Selection> {
        self.selection.select(node_class, candidates, request)
    }

    /// List, shortlist and select in one pass
    pub async fn launch(&self, node_class: &NodeClass, request: &SchedulingRequest) -> Result<Selection> {
        let catalog = self.catalog.list_instance_types(node_class, false).await?;
        let candidates = self.selection.shortlist(catalog, request)?;
        self.selection.select(node_class, candidates, request)
    }

    /// Classify a failed launch; transient shortages refresh the next catalog build
    pub fn report_failure(&self, report: &FailureReport) -> FailureOutcome {
        let outcome = self.tracker.observe(report);
        if outcome.needs_refresh() {
            self.catalog.request_refresh();
        }
        outcome
    }

    /// Drop expired failure state; returns the number of entries removed
    pub fn purge_expired(&self) -> usize {
        self.failures.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{async_trait, ClusterInfoSource, PodLimitSource, QuotaSource};
    use crate::clock::ManualClock;
    use crate::error::{CapacityShortage, FetchError, FleetError};
    use crate::failure::INVALID_CONFIGURATION;
    use crate::models::{
        CapacityType, ClusterInfo, ClusterNetwork, ItemPrice, PodLimits, RawInstanceTypeQuota,
        Subnet,
    };
    use crate::requirements::{labels, Operator, Requirement, Requirements};
    use crate::zone::ZoneTable;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StaticVendor {
        calls: AtomicUsize,
    }

    fn quota(name: &str, zone: &str, price: f64) -> RawInstanceTypeQuota {
        RawInstanceTypeQuota {
            zone: zone.into(),
            instance_family: "S5".into(),
            instance_type: name.into(),
            cpu: 4,
            memory_gb: 8,
            status: "SELL".into(),
            inventory: 10,
            price: ItemPrice { unit_price: price },
        }
    }

    #[async_trait]
    impl QuotaSource for StaticVendor {
        async fn instance_type_quotas(
            &self,
            _zones: &[String],
            capacity_type: CapacityType,
            _refresh: bool,
        ) -> std::result::Result<Vec<RawInstanceTypeQuota>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match capacity_type {
                CapacityType::OnDemand => vec![
                    quota("S5.LARGE8", "ap-guangzhou-3", 0.5),
                    quota("S5.LARGE8", "ap-guangzhou-4", 0.45),
                ],
                CapacityType::Spot => vec![quota("S5.LARGE8", "ap-guangzhou-3", 0.2)],
            })
        }
    }

    #[async_trait]
    impl PodLimitSource for StaticVendor {
        async fn pod_limits(&self, _zone: &str) -> std::result::Result<Vec<PodLimits>, FetchError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ClusterInfoSource for StaticVendor {
        async fn cluster_info(&self) -> std::result::Result<ClusterInfo, FetchError> {
            Ok(ClusterInfo {
                server_version: "1.28.3".into(),
                network: ClusterNetwork {
                    network_type: "GR".into(),
                    ..Default::default()
                },
            })
        }
    }

    fn resolver() -> (FleetResolver, Arc<StaticVendor>) {
        let vendor = Arc::new(StaticVendor::default());
        let sources = CatalogSources {
            quotas: vendor.clone(),
            pod_limits: vendor.clone(),
            cluster: vendor.clone(),
            zones: Arc::new(ZoneTable::default()),
        };
        let resolver = FleetResolver::new(
            sources,
            FleetResolverConfig::default(),
            Arc::new(ManualClock::new()),
            StructuredLogger::new("test"),
        )
        .unwrap();
        (resolver, vendor)
    }

    fn node_class() -> NodeClass {
        NodeClass {
            name: "default".into(),
            subnets: vec![
                Subnet {
                    id: "subnet-3".into(),
                    zone: "ap-guangzhou-3".into(),
                },
                Subnet {
                    id: "subnet-4".into(),
                    zone: "ap-guangzhou-4".into(),
                },
            ],
            ..Default::default()
        }
    }

    fn request(capacity_types: &[&str], cpu: &str) -> SchedulingRequest {
        SchedulingRequest {
            requirements: Requirements::new().with(Requirement::new(
                labels::CAPACITY_TYPE,
                Operator::In,
                capacity_types.iter().copied(),
            )),
            resources: BTreeMap::from([("cpu".to_string(), cpu.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_launch_prefers_cheapest_offering() {
        let (resolver, _) = resolver();
        let selection = resolver
            .launch(&node_class(), &request(&["spot", "on-demand"], "1"))
            .await
            .unwrap();
        assert_eq!(selection.instance_type.name, "S5.LARGE8");
        assert_eq!(selection.capacity_type, CapacityType::Spot);
        assert_eq!(selection.subnet_id, "subnet-3");

        let on_demand = resolver
            .launch(&node_class(), &request(&["on-demand"], "1"))
            .await
            .unwrap();
        assert_eq!(on_demand.zone, "ap-guangzhou-4");
        assert_eq!(on_demand.price, 0.45);
    }

    #[tokio::test]
    async fn test_launch_without_fitting_type() {
        let (resolver, _) = resolver();
        let err = resolver
            .launch(&node_class(), &request(&["on-demand"], "64"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::InsufficientCapacity(CapacityShortage::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn test_failure_report_steers_next_launch() {
        let (resolver, vendor) = resolver();
        let nc = node_class();
        resolver.list_instance_types(&nc, false).await.unwrap();
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 2);

        let outcome = resolver.report_failure(&FailureReport {
            instance_type: "S5.LARGE8".into(),
            capacity_type: CapacityType::Spot,
            zone: "ap-guangzhou-3".into(),
            reason: INVALID_CONFIGURATION.into(),
            message: "LimitExceeded.SpotQuota".into(),
        });
        assert!(outcome.needs_refresh());

        let selection = resolver
            .launch(&nc, &request(&["spot", "on-demand"], "1"))
            .await
            .unwrap();
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 4);
        assert_eq!(selection.capacity_type, CapacityType::Spot);

        resolver.report_failure(&FailureReport {
            instance_type: "S5.LARGE8".into(),
            capacity_type: CapacityType::Spot,
            zone: "ap-guangzhou-3".into(),
            reason: "CreateError".into(),
            message: "boom".into(),
        });
        let selection = resolver
            .launch(&nc, &request(&["spot", "on-demand"], "1"))
            .await
            .unwrap();
        assert_eq!(selection.capacity_type, CapacityType::OnDemand);
        assert_eq!(selection.zone, "ap-guangzhou-4");
    }
}
