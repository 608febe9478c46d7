//! Per-cycle catalog assembly

use super::cache::{SurveyCache, DEFAULT_SURVEY_TTL};
use super::{ClusterInfoSource, PodLimitSource, QuotaSource};
use crate::blocklist::FailureCache;
use crate::capacity::CapacityCalculator;
use crate::clock::Clock;
use crate::error::{ConfigError, FetchError, Result};
use crate::instancetype::{InstanceType, InstanceTypeContext};
use crate::models::{CapacityType, ClusterInfo, NodeClass, RawInstanceTypeQuota, ZonePodLimits};
use crate::observability::{FleetMetrics, StructuredLogger};
use crate::offering::{Offering, Offerings};
use crate::zone::ZoneResolver;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Vendor-facing collaborators of the catalog builder
#[derive(Clone)]
pub struct CatalogSources {
    pub quotas: Arc<dyn QuotaSource>,
    pub pod_limits: Arc<dyn PodLimitSource>,
    pub cluster: Arc<dyn ClusterInfoSource>,
    pub zones: Arc<dyn ZoneResolver>,
}

/// Catalog builder tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogConfig {
    pub survey_ttl: Duration,
    pub fetch_timeout: Duration,
    pub vm_memory_overhead: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            survey_ttl: DEFAULT_SURVEY_TTL,
            fetch_timeout: Duration::from_secs(30),
            vm_memory_overhead: crate::capacity::DEFAULT_VM_MEMORY_OVERHEAD,
        }
    }
}

/// Builds the instance type catalog for a node class
pub struct CatalogBuilder {
    sources: CatalogSources,
    failures: Arc<FailureCache>,
    cache: SurveyCache,
    calculator: CapacityCalculator,
    fetch_timeout: Duration,
    refresh_pending: AtomicBool,
    metrics: FleetMetrics,
    logger: StructuredLogger,
}

impl CatalogBuilder {
    pub fn new(
        sources: CatalogSources,
        failures: Arc<FailureCache>,
        clock: Arc<dyn Clock>,
        config: CatalogConfig,
        logger: StructuredLogger,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            sources,
            failures,
            cache: SurveyCache::new(config.survey_ttl, clock),
            calculator: CapacityCalculator::new(config.vm_memory_overhead)?,
            fetch_timeout: config.fetch_timeout,
            refresh_pending: AtomicBool::new(false),
            metrics: FleetMetrics::new(),
            logger,
        })
    }

    pub fn failures(&self) -> &Arc<FailureCache> {
        &self.failures
    }

    pub fn zones(&self) -> &Arc<dyn ZoneResolver> {
        &self.sources.zones
    }

    /// Make the next listing bypass both the survey cache and the vendor cache
    pub fn request_refresh(&self) {
        self.refresh_pending.store(true, Ordering::SeqCst);
    }

    /// List every instance type offered to `node_class`, sorted by name
    ///
    /// `refresh` flushes the survey cache and asks the vendor for fresh
    /// inventory. Blocked offerings are dropped on every call; a type whose
    /// offerings are all blocked is still listed, with no offerings.
    pub async fn list_instance_types(
        &self,
        node_class: &NodeClass,
        refresh: bool,
    ) -> Result<Vec<InstanceType>> {
        let started = Instant::now();
        let refresh = self.refresh_pending.swap(false, Ordering::SeqCst) || refresh;
        if refresh {
            self.cache.flush();
        }
        if node_class.subnets.is_empty() {
            return Err(ConfigError::NoSubnets(node_class.name.clone()).into());
        }

        let subnet_zones: Vec<String> = node_class.subnet_zones().into_iter().collect();
        let survey_zones = node_class.survey_zones();

        let (cluster, on_demand, spot, pod_limits) = tokio::try_join!(
            self.cluster_info(),
            self.quotas(CapacityType::OnDemand, &subnet_zones, &survey_zones, refresh),
            self.quotas(CapacityType::Spot, &subnet_zones, &survey_zones, refresh),
            self.pod_limits(&subnet_zones),
        )?;

        let context = InstanceTypeContext::new(
            self.calculator,
            &cluster.server_version,
            node_class,
            &cluster.network,
        )?;

        let mut representatives: BTreeMap<&str, &RawInstanceTypeQuota> = BTreeMap::new();
        let mut offerings: BTreeMap<&str, Offerings> = BTreeMap::new();
        for (capacity_type, records) in [
            (CapacityType::OnDemand, on_demand.as_slice()),
            (CapacityType::Spot, spot.as_slice()),
        ] {
            for quota in records {
                representatives
                    .entry(quota.instance_type.as_str())
                    .or_insert(quota);
                if self
                    .failures
                    .is_blocked(&quota.instance_type, capacity_type, &quota.zone)
                {
                    continue;
                }
                offerings
                    .entry(quota.instance_type.as_str())
                    .or_default()
                    .push(Offering::from_quota(
                        quota,
                        capacity_type,
                        self.sources.zones.as_ref(),
                    ));
            }
        }
        self.failures.reset_metrics_if_unblocked();

        let mut instance_types = Vec::with_capacity(representatives.len());
        for (name, quota) in representatives {
            let eni_limits = pod_limits
                .get(&quota.zone)
                .map(Vec::as_slice)
                .unwrap_or_default();
            instance_types.push(context.build(
                quota,
                offerings.remove(name).unwrap_or_default(),
                eni_limits,
            )?);
        }

        let elapsed = started.elapsed();
        self.metrics
            .observe_catalog_build(elapsed.as_secs_f64(), instance_types.len());
        self.logger.log_catalog_built(
            &node_class.name,
            instance_types.len(),
            instance_types.iter().map(|it| it.offerings.len()).sum(),
            &survey_zones,
            refresh,
            elapsed.as_millis(),
        );
        Ok(instance_types)
    }

    async fn cluster_info(&self) -> Result<Arc<ClusterInfo>, FetchError> {
        if let Some(info) = self.cache.cluster_info() {
            return Ok(info);
        }
        let info = Arc::new(
            self.fetch("DescribeClusters", self.sources.cluster.cluster_info())
                .await?,
        );
        self.cache.put_cluster_info(info.clone());
        Ok(info)
    }

    async fn quotas(
        &self,
        capacity_type: CapacityType,
        subnet_zones: &[String],
        survey_zones: &[String],
        refresh: bool,
    ) -> Result<Arc<Vec<RawInstanceTypeQuota>>, FetchError> {
        if let Some(records) = self.cache.quotas(capacity_type, subnet_zones) {
            return Ok(records);
        }
        debug!(
            operation = "DescribeZoneInstanceConfigInfos",
            capacity_type = %capacity_type,
            zones = survey_zones.len(),
            refresh = refresh,
            "Fetching instance type quotas"
        );
        let mut records = self
            .fetch(
                "DescribeZoneInstanceConfigInfos",
                self.sources
                    .quotas
                    .instance_type_quotas(survey_zones, capacity_type, refresh),
            )
            .await?;
        records.retain(|quota| match quota.check_bounds() {
            Ok(()) => true,
            Err(reason) => {
                warn!(
                    operation = "DescribeZoneInstanceConfigInfos",
                    instance_type = %quota.instance_type,
                    zone = %quota.zone,
                    reason = %reason,
                    "Skipping out-of-range quota record"
                );
                false
            }
        });
        let records = Arc::new(records);
        self.cache
            .put_quotas(capacity_type, subnet_zones, records.clone());
        Ok(records)
    }

    async fn pod_limits(
        &self,
        subnet_zones: &[String],
    ) -> Result<Arc<ZonePodLimits>, FetchError> {
        if let Some(limits) = self.cache.pod_limits(subnet_zones) {
            return Ok(limits);
        }
        debug!(
            operation = "DescribeVpcCniPodLimits",
            zones = subnet_zones.len(),
            "Fetching pod limits"
        );
        let mut limits = ZonePodLimits::new();
        for zone in subnet_zones {
            let table = self
                .fetch("DescribeVpcCniPodLimits", self.sources.pod_limits.pod_limits(zone))
                .await?;
            limits.insert(zone.clone(), table);
        }
        let limits = Arc::new(limits);
        self.cache.put_pod_limits(subnet_zones, limits.clone());
        Ok(limits)
    }

    /// Run a vendor call under the fetch timeout
    async fn fetch<T, F>(&self, operation: &str, call: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let result = match tokio::time::timeout(self.fetch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                operation: operation.to_string(),
                after: self.fetch_timeout,
            }),
        };
        if let Err(e) = &result {
            self.metrics.inc_vendor_fetch_errors();
            warn!(operation = %operation, error = %e, "Vendor fetch failed");
        }
        result
    }
}
