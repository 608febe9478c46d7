//! Instance type selection for a single launch
//!
//! Narrows a candidate list to one (instance type, zone, subnet, capacity
//! type) choice:
//! 1. candidate filter hook, then drop spot types pricier than on-demand
//!    when the request allows both
//! 2. price ordering with name tie-breaks
//! 3. truncation to the configured maximum
//! 4. zone and subnet resolution for the winner's cheapest offering
//!
//! Steps 1 and 3 are skipped when the request carries min-values, so the
//! scheduler keeps the diversity it asked for.

use crate::blocklist::FailureCache;
use crate::error::{CapacityShortage, ConfigError, FleetError, Result};
use crate::instancetype::InstanceType;
use crate::models::{CapacityType, NodeClass};
use crate::observability::{FleetMetrics, StructuredLogger};
use crate::offering::{cheapest, Offering};
use crate::quantity::ResourceList;
use crate::requirements::{labels, Requirements};
use crate::zone::ZoneResolver;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default cap on the number of candidates considered for a launch
pub const DEFAULT_MAX_INSTANCE_TYPES: usize = 60;

/// A pending workload's scheduling constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingRequest {
    #[serde(default)]
    pub requirements: Requirements,
    /// Requested resources as quantity strings, e.g. `{"cpu": "2", "memory": "4Gi"}`
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

impl SchedulingRequest {
    pub fn resource_requests(&self) -> std::result::Result<ResourceList, ConfigError> {
        ResourceList::parse(&self.resources)
    }
}

/// The chosen instance type and where to launch it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub instance_type: InstanceType,
    pub zone: String,
    pub zone_id: String,
    pub subnet_id: String,
    pub capacity_type: CapacityType,
    pub price: f64,
}

/// Hook for excluding exotic instance types before ranking
pub trait CandidateFilter: Send + Sync {
    fn filter(&self, candidates: Vec<InstanceType>, request: &SchedulingRequest) -> Vec<InstanceType>;
}

/// Keeps every candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl CandidateFilter for PassThrough {
    fn filter(&self, candidates: Vec<InstanceType>, _request: &SchedulingRequest) -> Vec<InstanceType> {
        candidates
    }
}

/// Picks the launch target from a candidate list
pub struct SelectionEngine {
    failures: Arc<FailureCache>,
    zones: Arc<dyn ZoneResolver>,
    filter: Arc<dyn CandidateFilter>,
    max_instance_types: usize,
    metrics: FleetMetrics,
    logger: StructuredLogger,
}

impl SelectionEngine {
    pub fn new(
        failures: Arc<FailureCache>,
        zones: Arc<dyn ZoneResolver>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            failures,
            zones,
            filter: Arc::new(PassThrough),
            max_instance_types: DEFAULT_MAX_INSTANCE_TYPES,
            metrics: FleetMetrics::new(),
            logger,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn CandidateFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_instance_types(mut self, max: usize) -> Self {
        self.max_instance_types = max;
        self
    }

    /// Cheapest offering that is available, compatible with `requirements`
    /// and not currently blocked
    pub fn cheapest_eligible<'a>(
        &self,
        instance_type: &'a InstanceType,
        requirements: &Requirements,
    ) -> Option<&'a Offering> {
        cheapest(instance_type.offerings.compatible(requirements).filter(|o| {
            !self
                .failures
                .is_blocked(&instance_type.name, o.capacity_type, &o.zone)
        }))
    }

    fn eligible_price(&self, instance_type: &InstanceType, requirements: &Requirements) -> f64 {
        self.cheapest_eligible(instance_type, requirements)
            .map_or(f64::INFINITY, |o| o.price)
    }

    /// Instance types from `catalog` that could host the request
    pub fn shortlist(
        &self,
        catalog: Vec<InstanceType>,
        request: &SchedulingRequest,
    ) -> std::result::Result<Vec<InstanceType>, ConfigError> {
        let requests = request.resource_requests()?;
        Ok(catalog
            .into_iter()
            .filter(|it| {
                it.requirements.compatible(&request.requirements)
                    && self.cheapest_eligible(it, &request.requirements).is_some()
                    && it.allocatable().fits(&requests)
            })
            .collect())
    }

    /// Pick the single best launch target from `candidates`
    pub fn select(
        &self,
        node_class: &NodeClass,
        candidates: Vec<InstanceType>,
        request: &SchedulingRequest,
    ) -> Result<Selection> {
        let result = self.select_inner(node_class, candidates, request);
        match &result {
            Ok(_) => self.metrics.inc_selections(),
            Err(e) => {
                self.metrics.inc_selection_failures(e.code());
                self.logger.log_selection_failed(e.code(), &e.to_string());
            }
        }
        result
    }

    fn select_inner(
        &self,
        node_class: &NodeClass,
        candidates: Vec<InstanceType>,
        request: &SchedulingRequest,
    ) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(CapacityShortage::NoCandidates.into());
        }
        let requirements = &request.requirements;
        let preserve_diversity = requirements.has_min_values();

        let mut candidates = candidates;
        if !preserve_diversity {
            candidates = self.filter.filter(candidates, request);
            if is_mixed_capacity_launch(&candidates, requirements) {
                candidates = filter_unwanted_spot(candidates);
            }
        }

        self.order_by_price(&mut candidates, requirements);
        if !preserve_diversity {
            candidates.truncate(self.max_instance_types);
        }

        let total = candidates.len();
        let winner = candidates
            .into_iter()
            .next()
            .ok_or(FleetError::InsufficientCapacity(CapacityShortage::NoCandidates))?;
        let offering = self
            .cheapest_eligible(&winner, requirements)
            .cloned()
            .ok_or_else(|| CapacityShortage::NoCompatibleOffering(winner.name.clone()))?;

        let zone = self
            .zones
            .zone_from_id(&offering.zone_id)
            .or_else(|| (!offering.zone.is_empty()).then(|| offering.zone.clone()))
            .ok_or_else(|| CapacityShortage::UnknownZone(offering.zone_id.clone()))?;
        let subnet = node_class
            .subnet_for_zone(&zone)
            .ok_or_else(|| CapacityShortage::NoSubnet(zone.clone()))?;

        self.logger.log_instance_type_selected(
            &winner.name,
            &zone,
            &subnet.id,
            offering.capacity_type.as_str(),
            offering.price,
            total,
        );
        Ok(Selection {
            subnet_id: subnet.id.clone(),
            zone,
            zone_id: offering.zone_id,
            capacity_type: offering.capacity_type,
            price: offering.price,
            instance_type: winner,
        })
    }

    /// Stable sort by cheapest eligible price, then by name
    fn order_by_price(&self, candidates: &mut [InstanceType], requirements: &Requirements) {
        candidates.sort_by(|a, b| {
            let (pa, pb) = (
                self.eligible_price(a, requirements),
                self.eligible_price(b, requirements),
            );
            pa.partial_cmp(&pb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}

/// Whether the request allows both capacity types and both are on offer
fn is_mixed_capacity_launch(candidates: &[InstanceType], requirements: &Requirements) -> bool {
    if !requirements.allows(labels::CAPACITY_TYPE, CapacityType::Spot.as_str())
        || !requirements.allows(labels::CAPACITY_TYPE, CapacityType::OnDemand.as_str())
    {
        return false;
    }
    let offered = |capacity_type: CapacityType| {
        candidates
            .iter()
            .flat_map(|it| it.offerings.compatible(requirements))
            .any(|o| o.capacity_type == capacity_type)
    };
    offered(CapacityType::Spot) && offered(CapacityType::OnDemand)
}

/// Drop types whose cheapest available offering costs more than the
/// cheapest available on-demand offering across all candidates
fn filter_unwanted_spot(candidates: Vec<InstanceType>) -> Vec<InstanceType> {
    let cheapest_on_demand = candidates
        .iter()
        .flat_map(|it| it.offerings.available())
        .filter(|o| o.capacity_type == CapacityType::OnDemand)
        .map(|o| o.price)
        .fold(f64::MAX, f64::min);

    candidates
        .into_iter()
        .filter(|it| {
            it.cheapest_available()
                .map_or(false, |o| o.price <= cheapest_on_demand)
        })
        .collect()
}
