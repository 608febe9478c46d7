//! Observability infrastructure for the fleet resolver
//!
//! Provides:
//! - Prometheus metrics (catalog build latency, blocked offerings, selection outcomes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, register_int_gauge_vec, GaugeVec,
    Histogram, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for catalog builds (in seconds)
const BUILD_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<FleetMetricsInner> = OnceLock::new();

struct FleetMetricsInner {
    blocked_instance_type: GaugeVec,
    insufficient_failures: IntGauge,
    catalog_build_seconds: Histogram,
    catalog_instance_types: IntGauge,
    selections: IntGauge,
    selection_failures: IntGaugeVec,
    vendor_fetch_errors: IntGauge,
}

impl FleetMetricsInner {
    fn new() -> Self {
        Self {
            blocked_instance_type: register_gauge_vec!(
                "fleet_resolver_blocked_instance_type",
                "Instance type offerings currently blocked from selection",
                &["instance_type", "capacity_type", "zone"]
            )
            .expect("Failed to register blocked_instance_type"),

            insufficient_failures: register_int_gauge!(
                "fleet_resolver_insufficient_failures_total",
                "Total number of insufficient capacity failures recorded"
            )
            .expect("Failed to register insufficient_failures"),

            catalog_build_seconds: register_histogram!(
                "fleet_resolver_catalog_build_seconds",
                "Time spent building the instance type catalog",
                BUILD_BUCKETS.to_vec()
            )
            .expect("Failed to register catalog_build_seconds"),

            catalog_instance_types: register_int_gauge!(
                "fleet_resolver_catalog_instance_types",
                "Number of instance types in the most recent catalog"
            )
            .expect("Failed to register catalog_instance_types"),

            selections: register_int_gauge!(
                "fleet_resolver_selections_total",
                "Total number of successful instance type selections"
            )
            .expect("Failed to register selections"),

            selection_failures: register_int_gauge_vec!(
                "fleet_resolver_selection_failures_total",
                "Total number of failed instance type selections",
                &["reason"]
            )
            .expect("Failed to register selection_failures"),

            vendor_fetch_errors: register_int_gauge!(
                "fleet_resolver_vendor_fetch_errors_total",
                "Total number of failed vendor fetches"
            )
            .expect("Failed to register vendor_fetch_errors"),
        }
    }
}

/// Resolver metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct FleetMetrics {
    _private: (),
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FleetMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetMetrics").finish()
    }
}

impl FleetMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &FleetMetricsInner {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new)
    }

    /// Mark an offering pattern as blocked
    pub fn set_blocked(&self, instance_type: &str, capacity_type: &str, zone: &str) {
        self.inner()
            .blocked_instance_type
            .with_label_values(&[instance_type, capacity_type, zone])
            .set(1.0);
    }

    /// Clear every blocked series
    pub fn reset_blocked(&self) {
        self.inner().blocked_instance_type.reset();
    }

    pub fn inc_insufficient_failures(&self) {
        self.inner().insufficient_failures.inc();
    }

    /// Record a catalog build
    pub fn observe_catalog_build(&self, duration_secs: f64, instance_types: usize) {
        self.inner().catalog_build_seconds.observe(duration_secs);
        self.inner()
            .catalog_instance_types
            .set(instance_types as i64);
    }

    pub fn inc_selections(&self) {
        self.inner().selections.inc();
    }

    pub fn inc_selection_failures(&self, reason: &str) {
        self.inner()
            .selection_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_vendor_fetch_errors(&self) {
        self.inner().vendor_fetch_errors.inc();
    }
}

/// Structured logger for resolver events
///
/// Provides consistent JSON-formatted logging for blocklist changes,
/// catalog builds, and selection outcomes.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log an offering pattern entering the blocklist
    pub fn log_instance_type_blocked(
        &self,
        instance_type: &str,
        capacity_type: &str,
        zone: &str,
        reason: &str,
    ) {
        info!(
            event = "instance_type_blocked",
            instance = %self.instance,
            instance_type = %instance_type,
            capacity_type = %capacity_type,
            zone = %zone,
            reason = %reason,
            "Instance type is blocked: {}",
            reason
        );
    }

    /// Log an insufficient capacity observation
    pub fn log_insufficient_failure(
        &self,
        instance_type: &str,
        capacity_type: &str,
        zone: &str,
        count: u32,
    ) {
        info!(
            event = "insufficient_failure_recorded",
            instance = %self.instance,
            instance_type = %instance_type,
            capacity_type = %capacity_type,
            zone = %zone,
            count = count,
            "Recorded insufficient capacity failure"
        );
    }

    /// Log a shortage that crossed its threshold and is now treated as a hard failure
    pub fn log_failure_escalated(
        &self,
        instance_type: &str,
        capacity_type: &str,
        zone: &str,
        count: u32,
        threshold: u32,
    ) {
        warn!(
            event = "failure_escalated",
            instance = %self.instance,
            instance_type = %instance_type,
            capacity_type = %capacity_type,
            zone = %zone,
            count = count,
            threshold = threshold,
            "Insufficient capacity threshold exceeded, escalating to blocked"
        );
    }

    /// Log a completed catalog build
    pub fn log_catalog_built(
        &self,
        node_class: &str,
        instance_types: usize,
        offerings: usize,
        zones: &[String],
        refresh: bool,
        duration_ms: u128,
    ) {
        info!(
            event = "catalog_built",
            instance = %self.instance,
            node_class = %node_class,
            instance_types = instance_types,
            offerings = offerings,
            zones = ?zones,
            refresh = refresh,
            duration_ms = duration_ms as u64,
            "Built instance type catalog"
        );
    }

    /// Log the winning selection
    pub fn log_instance_type_selected(
        &self,
        instance_type: &str,
        zone: &str,
        subnet_id: &str,
        capacity_type: &str,
        price: f64,
        candidates: usize,
    ) {
        info!(
            event = "instance_type_selected",
            instance = %self.instance,
            instance_type = %instance_type,
            zone = %zone,
            subnet_id = %subnet_id,
            capacity_type = %capacity_type,
            price = price,
            candidates = candidates,
            "Selected instance type"
        );
    }

    /// Log a selection that could not produce a winner
    pub fn log_selection_failed(&self, reason: &str, detail: &str) {
        warn!(
            event = "selection_failed",
            instance = %self.instance,
            reason = %reason,
            detail = %detail,
            "Instance type selection failed"
        );
    }

    /// Log resolver startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "resolver_started",
            instance = %self.instance,
            resolver_version = %version,
            "Fleet resolver started"
        );
    }

    /// Log resolver shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "resolver_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Fleet resolver shutting down"
        );
    }
}
