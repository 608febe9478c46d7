//! Capacity and overhead calculation for a single instance type
//!
//! Everything here is a pure function of a quota record and the cluster
//! context handed in by the catalog builder.

use crate::error::ConfigError;
use crate::models::{PodLimitValues, PodLimits, RawInstanceTypeQuota};
use crate::quantity::{names, parse_quantity, ResourceList, MIB};
use crate::tiered::{kdump_reservation, sum_levels, Level};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default fraction of memory lost to the hypervisor
pub const DEFAULT_VM_MEMORY_OVERHEAD: f64 = 0.075;

const DEFAULT_POD_CAPACITY: i64 = 110;
const MIN_ENI_POD_CAPACITY: i64 = 61;
const MAX_EIP_CAPACITY: i64 = 9;
const EIP_CORES_PER_STEP: i64 = 6;

const DEFAULT_EVICTION_MEMORY: i64 = 100 * MIB;
const DEFAULT_EVICTION_STORAGE_PERCENT: f64 = 10.0;

/// Eviction signal keys honoured from eviction-hard overrides
pub const MEMORY_AVAILABLE: &str = "memory.available";
pub const NODEFS_AVAILABLE: &str = "nodefs.available";

/// Memory reservation curve over memory in GB, yielding MiB
const MEMORY_CURVE: &[Level] = &[
    Level::new(0, 4, 0, 256.0),
    Level::new(4, 8, 0, 204.8),
    Level::new(8, 16, 0, 102.4),
    Level::new(16, 128, 0, 61.44),
    Level::new(128, 1 << 31, 0, 20.48),
];

const CURRENT_CPU_CURVE: &[Level] = &[
    Level::new(0, 1000, 60, 0.0),
    Level::new(1000, 2000, 0, 0.01),
    Level::new(2000, 4000, 0, 0.005),
    Level::new(4000, 1 << 31, 0, 0.0025),
];

const LEGACY_CPU_CURVE: &[Level] = &[
    Level::new(0, 4000, 100, 0.0),
    Level::new(4000, 64000, 0, 0.025),
    Level::new(64000, 128000, 0, 0.0125),
    Level::new(128000, 1 << 31, 0, 0.005),
];

/// How the memory curve combines with the per-pod memory floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// Use the curve only when it is below the per-pod floor
    LowerOfFloorAndCurve,
    /// Always use the curve
    Curve,
}

/// Version-dependent kube-reserved tables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservationProfile {
    pub name: &'static str,
    pub cpu_curve: &'static [Level],
    pub memory_policy: MemoryPolicy,
}

impl ReservationProfile {
    /// Kubernetes 1.29 and newer
    pub const CURRENT: ReservationProfile = ReservationProfile {
        name: "current",
        cpu_curve: CURRENT_CPU_CURVE,
        memory_policy: MemoryPolicy::LowerOfFloorAndCurve,
    };

    /// Kubernetes 1.28 and older
    pub const LEGACY: ReservationProfile = ReservationProfile {
        name: "legacy",
        cpu_curve: LEGACY_CPU_CURVE,
        memory_policy: MemoryPolicy::Curve,
    };

    /// Pick the profile for a parsed server version (pre-releases of 1.29 count as 1.29)
    pub fn for_version(version: &Version) -> &'static ReservationProfile {
        if (version.major, version.minor) >= (1, 29) {
            &Self::CURRENT
        } else {
            &Self::LEGACY
        }
    }

    /// Parse a server git version such as `v1.30.0-tke.5` and pick its profile
    pub fn for_server_version(raw: &str) -> Result<&'static ReservationProfile, ConfigError> {
        Ok(Self::for_version(&parse_server_version(raw)?))
    }

    /// Kube-reserved defaults before caller overrides
    pub fn kube_reserved(&self, cpu_millis: i64, memory_gb: i64, pods: i64) -> ResourceList {
        let floor = pods
            .saturating_mul(20)
            .saturating_add(256)
            .saturating_mul(MIB);
        let curve = sum_levels(MEMORY_CURVE, memory_gb).saturating_mul(MIB);
        let memory = match self.memory_policy {
            MemoryPolicy::LowerOfFloorAndCurve => floor.min(curve),
            MemoryPolicy::Curve => curve,
        };

        let mut reserved = ResourceList::new();
        reserved.insert(names::MEMORY, memory);
        reserved.insert(names::CPU, sum_levels(self.cpu_curve, cpu_millis));
        reserved
    }
}

/// Parse a Kubernetes server version, tolerating a leading `v`
pub fn parse_server_version(raw: &str) -> Result<Version, ConfigError> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(stripped).map_err(|e| ConfigError::InvalidVersion {
        version: raw.to_string(),
        reason: e.to_string(),
    })
}

/// The three overhead sets subtracted from capacity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overhead {
    pub kube_reserved: ResourceList,
    pub system_reserved: ResourceList,
    pub eviction_threshold: ResourceList,
}

impl Overhead {
    pub fn total(&self) -> ResourceList {
        ResourceList::sum([
            &self.kube_reserved,
            &self.system_reserved,
            &self.eviction_threshold,
        ])
    }
}

/// Per-type inputs to the capacity computation
#[derive(Debug, Clone, Copy)]
pub struct CapacityInputs<'a> {
    pub quota: &'a RawInstanceTypeQuota,
    /// Ephemeral storage in decimal GB, already adjusted for data disk mounts
    pub storage_gb: i64,
    pub max_pods: Option<i64>,
    pub pods_per_core: Option<i64>,
    /// ENI limit table for the zone; empty when the zone has no data
    pub eni_limits: &'a [PodLimits],
}

/// Computes capacity from quota records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityCalculator {
    vm_memory_overhead: f64,
}

impl Default for CapacityCalculator {
    fn default() -> Self {
        Self {
            vm_memory_overhead: DEFAULT_VM_MEMORY_OVERHEAD,
        }
    }
}

impl CapacityCalculator {
    pub fn new(vm_memory_overhead: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&vm_memory_overhead) {
            return Err(ConfigError::InvalidOverheadFraction(vm_memory_overhead));
        }
        Ok(Self { vm_memory_overhead })
    }

    pub fn vm_memory_overhead(&self) -> f64 {
        self.vm_memory_overhead
    }

    /// Usable memory in bytes after kdump and hypervisor overhead
    pub fn memory_capacity(&self, memory_bytes: i64) -> i64 {
        let after_kdump = memory_bytes.saturating_sub(kdump_reservation(memory_bytes));
        (after_kdump as f64 * (1.0 - self.vm_memory_overhead)).ceil() as i64
    }

    /// Full capacity resource list for one instance type
    pub fn capacity(&self, inputs: &CapacityInputs<'_>) -> ResourceList {
        let quota = inputs.quota;
        let limits = eni_limits_for(&quota.instance_type, inputs.eni_limits);
        let eni_ip = limits.and_then(|l| l.route_eni_static_ip);

        let mut capacity = ResourceList::new();
        capacity.insert(names::CPU, quota.cpu.saturating_mul(1000));
        capacity.insert(names::MEMORY, self.memory_capacity(quota.memory_bytes()));
        capacity.insert(
            names::EPHEMERAL_STORAGE,
            inputs.storage_gb.saturating_mul(1_000_000_000),
        );
        capacity.insert(
            names::PODS,
            pod_capacity(quota.cpu, eni_ip, inputs.max_pods, inputs.pods_per_core),
        );

        if !inputs.eni_limits.is_empty() {
            capacity.insert(names::EIP, eip_capacity(quota.cpu));
        }
        if let Some(limits) = limits {
            if let Some(v) = limits.route_eni_static_ip {
                capacity.insert(names::ENI_IP, v);
            }
            if let Some(v) = limits.direct_eni {
                capacity.insert(names::DIRECT_ENI, v);
                capacity.insert(names::ENI, v);
            }
            if let Some(v) = limits.sub_eni {
                capacity.insert(names::SUB_ENI, v);
            }
        }
        capacity
    }
}

fn eni_limits_for<'a>(
    instance_type: &str,
    table: &'a [PodLimits],
) -> Option<&'a PodLimitValues> {
    table
        .iter()
        .find(|l| l.instance_type == instance_type)
        .map(|l| &l.pod_limits)
}

/// Pod density for an instance type
///
/// An explicit max-pods wins, then the ENI static-IP limit (never below 61),
/// then the kubelet default of 110. Pods-per-core caps whichever applied.
pub fn pod_capacity(
    cpu: i64,
    eni_ip: Option<i64>,
    max_pods: Option<i64>,
    pods_per_core: Option<i64>,
) -> i64 {
    let count = match (max_pods.filter(|m| *m > 0), eni_ip.filter(|e| *e > 0)) {
        (Some(max), _) => max,
        (None, Some(eni)) => eni.max(MIN_ENI_POD_CAPACITY),
        (None, None) => DEFAULT_POD_CAPACITY,
    };
    match pods_per_core.filter(|p| *p > 0) {
        Some(per_core) => count.min(per_core.saturating_mul(cpu)),
        None => count,
    }
}

/// Elastic IPs attachable to an instance with `cpu` cores
pub fn eip_capacity(cpu: i64) -> i64 {
    if cpu < 1 {
        return 1;
    }
    (cpu / EIP_CORES_PER_STEP + 1).min(MAX_EIP_CAPACITY)
}

/// Kube-reserved for the given capacity, with caller overrides merged last
pub fn kube_reserved(
    profile: &ReservationProfile,
    capacity: &ResourceList,
    memory_gb: i64,
    overrides: &ResourceList,
) -> ResourceList {
    profile
        .kube_reserved(capacity.cpu_millis(), memory_gb, capacity.pods())
        .merged(overrides)
}

/// Eviction thresholds, defaulting to 100Mi memory and 10% of storage
pub fn eviction_threshold(
    capacity: &ResourceList,
    eviction_hard: &BTreeMap<String, String>,
) -> Result<ResourceList, ConfigError> {
    let memory = capacity.memory_bytes();
    let storage = capacity.ephemeral_storage_bytes();

    let mut threshold = ResourceList::new();
    threshold.insert(names::MEMORY, DEFAULT_EVICTION_MEMORY);
    threshold.insert(
        names::EPHEMERAL_STORAGE,
        (storage as f64 / 100.0 * DEFAULT_EVICTION_STORAGE_PERCENT).ceil() as i64,
    );

    if let Some(signal) = eviction_hard.get(MEMORY_AVAILABLE) {
        threshold.insert(
            names::MEMORY,
            eviction_signal(MEMORY_AVAILABLE, names::MEMORY, memory, signal)?,
        );
    }
    if let Some(signal) = eviction_hard.get(NODEFS_AVAILABLE) {
        threshold.insert(
            names::EPHEMERAL_STORAGE,
            eviction_signal(NODEFS_AVAILABLE, names::EPHEMERAL_STORAGE, storage, signal)?,
        );
    }
    Ok(threshold)
}

fn eviction_signal(
    signal: &str,
    resource: &str,
    capacity: i64,
    value: &str,
) -> Result<i64, ConfigError> {
    if value.ends_with('%') {
        let percent = parse_percentage(signal, value)?;
        return Ok((capacity as f64 / 100.0 * percent).ceil() as i64);
    }
    parse_quantity(resource, value)
}

/// Parse `NN%`; exactly 100% disables the threshold and yields zero
fn parse_percentage(signal: &str, value: &str) -> Result<f64, ConfigError> {
    let percent: f64 = value
        .trim_matches('%')
        .parse()
        .map_err(|_| ConfigError::InvalidPercentage {
            signal: signal.to_string(),
            value: value.to_string(),
        })?;
    if percent == 100.0 {
        return Ok(0.0);
    }
    Ok(percent)
}
