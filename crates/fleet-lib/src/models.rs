//! Core data models for the fleet resolver
//!
//! Vendor-sourced records keep the vendor's field names on the wire; node class
//! and cluster metadata use camelCase like the Kubernetes objects they mirror.

use crate::error::FetchError;
use crate::quantity::GIB;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Vendor status marking an instance type as purchasable
pub const SELL_STATUS: &str = "SELL";

const DEFAULT_SYSTEM_DISK_GB: i64 = 50;
const SYSTEM_DISK_HEADROOM_GB: i64 = 15;
const DATA_DISK_HEADROOM_GB: i64 = 5;

/// Largest plausible core count in a vendor quota record
pub const MAX_QUOTA_CPU: i64 = 1 << 16;
/// Largest plausible memory size, in GiB, in a vendor quota record
pub const MAX_QUOTA_MEMORY_GB: i64 = 1 << 24;

/// Mount points that move container/kubelet storage onto a data disk
const CONTAINER_MOUNT_TARGETS: &[&str] = &["/var/lib/container", "/var/lib/kubelet", "/var/lib", "/var"];

/// Purchase mode of an offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

impl CapacityType {
    pub const ALL: [CapacityType; 2] = [CapacityType::OnDemand, CapacityType::Spot];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityType::OnDemand => "on-demand",
            CapacityType::Spot => "spot",
        }
    }

    /// Vendor charge-type filter value for quota queries
    pub fn charge_type(&self) -> &'static str {
        match self {
            CapacityType::OnDemand => "POSTPAID_BY_HOUR",
            CapacityType::Spot => "SPOTPAID",
        }
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CapacityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-demand" => Ok(CapacityType::OnDemand),
            "spot" => Ok(CapacityType::Spot),
            other => Err(format!("unknown capacity type {other:?}")),
        }
    }
}

/// Price block attached to a quota record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPrice {
    #[serde(rename = "UnitPrice", default)]
    pub unit_price: f64,
}

/// One instance type quota record as reported by the vendor for a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInstanceTypeQuota {
    #[serde(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "InstanceFamily", default)]
    pub instance_family: String,
    #[serde(rename = "InstanceType")]
    pub instance_type: String,
    #[serde(rename = "Cpu")]
    pub cpu: i64,
    /// Memory in GiB
    #[serde(rename = "Memory")]
    pub memory_gb: i64,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Inventory", default)]
    pub inventory: i64,
    #[serde(rename = "Price", default)]
    pub price: ItemPrice,
}

impl RawInstanceTypeQuota {
    /// Sellable and in stock
    pub fn is_available(&self) -> bool {
        self.status == SELL_STATUS && self.inventory > 0
    }

    pub fn memory_bytes(&self) -> i64 {
        self.memory_gb.saturating_mul(GIB)
    }

    /// Reject cpu and memory figures no real instance type can have
    pub fn check_bounds(&self) -> Result<(), String> {
        if !(0..=MAX_QUOTA_CPU).contains(&self.cpu) {
            return Err(format!("cpu {} outside 0..={MAX_QUOTA_CPU}", self.cpu));
        }
        if !(0..=MAX_QUOTA_MEMORY_GB).contains(&self.memory_gb) {
            return Err(format!(
                "memory {}GiB outside 0..={MAX_QUOTA_MEMORY_GB}",
                self.memory_gb
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QuotaResponseEnvelope {
    #[serde(rename = "Response")]
    response: Option<QuotaResponseParams>,
}

#[derive(Debug, Deserialize)]
struct QuotaResponseParams {
    #[serde(rename = "InstanceTypeQuotaSet")]
    instance_type_quota_set: Option<String>,
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
}

/// Decoded quota survey response
#[derive(Debug, Clone)]
pub struct QuotaResponse {
    pub request_id: String,
    pub items: Vec<RawInstanceTypeQuota>,
}

impl QuotaResponse {
    const OPERATION: &'static str = "DescribeZoneInstanceConfigInfos";

    /// Decode a vendor response body, whose record list is itself a JSON string
    pub fn decode(body: &[u8]) -> Result<Self, FetchError> {
        let envelope: QuotaResponseEnvelope = serde_json::from_slice(body)
            .map_err(|e| FetchError::decode(Self::OPERATION, e.to_string()))?;

        let params = envelope
            .response
            .ok_or_else(|| FetchError::decode(Self::OPERATION, "missing Response"))?;
        let (Some(request_id), Some(quota_set)) = (params.request_id, params.instance_type_quota_set)
        else {
            return Err(FetchError::decode(
                Self::OPERATION,
                "invalid response: missing RequestId or InstanceTypeQuotaSet",
            ));
        };

        let items = serde_json::from_str(&quota_set).map_err(|e| {
            FetchError::decode(
                Self::OPERATION,
                format!("failed to unmarshal InstanceTypeQuotaSet: {e}"),
            )
        })?;

        Ok(Self { request_id, items })
    }
}

/// ENI-derived limits for one instance type in one zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PodLimitValues {
    #[serde(rename = "RouteENIStaticIP", default)]
    pub route_eni_static_ip: Option<i64>,
    #[serde(rename = "DirectENI", default)]
    pub direct_eni: Option<i64>,
    #[serde(rename = "SubENI", default)]
    pub sub_eni: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PodLimits {
    pub instance_type: String,
    #[serde(default)]
    pub pod_limits: PodLimitValues,
}

/// Per-zone ENI limit tables, keyed by zone name
pub type ZonePodLimits = BTreeMap<String, Vec<PodLimits>>;

/// Cluster network settings that shape pod density
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub vpc_cni_type: Option<String>,
    #[serde(default)]
    pub meta_feature: bool,
    #[serde(default)]
    pub max_node_pod_num: Option<i64>,
}

impl ClusterNetwork {
    pub const VPC_CNI: &'static str = "VPC-CNI";

    /// Max-pods implied by a non-VPC-CNI cluster's per-node pod CIDR size
    pub fn max_pods_override(&self) -> Option<i64> {
        match self.max_node_pod_num {
            Some(n) if self.network_type != Self::VPC_CNI && n > 3 => Some(n - 3),
            _ => None,
        }
    }

    /// Whether ENI limit tables are meaningful for this cluster at all
    pub fn uses_eni_limits(&self) -> bool {
        let no_cni_type = self.vpc_cni_type.as_deref().map_or(true, str::is_empty);
        !(no_cni_type && self.network_type != Self::VPC_CNI && !self.meta_feature)
    }
}

/// Cluster metadata consumed by each resolution cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// Kubernetes server git version, e.g. `v1.30.0-tke.5`
    pub server_version: String,
    #[serde(default)]
    pub network: ClusterNetwork,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDisk {
    pub size: i64,
    #[serde(default, rename = "type")]
    pub disk_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub size: i64,
    #[serde(default, rename = "type")]
    pub disk_type: Option<String>,
    #[serde(default)]
    pub mount_target: Option<String>,
}

/// Kubelet overrides carried by a node class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletSettings {
    #[serde(default)]
    pub max_pods: Option<i64>,
    #[serde(default)]
    pub pods_per_core: Option<i64>,
    #[serde(default)]
    pub kube_reserved: BTreeMap<String, String>,
    #[serde(default)]
    pub system_reserved: BTreeMap<String, String>,
    #[serde(default)]
    pub eviction_hard: BTreeMap<String, String>,
}

/// Node class constraints for a resolution cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeClass {
    pub name: String,
    /// Currently resolved subnets
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub system_disk: Option<SystemDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
    /// Zones of live machines launched from this class
    #[serde(default)]
    pub in_use_zones: Vec<String>,
    #[serde(default)]
    pub kubelet: KubeletSettings,
}

impl NodeClass {
    pub fn subnet_zones(&self) -> BTreeSet<String> {
        self.subnets.iter().map(|s| s.zone.clone()).collect()
    }

    /// Zones to survey: subnet zones plus zones still backing live machines
    ///
    /// Keeping in-use zones means shrinking the subnet selection never
    /// orphans capacity lookups for machines that already exist.
    pub fn survey_zones(&self) -> Vec<String> {
        let mut zones = self.subnet_zones();
        zones.extend(self.in_use_zones.iter().filter(|z| !z.is_empty()).cloned());
        zones.into_iter().collect()
    }

    pub fn subnet_for_zone(&self, zone: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.zone == zone)
    }

    /// Ephemeral storage available to pods, in GB
    pub fn ephemeral_storage_gb(&self) -> i64 {
        let mut storage = self
            .system_disk
            .as_ref()
            .map_or(DEFAULT_SYSTEM_DISK_GB, |d| d.size)
            .saturating_sub(SYSTEM_DISK_HEADROOM_GB);

        for disk in &self.data_disks {
            let Some(target) = disk.mount_target.as_deref() else {
                continue;
            };
            let cleaned = clean_path(target);
            if CONTAINER_MOUNT_TARGETS
                .iter()
                .any(|t| Path::new(t) == cleaned.as_path())
            {
                storage = disk.size.saturating_sub(DATA_DISK_HEADROOM_GB);
            }
        }
        storage.max(0)
    }
}

/// Lexically normalize a mount path (`//`, trailing `/`, `.` and `..` segments)
fn clean_path(raw: &str) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other),
        }
    }
    cleaned
}
