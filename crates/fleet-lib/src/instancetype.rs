//! Instance type model assembled from a quota record
//!
//! An [`InstanceType`] is built fresh for every catalog and never mutated.

use crate::capacity::{
    eviction_threshold, kube_reserved, CapacityCalculator, CapacityInputs, Overhead,
    ReservationProfile,
};
use crate::error::ConfigError;
use crate::models::{CapacityType, ClusterNetwork, NodeClass, PodLimits, RawInstanceTypeQuota};
use crate::offering::{cheapest, Offering, Offerings};
use crate::quantity::ResourceList;
use crate::requirements::{labels, Operator, Requirement, Requirements};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A schedulable instance type with its purchasable offerings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub requirements: Requirements,
    pub offerings: Offerings,
    pub capacity: ResourceList,
    pub overhead: Overhead,
}

impl InstanceType {
    /// Capacity left for pods once every overhead is subtracted
    pub fn allocatable(&self) -> ResourceList {
        self.capacity.subtract(&self.overhead.total())
    }

    /// Cheapest available offering compatible with `requirements`
    pub fn cheapest_compatible(&self, requirements: &Requirements) -> Option<&Offering> {
        cheapest(self.offerings.compatible(requirements))
    }

    /// Cheapest available offering regardless of requirements
    pub fn cheapest_available(&self) -> Option<&Offering> {
        cheapest(self.offerings.available())
    }

    pub fn has_available(&self, capacity_type: CapacityType) -> bool {
        self.offerings
            .available()
            .any(|o| o.capacity_type == capacity_type)
    }
}

/// Per-cycle context shared by every instance type in a catalog
#[derive(Debug, Clone)]
pub struct InstanceTypeContext {
    pub calculator: CapacityCalculator,
    pub profile: &'static ReservationProfile,
    pub storage_gb: i64,
    pub max_pods: Option<i64>,
    pub pods_per_core: Option<i64>,
    pub kube_reserved: ResourceList,
    pub system_reserved: ResourceList,
    pub eviction_hard: BTreeMap<String, String>,
    pub use_eni_limits: bool,
}

impl InstanceTypeContext {
    /// Derive the context from node class and cluster settings
    ///
    /// Overrides are parsed here so malformed values fail the whole cycle
    /// before any instance type is built.
    pub fn new(
        calculator: CapacityCalculator,
        server_version: &str,
        node_class: &NodeClass,
        network: &ClusterNetwork,
    ) -> Result<Self, ConfigError> {
        let kubelet = &node_class.kubelet;
        Ok(Self {
            calculator,
            profile: ReservationProfile::for_server_version(server_version)?,
            storage_gb: node_class.ephemeral_storage_gb(),
            max_pods: kubelet.max_pods.or_else(|| network.max_pods_override()),
            pods_per_core: kubelet.pods_per_core,
            kube_reserved: ResourceList::parse(&kubelet.kube_reserved)?,
            system_reserved: ResourceList::parse(&kubelet.system_reserved)?,
            eviction_hard: kubelet.eviction_hard.clone(),
            use_eni_limits: network.uses_eni_limits(),
        })
    }

    /// Build one instance type from its representative quota record
    pub fn build(
        &self,
        quota: &RawInstanceTypeQuota,
        offerings: Offerings,
        eni_limits: &[PodLimits],
    ) -> Result<InstanceType, ConfigError> {
        let eni_limits = if self.use_eni_limits { eni_limits } else { &[] };
        let capacity = self.calculator.capacity(&CapacityInputs {
            quota,
            storage_gb: self.storage_gb,
            max_pods: self.max_pods,
            pods_per_core: self.pods_per_core,
            eni_limits,
        });

        let overhead = Overhead {
            kube_reserved: kube_reserved(self.profile, &capacity, quota.memory_gb, &self.kube_reserved),
            system_reserved: self.system_reserved.clone(),
            eviction_threshold: eviction_threshold(&capacity, &self.eviction_hard)?,
        };

        Ok(InstanceType {
            name: quota.instance_type.clone(),
            requirements: compute_requirements(quota, &offerings),
            offerings,
            capacity,
            overhead,
        })
    }
}

/// Requirements advertised by an instance type
///
/// Zone and capacity-type values come from available offerings only.
pub fn compute_requirements(quota: &RawInstanceTypeQuota, offerings: &Offerings) -> Requirements {
    let available: Vec<&Offering> = offerings.available().collect();
    let zone_ids: BTreeSet<&str> = available.iter().map(|o| o.zone_id.as_str()).collect();
    let zone_names: BTreeSet<&str> = available.iter().map(|o| o.zone.as_str()).collect();
    let capacity_types: BTreeSet<&str> = available.iter().map(|o| o.capacity_type.as_str()).collect();

    Requirements::new()
        .with(Requirement::new(labels::INSTANCE_TYPE, Operator::In, [quota.instance_type.as_str()]))
        .with(Requirement::new(labels::ARCH, Operator::In, ["amd64"]))
        .with(Requirement::new(labels::OS, Operator::In, ["linux"]))
        .with(Requirement::new(labels::TOPOLOGY_ZONE, Operator::In, zone_ids))
        .with(Requirement::new(labels::ZONE_NAME, Operator::In, zone_names))
        .with(Requirement::new(
            labels::WINDOWS_BUILD,
            Operator::DoesNotExist,
            Vec::<String>::new(),
        ))
        .with(Requirement::new(labels::CAPACITY_TYPE, Operator::In, capacity_types))
        .with(Requirement::new(labels::INSTANCE_CPU, Operator::In, [quota.cpu.to_string()]))
        .with(Requirement::new(
            labels::INSTANCE_MEMORY_GB,
            Operator::In,
            [quota.memory_gb.to_string()],
        ))
        .with(Requirement::new(
            labels::INSTANCE_FAMILY,
            Operator::In,
            [quota.instance_family.as_str()],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemPrice, KubeletSettings, PodLimitValues};
    use crate::quantity::{names, MIB};

    fn quota() -> RawInstanceTypeQuota {
        RawInstanceTypeQuota {
            zone: "ap-guangzhou-3".into(),
            instance_family: "S5".into(),
            instance_type: "S5.LARGE8".into(),
            cpu: 4,
            memory_gb: 8,
            status: "SELL".into(),
            inventory: 5,
            price: ItemPrice { unit_price: 0.5 },
        }
    }

    fn offerings() -> Offerings {
        Offerings::from(vec![
            Offering {
                zone: "ap-guangzhou-3".into(),
                zone_id: "100003".into(),
                capacity_type: CapacityType::OnDemand,
                price: 0.5,
                available: true,
            },
            Offering {
                zone: "ap-guangzhou-4".into(),
                zone_id: "100004".into(),
                capacity_type: CapacityType::Spot,
                price: 0.2,
                available: false,
            },
        ])
    }

    fn context(node_class: &NodeClass, network: &ClusterNetwork) -> InstanceTypeContext {
        InstanceTypeContext::new(CapacityCalculator::default(), "v1.30.0", node_class, network).unwrap()
    }

    #[test]
    fn test_requirements_use_available_offerings() {
        let reqs = compute_requirements(&quota(), &offerings());
        let zones = reqs.get(labels::TOPOLOGY_ZONE).unwrap();
        assert_eq!(zones.values.iter().collect::<Vec<_>>(), vec!["100003"]);
        let capacity_types = reqs.get(labels::CAPACITY_TYPE).unwrap();
        assert!(capacity_types.values.contains("on-demand"));
        assert!(!capacity_types.values.contains("spot"));
        assert!(reqs.allows(labels::INSTANCE_CPU, "4"));
        assert!(reqs.allows(labels::INSTANCE_MEMORY_GB, "8"));
        assert_eq!(
            reqs.get(labels::WINDOWS_BUILD).unwrap().operator,
            Operator::DoesNotExist
        );
    }

    #[test]
    fn test_build_instance_type() {
        let node_class = NodeClass {
            name: "default".into(),
            ..Default::default()
        };
        let ctx = context(&node_class, &ClusterNetwork::default());
        let it = ctx.build(&quota(), offerings(), &[]).unwrap();

        assert_eq!(it.name, "S5.LARGE8");
        assert_eq!(it.capacity.pods(), 110);
        assert_eq!(it.overhead.kube_reserved.cpu_millis(), 80);
        assert_eq!(it.overhead.kube_reserved.memory_bytes(), 1843 * MIB);
        assert_eq!(it.overhead.eviction_threshold.memory_bytes(), 100 * MIB);

        let allocatable = it.allocatable();
        assert_eq!(allocatable.cpu_millis(), 4000 - 80);
        assert_eq!(
            allocatable.memory_bytes(),
            it.capacity.memory_bytes() - 1843 * MIB - 100 * MIB
        );
        assert_eq!(it.cheapest_available().unwrap().zone, "ap-guangzhou-3");
        assert!(!it.has_available(CapacityType::Spot));
    }

    #[test]
    fn test_cluster_network_caps_pods() {
        let network = ClusterNetwork {
            network_type: "GR".into(),
            max_node_pod_num: Some(32),
            ..Default::default()
        };
        let node_class = NodeClass::default();
        let eni = vec![PodLimits {
            instance_type: "S5.LARGE8".into(),
            pod_limits: PodLimitValues {
                route_eni_static_ip: Some(90),
                ..Default::default()
            },
        }];

        let it = context(&node_class, &network)
            .build(&quota(), offerings(), &eni)
            .unwrap();
        assert_eq!(it.capacity.pods(), 29);
        assert!(!it.capacity.contains(names::ENI_IP));
        assert!(!it.capacity.contains(names::EIP));
    }

    #[test]
    fn test_node_class_max_pods_wins_over_network() {
        let network = ClusterNetwork {
            network_type: "GR".into(),
            max_node_pod_num: Some(32),
            ..Default::default()
        };
        let node_class = NodeClass {
            kubelet: KubeletSettings {
                max_pods: Some(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let it = context(&node_class, &network)
            .build(&quota(), offerings(), &[])
            .unwrap();
        assert_eq!(it.capacity.pods(), 50);
    }

    #[test]
    fn test_malformed_overrides_fail_context() {
        let node_class = NodeClass {
            kubelet: KubeletSettings {
                kube_reserved: BTreeMap::from([("memory".to_string(), "lots".to_string())]),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = InstanceTypeContext::new(
            CapacityCalculator::default(),
            "v1.30.0",
            &node_class,
            &ClusterNetwork::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuantity { .. }));
    }

    #[test]
    fn test_bad_eviction_percentage_fails_build() {
        let node_class = NodeClass {
            kubelet: KubeletSettings {
                eviction_hard: BTreeMap::from([(
                    "memory.available".to_string(),
                    "x%".to_string(),
                )]),
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = context(&node_class, &ClusterNetwork::default());
        assert!(matches!(
            ctx.build(&quota(), offerings(), &[]),
            Err(ConfigError::InvalidPercentage { .. })
        ));
    }
}
