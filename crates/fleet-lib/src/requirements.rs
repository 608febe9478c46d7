//! Scheduling requirements in node-selector form
//!
//! Instance types advertise requirements describing the labels a node of that
//! type would carry; scheduling requests carry requirements the node must
//! satisfy. Two requirement sets are compatible when, key by key, some label
//! value (or its absence) satisfies both.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Label keys used on instance types and offerings
pub mod labels {
    pub const INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
    pub const ARCH: &str = "kubernetes.io/arch";
    pub const OS: &str = "kubernetes.io/os";
    pub const TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
    pub const WINDOWS_BUILD: &str = "node.kubernetes.io/windows-build";
    pub const CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
    pub const ZONE_NAME: &str = "fleet.cloud/zone";
    pub const INSTANCE_CPU: &str = "fleet.cloud/instance-cpu";
    pub const INSTANCE_MEMORY_GB: &str = "fleet.cloud/instance-memory-gb";
    pub const INSTANCE_FAMILY: &str = "fleet.cloud/instance-family";

    /// Keys every instance type defines; requests on other keys are left to
    /// the scheduler's own node labels.
    pub const WELL_KNOWN: &[&str] = &[
        INSTANCE_TYPE,
        ARCH,
        OS,
        TOPOLOGY_ZONE,
        WINDOWS_BUILD,
        CAPACITY_TYPE,
        ZONE_NAME,
        INSTANCE_CPU,
        INSTANCE_MEMORY_GB,
        INSTANCE_FAMILY,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A single node-selector requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: BTreeSet<String>,
    /// Minimum number of distinct values the scheduler must keep available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_values: Option<usize>,
}

impl Requirement {
    pub fn new<I, S>(key: &str, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.to_string(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            min_values: None,
        }
    }

    pub fn with_min_values(mut self, min_values: usize) -> Self {
        self.min_values = Some(min_values);
        self
    }

    /// Whether a label with `value` (or no label, for `None`) satisfies this requirement
    pub fn allows(&self, value: Option<&str>) -> bool {
        match (self.operator, value) {
            (Operator::In, Some(v)) => self.values.contains(v),
            (Operator::In, None) => false,
            (Operator::NotIn, Some(v)) => !self.values.contains(v),
            (Operator::NotIn, None) => true,
            (Operator::Exists, v) => v.is_some(),
            (Operator::DoesNotExist, v) => v.is_none(),
        }
    }

    /// Whether some label value (or absence) satisfies both requirements
    pub fn intersects(&self, other: &Requirement) -> bool {
        use Operator::*;
        match (self.operator, other.operator) {
            (In, In) => !self.values.is_disjoint(&other.values),
            (In, NotIn) => !self.values.is_subset(&other.values),
            (NotIn, In) => !other.values.is_subset(&self.values),
            (In, Exists) => !self.values.is_empty(),
            (Exists, In) => !other.values.is_empty(),
            (In, DoesNotExist) | (DoesNotExist, In) => false,
            (Exists, DoesNotExist) | (DoesNotExist, Exists) => false,
            (NotIn, _) | (_, NotIn) => true,
            (Exists, Exists) | (DoesNotExist, DoesNotExist) => true,
        }
    }
}

/// A set of requirements keyed by label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Requirement>", into = "Vec<Requirement>")]
pub struct Requirements(BTreeMap<String, Requirement>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a requirement, replacing any existing one for the same key
    pub fn add(&mut self, requirement: Requirement) {
        self.0.insert(requirement.key.clone(), requirement);
    }

    pub fn with(mut self, requirement: Requirement) -> Self {
        self.add(requirement);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.0.values()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a label `key=value` is allowed; unconstrained keys allow anything
    pub fn allows(&self, key: &str, value: &str) -> bool {
        self.get(key).map_or(true, |r| r.allows(Some(value)))
    }

    /// Whether any requirement asks the scheduler to preserve value diversity
    pub fn has_min_values(&self) -> bool {
        self.iter().any(|r| r.min_values.is_some())
    }

    /// Whether `other` (a scheduling request) can be satisfied by nodes
    /// described by `self` (an instance type's requirements)
    pub fn compatible(&self, other: &Requirements) -> bool {
        other.iter().all(|wanted| match self.get(&wanted.key) {
            Some(offered) => offered.intersects(wanted),
            None if labels::WELL_KNOWN.contains(&wanted.key.as_str()) => wanted.allows(None),
            None => true,
        })
    }
}

impl From<Vec<Requirement>> for Requirements {
    fn from(requirements: Vec<Requirement>) -> Self {
        let mut set = Self::new();
        for requirement in requirements {
            set.add(requirement);
        }
        set
    }
}

impl From<Requirements> for Vec<Requirement> {
    fn from(requirements: Requirements) -> Self {
        requirements.0.into_values().collect()
    }
}

impl FromIterator<Requirement> for Requirements {
    fn from_iter<T: IntoIterator<Item = Requirement>>(iter: T) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(key: &str, op: Operator, values: &[&str]) -> Requirement {
        Requirement::new(key, op, values.iter().copied())
    }

    #[test]
    fn test_allows() {
        let r = req(labels::ARCH, Operator::In, &["amd64"]);
        assert!(r.allows(Some("amd64")));
        assert!(!r.allows(Some("arm64")));
        assert!(!r.allows(None));

        let r = req(labels::WINDOWS_BUILD, Operator::DoesNotExist, &[]);
        assert!(r.allows(None));
        assert!(!r.allows(Some("10.0")));
    }

    #[test]
    fn test_intersects() {
        let zones = req(labels::TOPOLOGY_ZONE, Operator::In, &["100003", "100004"]);
        assert!(zones.intersects(&req(labels::TOPOLOGY_ZONE, Operator::In, &["100004"])));
        assert!(!zones.intersects(&req(labels::TOPOLOGY_ZONE, Operator::In, &["100006"])));
        assert!(zones.intersects(&req(labels::TOPOLOGY_ZONE, Operator::NotIn, &["100003"])));
        assert!(!zones.intersects(&req(
            labels::TOPOLOGY_ZONE,
            Operator::NotIn,
            &["100003", "100004"]
        )));
        assert!(!zones.intersects(&req(labels::TOPOLOGY_ZONE, Operator::DoesNotExist, &[])));

        let empty = req(labels::CAPACITY_TYPE, Operator::In, &[]);
        assert!(!empty.intersects(&req(labels::CAPACITY_TYPE, Operator::Exists, &[])));
    }

    #[test]
    fn test_compatible_sets() {
        let offered = Requirements::new()
            .with(req(labels::INSTANCE_TYPE, Operator::In, &["S5.LARGE8"]))
            .with(req(labels::ARCH, Operator::In, &["amd64"]))
            .with(req(labels::WINDOWS_BUILD, Operator::DoesNotExist, &[]));

        let wanted = Requirements::new()
            .with(req(labels::ARCH, Operator::In, &["amd64", "arm64"]))
            .with(req("team", Operator::In, &["payments"]));
        assert!(offered.compatible(&wanted));

        let arm = Requirements::new().with(req(labels::ARCH, Operator::In, &["arm64"]));
        assert!(!offered.compatible(&arm));

        let needs_gpu = Requirements::new().with(req(labels::INSTANCE_FAMILY, Operator::In, &["GN7"]));
        assert!(!offered.compatible(&needs_gpu));
    }

    #[test]
    fn test_min_values_and_serde() {
        let json = r#"[
            {"key": "node.kubernetes.io/instance-type", "operator": "Exists", "minValues": 3},
            {"key": "karpenter.sh/capacity-type", "operator": "In", "values": ["spot", "on-demand"]}
        ]"#;
        let parsed: Requirements = serde_json::from_str(json).unwrap();
        assert!(parsed.has_min_values());
        assert!(parsed.allows(labels::CAPACITY_TYPE, "spot"));
        assert!(parsed.allows(labels::ARCH, "anything"));
        assert!(!Requirements::new().has_min_values());
    }
}
