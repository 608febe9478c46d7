//! Kubernetes resource quantities and resource lists
//!
//! Quantities are normalized to integers in a per-resource base unit:
//! CPU in millicores, memory and storage in bytes, everything else as a plain count.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const KIB: i64 = 1024;
pub const MIB: i64 = 1024 * KIB;
pub const GIB: i64 = 1024 * MIB;

/// Well-known resource names
pub mod names {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";
    pub const PODS: &str = "pods";
    pub const ENI_IP: &str = "fleet.cloud/eni-ip";
    pub const DIRECT_ENI: &str = "fleet.cloud/direct-eni";
    pub const ENI: &str = "fleet.cloud/eni";
    pub const SUB_ENI: &str = "fleet.cloud/sub-eni";
    pub const EIP: &str = "fleet.cloud/eip";
}

/// Quantity suffixes and their multipliers
const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
    ("m", 0.001),
    ("k", 1_000.0),
    ("M", 1_000_000.0),
    ("G", 1_000_000_000.0),
    ("T", 1_000_000_000_000.0),
    ("P", 1_000_000_000_000_000.0),
    ("E", 1_000_000_000_000_000_000.0),
];

/// Parse a quantity string into the base unit of `resource`
///
/// Fractional results are rounded up, matching how Kubernetes rounds
/// quantities to their smallest representable unit.
pub fn parse_quantity(resource: &str, raw: &str) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidQuantity {
        resource: resource.to_string(),
        value: raw.to_string(),
    };

    let trimmed = raw.trim();
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| trimmed.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((trimmed, 1.0));

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }

    let scaled = value * multiplier;
    let base = if resource == names::CPU {
        scaled * 1000.0
    } else {
        scaled
    };
    let rounded = base.ceil();
    // 2^63 is the first f64 outside i64
    if !rounded.is_finite() || rounded >= i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(rounded as i64)
}

/// A map of resource name to quantity in base units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, i64>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a map of quantity strings (as found in kubelet overrides)
    pub fn parse<'a, I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut list = Self::new();
        for (name, raw) in entries {
            list.insert(name.clone(), parse_quantity(name, raw)?);
        }
        Ok(list)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: i64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    /// Quantity of `name`, zero when absent
    pub fn value(&self, name: &str) -> i64 {
        self.get(name).unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn cpu_millis(&self) -> i64 {
        self.value(names::CPU)
    }

    pub fn memory_bytes(&self) -> i64 {
        self.value(names::MEMORY)
    }

    pub fn pods(&self) -> i64 {
        self.value(names::PODS)
    }

    pub fn ephemeral_storage_bytes(&self) -> i64 {
        self.value(names::EPHEMERAL_STORAGE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of this list; entries in `other` win
    pub fn merged(mut self, other: &ResourceList) -> Self {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
        self
    }

    /// Element-wise sum of several lists
    pub fn sum<'a>(lists: impl IntoIterator<Item = &'a ResourceList>) -> Self {
        let mut total = Self::new();
        for list in lists {
            for (name, value) in list.iter() {
                let entry = total.0.entry(name.to_string()).or_insert(0);
                *entry = entry.saturating_add(value);
            }
        }
        total
    }

    /// Subtract `other` from this list, keeping only names present here
    pub fn subtract(&self, other: &ResourceList) -> Self {
        let mut result = self.clone();
        for (name, value) in result.0.iter_mut() {
            *value = value.saturating_sub(other.value(name));
        }
        result
    }

    /// True when every requested quantity fits within this list
    pub fn fits(&self, requests: &ResourceList) -> bool {
        requests
            .iter()
            .all(|(name, requested)| requested <= self.value(name))
    }
}

impl FromIterator<(String, i64)> for ResourceList {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ResourceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(","))
    }
}
