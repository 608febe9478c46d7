//! Purchasable (zone, capacity type) offerings of an instance type

use crate::models::{CapacityType, RawInstanceTypeQuota};
use crate::requirements::{labels, Requirements};
use crate::zone::ZoneResolver;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One purchasable combination of an instance type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub zone: String,
    /// Numeric topology zone ID; empty when the zone could not be resolved
    pub zone_id: String,
    pub capacity_type: CapacityType,
    pub price: f64,
    pub available: bool,
}

impl Offering {
    pub fn from_quota(
        quota: &RawInstanceTypeQuota,
        capacity_type: CapacityType,
        zones: &dyn ZoneResolver,
    ) -> Self {
        Self {
            zone: quota.zone.clone(),
            zone_id: zones.id_from_zone(&quota.zone).unwrap_or_default(),
            capacity_type,
            price: quota.price.unit_price,
            available: quota.is_available(),
        }
    }

    /// Whether the offering's labels satisfy a scheduling request
    pub fn compatible(&self, requirements: &Requirements) -> bool {
        requirements.allows(labels::CAPACITY_TYPE, self.capacity_type.as_str())
            && requirements.allows(labels::TOPOLOGY_ZONE, &self.zone_id)
            && requirements.allows(labels::ZONE_NAME, &self.zone)
    }
}

/// Offerings of a single instance type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offerings(Vec<Offering>);

impl Offerings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, offering: Offering) {
        self.0.push(offering);
    }

    pub fn available(&self) -> impl Iterator<Item = &Offering> {
        self.0.iter().filter(|o| o.available)
    }

    /// Available offerings compatible with a scheduling request
    pub fn compatible<'a, 'r>(
        &'a self,
        requirements: &'r Requirements,
    ) -> impl Iterator<Item = &'a Offering> + 'r
    where
        'a: 'r,
    {
        self.available().filter(move |o| o.compatible(requirements))
    }
}

impl Deref for Offerings {
    type Target = [Offering];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Offering>> for Offerings {
    fn from(offerings: Vec<Offering>) -> Self {
        Self(offerings)
    }
}

/// Lowest-priced offering, first one wins on ties
pub fn cheapest<'a>(offerings: impl IntoIterator<Item = &'a Offering>) -> Option<&'a Offering> {
    offerings
        .into_iter()
        .fold(None, |best: Option<&Offering>, o| match best {
            Some(b) if b.price <= o.price => Some(b),
            _ => Some(o),
        })
}
