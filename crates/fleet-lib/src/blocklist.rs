//! Failure and blocklist cache
//!
//! Tracks two things per `(instance type, capacity type, zone)` pattern:
//! - a sliding-window count of insufficient-capacity failures
//! - a short-lived "blocked" flag with the reason it was set
//!
//! Any dimension of a pattern may be [`Scope::Any`]. A query for a concrete
//! triple is blocked when any of the eight exact/wildcard combinations of
//! that triple is blocked, so `(*, *, *)` acts as a global kill switch.

use crate::clock::Clock;
use crate::models::CapacityType;
use crate::observability::{FleetMetrics, StructuredLogger};
use crate::ttl::TtlCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default window for insufficient-capacity counts
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default lifetime of a block
pub const DEFAULT_BLOCK_TTL: Duration = Duration::from_secs(10 * 60);

/// One dimension of a failure pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope<T> {
    Any,
    Exact(T),
}

impl<T> Scope<T> {
    pub fn matches(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        match self {
            Scope::Any => true,
            Scope::Exact(v) => v == value,
        }
    }
}

impl<T> From<Option<T>> for Scope<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scope::Any, Scope::Exact)
    }
}

impl<T: fmt::Display> fmt::Display for Scope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Any => write!(f, "*"),
            Scope::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// A possibly-wildcarded `(instance type, capacity type, zone)` pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureKey {
    pub instance_type: Scope<String>,
    pub capacity_type: Scope<CapacityType>,
    pub zone: Scope<String>,
}

impl FailureKey {
    pub fn new(
        instance_type: Scope<String>,
        capacity_type: Scope<CapacityType>,
        zone: Scope<String>,
    ) -> Self {
        Self {
            instance_type,
            capacity_type,
            zone,
        }
    }

    /// Fully concrete pattern
    pub fn exact(instance_type: &str, capacity_type: CapacityType, zone: &str) -> Self {
        Self::new(
            Scope::Exact(instance_type.to_string()),
            Scope::Exact(capacity_type),
            Scope::Exact(zone.to_string()),
        )
    }

    /// Any instance type for a capacity type in a zone
    pub fn any_instance_type(capacity_type: CapacityType, zone: &str) -> Self {
        Self::new(
            Scope::Any,
            Scope::Exact(capacity_type),
            Scope::Exact(zone.to_string()),
        )
    }

    /// Every pattern that would cover the concrete triple, exact first
    pub fn covering(instance_type: &str, capacity_type: CapacityType, zone: &str) -> [FailureKey; 8] {
        let it = |exact: bool| {
            if exact {
                Scope::Exact(instance_type.to_string())
            } else {
                Scope::Any
            }
        };
        let ct = |exact: bool| {
            if exact {
                Scope::Exact(capacity_type)
            } else {
                Scope::Any
            }
        };
        let z = |exact: bool| {
            if exact {
                Scope::Exact(zone.to_string())
            } else {
                Scope::Any
            }
        };
        [
            Self::new(it(true), ct(true), z(true)),
            Self::new(it(false), ct(false), z(false)),
            Self::new(it(true), ct(true), z(false)),
            Self::new(it(true), ct(false), z(true)),
            Self::new(it(true), ct(false), z(false)),
            Self::new(it(false), ct(true), z(true)),
            Self::new(it(false), ct(true), z(false)),
            Self::new(it(false), ct(false), z(true)),
        ]
    }

    pub fn matches(&self, instance_type: &str, capacity_type: CapacityType, zone: &str) -> bool {
        self.instance_type.matches(&instance_type.to_string())
            && self.capacity_type.matches(&capacity_type)
            && self.zone.matches(&zone.to_string())
    }
}

impl fmt::Display for FailureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instance_type, self.capacity_type, self.zone)
    }
}

/// Why and when a pattern was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

/// A live block as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub key: FailureKey,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_in_secs: u64,
}

/// Windows used by [`FailureCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCacheConfig {
    pub failure_window: Duration,
    pub block_ttl: Duration,
}

impl Default for FailureCacheConfig {
    fn default() -> Self {
        Self {
            failure_window: DEFAULT_FAILURE_WINDOW,
            block_ttl: DEFAULT_BLOCK_TTL,
        }
    }
}

/// Shared failure/blocklist state, constructed once and passed by reference
#[derive(Debug)]
pub struct FailureCache {
    counts: TtlCache<FailureKey, u32>,
    blocks: TtlCache<FailureKey, BlockRecord>,
    metrics: FleetMetrics,
    logger: StructuredLogger,
}

impl FailureCache {
    pub fn new(config: FailureCacheConfig, clock: Arc<dyn Clock>, logger: StructuredLogger) -> Self {
        Self {
            counts: TtlCache::new(config.failure_window, clock.clone()),
            blocks: TtlCache::new(config.block_ttl, clock),
            metrics: FleetMetrics::new(),
            logger,
        }
    }

    /// Increment the failure count for `key`, restarting its window; returns the new count
    pub fn record_insufficient_failure(&self, key: &FailureKey) -> u32 {
        let count = self
            .counts
            .update(key.clone(), |current| current.copied().unwrap_or(0) + 1);
        self.metrics.inc_insufficient_failures();
        self.logger.log_insufficient_failure(
            &key.instance_type.to_string(),
            &key.capacity_type.to_string(),
            &key.zone.to_string(),
            count,
        );
        count
    }

    /// Current count for exactly `key`; zero when absent or expired
    pub fn failure_count(&self, key: &FailureKey) -> u32 {
        self.counts.get(key).unwrap_or(0)
    }

    /// Block a pattern for the block TTL
    pub fn block(&self, key: FailureKey, reason: impl Into<String>) {
        let reason = reason.into();
        let instance_type = key.instance_type.to_string();
        let capacity_type = key.capacity_type.to_string();
        let zone = key.zone.to_string();

        self.blocks.insert(
            key,
            BlockRecord {
                reason: reason.clone(),
                blocked_at: Utc::now(),
            },
        );
        self.metrics.set_blocked(&instance_type, &capacity_type, &zone);
        self.logger
            .log_instance_type_blocked(&instance_type, &capacity_type, &zone, &reason);
    }

    /// Whether the concrete triple is covered by any live block
    pub fn is_blocked(&self, instance_type: &str, capacity_type: CapacityType, zone: &str) -> bool {
        FailureKey::covering(instance_type, capacity_type, zone)
            .iter()
            .any(|key| self.blocks.contains(key))
    }

    /// Live blocks, ordered by pattern
    pub fn blocked_entries(&self) -> Vec<BlockEntry> {
        let mut entries: Vec<BlockEntry> = self
            .blocks
            .live_entries()
            .into_iter()
            .map(|(key, record, remaining)| BlockEntry {
                key,
                reason: record.reason,
                blocked_at: record.blocked_at,
                expires_in_secs: remaining.as_secs(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn has_blocks(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Clear the blocked gauge once nothing is blocked any more
    pub fn reset_metrics_if_unblocked(&self) {
        if !self.has_blocks() {
            self.metrics.reset_blocked();
        }
    }

    /// Drop expired counts and blocks; returns the number of entries removed
    pub fn purge_expired(&self) -> usize {
        let removed = self.counts.purge_expired() + self.blocks.purge_expired();
        self.reset_metrics_if_unblocked();
        removed
    }
}
