//! Classification of machine creation failures
//!
//! Insufficient-capacity failures are counted and, past a threshold, escalated
//! to blocks. Every other failure blocks the offering straight away.

use crate::blocklist::{FailureCache, FailureKey};
use crate::models::CapacityType;
use crate::observability::StructuredLogger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Failure reason the vendor integration reports for rejected launches
pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";

/// Message fragments that mark a rejected launch as a capacity shortage
pub const INSUFFICIENT_MARKERS: [&str; 4] = [
    "Insufficient resources of",
    "InvalidParameterValue.InsufficientOffering",
    "ResourceInsufficient.SpecifiedInstanceType",
    "LimitExceeded.SpotQuota",
];

/// Message fragment for an exhausted per-account spot quota
pub const USER_SPOT_QUOTA_MARKER: &str = "LimitExceeded.UserSpotQuota";

/// A failed machine creation as reported by the surrounding controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub instance_type: String,
    pub capacity_type: CapacityType,
    pub zone: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl FailureReport {
    /// Whether the vendor rejected the launch for lack of capacity
    pub fn is_insufficient_capacity(&self) -> bool {
        self.reason == INVALID_CONFIGURATION
            && INSUFFICIENT_MARKERS
                .iter()
                .any(|marker| self.message.contains(marker))
    }
}

/// Counts above which a shortage stops being treated as transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub exact_threshold: u32,
    pub spot_zone_threshold: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            exact_threshold: 3,
            spot_zone_threshold: 50,
        }
    }
}

/// What the tracker did with a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Transient shortage; the caller should refresh the catalog before retrying
    Recorded {
        key: FailureKey,
        count: u32,
        refresh: bool,
    },
    /// Shortage seen too often; `key` is now blocked
    Escalated {
        key: FailureKey,
        count: u32,
        threshold: u32,
    },
    /// Hard failure; `key` is now blocked
    Blocked { key: FailureKey, reason: String },
}

impl FailureOutcome {
    pub fn needs_refresh(&self) -> bool {
        matches!(self, FailureOutcome::Recorded { refresh: true, .. })
    }
}

/// Feeds failure reports into the shared failure cache
pub struct FailureTracker {
    failures: Arc<FailureCache>,
    policy: EscalationPolicy,
    logger: StructuredLogger,
}

impl FailureTracker {
    pub fn new(failures: Arc<FailureCache>, policy: EscalationPolicy, logger: StructuredLogger) -> Self {
        Self {
            failures,
            policy,
            logger,
        }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    pub fn observe(&self, report: &FailureReport) -> FailureOutcome {
        if report.is_insufficient_capacity() {
            self.observe_shortage(report)
        } else {
            self.block_hard_failure(report)
        }
    }

    fn observe_shortage(&self, report: &FailureReport) -> FailureOutcome {
        let exact = FailureKey::exact(&report.instance_type, report.capacity_type, &report.zone);
        let count = self.failures.record_insufficient_failure(&exact);

        if report.capacity_type == CapacityType::Spot {
            let zone_wide = FailureKey::any_instance_type(CapacityType::Spot, &report.zone);
            let zone_count = self.failures.record_insufficient_failure(&zone_wide);
            if zone_count > self.policy.spot_zone_threshold {
                return self.escalate(zone_wide, zone_count, self.policy.spot_zone_threshold, report);
            }
        }

        if count > self.policy.exact_threshold {
            return self.escalate(exact, count, self.policy.exact_threshold, report);
        }

        FailureOutcome::Recorded {
            key: exact,
            count,
            refresh: true,
        }
    }

    fn escalate(
        &self,
        key: FailureKey,
        count: u32,
        threshold: u32,
        report: &FailureReport,
    ) -> FailureOutcome {
        self.logger.log_failure_escalated(
            &key.instance_type.to_string(),
            report.capacity_type.as_str(),
            &report.zone,
            count,
            threshold,
        );
        self.failures
            .block(key.clone(), format!("controller block: {}", report.message));
        FailureOutcome::Escalated {
            key,
            count,
            threshold,
        }
    }

    fn block_hard_failure(&self, report: &FailureReport) -> FailureOutcome {
        let (key, message) = if report.message.contains(USER_SPOT_QUOTA_MARKER) {
            (
                FailureKey::any_instance_type(report.capacity_type, &report.zone),
                format!("user spot quota in {} has been exceeded", report.zone),
            )
        } else {
            (
                FailureKey::exact(&report.instance_type, report.capacity_type, &report.zone),
                report.message.clone(),
            )
        };
        let reason = format!("controller block: {}", message);
        self.failures.block(key.clone(), reason.clone());
        FailureOutcome::Blocked { key, reason }
    }
}
