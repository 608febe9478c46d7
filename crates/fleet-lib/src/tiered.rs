//! Piecewise numeric evaluation for reservation curves
//!
//! Two flavours are used by the overhead calculator:
//! - [`Level`] sequences are *summed*: every range the input spans contributes,
//!   earlier ranges clamp at their `high` bound once exceeded.
//! - [`FlatLevel`] sequences are *first-match*: the first range containing the
//!   input supplies a fixed reservation and evaluation stops there.
//!
//! Levels must be supplied in ascending `low` order; nothing here sorts them.

use crate::quantity::{GIB, MIB};

/// One segment of a summed piecewise-linear curve over `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub low: i64,
    pub high: i64,
    pub base: i64,
    pub slope: f64,
}

impl Level {
    pub const fn new(low: i64, high: i64, base: i64, slope: f64) -> Self {
        Self {
            low,
            high,
            base,
            slope,
        }
    }

    /// Contribution of this segment for `value`
    ///
    /// Zero below `low`, linear inside the range, clamped at `high` above it.
    pub fn eval(&self, value: i64) -> f64 {
        if value < self.low {
            return 0.0;
        }
        let upper = value.min(self.high);
        (upper - self.low) as f64 * self.slope + self.base as f64
    }
}

/// Sum every level's contribution, truncating the total toward zero
pub fn sum_levels(levels: &[Level], value: i64) -> i64 {
    levels.iter().map(|level| level.eval(value)).sum::<f64>() as i64
}

/// A flat reservation applied when the input falls inside `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatLevel {
    pub low: i64,
    pub high: i64,
    pub reserved: i64,
}

impl FlatLevel {
    pub const fn new(low: i64, high: i64, reserved: i64) -> Self {
        Self {
            low,
            high,
            reserved,
        }
    }

    pub fn eval(&self, value: i64) -> i64 {
        if value < self.low || value >= self.high {
            return 0;
        }
        self.reserved
    }
}

/// Reservation of the first level whose range contains `value`, or zero
///
/// First match is authoritative: overlapping ranges are never summed.
pub fn first_match(levels: &[FlatLevel], value: i64) -> i64 {
    levels
        .iter()
        .map(|level| level.eval(value))
        .find(|reserved| *reserved > 0)
        .unwrap_or(0)
}

/// Kernel crash-dump reservation bands, keyed by total memory in bytes
pub const KDUMP_LEVELS: &[FlatLevel] = &[
    FlatLevel::new(1800 * MIB, 64 * GIB, 256 * MIB),
    FlatLevel::new(64 * GIB, 128 * GIB, 512 * MIB),
    FlatLevel::new(128 * GIB, i64::MAX, 768 * MIB),
];

/// Memory withheld for kdump on a machine with `memory_bytes` of RAM
pub fn kdump_reservation(memory_bytes: i64) -> i64 {
    first_match(KDUMP_LEVELS, memory_bytes)
}
