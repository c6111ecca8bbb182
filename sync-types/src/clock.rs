//! Vector clock causality tracking for tasksync.
//!
//! Every task record carries a [`VectorClock`], a map from device id to a
//! monotonically increasing counter. Comparing two clocks establishes a
//! partial causal ordering between two versions of a record without any
//! shared wall clock.
//!
//! All operations here are pure and side-effect-free: no I/O, no locking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::DeviceId;

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every entry of the left clock is <= the right, at least one strictly.
    Before,
    /// Every entry of the right clock is <= the left, at least one strictly.
    After,
    /// All entries match.
    Equal,
    /// Neither clock dominates the other - a true conflict.
    Concurrent,
}

impl ClockOrdering {
    /// The ordering seen from the other clock's perspective.
    pub fn inverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }
}

/// A per-device counter map establishing partial causal order.
///
/// Entries absent from the map are treated as 0, so clocks from devices
/// that have never seen each other still compare correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<DeviceId, u64>,
}

impl VectorClock {
    /// Create an empty clock (all counters implicitly 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the counter for a device (0 if absent).
    pub fn get(&self, device: &DeviceId) -> u64 {
        self.entries.get(device).copied().unwrap_or(0)
    }

    /// Check whether the clock has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the (device, counter) entries in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, u64)> {
        self.entries.iter().map(|(d, c)| (d, *c))
    }

    /// Return a copy with the given device's counter incremented by one.
    ///
    /// A missing entry is treated as 0, so the first increment yields 1.
    pub fn increment(&self, device: &DeviceId) -> Self {
        let mut next = self.clone();
        *next.entries.entry(device.clone()).or_insert(0) += 1;
        next
    }

    /// Compare two clocks, establishing their causal relationship.
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for device in self.entries.keys().chain(other.entries.keys()) {
            let a = self.get(device);
            let b = other.get(device);
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Pointwise maximum of every device entry present in either clock.
    ///
    /// Used after conflict resolution to establish the new causal frontier.
    /// Commutative and idempotent.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (device, counter) in &other.entries {
            let entry = merged.entries.entry(device.clone()).or_insert(0);
            if *counter > *entry {
                *entry = *counter;
            }
        }
        merged
    }
}

impl<const N: usize> From<[(DeviceId, u64); N]> for VectorClock {
    fn from(entries: [(DeviceId, u64); N]) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}
