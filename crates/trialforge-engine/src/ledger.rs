//! Logical resource counter mirrored from the advisor.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Result of consuming one resource unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// A unit was available.
    Within {
        /// Units left after the decrement.
        remaining: i64,
    },
    /// No unit was available; the counter went (further) below zero.
    Overdrawn {
        /// Units left after the decrement.
        remaining: i64,
    },
}

impl Consumption {
    /// Units left after the decrement.
    pub fn remaining(self) -> i64 {
        match self {
            Consumption::Within { remaining } | Consumption::Overdrawn { remaining } => remaining,
        }
    }

    /// Whether the dispatch exceeded the known availability.
    pub fn is_anomaly(self) -> bool {
        matches!(self, Consumption::Overdrawn { .. })
    }
}

/// Resources granted minus resources consumed.
///
/// The ledger mirrors the advisor and never gates dispatch, so it may go negative.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    available: AtomicI64,
    anomalies: AtomicU64,
}

impl ResourceLedger {
    /// Ledger with no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `units`; returns the new balance.
    pub fn grant(&self, units: u32) -> i64 {
        let units = i64::from(units);
        self.available.fetch_add(units, Ordering::AcqRel) + units
    }

    /// Take one unit.
    pub fn consume(&self) -> Consumption {
        let before = self.available.fetch_sub(1, Ordering::AcqRel);
        let remaining = before - 1;
        if before <= 0 {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            Consumption::Overdrawn { remaining }
        } else {
            Consumption::Within { remaining }
        }
    }

    /// Current balance.
    pub fn available(&self) -> i64 {
        self.available.load(Ordering::Acquire)
    }

    /// How many consumptions found no unit available.
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }
}
