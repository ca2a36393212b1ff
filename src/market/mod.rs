//! Permit market
//!
//! A market turns a list of bids into one clearing price and a per-lab permit
//! allocation. Mechanisms share the [`MarketMechanism`] contract so the step
//! orchestrator never depends on a particular clearing rule.

pub mod auction;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::types::{LabId, SimRng};

pub use auction::PermitMarket;

/// One lab's demand: `quantity` permits at up to `price_per_unit` each
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub lab_id: LabId,
    pub quantity: u64,
    pub price_per_unit: f64,
}

impl Bid {
    pub fn new(lab_id: LabId, quantity: u64, price_per_unit: f64) -> Self {
        debug_assert!(price_per_unit >= 0.0, "negative bid from {lab_id}");
        Self {
            lab_id,
            quantity,
            price_per_unit,
        }
    }
}

/// Result of one clearing round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Uniform price every winner pays per permit
    pub clearing_price: f64,
    /// Permits per bidder; every bidder appears, losers with 0
    pub permits: BTreeMap<LabId, u64>,
}

impl Allocation {
    /// Allocation where every bidder starts with zero permits
    pub fn empty_for(bids: &[Bid], clearing_price: f64) -> Self {
        Self {
            clearing_price,
            permits: bids.iter().map(|b| (b.lab_id, 0)).collect(),
        }
    }

    pub fn permits_for(&self, lab_id: LabId) -> u64 {
        self.permits.get(&lab_id).copied().unwrap_or(0)
    }

    pub fn total_allocated(&self) -> u64 {
        self.permits.values().sum()
    }
}

/// Shared contract of all clearing mechanisms
pub trait MarketMechanism {
    /// Resolve a clearing price and allocate the supply among `bids`
    ///
    /// Mechanisms that ration randomly draw from `rng`; deterministic ones
    /// leave it untouched.
    fn allocate(&mut self, bids: &[Bid], rng: &mut SimRng) -> Allocation;

    /// Price set by the most recent `allocate` call
    fn current_price(&self) -> f64;

    /// Permits available per round
    fn max_supply(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allocation_lists_every_bidder() {
        let bids = vec![Bid::new(LabId(2), 3, 1.0), Bid::new(LabId(1), 1, 4.0)];
        let allocation = Allocation::empty_for(&bids, 0.0);
        assert_eq!(allocation.permits.len(), 2);
        assert_eq!(allocation.permits_for(LabId(1)), 0);
        assert_eq!(allocation.permits_for(LabId(9)), 0);
        assert_eq!(allocation.total_allocated(), 0);
    }
}
