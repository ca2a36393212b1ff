//! Uniform-price multi-unit auction with optional fixed-price rationing

use rand::seq::index;

use crate::core::error::{ensure_non_negative, Result};
use crate::core::types::{LabId, SimRng};
use crate::market::{Allocation, Bid, MarketMechanism};

/// A single permit-unit carved out of a bid
#[derive(Debug, Clone, Copy)]
struct UnitBid {
    lab_id: LabId,
    price: f64,
}

/// The default permit market
///
/// Auction mode: every bid is expanded into unit bids, ranked by price
/// (ties by ascending lab id) and the top `max_supply` units win at the price
/// of the marginal winning unit. Fixed-price mode: every unit bid at or above
/// the fixed price qualifies; oversubscription is rationed by sampling units,
/// not labs.
#[derive(Debug, Clone)]
pub struct PermitMarket {
    max_supply: u64,
    fixed_price: Option<f64>,
    current_price: f64,
}

impl PermitMarket {
    pub fn new(max_supply: u64) -> Self {
        Self {
            max_supply,
            fixed_price: None,
            current_price: 0.0,
        }
    }

    /// Market that sells at `price` instead of running an auction
    pub fn with_fixed_price(max_supply: u64, price: f64) -> Result<Self> {
        ensure_non_negative("market.fixed_price", price)?;
        Ok(Self {
            max_supply,
            fixed_price: Some(price),
            current_price: 0.0,
        })
    }

    pub fn fixed_price(&self) -> Option<f64> {
        self.fixed_price
    }

    fn expand_units<'a>(bids: impl Iterator<Item = &'a Bid>) -> Vec<UnitBid> {
        bids.flat_map(|bid| {
            (0..bid.quantity).map(move |_| UnitBid {
                lab_id: bid.lab_id,
                price: bid.price_per_unit,
            })
        })
        .collect()
    }

    fn allocate_fixed(&self, bids: &[Bid], price: f64, rng: &mut SimRng) -> Allocation {
        let mut allocation = Allocation::empty_for(bids, price);
        let qualifying: Vec<&Bid> = bids.iter().filter(|b| b.price_per_unit >= price).collect();
        let demanded: u64 = qualifying.iter().map(|b| b.quantity).sum();

        if demanded <= self.max_supply {
            for bid in qualifying {
                *allocation.permits.entry(bid.lab_id).or_insert(0) += bid.quantity;
            }
            return allocation;
        }

        // Oversubscribed: draw winners over permit-units so large requests
        // are not favoured per firm.
        let units = Self::expand_units(qualifying.into_iter());
        let supply = self.max_supply as usize;
        for idx in index::sample(rng, units.len(), supply).into_iter() {
            *allocation.permits.entry(units[idx].lab_id).or_insert(0) += 1;
        }
        allocation
    }

    fn allocate_auction(&self, bids: &[Bid]) -> Allocation {
        let mut units = Self::expand_units(bids.iter());
        if units.is_empty() {
            return Allocation::empty_for(bids, 0.0);
        }

        units.sort_by(|a, b| {
            b.price
                .total_cmp(&a.price)
                .then_with(|| a.lab_id.cmp(&b.lab_id))
        });

        let supply = self.max_supply as usize;
        if supply >= units.len() {
            let mut allocation = Allocation::empty_for(bids, 0.0);
            for bid in bids {
                *allocation.permits.entry(bid.lab_id).or_insert(0) += bid.quantity;
            }
            return allocation;
        }

        if supply == 0 {
            // Nothing to sell: price is the best unmet bid, nobody wins
            return Allocation::empty_for(bids, units[0].price);
        }

        let clearing_price = units[supply - 1].price;
        let mut allocation = Allocation::empty_for(bids, clearing_price);
        for unit in units[..supply].iter().filter(|u| u.price >= clearing_price) {
            *allocation.permits.entry(unit.lab_id).or_insert(0) += 1;
        }
        allocation
    }
}

impl MarketMechanism for PermitMarket {
    fn allocate(&mut self, bids: &[Bid], rng: &mut SimRng) -> Allocation {
        if bids.is_empty() {
            self.current_price = 0.0;
            return Allocation::default();
        }

        let allocation = match self.fixed_price {
            Some(price) => self.allocate_fixed(bids, price, rng),
            None => self.allocate_auction(bids),
        };

        debug_assert!(allocation.total_allocated() <= self.max_supply);
        self.current_price = allocation.clearing_price;

        tracing::debug!(
            "Market cleared at {:.3}: {} of {} permits allocated",
            allocation.clearing_price,
            allocation.total_allocated(),
            self.max_supply
        );

        allocation
    }

    fn current_price(&self) -> f64 {
        self.current_price
    }

    fn max_supply(&self) -> u64 {
        self.max_supply
    }
}
