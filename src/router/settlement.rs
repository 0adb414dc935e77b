//! Liquidation records and the proceeds waterfall.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::crypto::PublicKey;
use crate::utils::math::safe_sub;

/// Lifecycle of a liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    /// Collateral is on sale
    Auctioning,
    /// Lot exhausted, expired or settled early
    Settled,
    /// Lot cancelled and the position restored
    Cancelled,
}

/// Book-keeping for one position handed to a collateral auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    /// Index in the router's liquidation list
    pub id: u64,
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Global lot id in the symbol's collateral auction
    pub lot_id: u64,
    /// Price bucket of the lot
    pub price_index: u64,
    /// Bucket-local lot index
    pub lot_index: u64,
    /// Collateral handed to the auction
    pub collateral_amount: u128,
    /// Penalty charged at liquidation
    pub penalty: u128,
    /// Debt still to be covered by proceeds
    pub outstanding: Outstanding,
    /// Proceeds received so far
    pub proceeds: u128,
    /// Proceeds above everything owed, claimable by the owner
    pub extra_debt: u128,
    /// Collateral left in the lot after early settlement
    pub residual_collateral: u128,
    /// Principal never recovered
    pub deficit: u128,
    /// Current status
    pub status: LiquidationStatus,
}

impl LiquidationRecord {
    /// Whether the record still takes proceeds
    pub fn is_auctioning(&self) -> bool {
        self.status == LiquidationStatus::Auctioning
    }
}

/// What proceeds still have to pay, in payment order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outstanding {
    /// Stable principal, burned on payment
    pub principal: u128,
    /// Accrued stability fees, kept as surplus
    pub fees: u128,
    /// Liquidation penalty, kept as surplus
    pub penalty: u128,
}

impl Outstanding {
    /// Sum of all parts
    pub fn total(&self) -> u128 {
        self.principal
            .saturating_add(self.fees)
            .saturating_add(self.penalty)
    }

    /// Whether nothing is owed
    pub fn is_covered(&self) -> bool {
        self.total() == 0
    }
}

/// How a payment was split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Waterfall {
    /// Paid toward principal
    pub principal: u128,
    /// Paid toward fees
    pub fees: u128,
    /// Paid toward the penalty
    pub penalty: u128,
    /// Left over after everything owed
    pub extra: u128,
}

impl Waterfall {
    /// Part retained as protocol surplus
    pub fn to_surplus(&self) -> u128 {
        self.fees.saturating_add(self.penalty)
    }
}

/// Split `proceeds` over `outstanding` (principal, then fees, then penalty)
/// and reduce it by what was paid.
pub fn allocate(outstanding: &mut Outstanding, proceeds: u128) -> Result<Waterfall> {
    let mut left = proceeds;
    let mut take = |owed: &mut u128| -> Result<u128> {
        let paid = left.min(*owed);
        *owed = safe_sub(*owed, paid)?;
        left -= paid;
        Ok(paid)
    };

    let principal = take(&mut outstanding.principal)?;
    let fees = take(&mut outstanding.fees)?;
    let penalty = take(&mut outstanding.penalty)?;

    Ok(Waterfall {
        principal,
        fees,
        penalty,
        extra: left,
    })
}
