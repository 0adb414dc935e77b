//! Collateralized debt positions.
//!
//! A position is keyed by (owner, collateral symbol). Its debt is the stable
//! principal minted against it plus stability fees accrued since opening.
//! The split matters at repayment and settlement: principal is burned,
//! fees are kept as protocol surplus.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::utils::crypto::PublicKey;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Collateral is held by the router
    Active,
    /// Collateral was handed to a collateral auction, settlement pending
    Liquidating {
        /// Liquidation record index
        liquidation_id: u64,
    },
}

/// Key identifying a position
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
}

impl PositionKey {
    /// Create a new key
    pub fn new(owner: PublicKey, symbol: &str) -> Self {
        Self {
            owner,
            symbol: symbol.to_string(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", &self.owner.to_hex()[..16], self.symbol)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// A user's collateral-backed debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPosition {
    /// Owner's public key
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Collateral held in custody (native decimals)
    pub collateral_amount: u128,
    /// Outstanding debt including accrued fees (stable units)
    pub debt_amount: u128,
    /// Part of `debt_amount` made of accrued stability fees
    pub accrued_fees: u128,
    /// Time the stability fee was last accrued
    pub last_accrual_time: u64,
    /// Current status
    pub status: PositionStatus,
}

impl CollateralPosition {
    /// Create an empty position
    pub fn new(owner: PublicKey, symbol: &str, now: u64) -> Self {
        Self {
            owner,
            symbol: symbol.to_string(),
            collateral_amount: 0,
            debt_amount: 0,
            accrued_fees: 0,
            last_accrual_time: now,
            status: PositionStatus::Active,
        }
    }

    /// Key of this position
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.owner, &self.symbol)
    }

    /// Stable principal (debt without fees)
    pub fn principal(&self) -> u128 {
        self.debt_amount.saturating_sub(self.accrued_fees)
    }

    /// Whether the collateral is still in router custody
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Whether there is nothing left to track
    pub fn is_empty(&self) -> bool {
        self.collateral_amount == 0 && self.debt_amount == 0
    }

    /// Accrue the stability fee up to `now`, returning the fee added
    pub fn accrue(&mut self, annual_rate: u128, now: u64) -> Result<u128> {
        let elapsed = now.saturating_sub(self.last_accrual_time);
        let fee = accrued_interest(self.debt_amount, annual_rate, elapsed)?;
        self.debt_amount = safe_add(self.debt_amount, fee)?;
        self.accrued_fees = safe_add(self.accrued_fees, fee)?;
        self.last_accrual_time = self.last_accrual_time.max(now);
        Ok(fee)
    }

    /// Reduce debt by `amount`, consuming fees first. Returns (fees, principal) removed.
    pub fn reduce_debt(&mut self, amount: u128) -> Result<(u128, u128)> {
        let amount = amount.min(self.debt_amount);
        let fees = amount.min(self.accrued_fees);
        let principal = amount - fees;
        self.accrued_fees -= fees;
        self.debt_amount = safe_sub(self.debt_amount, amount)?;
        Ok((fees, principal))
    }

    /// Remove explicit principal and fee amounts (auction settlement)
    pub fn settle(&mut self, principal: u128, fees: u128) -> Result<()> {
        self.accrued_fees = safe_sub(self.accrued_fees, fees)?;
        self.debt_amount = safe_sub(self.debt_amount, safe_add(principal, fees)?)?;
        Ok(())
    }

    /// Value of the custody collateral in stable units
    pub fn collateral_value(&self, collateral_decimals: u8, price: u128, stable_decimals: u8) -> Result<u128> {
        collateral_value(self.collateral_amount, collateral_decimals, price, stable_decimals)
    }

    /// Collateral ratio at `price` (wad). Debt-free positions are infinitely safe.
    pub fn ratio(&self, collateral_decimals: u8, price: u128, stable_decimals: u8) -> Result<u128> {
        let value = self.collateral_value(collateral_decimals, price, stable_decimals)?;
        Ok(collateral_ratio(value, self.debt_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{PUBKEY_LENGTH, SECONDS_PER_YEAR, WAD};

    fn test_pubkey() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    #[test]
    fn test_ratio() {
        let mut position = CollateralPosition::new(test_pubkey(), "ETH", 0);
        position.collateral_amount = 10 * WAD;
        position.debt_amount = 10_000 * WAD;

        assert_eq!(position.ratio(18, 2000 * WAD, 18).unwrap(), 2 * WAD);
        assert_eq!(position.ratio(18, 1000 * WAD, 18).unwrap(), WAD);

        position.debt_amount = 0;
        assert_eq!(position.ratio(18, 1000 * WAD, 18).unwrap(), u128::MAX);
    }

    #[test]
    fn test_accrue_stability_fee() {
        let mut position = CollateralPosition::new(test_pubkey(), "ETH", 0);
        position.debt_amount = 1000 * WAD;

        let fee = position.accrue(WAD / 10, SECONDS_PER_YEAR).unwrap();
        assert_eq!(fee, 100 * WAD);
        assert_eq!(position.debt_amount, 1100 * WAD);
        assert_eq!(position.principal(), 1000 * WAD);
        assert_eq!(position.last_accrual_time, SECONDS_PER_YEAR);

        // no time passed, nothing accrues
        assert_eq!(position.accrue(WAD / 10, SECONDS_PER_YEAR).unwrap(), 0);
    }

    #[test]
    fn test_reduce_debt_consumes_fees_first() {
        let mut position = CollateralPosition::new(test_pubkey(), "ETH", 0);
        position.debt_amount = 1100;
        position.accrued_fees = 100;

        assert_eq!(position.reduce_debt(150).unwrap(), (100, 50));
        assert_eq!(position.debt_amount, 950);
        assert_eq!(position.accrued_fees, 0);

        // over-repayment is capped at the outstanding debt
        assert_eq!(position.reduce_debt(5000).unwrap(), (0, 950));
        assert_eq!(position.debt_amount, 0);
    }

    #[test]
    fn test_settle_explicit_split() {
        let mut position = CollateralPosition::new(test_pubkey(), "ETH", 0);
        position.debt_amount = 1100;
        position.accrued_fees = 100;

        position.settle(1000, 40).unwrap();
        assert_eq!(position.debt_amount, 60);
        assert_eq!(position.accrued_fees, 60);
        assert_eq!(position.principal(), 0);

        assert!(position.settle(0, 61).is_err());
    }
}
