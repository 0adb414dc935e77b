//! Input validation utilities for the stablecoin protocol.
//!
//! This module provides validation functions to ensure inputs meet
//! protocol requirements before processing.

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_TOKEN_DECIMALS, WAD};

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate a collateral symbol
pub fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() || symbol.len() > 32 {
        return Err(Error::InvalidParameter {
            name: "symbol".into(),
            reason: format!("symbol must be 1-32 bytes, got {}", symbol.len()),
        });
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::InvalidParameter {
            name: "symbol".into(),
            reason: format!("symbol {:?} contains unsupported characters", symbol),
        });
    }
    Ok(())
}

/// Validate token decimals
pub fn validate_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(Error::InvalidParameter {
            name: "decimals".into(),
            reason: format!("{} exceeds maximum {}", decimals, MAX_TOKEN_DECIMALS),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate collateralization ratio (both wad)
pub fn validate_collateral_ratio(ratio: u128, minimum: u128) -> Result<()> {
    if ratio < minimum {
        return Err(Error::RatioTooLow { ratio, minimum });
    }
    Ok(())
}

/// Validate a basis-point parameter (at most 100%)
pub fn validate_bps(value: u128, name: &str) -> Result<()> {
    if value > BPS_DIVISOR {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} bps exceeds {}", value, BPS_DIVISOR),
        });
    }
    Ok(())
}

/// Validate a wad factor in (0, 1]
pub fn validate_unit_factor(value: u128, name: &str) -> Result<()> {
    if value == 0 || value > WAD {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: "factor must be in (0, 1]".into(),
        });
    }
    Ok(())
}

/// Validate auction price bounds
pub fn validate_price_bounds(lower: u128, upper: u128) -> Result<()> {
    if lower == 0 || lower >= upper {
        return Err(Error::InvalidParameter {
            name: "bounds".into(),
            reason: format!("require 0 < lower ({}) < upper ({})", lower, upper),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate an oracle price
pub fn validate_price(price: u128) -> Result<()> {
    if price == 0 {
        return Err(Error::InvalidParameter {
            name: "price".into(),
            reason: "price cannot be zero".into(),
        });
    }
    Ok(())
}

/// Validate price timestamp is within the validity window
pub fn validate_price_freshness(symbol: &str, updated_at: u64, now: u64, window: u64) -> Result<()> {
    let age = now.saturating_sub(updated_at);
    if age > window {
        return Err(Error::StalePrice {
            symbol: symbol.into(),
            age,
            max_age: window,
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM STATE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate debt ceiling is not exceeded
pub fn validate_debt_ceiling(current_debt: u128, new_debt: u128, ceiling: u128) -> Result<()> {
    let total = current_debt.saturating_add(new_debt);
    if total > ceiling {
        return Err(Error::DebtCeilingReached {
            current: total,
            max: ceiling,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_symbol() {
        assert!(validate_symbol("ETH").is_ok());
        assert!(validate_symbol("wBTC_2").is_ok());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("ETH USD").is_err());
    }

    #[test]
    fn test_validate_collateral_ratio() {
        assert!(validate_collateral_ratio(2 * WAD, 15 * WAD / 10).is_ok());
        assert!(validate_collateral_ratio(15 * WAD / 10, 15 * WAD / 10).is_ok());
        assert!(matches!(
            validate_collateral_ratio(WAD, 15 * WAD / 10),
            Err(Error::RatioTooLow { .. })
        ));
    }

    #[test]
    fn test_validate_price_freshness() {
        let now = 1_000_000;

        assert!(validate_price_freshness("ETH", now - 10, now, 3600).is_ok());
        // exactly at the edge of the window is still valid
        assert!(validate_price_freshness("ETH", now - 3600, now, 3600).is_ok());
        assert!(matches!(
            validate_price_freshness("ETH", now - 3601, now, 3600),
            Err(Error::StalePrice { age: 3601, .. })
        ));
    }

    #[test]
    fn test_validate_bounds_and_factors() {
        assert!(validate_price_bounds(1, 2).is_ok());
        assert!(validate_price_bounds(2, 2).is_err());
        assert!(validate_price_bounds(0, 2).is_err());

        assert!(validate_unit_factor(WAD / 2, "f").is_ok());
        assert!(validate_unit_factor(0, "f").is_err());
        assert!(validate_unit_factor(WAD + 1, "f").is_err());

        assert!(validate_bps(1000, "penalty").is_ok());
        assert!(validate_bps(10_001, "penalty").is_err());
    }

    #[test]
    fn test_validate_debt_ceiling() {
        assert!(validate_debt_ceiling(50, 50, 100).is_ok());
        assert!(matches!(
            validate_debt_ceiling(50, 51, 100),
            Err(Error::DebtCeilingReached { current: 101, max: 100 })
        ));
    }
}
