//! Time-based auction price curves.
//!
//! Prices are recomputed from elapsed time on every call and never stored,
//! so lots need no scheduled ticks.

use crate::error::Result;
use crate::utils::constants::WAD;
use crate::utils::math::*;

/// Seconds since `start_time`
pub fn elapsed(start_time: u64, now: u64) -> u64 {
    now.saturating_sub(start_time)
}

/// A lot is expired once strictly more than `duration` seconds have passed
pub fn is_expired(start_time: u64, duration: u64, now: u64) -> bool {
    elapsed(start_time, now) > duration
}

/// Dutch decay: `upper` at start, falling linearly to `lower` at `duration`
pub fn decaying_price(upper: u128, lower: u128, start_time: u64, duration: u64, now: u64) -> Result<u128> {
    let spent = elapsed(start_time, now);
    if duration == 0 || spent >= duration {
        return Ok(lower);
    }
    let drop = mul_div(safe_sub(upper, lower)?, spent as u128, duration as u128)?;
    safe_sub(upper, drop)
}

/// Reverse decay: `lower` at start, rising linearly to `upper` at `duration`
pub fn rising_price(lower: u128, upper: u128, start_time: u64, duration: u64, now: u64) -> Result<u128> {
    let spent = elapsed(start_time, now);
    if duration == 0 || spent >= duration {
        return Ok(upper);
    }
    let rise = mul_div(safe_sub(upper, lower)?, spent as u128, duration as u128)?;
    safe_add(lower, rise)
}

/// Stable owed for `amount` collateral at `price`, rounded in the protocol's favour
pub fn collateral_cost(amount: u128, collateral_decimals: u8, price: u128, stable_decimals: u8) -> Result<u128> {
    let value_wad = mul_div_up(to_wad(amount, collateral_decimals)?, price, WAD)?;
    from_wad_up(value_wad, stable_decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_endpoints_and_midpoint() {
        let (upper, lower) = (1200 * WAD, 700 * WAD);

        assert_eq!(decaying_price(upper, lower, 100, 1000, 100).unwrap(), upper);
        let mid = decaying_price(upper, lower, 100, 1000, 600).unwrap();
        assert!(lower < mid && mid < upper);
        assert_eq!(mid, 950 * WAD);
        assert_eq!(decaying_price(upper, lower, 100, 1000, 1100).unwrap(), lower);
        assert_eq!(decaying_price(upper, lower, 100, 1000, 5000).unwrap(), lower);
    }

    #[test]
    fn test_decay_is_monotonic() {
        let (upper, lower) = (3 * WAD, WAD);
        let mut last = u128::MAX;
        for t in (0..=120).step_by(7) {
            let price = decaying_price(upper, lower, 0, 100, t).unwrap();
            assert!(price <= last);
            last = price;
        }
    }

    #[test]
    fn test_rising_price() {
        assert_eq!(rising_price(WAD, 3 * WAD, 0, 100, 0).unwrap(), WAD);
        assert_eq!(rising_price(WAD, 3 * WAD, 0, 100, 50).unwrap(), 2 * WAD);
        assert_eq!(rising_price(WAD, 3 * WAD, 0, 100, 100).unwrap(), 3 * WAD);
    }

    #[test]
    fn test_expiry_boundary() {
        assert!(!is_expired(0, 100, 100));
        assert!(is_expired(0, 100, 101));
    }

    #[test]
    fn test_collateral_cost_rounds_up() {
        // 10 ETH at $1000 into an 18-decimal stable
        assert_eq!(collateral_cost(10 * WAD, 18, 1000 * WAD, 18).unwrap(), 10_000 * WAD);
        // 1 wei of ETH at $1 still costs one unit of a 6-decimal stable
        assert_eq!(collateral_cost(1, 18, WAD, 6).unwrap(), 1);
        // 6-decimal collateral: 2.5 units at $2 = 5 stable
        assert_eq!(collateral_cost(2_500_000, 6, 2 * WAD, 18).unwrap(), 5 * WAD);
    }
}
