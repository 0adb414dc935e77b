//! Fixed-point arithmetic and mathematical utilities.
//!
//! Prices and ratios are 18-decimal fixed-point integers ("wad"). Token
//! amounts stay in each token's native decimals and are converted with
//! [`to_wad`] / [`from_wad`] whenever they cross a boundary. All products go
//! through a 256-bit intermediate so that `amount × price` never overflows
//! before the division brings it back into range.

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_TOKEN_DECIMALS, SECONDS_PER_YEAR, WAD, WAD_DECIMALS};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Full 128x128 -> 256 bit multiplication, returned as (high, low)
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;

    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);

    (hi, lo)
}

/// Divide a 256-bit value by `c`, returning (quotient, remainder).
/// Requires `hi < c` so the quotient fits in 128 bits.
fn div_wide(hi: u128, lo: u128, c: u128) -> (u128, u128) {
    if hi == 0 {
        return (lo / c, lo % c);
    }

    let mut rem = hi;
    let mut quot = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quot |= 1;
        }
    }
    (quot, rem)
}

/// Computes `(a * b) / c`, rounding down, with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    let (hi, lo) = full_mul(a, b);
    if hi >= c {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, c),
        });
    }
    Ok(div_wide(hi, lo, c).0)
}

/// Computes `(a * b) / c`, rounding up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    let (hi, lo) = full_mul(a, b);
    if hi >= c {
        return Err(Error::Overflow {
            operation: format!("ceil(({} * {}) / {})", a, b, c),
        });
    }
    let (quot, rem) = div_wide(hi, lo, c);
    if rem > 0 {
        safe_add(quot, 1)
    } else {
        Ok(quot)
    }
}

/// Multiply two wads
pub fn wmul(a: u128, b: u128) -> Result<u128> {
    mul_div(a, b, WAD)
}

/// Divide two wads
pub fn wdiv(a: u128, b: u128) -> Result<u128> {
    mul_div(a, WAD, b)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

fn pow10(exp: u8) -> Result<u128> {
    10u128.checked_pow(exp as u32).ok_or(Error::Overflow {
        operation: format!("10^{}", exp),
    })
}

fn check_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(Error::InvalidParameter {
            name: "decimals".into(),
            reason: format!("{} exceeds maximum {}", decimals, MAX_TOKEN_DECIMALS),
        });
    }
    Ok(())
}

/// Convert a token amount with `decimals` into an 18-decimal wad.
/// Scaling down from more than 18 decimals truncates.
pub fn to_wad(amount: u128, decimals: u8) -> Result<u128> {
    check_decimals(decimals)?;
    if decimals <= WAD_DECIMALS {
        amount
            .checked_mul(pow10(WAD_DECIMALS - decimals)?)
            .ok_or(Error::Overflow {
                operation: format!("to_wad({}, {})", amount, decimals),
            })
    } else {
        Ok(amount / pow10(decimals - WAD_DECIMALS)?)
    }
}

/// Convert a wad into a token amount with `decimals`, rounding down
pub fn from_wad(amount: u128, decimals: u8) -> Result<u128> {
    check_decimals(decimals)?;
    if decimals <= WAD_DECIMALS {
        Ok(amount / pow10(WAD_DECIMALS - decimals)?)
    } else {
        amount
            .checked_mul(pow10(decimals - WAD_DECIMALS)?)
            .ok_or(Error::Overflow {
                operation: format!("from_wad({}, {})", amount, decimals),
            })
    }
}

/// Convert a wad into a token amount with `decimals`, rounding up
pub fn from_wad_up(amount: u128, decimals: u8) -> Result<u128> {
    check_decimals(decimals)?;
    if decimals <= WAD_DECIMALS {
        let unit = pow10(WAD_DECIMALS - decimals)?;
        Ok(amount / unit + u128::from(amount % unit != 0))
    } else {
        from_wad(amount, decimals)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Value of `amount` collateral (native `collateral_decimals`) at `price`
/// (wad USD per whole token), expressed in `value_decimals` units, rounded down.
pub fn collateral_value(
    amount: u128,
    collateral_decimals: u8,
    price: u128,
    value_decimals: u8,
) -> Result<u128> {
    let value_wad = wmul(to_wad(amount, collateral_decimals)?, price)?;
    from_wad(value_wad, value_decimals)
}

/// Collateral ratio as a wad (1.5e18 = 150%). Zero debt is an infinite ratio.
///
/// Both arguments must be in the same units.
pub fn collateral_ratio(collateral_value: u128, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(collateral_value, WAD, debt).unwrap_or(u128::MAX)
}

/// Maximum debt `collateral_value` supports at `ratio` (wad), rounded down
pub fn max_debt_for(collateral_value: u128, ratio: u128) -> Result<u128> {
    if ratio == 0 {
        return Err(Error::InvalidParameter {
            name: "ratio".into(),
            reason: "cannot be zero".into(),
        });
    }
    mul_div(collateral_value, WAD, ratio)
}

/// Fee of `bps` basis points on `amount`, rounded down
pub fn calculate_fee_bps(amount: u128, bps: u128) -> Result<u128> {
    mul_div(amount, bps, BPS_DIVISOR)
}

/// Simple interest accrued on `debt` at an annual wad rate over `elapsed` seconds
pub fn accrued_interest(debt: u128, annual_rate: u128, elapsed: u64) -> Result<u128> {
    if debt == 0 || annual_rate == 0 || elapsed == 0 {
        return Ok(0);
    }
    let per_year = wmul(debt, annual_rate)?;
    mul_div(per_year, elapsed as u128, SECONDS_PER_YEAR as u128)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE BUCKETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bucket index nearest to `price` for buckets `step` wide
pub fn nearest_price_index(price: u128, step: u128) -> Result<u64> {
    if step == 0 {
        return Err(Error::InvalidParameter {
            name: "price_step".into(),
            reason: "cannot be zero".into(),
        });
    }
    let index = price / step + u128::from(price % step >= step - step / 2);
    u64::try_from(index).map_err(|_| Error::Overflow {
        operation: format!("price index for {}", price),
    })
}

/// Reference price of a bucket
pub fn bucket_price(price_index: u64, step: u128) -> Result<u128> {
    (price_index as u128).checked_mul(step).ok_or(Error::Overflow {
        operation: format!("bucket price {} * {}", price_index, step),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_arithmetic() {
        assert!(safe_add(1, 2).is_ok());
        assert!(safe_add(u128::MAX, 1).is_err());

        assert!(safe_sub(5, 3).is_ok());
        assert!(safe_sub(3, 5).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 10 ETH * $2000 overflows u128 before the division
        let amount = 10 * WAD;
        let price = 2000 * WAD;
        assert_eq!(mul_div(amount, price, WAD).unwrap(), 20_000 * WAD);

        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX).unwrap(), u128::MAX);
        assert_eq!(mul_div(u128::MAX, 3, 4).unwrap(), u128::MAX / 4 * 3 + 2);
        assert!(mul_div(u128::MAX, 2, 1).is_err());
        assert!(mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_up(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_up(9, 1, 3).unwrap(), 3);

        let big = 7 * WAD * WAD;
        assert_eq!(mul_div_up(big, 10, 3).unwrap(), mul_div(big, 10, 3).unwrap() + 1);
    }

    #[test]
    fn test_decimal_conversion_six_decimals() {
        // 1.5 USDC (6 decimals) -> 1.5 wad
        assert_eq!(to_wad(1_500_000, 6).unwrap(), 15 * WAD / 10);
        // 1.5 wad -> 1.5 USDC
        assert_eq!(from_wad(15 * WAD / 10, 6).unwrap(), 1_500_000);
        // sub-unit dust truncates down, rounds up on request
        assert_eq!(from_wad(1, 6).unwrap(), 0);
        assert_eq!(from_wad_up(1, 6).unwrap(), 1);
        // 18 decimals is the identity
        assert_eq!(to_wad(123, 18).unwrap(), 123);
        assert_eq!(from_wad(123, 18).unwrap(), 123);
    }

    #[test]
    fn test_decimal_conversion_above_wad() {
        assert_eq!(to_wad(5_000_000_000_000_000_000_000, 21).unwrap(), 5 * WAD);
        assert_eq!(from_wad(5 * WAD, 21).unwrap(), 5_000_000_000_000_000_000_000);
        assert!(to_wad(1, MAX_TOKEN_DECIMALS + 1).is_err());
    }

    #[test]
    fn test_collateral_value() {
        // 10 ETH at $2000 = 20000 stable (18 decimals)
        let value = collateral_value(10 * WAD, 18, 2000 * WAD, 18).unwrap();
        assert_eq!(value, 20_000 * WAD);

        // Same collateral valued in a 6-decimal stable
        let value = collateral_value(10 * WAD, 18, 2000 * WAD, 6).unwrap();
        assert_eq!(value, 20_000_000_000);

        // 6-decimal collateral (e.g. 2.5 units) at $3 = 7.5 stable
        let value = collateral_value(2_500_000, 6, 3 * WAD, 18).unwrap();
        assert_eq!(value, 75 * WAD / 10);
    }

    #[test]
    fn test_collateral_ratio() {
        assert_eq!(collateral_ratio(20_000, 10_000), 2 * WAD);
        assert_eq!(collateral_ratio(15_000, 10_000), 15 * WAD / 10);
        assert_eq!(collateral_ratio(1, 0), u128::MAX);
    }

    #[test]
    fn test_max_debt() {
        assert_eq!(max_debt_for(20_000 * WAD, 2 * WAD).unwrap(), 10_000 * WAD);
        assert!(max_debt_for(1, 0).is_err());
    }

    #[test]
    fn test_accrued_interest() {
        // 10% per year on 1000 over a full year
        let interest = accrued_interest(1000 * WAD, WAD / 10, SECONDS_PER_YEAR).unwrap();
        assert_eq!(interest, 100 * WAD);
        assert_eq!(accrued_interest(1000 * WAD, 0, SECONDS_PER_YEAR).unwrap(), 0);
    }

    #[test]
    fn test_fee_calculation() {
        assert_eq!(calculate_fee_bps(10_000, 1000).unwrap(), 1000);
    }

    #[test]
    fn test_nearest_price_index() {
        assert_eq!(nearest_price_index(1000 * WAD, WAD).unwrap(), 1000);
        assert_eq!(nearest_price_index(1000 * WAD + WAD / 2, WAD).unwrap(), 1001);
        assert_eq!(nearest_price_index(1000 * WAD + WAD / 2 - 1, WAD).unwrap(), 1000);
        assert_eq!(bucket_price(1000, WAD).unwrap(), 1000 * WAD);
        assert!(nearest_price_index(1, 0).is_err());
    }
}
