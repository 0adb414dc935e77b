//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Decimals of the fixed-point representation used for prices and ratios
pub const WAD_DECIMALS: u8 = 18;

/// 1.0 in 18-decimal fixed point
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u128 = 10_000;

/// Seconds in a 365-day year, used for stability fee accrual
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default stable token decimals
pub const STABLE_DECIMALS: u8 = 18;

/// Default governance token decimals
pub const GOVERNANCE_DECIMALS: u8 = 18;

/// Largest supported token decimal count
pub const MAX_TOKEN_DECIMALS: u8 = 36;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum collateral ratio accepted when producing stable - 150%
pub const MIN_COLLATERAL_RATIO: u128 = 15 * WAD / 10;

/// Ratio below which a position becomes liquidatable - 150%
pub const LIQUIDATION_THRESHOLD: u128 = 15 * WAD / 10;

/// Liquidation penalty - 10% (1000 basis points)
pub const LIQUIDATION_PENALTY_BPS: u128 = 1000;

/// Default annual stability fee - 0%
pub const STABILITY_FEE_RATE: u128 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Price validity window in seconds (1 hour)
pub const PRICE_VALIDITY_WINDOW_SECS: u64 = 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default auction duration - 6 hours
pub const AUCTION_DURATION_SECS: u64 = 6 * 3600;

/// Collateral lots start at 120% of the bucket price
pub const COLLATERAL_UPPER_BOUND_FACTOR: u128 = 12 * WAD / 10;

/// Collateral lots decay to 70% of the bucket price
pub const COLLATERAL_LOWER_BOUND_FACTOR: u128 = 7 * WAD / 10;

/// Width of a collateral price bucket ($1)
pub const PRICE_INDEX_STEP: u128 = WAD;

/// Debt auction lots may cover at most 50% of the outstanding deficit
pub const DEBT_MAX_LOT_FACTOR: u128 = WAD / 2;

/// Surplus auction lots may cover all available surplus
pub const SURPLUS_MAX_LOT_FACTOR: u128 = WAD;

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHIC CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of a public key in bytes (compressed secp256k1)
pub const PUBKEY_LENGTH: usize = 33;

/// Length of a recoverable signature in bytes (r ‖ s ‖ v)
pub const SIGNATURE_LENGTH: usize = 65;

/// Length of a hash in bytes (SHA256)
pub const HASH_LENGTH: usize = 32;

/// Domain tag prepended to every signed message
pub const MESSAGE_DOMAIN: &[u8] = b"stablecoin:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_constants() {
        assert!(MIN_COLLATERAL_RATIO >= LIQUIDATION_THRESHOLD);
        assert!(LIQUIDATION_THRESHOLD > WAD);
        assert!(LIQUIDATION_PENALTY_BPS < BPS_DIVISOR);
    }

    #[test]
    fn test_auction_bounds() {
        assert!(COLLATERAL_LOWER_BOUND_FACTOR < COLLATERAL_UPPER_BOUND_FACTOR);
        assert!(DEBT_MAX_LOT_FACTOR <= WAD);
        assert!(SURPLUS_MAX_LOT_FACTOR <= WAD);
    }
}
