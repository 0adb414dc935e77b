//! Protocol configuration and parameters.
//!
//! Parameters are grouped per component:
//! - Oracle: price validity window
//! - Collateral: per-symbol ratios, penalty, stability fee and debt ceiling
//! - Auctions: durations, price bounds and lot caps
//!
//! Prices, ratios and factors are 18-decimal fixed point (wad).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::validation::*;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Oracle parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Seconds a price stays usable after its update
    pub validity_window: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            validity_window: PRICE_VALIDITY_WINDOW_SECS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of one collateral type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Oracle symbol of the collateral token
    pub symbol: String,
    /// Native decimals of the collateral token
    pub decimals: u8,
    /// Minimum ratio accepted when producing stable (wad)
    pub minimum_collateral_ratio: u128,
    /// Ratio below which positions can be liquidated (wad)
    pub liquidation_threshold: u128,
    /// Penalty charged on liquidation, in basis points of the debt
    pub liquidation_penalty_bps: u128,
    /// Annual stability fee (wad, 0.05e18 = 5% per year)
    pub stability_fee_rate: u128,
    /// Maximum debt backed by this collateral (stable units)
    pub debt_ceiling: u128,
}

impl CollateralConfig {
    /// Collateral type with default risk parameters
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            minimum_collateral_ratio: MIN_COLLATERAL_RATIO,
            liquidation_threshold: LIQUIDATION_THRESHOLD,
            liquidation_penalty_bps: LIQUIDATION_PENALTY_BPS,
            stability_fee_rate: STABILITY_FEE_RATE,
            debt_ceiling: u128::MAX,
        }
    }

    /// Set the minimum collateral ratio and liquidation threshold
    pub fn with_ratios(mut self, minimum: u128, threshold: u128) -> Self {
        self.minimum_collateral_ratio = minimum;
        self.liquidation_threshold = threshold;
        self
    }

    /// Set the liquidation penalty
    pub fn with_penalty_bps(mut self, bps: u128) -> Self {
        self.liquidation_penalty_bps = bps;
        self
    }

    /// Set the annual stability fee
    pub fn with_stability_fee(mut self, rate: u128) -> Self {
        self.stability_fee_rate = rate;
        self
    }

    /// Set the debt ceiling
    pub fn with_debt_ceiling(mut self, ceiling: u128) -> Self {
        self.debt_ceiling = ceiling;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        validate_symbol(&self.symbol)?;
        validate_decimals(self.decimals)?;
        validate_bps(self.liquidation_penalty_bps, "liquidation_penalty_bps")?;
        if self.liquidation_threshold <= WAD {
            return Err(Error::InvalidParameter {
                name: "liquidation_threshold".into(),
                reason: "must exceed 100%".into(),
            });
        }
        if self.minimum_collateral_ratio < self.liquidation_threshold {
            return Err(Error::InvalidParameter {
                name: "minimum_collateral_ratio".into(),
                reason: "must be at least the liquidation threshold".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral auction parameters (shared by every collateral symbol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAuctionConfig {
    /// Seconds for a lot to decay from upper to lower bound
    pub duration: u64,
    /// Starting price as a multiple of the bucket price (wad)
    pub upper_bound_factor: u128,
    /// Floor price as a multiple of the bucket price (wad)
    pub lower_bound_factor: u128,
    /// Width of a price bucket (wad USD)
    pub price_step: u128,
}

impl Default for CollateralAuctionConfig {
    fn default() -> Self {
        Self {
            duration: AUCTION_DURATION_SECS,
            upper_bound_factor: COLLATERAL_UPPER_BOUND_FACTOR,
            lower_bound_factor: COLLATERAL_LOWER_BOUND_FACTOR,
            price_step: PRICE_INDEX_STEP,
        }
    }
}

impl CollateralAuctionConfig {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        validate_duration(self.duration)?;
        validate_price_bounds(self.lower_bound_factor, self.upper_bound_factor)?;
        validate_non_zero(self.price_step)
    }
}

/// Debt auction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAuctionConfig {
    /// Seconds for the price to rise from lower to upper bound
    pub duration: u64,
    /// Starting price, stable per governance token (wad)
    pub lower_bound_cost: u128,
    /// Final price, stable per governance token (wad)
    pub upper_bound_cost: u128,
    /// Largest lot as a fraction of the outstanding deficit (wad)
    pub max_lot_amount_factor: u128,
}

impl Default for DebtAuctionConfig {
    fn default() -> Self {
        Self {
            duration: AUCTION_DURATION_SECS,
            lower_bound_cost: WAD / 2,
            upper_bound_cost: 2 * WAD,
            max_lot_amount_factor: DEBT_MAX_LOT_FACTOR,
        }
    }
}

impl DebtAuctionConfig {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        validate_duration(self.duration)?;
        validate_price_bounds(self.lower_bound_cost, self.upper_bound_cost)?;
        validate_unit_factor(self.max_lot_amount_factor, "max_lot_amount_factor")
    }
}

/// Surplus auction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusAuctionConfig {
    /// Seconds a lot accepts bids
    pub duration: u64,
    /// Lowest acceptable bid, governance per stable (wad)
    pub lower_bound_cost: u128,
    /// Highest acceptable bid, governance per stable (wad)
    pub upper_bound_cost: u128,
    /// Largest lot as a fraction of auctionable surplus (wad)
    pub max_lot_amount_factor: u128,
    /// Surplus kept back from auctions (stable units)
    pub surplus_buffer: u128,
}

impl Default for SurplusAuctionConfig {
    fn default() -> Self {
        Self {
            duration: AUCTION_DURATION_SECS,
            lower_bound_cost: WAD / 2,
            upper_bound_cost: 2 * WAD,
            max_lot_amount_factor: SURPLUS_MAX_LOT_FACTOR,
            surplus_buffer: 0,
        }
    }
}

impl SurplusAuctionConfig {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        validate_duration(self.duration)?;
        validate_price_bounds(self.lower_bound_cost, self.upper_bound_cost)?;
        validate_unit_factor(self.max_lot_amount_factor, "max_lot_amount_factor")
    }
}

fn validate_duration(duration: u64) -> Result<()> {
    if duration == 0 {
        return Err(Error::InvalidParameter {
            name: "duration".into(),
            reason: "cannot be zero".into(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol version
    pub version: String,
    /// Stable asset symbol
    pub stable_symbol: String,
    /// Stable asset decimals
    pub stable_decimals: u8,
    /// Governance token symbol
    pub governance_symbol: String,
    /// Governance token decimals
    pub governance_decimals: u8,
    /// Oracle parameters
    pub oracle: OracleConfig,
    /// Supported collateral types
    pub collaterals: Vec<CollateralConfig>,
    /// Collateral auction parameters
    pub collateral_auction: CollateralAuctionConfig,
    /// Debt auction parameters
    pub debt_auction: DebtAuctionConfig,
    /// Surplus auction parameters
    pub surplus_auction: SurplusAuctionConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            stable_symbol: "USDS".to_string(),
            stable_decimals: STABLE_DECIMALS,
            governance_symbol: "GOV".to_string(),
            governance_decimals: GOVERNANCE_DECIMALS,
            oracle: OracleConfig::default(),
            collaterals: vec![CollateralConfig::new("ETH", 18)],
            collateral_auction: CollateralAuctionConfig::default(),
            debt_auction: DebtAuctionConfig::default(),
            surplus_auction: SurplusAuctionConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Replace the collateral list
    pub fn with_collaterals(mut self, collaterals: Vec<CollateralConfig>) -> Self {
        self.collaterals = collaterals;
        self
    }

    /// Add a collateral type
    pub fn with_collateral(mut self, collateral: CollateralConfig) -> Self {
        self.collaterals.push(collateral);
        self
    }

    /// Set the stable asset decimals
    pub fn with_stable_decimals(mut self, decimals: u8) -> Self {
        self.stable_decimals = decimals;
        self
    }

    /// Set the oracle validity window
    pub fn with_validity_window(mut self, secs: u64) -> Self {
        self.oracle.validity_window = secs;
        self
    }

    /// Set the surplus buffer
    pub fn with_surplus_buffer(mut self, buffer: u128) -> Self {
        self.surplus_auction.surplus_buffer = buffer;
        self
    }

    /// Look up a collateral type
    pub fn collateral(&self, symbol: &str) -> Option<&CollateralConfig> {
        self.collaterals.iter().find(|c| c.symbol == symbol)
    }

    /// Validate all parameters
    pub fn validate(&self) -> Result<()> {
        validate_symbol(&self.stable_symbol)?;
        validate_symbol(&self.governance_symbol)?;
        validate_decimals(self.stable_decimals)?;
        validate_decimals(self.governance_decimals)?;
        validate_duration(self.oracle.validity_window)?;

        for (i, collateral) in self.collaterals.iter().enumerate() {
            collateral.validate()?;
            if self.collaterals[..i].iter().any(|c| c.symbol == collateral.symbol) {
                return Err(Error::InvalidParameter {
                    name: "collaterals".into(),
                    reason: format!("duplicate symbol {}", collateral.symbol),
                });
            }
        }

        self.collateral_auction.validate()?;
        self.debt_auction.validate()?;
        self.surplus_auction.validate()
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collateral("ETH").unwrap().minimum_collateral_ratio, MIN_COLLATERAL_RATIO);
        assert!(config.collateral("BTC").is_none());
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let config = ProtocolConfig::default()
            .with_collaterals(vec![CollateralConfig::new("ETH", 18).with_ratios(WAD, 15 * WAD / 10)]);
        assert!(config.validate().is_err());

        let config = ProtocolConfig::default()
            .with_collaterals(vec![CollateralConfig::new("ETH", 18).with_ratios(WAD, WAD)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_collateral_rejected() {
        let config = ProtocolConfig::default().with_collateral(CollateralConfig::new("ETH", 6));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auction_bounds_validated() {
        let mut config = ProtocolConfig::default();
        config.debt_auction.lower_bound_cost = 3 * WAD;
        assert!(config.validate().is_err());

        let mut config = ProtocolConfig::default();
        config.surplus_auction.max_lot_amount_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ProtocolConfig::default()
            .with_collateral(CollateralConfig::new("USDC", 6).with_stability_fee(WAD / 20))
            .with_surplus_buffer(100);

        let json = config.to_json().unwrap();
        let parsed = ProtocolConfig::from_json(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_json_validates() {
        let mut config = ProtocolConfig::default();
        config.oracle.validity_window = 0;
        let json = serde_json::to_string(&config).unwrap();
        assert!(ProtocolConfig::from_json(&json).is_err());
    }
}
