//! Protocol operations.
//!
//! Every state change enters the protocol as a [`ProtocolOperation`]
//! executed on behalf of the caller in a [`crate::core::access::CallContext`].
//! Operations are plain data so they can be queued, logged or replayed.

use serde::{Deserialize, Serialize};

use crate::core::access::Role;
use crate::core::config::CollateralConfig;
use crate::utils::crypto::{PublicKey, Signature};

/// Token selector for the token passthrough operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    /// The stable asset
    Stable,
    /// The governance token
    Governance,
    /// A collateral token by symbol
    Collateral(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All operations accepted by the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOperation {
    // Oracle
    /// Signed price for one symbol
    UpdatePrice {
        /// Attestation nonce
        nonce: u64,
        /// Price (wad USD)
        price: u128,
        /// Signer's recoverable signature
        signature: Signature,
        /// Symbol
        symbol: String,
    },
    /// Signed prices for several symbols under one nonce
    UpdatePrices {
        /// Attestation nonce
        nonce: u64,
        /// Signer's recoverable signature
        signature: Signature,
        /// Prices (wad USD)
        prices: Vec<u128>,
        /// Symbols, same order as prices
        symbols: Vec<String>,
    },
    /// Change the price validity window (admin)
    SetValidityWindow {
        /// Seconds
        secs: u64,
    },
    /// Authorize a price signer (admin)
    AuthorizeSigner {
        /// Signer key
        signer: PublicKey,
    },
    /// Revoke a price signer (admin)
    RevokeSigner {
        /// Signer key
        signer: PublicKey,
    },

    // Administration
    /// Grant a role (admin)
    GrantRole {
        /// Role
        role: Role,
        /// Account
        account: PublicKey,
    },
    /// Revoke a role (admin)
    RevokeRole {
        /// Role
        role: Role,
        /// Account
        account: PublicKey,
    },
    /// Register a collateral type (admin)
    AddCollateral {
        /// Collateral parameters
        config: CollateralConfig,
    },
    /// Release reserve collateral (admin)
    SweepReserve {
        /// Collateral symbol
        symbol: String,
        /// Amount
        amount: u128,
        /// Recipient
        to: PublicKey,
    },

    // Tokens
    /// Approve a spender
    Approve {
        /// Token
        asset: Asset,
        /// Spender
        spender: PublicKey,
        /// Allowance
        amount: u128,
    },
    /// Transfer tokens
    Transfer {
        /// Token
        asset: Asset,
        /// Recipient
        to: PublicKey,
        /// Amount
        amount: u128,
    },
    /// Mint tokens (caller must be a minter)
    Mint {
        /// Token
        asset: Asset,
        /// Recipient
        to: PublicKey,
        /// Amount
        amount: u128,
    },

    // Router
    /// Lock collateral and mint stable at a target ratio
    ProduceStable {
        /// Collateral to lock
        collateral_amount: u128,
        /// Target ratio (wad)
        target_ratio: u128,
        /// Collateral symbol
        symbol: String,
    },
    /// Repay debt
    RepayStable {
        /// Stable to repay
        amount: u128,
        /// Collateral symbol
        symbol: String,
    },
    /// Withdraw collateral from a position
    WithdrawCollateral {
        /// Collateral to withdraw
        amount: u128,
        /// Collateral symbol
        symbol: String,
    },
    /// Liquidate an unhealthy position (anyone)
    Liquidate {
        /// Position owner
        owner: PublicKey,
        /// Collateral symbol
        symbol: String,
    },
    /// Auction the caller's own position without penalty
    AuctionOwnCollateral {
        /// Collateral symbol
        symbol: String,
    },
    /// Withdraw residual collateral from a settled lot
    RemoveCollateral {
        /// Price bucket
        price_index: u64,
        /// Bucket-local lot index
        lot_index: u64,
        /// Amount
        amount: u128,
        /// Collateral symbol
        symbol: String,
    },
    /// Claim liquidation over-payment
    ClaimExtraDebt {
        /// Liquidation index
        index: u64,
        /// Collateral symbol
        symbol: String,
    },
    /// Close an expired collateral lot (anyone)
    ExpireLot {
        /// Price bucket
        price_index: u64,
        /// Bucket-local lot index
        lot_index: u64,
        /// Collateral symbol
        symbol: String,
    },

    // Collateral auction
    /// Put more of the caller's collateral on sale (caller needs an open
    /// position in the symbol, or the router role)
    StartCollateralAuction {
        /// Collateral symbol
        symbol: String,
        /// Price bucket
        price_index: u64,
        /// Bucket-local lot index (new or refill)
        lot_index: u64,
        /// Collateral amount
        amount: u128,
    },
    /// Buy a whole lot by position
    BuyLot {
        /// Collateral symbol
        symbol: String,
        /// Price bucket
        price_index: u64,
        /// Bucket-local lot index
        lot_index: u64,
    },
    /// Buy a whole lot by global id
    BuyLotById {
        /// Collateral symbol
        symbol: String,
        /// Global lot id
        lot_id: u64,
    },
    /// Buy part of a lot
    LiquidateLot {
        /// Collateral symbol
        symbol: String,
        /// Global lot id
        lot_id: u64,
        /// Collateral amount
        amount: u128,
    },
    /// Return an untouched lot to its position
    CancelAuction {
        /// Collateral symbol
        symbol: String,
        /// Global lot id
        lot_id: u64,
    },

    // Debt auction
    /// Open a debt lot
    StartDebtAuction {
        /// Stable amount of deficit
        amount: u128,
    },
    /// Pay stable for governance tokens
    BuyDebtLot {
        /// Stable amount
        amount: u128,
    },

    // Surplus auction
    /// Open a surplus lot
    StartSurplusAuction {
        /// Stable amount of surplus
        amount: u128,
    },
    /// Bid governance tokens for surplus
    BuySurplusLot {
        /// Stable amount
        amount: u128,
        /// Governance tokens offered
        bid: u128,
    },
    /// Withdraw an untouched surplus lot (admin)
    CancelSurplusLot {
        /// Lot id
        lot_id: u64,
    },
}

impl ProtocolOperation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::UpdatePrice { .. } => "UpdatePrice",
            Self::UpdatePrices { .. } => "UpdatePrices",
            Self::SetValidityWindow { .. } => "SetValidityWindow",
            Self::AuthorizeSigner { .. } => "AuthorizeSigner",
            Self::RevokeSigner { .. } => "RevokeSigner",
            Self::GrantRole { .. } => "GrantRole",
            Self::RevokeRole { .. } => "RevokeRole",
            Self::AddCollateral { .. } => "AddCollateral",
            Self::SweepReserve { .. } => "SweepReserve",
            Self::Approve { .. } => "Approve",
            Self::Transfer { .. } => "Transfer",
            Self::Mint { .. } => "Mint",
            Self::ProduceStable { .. } => "ProduceStable",
            Self::RepayStable { .. } => "RepayStable",
            Self::WithdrawCollateral { .. } => "WithdrawCollateral",
            Self::Liquidate { .. } => "Liquidate",
            Self::AuctionOwnCollateral { .. } => "AuctionOwnCollateral",
            Self::RemoveCollateral { .. } => "RemoveCollateral",
            Self::ClaimExtraDebt { .. } => "ClaimExtraDebt",
            Self::ExpireLot { .. } => "ExpireLot",
            Self::StartCollateralAuction { .. } => "StartCollateralAuction",
            Self::BuyLot { .. } => "BuyLot",
            Self::BuyLotById { .. } => "BuyLotById",
            Self::LiquidateLot { .. } => "LiquidateLot",
            Self::CancelAuction { .. } => "CancelAuction",
            Self::StartDebtAuction { .. } => "StartDebtAuction",
            Self::BuyDebtLot { .. } => "BuyDebtLot",
            Self::StartSurplusAuction { .. } => "StartSurplusAuction",
            Self::BuySurplusLot { .. } => "BuySurplusLot",
            Self::CancelSurplusLot { .. } => "CancelSurplusLot",
        }
    }

    /// Whether the operation only changes oracle state
    pub fn is_oracle_operation(&self) -> bool {
        matches!(
            self,
            Self::UpdatePrice { .. }
                | Self::UpdatePrices { .. }
                | Self::SetValidityWindow { .. }
                | Self::AuthorizeSigner { .. }
                | Self::RevokeSigner { .. }
        )
    }
}
