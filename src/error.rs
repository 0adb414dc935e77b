//! Error types for the stablecoin protocol.
//!
//! Every rejected operation returns one of these variants and leaves state
//! untouched. [`Error::kind`] maps each variant onto the protocol's error
//! taxonomy so that callers (keepers, clients) can decide whether a retry
//! with corrected input makes sense.

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input (nonce, stale price, out-of-bounds bid or ratio)
    Validation,
    /// Caller lacks the required role or signer authorization
    Authorization,
    /// Conflicting state (lot sold, position liquidating, auction expired)
    StateConflict,
    /// Caller balance or allowance too small
    InsufficientFunds,
    /// Arithmetic, serialization or invariant failures
    Internal,
}

/// Main error type for the protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Attestation does not recover to an authorized signer
    #[error("Invalid signature")]
    InvalidSignature,

    /// Nonce is not strictly greater than the last accepted nonce
    #[error("Stale nonce {nonce} for {symbol}: last accepted {last_nonce}")]
    StaleNonce {
        /// Asset symbol
        symbol: String,
        /// Submitted nonce
        nonce: u64,
        /// Last accepted nonce
        last_nonce: u64,
    },

    /// Batched update arrays have different lengths
    #[error("Length mismatch: {prices} prices for {symbols} symbols")]
    LengthMismatch {
        /// Number of prices
        prices: usize,
        /// Number of symbols
        symbols: usize,
    },

    /// No price was ever recorded for the symbol
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Price is outside the validity window
    #[error("Price for {symbol} is stale: last update {age}s ago, max allowed {max_age}s")]
    StalePrice {
        /// Asset symbol
        symbol: String,
        /// Seconds since last update
        age: u64,
        /// Validity window in seconds
        max_age: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Router Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Collateral ratio below the configured minimum
    #[error("Collateral ratio {ratio} below minimum {minimum} (wad)")]
    RatioTooLow {
        /// Requested or resulting ratio (wad)
        ratio: u128,
        /// Minimum ratio (wad)
        minimum: u128,
    },

    /// No position for this owner and symbol
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// Position is already handed to an auction
    #[error("Position {0} is already liquidating")]
    AlreadyLiquidating(String),

    /// Position is above the liquidation threshold
    #[error("Position {0} is healthy and cannot be liquidated")]
    PositionHealthy(String),

    /// Collateral type is not configured
    #[error("Unsupported collateral: {0}")]
    UnsupportedCollateral(String),

    /// Lot has not been resolved yet
    #[error("Lot {price_index}/{lot_index} is not settled")]
    LotNotSettled {
        /// Price bucket
        price_index: u64,
        /// Position inside the bucket
        lot_index: u64,
    },

    /// Requested amount exceeds what is available
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// Nothing is claimable for this liquidation
    #[error("Nothing to claim for liquidation {0}")]
    NothingToClaim(u64),

    /// Liquidation record does not exist
    #[error("Liquidation not found: {0}")]
    LiquidationNotFound(u64),

    /// Collateral type debt ceiling reached
    #[error("Debt ceiling reached: current {current}, max {max}")]
    DebtCeilingReached {
        /// Debt after the operation
        current: u128,
        /// Configured ceiling
        max: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Auction Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Lot does not exist
    #[error("Lot not found: {0}")]
    LotNotFound(String),

    /// Auction duration elapsed
    #[error("Auction expired")]
    AuctionExpired,

    /// Buyer cannot cover the price
    #[error("Insufficient payment: required {required}, available {available}")]
    InsufficientPayment {
        /// Cost of the purchase
        required: u128,
        /// Buyer's spendable amount
        available: u128,
    },

    /// Lot was already sold
    #[error("Lot already sold")]
    LotAlreadySold,

    /// Lot is cancelled or otherwise closed
    #[error("Lot is not open")]
    LotNotOpen,

    /// Cancelling requires the price to have recovered
    #[error("Price has not recovered: ratio {ratio}, threshold {threshold} (wad)")]
    PriceNotRecovered {
        /// Current ratio (wad)
        ratio: u128,
        /// Liquidation threshold (wad)
        threshold: u128,
    },

    /// Lot would be larger than the allowed maximum
    #[error("Lot amount {amount} exceeds maximum {max}")]
    ExceedsMaxLot {
        /// Requested amount
        amount: u128,
        /// Allowed maximum
        max: u128,
    },

    /// Bid price outside the configured bounds
    #[error("Bid price {bid_price} outside bounds [{lower}, {upper}]")]
    BidOutOfBounds {
        /// Governance tokens per surplus unit (wad)
        bid_price: u128,
        /// Lower bound (wad)
        lower: u128,
        /// Upper bound (wad)
        upper: u128,
    },

    /// An auction lot is already active
    #[error("Auction already in progress")]
    AuctionInProgress,

    /// No active lot to act on
    #[error("No active lot")]
    NoActiveLot,

    /// Lot has sales and can no longer be cancelled
    #[error("Lot has already been partially settled")]
    LotHasSales,

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Spender allowance too small
    #[error("Insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance {
        /// Required allowance
        required: u128,
        /// Current allowance
        available: u128,
    },

    /// Cryptographic operation failed
    #[error("Crypto error in {operation}: {details}")]
    CryptoError {
        /// Operation that failed
        operation: String,
        /// Error details
        details: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Snapshot file I/O failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StaleNonce { .. }
            | Error::LengthMismatch { .. }
            | Error::UnknownSymbol(_)
            | Error::StalePrice { .. }
            | Error::RatioTooLow { .. }
            | Error::UnsupportedCollateral(_)
            | Error::ExceedsMaxLot { .. }
            | Error::BidOutOfBounds { .. }
            | Error::DebtCeilingReached { .. }
            | Error::InvalidParameter { .. }
            | Error::ZeroAmount => ErrorKind::Validation,

            Error::InvalidSignature
            | Error::Unauthorized(_)
            | Error::CryptoError { .. } => ErrorKind::Authorization,

            Error::PositionNotFound(_)
            | Error::AlreadyLiquidating(_)
            | Error::PositionHealthy(_)
            | Error::LotNotSettled { .. }
            | Error::NothingToClaim(_)
            | Error::LiquidationNotFound(_)
            | Error::LotNotFound(_)
            | Error::AuctionExpired
            | Error::LotAlreadySold
            | Error::LotNotOpen
            | Error::PriceNotRecovered { .. }
            | Error::AuctionInProgress
            | Error::NoActiveLot
            | Error::LotHasSales => ErrorKind::StateConflict,

            Error::InsufficientBalance { .. }
            | Error::InsufficientPayment { .. }
            | Error::InsufficientAllowance { .. } => ErrorKind::InsufficientFunds,

            Error::Overflow { .. }
            | Error::Underflow { .. }
            | Error::InvariantViolation(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying with corrected input can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::InsufficientFunds
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_) | Error::Overflow { .. } | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Oracle errors: 1xxx
            Error::InvalidSignature => 1001,
            Error::StaleNonce { .. } => 1002,
            Error::LengthMismatch { .. } => 1003,
            Error::UnknownSymbol(_) => 1004,
            Error::StalePrice { .. } => 1005,

            // Router errors: 2xxx
            Error::RatioTooLow { .. } => 2001,
            Error::PositionNotFound(_) => 2002,
            Error::AlreadyLiquidating(_) => 2003,
            Error::PositionHealthy(_) => 2004,
            Error::UnsupportedCollateral(_) => 2005,
            Error::LotNotSettled { .. } => 2006,
            Error::InsufficientBalance { .. } => 2007,
            Error::NothingToClaim(_) => 2008,
            Error::LiquidationNotFound(_) => 2009,
            Error::DebtCeilingReached { .. } => 2010,

            // Auction errors: 3xxx
            Error::LotNotFound(_) => 3001,
            Error::AuctionExpired => 3002,
            Error::InsufficientPayment { .. } => 3003,
            Error::LotAlreadySold => 3004,
            Error::LotNotOpen => 3005,
            Error::PriceNotRecovered { .. } => 3006,
            Error::ExceedsMaxLot { .. } => 3007,
            Error::BidOutOfBounds { .. } => 3008,
            Error::AuctionInProgress => 3009,
            Error::NoActiveLot => 3010,
            Error::LotHasSales => 3011,

            // Authorization errors: 4xxx
            Error::Unauthorized(_) => 4001,
            Error::InsufficientAllowance { .. } => 4002,
            Error::CryptoError { .. } => 4003,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::Overflow { .. } => 5003,
            Error::Underflow { .. } => 5004,

            // Protocol errors: 6xxx
            Error::InvariantViolation(_) => 6001,
            Error::Serialization(_) => 6002,
            Error::Deserialization(_) => 6003,
            Error::Storage(_) => 6004,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::InvalidSignature.code(),
            Error::StaleNonce { symbol: "".into(), nonce: 0, last_nonce: 0 }.code(),
            Error::RatioTooLow { ratio: 0, minimum: 0 }.code(),
            Error::AlreadyLiquidating("".into()).code(),
            Error::LotAlreadySold.code(),
            Error::BidOutOfBounds { bid_price: 0, lower: 0, upper: 0 }.code(),
            Error::Unauthorized("".into()).code(),
            Error::ZeroAmount.code(),
            Error::InvariantViolation("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::StalePrice { symbol: "ETH".into(), age: 10, max_age: 5 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::InvalidSignature.kind(), ErrorKind::Authorization);
        assert_eq!(Error::LotAlreadySold.kind(), ErrorKind::StateConflict);
        assert_eq!(
            Error::InsufficientPayment { required: 1, available: 0 }.kind(),
            ErrorKind::InsufficientFunds
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientBalance {
            required: 1000,
            available: 500,
        };
        assert!(err.to_string().contains("1000"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::StaleNonce { symbol: "ETH".into(), nonce: 1, last_nonce: 2 }.is_recoverable());
        assert!(!Error::Unauthorized("test".into()).is_recoverable());
        assert!(!Error::LotAlreadySold.is_recoverable());
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::InvariantViolation("test".into()).is_critical());
        assert!(Error::Overflow { operation: "test".into() }.is_critical());
        assert!(!Error::PositionNotFound("test".into()).is_critical());
    }
}
