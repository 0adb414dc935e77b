//! Protocol events for state change notifications.
//!
//! Components return these from every successful mutation; the protocol
//! executor appends them to its [`EventLog`] once the whole operation has
//! committed.

use serde::{Deserialize, Serialize};

use crate::core::access::Role;
use crate::utils::crypto::{Hash, PublicKey};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Oracle Events
    /// Price accepted
    PriceUpdated(PriceUpdatedEvent),
    /// Signer authorized or revoked
    SignerChanged(SignerChangedEvent),
    /// Validity window changed
    ValidityWindowChanged(ValidityWindowChangedEvent),

    // Administration Events
    /// Role granted or revoked
    RoleChanged(RoleChangedEvent),
    /// Collateral type registered
    CollateralAdded(CollateralAddedEvent),

    // Router Events
    /// Stable produced against collateral
    StableProduced(StableProducedEvent),
    /// Debt repaid
    StableRepaid(StableRepaidEvent),
    /// Collateral withdrawn from a position
    CollateralWithdrawn(CollateralWithdrawnEvent),
    /// Position handed to a collateral auction
    PositionLiquidated(PositionLiquidatedEvent),
    /// Auction proceeds applied to a liquidation
    LiquidationSettled(LiquidationSettledEvent),
    /// Over-payment claimed by the position owner
    ExtraDebtClaimed(ExtraDebtClaimedEvent),
    /// Residual collateral taken back from a settled lot
    ResidualCollateralRemoved(ResidualCollateralRemovedEvent),
    /// Reserve collateral released by the admin
    ReserveSwept(ReserveSweptEvent),

    // Collateral Auction Events
    /// Lot created or refilled
    LotStarted(LotStartedEvent),
    /// Lot (fully or partially) bought
    LotPurchased(LotPurchasedEvent),
    /// Lot cancelled and collateral returned to its position
    AuctionCancelled(AuctionCancelledEvent),

    // Debt Auction Events
    /// Debt lot opened
    DebtAuctionStarted(DebtAuctionStartedEvent),
    /// Governance tokens sold for stable
    DebtLotPurchased(DebtLotPurchasedEvent),

    // Surplus Auction Events
    /// Surplus lot opened
    SurplusAuctionStarted(SurplusAuctionStartedEvent),
    /// Surplus sold for governance tokens
    SurplusLotPurchased(SurplusLotPurchasedEvent),
    /// Surplus lot cancelled
    SurplusLotCancelled(SurplusLotCancelledEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PriceUpdated(_) => "PriceUpdated",
            Self::SignerChanged(_) => "SignerChanged",
            Self::ValidityWindowChanged(_) => "ValidityWindowChanged",
            Self::RoleChanged(_) => "RoleChanged",
            Self::CollateralAdded(_) => "CollateralAdded",
            Self::StableProduced(_) => "StableProduced",
            Self::StableRepaid(_) => "StableRepaid",
            Self::CollateralWithdrawn(_) => "CollateralWithdrawn",
            Self::PositionLiquidated(_) => "PositionLiquidated",
            Self::LiquidationSettled(_) => "LiquidationSettled",
            Self::ExtraDebtClaimed(_) => "ExtraDebtClaimed",
            Self::ResidualCollateralRemoved(_) => "ResidualCollateralRemoved",
            Self::ReserveSwept(_) => "ReserveSwept",
            Self::LotStarted(_) => "LotStarted",
            Self::LotPurchased(_) => "LotPurchased",
            Self::AuctionCancelled(_) => "AuctionCancelled",
            Self::DebtAuctionStarted(_) => "DebtAuctionStarted",
            Self::DebtLotPurchased(_) => "DebtLotPurchased",
            Self::SurplusAuctionStarted(_) => "SurplusAuctionStarted",
            Self::SurplusLotPurchased(_) => "SurplusLotPurchased",
            Self::SurplusLotCancelled(_) => "SurplusLotCancelled",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::PriceUpdated(e) => e.timestamp,
            Self::SignerChanged(e) => e.timestamp,
            Self::ValidityWindowChanged(e) => e.timestamp,
            Self::RoleChanged(e) => e.timestamp,
            Self::CollateralAdded(e) => e.timestamp,
            Self::StableProduced(e) => e.timestamp,
            Self::StableRepaid(e) => e.timestamp,
            Self::CollateralWithdrawn(e) => e.timestamp,
            Self::PositionLiquidated(e) => e.timestamp,
            Self::LiquidationSettled(e) => e.timestamp,
            Self::ExtraDebtClaimed(e) => e.timestamp,
            Self::ResidualCollateralRemoved(e) => e.timestamp,
            Self::ReserveSwept(e) => e.timestamp,
            Self::LotStarted(e) => e.timestamp,
            Self::LotPurchased(e) => e.timestamp,
            Self::AuctionCancelled(e) => e.timestamp,
            Self::DebtAuctionStarted(e) => e.timestamp,
            Self::DebtLotPurchased(e) => e.timestamp,
            Self::SurplusAuctionStarted(e) => e.timestamp,
            Self::SurplusLotPurchased(e) => e.timestamp,
            Self::SurplusLotCancelled(e) => e.timestamp,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a signed price is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdatedEvent {
    /// Asset symbol
    pub symbol: String,
    /// New price (wad USD)
    pub price: u128,
    /// Attestation nonce
    pub nonce: u64,
    /// Signer recovered from the attestation
    pub signer: PublicKey,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a signer is authorized or revoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerChangedEvent {
    /// Signer key
    pub signer: PublicKey,
    /// True when authorized, false when revoked
    pub authorized: bool,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the validity window changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindowChangedEvent {
    /// Previous window (seconds)
    pub old_window: u64,
    /// New window (seconds)
    pub new_window: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMINISTRATION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a role changes hands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangedEvent {
    /// Role
    pub role: Role,
    /// Account
    pub account: PublicKey,
    /// True when granted, false when revoked
    pub granted: bool,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a collateral type is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAddedEvent {
    /// Collateral symbol
    pub symbol: String,
    /// Native decimals
    pub decimals: u8,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when stable is produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableProducedEvent {
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Collateral locked by this call
    pub collateral_amount: u128,
    /// Stable minted by this call
    pub stable_minted: u128,
    /// Position ratio after the call (wad)
    pub ratio: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when debt is repaid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableRepaidEvent {
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Stable burned against principal
    pub principal_repaid: u128,
    /// Stable kept as surplus for accrued fees
    pub fees_paid: u128,
    /// Remaining debt
    pub remaining_debt: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral leaves a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralWithdrawnEvent {
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Amount withdrawn
    pub amount: u128,
    /// Collateral left in the position
    pub remaining_collateral: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a position is handed to a collateral auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    /// Liquidation record index
    pub liquidation_id: u64,
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Account that triggered the liquidation
    pub keeper: PublicKey,
    /// Collateral moved to the auction
    pub collateral_amount: u128,
    /// Debt at liquidation time
    pub debt: u128,
    /// Penalty the proceeds must cover
    pub penalty: u128,
    /// Oracle price at liquidation (wad)
    pub price: u128,
    /// Lot global index
    pub lot_id: u64,
    /// Price bucket
    pub price_index: u64,
    /// Position inside the bucket
    pub lot_index: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when auction proceeds are applied to a liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSettledEvent {
    /// Liquidation record index
    pub liquidation_id: u64,
    /// Lot global index
    pub lot_id: u64,
    /// Stable received from the buyer
    pub proceeds: u128,
    /// Stable burned against principal
    pub principal_repaid: u128,
    /// Stable added to surplus (fees and penalty)
    pub surplus_added: u128,
    /// Stable credited as claimable extra
    pub extra_credited: u128,
    /// Unpaid principal written off as deficit
    pub deficit_added: u128,
    /// Collateral left over for the owner
    pub residual_collateral: u128,
    /// Whether the liquidation is complete
    pub closed: bool,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when extra debt is claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDebtClaimedEvent {
    /// Liquidation record index
    pub liquidation_id: u64,
    /// Position owner
    pub owner: PublicKey,
    /// Stable paid out
    pub amount: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when residual collateral is withdrawn from a lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualCollateralRemovedEvent {
    /// Position owner
    pub owner: PublicKey,
    /// Collateral symbol
    pub symbol: String,
    /// Price bucket
    pub price_index: u64,
    /// Position inside the bucket
    pub lot_index: u64,
    /// Amount withdrawn
    pub amount: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when reserve collateral is released
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSweptEvent {
    /// Collateral symbol
    pub symbol: String,
    /// Recipient
    pub to: PublicKey,
    /// Amount released
    pub amount: u128,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a collateral lot is created or refilled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotStartedEvent {
    /// Collateral symbol
    pub symbol: String,
    /// Lot global index
    pub lot_id: u64,
    /// Price bucket
    pub price_index: u64,
    /// Position inside the bucket
    pub lot_index: u64,
    /// Owner of the auctioned collateral
    pub owner: PublicKey,
    /// Collateral added by this call
    pub amount: u128,
    /// Starting price (wad)
    pub upper_bound_cost: u128,
    /// Floor price (wad)
    pub lower_bound_cost: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral is bought from a lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotPurchasedEvent {
    /// Collateral symbol
    pub symbol: String,
    /// Lot global index
    pub lot_id: u64,
    /// Buyer
    pub buyer: PublicKey,
    /// Collateral bought
    pub collateral_amount: u128,
    /// Stable paid
    pub cost: u128,
    /// Unit price paid (wad)
    pub price: u128,
    /// Collateral left in the lot
    pub remaining: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a lot is cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionCancelledEvent {
    /// Collateral symbol
    pub symbol: String,
    /// Lot global index
    pub lot_id: u64,
    /// Position owner
    pub owner: PublicKey,
    /// Collateral returned to the position
    pub amount: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a debt lot opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAuctionStartedEvent {
    /// Lot id
    pub lot_id: u64,
    /// Stable to raise
    pub amount: u128,
    /// Outstanding deficit at start
    pub deficit: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when governance tokens are sold in a debt lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtLotPurchasedEvent {
    /// Lot id
    pub lot_id: u64,
    /// Buyer
    pub buyer: PublicKey,
    /// Stable paid and burned
    pub stable_paid: u128,
    /// Governance tokens minted to the buyer
    pub governance_minted: u128,
    /// Price, stable per governance token (wad)
    pub price: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a surplus lot opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusAuctionStartedEvent {
    /// Lot id
    pub lot_id: u64,
    /// Stable offered
    pub amount: u128,
    /// Router surplus at start
    pub surplus: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when surplus is sold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusLotPurchasedEvent {
    /// Lot id
    pub lot_id: u64,
    /// Buyer
    pub buyer: PublicKey,
    /// Stable bought
    pub amount: u128,
    /// Governance tokens paid and burned
    pub bid: u128,
    /// Bid price, governance per stable (wad)
    pub bid_price: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a surplus lot is cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusLotCancelledEvent {
    /// Lot id
    pub lot_id: u64,
    /// Stable that was on offer
    pub amount: u128,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered record of committed events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append a batch of events
    pub fn extend(&mut self, events: impl IntoIterator<Item = ProtocolEvent>) {
        self.events.extend(events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Hash chain over all events (zero for an empty log)
    pub fn digest(&self) -> Hash {
        self.events.iter().fold(Hash::zero(), |acc, event| {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(acc.as_bytes());
            data.extend_from_slice(event.hash().as_bytes());
            Hash::sha256(&data)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::KeyPair;

    fn price_event(price: u128, timestamp: u64) -> ProtocolEvent {
        ProtocolEvent::PriceUpdated(PriceUpdatedEvent {
            symbol: "ETH".into(),
            price,
            nonce: 1,
            signer: *KeyPair::generate().public_key(),
            timestamp,
        })
    }

    #[test]
    fn test_event_types() {
        let event = price_event(2000, 1234567890);
        assert_eq!(event.event_type(), "PriceUpdated");
        assert_eq!(event.timestamp(), 1234567890);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.push(price_event(2000, 1));
        log.push(ProtocolEvent::SurplusLotCancelled(SurplusLotCancelledEvent {
            lot_id: 0,
            amount: 500,
            timestamp: 2,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("PriceUpdated").len(), 1);
        assert_eq!(log.filter_by_type("SurplusLotCancelled").len(), 1);
    }

    #[test]
    fn test_event_hash() {
        let event = price_event(2000, 1);
        assert_eq!(event.hash(), event.hash());
        assert!(!event.hash().is_zero());
    }

    #[test]
    fn test_event_log_digest() {
        let mut log = EventLog::new();
        let empty = log.digest();
        assert!(empty.is_zero());

        log.push(price_event(2000, 1));
        let one = log.digest();
        assert_ne!(empty, one);

        log.push(price_event(1000, 2));
        assert_ne!(one, log.digest());
    }
}
