//! # Stablecoin Protocol
//!
//! A collateral-backed stablecoin: users lock collateral tokens in a CDP
//! router and mint a stable asset against them. Under-collateralized
//! positions are sold through descending-price collateral auctions, bad debt
//! is covered by minting governance tokens in debt auctions, and fee income
//! is sold for governance tokens in surplus auctions.
//!
//! ## Architecture
//!
//! - **Oracle**: Signed price attestations with nonce replay protection
//! - **Core**: Tokens, roles, configuration and CDP positions
//! - **Router**: Position lifecycle, global ledger and liquidation settlement
//! - **Auction**: Collateral, debt and surplus auctions
//! - **Protocol**: Operation dispatch, events and snapshots
//! - **CLI**: Operator workspace backing the `stablecoin` binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use stablecoin::prelude::*;
//!
//! let mut protocol = Protocol::new(ProtocolConfig::default(), admin)?;
//! protocol.execute(
//!     &CallContext::new(user, now),
//!     ProtocolOperation::ProduceStable {
//!         collateral_amount: 10 * WAD,
//!         target_ratio: 2 * WAD,
//!         symbol: "ETH".into(),
//!     },
//! )?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod auction;
pub mod cli;
pub mod core;
pub mod error;
pub mod oracle;
pub mod protocol;
pub mod router;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auction::{
        collateral::{CollateralAuction, Lot, LotStatus},
        debt::DebtAuction,
        surplus::SurplusAuction,
    };
    pub use crate::core::{
        access::{AccessControl, CallContext, Role},
        cdp::{CollateralPosition, PositionStatus},
        config::{CollateralConfig, ProtocolConfig},
        token::{FungibleToken, TokenLedger},
    };
    pub use crate::error::{Error, Result};
    pub use crate::oracle::{
        attestation::{AttestationVerifier, EcdsaVerifier, PriceSigner},
        price_feed::PriceOracle,
    };
    pub use crate::protocol::{
        events::ProtocolEvent,
        operations::{Asset, ProtocolOperation},
        state_machine::Protocol,
    };
    pub use crate::router::CdpRouter;
    pub use crate::utils::{
        constants::WAD,
        crypto::{Hash, PublicKey, Signature},
    };
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "stablecoin";
