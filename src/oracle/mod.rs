//! Oracle module for price feeds.
//!
//! Prices enter the protocol only through signed attestations from
//! authorized signers, each carrying a nonce strictly greater than the last
//! one accepted for its symbol. Reads fail once a price is older than the
//! validity window.

pub mod attestation;
pub mod price_feed;

pub use attestation::*;
pub use price_feed::*;
