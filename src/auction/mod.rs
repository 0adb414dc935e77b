//! Auctions restoring solvency.
//!
//! - Collateral auction: Dutch auction of liquidated collateral, one per symbol
//! - Debt auction: mints governance tokens to cover deficit
//! - Surplus auction: sells surplus stable for governance tokens, which are burned

pub mod collateral;
pub mod debt;
pub mod pricing;
pub mod surplus;

pub use collateral::*;
pub use debt::*;
pub use pricing::*;
pub use surplus::*;
