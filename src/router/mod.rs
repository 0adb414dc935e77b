//! CDP router: positions, solvency ledger and liquidation settlement.

pub mod cdp_router;
pub mod settlement;

pub use cdp_router::*;
pub use settlement::*;
