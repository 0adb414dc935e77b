//! Core modules for the stablecoin protocol.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Call context and access control
//! - Collateral positions
//! - Fungible token capability and ledger

pub mod access;
pub mod cdp;
pub mod config;
pub mod token;

pub use access::*;
pub use cdp::*;
pub use config::*;
pub use token::*;
