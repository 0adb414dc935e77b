//! Debt auction.
//!
//! Covers the router's deficit by selling newly minted governance tokens for
//! stable. The governance price (stable per token) rises from
//! `lower_bound_cost` to `upper_bound_cost` over the lot duration, so waiting
//! buys fewer tokens. Stable received is burned and retires deficit.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auction::pricing::*;
use crate::core::access::CallContext;
use crate::core::config::DebtAuctionConfig;
use crate::core::token::FungibleToken;
use crate::error::{Error, Result};
use crate::protocol::events::{DebtAuctionStartedEvent, DebtLotPurchasedEvent};
use crate::router::CdpRouter;
use crate::utils::crypto::PublicKey;
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

/// Status of a debt lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtLotStatus {
    /// Accepting purchases
    Active,
    /// Fully bought
    Sold,
    /// Duration elapsed before it sold out
    Expired,
}

/// A lot of deficit offered for governance tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAuctionLot {
    /// Lot id
    pub id: u64,
    /// Stable still wanted
    pub amount: u128,
    /// Stable wanted at start
    pub initial_amount: u128,
    /// Governance tokens minted so far
    pub governance_minted: u128,
    /// Starting price (wad)
    pub lower_bound_cost: u128,
    /// Final price (wad)
    pub upper_bound_cost: u128,
    /// Lot start
    pub start_time: u64,
    /// Seconds until the final price
    pub duration: u64,
    /// Current status
    pub status: DebtLotStatus,
}

/// Governance-for-stable auction covering deficit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtAuction {
    account: PublicKey,
    stable_decimals: u8,
    governance_decimals: u8,
    config: DebtAuctionConfig,
    lots: Vec<DebtAuctionLot>,
    total_auctioned: u128,
}

impl DebtAuction {
    /// Create the debt auction
    pub fn new(stable_decimals: u8, governance_decimals: u8, config: DebtAuctionConfig) -> Self {
        Self {
            account: Self::module_account(),
            stable_decimals,
            governance_decimals,
            config,
            lots: Vec::new(),
            total_auctioned: 0,
        }
    }

    /// Module account; must be a minter of both stable and governance tokens
    pub fn module_account() -> PublicKey {
        PublicKey::module_account("debt-auction")
    }

    /// Open a lot for `amount` stable of deficit.
    ///
    /// Fails with `ExceedsMaxLot` above `deficit × max_lot_amount_factor`.
    pub fn start_auction(
        &mut self,
        ctx: &CallContext,
        router: &CdpRouter,
        amount: u128,
    ) -> Result<DebtAuctionStartedEvent> {
        validate_non_zero(amount)?;
        self.close_expired(ctx.now)?;

        let deficit = router.deficit();
        let max = wmul(deficit, self.config.max_lot_amount_factor)?;
        if amount > max {
            return Err(Error::ExceedsMaxLot { amount, max });
        }

        let id = self.lots.len() as u64;
        self.lots.push(DebtAuctionLot {
            id,
            amount,
            initial_amount: amount,
            governance_minted: 0,
            lower_bound_cost: self.config.lower_bound_cost,
            upper_bound_cost: self.config.upper_bound_cost,
            start_time: ctx.now,
            duration: self.config.duration,
            status: DebtLotStatus::Active,
        });
        self.total_auctioned = safe_add(self.total_auctioned, amount)?;

        info!(lot_id = id, amount, deficit, "debt auction started");

        Ok(DebtAuctionStartedEvent {
            lot_id: id,
            amount,
            deficit,
            timestamp: ctx.now,
        })
    }

    /// Pay `amount` stable into the active lot and receive governance tokens
    pub fn buy_lot(
        &mut self,
        ctx: &CallContext,
        router: &mut CdpRouter,
        stable: &mut dyn FungibleToken,
        governance: &mut dyn FungibleToken,
        amount: u128,
    ) -> Result<DebtLotPurchasedEvent> {
        validate_non_zero(amount)?;
        let lot = self.active_lot()?;
        if is_expired(lot.start_time, lot.duration, ctx.now) {
            return Err(Error::AuctionExpired);
        }
        if amount > lot.amount {
            return Err(Error::ExceedsMaxLot {
                amount,
                max: lot.amount,
            });
        }

        let price = rising_price(
            lot.lower_bound_cost,
            lot.upper_bound_cost,
            lot.start_time,
            lot.duration,
            ctx.now,
        )?;
        let governance_amount = from_wad(
            wdiv(to_wad(amount, self.stable_decimals)?, price)?,
            self.governance_decimals,
        )?;
        validate_non_zero(governance_amount)?;

        let buyer = ctx.caller;
        let available = stable
            .balance_of(&buyer)
            .min(stable.allowance(&buyer, &self.account));
        if available < amount {
            return Err(Error::InsufficientPayment {
                required: amount,
                available,
            });
        }

        stable.transfer_from(self.account, buyer, self.account, amount)?;
        stable.burn(self.account, amount)?;
        governance.mint(self.account, buyer, governance_amount)?;
        router.retire_deficit(amount)?;

        let lot = self.active_lot_mut()?;
        lot.amount -= amount;
        lot.governance_minted = safe_add(lot.governance_minted, governance_amount)?;
        if lot.amount == 0 {
            lot.status = DebtLotStatus::Sold;
        }
        let lot_id = lot.id;

        debug!(lot_id, amount, governance_amount, price, "debt lot bought");

        Ok(DebtLotPurchasedEvent {
            lot_id,
            buyer,
            stable_paid: amount,
            governance_minted: governance_amount,
            price,
            timestamp: ctx.now,
        })
    }

    fn close_expired(&mut self, now: u64) -> Result<()> {
        if let Some(lot) = self.lots.last_mut() {
            if lot.status == DebtLotStatus::Active {
                if !is_expired(lot.start_time, lot.duration, now) {
                    return Err(Error::AuctionInProgress);
                }
                lot.status = DebtLotStatus::Expired;
                info!(lot_id = lot.id, unsold = lot.amount, "debt lot expired");
            }
        }
        Ok(())
    }

    fn active_lot(&self) -> Result<&DebtAuctionLot> {
        self.lots
            .last()
            .filter(|lot| lot.status == DebtLotStatus::Active)
            .ok_or(Error::NoActiveLot)
    }

    fn active_lot_mut(&mut self) -> Result<&mut DebtAuctionLot> {
        self.lots
            .last_mut()
            .filter(|lot| lot.status == DebtLotStatus::Active)
            .ok_or(Error::NoActiveLot)
    }

    /// Stable still wanted by the active lot
    pub fn debt_amount(&self) -> u128 {
        self.active_lot().map(|lot| lot.amount).unwrap_or(0)
    }

    /// Stable ever offered
    pub fn total_auctioned(&self) -> u128 {
        self.total_auctioned
    }

    /// Lot by id
    pub fn lot(&self, id: u64) -> Option<&DebtAuctionLot> {
        self.lots.get(id as usize)
    }

    /// Current governance price of the active lot
    pub fn current_price(&self, now: u64) -> Result<u128> {
        let lot = self.active_lot()?;
        rising_price(lot.lower_bound_cost, lot.upper_bound_cost, lot.start_time, lot.duration, now)
    }

    /// Module account
    pub fn account(&self) -> PublicKey {
        self.account
    }
}
