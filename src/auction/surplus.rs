//! Surplus auction.
//!
//! Sells stable held by the router as surplus for governance tokens, which
//! are burned. A bid is the governance amount offered for a stable amount;
//! its unit price (governance per stable) must fall within the configured
//! bounds. Bids are not collected: the first bid in bounds is the
//! acceptable bid and fills immediately, so there is no bidding window.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auction::pricing::is_expired;
use crate::core::access::{AccessControl, CallContext, Role};
use crate::core::config::SurplusAuctionConfig;
use crate::core::token::FungibleToken;
use crate::error::{Error, Result};
use crate::protocol::events::*;
use crate::router::CdpRouter;
use crate::utils::constants::WAD;
use crate::utils::crypto::PublicKey;
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

/// Status of a surplus lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurplusLotStatus {
    /// Accepting bids
    Active,
    /// Fully bought
    Sold,
    /// Duration elapsed before it sold out
    Expired,
    /// Withdrawn by the admin
    Cancelled,
}

/// A lot of surplus stable on offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusAuctionLot {
    /// Lot id
    pub id: u64,
    /// Stable still on offer
    pub amount: u128,
    /// Stable offered at start
    pub initial_amount: u128,
    /// Governance tokens burned so far
    pub governance_burned: u128,
    /// Lowest acceptable bid price (wad)
    pub lower_bound_cost: u128,
    /// Highest acceptable bid price (wad)
    pub upper_bound_cost: u128,
    /// Lot start
    pub start_time: u64,
    /// Seconds the lot accepts bids
    pub duration: u64,
    /// Current status
    pub status: SurplusLotStatus,
}

/// Stable-for-governance auction draining surplus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurplusAuction {
    account: PublicKey,
    stable_decimals: u8,
    governance_decimals: u8,
    config: SurplusAuctionConfig,
    lots: Vec<SurplusAuctionLot>,
    total_auctioned: u128,
}

impl SurplusAuction {
    /// Create the surplus auction
    pub fn new(stable_decimals: u8, governance_decimals: u8, config: SurplusAuctionConfig) -> Self {
        Self {
            account: Self::module_account(),
            stable_decimals,
            governance_decimals,
            config,
            lots: Vec::new(),
            total_auctioned: 0,
        }
    }

    /// Module account; must be a governance minter to burn bids
    pub fn module_account() -> PublicKey {
        PublicKey::module_account("surplus-auction")
    }

    /// Open a lot of `amount` stable, capped by the surplus above the buffer
    pub fn start_auction(
        &mut self,
        ctx: &CallContext,
        router: &CdpRouter,
        amount: u128,
    ) -> Result<SurplusAuctionStartedEvent> {
        validate_non_zero(amount)?;
        self.close_expired(ctx.now)?;

        let surplus = router.surplus();
        let auctionable = surplus.saturating_sub(self.config.surplus_buffer);
        let max = wmul(auctionable, self.config.max_lot_amount_factor)?;
        if amount > max {
            return Err(Error::ExceedsMaxLot { amount, max });
        }

        let id = self.lots.len() as u64;
        self.lots.push(SurplusAuctionLot {
            id,
            amount,
            initial_amount: amount,
            governance_burned: 0,
            lower_bound_cost: self.config.lower_bound_cost,
            upper_bound_cost: self.config.upper_bound_cost,
            start_time: ctx.now,
            duration: self.config.duration,
            status: SurplusLotStatus::Active,
        });
        self.total_auctioned = safe_add(self.total_auctioned, amount)?;

        info!(lot_id = id, amount, surplus, "surplus auction started");

        Ok(SurplusAuctionStartedEvent {
            lot_id: id,
            amount,
            surplus,
            timestamp: ctx.now,
        })
    }

    /// Bid `bid` governance tokens for `amount` stable of the active lot
    pub fn buy_lot(
        &mut self,
        ctx: &CallContext,
        router: &mut CdpRouter,
        stable: &mut dyn FungibleToken,
        governance: &mut dyn FungibleToken,
        amount: u128,
        bid: u128,
    ) -> Result<SurplusLotPurchasedEvent> {
        validate_non_zero(amount)?;
        validate_non_zero(bid)?;
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

        let bid_price = mul_div(
            to_wad(bid, self.governance_decimals)?,
            WAD,
            to_wad(amount, self.stable_decimals)?,
        )?;
        if bid_price < lot.lower_bound_cost || bid_price > lot.upper_bound_cost {
            return Err(Error::BidOutOfBounds {
                bid_price,
                lower: lot.lower_bound_cost,
                upper: lot.upper_bound_cost,
            });
        }

        let buyer = ctx.caller;
        let available = governance
            .balance_of(&buyer)
            .min(governance.allowance(&buyer, &self.account));
        if available < bid {
            return Err(Error::InsufficientPayment {
                required: bid,
                available,
            });
        }

        governance.transfer_from(self.account, buyer, self.account, bid)?;
        governance.burn(self.account, bid)?;
        router.release_surplus(amount, buyer, stable)?;

        let lot = self.active_lot_mut()?;
        lot.amount -= amount;
        lot.governance_burned = safe_add(lot.governance_burned, bid)?;
        if lot.amount == 0 {
            lot.status = SurplusLotStatus::Sold;
        }
        let lot_id = lot.id;

        debug!(lot_id, amount, bid, bid_price, "surplus lot bought");

        Ok(SurplusLotPurchasedEvent {
            lot_id,
            buyer,
            amount,
            bid,
            bid_price,
            timestamp: ctx.now,
        })
    }

    /// Withdraw an untouched lot (admin only)
    pub fn cancel_lot(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        id: u64,
    ) -> Result<SurplusLotCancelledEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        let lot = self
            .lots
            .get_mut(id as usize)
            .ok_or_else(|| Error::LotNotFound(id.to_string()))?;
        if lot.status != SurplusLotStatus::Active {
            return Err(Error::LotNotOpen);
        }
        if lot.amount != lot.initial_amount {
            return Err(Error::LotHasSales);
        }
        lot.status = SurplusLotStatus::Cancelled;

        info!(lot_id = id, amount = lot.amount, "surplus lot cancelled");

        Ok(SurplusLotCancelledEvent {
            lot_id: id,
            amount: lot.amount,
            timestamp: ctx.now,
        })
    }

    fn close_expired(&mut self, now: u64) -> Result<()> {
        if let Some(lot) = self.lots.last_mut() {
            if lot.status == SurplusLotStatus::Active {
                if !is_expired(lot.start_time, lot.duration, now) {
                    return Err(Error::AuctionInProgress);
                }
                lot.status = SurplusLotStatus::Expired;
            }
        }
        Ok(())
    }

    fn active_lot(&self) -> Result<&SurplusAuctionLot> {
        self.lots
            .last()
            .filter(|lot| lot.status == SurplusLotStatus::Active)
            .ok_or(Error::NoActiveLot)
    }

    fn active_lot_mut(&mut self) -> Result<&mut SurplusAuctionLot> {
        self.lots
            .last_mut()
            .filter(|lot| lot.status == SurplusLotStatus::Active)
            .ok_or(Error::NoActiveLot)
    }

    /// Stable still on offer in the active lot
    pub fn surplus_amount(&self) -> u128 {
        self.active_lot().map(|lot| lot.amount).unwrap_or(0)
    }

    /// Stable ever offered
    pub fn total_auctioned(&self) -> u128 {
        self.total_auctioned
    }

    /// Lot by id
    pub fn lot(&self, id: u64) -> Option<&SurplusAuctionLot> {
        self.lots.get(id as usize)
    }

    /// Module account
    pub fn account(&self) -> PublicKey {
        self.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CollateralConfig;
    use crate::core::token::TokenLedger;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn admin() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn bidder() -> PublicKey {
        PublicKey::new([0x03; PUBKEY_LENGTH])
    }

    struct Fixture {
        auction: SurplusAuction,
        router: CdpRouter,
        access: AccessControl,
        stable: TokenLedger,
        governance: TokenLedger,
    }

    fn setup(surplus: u128) -> Fixture {
        let auction = SurplusAuction::new(18, 18, SurplusAuctionConfig::default());
        let mut router = CdpRouter::new(18, &[CollateralConfig::new("ETH", 18)]);
        router.book_imbalance(0, surplus);

        let mut stable = TokenLedger::new("Stable", "USDS", 18, admin());
        stable.set_minter(&admin(), admin(), true).unwrap();
        stable.mint(admin(), router.account(), surplus).unwrap();

        let mut governance = TokenLedger::new("Governance", "GOV", 18, admin());
        governance.set_minter(&admin(), admin(), true).unwrap();
        governance.set_minter(&admin(), auction.account(), true).unwrap();
        governance.mint(admin(), bidder(), 1000 * WAD).unwrap();
        governance.approve(bidder(), auction.account(), u128::MAX).unwrap();

        Fixture {
            auction,
            router,
            access: AccessControl::new(admin()),
            stable,
            governance,
        }
    }

    #[test]
    fn test_bid_within_bounds_burns_governance() {
        let mut f = setup(500 * WAD);
        let ctx = CallContext::new(bidder(), 0);
        f.auction.start_auction(&ctx, &f.router, 500 * WAD).unwrap();

        let event = f
            .auction
            .buy_lot(&ctx, &mut f.router, &mut f.stable, &mut f.governance, 500 * WAD, 400 * WAD)
            .unwrap();

        assert_eq!(event.bid_price, 8 * WAD / 10);
        assert_eq!(f.router.surplus(), 0);
        assert_eq!(f.stable.balance_of(&bidder()), 500 * WAD);
        assert_eq!(f.governance.balance_of(&bidder()), 600 * WAD);
        assert_eq!(f.governance.total_supply(), 600 * WAD);
        assert_eq!(f.auction.lot(0).unwrap().status, SurplusLotStatus::Sold);
        assert_eq!(f.auction.surplus_amount(), 0);
        assert_eq!(f.auction.total_auctioned(), 500 * WAD);
    }

    #[test]
    fn test_bid_out_of_bounds() {
        let mut f = setup(500 * WAD);
        let ctx = CallContext::new(bidder(), 0);
        f.auction.start_auction(&ctx, &f.router, 500 * WAD).unwrap();

        for bid in [100 * WAD, 1001 * WAD] {
            let result = f
                .auction
                .buy_lot(&ctx, &mut f.router, &mut f.stable, &mut f.governance, 500 * WAD, bid);
            assert!(matches!(result, Err(Error::BidOutOfBounds { .. })));
        }
        assert_eq!(f.router.surplus(), 500 * WAD);
        assert_eq!(f.governance.balance_of(&bidder()), 1000 * WAD);
    }

    #[test]
    fn test_start_capped_by_buffer() {
        let mut f = setup(500 * WAD);
        f.auction.config.surplus_buffer = 200 * WAD;
        let ctx = CallContext::new(bidder(), 0);

        let result = f.auction.start_auction(&ctx, &f.router, 400 * WAD);
        assert!(matches!(result, Err(Error::ExceedsMaxLot { max, .. }) if max == 300 * WAD));
        assert!(f.auction.start_auction(&ctx, &f.router, 300 * WAD).is_ok());
        assert!(matches!(
            f.auction.start_auction(&ctx, &f.router, WAD),
            Err(Error::AuctionInProgress)
        ));
    }

    #[test]
    fn test_cancel_lot() {
        let mut f = setup(500 * WAD);
        let ctx = CallContext::new(bidder(), 0);
        f.auction.start_auction(&ctx, &f.router, 200 * WAD).unwrap();

        assert!(matches!(
            f.auction.cancel_lot(&ctx, &f.access, 0),
            Err(Error::Unauthorized(_))
        ));
        f.auction.cancel_lot(&CallContext::new(admin(), 0), &f.access, 0).unwrap();
        assert_eq!(f.auction.lot(0).unwrap().status, SurplusLotStatus::Cancelled);

        // a cancelled lot frees the slot for a new one
        f.auction.start_auction(&ctx, &f.router, 200 * WAD).unwrap();
        f.auction
            .buy_lot(&ctx, &mut f.router, &mut f.stable, &mut f.governance, 100 * WAD, 100 * WAD)
            .unwrap();
        assert!(matches!(
            f.auction.cancel_lot(&CallContext::new(admin(), 0), &f.access, 1),
            Err(Error::LotHasSales)
        ));
    }
}
