//! Collateral auction (one per collateral symbol).
//!
//! Liquidated collateral is sold in lots grouped into price buckets. Each
//! bucket is an ordered list; a lot is addressed by `(price_index,
//! lot_index)` where the lot index is local to its bucket, or by a global
//! lot id. Lots are never removed, so pagination inside one bucket is
//! stable while other buckets change.
//!
//! A lot's price decays linearly from `upper_bound_cost` to
//! `lower_bound_cost` over the auction duration. Buyers pay stable to the
//! router account and receive collateral from the auction account.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::auction::pricing::*;
use crate::core::access::{AccessControl, CallContext, Role};
use crate::core::config::CollateralAuctionConfig;
use crate::core::token::FungibleToken;
use crate::error::{Error, Result};
use crate::protocol::events::{LotPurchasedEvent, LotStartedEvent};
use crate::utils::crypto::PublicKey;
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// LOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of a collateral lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    /// On sale, nothing bought yet
    Open,
    /// On sale, partly bought
    PartiallyLiquidated,
    /// Fully bought, or closed early with residual collateral for the owner
    Sold,
    /// Duration elapsed, unsold collateral moved to the router reserve
    Expired,
    /// Returned to its position before any purchase
    Cancelled,
}

impl LotStatus {
    /// Whether the lot still accepts purchases
    pub fn is_on_sale(&self) -> bool {
        matches!(self, LotStatus::Open | LotStatus::PartiallyLiquidated)
    }
}

/// A lot of collateral on sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Global lot id
    pub id: u64,
    /// Price bucket
    pub price_index: u64,
    /// Position inside the bucket
    pub index: u64,
    /// Owner of the auctioned position
    pub owner: PublicKey,
    /// Collateral still on sale
    pub collateral_amount: u128,
    /// Collateral placed into the lot
    pub initial_amount: u128,
    /// Collateral bought so far
    pub sold_amount: u128,
    /// Stable paid so far
    pub proceeds: u128,
    /// Collateral left over for the owner after an early close
    pub residual: u128,
    /// Current status
    pub status: LotStatus,
    /// Auction start
    pub start_time: u64,
    /// Seconds until the floor price
    pub duration: u64,
    /// Starting unit price (wad)
    pub upper_bound_cost: u128,
    /// Floor unit price (wad)
    pub lower_bound_cost: u128,
}

impl Lot {
    /// Unit price at `now` (wad USD per whole collateral token)
    pub fn current_price(&self, now: u64) -> Result<u128> {
        decaying_price(
            self.upper_bound_cost,
            self.lower_bound_cost,
            self.start_time,
            self.duration,
            now,
        )
    }

    /// Whether the duration has elapsed
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self.start_time, self.duration, now)
    }
}

/// Outcome of a purchase, consumed by the router's settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotPurchase {
    /// Global lot id
    pub lot_id: u64,
    /// Owner of the auctioned position
    pub owner: PublicKey,
    /// Buyer
    pub buyer: PublicKey,
    /// Collateral bought
    pub collateral_amount: u128,
    /// Stable paid
    pub cost: u128,
    /// Collateral still on sale
    pub remaining: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL AUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Dutch auction for one collateral symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralAuction {
    /// Collateral symbol
    symbol: String,
    /// Collateral decimals
    collateral_decimals: u8,
    /// Stable decimals
    stable_decimals: u8,
    /// Account holding auctioned collateral
    account: PublicKey,
    /// Account receiving purchase proceeds
    payee: PublicKey,
    /// Pricing parameters
    config: CollateralAuctionConfig,
    /// Lots by price bucket
    buckets: BTreeMap<u64, Vec<Lot>>,
    /// Global lot id -> (price_index, lot_index)
    lot_ids: Vec<(u64, u64)>,
    /// Collateral held for lots on sale and unclaimed residuals
    committed: u128,
    /// Collateral sold to buyers
    liquidated_collateral: u128,
    /// Collateral ever placed into lots
    total_auctioned: u128,
}

impl CollateralAuction {
    /// Create an auction for `symbol` paying proceeds to `payee`
    pub fn new(
        symbol: &str,
        collateral_decimals: u8,
        stable_decimals: u8,
        payee: PublicKey,
        config: CollateralAuctionConfig,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            collateral_decimals,
            stable_decimals,
            account: Self::account_for(symbol),
            payee,
            config,
            buckets: BTreeMap::new(),
            lot_ids: Vec::new(),
            committed: 0,
            liquidated_collateral: 0,
            total_auctioned: 0,
        }
    }

    /// Module account of the auction for `symbol`
    pub fn account_for(symbol: &str) -> PublicKey {
        PublicKey::module_account(&format!("collateral-auction:{}", symbol))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STARTING LOTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create lot `lot_index` in bucket `price_index`, or refill it.
    ///
    /// Callable by the router, or by `owner` auctioning their own collateral.
    /// The collateral must already sit uncommitted in the auction account.
    /// Refilling is allowed only for an untouched open lot of the same owner.
    #[allow(clippy::too_many_arguments)]
    pub fn start_auction(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        owner: PublicKey,
        price_index: u64,
        lot_index: u64,
        amount: u128,
        collateral: &dyn FungibleToken,
    ) -> Result<LotStartedEvent> {
        if ctx.caller != owner && !access.has_role(Role::Router, &ctx.caller) {
            return Err(Error::Unauthorized("router role or lot owner required".into()));
        }
        validate_non_zero(amount)?;
        if price_index == 0 {
            return Err(Error::InvalidParameter {
                name: "price_index".into(),
                reason: "bucket zero has no price".into(),
            });
        }

        let available = collateral.balance_of(&self.account).saturating_sub(self.committed);
        if amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }

        let bucket_len = self.buckets.get(&price_index).map(|b| b.len() as u64).unwrap_or(0);
        let lot = if lot_index < bucket_len {
            let lot = self.lot_at_mut(price_index, lot_index)?;
            if lot.owner != owner {
                return Err(Error::Unauthorized("lot belongs to another owner".into()));
            }
            if lot.status != LotStatus::Open || lot.sold_amount > 0 || lot.is_expired(ctx.now) {
                return Err(Error::LotNotOpen);
            }
            lot.collateral_amount = safe_add(lot.collateral_amount, amount)?;
            lot.initial_amount = safe_add(lot.initial_amount, amount)?;
            lot.clone()
        } else if lot_index == bucket_len {
            let reference = bucket_price(price_index, self.config.price_step)?;
            let lot = Lot {
                id: self.lot_ids.len() as u64,
                price_index,
                index: lot_index,
                owner,
                collateral_amount: amount,
                initial_amount: amount,
                sold_amount: 0,
                proceeds: 0,
                residual: 0,
                status: LotStatus::Open,
                start_time: ctx.now,
                duration: self.config.duration,
                upper_bound_cost: wmul(reference, self.config.upper_bound_factor)?,
                lower_bound_cost: wmul(reference, self.config.lower_bound_factor)?,
            };
            self.buckets.entry(price_index).or_default().push(lot.clone());
            self.lot_ids.push((price_index, lot_index));
            lot
        } else {
            return Err(Error::InvalidParameter {
                name: "lot_index".into(),
                reason: format!("next lot index in bucket {} is {}", price_index, bucket_len),
            });
        };

        self.committed = safe_add(self.committed, amount)?;
        self.total_auctioned = safe_add(self.total_auctioned, amount)?;

        info!(
            symbol = %self.symbol,
            lot_id = lot.id,
            price_index,
            lot_index,
            amount,
            "collateral lot started"
        );

        Ok(LotStartedEvent {
            symbol: self.symbol.clone(),
            lot_id: lot.id,
            price_index,
            lot_index,
            owner,
            amount,
            upper_bound_cost: lot.upper_bound_cost,
            lower_bound_cost: lot.lower_bound_cost,
            timestamp: ctx.now,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PURCHASES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Buy everything left in a lot at the current price
    pub fn buy_lot(
        &mut self,
        ctx: &CallContext,
        price_index: u64,
        lot_index: u64,
        stable: &mut dyn FungibleToken,
        collateral: &mut dyn FungibleToken,
    ) -> Result<(LotPurchase, LotPurchasedEvent)> {
        let amount = self.lot_at(price_index, lot_index)?.collateral_amount;
        self.purchase(ctx, price_index, lot_index, amount, stable, collateral)
    }

    /// Buy everything left in a lot, addressed by global id
    pub fn buy_lot_by_id(
        &mut self,
        ctx: &CallContext,
        lot_id: u64,
        stable: &mut dyn FungibleToken,
        collateral: &mut dyn FungibleToken,
    ) -> Result<(LotPurchase, LotPurchasedEvent)> {
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        self.buy_lot(ctx, price_index, lot_index, stable, collateral)
    }

    /// Buy part of a lot
    pub fn liquidate_lot(
        &mut self,
        ctx: &CallContext,
        lot_id: u64,
        amount: u128,
        stable: &mut dyn FungibleToken,
        collateral: &mut dyn FungibleToken,
    ) -> Result<(LotPurchase, LotPurchasedEvent)> {
        validate_non_zero(amount)?;
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        self.purchase(ctx, price_index, lot_index, amount, stable, collateral)
    }

    fn purchase(
        &mut self,
        ctx: &CallContext,
        price_index: u64,
        lot_index: u64,
        amount: u128,
        stable: &mut dyn FungibleToken,
        collateral: &mut dyn FungibleToken,
    ) -> Result<(LotPurchase, LotPurchasedEvent)> {
        let lot = self.lot_at(price_index, lot_index)?;
        match lot.status {
            LotStatus::Sold => return Err(Error::LotAlreadySold),
            LotStatus::Expired => return Err(Error::AuctionExpired),
            LotStatus::Cancelled => return Err(Error::LotNotOpen),
            LotStatus::Open | LotStatus::PartiallyLiquidated => {}
        }
        if lot.is_expired(ctx.now) {
            return Err(Error::AuctionExpired);
        }
        if amount > lot.collateral_amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: lot.collateral_amount,
            });
        }

        let price = lot.current_price(ctx.now)?;
        let cost = collateral_cost(amount, self.collateral_decimals, price, self.stable_decimals)?;
        let buyer = ctx.caller;

        let available = stable
            .balance_of(&buyer)
            .min(stable.allowance(&buyer, &self.account));
        if available < cost {
            return Err(Error::InsufficientPayment {
                required: cost,
                available,
            });
        }

        stable.transfer_from(self.account, buyer, self.payee, cost)?;
        collateral.transfer(self.account, buyer, amount)?;

        let lot = self.lot_at_mut(price_index, lot_index)?;
        lot.collateral_amount -= amount;
        lot.sold_amount = safe_add(lot.sold_amount, amount)?;
        lot.proceeds = safe_add(lot.proceeds, cost)?;
        lot.status = if lot.collateral_amount == 0 {
            LotStatus::Sold
        } else {
            LotStatus::PartiallyLiquidated
        };
        let (lot_id, owner, remaining) = (lot.id, lot.owner, lot.collateral_amount);

        self.committed = safe_sub(self.committed, amount)?;
        self.liquidated_collateral = safe_add(self.liquidated_collateral, amount)?;

        debug!(symbol = %self.symbol, lot_id, amount, cost, price, "collateral bought");

        Ok((
            LotPurchase {
                lot_id,
                owner,
                buyer,
                collateral_amount: amount,
                cost,
                remaining,
            },
            LotPurchasedEvent {
                symbol: self.symbol.clone(),
                lot_id,
                buyer,
                collateral_amount: amount,
                cost,
                price,
                remaining,
                timestamp: ctx.now,
            },
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ROUTER HOOKS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Close a lot whose debt is covered, keeping what is left as residual
    pub fn settle_lot(&mut self, ctx: &CallContext, access: &AccessControl, lot_id: u64) -> Result<u128> {
        access.require_role(Role::Router, &ctx.caller)?;
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        let lot = self.lot_at_mut(price_index, lot_index)?;
        if !lot.status.is_on_sale() {
            return Err(Error::LotNotOpen);
        }
        let residual = std::mem::take(&mut lot.collateral_amount);
        lot.residual = safe_add(lot.residual, residual)?;
        lot.status = LotStatus::Sold;
        Ok(residual)
    }

    /// Send residual collateral of a closed lot to `to`
    #[allow(clippy::too_many_arguments)]
    pub fn release_residual(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        lot_id: u64,
        amount: u128,
        to: PublicKey,
        collateral: &mut dyn FungibleToken,
    ) -> Result<()> {
        access.require_role(Role::Router, &ctx.caller)?;
        validate_non_zero(amount)?;
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        let lot = self.lot_at(price_index, lot_index)?;
        if lot.status != LotStatus::Sold {
            return Err(Error::LotNotSettled {
                price_index,
                lot_index,
            });
        }
        if amount > lot.residual {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: lot.residual,
            });
        }

        collateral.transfer(self.account, to, amount)?;
        self.lot_at_mut(price_index, lot_index)?.residual -= amount;
        self.committed = safe_sub(self.committed, amount)?;
        Ok(())
    }

    /// Move the unsold collateral of an expired lot to `to`
    pub fn expire_lot(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        lot_id: u64,
        to: PublicKey,
        collateral: &mut dyn FungibleToken,
    ) -> Result<u128> {
        access.require_role(Role::Router, &ctx.caller)?;
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        let lot = self.lot_at(price_index, lot_index)?;
        match lot.status {
            LotStatus::Sold => return Err(Error::LotAlreadySold),
            LotStatus::Expired | LotStatus::Cancelled => return Err(Error::LotNotOpen),
            LotStatus::Open | LotStatus::PartiallyLiquidated => {}
        }
        if !lot.is_expired(ctx.now) {
            return Err(Error::InvalidParameter {
                name: "lot".into(),
                reason: format!("lot {} is still on sale", lot_id),
            });
        }

        let amount = lot.collateral_amount;
        collateral.transfer(self.account, to, amount)?;

        let lot = self.lot_at_mut(price_index, lot_index)?;
        lot.collateral_amount = 0;
        lot.status = LotStatus::Expired;
        self.committed = safe_sub(self.committed, amount)?;

        info!(symbol = %self.symbol, lot_id, amount, "collateral lot expired");
        Ok(amount)
    }

    /// Withdraw an untouched lot, sending its collateral to `to`
    pub fn cancel_lot(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        lot_id: u64,
        to: PublicKey,
        collateral: &mut dyn FungibleToken,
    ) -> Result<u128> {
        access.require_role(Role::Router, &ctx.caller)?;
        let (price_index, lot_index) = self.lot_position(lot_id)?;
        let lot = self.lot_at(price_index, lot_index)?;
        if lot.sold_amount > 0 {
            return Err(Error::LotHasSales);
        }
        if lot.status != LotStatus::Open {
            return Err(Error::LotNotOpen);
        }
        if lot.is_expired(ctx.now) {
            return Err(Error::AuctionExpired);
        }

        let amount = lot.collateral_amount;
        collateral.transfer(self.account, to, amount)?;

        let lot = self.lot_at_mut(price_index, lot_index)?;
        lot.collateral_amount = 0;
        lot.status = LotStatus::Cancelled;
        self.committed = safe_sub(self.committed, amount)?;

        info!(symbol = %self.symbol, lot_id, amount, "collateral lot cancelled");
        Ok(amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Non-empty price buckets in ascending order, paginated
    pub fn get_price_indexes(&self, start: usize, count: usize) -> Vec<u64> {
        self.buckets.keys().skip(start).take(count).copied().collect()
    }

    /// Lots of one bucket, paginated by bucket-local index
    pub fn get_lots(&self, price_index: u64, start: usize, count: usize) -> Vec<Lot> {
        self.buckets
            .get(&price_index)
            .map(|lots| lots.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// Lot by global id
    pub fn lot(&self, lot_id: u64) -> Option<&Lot> {
        let (price_index, lot_index) = self.lot_ids.get(lot_id as usize)?;
        self.lot_at(*price_index, *lot_index).ok()
    }

    /// Global id of `(price_index, lot_index)`
    pub fn lot_id(&self, price_index: u64, lot_index: u64) -> Result<u64> {
        self.lot_at(price_index, lot_index).map(|lot| lot.id)
    }

    /// Index the next new lot of a bucket will take
    pub fn next_lot_index(&self, price_index: u64) -> u64 {
        self.buckets.get(&price_index).map(|b| b.len() as u64).unwrap_or(0)
    }

    /// Current unit price of a lot
    pub fn current_lot_price(&self, lot_id: u64, now: u64) -> Result<u128> {
        self.lot(lot_id)
            .ok_or_else(|| Error::LotNotFound(lot_id.to_string()))?
            .current_price(now)
    }

    /// Collateral sold to buyers
    pub fn liquidated_collateral_amount(&self) -> u128 {
        self.liquidated_collateral
    }

    /// Collateral ever placed into lots
    pub fn total_auctioned(&self) -> u128 {
        self.total_auctioned
    }

    /// Collateral held for lots on sale and unclaimed residuals
    pub fn committed(&self) -> u128 {
        self.committed
    }

    /// Collateral symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Module account holding auctioned collateral
    pub fn account(&self) -> PublicKey {
        self.account
    }

    /// Width of a price bucket
    pub fn price_step(&self) -> u128 {
        self.config.price_step
    }

    fn lot_position(&self, lot_id: u64) -> Result<(u64, u64)> {
        self.lot_ids
            .get(lot_id as usize)
            .copied()
            .ok_or_else(|| Error::LotNotFound(lot_id.to_string()))
    }

    fn lot_at(&self, price_index: u64, lot_index: u64) -> Result<&Lot> {
        self.buckets
            .get(&price_index)
            .and_then(|lots| lots.get(lot_index as usize))
            .ok_or_else(|| Error::LotNotFound(format!("{}/{}", price_index, lot_index)))
    }

    fn lot_at_mut(&mut self, price_index: u64, lot_index: u64) -> Result<&mut Lot> {
        self.buckets
            .get_mut(&price_index)
            .and_then(|lots| lots.get_mut(lot_index as usize))
            .ok_or_else(|| Error::LotNotFound(format!("{}/{}", price_index, lot_index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::TokenLedger;
    use crate::utils::constants::{PUBKEY_LENGTH, WAD};

    struct Fixture {
        auction: CollateralAuction,
        access: AccessControl,
        stable: TokenLedger,
        collateral: TokenLedger,
        router: PublicKey,
        owner: PublicKey,
        buyer: PublicKey,
    }

    fn admin() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn setup() -> Fixture {
        let router = PublicKey::module_account("router");
        let owner = PublicKey::new([0x03; PUBKEY_LENGTH]);
        let buyer = PublicKey::new([0x04; PUBKEY_LENGTH]);

        let mut access = AccessControl::new(admin());
        access
            .grant_role(&CallContext::new(admin(), 0), Role::Router, router)
            .unwrap();

        let mut stable = TokenLedger::new("Stable", "USDS", 18, admin());
        stable.set_minter(&admin(), admin(), true).unwrap();
        stable.mint(admin(), buyer, 1_000_000 * WAD).unwrap();

        let mut collateral = TokenLedger::new("Ether", "ETH", 18, admin());
        collateral.set_minter(&admin(), admin(), true).unwrap();

        let auction = CollateralAuction::new("ETH", 18, 18, router, CollateralAuctionConfig::default());
        collateral.mint(admin(), auction.account(), 10 * WAD).unwrap();
        stable.approve(buyer, auction.account(), u128::MAX).unwrap();

        Fixture {
            auction,
            access,
            stable,
            collateral,
            router,
            owner,
            buyer,
        }
    }

    fn start(f: &mut Fixture, price_index: u64, amount: u128, now: u64) -> LotStartedEvent {
        let lot_index = f.auction.next_lot_index(price_index);
        f.auction
            .start_auction(
                &CallContext::new(f.router, now),
                &f.access,
                f.owner,
                price_index,
                lot_index,
                amount,
                &f.collateral,
            )
            .unwrap()
    }

    #[test]
    fn test_start_sets_bounds_from_bucket() {
        let mut f = setup();
        let event = start(&mut f, 1000, 10 * WAD, 0);

        assert_eq!(event.upper_bound_cost, 1200 * WAD);
        assert_eq!(event.lower_bound_cost, 700 * WAD);
        assert_eq!(f.auction.total_auctioned(), 10 * WAD);
        assert_eq!(f.auction.get_price_indexes(0, 10), vec![1000]);
    }

    #[test]
    fn test_start_requires_available_collateral() {
        let mut f = setup();
        start(&mut f, 1000, 6 * WAD, 0);

        let result = f.auction.start_auction(
            &CallContext::new(f.router, 0),
            &f.access,
            f.owner,
            1000,
            1,
            5 * WAD,
            &f.collateral,
        );
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[test]
    fn test_start_requires_router_or_owner() {
        let mut f = setup();
        let stranger = CallContext::new(PublicKey::new([0x05; PUBKEY_LENGTH]), 0);
        let result = f
            .auction
            .start_auction(&stranger, &f.access, f.owner, 1000, 0, WAD, &f.collateral);
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        // the owner may auction collateral sitting in the auction account
        let own = CallContext::new(f.owner, 0);
        assert!(f
            .auction
            .start_auction(&own, &f.access, f.owner, 1000, 0, WAD, &f.collateral)
            .is_ok());
    }

    #[test]
    fn test_refill_untouched_lot() {
        let mut f = setup();
        start(&mut f, 1000, 4 * WAD, 0);
        f.auction
            .start_auction(&CallContext::new(f.router, 10), &f.access, f.owner, 1000, 0, 2 * WAD, &f.collateral)
            .unwrap();

        let lot = f.auction.lot(0).unwrap();
        assert_eq!(lot.collateral_amount, 6 * WAD);
        assert_eq!(f.auction.get_lots(1000, 0, 10).len(), 1);
    }

    #[test]
    fn test_buy_full_lot_at_decayed_price() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let half = CollateralAuctionConfig::default().duration / 2;

        let ctx = CallContext::new(f.buyer, half);
        let (purchase, event) = f
            .auction
            .buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral)
            .unwrap();

        // halfway between 1200 and 700
        assert_eq!(event.price, 950 * WAD);
        assert_eq!(purchase.cost, 9500 * WAD);
        assert_eq!(purchase.remaining, 0);
        assert_eq!(f.stable.balance_of(&f.router), 9500 * WAD);
        assert_eq!(f.collateral.balance_of(&f.buyer), 10 * WAD);
        assert_eq!(f.auction.lot(0).unwrap().status, LotStatus::Sold);
        assert_eq!(f.auction.liquidated_collateral_amount(), 10 * WAD);
    }

    #[test]
    fn test_failed_purchases_leave_balances_unchanged() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let ctx = CallContext::new(f.buyer, 0);
        f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral).unwrap();

        let buyer_stable = f.stable.balance_of(&f.buyer);
        let result = f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::LotAlreadySold)));
        assert_eq!(f.stable.balance_of(&f.buyer), buyer_stable);
    }

    #[test]
    fn test_expired_lot_cannot_be_bought() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let duration = CollateralAuctionConfig::default().duration;

        let ctx = CallContext::new(f.buyer, duration + 1);
        let result = f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::AuctionExpired)));

        // at exactly the duration the floor price still clears
        let ctx = CallContext::new(f.buyer, duration);
        let (purchase, _) = f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral).unwrap();
        assert_eq!(purchase.cost, 7000 * WAD);
    }

    #[test]
    fn test_insufficient_payment() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let poor = PublicKey::new([0x06; PUBKEY_LENGTH]);
        f.stable.mint(admin(), poor, 100 * WAD).unwrap();
        f.stable.approve(poor, f.auction.account(), u128::MAX).unwrap();

        let ctx = CallContext::new(poor, 0);
        let result = f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::InsufficientPayment { available, .. }) if available == 100 * WAD));

        // allowance counts too
        f.stable.approve(f.buyer, f.auction.account(), WAD).unwrap();
        let ctx = CallContext::new(f.buyer, 0);
        let result = f.auction.buy_lot(&ctx, 1000, 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::InsufficientPayment { .. })));
    }

    #[test]
    fn test_partial_liquidation() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let ctx = CallContext::new(f.buyer, 0);

        let (purchase, _) = f
            .auction
            .liquidate_lot(&ctx, 0, 4 * WAD, &mut f.stable, &mut f.collateral)
            .unwrap();
        assert_eq!(purchase.cost, 4800 * WAD);
        assert_eq!(purchase.remaining, 6 * WAD);
        assert_eq!(f.auction.lot(0).unwrap().status, LotStatus::PartiallyLiquidated);

        let result = f.auction.liquidate_lot(&ctx, 0, 7 * WAD, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));

        let (purchase, _) = f
            .auction
            .buy_lot_by_id(&ctx, 0, &mut f.stable, &mut f.collateral)
            .unwrap();
        assert_eq!(purchase.collateral_amount, 6 * WAD);
        assert_eq!(f.auction.lot(0).unwrap().status, LotStatus::Sold);
    }

    #[test]
    fn test_settle_and_release_residual() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let router_ctx = CallContext::new(f.router, 0);
        let ctx = CallContext::new(f.buyer, 0);
        f.auction.liquidate_lot(&ctx, 0, 4 * WAD, &mut f.stable, &mut f.collateral).unwrap();

        let residual = f.auction.settle_lot(&router_ctx, &f.access, 0).unwrap();
        assert_eq!(residual, 6 * WAD);

        let result = f.auction.buy_lot_by_id(&ctx, 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::LotAlreadySold)));

        f.auction
            .release_residual(&router_ctx, &f.access, 0, 6 * WAD, f.owner, &mut f.collateral)
            .unwrap();
        assert_eq!(f.collateral.balance_of(&f.owner), 6 * WAD);
        assert_eq!(f.auction.committed(), 0);
    }

    #[test]
    fn test_router_hooks_require_role() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        let stranger = CallContext::new(f.owner, 0);
        assert!(matches!(
            f.auction.settle_lot(&stranger, &f.access, 0),
            Err(Error::Unauthorized(_))
        ));
        assert!(f
            .auction
            .cancel_lot(&stranger, &f.access, 0, f.owner, &mut f.collateral)
            .is_err());
    }

    #[test]
    fn test_expire_and_cancel() {
        let mut f = setup();
        start(&mut f, 1000, 5 * WAD, 0);
        start(&mut f, 1000, 5 * WAD, 0);
        let duration = CollateralAuctionConfig::default().duration;

        let early = CallContext::new(f.router, duration);
        assert!(f.auction.expire_lot(&early, &f.access, 0, f.router, &mut f.collateral).is_err());

        let late = CallContext::new(f.router, duration + 1);
        let amount = f.auction.expire_lot(&late, &f.access, 0, f.router, &mut f.collateral).unwrap();
        assert_eq!(amount, 5 * WAD);
        assert_eq!(f.auction.lot(0).unwrap().status, LotStatus::Expired);

        let result = f.auction.buy_lot_by_id(&CallContext::new(f.buyer, 0), 0, &mut f.stable, &mut f.collateral);
        assert!(matches!(result, Err(Error::AuctionExpired)));

        let cancelled = f
            .auction
            .cancel_lot(&CallContext::new(f.router, 10), &f.access, 1, f.router, &mut f.collateral)
            .unwrap();
        assert_eq!(cancelled, 5 * WAD);
        assert_eq!(f.collateral.balance_of(&f.router), 10 * WAD);
    }

    #[test]
    fn test_cancel_after_sale_rejected() {
        let mut f = setup();
        start(&mut f, 1000, 10 * WAD, 0);
        f.auction
            .liquidate_lot(&CallContext::new(f.buyer, 0), 0, WAD, &mut f.stable, &mut f.collateral)
            .unwrap();
        let result = f
            .auction
            .cancel_lot(&CallContext::new(f.router, 0), &f.access, 0, f.router, &mut f.collateral);
        assert!(matches!(result, Err(Error::LotHasSales)));
    }

    #[test]
    fn test_pagination_is_bucket_local() {
        let mut f = setup();
        start(&mut f, 1000, WAD, 0);
        start(&mut f, 900, WAD, 0);
        start(&mut f, 1000, WAD, 0);

        assert_eq!(f.auction.get_price_indexes(0, 10), vec![900, 1000]);
        assert_eq!(f.auction.get_price_indexes(1, 10), vec![1000]);

        let lots = f.auction.get_lots(1000, 1, 10);
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].index, 1);
        assert_eq!(lots[0].id, 2);

        // a new bucket does not shift indexes inside existing ones
        start(&mut f, 950, WAD, 0);
        assert_eq!(f.auction.get_lots(1000, 1, 10)[0].id, 2);
        assert!(f.auction.get_lots(42, 0, 10).is_empty());
    }
}
