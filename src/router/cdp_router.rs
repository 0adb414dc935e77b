//! CDP router.
//!
//! Custodies collateral, mints and burns stable against positions, keeps the
//! global debt ledger, and hands unhealthy positions to the collateral
//! auction of their symbol. Auction proceeds come back here and run through
//! the settlement waterfall. Shortfall accumulates as `deficit` (cleared by
//! the debt auction); fees and penalties accumulate as `surplus` (sold by the
//! surplus auction).
//!
//! Every operation works on a copy of the position and commits to storage
//! only after all checks and token moves have succeeded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::settlement::*;
use crate::auction::collateral::{CollateralAuction, LotPurchase};
use crate::core::access::{AccessControl, CallContext, Role};
use crate::core::cdp::{CollateralPosition, PositionKey, PositionStatus};
use crate::core::config::CollateralConfig;
use crate::core::token::FungibleToken;
use crate::error::{Error, Result};
use crate::oracle::PriceOracle;
use crate::protocol::events::*;
use crate::utils::crypto::PublicKey;
use crate::utils::math::*;
use crate::utils::validation::*;

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBAL LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// System-wide solvency book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalLedger {
    /// Sum of all position debt (stable units)
    pub total_debt: u128,
    /// Collateral in router custody backing positions, per symbol
    pub total_collateral: BTreeMap<String, u128>,
    /// Principal lost in liquidations, not yet covered by debt auctions
    pub deficit: u128,
    /// Stable held by the router from fees and penalties
    pub surplus: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Position book and solvency ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpRouter {
    /// Module account custodying collateral and proceeds
    account: PublicKey,
    /// Stable decimals
    stable_decimals: u8,
    /// Supported collateral types
    collaterals: BTreeMap<String, CollateralConfig>,
    /// Open positions
    positions: BTreeMap<PositionKey, CollateralPosition>,
    /// Solvency ledger
    ledger: GlobalLedger,
    /// Liquidations in creation order
    liquidations: Vec<LiquidationRecord>,
    /// (symbol, lot id) -> liquidation id
    by_lot: BTreeMap<(String, u64), u64>,
    /// Collateral recovered from expired lots
    reserves: BTreeMap<String, u128>,
    /// Debt per collateral symbol, for debt ceilings
    debt_by_symbol: BTreeMap<String, u128>,
}

impl CdpRouter {
    /// Create a router for the given collateral types
    pub fn new(stable_decimals: u8, collaterals: &[CollateralConfig]) -> Self {
        Self {
            account: Self::module_account(),
            stable_decimals,
            collaterals: collaterals
                .iter()
                .map(|c| (c.symbol.clone(), c.clone()))
                .collect(),
            positions: BTreeMap::new(),
            ledger: GlobalLedger::default(),
            liquidations: Vec::new(),
            by_lot: BTreeMap::new(),
            reserves: BTreeMap::new(),
            debt_by_symbol: BTreeMap::new(),
        }
    }

    /// The router's module account
    pub fn module_account() -> PublicKey {
        PublicKey::module_account("router")
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit collateral and mint `value / target_ratio` stable against it
    #[allow(clippy::too_many_arguments)]
    pub fn produce_stable(
        &mut self,
        ctx: &CallContext,
        oracle: &PriceOracle,
        collateral: &mut dyn FungibleToken,
        stable: &mut dyn FungibleToken,
        collateral_amount: u128,
        target_ratio: u128,
        symbol: &str,
    ) -> Result<StableProducedEvent> {
        let config = self.collateral_config(symbol)?.clone();
        validate_non_zero(collateral_amount)?;
        validate_collateral_ratio(target_ratio, config.minimum_collateral_ratio)?;
        let price = oracle.get_price(symbol, ctx.now)?;

        let owner = ctx.caller;
        let key = PositionKey::new(owner, symbol);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .unwrap_or_else(|| CollateralPosition::new(owner, symbol, ctx.now));
        if !position.is_active() {
            return Err(Error::AlreadyLiquidating(key.to_string()));
        }
        let fee = position.accrue(config.stability_fee_rate, ctx.now)?;

        let value = collateral_value(collateral_amount, config.decimals, price, self.stable_decimals)?;
        let minted = max_debt_for(value, target_ratio)?;

        position.collateral_amount = safe_add(position.collateral_amount, collateral_amount)?;
        position.debt_amount = safe_add(position.debt_amount, minted)?;
        let ratio = position.ratio(config.decimals, price, self.stable_decimals)?;
        validate_collateral_ratio(ratio, config.minimum_collateral_ratio)?;

        let symbol_debt = safe_add(self.symbol_debt(symbol), fee)?;
        validate_debt_ceiling(symbol_debt, minted, config.debt_ceiling)?;

        collateral.transfer(owner, self.account, collateral_amount)?;
        stable.mint(self.account, owner, minted)?;

        self.add_debt(symbol, safe_add(fee, minted)?)?;
        self.add_collateral_total(symbol, collateral_amount)?;
        self.positions.insert(key, position);

        info!(
            owner = %owner,
            symbol,
            collateral_amount,
            minted,
            ratio,
            "stable produced"
        );

        Ok(StableProducedEvent {
            owner,
            symbol: symbol.to_string(),
            collateral_amount,
            stable_minted: minted,
            ratio,
            timestamp: ctx.now,
        })
    }

    /// Repay debt. Fees are paid first and kept as surplus; principal is burned.
    pub fn repay_stable(
        &mut self,
        ctx: &CallContext,
        stable: &mut dyn FungibleToken,
        amount: u128,
        symbol: &str,
    ) -> Result<StableRepaidEvent> {
        let config = self.collateral_config(symbol)?.clone();
        validate_non_zero(amount)?;
        let (key, mut position) = self.active_position(ctx.caller, symbol)?;

        let fee = position.accrue(config.stability_fee_rate, ctx.now)?;
        if position.debt_amount == 0 {
            return Err(Error::InvalidParameter {
                name: "amount".into(),
                reason: format!("position {} has no debt", key),
            });
        }
        let (fees_paid, principal_repaid) = position.reduce_debt(amount)?;
        let paid = safe_add(fees_paid, principal_repaid)?;

        stable.transfer(ctx.caller, self.account, paid)?;
        stable.burn(self.account, principal_repaid)?;

        self.add_debt(symbol, fee)?;
        self.sub_debt(symbol, paid)?;
        self.ledger.surplus = safe_add(self.ledger.surplus, fees_paid)?;
        let remaining_debt = position.debt_amount;
        self.store_position(key, position);

        info!(owner = %ctx.caller, symbol, principal_repaid, fees_paid, remaining_debt, "stable repaid");

        Ok(StableRepaidEvent {
            owner: ctx.caller,
            symbol: symbol.to_string(),
            principal_repaid,
            fees_paid,
            remaining_debt,
            timestamp: ctx.now,
        })
    }

    /// Withdraw custody collateral, keeping the position at the minimum ratio
    pub fn withdraw_collateral(
        &mut self,
        ctx: &CallContext,
        oracle: &PriceOracle,
        collateral: &mut dyn FungibleToken,
        amount: u128,
        symbol: &str,
    ) -> Result<CollateralWithdrawnEvent> {
        let config = self.collateral_config(symbol)?.clone();
        validate_non_zero(amount)?;
        let (key, mut position) = self.active_position(ctx.caller, symbol)?;

        let fee = position.accrue(config.stability_fee_rate, ctx.now)?;
        if amount > position.collateral_amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: position.collateral_amount,
            });
        }
        position.collateral_amount -= amount;

        if position.debt_amount > 0 {
            let price = oracle.get_price(symbol, ctx.now)?;
            let ratio = position.ratio(config.decimals, price, self.stable_decimals)?;
            validate_collateral_ratio(ratio, config.minimum_collateral_ratio)?;
        }

        collateral.transfer(self.account, ctx.caller, amount)?;

        self.add_debt(symbol, fee)?;
        self.sub_collateral_total(symbol, amount)?;
        let remaining_collateral = position.collateral_amount;
        self.store_position(key, position);

        info!(owner = %ctx.caller, symbol, amount, remaining_collateral, "collateral withdrawn");

        Ok(CollateralWithdrawnEvent {
            owner: ctx.caller,
            symbol: symbol.to_string(),
            amount,
            remaining_collateral,
            timestamp: ctx.now,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hand an unhealthy position to its collateral auction. Anyone may call.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        oracle: &PriceOracle,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        owner: PublicKey,
        symbol: &str,
    ) -> Result<(PositionLiquidatedEvent, LotStartedEvent)> {
        let config = self.collateral_config(symbol)?.clone();
        let (key, mut position) = self.active_position(owner, symbol)?;
        let fee = position.accrue(config.stability_fee_rate, ctx.now)?;
        let price = oracle.get_price(symbol, ctx.now)?;

        let ratio = position.ratio(config.decimals, price, self.stable_decimals)?;
        if position.debt_amount == 0 || ratio >= config.liquidation_threshold {
            warn!(position = %key, ratio, "liquidation rejected, position healthy");
            return Err(Error::PositionHealthy(key.to_string()));
        }

        let penalty = calculate_fee_bps(position.debt_amount, config.liquidation_penalty_bps)?;
        self.open_liquidation(ctx, access, auction, collateral, key, position, fee, penalty, price)
    }

    /// Owner hands their own position to the collateral auction, without penalty
    pub fn auction_own_collateral(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        oracle: &PriceOracle,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        symbol: &str,
    ) -> Result<(PositionLiquidatedEvent, LotStartedEvent)> {
        let config = self.collateral_config(symbol)?.clone();
        let (key, mut position) = self.active_position(ctx.caller, symbol)?;
        let fee = position.accrue(config.stability_fee_rate, ctx.now)?;
        if position.debt_amount == 0 {
            return Err(Error::InvalidParameter {
                name: "position".into(),
                reason: format!("{} has no debt, withdraw the collateral instead", key),
            });
        }
        let price = oracle.get_price(symbol, ctx.now)?;
        self.open_liquidation(ctx, access, auction, collateral, key, position, fee, 0, price)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_liquidation(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        key: PositionKey,
        mut position: CollateralPosition,
        fee: u128,
        penalty: u128,
        price: u128,
    ) -> Result<(PositionLiquidatedEvent, LotStartedEvent)> {
        let price_index = nearest_price_index(price, auction.price_step())?.max(1);
        let lot_index = auction.next_lot_index(price_index);
        let amount = position.collateral_amount;

        collateral.transfer(self.account, auction.account(), amount)?;
        let started = auction.start_auction(
            &ctx.as_account(self.account),
            access,
            position.owner,
            price_index,
            lot_index,
            amount,
            &*collateral,
        )?;

        let id = self.liquidations.len() as u64;
        self.liquidations.push(LiquidationRecord {
            id,
            owner: position.owner,
            symbol: key.symbol.clone(),
            lot_id: started.lot_id,
            price_index,
            lot_index,
            collateral_amount: amount,
            penalty,
            outstanding: Outstanding {
                principal: position.principal(),
                fees: position.accrued_fees,
                penalty,
            },
            proceeds: 0,
            extra_debt: 0,
            residual_collateral: 0,
            deficit: 0,
            status: LiquidationStatus::Auctioning,
        });
        self.by_lot.insert((key.symbol.clone(), started.lot_id), id);

        let debt = position.debt_amount;
        position.collateral_amount = 0;
        position.status = PositionStatus::Liquidating { liquidation_id: id };

        self.add_debt(&key.symbol, fee)?;
        self.sub_collateral_total(&key.symbol, amount)?;
        self.positions.insert(key.clone(), position);

        info!(
            position = %key,
            liquidation_id = id,
            lot_id = started.lot_id,
            price_index,
            amount,
            debt,
            penalty,
            "position handed to collateral auction"
        );

        Ok((
            PositionLiquidatedEvent {
                liquidation_id: id,
                owner: key.owner,
                symbol: key.symbol,
                keeper: ctx.caller,
                collateral_amount: amount,
                debt,
                penalty,
                price,
                lot_id: started.lot_id,
                price_index,
                lot_index,
                timestamp: ctx.now,
            },
            started,
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply the proceeds of a collateral purchase.
    ///
    /// Lots without a liquidation record (started by an owner directly on the
    /// auction) have their proceeds forwarded to the lot owner.
    pub fn on_purchase(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        auction: &mut CollateralAuction,
        stable: &mut dyn FungibleToken,
        purchase: &LotPurchase,
    ) -> Result<Option<LiquidationSettledEvent>> {
        let symbol = auction.symbol().to_string();
        let id = match self.by_lot.get(&(symbol.clone(), purchase.lot_id)) {
            Some(id) => *id,
            None => {
                stable.transfer(self.account, purchase.owner, purchase.cost)?;
                return Ok(None);
            }
        };

        let mut record = self.record(id)?.clone();
        if !record.is_auctioning() {
            return Err(Error::InvariantViolation(format!(
                "proceeds for closed liquidation {}",
                id
            )));
        }
        let key = PositionKey::new(record.owner, &symbol);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::PositionNotFound(key.to_string()))?;

        let split = allocate(&mut record.outstanding, purchase.cost)?;
        stable.burn(self.account, split.principal)?;
        position.settle(split.principal, split.fees)?;
        self.sub_debt(&symbol, safe_add(split.principal, split.fees)?)?;
        self.ledger.surplus = safe_add(self.ledger.surplus, split.to_surplus())?;
        record.proceeds = safe_add(record.proceeds, purchase.cost)?;
        record.extra_debt = safe_add(record.extra_debt, split.extra)?;

        let mut deficit_added = 0;
        let mut residual = 0;
        let closed = if purchase.remaining == 0 {
            deficit_added = self.write_off(&mut record, &mut position)?;
            true
        } else if record.outstanding.is_covered() {
            residual = auction.settle_lot(&ctx.as_account(self.account), access, purchase.lot_id)?;
            record.residual_collateral = residual;
            true
        } else {
            false
        };

        if closed {
            record.status = LiquidationStatus::Settled;
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, position);
        }
        self.liquidations[id as usize] = record;

        debug!(liquidation_id = id, cost = purchase.cost, principal = split.principal, extra = split.extra, "proceeds applied");
        if closed {
            info!(liquidation_id = id, deficit_added, residual, "liquidation settled");
        }

        Ok(Some(LiquidationSettledEvent {
            liquidation_id: id,
            lot_id: purchase.lot_id,
            proceeds: purchase.cost,
            principal_repaid: split.principal,
            surplus_added: split.to_surplus(),
            extra_credited: split.extra,
            deficit_added,
            residual_collateral: residual,
            closed,
            timestamp: ctx.now,
        }))
    }

    /// Close an expired lot. Unsold collateral goes to the reserve and unpaid
    /// principal becomes deficit. Anyone may call.
    pub fn expire_lot(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        price_index: u64,
        lot_index: u64,
    ) -> Result<Option<LiquidationSettledEvent>> {
        let symbol = auction.symbol().to_string();
        let lot_id = auction.lot_id(price_index, lot_index)?;
        let owner = auction
            .lot(lot_id)
            .map(|lot| lot.owner)
            .ok_or_else(|| Error::LotNotFound(lot_id.to_string()))?;
        let amount = auction.expire_lot(
            &ctx.as_account(self.account),
            access,
            lot_id,
            self.account,
            collateral,
        )?;

        let id = match self.by_lot.get(&(symbol.clone(), lot_id)) {
            Some(id) => *id,
            None => {
                collateral.transfer(self.account, owner, amount)?;
                return Ok(None);
            }
        };

        let mut record = self.record(id)?.clone();
        let key = PositionKey::new(record.owner, &symbol);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::PositionNotFound(key.to_string()))?;

        let deficit_added = self.write_off(&mut record, &mut position)?;
        record.status = LiquidationStatus::Settled;
        let reserve = self.reserves.entry(symbol.clone()).or_insert(0);
        *reserve = safe_add(*reserve, amount)?;
        self.positions.remove(&key);
        self.liquidations[id as usize] = record;

        warn!(liquidation_id = id, lot_id, amount, deficit_added, "collateral lot expired");

        Ok(Some(LiquidationSettledEvent {
            liquidation_id: id,
            lot_id,
            proceeds: 0,
            principal_repaid: 0,
            surplus_added: 0,
            extra_credited: 0,
            deficit_added,
            residual_collateral: 0,
            closed: true,
            timestamp: ctx.now,
        }))
    }

    /// Book unpaid principal as deficit and forgive the rest of the debt
    fn write_off(&mut self, record: &mut LiquidationRecord, position: &mut CollateralPosition) -> Result<u128> {
        let Outstanding { principal, fees, .. } = record.outstanding;
        position.settle(principal, fees)?;
        self.sub_debt(&record.symbol, safe_add(principal, fees)?)?;
        self.ledger.deficit = safe_add(self.ledger.deficit, principal)?;
        record.deficit = safe_add(record.deficit, principal)?;
        record.outstanding = Outstanding::default();
        Ok(principal)
    }

    /// Withdraw residual collateral from a settled lot (position owner only)
    #[allow(clippy::too_many_arguments)]
    pub fn remove_collateral(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        price_index: u64,
        lot_index: u64,
        amount: u128,
    ) -> Result<ResidualCollateralRemovedEvent> {
        validate_non_zero(amount)?;
        let symbol = auction.symbol().to_string();
        let lot_id = auction.lot_id(price_index, lot_index)?;
        let not_settled = || Error::LotNotSettled {
            price_index,
            lot_index,
        };
        let id = *self
            .by_lot
            .get(&(symbol.clone(), lot_id))
            .ok_or_else(not_settled)?;
        let record = self.record(id)?;
        if record.owner != ctx.caller {
            return Err(Error::Unauthorized("only the position owner may remove collateral".into()));
        }
        if record.status != LiquidationStatus::Settled {
            return Err(not_settled());
        }
        if amount > record.residual_collateral {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: record.residual_collateral,
            });
        }

        auction.release_residual(
            &ctx.as_account(self.account),
            access,
            lot_id,
            amount,
            ctx.caller,
            collateral,
        )?;
        self.liquidations[id as usize].residual_collateral -= amount;

        info!(owner = %ctx.caller, symbol = %symbol, lot_id, amount, "residual collateral removed");

        Ok(ResidualCollateralRemovedEvent {
            owner: ctx.caller,
            symbol,
            price_index,
            lot_index,
            amount,
            timestamp: ctx.now,
        })
    }

    /// Pay out proceeds that exceeded everything a liquidation owed
    pub fn claim_extra_debt(
        &mut self,
        ctx: &CallContext,
        stable: &mut dyn FungibleToken,
        index: u64,
        symbol: &str,
    ) -> Result<ExtraDebtClaimedEvent> {
        let record = self
            .liquidations
            .get(index as usize)
            .filter(|record| record.symbol == symbol)
            .ok_or(Error::LiquidationNotFound(index))?;
        if record.owner != ctx.caller {
            return Err(Error::Unauthorized("only the position owner may claim".into()));
        }
        let amount = record.extra_debt;
        if amount == 0 {
            return Err(Error::NothingToClaim(index));
        }

        stable.transfer(self.account, ctx.caller, amount)?;
        self.liquidations[index as usize].extra_debt = 0;

        info!(owner = %ctx.caller, liquidation_id = index, amount, "extra debt claimed");

        Ok(ExtraDebtClaimedEvent {
            liquidation_id: index,
            owner: ctx.caller,
            amount,
            timestamp: ctx.now,
        })
    }

    /// Pull an untouched lot back into its position once the price has recovered
    /// above the liquidation threshold (position owner only).
    #[allow(clippy::too_many_arguments)]
    pub fn cancel_auction(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        oracle: &PriceOracle,
        auction: &mut CollateralAuction,
        collateral: &mut dyn FungibleToken,
        lot_id: u64,
    ) -> Result<AuctionCancelledEvent> {
        let symbol = auction.symbol().to_string();
        let lot = auction
            .lot(lot_id)
            .cloned()
            .ok_or_else(|| Error::LotNotFound(lot_id.to_string()))?;
        if lot.owner != ctx.caller {
            return Err(Error::Unauthorized("only the lot owner may cancel".into()));
        }
        let router_ctx = ctx.as_account(self.account);

        let id = match self.by_lot.get(&(symbol.clone(), lot_id)) {
            Some(id) => *id,
            None => {
                let amount = auction.cancel_lot(&router_ctx, access, lot_id, ctx.caller, collateral)?;
                return Ok(self.cancelled_event(ctx, &symbol, lot_id, amount));
            }
        };

        let config = self.collateral_config(&symbol)?.clone();
        let mut record = self.record(id)?.clone();
        if !record.is_auctioning() {
            return Err(Error::LotNotOpen);
        }
        let key = PositionKey::new(record.owner, &symbol);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::PositionNotFound(key.to_string()))?;

        let price = oracle.get_price(&symbol, ctx.now)?;
        let value = collateral_value(lot.collateral_amount, config.decimals, price, self.stable_decimals)?;
        let ratio = collateral_ratio(value, position.debt_amount);
        if ratio < config.liquidation_threshold {
            return Err(Error::PriceNotRecovered {
                ratio,
                threshold: config.liquidation_threshold,
            });
        }

        let amount = auction.cancel_lot(&router_ctx, access, lot_id, self.account, collateral)?;

        position.collateral_amount = amount;
        position.status = PositionStatus::Active;
        position.last_accrual_time = ctx.now;
        record.status = LiquidationStatus::Cancelled;
        record.outstanding = Outstanding::default();

        self.add_collateral_total(&symbol, amount)?;
        self.positions.insert(key, position);
        self.liquidations[id as usize] = record;

        Ok(self.cancelled_event(ctx, &symbol, lot_id, amount))
    }

    fn cancelled_event(&self, ctx: &CallContext, symbol: &str, lot_id: u64, amount: u128) -> AuctionCancelledEvent {
        info!(owner = %ctx.caller, symbol, lot_id, amount, "collateral auction cancelled");
        AuctionCancelledEvent {
            symbol: symbol.to_string(),
            lot_id,
            owner: ctx.caller,
            amount,
            timestamp: ctx.now,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a collateral type (admin only)
    pub fn add_collateral(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        config: CollateralConfig,
    ) -> Result<CollateralAddedEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        config.validate()?;
        if self.collaterals.contains_key(&config.symbol) {
            return Err(Error::InvalidParameter {
                name: "symbol".into(),
                reason: format!("collateral {} already registered", config.symbol),
            });
        }

        info!(symbol = %config.symbol, decimals = config.decimals, "collateral type added");
        let event = CollateralAddedEvent {
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            timestamp: ctx.now,
        };
        self.collaterals.insert(config.symbol.clone(), config);
        Ok(event)
    }

    /// Release reserve collateral (admin only)
    pub fn sweep_reserve(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        collateral: &mut dyn FungibleToken,
        symbol: &str,
        amount: u128,
        to: PublicKey,
    ) -> Result<ReserveSweptEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        validate_non_zero(amount)?;
        let available = self.reserve(symbol);
        if amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }

        collateral.transfer(self.account, to, amount)?;
        self.reserves.insert(symbol.to_string(), available - amount);

        info!(symbol, to = %to, amount, "reserve swept");
        Ok(ReserveSweptEvent {
            symbol: symbol.to_string(),
            to,
            amount,
            timestamp: ctx.now,
        })
    }

    /// Deficit covered by a debt auction sale
    pub(crate) fn retire_deficit(&mut self, amount: u128) -> Result<()> {
        self.ledger.deficit = safe_sub(self.ledger.deficit, amount)?;
        Ok(())
    }

    /// Pay surplus stable out to a surplus auction buyer
    pub(crate) fn release_surplus(
        &mut self,
        amount: u128,
        to: PublicKey,
        stable: &mut dyn FungibleToken,
    ) -> Result<()> {
        if amount > self.ledger.surplus {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: self.ledger.surplus,
            });
        }
        stable.transfer(self.account, to, amount)?;
        self.ledger.surplus -= amount;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn book_imbalance(&mut self, deficit: u128, surplus: u128) {
        self.ledger.deficit = deficit;
        self.ledger.surplus = surplus;
    }

    #[cfg(test)]
    pub(crate) fn skew_total_debt(&mut self, amount: u128) {
        self.ledger.total_debt += amount;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Sum of all position debt
    pub fn total_debt(&self) -> u128 {
        self.ledger.total_debt
    }

    /// Custody collateral backing positions of `symbol`
    pub fn total_collateral(&self, symbol: &str) -> u128 {
        self.ledger.total_collateral.get(symbol).copied().unwrap_or(0)
    }

    /// USD value of all custody collateral, in stable units
    pub fn total_collateral_value(&self, oracle: &PriceOracle, now: u64) -> Result<u128> {
        let mut total = 0u128;
        for (symbol, amount) in &self.ledger.total_collateral {
            if *amount == 0 {
                continue;
            }
            let config = self.collateral_config(symbol)?;
            let price = oracle.get_price(symbol, now)?;
            let value = collateral_value(*amount, config.decimals, price, self.stable_decimals)?;
            total = safe_add(total, value)?;
        }
        Ok(total)
    }

    /// Unrecovered principal
    pub fn deficit(&self) -> u128 {
        self.ledger.deficit
    }

    /// Stable retained from fees and penalties
    pub fn surplus(&self) -> u128 {
        self.ledger.surplus
    }

    /// The solvency ledger
    pub fn ledger(&self) -> &GlobalLedger {
        &self.ledger
    }

    /// Reserve collateral of `symbol`
    pub fn reserve(&self, symbol: &str) -> u128 {
        self.reserves.get(symbol).copied().unwrap_or(0)
    }

    /// Position of `owner` in `symbol`
    pub fn position(&self, owner: &PublicKey, symbol: &str) -> Option<&CollateralPosition> {
        self.positions.get(&PositionKey::new(*owner, symbol))
    }

    /// All open positions
    pub fn positions(&self) -> impl Iterator<Item = &CollateralPosition> {
        self.positions.values()
    }

    /// Liquidation record by index
    pub fn liquidation(&self, index: u64) -> Option<&LiquidationRecord> {
        self.liquidations.get(index as usize)
    }

    /// Number of liquidations ever opened
    pub fn liquidation_count(&self) -> u64 {
        self.liquidations.len() as u64
    }

    /// Current ratio of a position
    pub fn collateral_ratio(&self, oracle: &PriceOracle, owner: &PublicKey, symbol: &str, now: u64) -> Result<u128> {
        let config = self.collateral_config(symbol)?;
        let position = self
            .position(owner, symbol)
            .ok_or_else(|| Error::PositionNotFound(PositionKey::new(*owner, symbol).to_string()))?;
        let price = oracle.get_price(symbol, now)?;
        position.ratio(config.decimals, price, self.stable_decimals)
    }

    /// Registered collateral type
    pub fn collateral_config(&self, symbol: &str) -> Result<&CollateralConfig> {
        self.collaterals
            .get(symbol)
            .ok_or_else(|| Error::UnsupportedCollateral(symbol.to_string()))
    }

    /// Symbols of all registered collateral types
    pub fn collateral_symbols(&self) -> Vec<String> {
        self.collaterals.keys().cloned().collect()
    }

    /// Router module account
    pub fn account(&self) -> PublicKey {
        self.account
    }

    /// Check the ledger against the position book
    pub fn verify_ledger(&self) -> Result<()> {
        let mut debt = 0u128;
        let mut collateral: BTreeMap<&str, u128> = BTreeMap::new();
        for position in self.positions.values() {
            debt = safe_add(debt, position.debt_amount)?;
            let entry = collateral.entry(position.symbol.as_str()).or_insert(0);
            *entry = safe_add(*entry, position.collateral_amount)?;
        }

        if debt != self.ledger.total_debt {
            return Err(Error::InvariantViolation(format!(
                "total debt {} != sum of positions {}",
                self.ledger.total_debt, debt
            )));
        }
        let by_symbol = self.debt_by_symbol.values().try_fold(0u128, |acc, d| safe_add(acc, *d))?;
        if by_symbol != self.ledger.total_debt {
            return Err(Error::InvariantViolation(format!(
                "per-symbol debt {} != total debt {}",
                by_symbol, self.ledger.total_debt
            )));
        }
        for (symbol, total) in &self.ledger.total_collateral {
            let held = collateral.get(symbol.as_str()).copied().unwrap_or(0);
            if held != *total {
                return Err(Error::InvariantViolation(format!(
                    "{} collateral {} != sum of positions {}",
                    symbol, total, held
                )));
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn record(&self, id: u64) -> Result<&LiquidationRecord> {
        self.liquidations
            .get(id as usize)
            .ok_or(Error::LiquidationNotFound(id))
    }

    fn active_position(&self, owner: PublicKey, symbol: &str) -> Result<(PositionKey, CollateralPosition)> {
        let key = PositionKey::new(owner, symbol);
        let position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::PositionNotFound(key.to_string()))?;
        if !position.is_active() {
            return Err(Error::AlreadyLiquidating(key.to_string()));
        }
        Ok((key, position))
    }

    fn store_position(&mut self, key: PositionKey, position: CollateralPosition) {
        if position.is_empty() {
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, position);
        }
    }

    fn symbol_debt(&self, symbol: &str) -> u128 {
        self.debt_by_symbol.get(symbol).copied().unwrap_or(0)
    }

    fn add_debt(&mut self, symbol: &str, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ledger.total_debt = safe_add(self.ledger.total_debt, amount)?;
        let entry = self.debt_by_symbol.entry(symbol.to_string()).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    fn sub_debt(&mut self, symbol: &str, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ledger.total_debt = safe_sub(self.ledger.total_debt, amount)?;
        let entry = self.debt_by_symbol.entry(symbol.to_string()).or_insert(0);
        *entry = safe_sub(*entry, amount)?;
        Ok(())
    }

    fn add_collateral_total(&mut self, symbol: &str, amount: u128) -> Result<()> {
        let entry = self.ledger.total_collateral.entry(symbol.to_string()).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    fn sub_collateral_total(&mut self, symbol: &str, amount: u128) -> Result<()> {
        let entry = self.ledger.total_collateral.entry(symbol.to_string()).or_insert(0);
        *entry = safe_sub(*entry, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OracleConfig;
    use crate::core::token::TokenLedger;
    use crate::oracle::{EcdsaVerifier, PriceSigner};
    use crate::utils::constants::{PUBKEY_LENGTH, WAD};

    fn admin() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn user() -> PublicKey {
        PublicKey::new([0x03; PUBKEY_LENGTH])
    }

    struct Fixture {
        router: CdpRouter,
        access: AccessControl,
        oracle: PriceOracle,
        eth: TokenLedger,
        stable: TokenLedger,
    }

    fn setup(config: CollateralConfig) -> Fixture {
        let router = CdpRouter::new(18, &[config]);
        let access = AccessControl::new(admin());
        let ctx = CallContext::new(admin(), 0);

        let signer = PriceSigner::generate();
        let mut oracle = PriceOracle::new(&OracleConfig::default());
        oracle.authorize_signer(&ctx, &access, signer.public_key()).unwrap();
        oracle
            .update_price(&ctx, &EcdsaVerifier, 1, 2000 * WAD, &signer.sign_price(1, 2000 * WAD, "ETH"), "ETH")
            .unwrap();

        let mut eth = TokenLedger::new("Ether", "ETH", 18, admin());
        eth.set_minter(&admin(), admin(), true).unwrap();
        eth.mint(admin(), user(), 10 * WAD).unwrap();

        let mut stable = TokenLedger::new("Stable", "USDS", 18, admin());
        stable.set_minter(&admin(), router.account(), true).unwrap();

        Fixture {
            router,
            access,
            oracle,
            eth,
            stable,
        }
    }

    impl Fixture {
        fn produce(&mut self, amount: u128, ratio: u128, now: u64) -> Result<StableProducedEvent> {
            self.router.produce_stable(
                &CallContext::new(user(), now),
                &self.oracle,
                &mut self.eth,
                &mut self.stable,
                amount,
                ratio,
                "ETH",
            )
        }
    }

    #[test]
    fn test_produce_repay_withdraw() {
        let mut f = setup(CollateralConfig::new("ETH", 18));

        let event = f.produce(10 * WAD, 2 * WAD, 10).unwrap();
        assert_eq!(event.stable_minted, 10_000 * WAD);
        assert_eq!(event.ratio, 2 * WAD);
        assert_eq!(f.stable.balance_of(&user()), 10_000 * WAD);
        assert_eq!(f.eth.balance_of(&f.router.account()), 10 * WAD);
        assert_eq!(f.router.total_collateral("ETH"), 10 * WAD);

        let ctx = CallContext::new(user(), 20);
        let repaid = f.router.repay_stable(&ctx, &mut f.stable, 4_000 * WAD, "ETH").unwrap();
        assert_eq!(repaid.principal_repaid, 4_000 * WAD);
        assert_eq!(repaid.remaining_debt, 6_000 * WAD);
        assert_eq!(f.stable.total_supply(), 6_000 * WAD);

        // 6000 debt at 1.5 needs 4.5 ETH
        let result = f.router.withdraw_collateral(&ctx, &f.oracle, &mut f.eth, 6 * WAD, "ETH");
        assert!(matches!(result, Err(Error::RatioTooLow { .. })));

        f.router
            .withdraw_collateral(&ctx, &f.oracle, &mut f.eth, 5 * WAD + WAD / 2, "ETH")
            .unwrap();
        assert_eq!(f.eth.balance_of(&user()), 5 * WAD + WAD / 2);
        assert_eq!(f.router.position(&user(), "ETH").unwrap().collateral_amount, 4 * WAD + WAD / 2);
        f.router.verify_ledger().unwrap();
    }

    #[test]
    fn test_produce_rejects_low_target_ratio() {
        let mut f = setup(CollateralConfig::new("ETH", 18));

        let result = f.produce(10 * WAD, WAD + WAD / 5, 10);
        assert!(matches!(result, Err(Error::RatioTooLow { .. })));
        assert!(f.router.position(&user(), "ETH").is_none());
        assert_eq!(f.eth.balance_of(&user()), 10 * WAD);
    }

    #[test]
    fn test_produce_respects_debt_ceiling() {
        let mut f = setup(CollateralConfig::new("ETH", 18).with_debt_ceiling(5_000 * WAD));

        assert!(matches!(f.produce(10 * WAD, 2 * WAD, 10), Err(Error::DebtCeilingReached { .. })));
        f.produce(5 * WAD, 2 * WAD, 10).unwrap();
        assert_eq!(f.router.total_debt(), 5_000 * WAD);
    }

    #[test]
    fn test_stale_price_blocks_produce() {
        let mut f = setup(CollateralConfig::new("ETH", 18));
        let late = OracleConfig::default().validity_window + 1;

        assert!(matches!(f.produce(WAD, 2 * WAD, late), Err(Error::StalePrice { .. })));
    }

    #[test]
    fn test_healthy_position_cannot_be_liquidated() {
        let mut f = setup(CollateralConfig::new("ETH", 18));
        f.produce(10 * WAD, 2 * WAD, 10).unwrap();
        let mut auction = CollateralAuction::new("ETH", 18, 18, f.router.account(), Default::default());

        let result = f.router.liquidate(
            &CallContext::new(admin(), 20),
            &f.access,
            &f.oracle,
            &mut auction,
            &mut f.eth,
            user(),
            "ETH",
        );
        assert!(matches!(result, Err(Error::PositionHealthy(_))));
    }

    #[test]
    fn test_add_collateral_admin_only_and_unique() {
        let mut f = setup(CollateralConfig::new("ETH", 18));

        let result = f.router.add_collateral(
            &CallContext::new(user(), 0),
            &f.access,
            CollateralConfig::new("WBTC", 8),
        );
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        let ctx = CallContext::new(admin(), 0);
        f.router.add_collateral(&ctx, &f.access, CollateralConfig::new("WBTC", 8)).unwrap();
        assert!(f.router.collateral_symbols().contains(&"WBTC".to_string()));
        assert!(f.router.add_collateral(&ctx, &f.access, CollateralConfig::new("ETH", 18)).is_err());
    }

    #[test]
    fn test_sweep_reserve_bounded_by_reserve() {
        let mut f = setup(CollateralConfig::new("ETH", 18));

        let result = f.router.sweep_reserve(
            &CallContext::new(admin(), 0),
            &f.access,
            &mut f.eth,
            "ETH",
            WAD,
            admin(),
        );
        assert!(matches!(result, Err(Error::InsufficientBalance { available: 0, .. })));
    }
}
