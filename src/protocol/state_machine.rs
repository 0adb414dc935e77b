//! Protocol State Machine - Core orchestration engine.
//!
//! [`Protocol`] owns every component and executes one
//! [`ProtocolOperation`] at a time. Components never reach into each other;
//! the state machine passes each one exactly the collaborators an operation
//! needs. An operation either commits completely or leaves the state as it
//! was: the state is snapshotted before execution and restored on error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::auction::collateral::CollateralAuction;
use crate::auction::debt::DebtAuction;
use crate::auction::surplus::SurplusAuction;
use crate::core::access::{AccessControl, CallContext, Role};
use crate::core::config::{CollateralConfig, ProtocolConfig};
use crate::core::token::{FungibleToken, TokenLedger};
use crate::error::{Error, Result};
use crate::oracle::{AttestationVerifier, EcdsaVerifier, PriceOracle};
use crate::protocol::events::*;
use crate::protocol::operations::*;
use crate::router::CdpRouter;
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::safe_add;

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete protocol state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolState {
    /// Protocol configuration
    pub config: ProtocolConfig,
    /// Role registry
    pub access: AccessControl,
    /// Stable asset ledger
    pub stable: TokenLedger,
    /// Governance token ledger
    pub governance: TokenLedger,
    /// Collateral token ledgers by symbol
    pub collateral_tokens: BTreeMap<String, TokenLedger>,
    /// Price oracle
    pub oracle: PriceOracle,
    /// CDP router
    pub router: CdpRouter,
    /// Collateral auctions by symbol
    pub collateral_auctions: BTreeMap<String, CollateralAuction>,
    /// Debt auction
    pub debt_auction: DebtAuction,
    /// Surplus auction
    pub surplus_auction: SurplusAuction,
    /// Committed events
    pub events: EventLog,
}

impl ProtocolState {
    /// Fresh state with `admin` as the only admin
    pub fn new(config: ProtocolConfig, admin: PublicKey) -> Result<Self> {
        config.validate()?;
        let admin_ctx = CallContext::new(admin, 0);

        let router = CdpRouter::new(config.stable_decimals, &config.collaterals);
        let debt_auction = DebtAuction::new(
            config.stable_decimals,
            config.governance_decimals,
            config.debt_auction.clone(),
        );
        let surplus_auction = SurplusAuction::new(
            config.stable_decimals,
            config.governance_decimals,
            config.surplus_auction.clone(),
        );

        let mut access = AccessControl::new(admin);
        access.grant_role(&admin_ctx, Role::Router, router.account())?;

        let mut stable = TokenLedger::new("Stable", &config.stable_symbol, config.stable_decimals, admin);
        stable.set_minter(&admin, router.account(), true)?;
        stable.set_minter(&admin, debt_auction.account(), true)?;

        let mut governance = TokenLedger::new(
            "Governance",
            &config.governance_symbol,
            config.governance_decimals,
            admin,
        );
        governance.set_minter(&admin, debt_auction.account(), true)?;
        governance.set_minter(&admin, surplus_auction.account(), true)?;
        governance.set_minter(&admin, admin, true)?;

        let mut state = Self {
            oracle: PriceOracle::new(&config.oracle),
            access,
            stable,
            governance,
            collateral_tokens: BTreeMap::new(),
            router,
            collateral_auctions: BTreeMap::new(),
            debt_auction,
            surplus_auction,
            events: EventLog::new(),
            config: config.clone(),
        };
        for collateral in &config.collaterals {
            state.install_collateral(collateral, admin)?;
        }
        Ok(state)
    }

    /// Create the token ledger and auction of a collateral type
    fn install_collateral(&mut self, collateral: &CollateralConfig, admin: PublicKey) -> Result<()> {
        let mut token = TokenLedger::new(&collateral.symbol, &collateral.symbol, collateral.decimals, admin);
        token.set_minter(&admin, admin, true)?;
        self.collateral_tokens.insert(collateral.symbol.clone(), token);

        let auction = CollateralAuction::new(
            &collateral.symbol,
            collateral.decimals,
            self.config.stable_decimals,
            self.router.account(),
            self.config.collateral_auction.clone(),
        );
        self.collateral_auctions.insert(collateral.symbol.clone(), auction);
        Ok(())
    }

    fn token_mut(&mut self, asset: &Asset) -> Result<&mut TokenLedger> {
        match asset {
            Asset::Stable => Ok(&mut self.stable),
            Asset::Governance => Ok(&mut self.governance),
            Asset::Collateral(symbol) => self
                .collateral_tokens
                .get_mut(symbol)
                .ok_or_else(|| Error::UnsupportedCollateral(symbol.clone())),
        }
    }

    fn token(&self, asset: &Asset) -> Result<&TokenLedger> {
        match asset {
            Asset::Stable => Ok(&self.stable),
            Asset::Governance => Ok(&self.governance),
            Asset::Collateral(symbol) => self
                .collateral_tokens
                .get(symbol)
                .ok_or_else(|| Error::UnsupportedCollateral(symbol.clone())),
        }
    }
}

/// Auction and token ledger of one collateral symbol, borrowed together
fn collateral_pair<'a>(
    auctions: &'a mut BTreeMap<String, CollateralAuction>,
    tokens: &'a mut BTreeMap<String, TokenLedger>,
    symbol: &str,
) -> Result<(&'a mut CollateralAuction, &'a mut TokenLedger)> {
    let auction = auctions
        .get_mut(symbol)
        .ok_or_else(|| Error::UnsupportedCollateral(symbol.to_string()))?;
    let token = tokens
        .get_mut(symbol)
        .ok_or_else(|| Error::UnsupportedCollateral(symbol.to_string()))?;
    Ok((auction, token))
}

fn collateral_token<'a>(tokens: &'a mut BTreeMap<String, TokenLedger>, symbol: &str) -> Result<&'a mut TokenLedger> {
    tokens
        .get_mut(symbol)
        .ok_or_else(|| Error::UnsupportedCollateral(symbol.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol state machine - orchestrates all operations
pub struct Protocol {
    state: ProtocolState,
    verifier: Box<dyn AttestationVerifier>,
}

impl Protocol {
    /// Create a protocol with the ECDSA attestation verifier
    pub fn new(config: ProtocolConfig, admin: PublicKey) -> Result<Self> {
        let state = ProtocolState::new(config, admin)?;
        info!(
            admin = %admin,
            collaterals = state.config.collaterals.len(),
            "protocol initialized"
        );
        Ok(Self {
            state,
            verifier: Box::new(EcdsaVerifier),
        })
    }

    /// Replace the attestation verifier
    pub fn with_verifier(mut self, verifier: Box<dyn AttestationVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute an operation atomically, returning the events it produced.
    /// The router's debt ledger is checked before the operation commits.
    pub fn execute(&mut self, ctx: &CallContext, op: ProtocolOperation) -> Result<Vec<ProtocolEvent>> {
        let operation = op.operation_type();
        let snapshot = self.state.clone();

        match self.dispatch(ctx, op).and_then(|events| {
            self.state.router.verify_ledger()?;
            Ok(events)
        }) {
            Ok(events) => {
                debug!(operation, caller = %ctx.caller, events = events.len(), "operation committed");
                self.state.events.extend(events.clone());
                Ok(events)
            }
            Err(e) => {
                self.state = snapshot;
                warn!(operation, caller = %ctx.caller, error = %e, "operation rejected");
                Err(e)
            }
        }
    }

    fn dispatch(&mut self, ctx: &CallContext, op: ProtocolOperation) -> Result<Vec<ProtocolEvent>> {
        match op {
            ProtocolOperation::UpdatePrice {
                nonce,
                price,
                signature,
                symbol,
            } => {
                let event = self.state.oracle.update_price(
                    ctx,
                    self.verifier.as_ref(),
                    nonce,
                    price,
                    &signature,
                    &symbol,
                )?;
                Ok(vec![ProtocolEvent::PriceUpdated(event)])
            }
            ProtocolOperation::UpdatePrices {
                nonce,
                signature,
                prices,
                symbols,
            } => {
                let events = self.state.oracle.update_prices(
                    ctx,
                    self.verifier.as_ref(),
                    nonce,
                    &signature,
                    &prices,
                    &symbols,
                )?;
                Ok(events.into_iter().map(ProtocolEvent::PriceUpdated).collect())
            }
            ProtocolOperation::SetValidityWindow { secs } => {
                let event = self.state.oracle.set_validity_window(ctx, &self.state.access, secs)?;
                Ok(vec![ProtocolEvent::ValidityWindowChanged(event)])
            }
            ProtocolOperation::AuthorizeSigner { signer } => {
                let event = self.state.oracle.authorize_signer(ctx, &self.state.access, signer)?;
                Ok(vec![ProtocolEvent::SignerChanged(event)])
            }
            ProtocolOperation::RevokeSigner { signer } => {
                let event = self.state.oracle.revoke_signer(ctx, &self.state.access, signer)?;
                Ok(vec![ProtocolEvent::SignerChanged(event)])
            }

            ProtocolOperation::GrantRole { role, account } => {
                self.state.access.grant_role(ctx, role, account)?;
                Ok(vec![role_changed(ctx, role, account, true)])
            }
            ProtocolOperation::RevokeRole { role, account } => {
                self.state.access.revoke_role(ctx, role, &account)?;
                Ok(vec![role_changed(ctx, role, account, false)])
            }
            ProtocolOperation::AddCollateral { config } => self.execute_add_collateral(ctx, config),
            ProtocolOperation::SweepReserve { symbol, amount, to } => {
                let state = &mut self.state;
                let token = collateral_token(&mut state.collateral_tokens, &symbol)?;
                let event = state
                    .router
                    .sweep_reserve(ctx, &state.access, token, &symbol, amount, to)?;
                Ok(vec![ProtocolEvent::ReserveSwept(event)])
            }

            ProtocolOperation::Approve { asset, spender, amount } => {
                self.state.token_mut(&asset)?.approve(ctx.caller, spender, amount)?;
                Ok(Vec::new())
            }
            ProtocolOperation::Transfer { asset, to, amount } => {
                self.state.token_mut(&asset)?.transfer(ctx.caller, to, amount)?;
                Ok(Vec::new())
            }
            ProtocolOperation::Mint { asset, to, amount } => {
                self.state.token_mut(&asset)?.mint(ctx.caller, to, amount)?;
                Ok(Vec::new())
            }

            ProtocolOperation::ProduceStable {
                collateral_amount,
                target_ratio,
                symbol,
            } => {
                let state = &mut self.state;
                let token = collateral_token(&mut state.collateral_tokens, &symbol)?;
                let event = state.router.produce_stable(
                    ctx,
                    &state.oracle,
                    token,
                    &mut state.stable,
                    collateral_amount,
                    target_ratio,
                    &symbol,
                )?;
                Ok(vec![ProtocolEvent::StableProduced(event)])
            }
            ProtocolOperation::RepayStable { amount, symbol } => {
                let state = &mut self.state;
                let event = state.router.repay_stable(ctx, &mut state.stable, amount, &symbol)?;
                Ok(vec![ProtocolEvent::StableRepaid(event)])
            }
            ProtocolOperation::WithdrawCollateral { amount, symbol } => {
                let state = &mut self.state;
                let token = collateral_token(&mut state.collateral_tokens, &symbol)?;
                let event = state
                    .router
                    .withdraw_collateral(ctx, &state.oracle, token, amount, &symbol)?;
                Ok(vec![ProtocolEvent::CollateralWithdrawn(event)])
            }
            ProtocolOperation::Liquidate { owner, symbol } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let (liquidated, started) = state.router.liquidate(
                    ctx,
                    &state.access,
                    &state.oracle,
                    auction,
                    token,
                    owner,
                    &symbol,
                )?;
                Ok(vec![
                    ProtocolEvent::LotStarted(started),
                    ProtocolEvent::PositionLiquidated(liquidated),
                ])
            }
            ProtocolOperation::AuctionOwnCollateral { symbol } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let (liquidated, started) = state.router.auction_own_collateral(
                    ctx,
                    &state.access,
                    &state.oracle,
                    auction,
                    token,
                    &symbol,
                )?;
                Ok(vec![
                    ProtocolEvent::LotStarted(started),
                    ProtocolEvent::PositionLiquidated(liquidated),
                ])
            }
            ProtocolOperation::RemoveCollateral {
                price_index,
                lot_index,
                amount,
                symbol,
            } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let event = state.router.remove_collateral(
                    ctx,
                    &state.access,
                    auction,
                    token,
                    price_index,
                    lot_index,
                    amount,
                )?;
                Ok(vec![ProtocolEvent::ResidualCollateralRemoved(event)])
            }
            ProtocolOperation::ClaimExtraDebt { index, symbol } => {
                let state = &mut self.state;
                let event = state
                    .router
                    .claim_extra_debt(ctx, &mut state.stable, index, &symbol)?;
                Ok(vec![ProtocolEvent::ExtraDebtClaimed(event)])
            }
            ProtocolOperation::ExpireLot {
                price_index,
                lot_index,
                symbol,
            } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let settled = state
                    .router
                    .expire_lot(ctx, &state.access, auction, token, price_index, lot_index)?;
                Ok(settled.into_iter().map(ProtocolEvent::LiquidationSettled).collect())
            }

            ProtocolOperation::StartCollateralAuction {
                symbol,
                price_index,
                lot_index,
                amount,
            } => {
                let state = &mut self.state;
                let has_position = state
                    .router
                    .position(&ctx.caller, &symbol)
                    .is_some_and(|position| position.is_active());
                if !has_position && !state.access.has_role(Role::Router, &ctx.caller) {
                    return Err(Error::Unauthorized(format!(
                        "{} has no open {} position",
                        ctx.caller, symbol
                    )));
                }
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                token.transfer(ctx.caller, auction.account(), amount)?;
                let event = auction.start_auction(
                    ctx,
                    &state.access,
                    ctx.caller,
                    price_index,
                    lot_index,
                    amount,
                    &*token,
                )?;
                Ok(vec![ProtocolEvent::LotStarted(event)])
            }
            ProtocolOperation::BuyLot {
                symbol,
                price_index,
                lot_index,
            } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let (purchase, bought) = auction.buy_lot(ctx, price_index, lot_index, &mut state.stable, token)?;
                let settled = state
                    .router
                    .on_purchase(ctx, &state.access, auction, &mut state.stable, &purchase)?;
                Ok(purchase_events(bought, settled))
            }
            ProtocolOperation::BuyLotById { symbol, lot_id } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let (purchase, bought) = auction.buy_lot_by_id(ctx, lot_id, &mut state.stable, token)?;
                let settled = state
                    .router
                    .on_purchase(ctx, &state.access, auction, &mut state.stable, &purchase)?;
                Ok(purchase_events(bought, settled))
            }
            ProtocolOperation::LiquidateLot { symbol, lot_id, amount } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let (purchase, bought) = auction.liquidate_lot(ctx, lot_id, amount, &mut state.stable, token)?;
                let settled = state
                    .router
                    .on_purchase(ctx, &state.access, auction, &mut state.stable, &purchase)?;
                Ok(purchase_events(bought, settled))
            }
            ProtocolOperation::CancelAuction { symbol, lot_id } => {
                let state = &mut self.state;
                let (auction, token) = collateral_pair(&mut state.collateral_auctions, &mut state.collateral_tokens, &symbol)?;
                let event = state
                    .router
                    .cancel_auction(ctx, &state.access, &state.oracle, auction, token, lot_id)?;
                Ok(vec![ProtocolEvent::AuctionCancelled(event)])
            }

            ProtocolOperation::StartDebtAuction { amount } => {
                let state = &mut self.state;
                let event = state.debt_auction.start_auction(ctx, &state.router, amount)?;
                Ok(vec![ProtocolEvent::DebtAuctionStarted(event)])
            }
            ProtocolOperation::BuyDebtLot { amount } => {
                let state = &mut self.state;
                let event = state.debt_auction.buy_lot(
                    ctx,
                    &mut state.router,
                    &mut state.stable,
                    &mut state.governance,
                    amount,
                )?;
                Ok(vec![ProtocolEvent::DebtLotPurchased(event)])
            }

            ProtocolOperation::StartSurplusAuction { amount } => {
                let state = &mut self.state;
                let event = state.surplus_auction.start_auction(ctx, &state.router, amount)?;
                Ok(vec![ProtocolEvent::SurplusAuctionStarted(event)])
            }
            ProtocolOperation::BuySurplusLot { amount, bid } => {
                let state = &mut self.state;
                let event = state.surplus_auction.buy_lot(
                    ctx,
                    &mut state.router,
                    &mut state.stable,
                    &mut state.governance,
                    amount,
                    bid,
                )?;
                Ok(vec![ProtocolEvent::SurplusLotPurchased(event)])
            }
            ProtocolOperation::CancelSurplusLot { lot_id } => {
                let state = &mut self.state;
                let event = state.surplus_auction.cancel_lot(ctx, &state.access, lot_id)?;
                Ok(vec![ProtocolEvent::SurplusLotCancelled(event)])
            }
        }
    }

    fn execute_add_collateral(&mut self, ctx: &CallContext, config: CollateralConfig) -> Result<Vec<ProtocolEvent>> {
        let state = &mut self.state;
        let event = state.router.add_collateral(ctx, &state.access, config.clone())?;
        state.install_collateral(&config, ctx.caller)?;
        state.config.collaterals.push(config);
        Ok(vec![ProtocolEvent::CollateralAdded(event)])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check ledger and custody invariants across all components
    pub fn verify_invariants(&self) -> Result<()> {
        let state = &self.state;
        state.router.verify_ledger()?;

        let ledgers = [&state.stable, &state.governance]
            .into_iter()
            .chain(state.collateral_tokens.values());
        for ledger in ledgers {
            if !ledger.verify_supply_invariant() {
                return Err(Error::InvariantViolation(format!(
                    "{} balances do not sum to supply",
                    ledger.symbol()
                )));
            }
        }

        let router = state.router.account();
        let mut owed_stable = state.router.surplus();
        for index in 0..state.router.liquidation_count() {
            if let Some(record) = state.router.liquidation(index) {
                owed_stable = safe_add(owed_stable, record.extra_debt)?;
            }
        }
        let held = state.stable.balance_of(&router);
        if held < owed_stable {
            return Err(Error::InvariantViolation(format!(
                "router holds {} stable but owes {}",
                held, owed_stable
            )));
        }

        for (symbol, token) in &state.collateral_tokens {
            let custody = safe_add(state.router.total_collateral(symbol), state.router.reserve(symbol))?;
            let held = token.balance_of(&router);
            if held < custody {
                return Err(Error::InvariantViolation(format!(
                    "router holds {} {} but custodies {}",
                    held, symbol, custody
                )));
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize the full state with bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.state).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore a protocol from bytes produced by [`Protocol::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let state: ProtocolState =
            bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Self {
            state,
            verifier: Box::new(EcdsaVerifier),
        })
    }

    /// Write a state snapshot to `path`
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes).map_err(|e| Error::Storage(e.to_string()))?;
        info!(path = %path.as_ref().display(), "snapshot saved");
        Ok(())
    }

    /// Load a protocol from a snapshot file
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| Error::Storage(e.to_string()))?;
        let protocol = Self::from_bytes(&bytes)?;
        info!(path = %path.as_ref().display(), "snapshot loaded");
        Ok(protocol)
    }

    /// Digest of the committed event log
    pub fn state_digest(&self) -> Hash {
        self.state.events.digest()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERY METHODS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Full state
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Protocol configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.state.config
    }

    /// Price oracle
    pub fn oracle(&self) -> &PriceOracle {
        &self.state.oracle
    }

    /// CDP router
    pub fn router(&self) -> &CdpRouter {
        &self.state.router
    }

    /// Collateral auction of `symbol`
    pub fn collateral_auction(&self, symbol: &str) -> Option<&CollateralAuction> {
        self.state.collateral_auctions.get(symbol)
    }

    /// Debt auction
    pub fn debt_auction(&self) -> &DebtAuction {
        &self.state.debt_auction
    }

    /// Surplus auction
    pub fn surplus_auction(&self) -> &SurplusAuction {
        &self.state.surplus_auction
    }

    /// Committed events
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// Balance of `account` in `asset`
    pub fn balance_of(&self, asset: &Asset, account: &PublicKey) -> Result<u128> {
        Ok(self.state.token(asset)?.balance_of(account))
    }

    /// Total supply of `asset`
    pub fn total_supply(&self, asset: &Asset) -> Result<u128> {
        Ok(self.state.token(asset)?.total_supply())
    }

    /// Current price of `symbol`
    pub fn price(&self, symbol: &str, now: u64) -> Result<u128> {
        self.state.oracle.get_price(symbol, now)
    }

    /// Whether `account` holds `role`
    pub fn has_role(&self, role: Role, account: &PublicKey) -> bool {
        self.state.access.has_role(role, account)
    }
}

fn role_changed(ctx: &CallContext, role: Role, account: PublicKey, granted: bool) -> ProtocolEvent {
    ProtocolEvent::RoleChanged(RoleChangedEvent {
        role,
        account,
        granted,
        timestamp: ctx.now,
    })
}

fn purchase_events(bought: LotPurchasedEvent, settled: Option<LiquidationSettledEvent>) -> Vec<ProtocolEvent> {
    let mut events = vec![ProtocolEvent::LotPurchased(bought)];
    events.extend(settled.map(ProtocolEvent::LiquidationSettled));
    events
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
