//! Signed price oracle.
//!
//! This module provides the core price feed functionality:
//! - Signed single and batched price updates with per-symbol nonces
//! - Freshness-checked price reads
//! - Signer and validity window administration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::core::access::{AccessControl, CallContext, Role};
use crate::core::config::OracleConfig;
use crate::error::{Error, Result};
use crate::oracle::attestation::{batch_price_message, price_message, AttestationVerifier};
use crate::protocol::events::{PriceUpdatedEvent, SignerChangedEvent, ValidityWindowChangedEvent};
use crate::utils::crypto::{Hash, PublicKey, Signature};
use crate::utils::validation::*;

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest accepted price of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Asset symbol
    pub symbol: String,
    /// Price in USD (wad)
    pub price: u128,
    /// Time the price was accepted
    pub last_update_time: u64,
    /// Highest nonce accepted for this symbol
    pub last_nonce: u64,
}

impl PriceRecord {
    /// Age of the price in seconds
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_update_time)
    }

    /// Check if price is fresh
    pub fn is_fresh(&self, now: u64, window: u64) -> bool {
        self.age(now) <= window
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Price oracle fed by authorized signers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceOracle {
    /// Latest record per symbol (never deleted)
    records: BTreeMap<String, PriceRecord>,
    /// Keys allowed to attest prices
    signers: BTreeSet<PublicKey>,
    /// Seconds a price stays usable
    validity_window: u64,
}

impl PriceOracle {
    /// Create an oracle with no signers
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            records: BTreeMap::new(),
            signers: BTreeSet::new(),
            validity_window: config.validity_window,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Accept a signed price for one symbol
    pub fn update_price(
        &mut self,
        ctx: &CallContext,
        verifier: &dyn AttestationVerifier,
        nonce: u64,
        price: u128,
        signature: &Signature,
        symbol: &str,
    ) -> Result<PriceUpdatedEvent> {
        let message = price_message(nonce, price, symbol);
        let signer = self.verify(verifier, &message, signature)?;

        self.check_update(nonce, price, symbol)?;
        Ok(self.store(ctx, signer, nonce, price, symbol))
    }

    /// Accept a signed batch of prices. All entries share one nonce and
    /// either all are applied or none.
    pub fn update_prices(
        &mut self,
        ctx: &CallContext,
        verifier: &dyn AttestationVerifier,
        nonce: u64,
        signature: &Signature,
        prices: &[u128],
        symbols: &[String],
    ) -> Result<Vec<PriceUpdatedEvent>> {
        let message = batch_price_message(nonce, prices, symbols)?;
        let signer = self.verify(verifier, &message, signature)?;

        let mut seen = BTreeSet::new();
        for (price, symbol) in prices.iter().zip(symbols) {
            if !seen.insert(symbol.as_str()) {
                return Err(Error::InvalidParameter {
                    name: "symbols".into(),
                    reason: format!("duplicate symbol {}", symbol),
                });
            }
            self.check_update(nonce, *price, symbol)?;
        }

        Ok(prices
            .iter()
            .zip(symbols)
            .map(|(price, symbol)| self.store(ctx, signer, nonce, *price, symbol))
            .collect())
    }

    fn verify(
        &self,
        verifier: &dyn AttestationVerifier,
        message: &Hash,
        signature: &Signature,
    ) -> Result<PublicKey> {
        let signer = verifier.recover(message, signature)?;
        if !self.signers.contains(&signer) {
            warn!(signer = %signer, "price attestation from unauthorized signer");
            return Err(Error::InvalidSignature);
        }
        Ok(signer)
    }

    fn check_update(&self, nonce: u64, price: u128, symbol: &str) -> Result<()> {
        validate_symbol(symbol)?;
        let last_nonce = self.records.get(symbol).map(|r| r.last_nonce).unwrap_or(0);
        if nonce <= last_nonce {
            return Err(Error::StaleNonce {
                symbol: symbol.into(),
                nonce,
                last_nonce,
            });
        }
        validate_price(price)
    }

    fn store(
        &mut self,
        ctx: &CallContext,
        signer: PublicKey,
        nonce: u64,
        price: u128,
        symbol: &str,
    ) -> PriceUpdatedEvent {
        self.records.insert(
            symbol.to_string(),
            PriceRecord {
                symbol: symbol.to_string(),
                price,
                last_update_time: ctx.now,
                last_nonce: nonce,
            },
        );
        debug!(symbol, price, nonce, "price updated");

        PriceUpdatedEvent {
            symbol: symbol.to_string(),
            price,
            nonce,
            signer,
            timestamp: ctx.now,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current price of `symbol`, failing if unknown or stale
    pub fn get_price(&self, symbol: &str, now: u64) -> Result<u128> {
        let record = self
            .records
            .get(symbol)
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))?;
        validate_price_freshness(symbol, record.last_update_time, now, self.validity_window)?;
        Ok(record.price)
    }

    /// Latest record, fresh or not
    pub fn price_record(&self, symbol: &str) -> Option<&PriceRecord> {
        self.records.get(symbol)
    }

    /// Check whether a key may attest prices
    pub fn is_authorized_signer(&self, key: &PublicKey) -> bool {
        self.signers.contains(key)
    }

    /// Seconds a price stays usable
    pub fn validity_window(&self) -> u64 {
        self.validity_window
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change the validity window (admin only)
    pub fn set_validity_window(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        secs: u64,
    ) -> Result<ValidityWindowChangedEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        if secs == 0 {
            return Err(Error::InvalidParameter {
                name: "validity_window".into(),
                reason: "cannot be zero".into(),
            });
        }
        let old_window = std::mem::replace(&mut self.validity_window, secs);
        info!(old_window, new_window = secs, "oracle validity window changed");

        Ok(ValidityWindowChangedEvent {
            old_window,
            new_window: secs,
            timestamp: ctx.now,
        })
    }

    /// Authorize a price signer (admin only)
    pub fn authorize_signer(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        signer: PublicKey,
    ) -> Result<SignerChangedEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        self.signers.insert(signer);
        info!(signer = %signer, "oracle signer authorized");

        Ok(SignerChangedEvent {
            signer,
            authorized: true,
            timestamp: ctx.now,
        })
    }

    /// Revoke a price signer (admin only)
    pub fn revoke_signer(
        &mut self,
        ctx: &CallContext,
        access: &AccessControl,
        signer: PublicKey,
    ) -> Result<SignerChangedEvent> {
        access.require_role(Role::Admin, &ctx.caller)?;
        self.signers.remove(&signer);
        info!(signer = %signer, "oracle signer revoked");

        Ok(SignerChangedEvent {
            signer,
            authorized: false,
            timestamp: ctx.now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::attestation::{EcdsaVerifier, PriceSigner};
    use crate::utils::constants::{PUBKEY_LENGTH, WAD};

    fn admin() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn setup() -> (PriceOracle, AccessControl, PriceSigner) {
        let access = AccessControl::new(admin());
        let mut oracle = PriceOracle::new(&OracleConfig::default());
        let signer = PriceSigner::generate();
        oracle
            .authorize_signer(&CallContext::new(admin(), 0), &access, signer.public_key())
            .unwrap();
        (oracle, access, signer)
    }

    fn ctx(now: u64) -> CallContext {
        CallContext::new(PublicKey::module_account("keeper"), now)
    }

    #[test]
    fn test_update_and_read_price() {
        let (mut oracle, _, signer) = setup();
        let sig = signer.sign_price(1, 2000 * WAD, "ETH");

        let event = oracle
            .update_price(&ctx(100), &EcdsaVerifier, 1, 2000 * WAD, &sig, "ETH")
            .unwrap();
        assert_eq!(event.signer, signer.public_key());
        assert_eq!(oracle.get_price("ETH", 100).unwrap(), 2000 * WAD);
        assert_eq!(oracle.price_record("ETH").unwrap().last_nonce, 1);
    }

    #[test]
    fn test_stale_nonce_rejected() {
        let (mut oracle, _, signer) = setup();
        let sig = signer.sign_price(5, 2000 * WAD, "ETH");
        oracle.update_price(&ctx(0), &EcdsaVerifier, 5, 2000 * WAD, &sig, "ETH").unwrap();

        for nonce in [4, 5] {
            let sig = signer.sign_price(nonce, 1000 * WAD, "ETH");
            let result = oracle.update_price(&ctx(1), &EcdsaVerifier, nonce, 1000 * WAD, &sig, "ETH");
            assert!(matches!(result, Err(Error::StaleNonce { last_nonce: 5, .. })));
        }
        assert_eq!(oracle.get_price("ETH", 1).unwrap(), 2000 * WAD);
    }

    #[test]
    fn test_unauthorized_signer_rejected() {
        let (mut oracle, _, _) = setup();
        let rogue = PriceSigner::generate();
        let sig = rogue.sign_price(1, 2000 * WAD, "ETH");

        let result = oracle.update_price(&ctx(0), &EcdsaVerifier, 1, 2000 * WAD, &sig, "ETH");
        assert!(matches!(result, Err(Error::InvalidSignature)));
        assert!(oracle.price_record("ETH").is_none());
    }

    #[test]
    fn test_signature_over_different_price_rejected() {
        let (mut oracle, _, signer) = setup();
        let sig = signer.sign_price(1, 2000 * WAD, "ETH");

        let result = oracle.update_price(&ctx(0), &EcdsaVerifier, 1, 9000 * WAD, &sig, "ETH");
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn test_stale_and_unknown_prices() {
        let (mut oracle, _, signer) = setup();
        assert!(matches!(oracle.get_price("ETH", 0), Err(Error::UnknownSymbol(_))));

        let sig = signer.sign_price(1, 2000 * WAD, "ETH");
        oracle.update_price(&ctx(0), &EcdsaVerifier, 1, 2000 * WAD, &sig, "ETH").unwrap();

        let window = oracle.validity_window();
        assert!(oracle.get_price("ETH", window).is_ok());
        assert!(matches!(
            oracle.get_price("ETH", window + 1),
            Err(Error::StalePrice { .. })
        ));
    }

    #[test]
    fn test_batch_update_all_or_nothing() {
        let (mut oracle, _, signer) = setup();
        let symbols = vec!["ETH".to_string(), "BTC".to_string()];
        let prices = vec![2000 * WAD, 60_000 * WAD];

        let sig = signer.sign_prices(3, &prices, &symbols).unwrap();
        let events = oracle
            .update_prices(&ctx(0), &EcdsaVerifier, 3, &sig, &prices, &symbols)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(oracle.get_price("BTC", 0).unwrap(), 60_000 * WAD);

        // ETH moves ahead on its own; a batch reusing nonce 4 must fail as a whole
        let sig = signer.sign_price(4, 2100 * WAD, "ETH");
        oracle.update_price(&ctx(1), &EcdsaVerifier, 4, 2100 * WAD, &sig, "ETH").unwrap();

        let prices = vec![1 * WAD, 1 * WAD];
        let sig = signer.sign_prices(4, &prices, &symbols).unwrap();
        let result = oracle.update_prices(&ctx(2), &EcdsaVerifier, 4, &sig, &prices, &symbols);
        assert!(matches!(result, Err(Error::StaleNonce { .. })));
        assert_eq!(oracle.get_price("BTC", 2).unwrap(), 60_000 * WAD);
        assert_eq!(oracle.price_record("BTC").unwrap().last_nonce, 3);
    }

    #[test]
    fn test_batch_length_mismatch() {
        let (mut oracle, _, signer) = setup();
        let sig = signer.sign_price(1, 1, "ETH");
        let result = oracle.update_prices(&ctx(0), &EcdsaVerifier, 1, &sig, &[1, 2], &["ETH".into()]);
        assert!(matches!(result, Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_zero_price_rejected() {
        let (mut oracle, _, signer) = setup();
        let sig = signer.sign_price(1, 0, "ETH");
        let result = oracle.update_price(&ctx(0), &EcdsaVerifier, 1, 0, &sig, "ETH");
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_admin_operations() {
        let (mut oracle, access, signer) = setup();
        let outsider = CallContext::new(PublicKey::new([0x03; PUBKEY_LENGTH]), 0);
        let admin_ctx = CallContext::new(admin(), 0);

        assert!(oracle.set_validity_window(&outsider, &access, 10).is_err());
        assert!(oracle.revoke_signer(&outsider, &access, signer.public_key()).is_err());

        oracle.set_validity_window(&admin_ctx, &access, 10).unwrap();
        assert_eq!(oracle.validity_window(), 10);

        oracle.revoke_signer(&admin_ctx, &access, signer.public_key()).unwrap();
        assert!(!oracle.is_authorized_signer(&signer.public_key()));
    }
}
