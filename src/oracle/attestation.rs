//! Signed price attestations.
//!
//! A price update is accepted only if its signature recovers to an
//! authorized signer. The signed digest is domain separated and binds the
//! nonce, every price and every symbol of the update.

use crate::error::{Error, Result};
use crate::utils::crypto::{create_message_hash, recover_signer, Hash, KeyPair, PublicKey, Signature};

/// Operation tag of a single-symbol update
const SINGLE_UPDATE_TAG: &str = "price";

/// Operation tag of a batched update
const BATCH_UPDATE_TAG: &str = "prices";

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGES
// ═══════════════════════════════════════════════════════════════════════════════

fn encode_entry(data: &mut Vec<u8>, price: u128, symbol: &str) {
    data.extend_from_slice(&price.to_be_bytes());
    data.extend_from_slice(&(symbol.len() as u32).to_be_bytes());
    data.extend_from_slice(symbol.as_bytes());
}

/// Digest signed for `update_price(nonce, price, symbol)`
pub fn price_message(nonce: u64, price: u128, symbol: &str) -> Hash {
    let mut data = Vec::with_capacity(8 + 16 + 4 + symbol.len());
    data.extend_from_slice(&nonce.to_be_bytes());
    encode_entry(&mut data, price, symbol);
    create_message_hash(SINGLE_UPDATE_TAG, &data)
}

/// Digest signed for `update_prices(nonce, prices, symbols)`
pub fn batch_price_message(nonce: u64, prices: &[u128], symbols: &[String]) -> Result<Hash> {
    if prices.len() != symbols.len() {
        return Err(Error::LengthMismatch {
            prices: prices.len(),
            symbols: symbols.len(),
        });
    }
    let mut data = Vec::new();
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&(prices.len() as u32).to_be_bytes());
    for (price, symbol) in prices.iter().zip(symbols) {
        encode_entry(&mut data, *price, symbol);
    }
    Ok(create_message_hash(BATCH_UPDATE_TAG, &data))
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Pluggable attestation scheme
pub trait AttestationVerifier: Send + Sync {
    /// Recover the identity that produced `signature` over `message`
    fn recover(&self, message: &Hash, signature: &Signature) -> Result<PublicKey>;
}

/// secp256k1 recoverable ECDSA
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl AttestationVerifier for EcdsaVerifier {
    fn recover(&self, message: &Hash, signature: &Signature) -> Result<PublicKey> {
        recover_signer(message, signature).map_err(|_| Error::InvalidSignature)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Off-chain price signer (feeders, keepers, tests)
#[derive(Debug, Clone)]
pub struct PriceSigner {
    keypair: KeyPair,
}

impl PriceSigner {
    /// Wrap a key pair
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Signer with a fresh random key
    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    /// Public key to authorize in the oracle
    pub fn public_key(&self) -> PublicKey {
        *self.keypair.public_key()
    }

    /// Sign a single-symbol update
    pub fn sign_price(&self, nonce: u64, price: u128, symbol: &str) -> Signature {
        self.keypair.sign(&price_message(nonce, price, symbol))
    }

    /// Sign a batched update
    pub fn sign_prices(&self, nonce: u64, prices: &[u128], symbols: &[String]) -> Result<Signature> {
        Ok(self.keypair.sign(&batch_price_message(nonce, prices, symbols)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_recovers_signer() {
        let signer = PriceSigner::generate();
        let signature = signer.sign_price(1, 2000, "ETH");

        let recovered = EcdsaVerifier
            .recover(&price_message(1, 2000, "ETH"), &signature)
            .unwrap();
        assert_eq!(recovered, signer.public_key());
    }

    #[test]
    fn test_message_binds_every_field() {
        let base = price_message(1, 2000, "ETH");
        assert_ne!(base, price_message(2, 2000, "ETH"));
        assert_ne!(base, price_message(1, 2001, "ETH"));
        assert_ne!(base, price_message(1, 2000, "BTC"));
    }

    #[test]
    fn test_tampered_update_recovers_other_key() {
        let signer = PriceSigner::generate();
        let signature = signer.sign_price(1, 2000, "ETH");

        let recovered = EcdsaVerifier.recover(&price_message(1, 1, "ETH"), &signature);
        assert!(recovered.map(|key| key != signer.public_key()).unwrap_or(true));
    }

    #[test]
    fn test_batch_message_length_mismatch() {
        let result = batch_price_message(1, &[1, 2], &["ETH".to_string()]);
        assert!(matches!(result, Err(Error::LengthMismatch { prices: 2, symbols: 1 })));
    }

    #[test]
    fn test_batch_and_single_are_distinct() {
        let single = price_message(1, 2000, "ETH");
        let batch = batch_price_message(1, &[2000], &["ETH".to_string()]).unwrap();
        assert_ne!(single, batch);
    }
}
