//! Cryptographic primitives for the stablecoin protocol.
//!
//! - Private keys (secp256k1)
//! - Public keys (secp256k1 compressed), also used as account identities
//! - Recoverable ECDSA signatures (`r ‖ s ‖ v`, 65 bytes)
//! - SHA256 hashes with domain separation

use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey as Secp256k1PubKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{HASH_LENGTH, MESSAGE_DOMAIN, PUBKEY_LENGTH, SIGNATURE_LENGTH};

// ═══════════════════════════════════════════════════════════════════════════════
// SECP256K1 CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

thread_local! {
    static SECP: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// Execute a function with the secp256k1 context
fn with_secp<F, R>(f: F) -> R
where
    F: FnOnce(&Secp256k1<secp256k1::All>) -> R,
{
    SECP.with(|secp| f(secp))
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn deserialize_hex<'de, D, const N: usize>(deserializer: D) -> std::result::Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != N {
        return Err(serde::de::Error::custom(format!(
            "expected {} bytes, got {}",
            N,
            bytes.len()
        )));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn decode_exact<const N: usize>(name: &str, slice: &[u8]) -> Result<[u8; N]> {
    if slice.len() != N {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("expected {} bytes, got {}", N, slice.len()),
        });
    }
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(slice);
    Ok(bytes)
}

fn decode_hex(name: &str, s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::InvalidParameter {
        name: name.into(),
        reason: e.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte cryptographic hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_LENGTH]);

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_hex::<D, HASH_LENGTH>(deserializer).map(Hash)
    }
}

impl Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Compute SHA256 hash of data
    pub fn sha256(data: &[u8]) -> Self {
        let result = Sha256::digest(data);
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_exact("hash", &decode_hex("hash", s)?).map(Self)
    }

    /// Zero hash (all zeros)
    pub fn zero() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Check if hash is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Convert to secp256k1 Message for signing
    pub fn to_message(&self) -> Message {
        Message::from_digest(self.0)
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIVATE KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Private key length in bytes
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// A secp256k1 private key for signing operations
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Create a new private key from a slice
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; PRIVATE_KEY_LENGTH] = decode_exact("private_key", slice)?;
        let inner = SecretKey::from_slice(&bytes).map_err(|e| Error::CryptoError {
            operation: "private_key_from_slice".into(),
            details: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Generate a new random private key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: SecretKey::new(&mut rng),
        }
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&decode_hex("private_key", s)?)
    }

    /// Hex encoding of the secret bytes
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.secret_bytes())
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        with_secp(|secp| PublicKey::new(Secp256k1PubKey::from_secret_key(secp, &self.inner).serialize()))
    }

    /// Sign a message hash, producing a recoverable signature
    pub fn sign(&self, message: &Hash) -> Signature {
        with_secp(|secp| {
            let sig = secp.sign_ecdsa_recoverable(&message.to_message(), &self.inner);
            let (recovery_id, compact) = sig.serialize_compact();
            let mut bytes = [0u8; SIGNATURE_LENGTH];
            bytes[..64].copy_from_slice(&compact);
            bytes[64] = recovery_id.to_i32() as u8;
            Signature::new(bytes)
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// A compressed secp256k1 public key (33 bytes).
///
/// Public keys double as account identities in the token ledgers. Protocol
/// module accounts use [`PublicKey::module_account`], which yields an
/// identity no private key can control.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBKEY_LENGTH]);

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_hex::<D, PUBKEY_LENGTH>(deserializer).map(PublicKey)
    }
}

impl PublicKey {
    /// Create a new public key from bytes
    pub fn new(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Deterministic identity for a protocol module (router, auctions).
    ///
    /// The 0x00 prefix is not a valid compressed-point tag.
    pub fn module_account(label: &str) -> Self {
        let digest = create_message_hash("module", label.as_bytes());
        let mut bytes = [0u8; PUBKEY_LENGTH];
        bytes[1..].copy_from_slice(digest.as_bytes());
        Self(bytes)
    }

    /// Create from a slice (must be exactly 33 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        decode_exact("public_key", slice).map(Self)
    }

    /// Get the public key as bytes
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&decode_hex("public_key", s)?)
    }

    /// Verify that this is a valid secp256k1 public key
    pub fn is_valid(&self) -> bool {
        Secp256k1PubKey::from_slice(&self.0).is_ok()
    }

    /// Verify a signature against this public key
    pub fn verify(&self, message: &Hash, signature: &Signature) -> bool {
        matches!(recover_signer(message, signature), Ok(signer) if signer == *self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// A recoverable ECDSA signature: 64-byte compact form followed by the recovery id
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_hex::<D, SIGNATURE_LENGTH>(deserializer).map(Signature)
    }
}

impl Signature {
    /// Create a new signature from bytes
    pub fn new(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 65 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        decode_exact("signature", slice).map(Self)
    }

    /// Get the signature as bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&decode_hex("signature", s)?)
    }

    fn to_secp256k1(&self) -> Result<RecoverableSignature> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.0[64])).map_err(|e| Error::CryptoError {
            operation: "recovery_id".into(),
            details: e.to_string(),
        })?;
        RecoverableSignature::from_compact(&self.0[..64], recovery_id).map_err(|e| Error::CryptoError {
            operation: "signature_parse".into(),
            details: e.to_string(),
        })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE RECOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Recover the public key that produced `signature` over `message`
pub fn recover_signer(message: &Hash, signature: &Signature) -> Result<PublicKey> {
    let sig = signature.to_secp256k1()?;
    with_secp(|secp| {
        secp.recover_ecdsa(&message.to_message(), &sig)
            .map(|pk| PublicKey::new(pk.serialize()))
            .map_err(|e| Error::CryptoError {
                operation: "recover_ecdsa".into(),
                details: e.to_string(),
            })
    })
}

/// Create a message hash for signing with domain separation
pub fn create_message_hash(operation: &str, data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(MESSAGE_DOMAIN);
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; HASH_LENGTH];
    bytes.copy_from_slice(&result);
    Hash::new(bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PAIR
// ═══════════════════════════════════════════════════════════════════════════════

/// A key pair containing both private and public keys
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    /// Create from a private key
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Create from private key hex
    pub fn from_hex(hex: &str) -> Result<Self> {
        Ok(Self::from_private(PrivateKey::from_hex(hex)?))
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the private key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Sign a message hash
    pub fn sign(&self, message: &Hash) -> Signature {
        self.private.sign(message)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair {{ public: {:?} }}", self.public)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_sha256() {
        let hash = Hash::sha256(b"hello world");
        let expected =
            Hash::from_hex("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::generate();
        let message = Hash::sha256(b"price update");

        let signature = keypair.sign(&message);
        assert_eq!(recover_signer(&message, &signature).unwrap(), *keypair.public_key());
        assert!(keypair.public_key().verify(&message, &signature));

        let other = Hash::sha256(b"another update");
        assert!(!keypair.public_key().verify(&other, &signature));
    }

    #[test]
    fn test_private_key_hex_roundtrip() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_hex(&keypair.private_key().to_hex()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_malformed_recovery_id() {
        let keypair = KeyPair::generate();
        let message = Hash::sha256(b"x");
        let mut bytes = *keypair.sign(&message).as_bytes();
        bytes[64] = 9;
        assert!(recover_signer(&message, &Signature::new(bytes)).is_err());
    }

    #[test]
    fn test_module_account_is_not_a_key() {
        let router = PublicKey::module_account("router");
        assert_eq!(router, PublicKey::module_account("router"));
        assert_ne!(router, PublicKey::module_account("debt-auction"));
        assert!(!router.is_valid());
    }

    #[test]
    fn test_message_hash_domain_separation() {
        let hash1 = create_message_hash("price", &[1, 2, 3]);
        let hash2 = create_message_hash("price", &[1, 2, 3]);
        let hash3 = create_message_hash("prices", &[1, 2, 3]);

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_private_key_hex_roundtrip_secret_bytes() {
        let original = KeyPair::generate();
        let hex = hex::encode(original.private.inner.secret_bytes());
        let recovered = KeyPair::from_hex(&hex).unwrap();
        assert_eq!(original.public_key(), recovered.public_key());
    }

    #[test]
    fn test_serde_roundtrip() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(&Hash::sha256(b"test"));

        let json = serde_json::to_string(keypair.public_key()).unwrap();
        let recovered: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(*keypair.public_key(), recovered);

        let json = serde_json::to_string(&signature).unwrap();
        let recovered: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(signature, recovered);
    }
}
