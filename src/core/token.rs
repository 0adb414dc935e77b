//! Fungible token capability and in-memory ledger.
//!
//! The protocol consumes the stable asset, the governance token and every
//! collateral token through [`FungibleToken`]. [`TokenLedger`] is the
//! in-memory implementation used by the protocol executor and in tests:
//! - Balance and allowance tracking
//! - Transfers and delegated transfers
//! - Minter-gated supply management

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Operations the protocol needs from a fungible token.
///
/// Amounts are in the token's native decimals. Zero-amount moves are no-ops.
pub trait FungibleToken {
    /// Ticker symbol
    fn symbol(&self) -> &str;

    /// Native decimals
    fn decimals(&self) -> u8;

    /// Total supply
    fn total_supply(&self) -> u128;

    /// Balance of an account
    fn balance_of(&self, owner: &PublicKey) -> u128;

    /// Remaining amount `spender` may move on behalf of `owner`
    fn allowance(&self, owner: &PublicKey, spender: &PublicKey) -> u128;

    /// Set the allowance of `spender` over `owner`'s balance
    fn approve(&mut self, owner: PublicKey, spender: PublicKey, amount: u128) -> Result<()>;

    /// Move tokens from `from` to `to`
    fn transfer(&mut self, from: PublicKey, to: PublicKey, amount: u128) -> Result<()>;

    /// Move tokens from `from` to `to` using `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: PublicKey,
        from: PublicKey,
        to: PublicKey,
        amount: u128,
    ) -> Result<()>;

    /// Create tokens (minters only)
    fn mint(&mut self, minter: PublicKey, to: PublicKey, amount: u128) -> Result<()>;

    /// Destroy tokens from the burner's own balance (minters only)
    fn burn(&mut self, burner: PublicKey, amount: u128) -> Result<()>;

    /// Whether `account` may mint and burn
    fn is_minter(&self, account: &PublicKey) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory token ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Token name
    pub name: String,
    /// Token symbol
    symbol: String,
    /// Decimal places
    decimals: u8,
    /// Account allowed to manage minters
    admin: PublicKey,
    /// Total supply
    total_supply: u128,
    /// Balances by public key
    balances: BTreeMap<PublicKey, u128>,
    /// Allowances by (owner, spender)
    allowances: BTreeMap<(PublicKey, PublicKey), u128>,
    /// Accounts allowed to mint and burn
    minters: BTreeSet<PublicKey>,
}

impl TokenLedger {
    /// Create a new empty ledger
    pub fn new(name: &str, symbol: &str, decimals: u8, admin: PublicKey) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            admin,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            minters: BTreeSet::new(),
        }
    }

    /// Enable or disable a minter (token admin only)
    pub fn set_minter(&mut self, caller: &PublicKey, account: PublicKey, enabled: bool) -> Result<()> {
        if *caller != self.admin {
            return Err(Error::Unauthorized(format!("{} token admin required", self.symbol)));
        }
        if enabled {
            self.minters.insert(account);
        } else {
            self.minters.remove(&account);
        }
        Ok(())
    }

    /// Get number of token holders
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify supply invariant (total_supply == sum of all balances)
    pub fn verify_supply_invariant(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
            .map(|sum| sum == self.total_supply)
            .unwrap_or(false)
    }

    /// Compute state hash over supply and balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(self.symbol.as_bytes());
        data.extend_from_slice(&self.total_supply.to_be_bytes());
        for (pubkey, balance) in &self.balances {
            data.extend_from_slice(pubkey.as_bytes());
            data.extend_from_slice(&balance.to_be_bytes());
        }
        Hash::sha256(&data)
    }

    fn debit(&mut self, from: &PublicKey, amount: u128) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        let remaining = balance - amount;
        if remaining == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, to: PublicKey, amount: u128) -> Result<()> {
        let balance = safe_add(self.balance_of(&to), amount)?;
        self.balances.insert(to, balance);
        Ok(())
    }

    fn require_minter(&self, account: &PublicKey) -> Result<()> {
        if !self.minters.contains(account) {
            return Err(Error::Unauthorized(format!("{} minter required", self.symbol)));
        }
        Ok(())
    }
}

impl FungibleToken for TokenLedger {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn balance_of(&self, owner: &PublicKey) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &PublicKey, spender: &PublicKey) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn approve(&mut self, owner: PublicKey, spender: PublicKey, amount: u128) -> Result<()> {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
        Ok(())
    }

    fn transfer(&mut self, from: PublicKey, to: PublicKey, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(&from, amount)?;
        self.credit(to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: PublicKey,
        from: PublicKey,
        to: PublicKey,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let allowance = self.allowance(&from, &spender);
        if allowance < amount {
            return Err(Error::InsufficientAllowance {
                required: amount,
                available: allowance,
            });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, allowance - amount)
    }

    fn mint(&mut self, minter: PublicKey, to: PublicKey, amount: u128) -> Result<()> {
        self.require_minter(&minter)?;
        if amount == 0 {
            return Ok(());
        }
        self.total_supply = safe_add(self.total_supply, amount)?;
        self.credit(to, amount)
    }

    fn burn(&mut self, burner: PublicKey, amount: u128) -> Result<()> {
        self.require_minter(&burner)?;
        if amount == 0 {
            return Ok(());
        }
        self.debit(&burner, amount)?;
        self.total_supply = safe_sub(self.total_supply, amount)?;
        Ok(())
    }

    fn is_minter(&self, account: &PublicKey) -> bool {
        self.minters.contains(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn test_pubkey() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn test_pubkey_2() -> PublicKey {
        PublicKey::new([0x03; PUBKEY_LENGTH])
    }

    fn minter() -> PublicKey {
        PublicKey::module_account("minter")
    }

    fn ledger() -> TokenLedger {
        let mut token = TokenLedger::new("Stable", "STBL", 18, test_pubkey());
        token.set_minter(&test_pubkey(), minter(), true).unwrap();
        token
    }

    #[test]
    fn test_mint_requires_minter() {
        let mut token = ledger();

        assert!(matches!(
            token.mint(test_pubkey_2(), test_pubkey_2(), 100),
            Err(Error::Unauthorized(_))
        ));

        token.mint(minter(), test_pubkey(), 1000).unwrap();
        assert_eq!(token.balance_of(&test_pubkey()), 1000);
        assert_eq!(token.total_supply(), 1000);
    }

    #[test]
    fn test_burn_from_own_balance() {
        let mut token = ledger();
        token.mint(minter(), minter(), 1000).unwrap();
        token.burn(minter(), 400).unwrap();

        assert_eq!(token.balance_of(&minter()), 600);
        assert_eq!(token.total_supply(), 600);

        assert!(matches!(
            token.burn(minter(), 601),
            Err(Error::InsufficientBalance { required: 601, available: 600 })
        ));
    }

    #[test]
    fn test_transfer() {
        let mut token = ledger();
        token.mint(minter(), test_pubkey(), 1000).unwrap();
        token.transfer(test_pubkey(), test_pubkey_2(), 300).unwrap();

        assert_eq!(token.balance_of(&test_pubkey()), 700);
        assert_eq!(token.balance_of(&test_pubkey_2()), 300);
        assert_eq!(token.total_supply(), 1000);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut token = ledger();
        let spender = PublicKey::module_account("spender");
        token.mint(minter(), test_pubkey(), 1000).unwrap();

        assert!(matches!(
            token.transfer_from(spender, test_pubkey(), test_pubkey_2(), 100),
            Err(Error::InsufficientAllowance { required: 100, available: 0 })
        ));

        token.approve(test_pubkey(), spender, 250).unwrap();
        token.transfer_from(spender, test_pubkey(), test_pubkey_2(), 100).unwrap();

        assert_eq!(token.allowance(&test_pubkey(), &spender), 150);
        assert_eq!(token.balance_of(&test_pubkey_2()), 100);
    }

    #[test]
    fn test_supply_invariant_and_holders() {
        let mut token = ledger();
        token.mint(minter(), test_pubkey(), 1000).unwrap();
        token.mint(minter(), minter(), 500).unwrap();
        token.transfer(test_pubkey(), test_pubkey_2(), 1000).unwrap();
        token.burn(minter(), 100).unwrap();

        assert!(token.verify_supply_invariant());
        // emptied balances are pruned
        assert_eq!(token.holder_count(), 2);
    }

    #[test]
    fn test_only_admin_sets_minters() {
        let mut token = ledger();
        assert!(token.set_minter(&test_pubkey_2(), test_pubkey_2(), true).is_err());
        token.set_minter(&test_pubkey(), minter(), false).unwrap();
        assert!(!token.is_minter(&minter()));
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut token1 = ledger();
        let mut token2 = ledger();

        token1.mint(minter(), test_pubkey(), 100).unwrap();
        token2.mint(minter(), test_pubkey(), 100).unwrap();

        assert_eq!(token1.state_hash(), token2.state_hash());
    }
}
