//! Call context and role-based access control.
//!
//! Every state-changing operation receives a [`CallContext`] naming the
//! caller and the current time. Privileged operations additionally check a
//! [`Role`] in the [`AccessControl`] registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::crypto::PublicKey;

// ═══════════════════════════════════════════════════════════════════════════════
// CALL CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity and time of an invocation, supplied by the host ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Account invoking the operation
    pub caller: PublicKey,
    /// Current time (seconds)
    pub now: u64,
}

impl CallContext {
    /// Create a new call context
    pub fn new(caller: PublicKey, now: u64) -> Self {
        Self { caller, now }
    }

    /// Same time, different caller (used when a module acts on its own account)
    pub fn as_account(&self, account: PublicKey) -> Self {
        Self {
            caller: account,
            now: self.now,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Configuration, signer management, reserve sweeps
    Admin,
    /// May hand collateral to the collateral auctions
    Router,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Router => write!(f, "router"),
        }
    }
}

/// Role registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    roles: BTreeMap<Role, BTreeSet<PublicKey>>,
}

impl AccessControl {
    /// Create a registry with an initial admin
    pub fn new(admin: PublicKey) -> Self {
        let mut access = Self::default();
        access.roles.entry(Role::Admin).or_default().insert(admin);
        access
    }

    /// Check whether `account` holds `role`
    pub fn has_role(&self, role: Role, account: &PublicKey) -> bool {
        self.roles
            .get(&role)
            .map(|members| members.contains(account))
            .unwrap_or(false)
    }

    /// Fail with `Unauthorized` unless `account` holds `role`
    pub fn require_role(&self, role: Role, account: &PublicKey) -> Result<()> {
        if !self.has_role(role, account) {
            return Err(Error::Unauthorized(format!("{} role required", role)));
        }
        Ok(())
    }

    /// Grant a role (admin only)
    pub fn grant_role(&mut self, ctx: &CallContext, role: Role, account: PublicKey) -> Result<()> {
        self.require_role(Role::Admin, &ctx.caller)?;
        self.roles.entry(role).or_default().insert(account);
        Ok(())
    }

    /// Revoke a role (admin only). The last admin cannot be removed.
    pub fn revoke_role(&mut self, ctx: &CallContext, role: Role, account: &PublicKey) -> Result<()> {
        self.require_role(Role::Admin, &ctx.caller)?;
        if role == Role::Admin && self.members(Role::Admin).len() == 1 && self.has_role(role, account) {
            return Err(Error::InvalidParameter {
                name: "account".into(),
                reason: "cannot revoke the last admin".into(),
            });
        }
        if let Some(members) = self.roles.get_mut(&role) {
            members.remove(account);
        }
        Ok(())
    }

    /// All holders of a role
    pub fn members(&self, role: Role) -> Vec<PublicKey> {
        self.roles
            .get(&role)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn admin() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn user() -> PublicKey {
        PublicKey::new([0x03; PUBKEY_LENGTH])
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut access = AccessControl::new(admin());
        let ctx = CallContext::new(admin(), 0);

        assert!(!access.has_role(Role::Router, &user()));
        access.grant_role(&ctx, Role::Router, user()).unwrap();
        assert!(access.has_role(Role::Router, &user()));

        access.revoke_role(&ctx, Role::Router, &user()).unwrap();
        assert!(!access.has_role(Role::Router, &user()));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let mut access = AccessControl::new(admin());
        let ctx = CallContext::new(user(), 0);

        let result = access.grant_role(&ctx, Role::Admin, user());
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_last_admin_is_kept() {
        let mut access = AccessControl::new(admin());
        let ctx = CallContext::new(admin(), 0);

        assert!(access.revoke_role(&ctx, Role::Admin, &admin()).is_err());

        access.grant_role(&ctx, Role::Admin, user()).unwrap();
        access.revoke_role(&ctx, Role::Admin, &admin()).unwrap();
        assert_eq!(access.members(Role::Admin), vec![user()]);
    }
}
