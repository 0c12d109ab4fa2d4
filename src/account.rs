//! Participant accounts and the registry that owns them.
//!
//! An account exists only after signup and is never removed. Referrer links
//! are stored as identities, never as references into the registry.

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque participant identity (a wallet address or user key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps a raw identity string.
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        AccountId::new(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered participant.
///
/// # Invariants
///
/// - `balance` and `referral_bonus` are never negative
/// - `referrer`, if set, named an already-registered account at signup time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Withdrawable funds, including any amount currently pledged as guarantor.
    pub balance: Amount,

    /// Bonus accrued from downstream signups, usable as referral credit.
    pub referral_bonus: Amount,

    pub referrer: Option<AccountId>,
}

impl Account {
    /// Creates a new account with zero balances.
    pub fn new(id: AccountId, referrer: Option<AccountId>) -> Self {
        Account {
            id,
            balance: Amount::ZERO,
            referral_bonus: Amount::ZERO,
            referrer,
        }
    }

    /// Balance after crediting `amount`.
    pub fn credited(&self, amount: Amount) -> Result<Amount> {
        self.balance.checked_add(amount).ok_or(LedgerError::Overflow)
    }

    /// Balance after debiting `amount`.
    ///
    /// Pledge reservations are not visible here; callers that must respect
    /// them check the free balance first.
    pub fn debited(&self, amount: Amount) -> Result<Amount> {
        self.balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            })
    }

    /// Referral bonus after accruing `bonus`.
    pub fn bonus_accrued(&self, bonus: Amount) -> Result<Amount> {
        self.referral_bonus
            .checked_add(bonus)
            .ok_or(LedgerError::Overflow)
    }

    /// Referral bonus left after consuming `amount` as collateral.
    pub fn bonus_consumed(&self, amount: Amount) -> Result<Amount> {
        self.referral_bonus
            .checked_sub(amount)
            .ok_or(LedgerError::CreditLimitExceeded {
                limit: self.referral_bonus,
                requested: amount,
            })
    }
}

/// All registered accounts, ordered by identity.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<AccountId, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.accounts.contains_key(id)
    }

    /// The account for `id`, if registered.
    pub fn get(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Looks up a registered account or fails with `NotRegistered`.
    pub fn require(&self, id: &AccountId) -> Result<&Account> {
        self.accounts
            .get(id)
            .ok_or_else(|| LedgerError::NotRegistered(id.clone()))
    }

    /// Checks that `id` may sign up with the optional `referrer`.
    ///
    /// A self-referral is reported as `UnknownReferrer`, since the caller is
    /// not yet registered at link time.
    pub fn check_signup(&self, id: &AccountId, referrer: Option<&AccountId>) -> Result<()> {
        if self.is_registered(id) {
            return Err(LedgerError::AlreadyRegistered(id.clone()));
        }
        if let Some(referrer) = referrer {
            if referrer == id || !self.is_registered(referrer) {
                return Err(LedgerError::UnknownReferrer(referrer.clone()));
            }
        }
        Ok(())
    }

    /// Inserts a new account. Callers run [`Self::check_signup`] first.
    pub(crate) fn insert(&mut self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    /// Applies an already-validated change to a registered account.
    ///
    /// Commit phases only name accounts their validation looked up, so a
    /// missing id is a bug in the caller. Debug builds panic on it; release
    /// builds leave the registry untouched.
    pub(crate) fn update(&mut self, id: &AccountId, apply: impl FnOnce(&mut Account)) {
        let account = self.accounts.get_mut(id);
        debug_assert!(account.is_some(), "update of unregistered account {}", id);
        if let Some(account) = account {
            apply(account);
        }
    }

    /// Accounts in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
