//! Value transport: the token the ledger is denominated in.
//!
//! The engine only ever moves value between a participant and its own
//! custody. [`InMemoryTransport`] is a self-contained token used for tests
//! and local simulation.

use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::TransportError;
use std::collections::HashMap;

/// Capability to pull value into, and push value out of, engine custody.
///
/// Implementations must be all-or-nothing: on `Err` no value has moved.
pub trait ValueTransport {
    fn transfer_in(&mut self, from: &AccountId, amount: Amount) -> Result<(), TransportError>;

    fn transfer_out(&mut self, to: &AccountId, amount: Amount) -> Result<(), TransportError>;

    /// Token balance held by `holder` outside the engine.
    fn balance_of(&self, holder: &AccountId) -> Amount;
}

/// In-memory token ledger.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    balances: HashMap<AccountId, Amount>,
    custody: Amount,
    total_in: Amount,
    total_out: Amount,
    reject_next: Option<String>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates tokens for `holder` out of thin air.
    ///
    /// # Panics
    ///
    /// Panics if the holder's balance would overflow.
    pub fn mint(&mut self, holder: impl Into<AccountId>, amount: Amount) {
        *self.balances.entry(holder.into()).or_insert(Amount::ZERO) += amount;
    }

    /// Makes the next transfer fail with `reason`.
    pub fn reject_next(&mut self, reason: impl Into<String>) {
        self.reject_next = Some(reason.into());
    }

    /// Tokens currently held by the engine.
    pub fn custody(&self) -> Amount {
        self.custody
    }

    pub fn total_in(&self) -> Amount {
        self.total_in
    }

    pub fn total_out(&self) -> Amount {
        self.total_out
    }

    fn check_rejection(&mut self) -> Result<(), TransportError> {
        match self.reject_next.take() {
            Some(reason) => Err(TransportError::Rejected(reason)),
            None => Ok(()),
        }
    }
}

impl ValueTransport for InMemoryTransport {
    fn transfer_in(&mut self, from: &AccountId, amount: Amount) -> Result<(), TransportError> {
        self.check_rejection()?;
        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| TransportError::InsufficientFunds {
                holder: from.clone(),
                available,
                required: amount,
            })?;

        let custody = self.custody.checked_add(amount).ok_or(TransportError::Overflow)?;
        let total_in = self.total_in.checked_add(amount).ok_or(TransportError::Overflow)?;

        self.balances.insert(from.clone(), remaining);
        self.custody = custody;
        self.total_in = total_in;
        Ok(())
    }

    fn transfer_out(&mut self, to: &AccountId, amount: Amount) -> Result<(), TransportError> {
        self.check_rejection()?;
        let remaining = self
            .custody
            .checked_sub(amount)
            .ok_or_else(|| TransportError::InsufficientFunds {
                holder: AccountId::new("<custody>"),
                available: self.custody,
                required: amount,
            })?;

        let received = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransportError::Overflow)?;
        let total_out = self.total_out.checked_add(amount).ok_or(TransportError::Overflow)?;

        self.custody = remaining;
        self.balances.insert(to.clone(), received);
        self.total_out = total_out;
        Ok(())
    }

    fn balance_of(&self, holder: &AccountId) -> Amount {
        self.balances.get(holder).copied().unwrap_or(Amount::ZERO)
    }
}
