//! Admin-controlled funds, disjoint from user balances.

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use serde::Serialize;

/// Two pools: fee revenue the admin may withdraw, and liquidity that backs
/// guarantor-backed loans.
///
/// The `checked_*` methods return the post-operation value without
/// mutating, so the engine can validate a whole operation before it
/// commits anything.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Treasury {
    /// Signup fees net of referral bonuses, plus loan origination fees.
    pub admin_balance: Amount,

    /// Liquidity available for new guarantor-backed loans.
    pub lending_pool: Amount,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checked_fee_credit(&self, amount: Amount) -> Result<Amount> {
        self.admin_balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)
    }

    /// Fails with `InsufficientTreasury` unless `amount` is covered.
    pub fn checked_admin_withdrawal(&self, amount: Amount) -> Result<Amount> {
        self.admin_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientTreasury {
                available: self.admin_balance,
                requested: amount,
            })
    }

    pub fn checked_pool_credit(&self, amount: Amount) -> Result<Amount> {
        self.lending_pool
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)
    }

    /// Fails with `InsufficientLiquidity` unless the pool covers `amount`.
    pub fn checked_pool_draw(&self, amount: Amount) -> Result<Amount> {
        self.lending_pool
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientLiquidity {
                available: self.lending_pool,
                requested: amount,
            })
    }

    /// Total value the treasury is accountable for.
    pub fn total(&self) -> Result<Amount> {
        self.admin_balance
            .checked_add(self.lending_pool)
            .ok_or(LedgerError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_withdrawal_bounded_by_balance() {
        let treasury = Treasury {
            admin_balance: Amount::from_units(40),
            lending_pool: Amount::from_units(1_000),
        };
        assert_eq!(
            treasury.checked_admin_withdrawal(Amount::from_units(40)).unwrap(),
            Amount::ZERO
        );
        assert!(matches!(
            treasury.checked_admin_withdrawal(Amount::from_units(41)),
            Err(LedgerError::InsufficientTreasury { .. })
        ));
    }

    #[test]
    fn test_pool_draws_are_bounded() {
        let treasury = Treasury {
            admin_balance: Amount::ZERO,
            lending_pool: Amount::from_units(100),
        };
        assert_eq!(
            treasury.checked_pool_draw(Amount::from_units(90)).unwrap(),
            Amount::from_units(10)
        );
        assert!(matches!(
            treasury.checked_pool_draw(Amount::from_units(101)),
            Err(LedgerError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_total_spans_both_pools() {
        let mut treasury = Treasury::new();
        treasury.admin_balance = treasury.checked_fee_credit(Amount::from_units(9)).unwrap();
        treasury.lending_pool = treasury.checked_pool_credit(Amount::from_units(100)).unwrap();
        assert_eq!(treasury.total().unwrap(), Amount::from_units(109));
    }

    #[test]
    fn test_total_reports_overflow() {
        let treasury = Treasury {
            admin_balance: Amount::new(rust_decimal::Decimal::MAX),
            lending_pool: Amount::from_units(1),
        };
        assert!(matches!(treasury.total(), Err(LedgerError::Overflow)));
    }
}
