//! Loan records.

use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential loan identifier, unique per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanKind {
    /// Collateralized by the borrower's own accrued referral bonus.
    ReferralBacked,

    /// Backed by equal pledges from one or more guarantors, with a deadline.
    GuarantorBacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Open,
    Repaid,
    Defaulted,
}

impl LoanStatus {
    /// Terminal loans are archived and never mutated again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Open)
    }
}

/// One guarantor's reserved share of a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub guarantor: AccountId,
    pub share: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: AccountId,
    pub principal: Amount,
    pub kind: LoanKind,

    /// Guarantor pledges in the order the borrower listed them. Empty for
    /// referral-backed loans.
    pub pledges: Vec<Pledge>,

    /// Unix seconds at which the loan becomes settleable as a default.
    pub deadline: Option<u64>,

    pub issued_at: u64,
    pub status: LoanStatus,
}

impl Loan {
    /// Creates a referral-backed loan. The collateral is consumed upfront,
    /// so the loan is born `Repaid`.
    pub fn referral_backed(id: LoanId, borrower: AccountId, principal: Amount, now: u64) -> Self {
        Loan {
            id,
            borrower,
            principal,
            kind: LoanKind::ReferralBacked,
            pledges: Vec::new(),
            deadline: None,
            issued_at: now,
            status: LoanStatus::Repaid,
        }
    }

    /// Creates an open guarantor-backed loan.
    pub fn guarantor_backed(
        id: LoanId,
        borrower: AccountId,
        principal: Amount,
        pledges: Vec<Pledge>,
        now: u64,
        deadline: u64,
    ) -> Self {
        Loan {
            id,
            borrower,
            principal,
            kind: LoanKind::GuarantorBacked,
            pledges,
            deadline: Some(deadline),
            issued_at: now,
            status: LoanStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Open
    }

    /// Returns `true` once `now` has reached the deadline.
    pub fn is_past_deadline(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn guarantors(&self) -> impl Iterator<Item = &AccountId> {
        self.pledges.iter().map(|p| &p.guarantor)
    }

    /// Moves an open loan to a terminal status.
    pub(crate) fn close(&mut self, status: LoanStatus) -> Result<()> {
        if !self.is_open() {
            return Err(LedgerError::LoanNotOpen(self.id));
        }
        self.status = status;
        Ok(())
    }
}
