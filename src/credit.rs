//! Credit lines: referral-backed and guarantor-backed loans.
//!
//! [`CreditBook`] is the only owner of guarantor pledge reservations. The
//! ledger side reads them through [`CreditBook::reserved`] before letting
//! any balance leave an account.
//!
//! Guarantor-backed principal is drawn from the treasury's lending pool and
//! credited to the borrower's ledger balance. Repayment returns it to the
//! pool from the borrower; default returns it from the guarantors' pledges.

use crate::account::AccountId;
use crate::amount::Amount;
use crate::clock::Clock;
use crate::engine::{log_outcome, LedgerEngine};
use crate::error::{LedgerError, Result};
use crate::events::{EventSink, LedgerEvent};
use crate::loan::{Loan, LoanId, LoanKind, LoanStatus, Pledge};
use crate::transport::ValueTransport;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Loans, live and archived, plus the per-account pledge totals.
#[derive(Debug, Default)]
pub struct CreditBook {
    loans: BTreeMap<LoanId, Loan>,
    reserved: HashMap<AccountId, Amount>,
    last_id: u64,
}

impl CreditBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pledged by `id` across all open loans.
    pub fn reserved(&self, id: &AccountId) -> Amount {
        self.reserved.get(id).copied().unwrap_or(Amount::ZERO)
    }

    /// Any loan ever issued, open or closed.
    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    /// All loans in issue order.
    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn loans_of<'a>(&'a self, borrower: &'a AccountId) -> impl Iterator<Item = &'a Loan> {
        self.loans.values().filter(move |l| &l.borrower == borrower)
    }

    /// Loans that are neither repaid nor defaulted.
    pub fn open_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|l| l.is_open())
    }

    pub(crate) fn next_id(&self) -> LoanId {
        LoanId(self.last_id + 1)
    }

    /// Reservation totals after adding (or releasing) `pledges`.
    fn checked_reservations(
        &self,
        pledges: &[Pledge],
        release: bool,
    ) -> Result<Vec<(AccountId, Amount)>> {
        pledges
            .iter()
            .map(|pledge| {
                let current = self.reserved(&pledge.guarantor);
                let updated = if release {
                    current.checked_sub(pledge.share)
                } else {
                    current.checked_add(pledge.share)
                };
                updated
                    .map(|total| (pledge.guarantor.clone(), total))
                    .ok_or(LedgerError::Overflow)
            })
            .collect()
    }

    fn apply_reservations(&mut self, reservations: Vec<(AccountId, Amount)>) {
        for (id, total) in reservations {
            if total.is_zero() {
                self.reserved.remove(&id);
            } else {
                self.reserved.insert(id, total);
            }
        }
    }

    /// Adds a loan and reserves its pledges.
    pub(crate) fn record(&mut self, loan: Loan, reservations: Vec<(AccountId, Amount)>) {
        self.last_id = self.last_id.max(loan.id.0);
        self.apply_reservations(reservations);
        self.loans.insert(loan.id, loan);
    }

    /// Moves an open loan to `status` and releases its pledges.
    pub(crate) fn close(
        &mut self,
        id: LoanId,
        status: LoanStatus,
        reservations: Vec<(AccountId, Amount)>,
    ) -> Result<()> {
        let loan = self.loans.get_mut(&id).ok_or(LedgerError::UnknownLoan(id))?;
        loan.close(status)?;
        self.apply_reservations(reservations);
        Ok(())
    }

    fn require_open(&self, id: LoanId) -> Result<&Loan> {
        let loan = self.loans.get(&id).ok_or(LedgerError::UnknownLoan(id))?;
        if !loan.is_open() {
            return Err(LedgerError::LoanNotOpen(id));
        }
        Ok(loan)
    }
}

impl<T, S, C> LedgerEngine<T, S, C>
where
    T: ValueTransport,
    S: EventSink,
    C: Clock,
{
    /// Borrows against the caller's accrued referral bonus.
    ///
    /// The bonus is consumed as collateral and the amount is credited to the
    /// caller's balance. The loan is settled at creation and archived as
    /// `Repaid`.
    pub fn lend_with_referrals(&mut self, caller: &AccountId, amount: Amount) -> Result<LoanId> {
        let result = self.apply_lend_with_referrals(caller, amount);
        log_outcome("lend_with_referrals", caller, &result);
        result
    }

    fn apply_lend_with_referrals(&mut self, caller: &AccountId, amount: Amount) -> Result<LoanId> {
        let account = self.accounts.require(caller)?;
        self.validate_amount(amount)?;
        let bonus = account.bonus_consumed(amount)?;
        let balance = account.credited(amount)?;

        let id = self.credit.next_id();
        let loan = Loan::referral_backed(id, caller.clone(), amount, self.clock.now());

        self.accounts.update(caller, |account| {
            account.referral_bonus = bonus;
            account.balance = balance;
        });
        self.credit.record(loan, Vec::new());

        debug!(
            "Loan {} of {} to {} settled against referral bonus, {} bonus left",
            id, amount, caller, bonus
        );
        self.sink.emit(LedgerEvent::LoanIssued {
            loan: id,
            borrower: caller.clone(),
            amount,
            kind: LoanKind::ReferralBacked,
        });
        self.sink.emit(LedgerEvent::LoanRepaid { loan: id });
        Ok(id)
    }

    /// Borrows from the lending pool against equal pledges from `guarantors`.
    ///
    /// Each guarantor reserves `amount / guarantors.len()` of its free
    /// balance, truncated to the token precision, with the remainder on the
    /// first guarantor. The loan must be repaid within `duration_secs`.
    pub fn lend_with_guarantors(
        &mut self,
        caller: &AccountId,
        amount: Amount,
        guarantors: &[AccountId],
        duration_secs: u64,
    ) -> Result<LoanId> {
        let result = self.apply_lend_with_guarantors(caller, amount, guarantors, duration_secs);
        log_outcome("lend_with_guarantors", caller, &result);
        result
    }

    fn apply_lend_with_guarantors(
        &mut self,
        caller: &AccountId,
        amount: Amount,
        guarantors: &[AccountId],
        duration_secs: u64,
    ) -> Result<LoanId> {
        let borrower = self.accounts.require(caller)?;
        self.validate_amount(amount)?;
        if guarantors.is_empty() {
            return Err(LedgerError::NoGuarantors);
        }
        if duration_secs == 0 {
            return Err(LedgerError::InvalidDuration);
        }

        let mut seen = HashSet::new();
        for guarantor in guarantors {
            if guarantor == caller || !self.accounts.is_registered(guarantor) {
                return Err(LedgerError::InvalidGuarantor(guarantor.clone()));
            }
            if !seen.insert(guarantor) {
                return Err(LedgerError::DuplicateGuarantor(guarantor.clone()));
            }
        }

        let decimals = self.config.decimals;
        let shares = amount
            .split_even(guarantors.len(), decimals)
            .ok_or(LedgerError::Overflow)?;
        let mut pledges = Vec::with_capacity(guarantors.len());
        for (guarantor, share) in guarantors.iter().zip(shares) {
            let free = self.free_balance(guarantor)?;
            if share > free {
                return Err(LedgerError::GuarantorUnderfunded {
                    guarantor: guarantor.clone(),
                    free,
                    pledge: share,
                });
            }
            pledges.push(Pledge {
                guarantor: guarantor.clone(),
                share,
            });
        }
        let reservations = self.credit.checked_reservations(&pledges, false)?;

        let now = self.clock.now();
        let deadline = now
            .checked_add(duration_secs)
            .ok_or(LedgerError::InvalidDuration)?;

        let fee = amount
            .mul_truncated(self.config.loan_fee_rate, decimals)
            .ok_or(LedgerError::Overflow)?;
        let disbursed = amount.checked_sub(fee).ok_or(LedgerError::Overflow)?;
        let pool = self.treasury.checked_pool_draw(amount)?;
        let admin_balance = self.treasury.checked_fee_credit(fee)?;
        let balance = borrower.credited(disbursed)?;

        let id = self.credit.next_id();
        let loan = Loan::guarantor_backed(id, caller.clone(), amount, pledges, now, deadline);

        self.credit.record(loan, reservations);
        self.treasury.lending_pool = pool;
        self.treasury.admin_balance = admin_balance;
        self.accounts.update(caller, |account| account.balance = balance);

        debug!(
            "Loan {} of {} to {} backed by {} guarantors, fee {}, due at {}",
            id,
            amount,
            caller,
            guarantors.len(),
            fee,
            deadline
        );
        self.sink.emit(LedgerEvent::LoanIssued {
            loan: id,
            borrower: caller.clone(),
            amount,
            kind: LoanKind::GuarantorBacked,
        });
        Ok(id)
    }

    /// Repays an open guarantor-backed loan from the borrower's free balance
    /// and releases every pledge. Only allowed before the deadline.
    pub fn repay_loan(&mut self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let result = self.apply_repay_loan(caller, loan_id);
        log_outcome("repay_loan", caller, &result);
        result
    }

    fn apply_repay_loan(&mut self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let loan = self.credit.require_open(loan_id)?;
        if &loan.borrower != caller {
            return Err(LedgerError::NotBorrower {
                caller: caller.clone(),
                loan: loan_id,
            });
        }
        if let Some(deadline) = loan.deadline {
            if self.clock.now() >= deadline {
                return Err(LedgerError::DeadlinePassed {
                    loan: loan_id,
                    deadline,
                });
            }
        }

        let principal = loan.principal;
        let balance = self.accounts.require(caller)?.debited(principal)?;
        self.check_unpledged(caller, principal)?;
        let pool = self.treasury.checked_pool_credit(principal)?;
        let reservations = self.credit.checked_reservations(&loan.pledges, true)?;

        self.credit.close(loan_id, LoanStatus::Repaid, reservations)?;
        self.treasury.lending_pool = pool;
        self.accounts.update(caller, |account| account.balance = balance);

        debug!("Loan {} repaid by {}, {} back in pool", loan_id, caller, principal);
        self.sink.emit(LedgerEvent::LoanRepaid { loan: loan_id });
        Ok(())
    }

    /// Settles an overdue loan from its guarantors' pledges.
    ///
    /// Anyone may trigger settlement once the deadline has passed. Each
    /// guarantor's pledged share is debited and returned to the lending pool.
    pub fn settle_default(&mut self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let result = self.apply_settle_default(loan_id);
        log_outcome("settle_default", caller, &result);
        result
    }

    fn apply_settle_default(&mut self, loan_id: LoanId) -> Result<()> {
        let loan = self.credit.require_open(loan_id)?;
        let now = self.clock.now();
        if !loan.is_past_deadline(now) {
            return Err(LedgerError::LoanNotDue {
                loan: loan_id,
                deadline: loan.deadline.unwrap_or(u64::MAX),
            });
        }

        let mut debits = Vec::with_capacity(loan.pledges.len());
        for pledge in &loan.pledges {
            let balance = self.accounts.require(&pledge.guarantor)?.debited(pledge.share)?;
            debits.push((pledge.guarantor.clone(), balance));
        }
        // Pledge shares sum to the principal.
        let recovered = loan.principal;
        let pool = self.treasury.checked_pool_credit(recovered)?;
        let reservations = self.credit.checked_reservations(&loan.pledges, true)?;

        self.credit.close(loan_id, LoanStatus::Defaulted, reservations)?;
        self.treasury.lending_pool = pool;
        for (guarantor, balance) in debits {
            self.accounts
                .update(&guarantor, |account| account.balance = balance);
        }

        debug!(
            "Loan {} defaulted at {}, {} recovered from guarantors",
            loan_id, now, recovered
        );
        self.sink.emit(LedgerEvent::LoanDefaulted { loan: loan_id });
        Ok(())
    }
}
