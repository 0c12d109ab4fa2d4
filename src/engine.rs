//! Core ledger engine.
//!
//! A single-writer state machine: every operation validates completely,
//! performs at most one transport call, and only then commits. A rejected
//! operation, including one whose transport call fails, leaves no trace.
//!
//! Signup and the plain ledger operations live here; the credit operations
//! are in [`crate::credit`].

use crate::account::{Account, AccountId, AccountRegistry};
use crate::amount::Amount;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::credit::CreditBook;
use crate::error::{LedgerError, Result};
use crate::events::{EventSink, LedgerEvent, LogSink};
use crate::loan::{Loan, LoanId};
use crate::transport::ValueTransport;
use crate::treasury::Treasury;
use log::{debug, warn};
use std::io::Write;

/// The savings and credit ledger.
///
/// Owns account, loan, and treasury state. Value moves in and out only
/// through the injected [`ValueTransport`]; notifications go to the
/// injected [`EventSink`] after each commit.
pub struct LedgerEngine<T, S = LogSink, C = SystemClock> {
    pub(crate) config: EngineConfig,
    pub(crate) accounts: AccountRegistry,
    pub(crate) credit: CreditBook,
    pub(crate) treasury: Treasury,
    pub(crate) transport: T,
    pub(crate) sink: S,
    pub(crate) clock: C,
}

impl<T: ValueTransport> LedgerEngine<T, LogSink, SystemClock> {
    /// Creates an engine that logs its events and reads wall-clock time.
    pub fn with_transport(config: EngineConfig, transport: T) -> Result<Self> {
        Self::new(config, transport, LogSink, SystemClock)
    }
}

impl<T, S, C> LedgerEngine<T, S, C>
where
    T: ValueTransport,
    S: EventSink,
    C: Clock,
{
    pub fn new(config: EngineConfig, transport: T, sink: S, clock: C) -> Result<Self> {
        config.validate()?;
        debug!(
            "Ledger created: admin {}, {} decimals, signup fee {}",
            config.admin, config.decimals, config.signup_fee
        );
        Ok(LedgerEngine {
            config,
            accounts: AccountRegistry::new(),
            credit: CreditBook::new(),
            treasury: Treasury::new(),
            transport,
            sink,
            clock,
        })
    }

    /// Registers `caller`, charging the signup fee.
    ///
    /// With a referrer, part of the fee is credited to the referrer's
    /// referral bonus per the configured policy; the rest goes to the
    /// treasury.
    pub fn sign_up(&mut self, caller: &AccountId, referrer: Option<&AccountId>) -> Result<()> {
        let result = self.apply_sign_up(caller, referrer);
        log_outcome("sign_up", caller, &result);
        result
    }

    fn apply_sign_up(&mut self, caller: &AccountId, referrer: Option<&AccountId>) -> Result<()> {
        self.accounts.check_signup(caller, referrer)?;

        let fee = self.config.signup_fee;
        let referral = match referrer {
            Some(referrer_id) => {
                let bonus = self.config.referral_bonus().ok_or(LedgerError::Overflow)?;
                let accrued = self.accounts.require(referrer_id)?.bonus_accrued(bonus)?;
                Some((referrer_id, bonus, accrued))
            }
            None => None,
        };
        let bonus = referral.map(|(_, bonus, _)| bonus).unwrap_or(Amount::ZERO);
        let fee_share = fee.checked_sub(bonus).ok_or(LedgerError::Overflow)?;
        let admin_balance = self.treasury.checked_fee_credit(fee_share)?;

        if !fee.is_zero() {
            self.transport.transfer_in(caller, fee)?;
        }

        self.accounts
            .insert(Account::new(caller.clone(), referrer.cloned()));
        if let Some((referrer_id, _, accrued)) = referral {
            self.accounts
                .update(referrer_id, |account| account.referral_bonus = accrued);
        }
        self.treasury.admin_balance = admin_balance;

        debug!(
            "Registered {} (referrer: {:?}), fee {}, bonus {}",
            caller, referrer, fee, bonus
        );
        self.sink.emit(LedgerEvent::NewUserAdded {
            user: caller.clone(),
            referrer: referrer.cloned(),
        });
        Ok(())
    }

    /// Deposits `amount` from the caller's wallet into their balance.
    pub fn save(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let result = self.apply_save(caller, amount);
        log_outcome("save", caller, &result);
        result
    }

    fn apply_save(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let account = self.accounts.require(caller)?;
        self.validate_amount(amount)?;
        let balance = account.credited(amount)?;

        self.transport.transfer_in(caller, amount)?;

        self.accounts.update(caller, |account| account.balance = balance);
        debug!("Deposited {} to {}", amount, caller);
        self.sink.emit(LedgerEvent::DepositSuccessful {
            user: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Withdraws `amount` of the caller's free balance to their wallet.
    ///
    /// Funds pledged as guarantor for open loans cannot be withdrawn.
    pub fn user_withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let result = self.apply_user_withdraw(caller, amount);
        log_outcome("user_withdraw", caller, &result);
        result
    }

    fn apply_user_withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let account = self.accounts.require(caller)?;
        self.validate_amount(amount)?;
        let balance = account.debited(amount)?;
        self.check_unpledged(caller, amount)?;

        self.transport.transfer_out(caller, amount)?;

        self.accounts.update(caller, |account| account.balance = balance);
        debug!("Withdrew {} for {}", amount, caller);
        self.sink.emit(LedgerEvent::UserWithdrawal {
            user: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Pays `amount` of treasury fee revenue out to the admin.
    pub fn admin_withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let result = self.apply_admin_withdraw(caller, amount);
        log_outcome("admin_withdraw", caller, &result);
        result
    }

    fn apply_admin_withdraw(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        self.require_admin(caller)?;
        self.validate_amount(amount)?;
        let admin_balance = self.treasury.checked_admin_withdrawal(amount)?;

        self.transport.transfer_out(caller, amount)?;

        self.treasury.admin_balance = admin_balance;
        debug!("Admin withdrew {}, treasury now {}", amount, admin_balance);
        self.sink.emit(LedgerEvent::AdminWithdrawal { amount });
        Ok(())
    }

    /// Moves `amount` from the admin's wallet into the lending pool.
    pub fn fund_pool(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let result = self.apply_fund_pool(caller, amount);
        log_outcome("fund_pool", caller, &result);
        result
    }

    fn apply_fund_pool(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        self.require_admin(caller)?;
        self.validate_amount(amount)?;
        let pool = self.treasury.checked_pool_credit(amount)?;

        self.transport.transfer_in(caller, amount)?;

        self.treasury.lending_pool = pool;
        debug!("Lending pool funded with {}, now {}", amount, pool);
        self.sink.emit(LedgerEvent::PoolFunded { amount });
        Ok(())
    }

    /// Rejects zero, negative, and over-precise amounts.
    pub(crate) fn validate_amount(&self, amount: Amount) -> Result<()> {
        if amount.is_zero() || amount.is_negative() || !amount.fits_precision(self.config.decimals)
        {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(())
    }

    fn require_admin(&self, caller: &AccountId) -> Result<()> {
        if *caller != self.config.admin {
            return Err(LedgerError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    /// Fails with `FundsPledged` if debiting `amount` would touch reserved
    /// funds. Callers check the plain balance first.
    pub(crate) fn check_unpledged(&self, id: &AccountId, amount: Amount) -> Result<()> {
        let free = self.free_balance(id)?;
        if amount > free {
            return Err(LedgerError::FundsPledged {
                reserved: self.credit.reserved(id),
                free,
            });
        }
        Ok(())
    }

    /// Balance minus everything pledged for open loans.
    pub fn free_balance(&self, id: &AccountId) -> Result<Amount> {
        let balance = self.accounts.require(id)?.balance;
        Ok(balance
            .checked_sub(self.credit.reserved(id))
            .unwrap_or(Amount::ZERO))
    }

    /// Amount of `id`'s balance pledged for open loans.
    pub fn reserved(&self, id: &AccountId) -> Amount {
        self.credit.reserved(id)
    }

    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.accounts.is_registered(id)
    }

    /// Current state of a registered account.
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        self.credit.loan(id)
    }

    /// Every loan `borrower` has taken, in issue order.
    pub fn loans_of<'a>(&'a self, borrower: &'a AccountId) -> impl Iterator<Item = &'a Loan> {
        self.credit.loans_of(borrower)
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, e.g. to mint or pause in tests.
    ///
    /// Moving value through it directly bypasses the ledger and breaks
    /// conservation.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The injected clock. [`ManualClock`](crate::ManualClock) advances
    /// through a shared reference.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Everything the engine owes: user balances, unspent referral bonuses,
    /// and both treasury pools. Equals net value received through the
    /// transport.
    pub fn total_liabilities(&self) -> Result<Amount> {
        let treasury = self.treasury.total()?;
        self.accounts
            .iter()
            .try_fold(treasury, |total, account| {
                total
                    .checked_add(account.balance)?
                    .checked_add(account.referral_bonus)
            })
            .ok_or(LedgerError::Overflow)
    }

    /// Writes account states as CSV, ordered by account id.
    pub fn write_accounts<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "balance", "reserved", "referral_bonus", "referrer"])?;

        for account in self.accounts.iter() {
            csv_writer.write_record([
                account.id.to_string(),
                account.balance.to_string(),
                self.credit.reserved(&account.id).to_string(),
                account.referral_bonus.to_string(),
                account
                    .referrer
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

/// Logs a rejected operation at warn level.
pub(crate) fn log_outcome<T>(operation: &str, caller: &AccountId, result: &Result<T>) {
    if let Err(e) = result {
        warn!("{} by {} rejected: {}", operation, caller, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ReferralPolicy;
    use crate::error::TransportError;
    use crate::events::RecordingSink;
    use crate::transport::InMemoryTransport;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    type TestEngine = LedgerEngine<InMemoryTransport, RecordingSink, ManualClock>;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn id(s: &str) -> AccountId {
        AccountId::from(s)
    }

    fn engine() -> TestEngine {
        let mut token = InMemoryTransport::new();
        for user in ["admin", "alice", "bob", "carol"] {
            token.mint(user, amt("1000"));
        }
        let config = EngineConfig::new("admin", 6, amt("10"))
            .with_referral_policy(ReferralPolicy::Fixed(amt("2")));
        LedgerEngine::new(config, token, RecordingSink::new(), ManualClock::new(0)).unwrap()
    }

    #[test]
    fn test_sign_up_charges_fee_to_treasury() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();

        assert!(engine.is_registered(&id("alice")));
        assert_eq!(engine.treasury().admin_balance, amt("10"));
        assert_eq!(engine.transport().balance_of(&id("alice")), amt("990"));
        assert_eq!(
            engine.sink().last(),
            Some(&LedgerEvent::NewUserAdded {
                user: id("alice"),
                referrer: None
            })
        );
    }

    #[test]
    fn test_sign_up_with_referrer_splits_fee() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        engine.sign_up(&id("bob"), Some(&id("alice"))).unwrap();

        assert_eq!(engine.account(&id("alice")).unwrap().referral_bonus, amt("2"));
        assert_eq!(engine.account(&id("bob")).unwrap().referrer, Some(id("alice")));
        assert_eq!(engine.treasury().admin_balance, amt("18"));
    }

    #[test]
    fn test_sign_up_twice_fails() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        let before = engine.account(&id("alice")).cloned();

        let err = engine.sign_up(&id("alice"), None).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRegistered(_)));
        assert_eq!(engine.account(&id("alice")).cloned(), before);
        assert_eq!(engine.treasury().admin_balance, amt("10"));
    }

    #[test]
    fn test_sign_up_unknown_referrer_aborts() {
        let mut engine = engine();
        let err = engine.sign_up(&id("bob"), Some(&id("ghost"))).unwrap_err();

        assert!(matches!(err, LedgerError::UnknownReferrer(_)));
        assert!(!engine.is_registered(&id("bob")));
        assert_eq!(engine.transport().balance_of(&id("bob")), amt("1000"));
        assert!(engine.sink().events().is_empty());
    }

    #[test]
    fn test_sign_up_without_tokens_rolls_back() {
        let mut engine = engine();
        let err = engine.sign_up(&id("dave"), None).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Transport(TransportError::InsufficientFunds { .. })
        ));
        assert!(!engine.is_registered(&id("dave")));
        assert_eq!(engine.treasury().admin_balance, Amount::ZERO);
    }

    #[test]
    fn test_save_requires_registration_and_valid_amount() {
        let mut engine = engine();
        assert!(matches!(
            engine.save(&id("alice"), amt("5")),
            Err(LedgerError::NotRegistered(_))
        ));

        engine.sign_up(&id("alice"), None).unwrap();
        assert!(matches!(
            engine.save(&id("alice"), Amount::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.save(&id("alice"), amt("-1")),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.save(&id("alice"), amt("0.0000001")),
            Err(LedgerError::InvalidAmount(_))
        ));

        engine.save(&id("alice"), amt("50.5")).unwrap();
        assert_eq!(engine.account(&id("alice")).unwrap().balance, amt("50.5"));
    }

    #[test]
    fn test_user_withdraw_bounds() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        engine.save(&id("alice"), amt("50")).unwrap();

        assert!(matches!(
            engine.user_withdraw(&id("alice"), amt("50.000001")),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        engine.user_withdraw(&id("alice"), amt("50")).unwrap();
        assert_eq!(engine.account(&id("alice")).unwrap().balance, Amount::ZERO);
        assert_eq!(engine.transport().balance_of(&id("alice")), amt("990"));
    }

    #[test]
    fn test_transport_failure_leaves_state_untouched() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        engine.save(&id("alice"), amt("50")).unwrap();
        engine.sink_mut().clear();

        engine.transport_mut().reject_next("paused");
        let err = engine.user_withdraw(&id("alice"), amt("20")).unwrap_err();

        assert!(matches!(err, LedgerError::Transport(TransportError::Rejected(_))));
        assert_eq!(engine.account(&id("alice")).unwrap().balance, amt("50"));
        assert!(engine.sink().events().is_empty());
    }

    #[test]
    fn test_admin_operations_require_admin() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();

        assert!(matches!(
            engine.admin_withdraw(&id("alice"), amt("1")),
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.fund_pool(&id("alice"), amt("1")),
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            engine.admin_withdraw(&id("admin"), amt("11")),
            Err(LedgerError::InsufficientTreasury { .. })
        ));

        engine.admin_withdraw(&id("admin"), amt("10")).unwrap();
        assert_eq!(engine.treasury().admin_balance, Amount::ZERO);
        assert_eq!(engine.transport().balance_of(&id("admin")), amt("1010"));
    }

    #[test]
    fn test_write_accounts_csv() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        engine.sign_up(&id("bob"), Some(&id("alice"))).unwrap();
        engine.save(&id("bob"), amt("12.25")).unwrap();

        let mut output = Vec::new();
        engine.write_accounts(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "id,balance,reserved,referral_bonus,referrer");
        assert_eq!(lines[1], "alice,0,0,2,");
        assert_eq!(lines[2], "bob,12.25,0,0,alice");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::new("admin", 6, amt("10"))
            .with_referral_policy(ReferralPolicy::Fixed(amt("20")));
        let result = LedgerEngine::new(
            config,
            InMemoryTransport::new(),
            RecordingSink::new(),
            ManualClock::new(0),
        );
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_total_liabilities_reports_overflow() {
        let mut engine = engine();
        engine.sign_up(&id("alice"), None).unwrap();
        engine.save(&id("alice"), amt("1")).unwrap();
        assert_eq!(engine.total_liabilities().unwrap(), amt("11"));

        engine.treasury.lending_pool = Amount::new(Decimal::MAX - Decimal::from(10));
        assert!(matches!(engine.total_liabilities(), Err(LedgerError::Overflow)));
    }
}
