//! End-to-end scenarios for the savings ledger.
//!
//! Mirrors a deployment with a 6-decimal token, a signup fee of 10, and an
//! admin wallet pre-funded with 100000 units that seeds the lending pool.

use rust_decimal_macros::dec;
use savings_ledger::{
    AccountId, Amount, EngineConfig, InMemoryTransport, LedgerEngine, LedgerError, LedgerEvent,
    LoanKind, LoanStatus, ManualClock, RecordingSink, ValueTransport,
};

type Engine = LedgerEngine<InMemoryTransport, RecordingSink, ManualClock>;

const DAY: u64 = 86_400;
const START: u64 = 1_700_000_000;

fn id(name: &str) -> AccountId {
    AccountId::from(name)
}

fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

/// Deploys the engine and funds the pool with the admin's 100000 units.
fn deploy() -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut token = InMemoryTransport::new();
    token.mint("admin", units(100_000));
    for user in ["user1", "user2", "user3", "user4", "user5", "user6"] {
        token.mint(user, units(1_000));
    }

    let config = EngineConfig::new("admin", 6, units(10));
    let mut engine =
        LedgerEngine::new(config, token, RecordingSink::new(), ManualClock::new(START)).unwrap();
    engine.fund_pool(&id("admin"), units(100_000)).unwrap();
    engine
}

/// user1 signs up first; user2..user4 join with user1 as referrer.
fn deploy_with_users() -> Engine {
    let mut engine = deploy();
    engine.sign_up(&id("user1"), None).unwrap();
    for user in ["user2", "user3", "user4"] {
        engine.sign_up(&id(user), Some(&id("user1"))).unwrap();
    }
    engine
}

fn assert_conserved(engine: &Engine) {
    let token = engine.transport();
    assert_eq!(engine.total_liabilities().unwrap(), token.custody());
    assert_eq!(token.custody(), token.total_in() - token.total_out());
}

#[test]
fn test_sign_up_with_referrer_emits_new_user_event() {
    let mut engine = deploy();
    engine.sign_up(&id("user1"), None).unwrap();
    engine.sign_up(&id("user2"), Some(&id("user1"))).unwrap();

    assert!(engine.is_registered(&id("user1")));
    assert!(engine.is_registered(&id("user2")));
    assert_eq!(
        engine.sink().last(),
        Some(&LedgerEvent::NewUserAdded {
            user: id("user2"),
            referrer: Some(id("user1")),
        })
    );
    assert_eq!(engine.account(&id("user1")).unwrap().referral_bonus, units(1));
    assert_eq!(engine.treasury().admin_balance, units(19));
    assert_conserved(&engine);
}

#[test]
fn test_save_credits_balance() {
    let mut engine = deploy_with_users();
    engine.save(&id("user1"), units(50)).unwrap();

    assert_eq!(engine.account(&id("user1")).unwrap().balance, units(50));
    assert_eq!(
        engine.sink().last(),
        Some(&LedgerEvent::DepositSuccessful {
            user: id("user1"),
            amount: units(50),
        })
    );
    assert_conserved(&engine);
}

#[test]
fn test_lend_with_referrals_needs_enough_bonus() {
    let mut engine = deploy_with_users();
    assert_eq!(engine.account(&id("user1")).unwrap().referral_bonus, units(3));

    let err = engine.lend_with_referrals(&id("user1"), units(50)).unwrap_err();
    assert!(matches!(err, LedgerError::CreditLimitExceeded { .. }));

    let loan_id = engine.lend_with_referrals(&id("user1"), units(3)).unwrap();
    let loan = engine.loan(loan_id).unwrap();
    assert_eq!(loan.kind, LoanKind::ReferralBacked);
    assert_eq!(loan.status, LoanStatus::Repaid);
    assert_eq!(engine.account(&id("user1")).unwrap().balance, units(3));
    assert_eq!(engine.account(&id("user1")).unwrap().referral_bonus, Amount::ZERO);
    assert_conserved(&engine);
}

#[test]
fn test_lend_with_guarantors_reserves_thirty_each() {
    let mut engine = deploy_with_users();
    for user in ["user2", "user3", "user4"] {
        engine.save(&id(user), units(50)).unwrap();
    }

    let guarantors = [id("user2"), id("user3"), id("user4")];
    let loan_id = engine
        .lend_with_guarantors(&id("user1"), units(90), &guarantors, DAY)
        .unwrap();

    let loan = engine.loan(loan_id).unwrap();
    assert_eq!(loan.status, LoanStatus::Open);
    assert_eq!(loan.deadline, Some(START + DAY));
    for g in &guarantors {
        assert_eq!(engine.reserved(g), units(30));
        assert_eq!(engine.free_balance(g).unwrap(), units(20));
    }
    assert_eq!(
        engine.sink().last(),
        Some(&LedgerEvent::LoanIssued {
            loan: loan_id,
            borrower: id("user1"),
            amount: units(90),
            kind: LoanKind::GuarantorBacked,
        })
    );
    assert_conserved(&engine);
}

#[test]
fn test_user_withdraw_after_guarantor_loan() {
    let mut engine = deploy_with_users();
    engine.save(&id("user1"), units(50)).unwrap();
    for user in ["user2", "user3", "user4"] {
        engine.save(&id(user), units(50)).unwrap();
    }
    let guarantors = [id("user2"), id("user3"), id("user4")];
    engine
        .lend_with_guarantors(&id("user1"), units(90), &guarantors, DAY)
        .unwrap();

    engine.user_withdraw(&id("user1"), units(40)).unwrap();
    assert_eq!(engine.account(&id("user1")).unwrap().balance, units(100));

    let err = engine.user_withdraw(&id("user2"), units(21)).unwrap_err();
    assert!(matches!(err, LedgerError::FundsPledged { .. }));
    engine.user_withdraw(&id("user2"), units(20)).unwrap();
    assert_conserved(&engine);
}

#[test]
fn test_admin_withdraw_needs_treasury_funds() {
    let mut engine = deploy_with_users();
    assert_eq!(engine.treasury().admin_balance, units(37));

    let err = engine.admin_withdraw(&id("admin"), units(50)).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientTreasury { .. }));

    engine.sign_up(&id("user5"), None).unwrap();
    engine.sign_up(&id("user6"), None).unwrap();
    engine.admin_withdraw(&id("admin"), units(50)).unwrap();

    assert_eq!(engine.treasury().admin_balance, units(7));
    assert_eq!(engine.transport().balance_of(&id("admin")), units(50));
    assert_conserved(&engine);
}

#[test]
fn test_full_loan_lifecycle_with_default() {
    let mut engine = deploy_with_users();
    for user in ["user2", "user3"] {
        engine.save(&id(user), units(100)).unwrap();
    }
    let loan_id = engine
        .lend_with_guarantors(&id("user1"), units(100), &[id("user2"), id("user3")], DAY)
        .unwrap();
    engine.user_withdraw(&id("user1"), units(100)).unwrap();

    engine.clock().advance(DAY / 2);
    assert!(matches!(
        engine.settle_default(&id("user4"), loan_id),
        Err(LedgerError::LoanNotDue { .. })
    ));

    engine.clock().advance(DAY / 2);
    engine.settle_default(&id("user4"), loan_id).unwrap();

    assert_eq!(engine.loan(loan_id).unwrap().status, LoanStatus::Defaulted);
    assert_eq!(engine.account(&id("user2")).unwrap().balance, units(50));
    assert_eq!(engine.account(&id("user3")).unwrap().balance, units(50));
    assert_eq!(engine.treasury().lending_pool, units(100_000));
    engine.user_withdraw(&id("user2"), units(50)).unwrap();
    assert_conserved(&engine);
}

#[test]
fn test_full_loan_lifecycle_with_fee_and_repayment() {
    let mut token = InMemoryTransport::new();
    token.mint("admin", units(100_000));
    for user in ["user1", "user2"] {
        token.mint(user, units(1_000));
    }
    let config = EngineConfig::new("admin", 6, units(10)).with_loan_fee_rate(dec!(0.02));
    let mut engine =
        LedgerEngine::new(config, token, RecordingSink::new(), ManualClock::new(START)).unwrap();
    engine.fund_pool(&id("admin"), units(100_000)).unwrap();
    engine.sign_up(&id("user1"), None).unwrap();
    engine.sign_up(&id("user2"), Some(&id("user1"))).unwrap();
    engine.save(&id("user2"), units(500)).unwrap();

    let loan_id = engine
        .lend_with_guarantors(&id("user1"), units(250), &[id("user2")], 7 * DAY)
        .unwrap();
    assert_eq!(engine.account(&id("user1")).unwrap().balance, units(245));

    engine.save(&id("user1"), units(5)).unwrap();
    engine.clock().advance(3 * DAY);
    engine.repay_loan(&id("user1"), loan_id).unwrap();

    assert_eq!(engine.loan(loan_id).unwrap().status, LoanStatus::Repaid);
    assert_eq!(engine.reserved(&id("user2")), Amount::ZERO);
    engine.user_withdraw(&id("user2"), units(500)).unwrap();
    assert_eq!(engine.treasury().admin_balance, units(24));
    assert_conserved(&engine);
}
