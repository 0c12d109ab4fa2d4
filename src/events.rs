//! Ledger notifications.
//!
//! Events are emitted after a state change commits. The engine never reads
//! them back.

use crate::account::AccountId;
use crate::amount::Amount;
use crate::loan::{LoanId, LoanKind};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LedgerEvent {
    NewUserAdded {
        user: AccountId,
        referrer: Option<AccountId>,
    },
    DepositSuccessful {
        user: AccountId,
        amount: Amount,
    },
    UserWithdrawal {
        user: AccountId,
        amount: Amount,
    },
    AdminWithdrawal {
        amount: Amount,
    },
    PoolFunded {
        amount: Amount,
    },
    LoanIssued {
        loan: LoanId,
        borrower: AccountId,
        amount: Amount,
        kind: LoanKind,
    },
    LoanRepaid {
        loan: LoanId,
    },
    LoanDefaulted {
        loan: LoanId,
    },
}

/// Fire-and-forget receiver of ledger events.
pub trait EventSink {
    fn emit(&mut self, event: LedgerEvent);
}

/// Writes every event to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: LedgerEvent) {
        info!("ledger event: {:?}", event);
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<LedgerEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.last()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}
