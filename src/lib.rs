//! # Savings Ledger
//!
//! Account and credit ledger for a referral-based savings and lending pool
//! denominated in a fixed-decimal stable-value token.
//!
//! ## Design Principles
//!
//! - **Single writer**: one `&mut` call per operation, no interior threads
//! - **All-or-nothing**: every operation validates fully before it moves
//!   value or mutates state; a failed transport call rolls everything back
//! - **Fund conservation**: user balances, unspent referral bonuses, and the
//!   treasury always add up to the value held through the transport
//! - **Injected collaborators**: token transport, event sink, and clock are
//!   traits, so several engines can coexist in one process
//!
//! ## Example
//!
//! ```
//! use savings_ledger::{
//!     AccountId, Amount, EngineConfig, InMemoryTransport, LedgerEngine, ManualClock,
//!     RecordingSink,
//! };
//!
//! let mut token = InMemoryTransport::new();
//! token.mint("alice", Amount::from_units(100));
//!
//! let config = EngineConfig::new("admin", 6, Amount::from_units(10));
//! let mut engine =
//!     LedgerEngine::new(config, token, RecordingSink::new(), ManualClock::new(0)).unwrap();
//!
//! let alice = AccountId::from("alice");
//! engine.sign_up(&alice, None).unwrap();
//! engine.save(&alice, Amount::from_units(50)).unwrap();
//! assert_eq!(engine.account(&alice).unwrap().balance, Amount::from_units(50));
//! ```

pub mod account;
pub mod amount;
pub mod clock;
pub mod config;
pub mod credit;
pub mod engine;
pub mod error;
pub mod events;
pub mod loan;
pub mod transport;
pub mod treasury;

pub use account::{Account, AccountId, AccountRegistry};
pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, ReferralPolicy};
pub use credit::CreditBook;
pub use engine::LedgerEngine;
pub use error::{LedgerError, Result, TransportError};
pub use events::{EventSink, LedgerEvent, LogSink, RecordingSink};
pub use loan::{Loan, LoanId, LoanKind, LoanStatus, Pledge};
pub use transport::{InMemoryTransport, ValueTransport};
pub use treasury::Treasury;
