//! Error types for the ledger engine.

use crate::account::AccountId;
use crate::amount::Amount;
use crate::config::ConfigError;
use crate::loan::LoanId;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failure reported by the external value transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The payer does not hold enough of the token
    #[error("insufficient token balance for {holder}: has {available}, needs {required}")]
    InsufficientFunds {
        holder: AccountId,
        available: Amount,
        required: Amount,
    },

    /// The transport refused the transfer for an implementation-specific reason
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// A holder balance or a custody counter would leave the representable range
    #[error("token amount overflow")]
    Overflow,
}

/// Errors returned by ledger operations.
///
/// Every variant aborts the operation before any state is committed.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Signup by an identity that already has an account
    #[error("account {0} is already registered")]
    AlreadyRegistered(AccountId),

    /// Caller or referenced participant has no account
    #[error("account {0} is not registered")]
    NotRegistered(AccountId),

    /// Referrer is unknown or is the signer itself
    #[error("referrer {0} is not registered")]
    UnknownReferrer(AccountId),

    /// Zero, negative, or finer than the token precision
    #[error("invalid amount {0}")]
    InvalidAmount(Amount),

    /// Ledger balance below the requested debit
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    /// Admin fee balance below the requested withdrawal
    #[error("insufficient treasury: available {available}, requested {requested}")]
    InsufficientTreasury { available: Amount, requested: Amount },

    /// Referral-backed loan larger than the accrued bonus
    #[error("credit limit exceeded: limit {limit}, requested {requested}")]
    CreditLimitExceeded { limit: Amount, requested: Amount },

    /// Guarantor is unregistered or is the borrower
    #[error("invalid guarantor {0}")]
    InvalidGuarantor(AccountId),

    #[error("guarantor-backed loans need at least one guarantor")]
    NoGuarantors,

    #[error("guarantor {0} listed more than once")]
    DuplicateGuarantor(AccountId),

    /// Guarantor's free balance does not cover its share of the principal
    #[error("guarantor {guarantor} has {free} free, pledge requires {pledge}")]
    GuarantorUnderfunded {
        guarantor: AccountId,
        free: Amount,
        pledge: Amount,
    },

    /// Zero duration, or a deadline past the clock's range
    #[error("loan duration must be positive")]
    InvalidDuration,

    /// Withdrawal would dip into funds reserved as guarantor pledges
    #[error("funds pledged: {reserved} reserved, only {free} withdrawable")]
    FundsPledged { reserved: Amount, free: Amount },

    /// Lending pool cannot cover a guarantor-backed disbursement
    #[error("lending pool holds {available}, loan requires {requested}")]
    InsufficientLiquidity { available: Amount, requested: Amount },

    /// Admin-only operation called by someone else
    #[error("caller {0} is not authorized")]
    Unauthorized(AccountId),

    #[error("unknown loan {0}")]
    UnknownLoan(LoanId),

    /// Loan already repaid or defaulted
    #[error("loan {0} is not open")]
    LoanNotOpen(LoanId),

    /// Default settlement attempted before the deadline
    #[error("loan {loan} is not due until {deadline}")]
    LoanNotDue { loan: LoanId, deadline: u64 },

    /// Repayment attempted at or after the deadline
    #[error("loan {loan} passed its deadline {deadline}")]
    DeadlinePassed { loan: LoanId, deadline: u64 },

    #[error("caller {caller} is not the borrower of loan {loan}")]
    NotBorrower { caller: AccountId, loan: LoanId },

    /// A ledger total would leave the representable range
    #[error("arithmetic overflow")]
    Overflow,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
