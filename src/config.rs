//! Engine configuration.
//!
//! Fixed at construction time. Can be built in code or loaded from
//! environment variables.

use crate::account::AccountId;
use crate::amount::Amount;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Highest token precision the engine accepts.
pub const MAX_DECIMALS: u32 = 18;

/// How much of each signup fee is credited to the referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralPolicy {
    /// A fixed bonus per referred signup.
    Fixed(Amount),

    /// A fraction of the signup fee, truncated to the token precision.
    FractionOfFee(Decimal),
}

impl ReferralPolicy {
    /// Bonus for one referred signup.
    pub fn bonus(&self, signup_fee: Amount, decimals: u32) -> Option<Amount> {
        match self {
            ReferralPolicy::Fixed(amount) => Some(*amount),
            ReferralPolicy::FractionOfFee(rate) => signup_fee.mul_truncated(*rate, decimals),
        }
    }
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        ReferralPolicy::FractionOfFee(Decimal::new(1, 1))
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identity allowed to withdraw from the treasury and fund the lending pool
    pub admin: AccountId,

    /// Fractional digits of the value token
    pub decimals: u32,

    /// Charged on every signup, paid into the treasury minus any referral bonus
    pub signup_fee: Amount,

    pub referral_policy: ReferralPolicy,

    /// Origination fee on guarantor-backed loans, as a fraction of principal
    pub loan_fee_rate: Decimal,
}

impl EngineConfig {
    pub fn new(admin: impl Into<AccountId>, decimals: u32, signup_fee: Amount) -> Self {
        EngineConfig {
            admin: admin.into(),
            decimals,
            signup_fee,
            referral_policy: ReferralPolicy::default(),
            loan_fee_rate: Decimal::ZERO,
        }
    }

    pub fn with_referral_policy(mut self, policy: ReferralPolicy) -> Self {
        self.referral_policy = policy;
        self
    }

    pub fn with_loan_fee_rate(mut self, rate: Decimal) -> Self {
        self.loan_fee_rate = rate;
        self
    }

    /// Load configuration from environment variables
    ///
    /// - `SAVINGS_ADMIN` (required)
    /// - `SAVINGS_DECIMALS` (default 6)
    /// - `SAVINGS_SIGNUP_FEE` (default 10)
    /// - `SAVINGS_REFERRAL_BONUS` (fixed bonus; default 10% of the fee)
    /// - `SAVINGS_LOAN_FEE_RATE` (default 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin = env::var("SAVINGS_ADMIN").map_err(|_| ConfigError::MissingEnv("SAVINGS_ADMIN"))?;

        let decimals = env::var("SAVINGS_DECIMALS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SAVINGS_DECIMALS"))?;

        let signup_fee = Amount::from_str(
            &env::var("SAVINGS_SIGNUP_FEE").unwrap_or_else(|_| "10".to_string()),
        )
        .map_err(|_| ConfigError::InvalidValue("SAVINGS_SIGNUP_FEE"))?;

        let referral_policy = match env::var("SAVINGS_REFERRAL_BONUS") {
            Ok(raw) => ReferralPolicy::Fixed(
                Amount::from_str(&raw)
                    .map_err(|_| ConfigError::InvalidValue("SAVINGS_REFERRAL_BONUS"))?,
            ),
            Err(_) => ReferralPolicy::default(),
        };

        let loan_fee_rate = Decimal::from_str(
            &env::var("SAVINGS_LOAN_FEE_RATE").unwrap_or_else(|_| "0".to_string()),
        )
        .map_err(|_| ConfigError::InvalidValue("SAVINGS_LOAN_FEE_RATE"))?;

        let config = EngineConfig {
            admin: AccountId::new(admin),
            decimals,
            signup_fee,
            referral_policy,
            loan_fee_rate,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings are mutually consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "decimals {} exceeds {}",
                self.decimals, MAX_DECIMALS
            )));
        }
        if self.signup_fee.is_negative() || !self.signup_fee.fits_precision(self.decimals) {
            return Err(ConfigError::Invalid(format!(
                "signup fee {} is not a valid amount at {} decimals",
                self.signup_fee, self.decimals
            )));
        }
        let bonus = self.referral_bonus().ok_or_else(|| {
            ConfigError::Invalid("referral bonus cannot be computed".to_string())
        })?;
        if bonus.is_negative() || !bonus.fits_precision(self.decimals) {
            return Err(ConfigError::Invalid(format!("invalid referral bonus {}", bonus)));
        }
        if bonus > self.signup_fee {
            return Err(ConfigError::Invalid(format!(
                "referral bonus {} exceeds signup fee {}",
                bonus, self.signup_fee
            )));
        }
        if self.loan_fee_rate.is_sign_negative() || self.loan_fee_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "loan fee rate {} outside [0, 1)",
                self.loan_fee_rate
            )));
        }
        Ok(())
    }

    /// Bonus credited to a referrer per signup.
    pub fn referral_bonus(&self) -> Option<Amount> {
        self.referral_policy.bonus(self.signup_fee, self.decimals)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
