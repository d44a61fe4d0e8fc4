//! Collaborator capabilities the sale engine consumes.
//!
//! The engine never moves value itself: payments go through a `FundsSink`,
//! tokens come out of a `TokenLedger`, identities are vetted by an
//! `EligibilityOracle`, and time comes from a `Clock`. All calls are
//! synchronous and expected to complete or fail immediately.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::BackendError;
use crate::types::{Address, Balance, Timestamp};

/// Token ledger that has pre-authorized this engine to issue tokens.
pub trait TokenLedger: Send + Sync + 'static {
    /// Token contract identity.
    fn address(&self) -> Address;

    /// Fractional digits of the token; must match the payment unit.
    fn decimals(&self) -> u8;

    /// Remaining amount this engine may still issue.
    fn allowance(&self) -> Balance;

    /// Credit `amount` to `beneficiary`, consuming allowance.
    fn issue(&self, beneficiary: Address, amount: Balance) -> Result<(), BackendError>;
}

/// Destination wallet for raised funds.
pub trait FundsSink: Send + Sync + 'static {
    fn address(&self) -> Address;

    /// Move `amount` paid by `payer` into the wallet.
    fn forward(&self, payer: Address, amount: Balance) -> Result<(), BackendError>;

    /// Reverse a forward. Only used to roll back a purchase whose issuance failed.
    fn refund(&self, payer: Address, amount: Balance) -> Result<(), BackendError>;
}

/// KYC / allowlist check.
pub trait EligibilityOracle: Send + Sync + 'static {
    fn address(&self) -> Address;

    fn is_eligible(&self, who: Address) -> bool;
}

/// Monotonic source of unix seconds.
pub trait Clock: Send + Sync + 'static {
    fn now_unix(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
