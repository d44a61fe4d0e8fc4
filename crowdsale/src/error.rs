use thiserror::Error;

use crate::schedule::Stage;

/// Failures reported by a collaborator (ledger, funds sink, oracle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance")]
    Insufficient,
    #[error("transfer rejected: {0}")]
    Rejected(String),
    #[error("backend failure: {0}")]
    Other(String),
}

/// Every way a construction or a purchase can fail.
///
/// `InvalidConfig` is fatal and only produced while building the engine.
/// Everything else is a recoverable rejection: no funds moved, no tokens
/// issued, `tokens_sold` untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("sale not open (stage {0:?})")]
    SaleNotOpen(Stage),
    #[error("invalid beneficiary")]
    InvalidBeneficiary,
    #[error("payment must be > 0")]
    ZeroPayment,
    #[error("payer or beneficiary not eligible")]
    NotEligible,
    #[error("payment below presale minimum deposit")]
    BelowMinimumDeposit,
    #[error("cap exceeded")]
    CapExceeded,
    #[error("insufficient issuance allowance")]
    InsufficientAllowance,
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

impl SaleError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SaleError::InvalidConfig(msg.into())
    }
}
