//! Crowdsale engine: time-staged token sale with bonus pricing
//! Features:
//! - Schedule: NotStarted -> PrivatePresale -> PublicBonus -> PublicPlain -> Ended
//! - Pricing: tokens = payment * rate, plus a floored stage bonus percent
//! - Caps: single global cap, or a tighter presale tier under it
//! - Gating: optional KYC oracle, presale minimum deposit
//! - Settlement: forward funds, then issue from a pre-approved allowance; refund on failed issuance
//! - Concurrency: parking_lot RwLock + execute mutex around the cap check and update
//! - Events: tokio::broadcast
//! - Config: layered TOML + `CROWDSALE__*` env through the `config` crate
//! - Tests: in-memory ledger, wallet, KYC registry and a manual clock
//!
//! Notes:
//! - Amounts are 18-decimal smallest units in `u128`.
//! - The engine never holds value; collaborators do (see [`backend`]).

#![forbid(unsafe_code)]

pub mod backend;
pub mod caps;
pub mod config;
pub mod error;
pub mod pricing;
pub mod sale;
pub mod schedule;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod testkit;

pub use backend::{Clock, EligibilityOracle, FundsSink, SystemClock, TokenLedger};
pub use caps::CapConfig;
pub use config::{ConfigError, EventParams, SaleParams};
pub use error::{BackendError, SaleError};
pub use pricing::{PricingConfig, Quote};
pub use sale::{Crowdsale, CrowdsaleBuilder, PurchaseReceipt, SaleEvent, SaleState, Snapshot};
pub use schedule::{SaleSchedule, Stage};
pub use types::{Address, Balance, Timestamp, TOKEN_DECIMALS, UNIT};
