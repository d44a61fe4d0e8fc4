//! Cap enforcement on cumulative issuance.
//!
//! Single tier: `global_cap` in every stage.
//! Two tiers: `presale_cap` during the private presale, `global_cap` after.
//! Landing exactly on a cap is allowed; only exceeding it is rejected.

use serde::{Deserialize, Serialize};

use crate::config::{amount, opt_amount};
use crate::error::SaleError;
use crate::schedule::Stage;
use crate::types::Balance;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapConfig {
    /// Total issuable across the whole sale.
    #[serde(with = "amount")]
    pub global_cap: Balance,
    /// Tighter bound during the private presale; `None` for single tier.
    #[serde(default, with = "opt_amount")]
    pub presale_cap: Option<Balance>,
}

impl CapConfig {
    pub fn single(global_cap: Balance) -> Self {
        Self { global_cap, presale_cap: None }
    }

    pub fn tiered(presale_cap: Balance, global_cap: Balance) -> Self {
        Self { global_cap, presale_cap: Some(presale_cap) }
    }

    pub fn validate(&self) -> Result<(), SaleError> {
        if self.global_cap == 0 {
            return Err(SaleError::invalid("global_cap must be > 0"));
        }
        if let Some(pc) = self.presale_cap {
            if pc == 0 {
                return Err(SaleError::invalid("presale_cap must be > 0"));
            }
            if pc > self.global_cap {
                return Err(SaleError::invalid("presale_cap > global_cap"));
            }
        }
        Ok(())
    }

    /// Cap in force during `stage`.
    pub fn cap_for(&self, stage: Stage) -> Balance {
        match (stage, self.presale_cap) {
            (Stage::PrivatePresale, Some(pc)) => pc,
            _ => self.global_cap,
        }
    }

    pub fn admit(&self, proposed_total: Balance, stage: Stage) -> Result<(), SaleError> {
        if proposed_total > self.cap_for(stage) {
            return Err(SaleError::CapExceeded);
        }
        Ok(())
    }

    /// Headroom left in `stage` given what has been sold so far.
    pub fn remaining(&self, stage: Stage, sold: Balance) -> Balance {
        self.cap_for(stage).saturating_sub(sold)
    }
}
