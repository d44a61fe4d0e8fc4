//! Pricing: payment -> base tokens + stage bonus.
//!
//! `base = payment * rate`, `bonus = floor(base * percent / 100)`.
//! Rounding is always toward zero on the bonus; the base is exact.

use serde::{Deserialize, Serialize};

use crate::config::amount;
use crate::error::SaleError;
use crate::schedule::Stage;
use crate::types::Balance;

/// Percent denominator (100% == 100).
pub const PERCENT_DENOM: u128 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Token units issued per payment unit.
    #[serde(with = "amount")]
    pub rate: Balance,
    /// Bonus during the private presale, in `(0, 100]`.
    pub presale_bonus_percent: u8,
    /// Bonus during the public bonus stage, in `(0, 100]`.
    pub sale_bonus_percent: u8,
    /// Smallest accepted presale payment. Public stages ignore it.
    #[serde(with = "amount")]
    pub minimum_deposit: Balance,
}

/// Token amount broken down into base and bonus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quote {
    pub base: Balance,
    pub bonus: Balance,
    pub total: Balance,
}

impl PricingConfig {
    pub fn validate(&self) -> Result<(), SaleError> {
        if self.rate == 0 {
            return Err(SaleError::invalid("rate must be > 0"));
        }
        if self.presale_bonus_percent == 0 || self.presale_bonus_percent > 100 {
            return Err(SaleError::invalid("presale_bonus_percent must be in (0, 100]"));
        }
        if self.sale_bonus_percent == 0 || self.sale_bonus_percent > 100 {
            return Err(SaleError::invalid("sale_bonus_percent must be in (0, 100]"));
        }
        if self.minimum_deposit == 0 {
            return Err(SaleError::invalid("minimum_deposit must be > 0"));
        }
        Ok(())
    }

    /// Bonus percent applied in `stage`; `None` outside the open window.
    pub fn bonus_percent(&self, stage: Stage) -> Option<u8> {
        match stage {
            Stage::PrivatePresale => Some(self.presale_bonus_percent),
            Stage::PublicBonus => Some(self.sale_bonus_percent),
            Stage::PublicPlain => Some(0),
            Stage::NotStarted | Stage::Ended => None,
        }
    }

    pub fn quote(&self, payment: Balance, stage: Stage) -> Result<Quote, SaleError> {
        let percent = self.bonus_percent(stage).ok_or(SaleError::SaleNotOpen(stage))?;
        let base = payment.checked_mul(self.rate).ok_or(SaleError::MathOverflow)?;
        let bonus = mul_div_floor(base, percent as u128, PERCENT_DENOM).ok_or(SaleError::MathOverflow)?;
        let total = base.checked_add(bonus).ok_or(SaleError::MathOverflow)?;
        Ok(Quote { base, bonus, total })
    }

    pub fn quote_tokens(&self, payment: Balance, stage: Stage) -> Result<Balance, SaleError> {
        self.quote(payment, stage).map(|q| q.total)
    }
}

/// (a * b) / d, floored; `None` on overflow or d == 0.
fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b)?.checked_div(d)
}
