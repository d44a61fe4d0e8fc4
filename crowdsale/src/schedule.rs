//! Schedule resolution: wall-clock time -> sale stage.
//!
//! Timeline (half-open, a boundary belongs to the stage starting at it):
//!
//! ```text
//!   NotStarted | PrivatePresale | PublicBonus | PublicPlain | Ended
//!              ^presale_start   ^bonus_sale   ^plain_sale   ^sale_end
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SaleError;
use crate::types::{Balance, Timestamp};

/// Sale stage derived from current time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    NotStarted,
    PrivatePresale,
    PublicBonus,
    PublicPlain,
    Ended,
}

impl Stage {
    /// Purchases are only accepted in the three middle stages.
    pub fn is_open(self) -> bool {
        matches!(self, Stage::PrivatePresale | Stage::PublicBonus | Stage::PublicPlain)
    }

    pub fn is_private_presale(self) -> bool {
        self == Stage::PrivatePresale
    }

    pub fn is_public_bonus(self) -> bool {
        self == Stage::PublicBonus
    }

    pub fn is_public_plain(self) -> bool {
        self == Stage::PublicPlain
    }
}

/// Stage boundaries, unix seconds. Immutable once the sale is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSchedule {
    pub presale_start: Timestamp,
    pub bonus_sale_start: Timestamp,
    pub plain_sale_start: Timestamp,
    pub sale_end: Timestamp,
}

impl SaleSchedule {
    pub fn new(
        presale_start: Timestamp,
        bonus_sale_start: Timestamp,
        plain_sale_start: Timestamp,
        sale_end: Timestamp,
    ) -> Self {
        Self { presale_start, bonus_sale_start, plain_sale_start, sale_end }
    }

    /// Checks strict ordering and that the presale opens after `now`.
    pub fn validate(&self, now: Timestamp) -> Result<(), SaleError> {
        if self.presale_start <= now {
            return Err(SaleError::invalid("presale_start must be in the future"));
        }
        if self.bonus_sale_start <= self.presale_start {
            return Err(SaleError::invalid("bonus_sale_start <= presale_start"));
        }
        if self.plain_sale_start <= self.bonus_sale_start {
            return Err(SaleError::invalid("plain_sale_start <= bonus_sale_start"));
        }
        if self.sale_end <= self.plain_sale_start {
            return Err(SaleError::invalid("sale_end <= plain_sale_start"));
        }
        Ok(())
    }

    pub fn stage_at(&self, t: Timestamp) -> Stage {
        if t < self.presale_start {
            Stage::NotStarted
        } else if t < self.bonus_sale_start {
            Stage::PrivatePresale
        } else if t < self.plain_sale_start {
            Stage::PublicBonus
        } else if t < self.sale_end {
            Stage::PublicPlain
        } else {
            Stage::Ended
        }
    }

    /// End by time or end by cap; either alone is terminal.
    pub fn is_ended(&self, t: Timestamp, tokens_sold: Balance, global_cap: Balance) -> bool {
        t >= self.sale_end || tokens_sold >= global_cap
    }
}
