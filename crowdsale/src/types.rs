//! Primitives shared by every part of the sale engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 20-byte account identity (payer, beneficiary, collaborator contracts).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The null identity. Never a valid beneficiary or collaborator.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Smallest-unit amount, used for both payments and tokens.
pub type Balance = u128;

/// Seconds since Unix epoch.
pub type Timestamp = u64;

/// Fractional digits shared by the payment unit and the sold token.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole payment unit (or token) in smallest units.
pub const UNIT: Balance = 1_000_000_000_000_000_000;
