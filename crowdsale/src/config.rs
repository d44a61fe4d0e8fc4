//! Sale parameters: serde model + layered loader.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults (event channel capacity only)
//!   2) TOML file or string
//!   3) Environment variables, `CROWDSALE__SECTION__FIELD`
//!
//! Amounts are u128 in smallest units. TOML integers stop at i64, so amounts
//! may be written as decimal strings: `global_cap = "250000001000000000000000000"`.

use std::path::Path;

use ::config as cfg;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caps::CapConfig;
use crate::error::SaleError;
use crate::pricing::PricingConfig;
use crate::schedule::SaleSchedule;
use crate::types::Timestamp;

/// Default broadcast channel capacity for purchase events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Everything needed to build a sale, minus the collaborators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    pub schedule: SaleSchedule,
    pub pricing: PricingConfig,
    pub caps: CapConfig,
    #[serde(default)]
    pub events: EventParams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventParams {
    /// Broadcast buffer; slow subscribers lag past this many events.
    pub capacity: usize,
}

impl Default for EventParams {
    fn default() -> Self {
        Self { capacity: DEFAULT_EVENT_CAPACITY }
    }
}

impl SaleParams {
    /// Same checks the builder runs, minus collaborator checks.
    pub fn validate(&self, now: Timestamp) -> Result<(), SaleError> {
        self.schedule.validate(now)?;
        self.pricing.validate()?;
        self.caps.validate()?;
        if self.events.capacity == 0 {
            return Err(SaleError::invalid("events.capacity must be > 0"));
        }
        Ok(())
    }

    /// Parse from a TOML document, then apply environment overrides.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        build(cfg::File::from_str(doc, cfg::FileFormat::Toml))
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::PathNotFound(path.display().to_string()));
        }
        build(cfg::File::from(path).format(cfg::FileFormat::Toml))
    }
}

/// Errors during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("path not found `{0}`")]
    PathNotFound(String),
}

fn build<S>(source: S) -> Result<SaleParams, ConfigError>
where
    S: cfg::Source + Send + Sync + 'static,
{
    // No try_parsing: 18-decimal amounts must stay strings, not become floats.
    let built = cfg::Config::builder()
        .set_default("events.capacity", DEFAULT_EVENT_CAPACITY as u64)?
        .add_source(source)
        .add_source(cfg::Environment::with_prefix("CROWDSALE").prefix_separator("__").separator("__"))
        .build()?;
    Ok(built.try_deserialize()?)
}

/// Serde adapter for u128 amounts: accepts decimal strings or integers,
/// writes decimal strings.
pub mod amount {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use crate::types::Balance;

    pub fn serialize<S: Serializer>(v: &Balance, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Balance, D::Error> {
        d.deserialize_any(AmountVisitor)
    }

    pub(crate) struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Balance;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Balance, E> {
            Ok(v as Balance)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Balance, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Balance, E> {
            u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<Balance, E> {
            u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Balance, E> {
            let digits: String = v.trim().chars().filter(|c| *c != '_').collect();
            digits
                .parse::<Balance>()
                .map_err(|_| E::custom(format!("invalid amount `{v}`")))
        }
    }
}

/// Same as [`amount`] for optional fields.
pub mod opt_amount {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use super::amount::AmountVisitor;
    use crate::types::Balance;

    pub fn serialize<S: Serializer>(v: &Option<Balance>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Balance>, D::Error> {
        d.deserialize_option(OptVisitor)
    }

    struct OptVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<Balance>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional amount")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(AmountVisitor).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNIT;
    use parking_lot::{const_mutex, Mutex, MutexGuard};

    // Loader tests read the process environment; serialize them against the override test.
    static ENV_LOCK: Mutex<()> = const_mutex(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock()
    }

    /// Sets variables for the life of the guard, removes them on drop.
    struct EnvVars(Vec<&'static str>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
            Self(vars.iter().map(|(k, _)| *k).collect())
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for k in &self.0 {
                std::env::remove_var(k);
            }
        }
    }

    const DOC: &str = r#"
        [schedule]
        presale_start = 1000
        bonus_sale_start = 2000
        plain_sale_start = 3000
        sale_end = 4000

        [pricing]
        rate = 10000
        presale_bonus_percent = 10
        sale_bonus_percent = 5
        minimum_deposit = "1_000_000_000_000_000_000"

        [caps]
        global_cap = "250000001000000000000000000"
        presale_cap = "195000001000000000000000000"
    "#;

    #[test]
    fn parses_full_document_with_string_amounts() {
        let _env = env_guard();
        let p = SaleParams::from_toml_str(DOC).unwrap();
        assert_eq!(p.schedule, SaleSchedule::new(1000, 2000, 3000, 4000));
        assert_eq!(p.pricing.rate, 10_000);
        assert_eq!(p.pricing.minimum_deposit, UNIT);
        assert_eq!(p.caps.global_cap, 250_000_001 * UNIT);
        assert_eq!(p.caps.presale_cap, Some(195_000_001 * UNIT));
        assert_eq!(p.events.capacity, DEFAULT_EVENT_CAPACITY);
        assert!(p.validate(999).is_ok());
    }

    #[test]
    fn presale_cap_is_optional() {
        let _env = env_guard();
        let doc = DOC.replace("presale_cap = \"195000001000000000000000000\"", "");
        let p = SaleParams::from_toml_str(&doc).unwrap();
        assert_eq!(p.caps.presale_cap, None);
    }

    #[test]
    fn validate_catches_each_section() {
        let _env = env_guard();
        let p = SaleParams::from_toml_str(DOC).unwrap();
        // presale already started
        assert!(matches!(p.validate(1000), Err(SaleError::InvalidConfig(_))));

        let mut bad = p.clone();
        bad.pricing.sale_bonus_percent = 0;
        assert!(bad.validate(0).is_err());

        let mut bad = p.clone();
        bad.caps.presale_cap = Some(bad.caps.global_cap + 1);
        assert!(bad.validate(0).is_err());

        let mut bad = p;
        bad.events.capacity = 0;
        assert!(bad.validate(0).is_err());
    }

    #[test]
    fn malformed_amount_is_rejected() {
        let _env = env_guard();
        let doc = DOC.replace("rate = 10000", "rate = \"ten thousand\"");
        assert!(matches!(SaleParams::from_toml_str(&doc), Err(ConfigError::Build(_))));
    }

    #[test]
    fn environment_overrides_file_values() {
        let _env = env_guard();
        let _vars = EnvVars::set(&[
            ("CROWDSALE__CAPS__GLOBAL_CAP", "300000000000000000000000000"),
            ("CROWDSALE__PRICING__RATE", "20000"),
        ]);

        let p = SaleParams::from_toml_str(DOC).unwrap();
        assert_eq!(p.caps.global_cap, 300_000_000 * UNIT);
        assert_eq!(p.pricing.rate, 20_000);
        // untouched keys keep the file value
        assert_eq!(p.caps.presale_cap, Some(195_000_001 * UNIT));
        assert_eq!(p.pricing.minimum_deposit, UNIT);
        assert!(p.validate(999).is_ok());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = SaleParams::load(Path::new("/definitely/not/here/crowdsale.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::PathNotFound(_)));
    }
}
