//! Logging bootstrap for hosts embedding the sale engine.
//!
//! The engine emits `tracing` events under target `crowdsale`: accepted
//! purchases at info, rejections at debug, rollbacks at warn and error.
//! Nothing is installed until the host calls [`init`].
//!
//! Host knobs (all optional):
//!   CROWDSALE_LOG         filter directive, falls back to RUST_LOG, then [`DEFAULT_DIRECTIVE`]
//!   CROWDSALE_LOG_FORMAT  "json" | "text"
//!   CROWDSALE_LOG_ANSI    colors for text output
//!   CROWDSALE_LOG_SOURCE  file and line on every event

use std::env;
use std::str::FromStr;

use anyhow::{bail, Context};
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Purchases visible, dependency chatter quiet.
pub const DEFAULT_DIRECTIVE: &str = "warn,crowdsale=info";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => bail!("unknown log format `{other}` (expected json or text)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub directive: String,
    pub format: LogFormat,
    pub ansi: bool,
    pub with_source: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_owned(),
            format: LogFormat::Json,
            ansi: false,
            with_source: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(d) = get("CROWDSALE_LOG").or_else(|| get("RUST_LOG")) {
            cfg.directive = d;
        }
        if let Some(f) = get("CROWDSALE_LOG_FORMAT") {
            cfg.format = f.parse()?;
        }
        if let Some(v) = get("CROWDSALE_LOG_ANSI") {
            cfg.ansi = parse_flag("CROWDSALE_LOG_ANSI", &v)?;
        }
        if let Some(v) = get("CROWDSALE_LOG_SOURCE") {
            cfg.with_source = parse_flag("CROWDSALE_LOG_SOURCE", &v)?;
        }
        Ok(cfg)
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        EnvFilter::try_new(&self.directive)
            .with_context(|| format!("invalid log directive `{}`", self.directive))
    }
}

fn parse_flag(key: &str, v: &str) -> anyhow::Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key}: expected a boolean, got `{v}`"),
    }
}

/// Install the global subscriber and the `log` bridge.
/// Fails if either is already installed.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = cfg.filter()?;

    let fmt_layer = match cfg.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_file(cfg.with_source)
            .with_line_number(cfg.with_source)
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_file(cfg.with_source)
            .with_line_number(cfg.with_source)
            .with_ansi(cfg.ansi)
            .boxed(),
    };

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("global tracing subscriber already installed")?;
    tracing_log::LogTracer::init().context("`log` bridge already installed")?;
    Ok(())
}
