//! Application configuration loaded from environment variables.

use std::str::FromStr;

use checkout::{LedgerConfig, SweeperConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address of `/health` and `/metrics` (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `RESERVATION_TTL_SECS`, `CONFIRMED_RESERVATION_TTL_SECS`: reservation TTLs, `0` disables
/// - `SWEEP_INTERVAL_SECS`, `RECONCILE_INTERVAL_SECS`, `RECONCILE_REPAIR`: sweeper schedule
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub ledger: LedgerConfig,
    pub sweeper: SweeperConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unparseable values fall back to
    /// the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let ledger_defaults = (900, 3600);
        let sweeper_defaults = (30, 300);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT", defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            ledger: LedgerConfig::from_secs(
                parsed(&lookup, "RESERVATION_TTL_SECS", ledger_defaults.0),
                parsed(&lookup, "CONFIRMED_RESERVATION_TTL_SECS", ledger_defaults.1),
            ),
            sweeper: SweeperConfig::from_secs(
                parsed(&lookup, "SWEEP_INTERVAL_SECS", sweeper_defaults.0),
                parsed(&lookup, "RECONCILE_INTERVAL_SECS", sweeper_defaults.1),
                parsed(&lookup, "RECONCILE_REPAIR", false),
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            ledger: LedgerConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            default
        }),
        None => default,
    }
}
