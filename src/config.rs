//! Environment-driven configuration for the `parkd` binary.

use std::path::PathBuf;
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "PARKD_DATA_DIR";
pub const METRICS_PORT_ENV: &str = "PARKD_METRICS_PORT";
pub const IDEMPOTENCY_TTL_HOURS_ENV: &str = "PARKD_IDEMPOTENCY_TTL_HOURS";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "PARKD_SWEEP_INTERVAL_SECS";
pub const COMPACT_THRESHOLD_ENV: &str = "PARKD_COMPACT_THRESHOLD";
pub const LOG_ENV: &str = "PARKD_LOG";

const DEFAULT_TTL_HOURS: u64 = 24;
const MIN_TTL_HOURS: u64 = 1;
const MAX_TTL_HOURS: u64 = 24 * 365 * 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

/// Variable lookup, so tests need not mutate the process environment.
pub trait Env {
    fn var(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Idempotency records older than this are purged.
    pub idempotency_ttl: Duration,
    pub sweep_interval: Duration,
    /// Compact the WAL once this many appends accumulate.
    pub compact_threshold: u64,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            idempotency_ttl: Duration::from_secs(DEFAULT_TTL_HOURS * 3600),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(&ProcessEnv)
    }

    /// Unset variables fall back to defaults; set-but-unparseable ones are
    /// errors. The TTL is clamped to 1 hour ..= 10 years and the sweep
    /// interval to at least one second.
    pub fn from_env_with(env: &impl Env) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let ttl_hours = parse::<u64>(env, IDEMPOTENCY_TTL_HOURS_ENV)?
            .unwrap_or(DEFAULT_TTL_HOURS)
            .clamp(MIN_TTL_HOURS, MAX_TTL_HOURS);
        let sweep_secs = parse::<u64>(env, SWEEP_INTERVAL_SECS_ENV)?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
            .max(1);

        Ok(Self {
            data_dir: env.var(DATA_DIR_ENV).map_or(defaults.data_dir, PathBuf::from),
            metrics_port: parse(env, METRICS_PORT_ENV)?,
            idempotency_ttl: Duration::from_secs(ttl_hours.saturating_mul(3600)),
            sweep_interval: Duration::from_secs(sweep_secs),
            compact_threshold: parse(env, COMPACT_THRESHOLD_ENV)?
                .unwrap_or(defaults.compact_threshold),
            log_level: env.var(LOG_ENV).unwrap_or(defaults.log_level),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("parkd.wal")
    }
}

fn parse<T: std::str::FromStr>(env: &impl Env, name: &'static str) -> Result<Option<T>, ConfigError> {
    match env.var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { name, value }),
    }
}
