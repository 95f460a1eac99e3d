// src/config.rs

//! Manages service configuration: environment resolution, the map roster
//! file, and startup validation.

use crate::core::map::MapRecord;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use tracing::{info, warn};

/// The runtime environment the service was booted in. Dev and test relax
/// the license requirements (see `LicenseConfig::validate`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Dev,
    Test,
    #[default]
    Prod,
}

impl AppEnv {
    pub fn is_dev_or_test(self) -> bool {
        matches!(self, AppEnv::Dev | AppEnv::Test)
    }
}

/// Parses the accepted boolean spellings: `true|1|yes|on` / `false|0|no|off`.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(anyhow!("invalid boolean value '{other}'")),
    }
}

/// Parses a millisecond duration that may also be the literal `infinity`.
/// `None` means unbounded.
fn parse_ms_or_infinity(value: &str) -> Result<Option<u64>> {
    if value.trim().eq_ignore_ascii_case("infinity") {
        return Ok(None);
    }
    let ms = value
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow!("invalid millisecond value '{value}'"))?;
    Ok(Some(ms))
}

/// Reads an environment variable through a parser, falling back to a default
/// when the variable is unset. A set-but-invalid value is a hard error.
fn env_parsed<T>(name: &str, default: T, parse: impl Fn(&str) -> Result<T>) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse(&raw).with_context(|| format!("invalid value for {name}")),
        Err(_) => Ok(default),
    }
}

/// Configuration for the SSE ingestion pipeline.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SseConfig {
    /// Receive timeout in milliseconds; `None` means the stream is never
    /// idle-closed from our side.
    pub recv_timeout_ms: Option<u64>,
    pub connect_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            recv_timeout_ms: None,
            connect_timeout_ms: 30_000,
            keepalive_interval_secs: 30,
        }
    }
}

/// Configuration for the license validator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LicenseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_api_key: Option<String>,
    pub manager_api_url: String,
    pub refresh_interval_ms: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            license_key: None,
            manager_api_key: None,
            manager_api_url: default_license_manager_url(),
            refresh_interval_ms: 3_600_000,
        }
    }
}

fn default_license_manager_url() -> String {
    "https://lm.wanderer.ltd/api".to_string()
}

impl LicenseConfig {
    /// Both credentials are mandatory outside dev/test.
    fn validate(&self, env: AppEnv) -> Result<()> {
        if env.is_dev_or_test() {
            return Ok(());
        }
        if self.license_key.as_deref().unwrap_or("").is_empty() {
            return Err(anyhow!("LICENSE_KEY is required"));
        }
        if self.manager_api_key.as_deref().unwrap_or("").is_empty() {
            return Err(anyhow!("LICENSE_MANAGER_API_KEY is required"));
        }
        Ok(())
    }
}

/// Configuration for the shared namespaced cache.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Soft key-count limit driving the eviction thresholds.
    #[serde(default = "default_cache_max_keys")]
    pub max_keys: usize,
}

fn default_cache_max_keys() -> usize {
    100_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_keys: default_cache_max_keys(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9568
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

/// The roster file shape: the stand-in for the external map CRUD facade.
#[derive(Deserialize, Debug, Default)]
struct RosterFile {
    #[serde(default)]
    maps: Vec<MapRecord>,
}

/// Represents the final, validated service configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub env: AppEnv,
    pub sse: SseConfig,
    pub license: LicenseConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
    /// Interval between scheduled topology passes, in milliseconds.
    pub topology_interval_ms: u64,
    /// Interval between full REST refreshes of each map's raw view.
    pub map_refresh_interval_ms: u64,
    pub notifications_enabled: bool,
    pub telemetry_logging_enabled: bool,
    /// The map roster served through the `MapStore` facade.
    pub maps: Vec<MapRecord>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            log_level: "info".to_string(),
            env: AppEnv::default(),
            sse: SseConfig::default(),
            license: LicenseConfig::default(),
            cache: CacheConfig::default(),
            metrics: MetricsConfig::default(),
            topology_interval_ms: 60_000,
            map_refresh_interval_ms: 30 * 60 * 1000,
            notifications_enabled: true,
            telemetry_logging_enabled: false,
            maps: Vec::new(),
        }
    }
}

impl Config {
    /// Assembles the configuration from the environment, overlaying the map
    /// roster from `roster_path` when one is given, and validates the result.
    pub fn load(roster_path: Option<&str>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = roster_path {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read roster file '{path}'"))?;
            let roster: RosterFile = toml::from_str(&contents)
                .with_context(|| format!("failed to parse roster file '{path}'"))?;
            config.maps = roster.maps;
            info!("Loaded {} map(s) from '{}'.", config.maps.len(), path);
        } else {
            warn!("No roster file given; starting with an empty map roster.");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads the enumerated environment variables, applying documented
    /// defaults for everything that is unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let env_kind = env_parsed("APP_ENV", AppEnv::Prod, |v| {
            match v.trim().to_ascii_lowercase().as_str() {
                "dev" => Ok(AppEnv::Dev),
                "test" => Ok(AppEnv::Test),
                "prod" => Ok(AppEnv::Prod),
                other => Err(anyhow!("unknown environment '{other}'")),
            }
        })?;

        let sse = SseConfig {
            recv_timeout_ms: match env::var("SSE_RECV_TIMEOUT") {
                Ok(raw) => parse_ms_or_infinity(&raw).context("invalid SSE_RECV_TIMEOUT")?,
                Err(_) => None,
            },
            connect_timeout_ms: env_parsed("SSE_CONNECT_TIMEOUT", 30_000, |v| {
                v.parse::<u64>().map_err(|e| anyhow!(e))
            })?,
            keepalive_interval_secs: env_parsed("SSE_KEEPALIVE_INTERVAL", 30, |v| {
                v.parse::<u64>().map_err(|e| anyhow!(e))
            })?,
        };

        let license = LicenseConfig {
            license_key: env::var("LICENSE_KEY").ok().filter(|v| !v.is_empty()),
            manager_api_key: env::var("LICENSE_MANAGER_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            manager_api_url: env::var("LICENSE_MANAGER_API_URL")
                .unwrap_or_else(|_| default_license_manager_url()),
            refresh_interval_ms: env_parsed("LICENSE_REFRESH_INTERVAL", 3_600_000, |v| {
                v.parse::<u64>().map_err(|e| anyhow!(e))
            })?,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env_parsed("PORT", defaults.port, |v| {
                v.parse::<u16>().map_err(|e| anyhow!(e))
            })?,
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            env: env_kind,
            sse,
            license,
            cache: defaults.cache,
            metrics: defaults.metrics,
            topology_interval_ms: defaults.topology_interval_ms,
            map_refresh_interval_ms: defaults.map_refresh_interval_ms,
            notifications_enabled: env_parsed("NOTIFICATIONS_ENABLED", true, parse_bool)?,
            telemetry_logging_enabled: env_parsed("TELEMETRY_LOGGING_ENABLED", false, parse_bool)?,
            maps: Vec::new(),
        })
    }

    /// Startup validation. Violations abort the boot.
    pub fn validate(&self) -> Result<()> {
        self.license.validate(self.env)?;

        let main_count = self.maps.iter().filter(|m| m.is_main).count();
        if !self.maps.is_empty() && main_count != 1 {
            return Err(anyhow!(
                "exactly one map must be marked is_main (found {main_count})"
            ));
        }

        for map in &self.maps {
            url::Url::parse(&map.url)
                .map_err(|e| anyhow!("map '{}' has a malformed url: {e}", map.id))?;
        }

        Ok(())
    }
}
