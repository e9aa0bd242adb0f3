//! API Configuration Module
//!
//! Server, cache and admin settings loaded from environment variables with
//! defaults suitable for development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use brokerlist_cache::{CacheConfig, DEFAULT_CAPACITY, DEFAULT_TTL, LONG_TTL, SHORT_TTL};
use brokerlist_core::ConfigError;
use brokerlist_ranking::DEFAULT_WEIGHTS_REFRESH;
use secrecy::SecretString;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DURABLE_MAX_MB: usize = 64;
pub const DEFAULT_WARMUP_CATEGORIES: &[&str] = &["ecn-brokers", "mt4-brokers"];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                field: "BROKERLIST_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected 'pretty' or 'json'".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,

    /// Shared secret for `POST /api/revalidate`. `None` rejects every admin call.
    pub revalidate_token: Option<SecretString>,

    // ========================================================================
    // Cache Configuration
    // ========================================================================
    pub cache_capacity: usize,
    pub cache_default_ttl: Duration,
    pub cache_short_ttl: Duration,
    pub cache_long_ttl: Duration,
    /// LMDB directory for the durable tier. `None` runs memory-only.
    pub durable_path: Option<PathBuf>,
    pub durable_max_mb: usize,

    pub weights_refresh: Duration,
    pub warmup_categories: Vec<String>,
    /// JSON seed for the in-memory broker and weight stores.
    pub seed_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            revalidate_token: None,
            cache_capacity: DEFAULT_CAPACITY,
            cache_default_ttl: DEFAULT_TTL,
            cache_short_ttl: SHORT_TTL,
            cache_long_ttl: LONG_TTL,
            durable_path: None,
            durable_max_mb: DEFAULT_DURABLE_MAX_MB,
            weights_refresh: DEFAULT_WEIGHTS_REFRESH,
            warmup_categories: DEFAULT_WARMUP_CATEGORIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed_path: None,
            log_format: LogFormat::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `BROKERLIST_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `BROKERLIST_API_PORT`: Port (default: 3000)
    /// - `CACHE_REVALIDATE_TOKEN`: Admin secret (unset = admin disabled)
    /// - `BROKERLIST_CACHE_CAPACITY`: LRU capacity (default: 1000)
    /// - `BROKERLIST_CACHE_DEFAULT_TTL_SECS`, `BROKERLIST_CACHE_SHORT_TTL_SECS`,
    ///   `BROKERLIST_CACHE_LONG_TTL_SECS`: TTL tiers
    /// - `BROKERLIST_DURABLE_PATH`: LMDB directory (unset = no durable tier)
    /// - `BROKERLIST_DURABLE_MAX_MB`: LMDB map size (default: 64)
    /// - `BROKERLIST_WEIGHTS_REFRESH_SECS`: Weight reload interval (default: 300)
    /// - `BROKERLIST_WARMUP_CATEGORIES`: Comma-separated category slugs
    /// - `BROKERLIST_SEED_PATH`: JSON seed file for the stores
    /// - `BROKERLIST_LOG_FORMAT`: "pretty" or "json"
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or empty values take the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get("BROKERLIST_API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let warmup_categories = get("BROKERLIST_WARMUP_CATEGORIES")
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.warmup_categories);

        Ok(Self {
            bind: get("BROKERLIST_API_BIND").unwrap_or(defaults.bind),
            port,
            revalidate_token: get("CACHE_REVALIDATE_TOKEN").map(SecretString::from),
            cache_capacity: parse_or(&get, "BROKERLIST_CACHE_CAPACITY", defaults.cache_capacity)?,
            cache_default_ttl: secs_or(&get, "BROKERLIST_CACHE_DEFAULT_TTL_SECS", defaults.cache_default_ttl)?,
            cache_short_ttl: secs_or(&get, "BROKERLIST_CACHE_SHORT_TTL_SECS", defaults.cache_short_ttl)?,
            cache_long_ttl: secs_or(&get, "BROKERLIST_CACHE_LONG_TTL_SECS", defaults.cache_long_ttl)?,
            durable_path: get("BROKERLIST_DURABLE_PATH").map(PathBuf::from),
            durable_max_mb: parse_or(&get, "BROKERLIST_DURABLE_MAX_MB", defaults.durable_max_mb)?,
            weights_refresh: secs_or(&get, "BROKERLIST_WEIGHTS_REFRESH_SECS", defaults.weights_refresh)?,
            warmup_categories,
            seed_path: get("BROKERLIST_SEED_PATH").map(PathBuf::from),
            log_format: match get("BROKERLIST_LOG_FORMAT") {
                Some(raw) => raw.parse()?,
                None => defaults.log_format,
            },
        })
    }

    pub fn with_revalidate_token(mut self, token: impl Into<String>) -> Self {
        self.revalidate_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_warmup_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warmup_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_durable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.durable_path = Some(path.into());
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_weights_refresh(mut self, refresh: Duration) -> Self {
        self.weights_refresh = refresh;
        self
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_capacity(self.cache_capacity)
            .with_default_ttl(self.cache_default_ttl)
            .with_short_ttl(self.cache_short_ttl)
            .with_long_ttl(self.cache_long_ttl)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
            field: "BROKERLIST_API_BIND".to_string(),
            value: addr.clone(),
            reason: e.to_string(),
        })
    }
}

fn parse_value<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T, G>(get: &G, field: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(field) {
        Some(raw) => parse_value(field, &raw),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, field: &str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, field, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.cache_default_ttl, Duration::from_secs(86400));
        assert_eq!(config.weights_refresh, Duration::from_secs(300));
        assert_eq!(config.warmup_categories, vec!["ecn-brokers", "mt4-brokers"]);
        assert!(config.revalidate_token.is_none());
        assert!(config.durable_path.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("BROKERLIST_API_PORT", "8080"),
            ("CACHE_REVALIDATE_TOKEN", "s3cret"),
            ("BROKERLIST_CACHE_CAPACITY", "50"),
            ("BROKERLIST_WARMUP_CATEGORIES", "islamic-accounts, ,mt5-brokers"),
            ("BROKERLIST_LOG_FORMAT", "JSON"),
            ("BROKERLIST_DURABLE_PATH", "/var/lib/brokerlist"),
        ]))
        .expect("valid env");
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.revalidate_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("s3cret".to_string())
        );
        assert_eq!(config.cache_config().capacity, 50);
        assert_eq!(config.warmup_categories, vec!["islamic-accounts", "mt5-brokers"]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.durable_path, Some(PathBuf::from("/var/lib/brokerlist")));
    }

    #[test]
    fn test_port_prefers_platform_variable() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("BROKERLIST_API_PORT", "8080"),
        ]))
        .expect("valid env");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = ApiConfig::from_lookup(lookup(&[("BROKERLIST_CACHE_CAPACITY", "lots")]))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "BROKERLIST_CACHE_CAPACITY"));

        assert!(ApiConfig::from_lookup(lookup(&[("BROKERLIST_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_empty_token_means_disabled() {
        let config = ApiConfig::from_lookup(lookup(&[("CACHE_REVALIDATE_TOKEN", "  ")]))
            .expect("valid env");
        assert!(config.revalidate_token.is_none());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr().expect("addr").port(), 3000);

        let bad = ApiConfig {
            bind: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }
}
