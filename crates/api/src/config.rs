//! Application configuration loaded from environment variables.

use std::time::Duration;

use broker::PostgresBroker;
use common::RetryPolicy;
use relay::RelayConfig;
use sqlx::PgPool;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `DB_CONNECT_MAX_ATTEMPTS`: connection attempts at startup (default: `10`)
/// - `RELAY_BATCH_SIZE`: events per relay cycle (default: `10`)
/// - `RELAY_POLL_INTERVAL_MS`: idle relay sleep (default: `2000`)
/// - `RELAY_CLAIM_LEASE_SECS`: claim lease (default: `30`)
/// - `RELAY_WORKER_ID`: relay instance id (default: `relay-<pid>`)
/// - `BROKER_POLL_INTERVAL_MS`: idle poll of the PostgreSQL broker queue
///   (default: `200`)
/// - `BROKER_ACK_TIMEOUT_SECS`: unacked deliveries are redelivered after
///   this long (default: `30`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_connect_max_attempts: u32,
    pub relay_batch_size: usize,
    pub relay_poll_interval: Duration,
    pub relay_claim_lease: Duration,
    pub relay_worker_id: Option<String>,
    pub broker_poll_interval: Duration,
    pub broker_ack_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; unset or unparsable values
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_connect_max_attempts: parsed("DB_CONNECT_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.db_connect_max_attempts),
            relay_batch_size: parsed("RELAY_BATCH_SIZE")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.relay_batch_size),
            relay_poll_interval: parsed("RELAY_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay_poll_interval),
            relay_claim_lease: parsed("RELAY_CLAIM_LEASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.relay_claim_lease),
            relay_worker_id: lookup("RELAY_WORKER_ID").filter(|id| !id.trim().is_empty()),
            broker_poll_interval: parsed("BROKER_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.broker_poll_interval),
            broker_ack_timeout: parsed("BROKER_ACK_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.broker_ack_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Relay settings derived from this configuration.
    pub fn relay_config(&self) -> RelayConfig {
        let config = RelayConfig::default()
            .with_batch_size(self.relay_batch_size)
            .with_poll_interval(self.relay_poll_interval)
            .with_claim_lease(self.relay_claim_lease);
        match &self.relay_worker_id {
            Some(id) => config.with_worker_id(id.clone()),
            None => config,
        }
    }

    /// Durable broker over the given pool.
    pub fn postgres_broker(&self, pool: PgPool) -> PostgresBroker {
        PostgresBroker::new(pool)
            .with_poll_interval(self.broker_poll_interval)
            .with_ack_timeout(self.broker_ack_timeout)
    }

    /// Bounded policy for connecting at startup.
    pub fn connect_retry(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.db_connect_max_attempts)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_connect_max_attempts: 10,
            relay_batch_size: 10,
            relay_poll_interval: Duration::from_millis(2000),
            relay_claim_lease: Duration::from_secs(30),
            relay_worker_id: None,
            broker_poll_interval: Duration::from_millis(200),
            broker_ack_timeout: Duration::from_secs(30),
        }
    }
}
