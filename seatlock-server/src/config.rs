//! Server configuration read from environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `SEATLOCK_HOST` | `0.0.0.0` |
//! | `SEATLOCK_PORT` | `8080` |
//! | `SEATLOCK_STORE` | `postgres` (`postgres` or `memory`) |
//! | `DATABASE_URL` | required when the store is `postgres` |
//! | `DB_MAX_CONNECTIONS` | `10` |
//! | `DB_ACQUIRE_TIMEOUT_SECS` | `30` |
//! | `DB_LOCK_TIMEOUT_MS` | `5000` |
//! | `SEATLOCK_RETRY_ATTEMPTS` | `3` |
//! | `SEATLOCK_LOG_FORMAT` | `text` (`text` or `json`) |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use seatlock::RetryPolicy;
use seatlock_memory::MemoryConfig;
use seatlock_postgres::{MaxConnections, PostgresConfig};
use thiserror::Error;

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable is set to something unusable.
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

/// Which backend the server runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL at the given URL.
    Postgres {
        /// Connection string.
        database_url: String,
    },
    /// Process-local store; state is lost on restart.
    Memory,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
    /// Storage backend.
    pub backend: StoreBackend,
    /// Pool and lock settings for the Postgres backend.
    pub postgres: PostgresConfig,
    /// Lock settings for the in-memory backend.
    pub memory: MemoryConfig,
    /// Retry policy of the registration coordinator.
    pub retry_policy: RetryPolicy,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host: IpAddr = parse_or(&var, "SEATLOCK_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED), "an IP address")?;
        let port: u16 = parse_or(&var, "SEATLOCK_PORT", 8080, "a port number")?;

        let backend = match var("SEATLOCK_STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres {
                database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SEATLOCK_STORE",
                    value: other.to_string(),
                    reason: "expected postgres or memory",
                })
            }
        };

        let defaults = PostgresConfig::default();
        let max_connections: NonZeroU32 = parse_or(
            &var,
            "DB_MAX_CONNECTIONS",
            defaults.max_connections.into(),
            "a positive integer",
        )?;
        let acquire_timeout_secs: u64 = parse_or(
            &var,
            "DB_ACQUIRE_TIMEOUT_SECS",
            defaults.acquire_timeout.as_secs(),
            "a number of seconds",
        )?;
        let lock_timeout_ms: u64 = parse_or(&var, "DB_LOCK_TIMEOUT_MS", 5000, "a number of milliseconds")?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_LOCK_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "a zero lock timeout would wait forever",
            });
        }
        let lock_timeout = Duration::from_millis(lock_timeout_ms);

        let retry_attempts: u32 = parse_or(&var, "SEATLOCK_RETRY_ATTEMPTS", 3, "a positive integer")?;
        if retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "SEATLOCK_RETRY_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required",
            });
        }

        let log_format = match var("SEATLOCK_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SEATLOCK_LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json",
                })
            }
        };

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            backend,
            postgres: PostgresConfig {
                max_connections: MaxConnections::new(max_connections),
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                lock_timeout,
                ..defaults
            },
            memory: MemoryConfig { lock_timeout },
            retry_policy: RetryPolicy::default().with_max_attempts(retry_attempts),
            log_format,
        })
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T, reason: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    V: Fn(&'static str) -> Option<String>,
{
    var(name).map_or(Ok(default), |value| {
        value.parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason,
        })
    })
}
