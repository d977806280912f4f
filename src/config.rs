//! Configuration Module
//!
//! Handles loading and managing core configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::executor::{QueryOptions, RetryPolicy};
use crate::repository::RepositoryConfig;
use crate::session::SessionConfig;

/// Core configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL in seconds for cached records and lists
    pub cache_ttl: u64,
    /// Session lifetime in seconds
    pub session_ttl: u64,
    /// Session sweep interval in seconds
    pub sweep_interval: u64,
    /// Default attempts for raw queries
    pub query_retry_attempts: u32,
    /// Base backoff between raw query attempts, in milliseconds
    pub query_retry_delay_ms: u64,
    /// Per-attempt raw query deadline in milliseconds, none when unset
    pub query_timeout_ms: Option<u64>,
    /// Attempts for direct store calls from the repository and sessions
    pub store_retry_attempts: u32,
    /// Base backoff between direct store call attempts, in milliseconds
    pub store_retry_delay_ms: u64,
    /// Tables whose mutations are published as change notifications
    pub change_tables: Vec<String>,
    /// Queue size of each event subscriber
    pub event_buffer: usize,
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL` - Cache TTL in seconds (default: 300)
    /// - `SESSION_TTL` - Session TTL in seconds (default: 3600)
    /// - `SWEEP_INTERVAL` - Session sweep interval in seconds (default: 300)
    /// - `QUERY_RETRY_ATTEMPTS` - Raw query attempts (default: 3)
    /// - `QUERY_RETRY_DELAY_MS` - Raw query base backoff (default: 1000)
    /// - `QUERY_TIMEOUT_MS` - Raw query attempt deadline (default: unset)
    /// - `STORE_RETRY_ATTEMPTS` - Direct store call attempts (default: 1)
    /// - `STORE_RETRY_DELAY_MS` - Direct store call base backoff (default: 100)
    /// - `CHANGE_TABLES` - Comma separated table names (default: empty)
    /// - `EVENT_BUFFER` - Subscriber queue size (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: parsed("CACHE_TTL").unwrap_or(defaults.cache_ttl),
            session_ttl: parsed("SESSION_TTL").unwrap_or(defaults.session_ttl),
            sweep_interval: parsed("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            query_retry_attempts: parsed("QUERY_RETRY_ATTEMPTS")
                .unwrap_or(defaults.query_retry_attempts),
            query_retry_delay_ms: parsed("QUERY_RETRY_DELAY_MS")
                .unwrap_or(defaults.query_retry_delay_ms),
            query_timeout_ms: parsed("QUERY_TIMEOUT_MS"),
            store_retry_attempts: parsed("STORE_RETRY_ATTEMPTS")
                .unwrap_or(defaults.store_retry_attempts),
            store_retry_delay_ms: parsed("STORE_RETRY_DELAY_MS")
                .unwrap_or(defaults.store_retry_delay_ms),
            change_tables: env::var("CHANGE_TABLES")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.change_tables),
            event_buffer: parsed("EVENT_BUFFER").unwrap_or(defaults.event_buffer),
        }
    }

    /// Retry policy for direct store calls.
    pub fn store_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_retry_attempts,
            Duration::from_millis(self.store_retry_delay_ms),
        )
    }

    pub fn repository(&self) -> RepositoryConfig {
        RepositoryConfig {
            cache_ttl: self.cache_ttl,
            store_retry: self.store_retry(),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            ttl_secs: self.session_ttl,
            sweep_interval: Duration::from_secs(self.sweep_interval),
            store_retry: self.store_retry(),
            event_capacity: self.event_buffer,
        }
    }

    /// Default options for `QueryExecutor::execute_query`.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            retry_attempts: self.query_retry_attempts,
            timeout: self.query_timeout(),
        }
    }

    pub fn query_retry_delay(&self) -> Duration {
        Duration::from_millis(self.query_retry_delay_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl: 300,
            session_ttl: 3600,
            sweep_interval: 300,
            query_retry_attempts: 3,
            query_retry_delay_ms: 1000,
            query_timeout_ms: None,
            store_retry_attempts: 1,
            store_retry_delay_ms: 100,
            change_tables: Vec::new(),
            event_buffer: 64,
        }
    }
}
