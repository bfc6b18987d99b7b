use serde::Deserialize;
use std::time::Duration;

/// Service settings, read from `NEUROSYNC_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_write_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenv::dotenv().ok();
        envy::prefixed("NEUROSYNC_").from_env::<Config>()
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            max_write_attempts: self.max_write_attempts.max(1),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Retry budget for conflicting ledger writes.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    pub max_write_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: default_max_write_attempts(),
            retry_backoff: Duration::from_millis(default_retry_backoff_ms()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_vars() {
        let config: Config = envy::prefixed("NEUROSYNC_")
            .from_iter(vec![("NEUROSYNC_PORT".to_string(), "9090".to_string())])
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_write_attempts, 3);
    }

    #[test]
    fn ledger_config_keeps_at_least_one_attempt() {
        let config: Config = envy::prefixed("NEUROSYNC_")
            .from_iter(vec![
                ("NEUROSYNC_MAX_WRITE_ATTEMPTS".to_string(), "0".to_string()),
                ("NEUROSYNC_RETRY_BACKOFF_MS".to_string(), "5".to_string()),
            ])
            .unwrap();
        let ledger = config.ledger();
        assert_eq!(ledger.max_write_attempts, 1);
        assert_eq!(ledger.retry_backoff, Duration::from_millis(5));
    }
}
