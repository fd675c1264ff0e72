use std::net::IpAddr;
use std::time::Duration;

use crate::scheduler::RetryPolicy;
use crate::sync::delivery::DEFAULT_API_BASE;
use crate::sync::trigger::DEFAULT_SYNC_TAG;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub api_base: String,
    pub sync_tag: String,
    pub token_timeout: Duration,
    pub delivery_timeout: Duration,
    pub stale_syncing_after: Duration,
    pub retry: RetryPolicy,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("DATABASE_URL", "sqlite://quickadd-sync.db");

        let host: IpAddr = env_or("QUICKADD_HOST", "127.0.0.1")
            .parse()
            .map_err(|e| format!("Invalid QUICKADD_HOST: {e}"))?;

        let port: u16 = env_or("QUICKADD_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid QUICKADD_PORT: {e}"))?;

        let api_base = env_or("QUICKADD_API_BASE", DEFAULT_API_BASE);
        let sync_tag = env_or("QUICKADD_SYNC_TAG", DEFAULT_SYNC_TAG);

        let token_timeout = env_secs("QUICKADD_TOKEN_TIMEOUT_SECS", 5)?;
        let delivery_timeout = env_secs("QUICKADD_DELIVERY_TIMEOUT_SECS", 30)?;
        let stale_syncing_after = env_secs("QUICKADD_STALE_SYNCING_SECS", 300)?;

        let retry = RetryPolicy {
            base_delay: env_secs("QUICKADD_RETRY_BASE_SECS", 30)?,
            max_delay: env_secs("QUICKADD_RETRY_MAX_SECS", 900)?,
            max_attempts: env_or("QUICKADD_MAX_SYNC_ATTEMPTS", "3")
                .parse()
                .map_err(|e| format!("Invalid QUICKADD_MAX_SYNC_ATTEMPTS: {e}"))?,
        };

        let log_level = env_or("QUICKADD_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            host,
            port,
            api_base,
            sync_tag,
            token_timeout,
            delivery_timeout,
            stale_syncing_after,
            retry,
            log_level,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<Duration, String> {
    env_or(key, &default.to_string())
        .parse()
        .map(Duration::from_secs)
        .map_err(|e| format!("Invalid {key}: {e}"))
}
