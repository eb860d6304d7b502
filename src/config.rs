use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod currencies;

use currencies::CurrencyMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Invalid LOG_FORMAT '{}'. Valid values: text, json", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub processor_api_url: String,
    pub processor_secret_key: String,
    pub processor_webhook_secret: String,
    pub processor_timeout_secs: u64,
    pub webhook_tolerance_secs: i64,
    pub fx_api_url: String,
    pub fx_cache_ttl_secs: u64,
    pub currency_mode: CurrencyMode,
    pub idempotency_ttl_secs: u64,
    pub idempotency_wait_ms: u64,
    pub rate_limit_per_minute: u32,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            database_url: optional("DATABASE_URL"),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5)?,
            redis_url: optional("REDIS_URL"),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            processor_api_url: env::var("PROCESSOR_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            processor_secret_key: env::var("PROCESSOR_SECRET_KEY")
                .context("PROCESSOR_SECRET_KEY must be set")?,
            processor_webhook_secret: env::var("PROCESSOR_WEBHOOK_SECRET")
                .context("PROCESSOR_WEBHOOK_SECRET must be set")?,
            processor_timeout_secs: parse_or("PROCESSOR_TIMEOUT_SECS", 10)?,
            webhook_tolerance_secs: parse_or("WEBHOOK_TOLERANCE_SECS", 300)?,
            fx_api_url: env::var("FX_API_URL")
                .unwrap_or_else(|_| "https://api.frankfurter.app".to_string()),
            fx_cache_ttl_secs: parse_or("FX_CACHE_TTL_SECS", 300)?,
            currency_mode: parse_or("CURRENCY_MODE", CurrencyMode::Strict)?,
            idempotency_ttl_secs: parse_or("IDEMPOTENCY_TTL_SECS", 86_400)?,
            idempotency_wait_ms: parse_or("IDEMPOTENCY_WAIT_MS", 5_000)?,
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", 30)?,
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS"),
            log_format: parse_or("LOG_FORMAT", LogFormat::Text)?,
            log_request_body: parse_or("LOG_REQUEST_BODY", false)?,
        })
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_secs)
    }

    pub fn fx_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fx_cache_ttl_secs)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn idempotency_wait(&self) -> Duration {
        Duration::from_millis(self.idempotency_wait_ms)
    }

    /// Parsed CORS origins; `None` means any origin.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let raw = self.cors_allowed_origins.as_deref()?.trim();
        if raw.is_empty() || raw == "*" {
            return None;
        }
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        _ => Ok(default),
    }
}
