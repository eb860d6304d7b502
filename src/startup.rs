use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: Option<bool>,
    pub redis: Option<bool>,
    pub processor: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Skipped checks (`None`) do not fail the report.
    pub fn is_valid(&self) -> bool {
        self.environment
            && self.database.unwrap_or(true)
            && self.redis.unwrap_or(true)
            && self.processor
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(Some(self.environment)));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));
        println!("Processor URL:         {}", status(Some(self.processor)));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: Option<bool>) -> &'static str {
    match ok {
        Some(true) => "✅ OK",
        Some(false) => "❌ FAIL",
        None => "– skipped (in-memory)",
    }
}

pub async fn validate_environment(config: &Config, pool: Option<&PgPool>) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: None,
        redis: None,
        processor: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_processor_url(&config.processor_api_url) {
        report.processor = false;
        report.errors.push(format!("Processor: {}", e));
    }

    if let Some(pool) = pool {
        let ok = validate_database(pool).await;
        report.database = Some(ok.is_ok());
        if let Err(e) = ok {
            report.errors.push(format!("Database: {:#}", e));
        }
    }

    if let Some(redis_url) = config.redis_url.as_deref() {
        let ok = validate_redis(redis_url).await;
        report.redis = Some(ok.is_ok());
        if let Err(e) = ok {
            report.errors.push(format!("Redis: {:#}", e));
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.jwt_secret.trim().is_empty() {
        anyhow::bail!("JWT_SECRET is empty");
    }
    if config.processor_secret_key.trim().is_empty() {
        anyhow::bail!("PROCESSOR_SECRET_KEY is empty");
    }
    if config.processor_webhook_secret.trim().is_empty() {
        anyhow::bail!("PROCESSOR_WEBHOOK_SECRET is empty");
    }
    if config.processor_timeout_secs == 0 {
        anyhow::bail!("PROCESSOR_TIMEOUT_SECS must be greater than 0");
    }

    url::Url::parse(&config.fx_api_url).context("FX_API_URL is not a valid URL")?;

    Ok(())
}

fn validate_processor_url(processor_url: &str) -> Result<()> {
    let parsed = url::Url::parse(processor_url).context("PROCESSOR_API_URL is not a valid URL")?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("PROCESSOR_API_URL must use http or https");
    }
    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::currencies::CurrencyMode;
    use crate::config::LogFormat;

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: None,
            db_max_connections: 5,
            redis_url: None,
            jwt_secret: "secret".to_string(),
            processor_api_url: "https://api.stripe.com".to_string(),
            processor_secret_key: "sk_test".to_string(),
            processor_webhook_secret: "whsec".to_string(),
            processor_timeout_secs: 10,
            webhook_tolerance_secs: 300,
            fx_api_url: "https://api.frankfurter.app".to_string(),
            fx_cache_ttl_secs: 300,
            currency_mode: CurrencyMode::Strict,
            idempotency_ttl_secs: 86_400,
            idempotency_wait_ms: 5_000,
            rate_limit_per_minute: 30,
            cors_allowed_origins: None,
            log_format: LogFormat::Text,
            log_request_body: false,
        }
    }

    #[test]
    fn test_validate_env_vars_empty_secret() {
        let mut config = config();
        config.jwt_secret = " ".to_string();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_processor_url() {
        assert!(validate_processor_url("https://api.stripe.com").is_ok());
        assert!(validate_processor_url("not-a-url").is_err());
        assert!(validate_processor_url("ftp://api.stripe.com").is_err());
    }

    #[tokio::test]
    async fn test_in_memory_report_skips_backends() {
        let report = validate_environment(&config(), None).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.database, None);
        assert_eq!(report.redis, None);
    }
}
