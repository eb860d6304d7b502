use clap::{Parser, Subcommand};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::utils::sanitize::mask_str;

#[derive(Parser)]
#[command(name = "flowpay-core")]
#[command(about = "FlowPay Core - wallet and payment transaction service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration with secrets masked
    Config,

    /// Development bearer tokens
    #[command(subcommand)]
    Token(TokenCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a signed token for an owner id
    Issue {
        /// Owner UUID
        #[arg(value_name = "OWNER_ID")]
        owner_id: Uuid,

        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: u64,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_show(config: &Config) -> anyhow::Result<()> {
    for line in describe_config(config) {
        println!("{}", line);
    }
    println!("✓ Configuration is valid");
    Ok(())
}

pub fn handle_token_issue(config: &Config, owner_id: Uuid, ttl_hours: u64) -> anyhow::Result<()> {
    let token = crate::middleware::auth::issue_token(
        &config.jwt_secret,
        owner_id,
        Duration::from_secs(ttl_hours * 3600),
    )?;
    tracing::info!(%owner_id, ttl_hours, "Issued development token");
    println!("{}", token);
    Ok(())
}

fn describe_config(config: &Config) -> Vec<String> {
    let or_unset = |value: Option<&str>, mask: fn(&str) -> String| {
        value.map(mask).unwrap_or_else(|| "(unset, in-memory)".to_string())
    };

    vec![
        "Configuration:".to_string(),
        format!("  Server Port: {}", config.server_port),
        format!("  Database URL: {}", or_unset(config.database_url.as_deref(), mask_password)),
        format!("  Redis URL: {}", or_unset(config.redis_url.as_deref(), mask_password)),
        format!("  JWT Secret: {}", mask_str(&config.jwt_secret)),
        format!("  Processor API URL: {}", config.processor_api_url),
        format!("  Processor Secret Key: {}", mask_str(&config.processor_secret_key)),
        format!("  Processor Webhook Secret: {}", mask_str(&config.processor_webhook_secret)),
        format!("  Processor Timeout: {}s", config.processor_timeout_secs),
        format!("  Webhook Tolerance: {}s", config.webhook_tolerance_secs),
        format!("  FX API URL: {}", config.fx_api_url),
        format!("  FX Cache TTL: {}s", config.fx_cache_ttl_secs),
        format!("  Currency Mode: {:?}", config.currency_mode),
        format!("  Idempotency TTL: {}s", config.idempotency_ttl_secs),
        format!("  Idempotency Wait: {}ms", config.idempotency_wait_ms),
        format!("  Rate Limit: {}/min", config.rate_limit_per_minute),
        format!(
            "  CORS Origins: {}",
            config.cors_allowed_origins.as_deref().unwrap_or("*")
        ),
        format!("  Log Format: {:?}", config.log_format),
        format!("  Log Request Body: {}", config.log_request_body),
    ]
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
