use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

pub mod models;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL is not set".into()))?;

    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
