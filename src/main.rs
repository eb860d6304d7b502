use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowpay_core::adapters::{InMemoryLedgerStore, PostgresLedgerStore};
use flowpay_core::cli::{Cli, Commands, DbCommands, TokenCommands};
use flowpay_core::config::{Config, LogFormat};
use flowpay_core::middleware::{IdempotencyStore, InMemoryIdempotencyStore, RedisIdempotencyStore};
use flowpay_core::ports::LedgerStore;
use flowpay_core::pricing::FrankfurterClient;
use flowpay_core::processor::StripeClient;
use flowpay_core::{cli, create_app, db, startup, AppState, Collaborators};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => cli::handle_config_show(&config),
        Some(Commands::Token(TokenCommands::Issue { owner_id, ttl_hours })) => {
            cli::handle_token_issue(&config, owner_id, ttl_hours)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = match config.database_url {
        Some(_) => {
            let pool = db::create_pool(&config).await?;
            db::run_migrations(&pool).await?;
            Some(pool)
        }
        None => None,
    };

    let report = startup::validate_environment(&config, pool.as_ref()).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }

    let store: Arc<dyn LedgerStore> = match pool {
        Some(pool) => Arc::new(PostgresLedgerStore::new(pool)),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory ledger");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let idempotency: Arc<dyn IdempotencyStore> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(RedisIdempotencyStore::new(url)?),
        None => {
            tracing::warn!("REDIS_URL not set, idempotency records are process-local");
            Arc::new(InMemoryIdempotencyStore::new())
        }
    };

    let processor = Arc::new(StripeClient::new(
        config.processor_api_url.clone(),
        config.processor_secret_key.clone(),
    ));
    let rates = Arc::new(FrankfurterClient::new(config.fx_api_url.clone()));
    tracing::info!(
        processor_url = %config.processor_api_url,
        fx_url = %config.fx_api_url,
        currency_mode = ?config.currency_mode,
        "Clients initialized"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let state = AppState::new(
        config,
        Collaborators {
            store,
            processor,
            rates: Some(rates),
            idempotency,
        },
    );
    let app = create_app(state);

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
