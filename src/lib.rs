pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod pricing;
pub mod processor;
pub mod services;
pub mod startup;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::currencies::CurrencyRegistry;
use crate::config::Config;
use crate::health::{DependencyChecker, IdempotencyChecker, LedgerChecker};
use crate::middleware::idempotency::{idempotency_middleware, IDEMPOTENCY_HEADER};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_logger::request_logger_middleware;
use crate::middleware::{IdempotencyStore, OwnerRateLimiter};
use crate::ports::LedgerStore;
use crate::pricing::LiveRateSource;
use crate::processor::PaymentProcessor;
use crate::services::{FxRateResolver, Notifier};
use crate::use_cases::{PaymentOrchestrator, WalletService, WebhookReconciler};

/// External collaborators the application is assembled from. Production wires
/// Postgres, Redis and the HTTP clients; tests wire in-memory doubles.
pub struct Collaborators {
    pub store: Arc<dyn LedgerStore>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub rates: Option<Arc<dyn LiveRateSource>>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn LedgerStore>,
    pub payments: Arc<PaymentOrchestrator>,
    pub wallets: Arc<WalletService>,
    pub reconciler: Arc<WebhookReconciler>,
    pub fx: Arc<FxRateResolver>,
    pub notifier: Notifier,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub rate_limiter: Arc<OwnerRateLimiter>,
    pub health_checks: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        let registry = Arc::new(CurrencyRegistry::new(config.currency_mode));
        let fx = Arc::new(FxRateResolver::new(
            registry.clone(),
            deps.rates,
            config.fx_cache_ttl(),
        ));

        let payments = Arc::new(PaymentOrchestrator::new(
            deps.store.clone(),
            deps.processor.clone(),
            fx.clone(),
            config.processor_timeout(),
        ));
        let wallets = Arc::new(WalletService::new(
            deps.store.clone(),
            deps.processor,
            registry,
            config.processor_timeout(),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(deps.store.clone()));

        let health_checks: Vec<Arc<dyn DependencyChecker>> = vec![
            Arc::new(LedgerChecker::new(deps.store.clone())),
            Arc::new(IdempotencyChecker::new(deps.idempotency.clone())),
        ];

        Self {
            rate_limiter: Arc::new(OwnerRateLimiter::per_minute(config.rate_limit_per_minute)),
            config: Arc::new(config),
            store: deps.store,
            payments,
            wallets,
            reconciler,
            fx,
            notifier: Notifier::new(),
            idempotency: deps.idempotency,
            health_checks: Arc::new(health_checks),
            start_time: Instant::now(),
        }
    }
}

/// Idempotency wraps rate limiting, so replays never spend quota.
fn guarded(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), idempotency_middleware))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(IDEMPOTENCY_HEADER),
        ]);

    match config.cors_origins() {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(AllowOrigin::list(origins))
        }
        None => base.allow_origin(AllowOrigin::any()),
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .route(
            "/payments",
            guarded(&state, post(handlers::payments::make_payment)),
        )
        .route(
            "/wallets",
            guarded(&state, post(handlers::wallets::create_wallet))
                .get(handlers::wallets::list_wallets),
        )
        .route(
            "/wallets/fund",
            guarded(&state, post(handlers::wallets::fund_wallet)),
        )
        .route(
            "/wallets/withdraw",
            guarded(&state, post(handlers::wallets::withdraw)),
        )
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/fx/rates", get(handlers::fx::list_rates))
        .route("/fx/convert", get(handlers::fx::convert))
        .route(
            "/webhooks/processor",
            post(handlers::webhook::processor_webhook),
        )
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(from_fn_with_state(state.clone(), request_logger_middleware))
        .layer(cors)
        .with_state(state)
}
