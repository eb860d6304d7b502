#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use flowpay_core::adapters::InMemoryLedgerStore;
use flowpay_core::config::currencies::CurrencyMode;
use flowpay_core::config::{Config, LogFormat};
use flowpay_core::domain::Wallet;
use flowpay_core::middleware::auth::issue_token;
use flowpay_core::middleware::InMemoryIdempotencyStore;
use flowpay_core::ports::LedgerStore;
use flowpay_core::processor::{
    sign_payload, IntentRequest, PaymentProcessor, PayoutRequest, ProcessorError,
    ProcessorIntent, ProcessorPayout,
};
use flowpay_core::{create_app, AppState, Collaborators};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: None,
        db_max_connections: 1,
        redis_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        processor_api_url: "http://processor.invalid".to_string(),
        processor_secret_key: "sk_test".to_string(),
        processor_webhook_secret: WEBHOOK_SECRET.to_string(),
        processor_timeout_secs: 2,
        webhook_tolerance_secs: 300,
        fx_api_url: "http://fx.invalid".to_string(),
        fx_cache_ttl_secs: 300,
        currency_mode: CurrencyMode::Strict,
        idempotency_ttl_secs: 86_400,
        idempotency_wait_ms: 3_000,
        rate_limit_per_minute: 1_000,
        cors_allowed_origins: None,
        log_format: LogFormat::Text,
        log_request_body: false,
    }
}

/// Processor double. Intent and payout ids are numbered in call order
/// (`pi_1`, `po_1`, ...). The first `fail_next` calls fail.
#[derive(Default)]
pub struct ScriptedProcessor {
    pub intents: AtomicUsize,
    pub payouts: AtomicUsize,
    pub fail_next: AtomicUsize,
    pub delay: Option<Duration>,
}

impl ScriptedProcessor {
    pub fn failing(times: usize) -> Self {
        Self {
            fail_next: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn intent_calls(&self) -> usize {
        self.intents.load(Ordering::SeqCst)
    }

    async fn script(&self) -> Result<(), ProcessorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ProcessorError::Api {
                status: 503,
                message: "processor unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_intent(&self, _request: IntentRequest) -> Result<ProcessorIntent, ProcessorError> {
        let n = self.intents.fetch_add(1, Ordering::SeqCst) + 1;
        self.script().await?;
        Ok(ProcessorIntent {
            id: format!("pi_{}", n),
            client_secret: Some(format!("pi_{}_secret", n)),
        })
    }

    async fn create_payout(&self, _request: PayoutRequest) -> Result<ProcessorPayout, ProcessorError> {
        let n = self.payouts.fetch_add(1, Ordering::SeqCst) + 1;
        self.script().await?;
        Ok(ProcessorPayout {
            id: format!("po_{}", n),
            status: "pending".to_string(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryLedgerStore>,
    pub processor: Arc<ScriptedProcessor>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(test_config(), ScriptedProcessor::default())
    }

    pub fn with(config: Config, processor: ScriptedProcessor) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let processor = Arc::new(processor);
        let state = AppState::new(
            config,
            Collaborators {
                store: store.clone(),
                processor: processor.clone(),
                rates: None,
                idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            },
        );
        let router = create_app(state.clone());
        Self {
            router,
            state,
            store,
            processor,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    pub async fn funded_wallet(&self, owner: Uuid, currency: &str, balance: &str) -> Wallet {
        let wallet = self.store.create_wallet(owner, currency).await.unwrap();
        if dec(balance) > dec("0") {
            self.store.credit(wallet.id, &dec(balance)).await.unwrap()
        } else {
            wallet
        }
    }

    pub async fn balance(&self, wallet_id: Uuid) -> BigDecimal {
        self.store.get_wallet(wallet_id).await.unwrap().unwrap().balance
    }
}

pub fn token(owner: Uuid) -> String {
    issue_token(JWT_SECRET, owner, Duration::from_secs(3600)).unwrap()
}

pub fn post_json(path: &str, owner: Option<Uuid>, body: &Value, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("authorization", format!("Bearer {}", token(owner)));
    }
    if let Some(key) = idempotency_key {
        builder = builder.header("idempotency-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(path: &str, owner: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(owner) = owner {
        builder = builder.header("authorization", format!("Bearer {}", token(owner)));
    }
    builder.body(Body::empty()).unwrap()
}

/// Processor event delivery signed with the test secret.
pub fn signed_webhook(event: &Value) -> Request<Body> {
    let payload = event.to_string();
    let signature = sign_payload(
        payload.as_bytes(),
        WEBHOOK_SECRET,
        chrono::Utc::now().timestamp(),
    );
    Request::builder()
        .method("POST")
        .uri("/webhooks/processor")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

pub fn processor_event(kind: &str, object_id: &str, transaction_id: Option<Uuid>) -> Value {
    let mut metadata = serde_json::Map::new();
    if let Some(id) = transaction_id {
        metadata.insert("transactionId".to_string(), Value::String(id.to_string()));
    }
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": kind,
        "data": { "object": { "id": object_id, "metadata": metadata } }
    })
}

pub fn payment_body(amount: Value, source: &str, destination: &str) -> Value {
    serde_json::json!({
        "beneficiary": "Jane Doe",
        "amount": amount,
        "fee": 5,
        "sourceWallet": source,
        "destinationCurrency": destination,
        "fxRate": 1.2
    })
}
