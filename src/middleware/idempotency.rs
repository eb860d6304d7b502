//! At-most-once execution of mutating requests carrying an `Idempotency-Key`.
//!
//! Records are scoped to `(owner, endpoint, key)`. The first request claims
//! the slot with an atomic set-if-absent, runs the handler and stores
//! whatever status and body it produced. Later requests with the same key replay that response
//! verbatim. A request that finds the slot still claimed waits for the first
//! one to finish.

use axum::{
    async_trait,
    body::{self, Body, Full},
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::auth::authenticate;
use crate::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

const IDEMPOTENCY_PREFIX: &str = "idempotency:";
const PROCESSING: &str = "PROCESSING";
/// A claim outlives a crashed request by at most this long.
const CLAIM_TTL: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Acquired,
    InFlight,
    Completed(StoredResponse),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claims `key` if no record exists, otherwise reports what is
    /// there.
    async fn claim(&self, key: &str, ttl: Duration) -> anyhow::Result<Claim>;

    async fn complete(&self, key: &str, response: &StoredResponse, ttl: Duration) -> anyhow::Result<()>;

    async fn release(&self, key: &str) -> anyhow::Result<()>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    redis_client: redis::Client,
}

impl RedisIdempotencyStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    fn key(key: &str) -> String {
        format!("{}{}", IDEMPOTENCY_PREFIX, key)
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> anyhow::Result<Claim> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = Self::key(key);

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(PROCESSING)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if acquired.is_some() {
            return Ok(Claim::Acquired);
        }

        let existing: Option<String> = conn.get(&key).await?;
        match existing {
            // Expired between SET and GET; the next poll claims it.
            None => Ok(Claim::InFlight),
            Some(value) if value == PROCESSING => Ok(Claim::InFlight),
            Some(value) => Ok(Claim::Completed(serde_json::from_str(&value)?)),
        }
    }

    async fn complete(&self, key: &str, response: &StoredResponse, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(response)?;
        let _: () = conn.set_ex(Self::key(key), serialized, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn release(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(key)).await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

enum Slot {
    Processing,
    Done(StoredResponse),
}

/// How often the in-memory store drops expired records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Slots {
    entries: HashMap<String, (Slot, Instant)>,
    next_sweep: Instant,
}

impl Slots {
    /// Drops every expired record once `sweep_interval` has passed since the
    /// previous sweep, so one-off keys do not accumulate.
    fn sweep(&mut self, now: Instant, sweep_interval: Duration) {
        if now < self.next_sweep {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "Swept expired idempotency records");
        }
        self.next_sweep = now + sweep_interval;
    }
}

/// Single-process backend used when no Redis URL is configured and in tests.
pub struct InMemoryIdempotencyStore {
    slots: Mutex<Slots>,
    sweep_interval: Duration,
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                next_sweep: Instant::now() + sweep_interval,
            }),
            sweep_interval,
        }
    }

    /// Records currently held, expired ones included until the next sweep.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> anyhow::Result<Claim> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        slots.sweep(now, self.sweep_interval);

        match slots.entries.get(key) {
            Some((_, expires_at)) if *expires_at <= now => {}
            Some((Slot::Processing, _)) => return Ok(Claim::InFlight),
            Some((Slot::Done(response), _)) => return Ok(Claim::Completed(response.clone())),
            None => {}
        }
        slots
            .entries
            .insert(key.to_string(), (Slot::Processing, now + ttl));
        Ok(Claim::Acquired)
    }

    async fn complete(&self, key: &str, response: &StoredResponse, ttl: Duration) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        slots.sweep(now, self.sweep_interval);
        slots
            .entries
            .insert(key.to_string(), (Slot::Done(response.clone()), now + ttl));
        Ok(())
    }

    async fn release(&self, key: &str) -> anyhow::Result<()> {
        self.slots.lock().await.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "message": message, "status": status.as_u16() })),
    )
        .into_response()
}

fn replay(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(body::boxed(Full::from(stored.body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if let Some(value) = stored
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
    response
}

/// Claims the slot, waiting out an in-flight holder for up to `wait`.
async fn acquire(
    store: &dyn IdempotencyStore,
    key: &str,
    wait: Duration,
) -> Result<Option<StoredResponse>, Response> {
    let deadline = Instant::now() + wait;
    loop {
        match store.claim(key, CLAIM_TTL).await {
            Ok(Claim::Acquired) => return Ok(None),
            Ok(Claim::Completed(stored)) => return Ok(Some(stored)),
            Ok(Claim::InFlight) if Instant::now() >= deadline => {
                return Err(error_response(
                    StatusCode::CONFLICT,
                    "A request with this Idempotency-Key is still being processed",
                ));
            }
            Ok(Claim::InFlight) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                tracing::error!(error = %e, "Idempotency backend unavailable");
                return Err(error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Idempotency service unavailable",
                ));
            }
        }
    }
}

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let idempotency_key = match request.headers().get(IDEMPOTENCY_HEADER) {
        Some(value) => match value.to_str().map(str::trim) {
            Ok(k) if !k.is_empty() => k.to_string(),
            _ => return error_response(StatusCode::BAD_REQUEST, "Invalid Idempotency-Key header"),
        },
        None => return next.run(request).await,
    };

    let owner_id = match authenticate(request.headers(), &state.config.jwt_secret) {
        Ok(owner_id) => owner_id,
        Err(e) => return e.into_response(),
    };

    let key = format!("{}:{}:{}", owner_id, request.uri().path(), idempotency_key);
    let store = state.idempotency.as_ref();

    match acquire(store, &key, state.config.idempotency_wait()).await {
        Ok(Some(stored)) => {
            tracing::info!(%owner_id, key = %idempotency_key, "Replaying stored response");
            return replay(stored);
        }
        Ok(None) => {}
        Err(response) => return response,
    }

    // Every status is recorded, server errors included: a failed rollback can
    // leave side effects behind, so a retry must not run the handler again.
    let response = next.run(request).await;
    let status = response.status();

    let (parts, body) = response.into_parts();
    let bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer response for idempotency record");
            if let Err(e) = store.release(&key).await {
                tracing::error!(error = %e, "Failed to release idempotency claim");
            }
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let stored = StoredResponse {
        status: status.as_u16(),
        content_type: parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    };
    if let Err(e) = store.complete(&key, &stored, state.config.idempotency_ttl()).await {
        tracing::error!(error = %e, "Failed to store idempotency response");
    }

    Response::from_parts(parts, body::boxed(Full::from(bytes)))
}
