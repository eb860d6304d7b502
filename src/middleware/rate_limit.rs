use axum::{
    body::Body,
    extract::State,
    http::{header::RETRY_AFTER, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;
use uuid::Uuid;

use super::auth::authenticate;
use crate::AppState;

/// Token bucket per owner for the mutating endpoints.
pub struct OwnerRateLimiter {
    limiter: DefaultKeyedRateLimiter<Uuid>,
    clock: DefaultClock,
}

impl OwnerRateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// `Err` carries the seconds until the next request would be admitted.
    pub fn check(&self, owner_id: Uuid) -> Result<(), u64> {
        self.limiter.check_key(&owner_id).map_err(|not_until| {
            not_until.wait_time_from(self.clock.now()).as_secs().max(1)
        })
    }
}

/// Runs inside the idempotency guard, so replays never consume quota.
/// Unauthenticated requests pass through and are rejected by the handler.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let Ok(owner_id) = authenticate(request.headers(), &state.config.jwt_secret) else {
        return next.run(request).await;
    };

    match state.rate_limiter.check(owner_id) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(%owner_id, path = %request.uri().path(), "Rate limit exceeded");
            let status = StatusCode::TOO_MANY_REQUESTS;
            let mut response = (
                status,
                Json(json!({ "message": "Too many requests", "status": status.as_u16() })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_each_owner_independently() {
        let limiter = OwnerRateLimiter::per_minute(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        let retry_after = limiter.check(a).unwrap_err();
        assert!(retry_after >= 1);

        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = OwnerRateLimiter::per_minute(0);
        let owner = Uuid::new_v4();
        assert!(limiter.check(owner).is_ok());
        assert!(limiter.check(owner).is_err());
    }
}
