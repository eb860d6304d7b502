pub mod auth;
pub mod idempotency;
pub mod rate_limit;
pub mod request_logger;

pub use auth::{AuthError, AuthUser, Claims};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore, RedisIdempotencyStore};
pub use rate_limit::OwnerRateLimiter;
