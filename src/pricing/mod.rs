//! External FX pricing source.

pub mod client;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub use client::FrankfurterClient;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid response from pricing API: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Live rates quoted against `base`: "1 base = rates[code] code".
#[async_trait]
pub trait LiveRateSource: Send + Sync {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, f64>, PricingError>;
}
