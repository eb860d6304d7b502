//! External payment processor: outbound intents/payouts and inbound webhooks.

pub mod client;
pub mod webhook;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use std::collections::BTreeMap;
use thiserror::Error;

pub use client::StripeClient;
pub use webhook::{construct_event, sign_payload, verify_signature, ProcessorEvent, SignatureError};

/// Currencies the processor expects in whole units rather than cents.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Processor rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response from processor: {0}")]
    InvalidResponse(String),
    #[error("Amount {0} cannot be expressed in minor units")]
    InvalidAmount(BigDecimal),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount: BigDecimal,
    pub currency: String,
    /// Forwarded as the processor's `Idempotency-Key`, so a retried call for
    /// the same transaction never opens a second intent.
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub idempotency_key: String,
    pub destination: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorPayout {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> Result<ProcessorIntent, ProcessorError>;

    async fn create_payout(&self, request: PayoutRequest) -> Result<ProcessorPayout, ProcessorError>;
}

pub fn is_zero_decimal(currency: &str) -> bool {
    ZERO_DECIMAL_CURRENCIES.contains(&currency.to_uppercase().as_str())
}

/// Converts a decimal amount into the processor's integer minor units,
/// rounding half-up.
pub fn to_minor_units(amount: &BigDecimal, currency: &str) -> Result<i64, ProcessorError> {
    let scaled = if is_zero_decimal(currency) {
        amount.clone()
    } else {
        amount * BigDecimal::from(100)
    };
    scaled
        .round(0)
        .to_i64()
        .filter(|units| *units > 0)
        .ok_or_else(|| ProcessorError::InvalidAmount(amount.clone()))
}
