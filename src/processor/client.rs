use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    to_minor_units, IntentRequest, PaymentProcessor, PayoutRequest, ProcessorError,
    ProcessorIntent, ProcessorPayout,
};

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for a Stripe-compatible REST API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl StripeClient {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, 5, 30)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        StripeClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    async fn post_form<T: DeserializeOwned + Send + 'static>(
        &self,
        path: &str,
        idempotency_key: &str,
        form: Vec<(String, String)>,
    ) -> Result<T, ProcessorError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&form);

        let result = self
            .circuit_breaker
            .call_with(counts_as_outage, async move {
                let response = request.send().await?;
                decode(response).await
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => Err(ProcessorError::CircuitBreakerOpen(
                "payment processor circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Declines and validation errors are the caller's problem and must not trip
/// the breaker.
fn counts_as_outage(err: &ProcessorError) -> bool {
    match err {
        ProcessorError::Api { status, .. } => *status >= 500 || *status == 429,
        _ => true,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProcessorError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProcessorError::InvalidResponse(e.to_string()));
    }

    let message = response
        .json::<ErrorEnvelope>()
        .await
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| status.to_string());
    Err(ProcessorError::Api {
        status: status.as_u16(),
        message,
    })
}

fn metadata_fields(
    form: &mut Vec<(String, String)>,
    metadata: &std::collections::BTreeMap<String, String>,
) {
    for (key, value) in metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_intent(&self, request: IntentRequest) -> Result<ProcessorIntent, ProcessorError> {
        let amount = to_minor_units(&request.amount, &request.currency)?;
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        metadata_fields(&mut form, &request.metadata);

        let intent: IntentResponse = self
            .post_form("/v1/payment_intents", &request.idempotency_key, form)
            .await?;
        tracing::debug!(intent_id = %intent.id, "Payment intent created");

        Ok(ProcessorIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn create_payout(&self, request: PayoutRequest) -> Result<ProcessorPayout, ProcessorError> {
        let amount = to_minor_units(&request.amount, &request.currency)?;
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
        ];
        if let Some(destination) = &request.destination {
            form.push(("destination".to_string(), destination.clone()));
        }
        metadata_fields(&mut form, &request.metadata);

        let payout: PayoutResponse = self
            .post_form("/v1/payouts", &request.idempotency_key, form)
            .await?;
        tracing::debug!(payout_id = %payout.id, status = %payout.status, "Payout created");

        Ok(ProcessorPayout {
            id: payout.id,
            status: payout.status,
        })
    }
}
