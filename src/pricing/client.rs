use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{LiveRateSource, PricingError};

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: Option<String>,
    rates: HashMap<String, f64>,
}

/// Client for a Frankfurter-compatible `/latest` endpoint.
#[derive(Clone)]
pub struct FrankfurterClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl FrankfurterClient {
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        FrankfurterClient {
            client,
            base_url,
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
}

#[async_trait]
impl LiveRateSource for FrankfurterClient {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, f64>, PricingError> {
        let url = format!("{}/latest", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let base = base.to_uppercase();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .get(&url)
                    .query(&[("from", base.as_str())])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(PricingError::InvalidResponse(format!(
                        "status {}",
                        response.status()
                    )));
                }

                let body = response.json::<LatestResponse>().await?;
                if let Some(quoted) = body.base.as_deref() {
                    if !quoted.eq_ignore_ascii_case(&base) {
                        return Err(PricingError::InvalidResponse(format!(
                            "requested base {} but got {}",
                            base, quoted
                        )));
                    }
                }

                let mut rates: HashMap<String, f64> = body
                    .rates
                    .into_iter()
                    .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
                    .map(|(code, rate)| (code.to_uppercase(), rate))
                    .collect();
                rates.insert(base, 1.0);
                Ok(rates)
            })
            .await;

        match result {
            Ok(rates) => Ok(rates),
            Err(FailsafeError::Rejected) => Err(PricingError::CircuitBreakerOpen(
                "pricing API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
