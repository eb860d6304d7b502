use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::middleware::IdempotencyStore;
use crate::ports::LedgerStore;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[schema(value_type = Object)]
    pub dependencies: BTreeMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// A critical failure makes the whole service unhealthy; others only
    /// degrade it.
    fn critical(&self) -> bool;

    async fn check(&self) -> DependencyStatus;
}

pub struct LedgerChecker {
    store: Arc<dyn LedgerStore>,
}

impl LedgerChecker {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for LedgerChecker {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

/// Mutating requests with an idempotency key fail closed without this
/// backend, so an outage degrades the service rather than taking it down.
pub struct IdempotencyChecker {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyChecker {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for IdempotencyChecker {
    fn name(&self) -> &'static str {
        "idempotency"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let results = futures::future::join_all(checkers.iter().map(|checker| async move {
        let status = timeout(CHECK_TIMEOUT, checker.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
        (checker.name(), checker.critical(), status)
    }))
    .await;

    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;
    let mut dependencies = BTreeMap::new();

    for (name, critical, status) in results {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            tracing::warn!(dependency = name, ?status, "Dependency check failed");
            if critical {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
        dependencies.insert(name.to_string(), status);
    }

    let status = if has_critical_failure {
        "unhealthy"
    } else if has_non_critical_failure {
        "degraded"
    } else {
        "healthy"
    };

    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        critical: bool,
        up: bool,
    }

    #[async_trait]
    impl DependencyChecker for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn check(&self) -> DependencyStatus {
            if self.up {
                DependencyStatus::healthy(Instant::now())
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    fn checker(name: &'static str, critical: bool, up: bool) -> Arc<dyn DependencyChecker> {
        Arc::new(Fixed { name, critical, up })
    }

    #[tokio::test]
    async fn all_up_is_healthy() {
        let report = check_health(
            &[checker("ledger", true, true), checker("idempotency", false, true)],
            Instant::now(),
        )
        .await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn non_critical_failure_degrades() {
        let report = check_health(
            &[checker("ledger", true, true), checker("idempotency", false, false)],
            Instant::now(),
        )
        .await;
        assert_eq!(report.status, "degraded");
        assert!(!report.is_unhealthy());
    }

    #[tokio::test]
    async fn critical_failure_is_unhealthy() {
        let report = check_health(
            &[checker("ledger", true, false), checker("idempotency", false, true)],
            Instant::now(),
        )
        .await;
        assert!(report.is_unhealthy());
        assert!(matches!(
            report.dependencies["ledger"],
            DependencyStatus::Unhealthy { .. }
        ));
    }
}
