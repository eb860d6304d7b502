//! Cross-currency rates bridged through USD.
//!
//! Each leg (USD -> code) is resolved independently by priority: live
//! pricing, configured offline rate, configured default rate, legacy rate.
//! A cross rate reports the worst tier of its two legs.

use arc_swap::ArcSwapOption;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::currencies::{CurrencyMode, CurrencyRegistry, BRIDGE_CURRENCY};
use crate::domain::money::{decimal_from_f64, is_positive, round_money};
use crate::pricing::LiveRateSource;

const RATE_SCALE: i64 = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FxError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Conversion from {from} to {to} is not representable")]
    ConversionOverflow { from: String, to: String },
}

/// Where a rate came from. Variants are ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateTier {
    Identity,
    Live,
    Offline,
    Default,
    Legacy,
}

impl RateTier {
    pub fn is_fallback(&self) -> bool {
        matches!(self, RateTier::Offline | RateTier::Default | RateTier::Legacy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRate {
    pub rate: BigDecimal,
    pub tier: RateTier,
}

impl ResolvedRate {
    pub fn fallback_used(&self) -> bool {
        self.tier.is_fallback()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub amount: BigDecimal,
    pub from: String,
    pub to: String,
    pub rate: BigDecimal,
    pub tier: RateTier,
    pub converted: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateEntry {
    pub code: String,
    pub label: String,
    pub symbol: String,
    pub rate: BigDecimal,
    pub tier: RateTier,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateListing {
    pub base: String,
    pub fallback_used: bool,
    pub rates: Vec<RateEntry>,
}

struct CachedRates {
    rates: Arc<HashMap<String, f64>>,
    fetched_at: Instant,
}

struct Leg {
    usd_rate: BigDecimal,
    tier: RateTier,
}

pub struct FxRateResolver {
    registry: Arc<CurrencyRegistry>,
    source: Option<Arc<dyn LiveRateSource>>,
    cache: ArcSwapOption<CachedRates>,
    cache_ttl: Duration,
}

impl FxRateResolver {
    pub fn new(
        registry: Arc<CurrencyRegistry>,
        source: Option<Arc<dyn LiveRateSource>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            cache: ArcSwapOption::empty(),
            cache_ttl,
        }
    }

    /// Resolver that never calls out; every rate comes from the fallback tiers.
    pub fn offline(registry: Arc<CurrencyRegistry>) -> Self {
        Self::new(registry, None, Duration::ZERO)
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub async fn get_rate(&self, from: &str, to: &str) -> Result<ResolvedRate, FxError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();

        if from == to {
            if self.is_priceable_code(&from) {
                return Ok(ResolvedRate {
                    rate: BigDecimal::from(1),
                    tier: RateTier::Identity,
                });
            }
            return Err(FxError::UnsupportedCurrency(from));
        }

        let live = self.live_rates().await;
        let from_leg = self.resolve_leg(&from, live.as_deref())?;
        let to_leg = self.resolve_leg(&to, live.as_deref())?;
        cross_rate(&from, &to, &from_leg, &to_leg)
    }

    pub async fn convert(
        &self,
        amount: &BigDecimal,
        from: &str,
        to: &str,
    ) -> Result<Conversion, FxError> {
        if !is_positive(amount) {
            return Err(FxError::InvalidAmount);
        }

        let resolved = self.get_rate(from, to).await?;
        let converted = round_money(&(amount * &resolved.rate));

        Ok(Conversion {
            amount: amount.clone(),
            from: from.trim().to_uppercase(),
            to: to.trim().to_uppercase(),
            rate: resolved.rate,
            tier: resolved.tier,
            converted,
        })
    }

    /// Rates for every reference currency quoted against `base`.
    pub async fn list_rates(&self, base: &str) -> Result<RateListing, FxError> {
        let base = base.trim().to_uppercase();
        let live = self.live_rates().await;
        let base_leg = self.resolve_leg(&base, live.as_deref())?;

        let mut rates = Vec::new();
        for info in self.registry.supported() {
            let resolved = if info.code == base {
                ResolvedRate {
                    rate: BigDecimal::from(1),
                    tier: RateTier::Identity,
                }
            } else {
                let leg = self.resolve_leg(info.code, live.as_deref())?;
                cross_rate(&base, info.code, &base_leg, &leg)?
            };
            rates.push(RateEntry {
                code: info.code.to_string(),
                label: info.label.to_string(),
                symbol: info.symbol.to_string(),
                rate: resolved.rate,
                tier: resolved.tier,
            });
        }

        Ok(RateListing {
            fallback_used: rates.iter().any(|r| r.tier.is_fallback()),
            base,
            rates,
        })
    }

    fn is_priceable_code(&self, code: &str) -> bool {
        match self.registry.mode() {
            CurrencyMode::Open => crate::config::currencies::is_valid_iso(code),
            CurrencyMode::Strict => {
                self.registry.get(code).is_some() || self.registry.legacy(code).is_some()
            }
        }
    }

    fn resolve_leg(
        &self,
        code: &str,
        live: Option<&HashMap<String, f64>>,
    ) -> Result<Leg, FxError> {
        if !self.is_priceable_code(code) {
            return Err(FxError::UnsupportedCurrency(code.to_string()));
        }

        if let Some(rate) = live
            .and_then(|rates| rates.get(code))
            .and_then(|r| decimal_from_f64(*r))
            .filter(is_positive)
        {
            return Ok(Leg {
                usd_rate: rate,
                tier: RateTier::Live,
            });
        }

        if let Some(info) = self.registry.get(code) {
            if let Some(rate) = info.offline_rate.and_then(decimal_from_f64) {
                return Ok(Leg {
                    usd_rate: rate,
                    tier: RateTier::Offline,
                });
            }
            if let Some(rate) = decimal_from_f64(info.default_rate) {
                return Ok(Leg {
                    usd_rate: rate,
                    tier: RateTier::Default,
                });
            }
        }

        if let Some(rate) = self
            .registry
            .legacy(code)
            .and_then(|legacy| decimal_from_f64(legacy.usd_rate))
        {
            return Ok(Leg {
                usd_rate: rate,
                tier: RateTier::Legacy,
            });
        }

        Err(FxError::UnsupportedCurrency(code.to_string()))
    }

    /// Live USD-based rates, refreshed when the cached copy is older than the
    /// TTL. A failed fetch returns `None` so callers fall back quietly.
    async fn live_rates(&self) -> Option<Arc<HashMap<String, f64>>> {
        let source = self.source.as_ref()?;

        if let Some(cached) = self.cache.load_full() {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Some(cached.rates.clone());
            }
        }

        match source.fetch_rates(BRIDGE_CURRENCY).await {
            Ok(rates) => {
                tracing::debug!(count = rates.len(), "Refreshed live FX rates");
                let rates = Arc::new(rates);
                self.cache.store(Some(Arc::new(CachedRates {
                    rates: rates.clone(),
                    fetched_at: Instant::now(),
                })));
                Some(rates)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Live FX rates unavailable, using fallback rates");
                None
            }
        }
    }
}

fn cross_rate(from: &str, to: &str, from_leg: &Leg, to_leg: &Leg) -> Result<ResolvedRate, FxError> {
    if !is_positive(&from_leg.usd_rate) || !is_positive(&to_leg.usd_rate) {
        return Err(FxError::ConversionOverflow {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let rate = (&to_leg.usd_rate / &from_leg.usd_rate)
        .round(RATE_SCALE)
        .normalized();

    Ok(ResolvedRate {
        rate,
        tier: from_leg.tier.max(to_leg.tier),
    })
}
