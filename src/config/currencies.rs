//! Currency reference data.
//!
//! All reference rates are quoted as "1 USD = X currency". USD is the bridge
//! for every cross rate and must stay in the table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const BRIDGE_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyMode {
    /// Only currencies in the reference table.
    Strict,
    /// Any well-formed ISO-4217 code.
    Open,
}

impl FromStr for CurrencyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRICT" => Ok(CurrencyMode::Strict),
            "OPEN" => Ok(CurrencyMode::Open),
            other => anyhow::bail!("Invalid CURRENCY_MODE '{}'. Valid values: STRICT, OPEN", other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub label: &'static str,
    pub symbol: &'static str,
    pub default_rate: f64,
    pub offline_rate: Option<f64>,
}

/// Deprecated codes that may still appear in stored data or from the pricing
/// source. Never allowed for new wallets, but still priceable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCurrency {
    pub code: &'static str,
    pub label: &'static str,
    pub symbol: &'static str,
    pub usd_rate: f64,
}

const fn currency(
    code: &'static str,
    label: &'static str,
    symbol: &'static str,
    default_rate: f64,
) -> CurrencyInfo {
    CurrencyInfo {
        code,
        label,
        symbol,
        default_rate,
        offline_rate: None,
    }
}

fn reference_table() -> Vec<CurrencyInfo> {
    vec![
        CurrencyInfo {
            offline_rate: Some(1.0),
            ..currency("USD", "US Dollar", "$", 1.0)
        },
        currency("EUR", "Euro", "€", 0.92),
        currency("GBP", "British Pound", "£", 0.79),
        currency("CHF", "Swiss Franc", "CHF", 0.88),
        currency("ZAR", "South African Rand", "R", 18.5),
        currency("JPY", "Japanese Yen", "¥", 148.0),
        currency("KRW", "South Korean Won", "₩", 1320.0),
        currency("AUD", "Australian Dollar", "A$", 1.52),
        currency("CAD", "Canadian Dollar", "C$", 1.36),
        currency("NZD", "New Zealand Dollar", "NZ$", 1.63),
        currency("CNY", "Chinese Yuan", "¥", 7.25),
        currency("INR", "Indian Rupee", "₹", 83.2),
        currency("SGD", "Singapore Dollar", "S$", 1.34),
        currency("HKD", "Hong Kong Dollar", "HK$", 7.82),
        currency("SEK", "Swedish Krona", "kr", 10.6),
        currency("NOK", "Norwegian Krone", "kr", 10.8),
        currency("MXN", "Mexican Peso", "$", 17.1),
        currency("BRL", "Brazilian Real", "R$", 4.95),
        currency("TRY", "Turkish Lira", "₺", 30.0),
        currency("RUB", "Russian Ruble", "₽", 92.0),
    ]
}

fn legacy_table() -> Vec<LegacyCurrency> {
    vec![
        LegacyCurrency {
            code: "ABC",
            label: "Legacy ABC",
            symbol: "A$",
            usd_rate: 1.5,
        },
        LegacyCurrency {
            code: "XYZ",
            label: "Legacy XYZ",
            symbol: "X$",
            usd_rate: 2.3,
        },
    ]
}

pub fn is_valid_iso(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    mode: CurrencyMode,
    supported: BTreeMap<&'static str, CurrencyInfo>,
    legacy: BTreeMap<&'static str, LegacyCurrency>,
}

impl CurrencyRegistry {
    pub fn new(mode: CurrencyMode) -> Self {
        Self {
            mode,
            supported: reference_table().into_iter().map(|c| (c.code, c)).collect(),
            legacy: legacy_table().into_iter().map(|c| (c.code, c)).collect(),
        }
    }

    pub fn mode(&self) -> CurrencyMode {
        self.mode
    }

    /// Whether a currency may be used for new wallets and payments.
    pub fn is_allowed(&self, code: &str) -> bool {
        let code = code.trim().to_uppercase();
        if !is_valid_iso(&code) {
            return false;
        }
        match self.mode {
            CurrencyMode::Open => true,
            CurrencyMode::Strict => self.supported.contains_key(code.as_str()),
        }
    }

    pub fn get(&self, code: &str) -> Option<&CurrencyInfo> {
        self.supported.get(code)
    }

    pub fn legacy(&self, code: &str) -> Option<&LegacyCurrency> {
        self.legacy.get(code)
    }

    /// Reference-table currencies in code order.
    pub fn supported(&self) -> impl Iterator<Item = &CurrencyInfo> {
        self.supported.values()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::new(CurrencyMode::Strict)
    }
}
