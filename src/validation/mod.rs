//! Request payloads and their conversion into validated commands.
//!
//! Monetary fields arrive as JSON numbers or numeric strings, so the DTOs keep
//! them as raw [`Value`]s and coerce them here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::money::{is_positive, money_from_json, rate_from_json};
use crate::domain::{TransactionFilter, TransactionStatus, TransactionType};
use crate::use_cases::{FundWallet, MakePayment, WithdrawFromWallet};

pub const BENEFICIARY_MAX_LEN: usize = 255;
pub const REFERENCE_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Strictly positive amount with at most two decimal places.
pub fn parse_amount(value: Option<&Value>) -> Result<BigDecimal, ValidationError> {
    value
        .and_then(money_from_json)
        .filter(is_positive)
        .ok_or_else(|| ValidationError::new("amount", "Invalid amount"))
}

/// Non-negative fee with at most two decimal places; absent means zero.
pub fn parse_fee(value: Option<&Value>) -> Result<BigDecimal, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(BigDecimal::from(0)),
        Some(raw) => money_from_json(raw)
            .filter(|fee| fee >= &BigDecimal::from(0))
            .ok_or_else(|| ValidationError::new("fee", "Invalid fee")),
    }
}

fn optional_text(field: &'static str, value: Option<String>, max_len: usize) -> Result<Option<String>, ValidationError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let cleaned = sanitize_string(&raw);
    if cleaned.is_empty() {
        return Ok(None);
    }
    validate_max_len(field, &cleaned, max_len)?;
    Ok(Some(cleaned))
}

fn parse_wallet_id(value: &Option<String>) -> Result<Uuid, ValidationError> {
    let raw = value.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ValidationError::new("walletId", "Wallet id is required"));
    }
    Uuid::parse_str(raw).map_err(|_| ValidationError::new("walletId", "Invalid wallet id"))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MakePaymentRequest {
    #[serde(default)]
    pub beneficiary: String,
    #[schema(value_type = Object)]
    pub amount: Option<Value>,
    #[schema(value_type = Object)]
    pub fee: Option<Value>,
    /// Currency code of the payer's wallet.
    #[serde(default, alias = "sourceCurrency")]
    pub source_wallet: String,
    #[serde(default)]
    pub destination_currency: String,
    /// Quoted rate; omitted means "use the current rate".
    #[schema(value_type = Object)]
    pub fx_rate: Option<Value>,
}

impl MakePaymentRequest {
    pub fn into_command(self) -> Result<MakePayment, ValidationError> {
        let beneficiary = sanitize_string(&self.beneficiary);
        validate_max_len("beneficiary", &beneficiary, BENEFICIARY_MAX_LEN)?;

        let fx_rate = match self.fx_rate {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                rate_from_json(&raw)
                    .filter(is_positive)
                    .ok_or_else(|| ValidationError::new("fxRate", "Invalid fxRate"))?,
            ),
        };

        Ok(MakePayment {
            beneficiary,
            amount: parse_amount(self.amount.as_ref())?,
            fee: parse_fee(self.fee.as_ref())?,
            source_currency: self.source_wallet,
            destination_currency: self.destination_currency,
            fx_rate,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FundWalletRequest {
    pub wallet_id: Option<String>,
    #[schema(value_type = Object)]
    pub amount: Option<Value>,
    pub funding_account: Option<String>,
}

impl FundWalletRequest {
    pub fn into_command(self) -> Result<FundWallet, ValidationError> {
        Ok(FundWallet {
            wallet_id: parse_wallet_id(&self.wallet_id)?,
            amount: parse_amount(self.amount.as_ref())?,
            funding_account: optional_text("fundingAccount", self.funding_account, REFERENCE_MAX_LEN)?,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub wallet_id: Option<String>,
    #[schema(value_type = Object)]
    pub amount: Option<Value>,
    pub recipient: Option<String>,
}

impl WithdrawRequest {
    pub fn into_command(self) -> Result<WithdrawFromWallet, ValidationError> {
        Ok(WithdrawFromWallet {
            wallet_id: parse_wallet_id(&self.wallet_id)?,
            amount: parse_amount(self.amount.as_ref())?,
            recipient: optional_text("recipient", self.recipient, REFERENCE_MAX_LEN)?,
        })
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    /// PAYMENT, FUND or WITHDRAW (any case).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (inclusive through the end of that day).
    pub end_date: Option<String>,
}

impl TransactionQuery {
    pub fn into_filter(self) -> Result<TransactionFilter, ValidationError> {
        let kind = non_empty(self.kind)
            .map(|raw| {
                raw.parse::<TransactionType>()
                    .map_err(|_| ValidationError::new("type", format!("Invalid type: {}", raw)))
            })
            .transpose()?;
        let status = non_empty(self.status)
            .map(|raw| {
                raw.parse::<TransactionStatus>()
                    .map_err(|_| ValidationError::new("status", format!("Invalid status: {}", raw)))
            })
            .transpose()?;
        let start = non_empty(self.start_date)
            .map(|raw| parse_date("startDate", &raw, NaiveTime::MIN))
            .transpose()?;
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        let end = non_empty(self.end_date)
            .map(|raw| parse_date("endDate", &raw, end_of_day))
            .transpose()?;

        Ok(TransactionFilter {
            kind,
            status,
            start,
            end,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Bare dates are pinned to `time_of_day` in UTC.
fn parse_date(field: &'static str, raw: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(time_of_day).and_utc())
        .map_err(|_| ValidationError::new(field, format!("Invalid {}", field)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RatesQuery {
    /// Defaults to USD.
    pub base: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertQuery {
    pub amount: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

pub struct ConvertCommand {
    pub amount: BigDecimal,
    pub from: String,
    pub to: String,
}

impl ConvertQuery {
    pub fn into_command(self) -> Result<ConvertCommand, ValidationError> {
        let amount = self.amount.map(Value::String);
        let from = non_empty(self.from).ok_or_else(|| ValidationError::new("from", "from is required"))?;
        let to = non_empty(self.to).ok_or_else(|| ValidationError::new("to", "to is required"))?;
        Ok(ConvertCommand {
            amount: parse_amount(amount.as_ref())?,
            from: from.to_uppercase(),
            to: to.to_uppercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn amounts_accept_numbers_and_numeric_strings() {
        assert_eq!(parse_amount(Some(&json!(12.5))).unwrap(), dec("12.5"));
        assert_eq!(parse_amount(Some(&json!(" 7 "))).unwrap(), dec("7"));
        for bad in [json!(0), json!(-1), json!("abc"), json!(null), json!(true)] {
            assert_eq!(parse_amount(Some(&bad)).unwrap_err().message, "Invalid amount");
        }
        assert!(parse_amount(None).is_err());
    }

    #[test]
    fn fee_defaults_to_zero_and_rejects_negatives() {
        assert_eq!(parse_fee(None).unwrap(), dec("0"));
        assert_eq!(parse_fee(Some(&json!(0))).unwrap(), dec("0"));
        assert_eq!(parse_fee(Some(&json!(-1))).unwrap_err().message, "Invalid fee");
    }

    #[test]
    fn sub_cent_and_unbounded_values_are_rejected() {
        for bad in [json!("0.001"), json!("1e-200000000"), json!("1e200000000"), json!(0.005)] {
            assert_eq!(parse_amount(Some(&bad)).unwrap_err().message, "Invalid amount");
        }
        assert_eq!(parse_fee(Some(&json!("0.0001"))).unwrap_err().message, "Invalid fee");
        assert_eq!(parse_fee(Some(&json!("0.50"))).unwrap(), dec("0.5"));
    }

    #[test]
    fn payment_request_builds_command() {
        let request: MakePaymentRequest = serde_json::from_value(json!({
            "beneficiary": "  Jane\tDoe ",
            "amount": "100",
            "fee": 5,
            "sourceWallet": "usd",
            "destinationCurrency": "EUR",
            "fxRate": "1.2"
        }))
        .unwrap();

        let command = request.into_command().unwrap();
        assert_eq!(command.beneficiary, "Jane Doe");
        assert_eq!(command.amount, dec("100"));
        assert_eq!(command.fee, dec("5"));
        assert_eq!(command.fx_rate, Some(dec("1.2")));
        assert_eq!(command.source_currency, "usd");
    }

    #[test]
    fn payment_request_accepts_legacy_source_field() {
        let request: MakePaymentRequest = serde_json::from_value(json!({
            "beneficiary": "Jane",
            "amount": 10,
            "sourceCurrency": "GBP",
            "destinationCurrency": "EUR"
        }))
        .unwrap();
        assert_eq!(request.into_command().unwrap().source_currency, "GBP");
    }

    #[test]
    fn payment_request_rejects_unrepresentable_fx_rate() {
        let request: MakePaymentRequest = serde_json::from_value(json!({
            "beneficiary": "Jane",
            "amount": 10,
            "sourceWallet": "USD",
            "destinationCurrency": "EUR",
            "fxRate": "1e-200000000"
        }))
        .unwrap();
        assert_eq!(request.into_command().unwrap_err().message, "Invalid fxRate");
    }

    #[test]
    fn payment_request_rejects_bad_fx_rate() {
        let request: MakePaymentRequest = serde_json::from_value(json!({
            "beneficiary": "Jane",
            "amount": 10,
            "sourceWallet": "USD",
            "destinationCurrency": "EUR",
            "fxRate": 0
        }))
        .unwrap();
        assert_eq!(request.into_command().unwrap_err().message, "Invalid fxRate");
    }

    #[test]
    fn wallet_requests_require_a_uuid() {
        let request: FundWalletRequest =
            serde_json::from_value(json!({ "walletId": "nope", "amount": 5 })).unwrap();
        assert_eq!(request.into_command().unwrap_err().field, "walletId");

        let id = Uuid::new_v4();
        let request: WithdrawRequest = serde_json::from_value(
            json!({ "walletId": id.to_string(), "amount": "5", "recipient": " " }),
        )
        .unwrap();
        let command = request.into_command().unwrap();
        assert_eq!(command.wallet_id, id);
        assert_eq!(command.recipient, None);
    }

    #[test]
    fn transaction_query_parses_filters_case_insensitively() {
        let filter = TransactionQuery {
            kind: Some("payment".to_string()),
            status: Some("COMPLETED".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.kind, Some(TransactionType::Payment));
        assert_eq!(filter.status, Some(TransactionStatus::Completed));
        assert_eq!(filter.start.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(
            filter.end.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-31 23:59:59"
        );
    }

    #[test]
    fn transaction_query_rejects_unknown_labels() {
        let err = TransactionQuery {
            kind: Some("refund".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert_eq!(err.field, "type");

        let err = TransactionQuery {
            start_date: Some("yesterday".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert_eq!(err.field, "startDate");
    }

    #[test]
    fn convert_query_uppercases_codes() {
        let command = ConvertQuery {
            amount: Some("10".to_string()),
            from: Some("usd".to_string()),
            to: Some("eur".to_string()),
        }
        .into_command()
        .unwrap();
        assert_eq!(command.from, "USD");
        assert_eq!(command.to, "EUR");
        assert_eq!(command.amount, dec("10"));
    }
}
