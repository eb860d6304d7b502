//! Decimal helpers shared by the ledger and the FX resolver.

use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Number of decimal places carried by settled amounts.
pub const MONEY_SCALE: i64 = 2;

/// Decimal places kept on exchange rates (`NUMERIC(24, 10)`).
pub const RATE_SCALE: i64 = 10;

/// Integer digits a stored amount may carry (`NUMERIC(20, 2)`).
const MONEY_INTEGER_DIGITS: u32 = 18;

/// Integer digits a stored rate may carry (`NUMERIC(24, 10)`).
const RATE_INTEGER_DIGITS: u32 = 14;

/// Longest textual number accepted from a caller. Together with
/// [`MAX_INPUT_EXPONENT`] this keeps every later multiplication and rescale
/// small.
const MAX_INPUT_LEN: usize = 40;

/// Largest `|scale|` accepted from a caller, so `1e-200000000` is rejected
/// before it can be rescaled.
const MAX_INPUT_EXPONENT: i64 = 32;

/// Rounds half-up to two decimal places and pins the scale so that
/// `120` renders as `120.00`.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(MONEY_SCALE).with_scale(MONEY_SCALE)
}

pub fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

pub fn is_positive(value: &BigDecimal) -> bool {
    value > &zero()
}

pub fn is_negative(value: &BigDecimal) -> bool {
    value < &zero()
}

/// Converts a float through its shortest decimal representation, so `0.92`
/// becomes exactly `0.92`. Returns `None` for NaN and infinities.
pub fn decimal_from_f64(value: f64) -> Option<BigDecimal> {
    if !value.is_finite() {
        return None;
    }
    BigDecimal::from_str(&value.to_string()).ok()
}

/// Coerces a loosely typed JSON value (number or numeric string) into a
/// decimal. Over-long input and extreme exponents yield `None`.
pub fn decimal_from_json(value: &serde_json::Value) -> Option<BigDecimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if text.is_empty() || text.len() > MAX_INPUT_LEN {
        return None;
    }

    let parsed = BigDecimal::from_str(&text).ok()?;
    let (_, scale) = parsed.as_bigint_and_exponent();
    if scale.abs() > MAX_INPUT_EXPONENT {
        return None;
    }
    Some(parsed)
}

/// True when `value` fits `scale` decimal places and `integer_digits`
/// integer digits without rounding.
fn fits(value: &BigDecimal, scale: i64, integer_digits: u32) -> bool {
    let limit = BigDecimal::from(10u64.pow(integer_digits));
    value.with_scale(scale) == *value && value.abs() < limit
}

/// A money amount: at most two decimal places and within the ledger's range.
pub fn money_from_json(value: &serde_json::Value) -> Option<BigDecimal> {
    decimal_from_json(value).filter(|d| fits(d, MONEY_SCALE, MONEY_INTEGER_DIGITS))
}

/// An exchange rate within the precision the ledger stores.
pub fn rate_from_json(value: &serde_json::Value) -> Option<BigDecimal> {
    decimal_from_json(value).filter(|d| fits(d, RATE_SCALE, RATE_INTEGER_DIGITS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_up_to_cents() {
        assert_eq!(round_money(&dec("120")).to_string(), "120.00");
        assert_eq!(round_money(&dec("1.005")).to_string(), "1.01");
        assert_eq!(round_money(&dec("1.004")).to_string(), "1.00");
        assert_eq!(round_money(&(dec("100") * dec("1.2"))).to_string(), "120.00");
    }

    #[test]
    fn converts_finite_floats_exactly() {
        assert_eq!(decimal_from_f64(0.92), Some(dec("0.92")));
        assert_eq!(decimal_from_f64(1320.0), Some(dec("1320")));
        assert_eq!(decimal_from_f64(f64::NAN), None);
        assert_eq!(decimal_from_f64(f64::INFINITY), None);
    }

    #[test]
    fn coerces_numbers_and_numeric_strings() {
        assert_eq!(decimal_from_json(&json!(100)), Some(dec("100")));
        assert_eq!(decimal_from_json(&json!(12.5)), Some(dec("12.5")));
        assert_eq!(decimal_from_json(&json!(" 7.25 ")), Some(dec("7.25")));
        assert_eq!(decimal_from_json(&json!("abc")), None);
        assert_eq!(decimal_from_json(&json!("")), None);
        assert_eq!(decimal_from_json(&json!(null)), None);
        assert_eq!(decimal_from_json(&json!(true)), None);
    }

    #[test]
    fn rejects_extreme_exponents_without_expanding_them() {
        assert_eq!(decimal_from_json(&json!("1e-200000000")), None);
        assert_eq!(decimal_from_json(&json!("1e200000000")), None);
        assert_eq!(decimal_from_json(&json!("1e-3000000")), None);
        assert_eq!(decimal_from_json(&json!(1e-300)), None);
        assert_eq!(decimal_from_json(&json!("9".repeat(41))), None);
        assert_eq!(decimal_from_json(&json!("1e3")), Some(dec("1000")));
    }

    #[test]
    fn money_allows_two_decimal_places() {
        assert_eq!(money_from_json(&json!("10.25")), Some(dec("10.25")));
        assert_eq!(money_from_json(&json!("10.250")), Some(dec("10.25")));
        assert_eq!(money_from_json(&json!(0.1)), Some(dec("0.1")));
        assert_eq!(money_from_json(&json!("0.001")), None);
        assert_eq!(money_from_json(&json!("0.0001")), None);
        assert_eq!(money_from_json(&json!("1e-5")), None);
        assert_eq!(money_from_json(&json!("999999999999999999.99")), Some(dec("999999999999999999.99")));
        assert_eq!(money_from_json(&json!("1e18")), None);
    }

    #[test]
    fn rates_keep_ten_decimal_places() {
        assert_eq!(rate_from_json(&json!(1.2)), Some(dec("1.2")));
        assert_eq!(rate_from_json(&json!("0.0000000001")), Some(dec("0.0000000001")));
        assert_eq!(rate_from_json(&json!("0.00000000001")), None);
        assert_eq!(rate_from_json(&json!("1e14")), None);
    }
}
