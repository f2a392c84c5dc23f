//! Validated slot values and rejection reasons

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Fixed date format accepted by DATE slots
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static CURRENCY_AMOUNT_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*([A-Za-z]{3})$").unwrap());
static CURRENCY_CODE_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{3})\s*(\d+(?:\.\d+)?)$").unwrap());

/// A validated slot value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotValue {
    Text { value: String },
    Number { value: f64 },
    Date { value: NaiveDate },
    Choice { value: String },
    Currency { amount: f64, code: String },
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { value } | Self::Choice { value } => write!(f, "{}", value),
            Self::Number { value } => write!(f, "{}", format_number(*value)),
            Self::Date { value } => write!(f, "{}", value.format(DATE_FORMAT)),
            Self::Currency { amount, code } => write!(f, "{} {}", format_number(*amount), code),
        }
    }
}

/// Machine-readable rejection code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    EmptyValue,
    NotANumber,
    OutOfRange,
    InvalidFormat,
    DateInPast,
    NotInEnum,
    InvalidCurrencyFormat,
}

impl RejectionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyValue => "empty_value",
            Self::NotANumber => "not_a_number",
            Self::OutOfRange => "out_of_range",
            Self::InvalidFormat => "invalid_format",
            Self::DateInPast => "date_in_past",
            Self::NotInEnum => "not_in_enum",
            Self::InvalidCurrencyFormat => "invalid_currency_format",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an answer was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct Rejection {
    pub code: RejectionCode,
    pub message: String,
    /// Allowed options, echoed back for ENUM rejections
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Rejection {
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            options: Vec::new(),
        }
    }
}

/// Render a number without a trailing `.0` when it is integral
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

pub(crate) fn parse_text(raw: &str) -> Result<SlotValue, Rejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Rejection::new(RejectionCode::EmptyValue, "empty value"));
    }
    Ok(SlotValue::Text {
        value: trimmed.to_string(),
    })
}

pub(crate) fn parse_number(
    raw: &str,
    min: Option<f64>,
    max: Option<f64>,
    integer: bool,
) -> Result<SlotValue, Rejection> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let value = cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Rejection::new(RejectionCode::NotANumber, format!("'{}' is not a number", raw.trim())))?;

    if integer && value.fract() != 0.0 {
        return Err(Rejection::new(
            RejectionCode::NotANumber,
            format!("'{}' is not a whole number", raw.trim()),
        ));
    }

    let below = min.is_some_and(|lo| value < lo);
    let above = max.is_some_and(|hi| value > hi);
    if below || above {
        debug!(value, ?min, ?max, "parse_number: out of range");
        return Err(Rejection::new(RejectionCode::OutOfRange, range_message(min, max)));
    }

    Ok(SlotValue::Number { value })
}

fn range_message(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("must be between {} and {}", format_number(lo), format_number(hi)),
        (Some(lo), None) => format!("must be at least {}", format_number(lo)),
        (None, Some(hi)) => format!("must be at most {}", format_number(hi)),
        (None, None) => "out of range".to_string(),
    }
}

pub(crate) fn parse_date(raw: &str, future_only: bool, today: NaiveDate) -> Result<SlotValue, Rejection> {
    let trimmed = raw.trim();
    let invalid = || Rejection::new(RejectionCode::InvalidFormat, "expected a date in YYYY-MM-DD format");

    if !DATE_SHAPE.is_match(trimmed) {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| invalid())?;

    if future_only && date < today {
        debug!(%date, %today, "parse_date: date in past");
        return Err(Rejection::new(
            RejectionCode::DateInPast,
            format!("{} is in the past; pick {} or later", date.format(DATE_FORMAT), today.format(DATE_FORMAT)),
        ));
    }

    Ok(SlotValue::Date { value: date })
}

pub(crate) fn parse_choice(raw: &str, options: &[String]) -> Result<SlotValue, Rejection> {
    let trimmed = raw.trim();
    match options.iter().find(|opt| opt.eq_ignore_ascii_case(trimmed)) {
        Some(opt) => Ok(SlotValue::Choice { value: opt.clone() }),
        None => Err(Rejection {
            code: RejectionCode::NotInEnum,
            message: format!("'{}' is not one of: {}", trimmed, options.join(", ")),
            options: options.to_vec(),
        }),
    }
}

pub(crate) fn parse_currency(raw: &str) -> Result<SlotValue, Rejection> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();

    let (amount, code) = if let Some(caps) = CURRENCY_AMOUNT_FIRST.captures(&cleaned) {
        (caps[1].to_string(), caps[2].to_string())
    } else if let Some(caps) = CURRENCY_CODE_FIRST.captures(&cleaned) {
        (caps[2].to_string(), caps[1].to_string())
    } else {
        return Err(Rejection::new(
            RejectionCode::InvalidCurrencyFormat,
            "expected an amount and a currency code, e.g. 500 USD",
        ));
    };

    let amount = amount.parse::<f64>().ok().filter(|a| a.is_finite() && *a >= 0.0).ok_or_else(|| {
        Rejection::new(RejectionCode::InvalidCurrencyFormat, "amount must be a non-negative number")
    })?;

    Ok(SlotValue::Currency {
        amount,
        code: code.to_uppercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_text_trims_and_rejects_blank() {
        assert_eq!(
            parse_text("  Paris ").unwrap(),
            SlotValue::Text {
                value: "Paris".to_string()
            }
        );
        let err = parse_text("   ").unwrap_err();
        assert_eq!(err.code, RejectionCode::EmptyValue);
        assert_eq!(err.message, "empty value");
    }

    #[test]
    fn test_number_parsing_and_bounds() {
        assert_eq!(parse_number("2", Some(1.0), Some(9.0), false).unwrap(), SlotValue::Number { value: 2.0 });
        assert_eq!(parse_number("1,500", None, None, false).unwrap(), SlotValue::Number { value: 1500.0 });
        assert_eq!(parse_number("two", None, None, false).unwrap_err().code, RejectionCode::NotANumber);
        assert_eq!(parse_number("NaN", None, None, false).unwrap_err().code, RejectionCode::NotANumber);
        assert_eq!(parse_number("inf", None, None, false).unwrap_err().code, RejectionCode::NotANumber);

        let err = parse_number("12", Some(1.0), Some(9.0), false).unwrap_err();
        assert_eq!(err.code, RejectionCode::OutOfRange);
        assert_eq!(err.message, "must be between 1 and 9");
    }

    #[test]
    fn test_date_format_and_future_only() {
        let today = day("2025-01-10");
        assert_eq!(
            parse_date("2025-01-25", true, today).unwrap(),
            SlotValue::Date {
                value: day("2025-01-25")
            }
        );
        // Today counts as not-in-the-past
        assert!(parse_date("2025-01-10", true, today).is_ok());
        assert_eq!(parse_date("2025-01-09", true, today).unwrap_err().code, RejectionCode::DateInPast);
        assert!(parse_date("2025-01-09", false, today).is_ok());

        for bad in ["01/25/2025", "2025-1-5", "2025-02-30", "tomorrow", "2025-01-25T10:00"] {
            assert_eq!(
                parse_date(bad, false, today).unwrap_err().code,
                RejectionCode::InvalidFormat,
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_choice_is_case_insensitive_and_canonical() {
        let options = vec!["Economy".to_string(), "Business".to_string()];
        assert_eq!(
            parse_choice("business", &options).unwrap(),
            SlotValue::Choice {
                value: "Business".to_string()
            }
        );

        let err = parse_choice("Coach", &options).unwrap_err();
        assert_eq!(err.code, RejectionCode::NotInEnum);
        assert_eq!(err.options, options);
    }

    #[test]
    fn test_currency_forms() {
        let usd = SlotValue::Currency {
            amount: 2000.0,
            code: "USD".to_string(),
        };
        assert_eq!(parse_currency("2000 USD").unwrap(), usd);
        assert_eq!(parse_currency("2,000 usd").unwrap(), usd);
        assert_eq!(parse_currency("USD 2000").unwrap(), usd);
        assert_eq!(parse_currency("2000USD").unwrap(), usd);

        for bad in ["-5 USD", "2000", "USD", "2000 dollars", "lots"] {
            assert_eq!(
                parse_currency(bad).unwrap_err().code,
                RejectionCode::InvalidCurrencyFormat,
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_value_display() {
        assert_eq!(SlotValue::Number { value: 2.0 }.to_string(), "2");
        assert_eq!(SlotValue::Number { value: 2.5 }.to_string(), "2.5");
        assert_eq!(
            SlotValue::Currency {
                amount: 2000.0,
                code: "USD".to_string()
            }
            .to_string(),
            "2000 USD"
        );
    }

    #[test]
    fn test_currency_serializes_tagged() {
        let value = parse_currency("2000 USD").unwrap();
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "currency");
        assert_eq!(json["amount"], 2000.0);
        assert_eq!(json["code"], "USD");
    }
}
