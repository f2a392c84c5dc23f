//! Slot definitions
//!
//! A [`SlotSpec`] describes one piece of information a task needs: its
//! dotted id, display label, validation rule and suggestions. The value type
//! is derived from the [`SlotRule`], so the two can never disagree.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::value::{self, Rejection, SlotValue};

/// Value type of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotType {
    String,
    Number,
    Date,
    Enum,
    Currency,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Date => "DATE",
            Self::Enum => "ENUM",
            Self::Currency => "CURRENCY",
        };
        write!(f, "{}", name)
    }
}

/// Validation rule for a slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotRule {
    /// Non-empty text
    Text,
    /// Finite number, optionally bounded (inclusive); `integer` rejects fractions
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    /// `YYYY-MM-DD`; `future_only` rejects dates before today
    Date { future_only: bool },
    /// One of a closed set of options (case-insensitive)
    Enum { options: Vec<String> },
    /// Amount plus a three-letter currency code
    Currency,
}

impl SlotRule {
    pub fn slot_type(&self) -> SlotType {
        match self {
            Self::Text => SlotType::String,
            Self::Number { .. } => SlotType::Number,
            Self::Date { .. } => SlotType::Date,
            Self::Enum { .. } => SlotType::Enum,
            Self::Currency => SlotType::Currency,
        }
    }
}

/// Definition of a single slot within a template
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSpec {
    /// Dotted path, unique within a template (e.g. `trip.origin`)
    pub id: String,
    /// Human-readable name
    pub label: String,
    pub rule: SlotRule,
    pub required: bool,
    /// Example or candidate values offered with the question
    pub suggestions: Vec<String>,
    /// Why the information is needed
    pub reason: Option<String>,
}

impl SlotSpec {
    fn new(id: &str, label: &str, rule: SlotRule) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            rule,
            required: true,
            suggestions: Vec::new(),
            reason: None,
        }
    }

    pub fn text(id: &str, label: &str) -> Self {
        Self::new(id, label, SlotRule::Text)
    }

    pub fn number(id: &str, label: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(
            id,
            label,
            SlotRule::Number {
                min,
                max,
                integer: false,
            },
        )
    }

    pub fn date(id: &str, label: &str, future_only: bool) -> Self {
        Self::new(id, label, SlotRule::Date { future_only })
    }

    pub fn choice(id: &str, label: &str, options: &[&str]) -> Self {
        let options = options.iter().map(|o| o.to_string()).collect();
        Self::new(id, label, SlotRule::Enum { options })
    }

    pub fn currency(id: &str, label: &str) -> Self {
        Self::new(id, label, SlotRule::Currency)
    }

    /// Accept whole numbers only; no effect on other rules
    pub fn whole_number(mut self) -> Self {
        if let SlotRule::Number { integer, .. } = &mut self.rule {
            *integer = true;
        }
        self
    }

    /// Mark the slot optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn slot_type(&self) -> SlotType {
        self.rule.slot_type()
    }

    /// Validate raw input against this slot's rule
    ///
    /// Pure: the only outside input is `today`, used by future-only dates.
    pub fn validate(&self, raw: &str, today: NaiveDate) -> Result<SlotValue, Rejection> {
        debug!(slot_id = %self.id, slot_type = %self.slot_type(), "SlotSpec::validate: called");
        match &self.rule {
            SlotRule::Text => value::parse_text(raw),
            SlotRule::Number { min, max, integer } => value::parse_number(raw, *min, *max, *integer),
            SlotRule::Date { future_only } => value::parse_date(raw, *future_only, today),
            SlotRule::Enum { options } => value::parse_choice(raw, options),
            SlotRule::Currency => value::parse_currency(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RejectionCode;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn test_builders() {
        let slot = SlotSpec::currency("trip.budget", "Budget")
            .optional()
            .with_suggestions(&["500 USD"])
            .with_reason("To stay within budget");

        assert_eq!(slot.slot_type(), SlotType::Currency);
        assert!(!slot.required);
        assert_eq!(slot.suggestions, vec!["500 USD"]);
        assert_eq!(slot.reason.as_deref(), Some("To stay within budget"));
    }

    #[test]
    fn test_validate_dispatches_by_rule() {
        let passengers = SlotSpec::number("trip.passengers", "Passengers", Some(1.0), Some(9.0));
        assert!(passengers.validate("3", today()).is_ok());
        assert_eq!(
            passengers.validate("0", today()).unwrap_err().code,
            RejectionCode::OutOfRange
        );

        let departure = SlotSpec::date("trip.departure_date", "Departure Date", true);
        assert_eq!(
            departure.validate("2024-12-31", today()).unwrap_err().code,
            RejectionCode::DateInPast
        );

        let cabin = SlotSpec::choice("trip.cabin_class", "Cabin Class", &["Economy", "First"]);
        assert_eq!(
            cabin.validate("first", today()).unwrap(),
            SlotValue::Choice {
                value: "First".to_string()
            }
        );
    }

    #[test]
    fn test_whole_number_rejects_fractions() {
        let passengers = SlotSpec::number("trip.passengers", "Passengers", Some(1.0), Some(9.0)).whole_number();
        let rejection = passengers.validate("2.5", today()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::NotANumber);
        assert!(rejection.message.contains("whole number"));
        assert_eq!(passengers.validate("2.0", today()).unwrap(), SlotValue::Number { value: 2.0 });

        let amount = SlotSpec::number("order.weight", "Weight", None, None);
        assert_eq!(amount.validate("2.5", today()).unwrap(), SlotValue::Number { value: 2.5 });

        // Only number rules take the flag
        assert_eq!(SlotSpec::text("a.b", "Text").whole_number().rule, SlotRule::Text);
    }

    #[test]
    fn test_slot_type_serializes_screaming() {
        assert_eq!(serde_json::to_string(&SlotType::Currency).unwrap(), "\"CURRENCY\"");
        assert_eq!(SlotType::Date.to_string(), "DATE");
    }
}
