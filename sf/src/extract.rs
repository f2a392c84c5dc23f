//! Value extraction
//!
//! An extractor turns free text into a raw candidate the slot validators
//! understand ("tomorrow" becomes "2025-01-02"). It never validates; `None`
//! means "no rewrite", and the raw text goes to validation as typed.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::domain::{DATE_FORMAT, SlotType};

static IN_N_DAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bin\s+(\d{1,3})\s+days?\b").unwrap());
static EMBEDDED_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").unwrap());
static SYMBOL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([$€£])\s*(\d[\d,]*(?:\.\d+)?)").unwrap());
static WORD_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(dollars?|bucks|euros?|pounds?)\b").unwrap()
});

const NUMBER_WORDS: [(&str, u32); 10] = [
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Maps free text to a candidate raw value for a slot type
#[async_trait]
pub trait ValueExtractor: Send + Sync {
    /// `today` anchors relative dates
    async fn extract(&self, raw: &str, expected: SlotType, today: NaiveDate) -> Option<String>;
}

/// Rule-based extractor for common colloquial forms
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExtractor;

/// Extractor that never rewrites input
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

#[async_trait]
impl ValueExtractor for KeywordExtractor {
    async fn extract(&self, raw: &str, expected: SlotType, today: NaiveDate) -> Option<String> {
        let text = raw.trim().to_lowercase();
        let candidate = match expected {
            SlotType::Date => extract_date(&text, today),
            SlotType::Number => extract_number(&text),
            SlotType::Currency => extract_currency(raw.trim()),
            SlotType::String | SlotType::Enum => None,
        };
        debug!(%expected, ?candidate, "KeywordExtractor::extract: done");
        // A rewrite to the same text is no rewrite
        candidate.filter(|c| c != raw.trim())
    }
}

#[async_trait]
impl ValueExtractor for PassthroughExtractor {
    async fn extract(&self, _raw: &str, _expected: SlotType, _today: NaiveDate) -> Option<String> {
        None
    }
}

fn extract_date(text: &str, today: NaiveDate) -> Option<String> {
    let date = match text {
        "today" | "now" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        "yesterday" => today.checked_sub_days(Days::new(1)),
        "next week" => today.checked_add_days(Days::new(7)),
        _ => {
            if let Some(caps) = IN_N_DAYS.captures(text) {
                let n: u64 = caps[1].parse().ok()?;
                today.checked_add_days(Days::new(n))
            } else if let Some(caps) = EMBEDDED_DATE.captures(text) {
                return Some(caps[1].to_string());
            } else {
                None
            }
        }
    };
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn extract_number(text: &str) -> Option<String> {
    if let Some((_, n)) = NUMBER_WORDS.iter().find(|(word, _)| *word == text) {
        return Some(n.to_string());
    }

    let numbers: Vec<&str> = NUMBER.find_iter(text).map(|m| m.as_str()).collect();
    match numbers.as_slice() {
        [only] => Some(only.to_string()),
        [] => text
            .split_whitespace()
            .find_map(|w| NUMBER_WORDS.iter().find(|(word, _)| *word == w))
            .map(|(_, n)| n.to_string()),
        _ => None,
    }
}

fn extract_currency(text: &str) -> Option<String> {
    if let Some(caps) = SYMBOL_AMOUNT.captures(text) {
        let code = match &caps[1] {
            "$" => "USD",
            "€" => "EUR",
            _ => "GBP",
        };
        return Some(format!("{} {}", caps[2].replace(',', ""), code));
    }
    if let Some(caps) = WORD_AMOUNT.captures(text) {
        let word = caps[2].to_lowercase();
        let code = if word.starts_with("euro") {
            "EUR"
        } else if word.starts_with("pound") {
            "GBP"
        } else {
            "USD"
        };
        return Some(format!("{} {}", caps[1].replace(',', ""), code));
    }
    None
}
