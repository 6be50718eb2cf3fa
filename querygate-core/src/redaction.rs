//! Sensitive data redaction engine.
//!
//! Walks arbitrary JSON result data and masks card numbers, bank account
//! numbers, social security numbers, email addresses and phone numbers.
//!
//! # Security Guarantees
//! - Caller-owned data is never mutated; a fresh copy is always returned
//! - Output is deterministic: identical input yields identical output and counts
//! - Masks contain no characters any detector matches, so redacting an already
//!   redacted value finds nothing new
//!
//! # Example
//! ```rust
//! use querygate_core::redaction::redact;
//! use serde_json::json;
//!
//! let result = redact(&json!({"cc": "4111 1111 1111 1111", "id": 7}));
//! assert_eq!(result.value, json!({"cc": "**** **** **** 1111", "id": 7}));
//! assert_eq!(result.count, 1);
//! assert!(result.categories.contains("credit_card"));
//! ```

mod patterns;

pub use patterns::{
    CREDIT_CARD, EMAIL, IBAN, PHONE, RedactionPattern, SSN, luhn_valid, redaction_patterns,
};

use serde_json::Value;
use std::collections::BTreeSet;

/// Redacted copy of a value plus what was masked.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionResult {
    /// Redacted copy of the input
    pub value: Value,
    /// Number of masked matches
    pub count: usize,
    /// Distinct categories that masked at least one match
    pub categories: BTreeSet<&'static str>,
}

impl RedactionResult {
    /// Result for a value that was not scanned.
    pub fn untouched(value: Value) -> Self {
        Self {
            value,
            count: 0,
            categories: BTreeSet::new(),
        }
    }

    /// Categories as owned strings, in sorted order.
    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(ToString::to_string).collect()
    }
}

#[derive(Default)]
struct Tally {
    count: usize,
    categories: BTreeSet<&'static str>,
}

/// Redacts a JSON value recursively.
///
/// Strings are scanned by every pattern in order, arrays element-wise,
/// objects value-wise with keys preserved. Numbers, booleans and null pass
/// through unchanged.
pub fn redact(value: &Value) -> RedactionResult {
    let mut tally = Tally::default();
    let value = redact_value(value, &mut tally);
    RedactionResult {
        value,
        count: tally.count,
        categories: tally.categories,
    }
}

/// Redacts a single string.
pub fn redact_text(text: &str) -> RedactionResult {
    let mut tally = Tally::default();
    let value = Value::String(redact_str(text, &mut tally));
    RedactionResult {
        value,
        count: tally.count,
        categories: tally.categories,
    }
}

fn redact_value(value: &Value, tally: &mut Tally) -> Value {
    match value {
        Value::String(text) => Value::String(redact_str(text, tally)),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(v, tally)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), redact_value(v, tally)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

fn redact_str(text: &str, tally: &mut Tally) -> String {
    let mut current = text.to_string();
    for pattern in redaction_patterns() {
        let (next, changed) = pattern.apply(&current);
        if changed > 0 {
            tally.count = tally.count.saturating_add(changed);
            tally.categories.insert(pattern.category);
            current = next;
        }
    }
    current
}
