//! Sensitive data detectors and their masking rules.
//!
//! Uses `std::sync::OnceLock` so every regex is compiled exactly once.
//! Patterns run in the order listed by [`redaction_patterns`]; they are
//! assumed not to overlap in practice.

use regex::Regex;
use std::sync::OnceLock;

/// Category label for Luhn-valid payment card numbers
pub const CREDIT_CARD: &str = "credit_card";
/// Category label for international bank account numbers
pub const IBAN: &str = "iban";
/// Category label for US social security numbers
pub const SSN: &str = "ssn";
/// Category label for email addresses
pub const EMAIL: &str = "email";
/// Category label for international phone numbers
pub const PHONE: &str = "phone";

const IBAN_MIN_LENGTH: usize = 15;
const IBAN_MASK: &str = "********";
const EMAIL_MASK: &str = "***";
const PHONE_MIN_DIGITS: usize = 8;
const PHONE_MASK: &str = "******";

/// A named detector: matching rule, masking function and category label.
pub struct RedactionPattern {
    /// Category recorded when this pattern changes a value
    pub category: &'static str,
    regex: Regex,
    /// Returns the masked text, or `None` to leave the match untouched
    mask: fn(&str) -> Option<String>,
}

impl RedactionPattern {
    fn new(category: &'static str, pattern: &str, mask: fn(&str) -> Option<String>) -> Self {
        Self {
            category,
            regex: Regex::new(pattern).expect("Invalid redaction pattern"),
            mask,
        }
    }

    /// Masks every match in `text`, returning the new text and the number of
    /// matches whose masked form differs from the original.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut changed = 0usize;
        let replaced = self.regex.replace_all(text, |caps: &regex::Captures<'_>| {
            let original = &caps[0];
            match (self.mask)(original) {
                Some(masked) if masked != original => {
                    changed = changed.saturating_add(1);
                    masked
                }
                _ => original.to_string(),
            }
        });
        (replaced.into_owned(), changed)
    }
}

impl std::fmt::Debug for RedactionPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactionPattern")
            .field("category", &self.category)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// The fixed, ordered list of detectors.
pub fn redaction_patterns() -> &'static [RedactionPattern] {
    static PATTERNS: OnceLock<Vec<RedactionPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // Standard groupings first (4-4-4-4[-3], 4-6-4/5), then ungrouped
            // 13-19 digits, then any spacing of 13-19 digits
            RedactionPattern::new(
                CREDIT_CARD,
                r"\b(?:\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{4}(?:[ -]\d{3})?|\d{4}[ -]\d{6}[ -]\d{4,5}|\d{13,19}|\d(?:[ -]?\d){12,18})\b",
                mask_card,
            ),
            RedactionPattern::new(IBAN, r"\b[A-Z]{2}\d{2}[A-Z0-9]{4,30}\b", mask_iban),
            RedactionPattern::new(SSN, r"\b\d{3}-\d{2}-\d{4}\b", mask_ssn),
            RedactionPattern::new(
                EMAIL,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                mask_email,
            ),
            RedactionPattern::new(PHONE, r"\+\d[\d ().-]{6,}\d", mask_phone),
        ]
    })
}

/// Luhn checksum over the digits of `number`; other characters are ignored.
pub fn luhn_valid(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();

    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let mut sum = 0u32;
    let mut double = false;

    for &digit in digits.iter().rev() {
        let d = if double {
            let doubled = digit.saturating_mul(2);
            if doubled > 9 { doubled.saturating_sub(9) } else { doubled }
        } else {
            digit
        };
        sum = sum.saturating_add(d);
        double = !double;
    }

    sum % 10 == 0
}

/// `4111 1111 1111 1111` -> `**** **** **** 1111`; non-Luhn numbers are kept.
///
/// When the whole match fails Luhn, the longest prefix ending at a group
/// separator that passes is masked and the trailing groups are kept, so a
/// card followed by an expiry or stray digits is still caught.
fn mask_card(candidate: &str) -> Option<String> {
    if luhn_valid(candidate) {
        return Some(mask_card_digits(candidate));
    }

    candidate
        .char_indices()
        .filter(|(_, c)| !c.is_ascii_digit())
        .map(|(index, _)| index)
        .rev()
        .find_map(|index| {
            let (card, rest) = (candidate.get(..index)?, candidate.get(index..)?);
            luhn_valid(card).then(|| format!("{}{}", mask_card_digits(card), rest))
        })
}

fn mask_card_digits(card: &str) -> String {
    let total = card.chars().filter(char::is_ascii_digit).count();
    let keep_from = total.saturating_sub(4);
    let mut seen = 0usize;

    card.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen = seen.saturating_add(1);
                if seen > keep_from { c } else { '*' }
            } else {
                c
            }
        })
        .collect()
}

/// `DE89370400440532013000` -> `DE89********3000`; short tokens are kept.
fn mask_iban(candidate: &str) -> Option<String> {
    if candidate.len() < IBAN_MIN_LENGTH {
        return None;
    }
    let head = candidate.get(..4)?;
    let tail = candidate.get(candidate.len().saturating_sub(4)..)?;
    Some(format!("{}{}{}", head, IBAN_MASK, tail))
}

fn mask_ssn(candidate: &str) -> Option<String> {
    Some(
        candidate
            .chars()
            .map(|c| if c.is_ascii_digit() { '*' } else { c })
            .collect(),
    )
}

/// `jane.doe@example.com` -> `j***@example.com`
fn mask_email(candidate: &str) -> Option<String> {
    let (local, domain) = candidate.split_once('@')?;
    let first = local.chars().next()?;
    Some(format!("{}{}@{}", first, EMAIL_MASK, domain))
}

/// `+44 7911 123456` -> `+44******56`; fewer than 8 digits are kept.
fn mask_phone(candidate: &str) -> Option<String> {
    let digits: Vec<char> = candidate.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < PHONE_MIN_DIGITS {
        return None;
    }
    let head: String = digits[..2].iter().collect();
    let tail: String = digits[digits.len().saturating_sub(2)..].iter().collect();
    Some(format!("+{}{}{}", head, PHONE_MASK, tail))
}
