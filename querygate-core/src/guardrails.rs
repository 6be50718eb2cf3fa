//! Input guardrails.
//!
//! Every check here runs before the backend is touched. A failed check is a
//! [`QueryGateError::Rejected`] and is never retried.
//!
//! # Security Guarantees
//! - Index identifiers are restricted to a conservative character set, which
//!   blocks path traversal and URL injection through resource names
//! - Query bodies are scanned lexically for write and scripting keywords
//! - Index access is limited to a configured allow-list of glob patterns

use crate::{Result, error::QueryGateError};
use serde_json::Value;

/// Substrings that mark a query body as mutating or scripting.
///
/// Matched against the lower-cased serialized body, first entry wins.
pub const FORBIDDEN_QUERY_KEYWORDS: &[&str] = &[
    "script",
    "painless",
    "_update",
    "_delete",
    "_bulk",
    "_reindex",
    "_create",
    "update_by_query",
    "delete_by_query",
];

fn is_safe_index_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '*' | ',' | '_')
}

/// Validates an index name or pattern.
///
/// Accepts ASCII letters, digits, `-`, `.`, `*`, `,` and `_`.
///
/// # Errors
/// Returns a rejection naming the identifier if it is empty or contains any
/// other character.
///
/// # Example
/// ```rust
/// use querygate_core::guardrails::validate_index_name;
///
/// assert!(validate_index_name("logs-2024.*,metrics-*").is_ok());
/// assert!(validate_index_name("../etc/passwd").is_err());
/// ```
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(QueryGateError::rejected("Index name cannot be empty"));
    }

    if let Some(bad) = name.chars().find(|c| !is_safe_index_char(*c)) {
        return Err(QueryGateError::rejected(format!(
            "Invalid index name: '{}' contains disallowed character {:?}",
            name, bad
        )));
    }

    Ok(())
}

/// Rejects query bodies containing write or scripting keywords.
///
/// The body is serialized and lower-cased, then scanned as untrusted text:
/// a keyword is found wherever it appears, keys and values alike. Data values
/// that happen to contain a keyword are rejected too.
///
/// # Errors
/// Returns a rejection naming the first forbidden keyword found.
pub fn validate_read_only_query(body: &Value) -> Result<()> {
    let text = serde_json::to_string(body)
        .map_err(|e| QueryGateError::serialization("query body", e))?
        .to_lowercase();

    if let Some(keyword) = FORBIDDEN_QUERY_KEYWORDS
        .iter()
        .find(|keyword| text.contains(*keyword))
    {
        return Err(QueryGateError::rejected(format!(
            "Query contains forbidden operation '{}'; only read-only queries are allowed",
            keyword
        )));
    }

    Ok(())
}

/// Case-sensitive glob match where `*` matches any run of characters.
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();

    let (mut pi, mut ci) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ci < c.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            pi = pi.saturating_add(1);
            resume = ci;
        } else if pi < p.len() && p[pi] == c[ci] {
            pi = pi.saturating_add(1);
            ci = ci.saturating_add(1);
        } else if let Some(star_at) = star {
            pi = star_at.saturating_add(1);
            resume = resume.saturating_add(1);
            ci = resume;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|ch| *ch == '*')
}

/// Checks an index name against the allow-list.
///
/// An empty allow-list means access is unrestricted. Comma-separated
/// multi-target names are checked component by component; every component
/// must match at least one pattern.
///
/// # Errors
/// Returns a rejection naming the first component outside the allow-list.
pub fn check_index_access(name: &str, allowed_patterns: &[String]) -> Result<()> {
    if allowed_patterns.is_empty() {
        return Ok(());
    }

    for component in name.split(',') {
        let allowed = allowed_patterns
            .iter()
            .any(|pattern| glob_matches(pattern, component));

        if !allowed {
            return Err(QueryGateError::rejected(format!(
                "Access to index '{}' is not allowed. Allowed patterns: {}",
                component,
                allowed_patterns.join(", ")
            )));
        }
    }

    Ok(())
}

/// Runs both identifier checks in order: character set, then allow-list.
///
/// # Errors
/// Returns the first rejection encountered.
pub fn validate_index_target(name: &str, allowed_patterns: &[String]) -> Result<()> {
    validate_index_name(name)?;
    check_index_access(name, allowed_patterns)
}
