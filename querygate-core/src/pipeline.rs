//! Secure pipeline orchestrator.
//!
//! Wraps one unit of operation logic in a fixed execution order:
//!
//! 1. record the start time
//! 2. run the logic, turning errors and panics into [`Outcome::Failure`]
//! 3. redact a successful outcome (when enabled)
//! 4. build the audit entry
//! 5. emit it (when enabled)
//! 6. return the outcome
//!
//! Every exit path reaches step 6, so redaction always precedes the caller
//! seeing data, and an audit entry is emitted for failures as well.

use crate::{
    Result,
    audit::{AuditEntry, AuditLogger},
    config::ServerConfig,
    outcome::Outcome,
    redaction::{RedactionResult, redact},
};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

/// Message used when a failure carries no usable text
pub const FALLBACK_ERROR_MESSAGE: &str = "Unknown error occurred";

/// Orchestrates operation logic, redaction and auditing.
#[derive(Debug, Clone)]
pub struct SecurePipeline {
    redaction_enabled: bool,
    audit: AuditLogger,
}

impl SecurePipeline {
    /// Creates a pipeline with explicit switches.
    pub fn new(redaction_enabled: bool, audit: AuditLogger) -> Self {
        Self {
            redaction_enabled,
            audit,
        }
    }

    /// Creates a pipeline honoring the configured redaction switch.
    pub fn from_config(config: &ServerConfig, audit: AuditLogger) -> Self {
        Self::new(config.redaction_enabled, audit)
    }

    /// Runs `logic` for `tool` and returns its redacted outcome.
    ///
    /// Never fails: errors and panics raised by `logic` come back as
    /// [`Outcome::Failure`].
    pub async fn execute<F, Fut>(&self, tool: &str, params: &Value, logic: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Outcome>>,
    {
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(async move { logic().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                tracing::debug!(tool, "Operation failed: {}", error);
                Outcome::failure(non_empty_or_fallback(error.caller_message()))
            }
            Err(panic) => {
                tracing::error!(tool, "Operation panicked");
                Outcome::failure(non_empty_or_fallback(panic_message(panic.as_ref())))
            }
        };

        let (outcome, redaction) = self.redact_outcome(outcome);

        let elapsed = started.elapsed();
        let entry = AuditEntry::new(
            tool,
            params,
            &outcome,
            redaction.count,
            redaction.category_names(),
            elapsed,
        );
        self.audit.record(&entry).await;

        tracing::info!(
            tool,
            status = outcome.status_label(),
            redactions = redaction.count,
            elapsed_ms = entry.execution_time_ms,
            "Operation completed"
        );

        outcome
    }

    /// Redacts `data` and `aggregations` of a success.
    ///
    /// The returned result carries the combined count and categories; its
    /// `value` is unused.
    fn redact_outcome(&self, outcome: Outcome) -> (Outcome, RedactionResult) {
        match outcome {
            Outcome::Success {
                data,
                total,
                aggregations,
            } if self.redaction_enabled => {
                let mut data_result = redact(&data);
                let aggregations = aggregations.map(|aggs| {
                    let aggs_result = redact(&aggs);
                    data_result.count = data_result.count.saturating_add(aggs_result.count);
                    data_result.categories.extend(aggs_result.categories);
                    aggs_result.value
                });
                let redacted = Outcome::Success {
                    data: std::mem::take(&mut data_result.value),
                    total,
                    aggregations,
                };
                (redacted, data_result)
            }
            Outcome::Success { .. } | Outcome::Failure { .. } => {
                (outcome, RedactionResult::untouched(Value::Null))
            }
        }
    }
}

fn non_empty_or_fallback(message: String) -> String {
    if message.trim().is_empty() {
        FALLBACK_ERROR_MESSAGE.to_string()
    } else {
        message
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    }
}
