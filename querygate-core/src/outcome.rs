//! Operation outcome returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one pipeline invocation.
///
/// Serialized as `{"status": "success", "data": ..., "total"?, "aggregations"?}`
/// or `{"status": "error", "error": "..."}`. The `status` tag is the only
/// discriminant; a failure never carries data and a success never carries an
/// error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Outcome {
    /// The operation completed and produced data
    #[serde(rename = "success")]
    Success {
        /// Operation payload
        data: Value,
        /// Total hit count reported by the backend
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        /// Aggregation results reported by the backend
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aggregations: Option<Value>,
    },
    /// The operation failed; `error` is safe to show to the caller
    #[serde(rename = "error")]
    Failure {
        /// Caller-facing failure description
        error: String,
    },
}

impl Outcome {
    /// Success carrying only a payload.
    pub fn success(data: Value) -> Self {
        Self::Success {
            data,
            total: None,
            aggregations: None,
        }
    }

    /// Failure with a caller-facing message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Audit status label for this outcome.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "error",
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }

    /// Size in bytes of the serialized outcome.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_serialization_omits_absent_fields() {
        let outcome = Outcome::success(json!([{"message": "ok"}]));
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value, json!({"status": "success", "data": [{"message": "ok"}]}));
    }

    #[test]
    fn test_success_with_total_and_aggregations() {
        let outcome = Outcome::Success {
            data: json!([]),
            total: Some(42),
            aggregations: Some(json!({"by_host": {"buckets": []}})),
        };
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["total"], 42);
        assert_eq!(value["aggregations"]["by_host"]["buckets"], json!([]));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_serialization() {
        let outcome = Outcome::failure("index_not_found_exception");
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(
            value,
            json!({"status": "error", "error": "index_not_found_exception"})
        );
        assert_eq!(outcome.status_label(), "error");
        assert_eq!(outcome.error_message(), Some("index_not_found_exception"));
    }

    #[test]
    fn test_outcome_roundtrip_preserves_tag() {
        let raw = json!({"status": "success", "data": {"count": 3}, "total": 3});
        let outcome: Outcome = serde_json::from_value(raw).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.status_label(), "success");
        assert!(outcome.serialized_len() > 0);
    }
}
