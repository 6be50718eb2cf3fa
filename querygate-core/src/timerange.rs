//! Time-range merging for search bodies.
//!
//! Injects a `range` filter on a timestamp field into an arbitrary search body
//! without disturbing the clauses or top-level keys already present.
//!
//! Merging is additive: applying it twice yields two range filters, so callers
//! apply it at most once per request.

use crate::{Result, error::QueryGateError};
use serde_json::{Map, Value, json};

/// Timestamp field targeted by [`merge_time_range`]
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

/// Structural shape of a search body's `query` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// `query` holds a `bool` clause
    HasBoolClause,
    /// `query` holds some other clause
    HasOtherClause,
    /// The body has no `query`
    NoClause,
}

/// Classifies a search body by the presence of known keys.
pub fn classify_query(body: &Value) -> QueryShape {
    match body.get("query") {
        None | Some(Value::Null) => QueryShape::NoClause,
        Some(query) if query.get("bool").is_some() => QueryShape::HasBoolClause,
        Some(_) => QueryShape::HasOtherClause,
    }
}

/// Builds the range filter bounded by `since` and `now`.
pub fn range_filter(field: &str, since: &str) -> Value {
    json!({
        "range": {
            field: {
                "gte": since,
                "lte": "now"
            }
        }
    })
}

/// Merges a `@timestamp` range filter into `body`.
///
/// # Errors
/// See [`merge_time_range_on`].
///
/// # Example
/// ```rust
/// use querygate_core::timerange::merge_time_range;
/// use serde_json::json;
///
/// let merged = merge_time_range(json!({"query": {"match_all": {}}, "size": 5}), "now-1h")?;
/// assert_eq!(merged["size"], 5);
/// assert_eq!(merged["query"]["bool"]["must"], json!([{"match_all": {}}]));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn merge_time_range(body: Value, since: &str) -> Result<Value> {
    merge_time_range_on(body, DEFAULT_TIMESTAMP_FIELD, since)
}

/// Merges a range filter on `field` into `body`.
///
/// - `bool` query: the filter is appended to `bool.filter`, which is created
///   when absent or null and normalized to a list when it holds one clause
/// - other query: the clause becomes `bool.must` next to the new filter
/// - no query: a `bool` clause holding only the filter is created
///
/// # Errors
/// Rejects bodies that are not JSON objects, a `query` that is not an object,
/// a `bool` that is not an object, and a `filter` slot holding a scalar.
pub fn merge_time_range_on(body: Value, field: &str, since: &str) -> Result<Value> {
    let shape = classify_query(&body);
    let Value::Object(mut root) = body else {
        return Err(QueryGateError::rejected("Query body must be a JSON object"));
    };
    let filter = range_filter(field, since);

    let merged_query = match shape {
        QueryShape::NoClause => json!({ "bool": { "filter": [filter] } }),
        QueryShape::HasOtherClause => {
            let original = root.remove("query").unwrap_or(Value::Null);
            if !original.is_object() {
                return Err(QueryGateError::rejected("'query' must be a JSON object"));
            }
            json!({ "bool": { "must": [original], "filter": [filter] } })
        }
        QueryShape::HasBoolClause => {
            let Some(Value::Object(mut query)) = root.remove("query") else {
                return Err(QueryGateError::rejected("'query' must be a JSON object"));
            };
            let Some(Value::Object(mut bool_clause)) = query.remove("bool") else {
                return Err(QueryGateError::rejected("'bool' clause must be a JSON object"));
            };
            append_filter(&mut bool_clause, filter)?;
            query.insert("bool".to_string(), Value::Object(bool_clause));
            Value::Object(query)
        }
    };

    root.insert("query".to_string(), merged_query);
    Ok(Value::Object(root))
}

fn append_filter(bool_clause: &mut Map<String, Value>, filter: Value) -> Result<()> {
    let filters = match bool_clause.remove("filter") {
        None | Some(Value::Null) => vec![filter],
        Some(Value::Array(mut existing)) => {
            existing.push(filter);
            existing
        }
        Some(single @ Value::Object(_)) => vec![single, filter],
        Some(_) => {
            return Err(QueryGateError::rejected(
                "'bool.filter' must be a clause or a list of clauses",
            ));
        }
    };
    bool_clause.insert("filter".to_string(), Value::Array(filters));
    Ok(())
}
