//! Security tests for guardrails and redaction through the full dispatch path.
//!
//! Rejected requests must never reach the transport, and sensitive values in
//! backend responses must be masked before the caller or the audit trail sees
//! an outcome.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{ScriptedTransport, harness, test_config};
use querygate_core::{Outcome, QueryGateError, dispatch};
use serde_json::json;

#[tokio::test]
async fn test_security_path_traversal_index_rejected_before_network() {
    let h = harness(test_config(), ScriptedTransport::new());

    let outcome = dispatch(&h.ctx, "get_mapping", json!({"index": "../etc/passwd"}))
        .await
        .unwrap();

    let Outcome::Failure { error } = &outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("Invalid index name"), "{}", error);
    assert_eq!(h.transport.calls(), 0);

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tool_called, "get_mapping");
    assert_eq!(entries[0].status, "error");
}

#[tokio::test]
async fn test_security_out_of_scope_index_rejected_before_network() {
    let config = test_config().with_allowed_patterns(vec!["logs-*".to_string()]);
    let h = harness(config, ScriptedTransport::new());

    let outcome = dispatch(&h.ctx, "search", json!({"index": "customers"}))
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.error_message().unwrap().contains("not allowed"));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_security_multi_target_needs_every_component_allowed() {
    let config = test_config().with_allowed_patterns(vec!["logs-*".to_string()]);
    let h = harness(config, ScriptedTransport::new());

    let outcome = dispatch(&h.ctx, "count", json!({"index": "logs-app,secrets"}))
        .await
        .unwrap();

    assert!(outcome.error_message().unwrap().contains("secrets"));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_security_script_query_rejected_before_network() {
    let h = harness(test_config(), ScriptedTransport::new());

    let body = json!({
        "query": {"bool": {"filter": [{"script": {"script": {"source": "doc['a'].value > 1"}}}]}}
    });
    let outcome = dispatch(&h.ctx, "search", json!({"index": "logs-app", "body": body}))
        .await
        .unwrap();

    assert!(outcome.error_message().unwrap().contains("script"));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_security_keyword_in_time_range_rejected() {
    let h = harness(test_config(), ScriptedTransport::new());

    let outcome = dispatch(
        &h.ctx,
        "search",
        json!({"index": "logs-app", "time_range": "_delete_by_query"}),
    )
    .await
    .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_security_list_indices_hides_disallowed_indices() {
    let config = test_config().with_allowed_patterns(vec!["logs-*".to_string()]);
    let transport = ScriptedTransport::new().respond(
        200,
        json!([
            {"index": "logs-app", "health": "green"},
            {"index": "customers", "health": "green"},
            {"index": "logs-web", "health": "yellow"}
        ]),
    );
    let h = harness(config, transport);

    let outcome = dispatch(&h.ctx, "list_indices", json!({})).await.unwrap();

    let Outcome::Success { data, total, .. } = outcome else {
        panic!("expected success");
    };
    let names: Vec<&str> = data
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["index"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["logs-app", "logs-web"]);
    assert_eq!(total, Some(2));
}

#[tokio::test]
async fn test_redaction_applied_to_search_hits_and_audited() {
    let transport = ScriptedTransport::new().respond(
        200,
        json!({
            "hits": {
                "total": {"value": 1, "relation": "eq"},
                "hits": [{
                    "_index": "customers",
                    "_id": "a",
                    "_source": {
                        "name": "Jane",
                        "email": "jane.doe@example.com",
                        "card": "4111 1111 1111 1111"
                    }
                }]
            }
        }),
    );
    let h = harness(test_config(), transport);

    let params = json!({"index": "customers", "size": 5});
    let outcome = dispatch(&h.ctx, "search", params.clone()).await.unwrap();

    let Outcome::Success { data, total, .. } = &outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(*total, Some(1));
    let source = &data[0]["_source"];
    assert_eq!(source["name"], "Jane");
    assert_eq!(source["email"], "j***@example.com");
    assert_eq!(source["card"], "**** **** **** 1111");

    let serialized = serde_json::to_string(&outcome).unwrap();
    assert!(!serialized.contains("jane.doe@example.com"));
    assert!(!serialized.contains("4111 1111 1111 1111"));

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].redaction_count, 2);
    assert_eq!(entries[0].redacted_types, vec!["credit_card", "email"]);
    assert_eq!(entries[0].input_parameters, params.to_string());
    assert_eq!(entries[0].output_size_bytes, serialized.len());
}

#[tokio::test]
async fn test_redaction_disabled_returns_raw_values() {
    let transport = ScriptedTransport::new().respond(
        200,
        json!({"hits": {"total": {"value": 1}, "hits": [{"_source": {"ssn": "123-45-6789"}}]}}),
    );
    let h = harness(test_config().with_redaction(false), transport);

    let outcome = dispatch(&h.ctx, "search", json!({"index": "hr"})).await.unwrap();

    let Outcome::Success { data, .. } = outcome else {
        panic!("expected success");
    };
    assert_eq!(data[0]["_source"]["ssn"], "123-45-6789");
    assert_eq!(h.audit.entries()[0].redaction_count, 0);
}

#[tokio::test]
async fn test_invalid_parameters_rejected_without_audit() {
    let h = harness(test_config(), ScriptedTransport::new());

    let error = dispatch(&h.ctx, "search", json!({"size": 5}))
        .await
        .unwrap_err();
    assert!(matches!(error, QueryGateError::InvalidParameters { .. }));

    let error = dispatch(&h.ctx, "drop_index", json!({}))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("drop_index"));

    assert_eq!(h.transport.calls(), 0);
    assert!(h.audit.lines().is_empty());
}
