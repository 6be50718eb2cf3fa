//! Integration tests for the CLI wiring: environment configuration, the real
//! HTTP transport and the file audit log.
//!
//! No test needs a running backend; requests either stop at a guardrail or
//! target a closed local port.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use clap::Parser;
use querygate::{Cli, Command, context_from_env, render_outcome, run_call};
use querygate_core::{AuditEntry, Outcome, QueryGateError};

const SENSITIVE_API_KEY: &str = "cXVlcnlnYXRlLXNlY3JldC1rZXk=";

fn call_args(argv: &[&str]) -> querygate::CallArgs {
    let cli = Cli::try_parse_from(argv).unwrap();
    match cli.command {
        Command::Call(args) => args,
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_config_missing_environment_is_fatal() {
    temp_env::with_vars_unset(["ELASTICSEARCH_URL", "ELASTICSEARCH_API_KEY"], || {
        let error = context_from_env().unwrap_err();
        assert!(matches!(error, QueryGateError::Configuration { .. }));
    });
}

#[tokio::test]
async fn test_config_rejected_call_is_audited_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let ctx = temp_env::with_vars(
        [
            ("ELASTICSEARCH_URL", Some("http://127.0.0.1:1")),
            ("ELASTICSEARCH_API_KEY", Some(SENSITIVE_API_KEY)),
            ("ALLOWED_INDEX_PATTERNS", Some("logs-*")),
            ("AUDIT_LOG_PATH", Some(audit_path.to_str().unwrap())),
        ],
        context_from_env,
    )
    .unwrap();

    let args = call_args(&[
        "querygate",
        "call",
        "search",
        "--params",
        r#"{"index":"billing"}"#,
    ]);
    let outcome = run_call(&ctx, &args).await.unwrap();

    assert!(!outcome.is_success());
    let rendered = render_outcome(&outcome, false).unwrap();
    assert!(rendered.starts_with(r#"{"status":"error""#));

    let contents = std::fs::read_to_string(&audit_path).unwrap();
    let entries: Vec<AuditEntry> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tool_called, "search");
    assert_eq!(entries[0].input_parameters, r#"{"index":"billing"}"#);
}

#[tokio::test]
async fn test_credential_absent_from_network_failure() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let ctx = temp_env::with_vars(
        [
            ("ELASTICSEARCH_URL", Some("http://127.0.0.1:1")),
            ("ELASTICSEARCH_API_KEY", Some(SENSITIVE_API_KEY)),
            ("RETRY_ATTEMPTS", Some("1")),
            ("REQUEST_TIMEOUT_MS", Some("2000")),
            ("AUDIT_LOG_PATH", Some(audit_path.to_str().unwrap())),
        ],
        context_from_env,
    )
    .unwrap();

    let args = call_args(&["querygate", "call", "cluster_health"]);
    let outcome = run_call(&ctx, &args).await.unwrap();

    let Outcome::Failure { error } = &outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("Backend unreachable"), "{}", error);
    assert!(!error.contains(SENSITIVE_API_KEY));

    let contents = std::fs::read_to_string(&audit_path).unwrap();
    assert!(!contents.contains(SENSITIVE_API_KEY));
}

#[tokio::test]
async fn test_unknown_tool_is_an_error_not_an_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let ctx = temp_env::with_vars(
        [
            ("ELASTICSEARCH_URL", Some("http://127.0.0.1:1")),
            ("ELASTICSEARCH_API_KEY", Some(SENSITIVE_API_KEY)),
            ("AUDIT_LOG_PATH", Some(audit_path.to_str().unwrap())),
        ],
        context_from_env,
    )
    .unwrap();

    let args = call_args(&["querygate", "call", "delete_index"]);
    let error = run_call(&ctx, &args).await.unwrap_err();

    assert!(matches!(error, QueryGateError::InvalidParameters { .. }));
}

#[test]
fn test_config_display_hides_credential() {
    temp_env::with_vars(
        [
            ("ELASTICSEARCH_URL", Some("https://acme.es.example.cloud")),
            ("ELASTICSEARCH_API_KEY", Some(SENSITIVE_API_KEY)),
        ],
        || {
            let config = querygate_core::ServerConfig::from_env().unwrap();
            assert!(!format!("{}", config).contains(SENSITIVE_API_KEY));
            assert!(!format!("{:?}", config).contains(SENSITIVE_API_KEY));
        },
    );
}
