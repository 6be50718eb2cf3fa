//! Command-line interface for QueryGate.
//!
//! The binary reads its connection settings from the environment, runs one
//! operation through the secure pipeline and prints the outcome as JSON on
//! stdout. Diagnostics go to stderr.

use clap::{Args, Parser, Subcommand};
use querygate_core::{
    Outcome, QueryGateError, Result, ServerConfig, Tool, ToolContext, dispatch,
};
use serde_json::Value;
use std::sync::Arc;

/// Command-line interface for QueryGate
#[derive(Debug, Parser)]
#[command(name = "querygate")]
#[command(about = "Read-only, redacting, audited gateway to a search backend")]
#[command(version)]
#[command(long_about = "
QueryGate - Secure read-only access to a search backend

Every call is checked against index guardrails, stripped of sensitive values
and recorded in an append-only audit log.

CONFIGURATION (environment):
  ELASTICSEARCH_URL        Search backend base URL (required)
  ELASTICSEARCH_API_KEY    API key (required, never logged)
  KIBANA_URL               Control-plane URL (derived from ELASTICSEARCH_URL)
  ALLOWED_INDEX_PATTERNS   Comma-separated index globs
  MAX_RESULT_SIZE          Page size cap (1-500, default 100)
  AUDIT_LOG_PATH           Audit file (default querygate-audit.jsonl)

EXAMPLES:
  querygate tools
  querygate call cluster_health
  querygate call search --params '{\"index\":\"logs-*\",\"time_range\":\"now-1h\"}'
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one operation and print its outcome
    Call(CallArgs),
    /// List available operations
    Tools,
    /// Load configuration from the environment and print it (key hidden)
    CheckConfig,
}

/// Arguments of the `call` subcommand
#[derive(Debug, Args)]
pub struct CallArgs {
    /// Operation name (see `querygate tools`)
    #[arg(help = "Operation to run")]
    pub tool: String,

    /// Parameters as a JSON object
    #[arg(short, long, default_value = "{}", help = "Operation parameters as JSON")]
    pub params: String,

    /// Pretty-print the outcome
    #[arg(long, help = "Pretty-print the JSON outcome")]
    pub pretty: bool,
}

/// Flags shared by every subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logging except errors")]
    pub quiet: bool,

    /// Structured logs
    #[arg(long, global = true, env = "QUERYGATE_JSON_LOGS", help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

/// Parses the `--params` argument.
///
/// # Errors
/// Returns [`QueryGateError::InvalidParameters`] if the text is not JSON.
pub fn parse_params(raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| QueryGateError::invalid_parameters(format!("--params is not valid JSON: {}", e)))
}

/// Renders an outcome for stdout.
///
/// # Errors
/// Returns a serialization error if the outcome cannot be encoded.
pub fn render_outcome(outcome: &Outcome, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(outcome)
    } else {
        serde_json::to_string(outcome)
    };
    rendered.map_err(|e| QueryGateError::serialization("outcome", e))
}

/// Renders the operation listing.
pub fn render_tool_list() -> String {
    Tool::ALL
        .iter()
        .map(|tool| format!("{:<22}{}", tool.name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs one `call` invocation against a prepared context.
///
/// # Errors
/// Returns an error for malformed or unknown parameters; backend failures are
/// part of the returned outcome.
pub async fn run_call(ctx: &ToolContext, args: &CallArgs) -> Result<Outcome> {
    let params = parse_params(&args.params)?;
    dispatch(ctx, &args.tool, params).await
}

/// Builds the production context from environment configuration.
///
/// # Errors
/// Returns a configuration error if settings are missing or invalid.
pub fn context_from_env() -> Result<ToolContext> {
    let config = ServerConfig::from_env()?;
    ToolContext::from_config(Arc::new(config))
}
