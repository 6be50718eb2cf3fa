//! QueryGate command-line entry point.
//!
//! # Security Guarantees
//! - Only read-only operations are reachable
//! - The API key is read from the environment and never printed or logged
//! - Every `call` is audited, including rejected ones

use clap::Parser;
use querygate::{Cli, Command, context_from_env, render_outcome, render_tool_list, run_call};
use querygate_core::{Result, ServerConfig, error::redact_url, init_logging};
use std::process::ExitCode;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet, cli.global.json_logs)?;

    match cli.command {
        Command::Tools => {
            println!("{}", render_tool_list());
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckConfig => {
            let config = ServerConfig::from_env()?;
            println!("{}", config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Call(args) => {
            let ctx = context_from_env()?;
            debug!(
                tool = %args.tool,
                backend = %redact_url(ctx.client.config().elasticsearch_url.as_str()),
                "Dispatching operation"
            );

            let outcome = match run_call(&ctx, &args).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            };

            println!("{}", render_outcome(&outcome, args.pretty)?);
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
