//! gcal-mcp entry point.

use std::process::ExitCode;

use clap::Parser;

use gcal_mcp_core::{TracingConfig, init_tracing};
use gcal_mcp_server::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // .env values feed clap's env fallbacks, so load them first
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::from_env()
    };
    if let Err(e) = init_tracing(tracing.with_format(cli.log_format)) {
        eprintln!("warning: {}", e);
    }

    match gcal_mcp_server::commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
