use clap::Parser;
use tracing_subscriber::EnvFilter;

use pairlink::cli::{Cli, run_command};

const DEFAULT_LOG_FILTER: &str = "pairlink=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Command output goes to stdout; logs stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }

    run_command(cli.command).await
}
