// parity/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // RUST_LOG=parity_core=debug parity run ... to see every query
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parity=info,parity_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            project_dir,
            checks,
            rule,
            max_parallel,
            timeout_secs,
        } => {
            commands::run::execute(project_dir, checks, rule, max_parallel, timeout_secs).await
        }
        Commands::Validate { project_dir } => commands::validate::execute(&project_dir),
        Commands::Query {
            query,
            project_dir,
            store,
            limit,
        } => commands::query::execute(&project_dir, &store, &query, limit).await,
    };

    std::process::exit(code);
}
