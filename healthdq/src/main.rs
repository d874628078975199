// healthdq/src/main.rs

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging (Tracing)
    // Logs go to stderr so stdout stays readable; RUST_LOG=debug healthdq run ... for details
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            config,
            format,
            out,
            review,
            run_id,
            ledger,
        } => {
            commands::run::execute(commands::run::RunArgs {
                input,
                config,
                format,
                out,
                review,
                run_id,
                ledger,
            })
            .await?
        }
        Commands::Decide {
            id,
            status,
            value,
            out,
            config,
        } => commands::decide::execute(id, status, value, out, config).await?,
        Commands::Resume { out, config } => commands::resume::execute(out, config).await?,
        Commands::Check { config } => commands::check::execute(config)?,
        Commands::History {
            ledger,
            record,
            field,
            json,
        } => commands::history::execute(ledger, record, field, json)?,
    }

    Ok(())
}
