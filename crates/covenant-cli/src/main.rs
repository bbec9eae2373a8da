mod config;
mod display;
mod stages;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{ExtractArgs, ExtractSettings, NormalizeArgs, NormalizeSettings, SearchArgs, SearchSettings};

#[derive(Parser)]
#[command(
    name = "covenant",
    version,
    about = "Build a contract dataset from SEC EDGAR filings",
    long_about = "Build a contract dataset from SEC EDGAR filings.\n\n\
                  Stages run independently and are safe to re-run:\n  \
                  search     query, download and keyword-filter exhibits per scope\n  \
                  extract    LLM metadata extraction for admitted filings\n  \
                  normalize  map categories to canonical types and merge all scopes"
)]
struct Cli {
    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, download and keyword-filter filings for every scope
    Search(SearchArgs),
    /// Extract contract metadata for admitted filings
    Extract(ExtractArgs),
    /// Normalize categories and write the combined dataset
    Normalize(NormalizeArgs),
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // before parsing so `.env` values feed the clap env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    tracing::debug!("covenant v{}", env!("CARGO_PKG_VERSION"));

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Search(args) => {
            let settings = SearchSettings::from_args(args)?;
            let reports = stages::run_search(&settings).await?;
            display::print_search_summary(&reports);
        }
        Command::Extract(args) => {
            let settings = ExtractSettings::from_args(args)?;
            let reports = stages::run_extract(&settings).await?;
            display::print_extract_summary(&reports);
        }
        Command::Normalize(args) => {
            let settings = NormalizeSettings::from_args(args)?;
            let report = stages::run_normalize(&settings)?;
            display::print_normalize_summary(&report);
        }
    }
    Ok(())
}
