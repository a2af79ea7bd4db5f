//! The `scanner` binary: parses CLI flags, loads configuration, and runs
//! the P2PK scanning pipeline to completion.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use config::Config;

/// Command-line flags
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long = "config", default_value = "scanner.toml")]
    config: PathBuf,

    /// Scan starting at this height instead of resuming stored progress
    #[arg(long = "start-block")]
    start_block: Option<u64>,

    /// Scan up to this height instead of the chain tip
    #[arg(long = "end-block")]
    end_block: Option<u64>,

    /// Discard stored progress and rescan from `start-block`
    #[arg(long = "reset")]
    reset: bool,

    /// Emit verbose (debug-level) logs
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_verbose(cli.verbose);

    let mut config = Config::load(&cli.config)?;
    if cli.start_block.is_some() {
        config.scanner.start_block = cli.start_block;
    }
    if cli.end_block.is_some() {
        config.scanner.end_block = cli.end_block;
    }
    if cli.reset {
        config.scanner.reset = true;
    }

    tracing::info!(
        config = %cli.config.display(),
        threads = config.scanner.threads,
        start_block = ?config.scanner.start_block,
        end_block = ?config.scanner.end_block,
        "starting scanner"
    );

    pipeline::run_scanner(config).await?;

    tracing::info!("scanner finished");
    Ok(())
}
