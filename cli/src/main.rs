//! chainwatch: follow Solana program logs and announce new token mints.
//!
//! # Commands
//! ```text
//! chainwatch run          --config <watch.json>
//! chainwatch check-config --config <watch.json>
//! ```
//!
//! `run` exits 0 after Ctrl-C / SIGTERM and 1 when the connection could not
//! be re-established, so a supervisor can restart it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cmd_check;
mod cmd_run;
mod logging;

#[derive(Parser)]
#[command(
    name = "chainwatch",
    about = "Watch Solana logsSubscribe streams and forward new token mints to webhooks",
    long_about = "
ChainWatch keeps a logsSubscribe connection alive, resolves every notified
transaction into token mints, and posts each mint it has not seen before to
the configured webhooks at a paced rate.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the log filter from the config file
",
    version
)]
struct Cli {
    /// Raise the default log level to debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and watch until interrupted
    Run {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a config file and print it with defaults filled in
    #[command(name = "check-config")]
    CheckConfig {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => cmd_run::run(&config, cli.verbose).await,
        Commands::CheckConfig { config } => cmd_check::run(&config).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
