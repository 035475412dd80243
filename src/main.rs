mod api;
mod cli;
mod config;
mod error;
mod forms;
mod jobs;
mod logging;
mod model;
mod orchestrator;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod workflow;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(args.is_interactive(), args.log_file.as_deref())?;
    let is_non_tui = !args.is_interactive();

    match cli::run(args).await {
        Ok(()) => {
            // A pending Ctrl-C listener must not keep line-oriented commands alive.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            Err(e)
        }
    }
}
