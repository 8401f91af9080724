//! mazeswarm - cooperative maze exploration.
//!
//! One binary, one role per process: perception service, coordination
//! service, agent, or launcher.

use clap::Parser;
use std::process::ExitCode;

use mazeswarm::Commands;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = Commands::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let _guard = match mazeswarm::logging::init(&args.command.log_file_name()) {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
