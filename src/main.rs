use std::process::ExitCode;

use clap::Parser;
use log::{debug, error};

use devgraph::{cli::Cli, commands, exit_code, DEVGRAPH_VERSION};

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .init();

    debug!("devgraph version: {DEVGRAPH_VERSION}");

    match commands::run(&args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output.trim_end());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to execute '{}' command: {e:?}", args.command);
            ExitCode::from(exit_code(&e))
        }
    }
}
