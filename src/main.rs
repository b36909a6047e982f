//! Clearance CLI

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;

mod cli;
mod logging;

pub fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_subscriber(&cli.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for setup errors"
        )]
        {
            eprintln!("Logging setup error: {e}");
        }

        return ExitCode::FAILURE;
    }

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run failed: {e:#}");

            ExitCode::FAILURE
        }
    }
}
