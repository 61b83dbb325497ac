//! # sensorium
//!
//! Command-line front end: aligns a capture folder onto one grid and runs
//! the labeling, query and correlation stages over the result.

mod cli;
mod commands;
mod exit_codes;
mod logging;

use clap::Parser;

use crate::cli::Cli;
use crate::exit_codes::ExitCode;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    if let Err(error) = commands::run(&cli) {
        let code = ExitCode::for_error(&error);
        tracing::error!(error = %format!("{error:#}"), code = code.as_i32(), "sensorium failed");
        eprintln!("error: {error:#}");
        std::process::exit(code.as_i32());
    }
}
