//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sensorium", version, about = "Align and label captured simulation sensor data")]
pub struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(long, global = true, env = "SENSORIUM_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Capture folder with one `<sensor>.json` per sensor
    pub folder: PathBuf,

    /// Grid interval in seconds, overriding the configuration
    #[arg(long)]
    pub interval: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resample and unify a capture, report fill statistics
    Align {
        #[command(flatten)]
        capture: CaptureArgs,
        /// Write the unified table to this directory
        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,
    },
    /// Label anomalous rows
    Label {
        #[command(flatten)]
        capture: CaptureArgs,
        /// Threshold multiplier k, overriding the configuration
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Select rows by sensor and time range
    Query {
        #[command(flatten)]
        capture: CaptureArgs,
        /// Sensor name, or "all"
        #[arg(long)]
        sensor: Option<String>,
        /// Inclusive start time
        #[arg(long, allow_negative_numbers = true)]
        start: Option<f64>,
        /// Inclusive end time
        #[arg(long, allow_negative_numbers = true)]
        end: Option<f64>,
        /// Label the table before querying
        #[arg(long)]
        labeled: bool,
    },
    /// Report correlated, redundant and actuator-predicting columns
    Correlate {
        #[command(flatten)]
        capture: CaptureArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_with_global_flags() {
        let cli = Cli::try_parse_from([
            "sensorium", "-vv", "query", "capture", "--sensor", "lidar", "--start", "10", "--end",
            "5", "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.command {
            Command::Query {
                sensor, start, end, ..
            } => {
                assert_eq!(sensor.as_deref(), Some("lidar"));
                assert_eq!(start, Some(10.0));
                assert_eq!(end, Some(5.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
