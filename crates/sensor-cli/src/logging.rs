//! Subscriber setup. Logs go to stderr so stdout stays parseable.

use tracing_subscriber::EnvFilter;

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    // A subscriber may already be set (tests); keep the existing one.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
