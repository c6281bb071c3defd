//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep library crates lightweight.
//! Everything goes to stderr so stdout stays free for the install report.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Targets raised to the requested level.
const TARGETS: [&str; 2] = ["qdd_core", "qdd_cli"];

/// Initialize the tracing subscriber.
///
/// # Arguments
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - If true, output JSON lines to stderr
///
/// `RUST_LOG` sets the baseline for other crates (default `warn`).
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    for target in TARGETS {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
