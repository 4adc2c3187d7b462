//! Logging setup utilities.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// Sets up logging for the boex crates and for the binary itself. The level
/// can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "boex-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use boex_shared::logger::setup_logger;
///
/// setup_logger("boex-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

const CRATES: [&str; 2] = ["boex_shared", "boex_server"];

fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    let mut targets: Vec<&str> = CRATES.to_vec();
    if !targets.contains(&binary_target.as_str()) {
        targets.push(&binary_target);
    }
    targets
        .iter()
        .map(|target| format!("{target}={default_log_level}"))
        .collect::<Vec<_>>()
        .join(",")
}
