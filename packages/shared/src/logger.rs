//! Logging setup utilities for the Agora hub.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default `EnvFilter` directive string.
///
/// Every crate in `crate_names` plus the binary itself is enabled at
/// `default_log_level`. `tower_http` is included so request traces show up.
pub fn default_directives(crate_names: &[&str], binary_name: &str, default_log_level: &str) -> String {
    crate_names
        .iter()
        .map(|name| name.replace('-', "_"))
        .chain([binary_name.replace('-', "_"), "tower_http".to_string()])
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `crate_names` - Library crates whose logs should be enabled (e.g. `["agora-server"]`)
/// * `binary_name` - The name of the binary (e.g. "agora-server")
/// * `default_log_level` - The default log level (e.g. "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use agora_shared::logger::setup_logger;
///
/// setup_logger(&["agora-server"], "agora-server", "debug");
/// ```
pub fn setup_logger(crate_names: &[&str], binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                default_directives(crate_names, binary_name, default_log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
