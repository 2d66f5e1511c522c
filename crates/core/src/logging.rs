//! Structured logging initialisation for binaries embedding the engine.
//!
//! The engine itself only emits `tracing` events; it never installs a
//! subscriber. These helpers are provided for the convenience of whatever
//! CLI or service links against the workspace, the same way
//! `aethercore_core::logging` does for the rest of that stack.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise human-readable logging.
///
/// Log level is controlled by `RUST_LOG`; defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialise JSON logging, suitable for log aggregation.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let _ = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    }
}
