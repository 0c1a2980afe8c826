//! Logging initialization.
//!
//! Follows standard Rust logging practice: the `RUST_LOG` environment
//! variable always takes precedence, a config-supplied filter is the
//! fallback, and the default level is `info`. Output goes to stderr with
//! module targets; `NO_COLOR` disables ANSI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the node process.
///
/// # Arguments
/// * `filter` - Optional filter from config (e.g. "info",
///   "carbon_node=debug"). Ignored when `RUST_LOG` is set.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter.unwrap_or("info"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}

/// Initialize logging from the node configuration.
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) {
    init_logging(config.and_then(|c| c.filter.as_deref()));
}
