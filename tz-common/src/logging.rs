//! Tracing initialisation shared by TicketZen binaries

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level
pub fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

/// Install the global subscriber
///
/// Logs go to stderr so stdout stays free for rendered results. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing(logging: &LoggingConfig) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(logging))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
