//! Tracing / logging initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable controlling log verbosity. Verbosity only — it has
/// no effect on sync semantics.
pub const LOG_LEVEL_ENV: &str = "CHAINSYNC_LOG_LEVEL";

/// Initialise the global tracing subscriber.
/// Should be called once at application startup.
pub fn init_tracing() {
    let directives = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
