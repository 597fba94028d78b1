//! Logging setup for kubegate
//!
//! Plain tracing to stderr. The transport layer embedding this crate decides
//! where logs ultimately go.
//!
//! # Example
//!
//! ```no_run
//! use kubegate::telemetry::{init_logging_with, LogFormat};
//!
//! init_logging_with(LogFormat::Json);
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Initialize human-readable logging
///
/// Uses `RUST_LOG` for filtering (default: info). Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_logging() {
    init_logging_with(LogFormat::Text);
}

pub fn init_logging_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let _ = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}
