//! Process-wide logging setup.
//!
//! Components log through `log` macros and open `tracing` spans around
//! pipeline runs; both end up in one `tracing-subscriber` registry. Logs go
//! to stderr in either format, leaving stdout to command output.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("A global logger is already installed")]
    AlreadyInitialized,
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `default_level`; `json` switches to one JSON object per line.
pub fn init_logging(default_level: &str, json: bool) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| LoggingError::Filter {
            filter: default_level.to_string(),
            message: e.to_string(),
        })?,
    };

    tracing_log::LogTracer::init().map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::subscriber::set_global_default(build_subscriber(filter, json, std::io::stderr))
        .map_err(|_| LoggingError::AlreadyInitialized)
}

fn build_subscriber<W>(filter: EnvFilter, json: bool, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        Box::new(registry.with(fmt::layer().json().with_writer(writer)))
    } else {
        Box::new(registry.with(fmt::layer().with_writer(writer)))
    }
}
