//! Logging setup
//!
//! Logs go to stderr; stdout belongs to the plugin handshake. The filter can
//! be adjusted after start-up so `sdk_log_level` takes effect once the
//! provider is configured.

use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Target used by the API client's log events
pub const API_LOG_TARGET: &str = "cloudsec::api";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter directive: {0}")]
    InvalidDirective(#[from] ParseError),

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),
}

struct FilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    base: String,
}

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

/// Base filter directives: TF_LOG_PROVIDER, then RUST_LOG, else info
pub fn default_directives() -> String {
    ["TF_LOG_PROVIDER", "RUST_LOG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_lowercase())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber; later calls are ignored
pub fn init() {
    let base = default_directives();
    let filter = EnvFilter::try_new(&base).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init();

    if installed.is_ok() {
        let _ = FILTER.set(FilterHandle { handle, base });
    }
}

/// Directive string with the API client target set to `level`
pub fn sdk_directives(base: &str, level: &str) -> String {
    format!("{},{}={}", base, API_LOG_TARGET, level)
}

/// Change the API client's log level.
///
/// The level is checked even before [`init`]; applying it is a no-op then.
pub fn set_sdk_log_level(level: &str) -> Result<(), LoggingError> {
    let filter = FILTER.get();
    let base = filter.map_or("info", |f| f.base.as_str());

    let directives = sdk_directives(base, level);
    let new_filter = EnvFilter::try_new(&directives)?;
    let Some(filter) = filter else {
        return Ok(());
    };
    filter.handle.reload(new_filter)?;

    tracing::debug!(%directives, "updated log filter");
    Ok(())
}
