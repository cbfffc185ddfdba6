//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events and spans; binaries and tests
//! decide where they go. [`init_tracing`] is the default wiring.

use tracing_subscriber::EnvFilter;

/// Default filter when neither an explicit filter nor `RUST_LOG` is usable.
pub const DEFAULT_FILTER: &str = "docflow=info";

/// Builds the filter: `filter` if it parses, else `RUST_LOG`, else
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter(filter: Option<&str>) -> EnvFilter {
    filter
        .map(EnvFilter::try_new)
        .and_then(Result::ok)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global fmt subscriber, as text or JSON lines.
///
/// Returns false if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing(filter: Option<&str>, json: bool) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(filter));

    let installed = if json {
        builder.json().with_current_span(true).try_init().is_ok()
    } else {
        builder.with_target(false).try_init().is_ok()
    };

    if !installed {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }
    installed
}
