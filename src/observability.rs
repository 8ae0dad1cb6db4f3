//! Logging setup and span constructors for ledger invocations.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented output.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
}

/// Installs the global subscriber.
///
/// The filter defaults to `info` and is overridden by `RUST_LOG`
/// (e.g. `traceability_ledger=debug`). Calling this again is a no-op.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init: an embedding application may already own the global subscriber
        let _ = match format {
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init(),
        };
    });
}

/// Span wrapping one contract invocation.
#[must_use]
pub fn invocation_span(contract: &str, operation: &str, kind: &str) -> Span {
    tracing::info_span!(
        "invoke",
        contract = contract,
        op = operation,
        kind = kind,
    )
}
