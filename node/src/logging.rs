//! Log setup for `privy-node`.
//!
//! Stdout belongs to command results (JSON documents, decrypted payloads),
//! so every event goes to stderr. The filter comes from `RUST_LOG` when set,
//! otherwise [`DEFAULT_DIRECTIVES`].

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "privy_node=info,privy_core=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, one event per line, for an operator's terminal.
    Pretty,
    /// JSON lines for collectors.
    Json,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Must run once, before any command.
pub fn init_logging(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter());

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init(),
    }

    tracing::debug!(?format, "logging ready");
}
