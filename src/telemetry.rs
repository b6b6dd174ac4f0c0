//! Process-wide tracing setup, shared by every binary in this crate.

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Installs the global tracing subscriber. `default_filter` is used when
/// `RUST_LOG` is not set, so each binary can pick a sensible default
/// (e.g. `"conjunction_engine=info,sqlx=warn"`) without callers having to
/// know that.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
