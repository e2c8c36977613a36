//! Process-wide tracing setup for binaries embedding the engine.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber: `RUST_LOG` filtering, thread names on
/// every line (worker threads are named `<operation>-worker-<n>`), and
/// either human-readable or JSON output.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_thread_names(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .try_init()?;
    }
    Ok(())
}
