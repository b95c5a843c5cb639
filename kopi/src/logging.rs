//! Tracing bootstrap for hosts that want the core's log output

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber. `RUST_LOG` wins over `filter`; an unparsable
/// `filter` falls back to `info`. Calling this again once a subscriber is set does nothing.
#[uniffi::export]
pub fn init_logging(filter: String) {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(false))
        .with(filter_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %filter, "kopi logging initialized");
    }
}
