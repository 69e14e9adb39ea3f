use std::sync::Once;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "liveroom_core=debug,livekit=info";

/// Initialize tracing/logging. Call once from the host before activating a
/// screen; later calls are ignored. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
        if installed.is_err() {
            tracing::debug!("a global tracing subscriber was already installed");
        }
    });
}
