// Text Analysis Desktop - Logging
// tracing subscriber setup shared by the shell binary and tools

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "info,textanalysis_supervisor=debug,textanalysis_desktop=debug";

/// Install the global subscriber; `RUST_LOG` overrides the default filter.
/// Safe to call more than once, later calls are ignored.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
