use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,gasless_ops=debug,gasless_session=debug";

/// Install a console subscriber when `enabled` (the auth widget's logging
/// toggle). `RUST_LOG` overrides `default_filter`.
///
/// Returns `false` when logging is disabled or a global subscriber is
/// already set.
pub fn init_logging(enabled: bool, default_filter: &str) -> bool {
    if !enabled {
        return false;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false).compact())
        .try_init()
        .is_ok()
}
