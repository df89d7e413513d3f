//! Logging setup for hybrid_code_search.
//!
//! Installs a layered tracing subscriber: an `EnvFilter` that honours
//! `RUST_LOG`, and a `fmt` layer that writes to stderr. Stdout is reserved for
//! command output and the stdio tool protocol.

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects DEBUG over INFO.
/// Calling this twice is harmless (the second registration is ignored).
pub fn init_logging(verbose: bool) {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
