//! Tracing setup for the command-line tool.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise the
/// filter is `info`, or `debug` when `debug` is true. Output goes to stderr.
///
/// Subsequent calls are ignored.
pub fn init_tracing(debug: bool) {
    INIT.call_once(|| {
        let default_level = if debug { "debug" } else { "info" };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(debug)
            .with_thread_ids(debug);

        // try_init: a test harness may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });
}
