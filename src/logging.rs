//! Subscriber setup for the binary. The library itself only emits `tracing` events.

use tracing_subscriber::EnvFilter;

/// Maps a `DEBUG` level to a default filter directive.
pub fn filter_for_level(debug: u8) -> &'static str {
    match debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a global fmt subscriber. `RUST_LOG` wins over the `DEBUG` level.
///
/// Calling it twice is harmless; the second install is ignored.
pub fn init(debug: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for_level(debug)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .try_init();
}
