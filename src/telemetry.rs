//! Tracing setup for the binary.
//!
//! The library only emits events; installing a subscriber is the binary's
//! job (or the embedding application's). Tests and embedders that install
//! their own subscriber must not call [`init`].

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG` wins when set; otherwise the
/// verbosity count picks the default level (0 = info, 1 = debug, 2+ =
/// trace).
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tandem={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
