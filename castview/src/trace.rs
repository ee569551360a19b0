//! Log output for castview.
//!
//! What each target reports:
//!
//! | Target                      | Level   | Events                                   |
//! |-----------------------------|---------|------------------------------------------|
//! | `castview::viewer`          | `info`  | frame shown, loop start and stop         |
//! | `castview::viewer`          | `warn`  | decode failure, aborted receive cycle    |
//! | `castview::display::capture`| `info`  | frame "shown" by the headless sink       |
//! | `castview::net::socket`     | `debug` | group joined and left                    |
//! | `castview::receiver`        | `debug` | message complete (fragments, bytes)      |
//! | `castview::receiver`        | `trace` | every datagram                           |
//! | `castview::sender`          | `debug` | image sent                               |
//!
//! `RUST_LOG=castview::receiver=trace` follows reassembly datagram by
//! datagram. Building without the default `tracing` feature turns every
//! macro here into nothing.

/// Filter used when `RUST_LOG` is unset.
#[cfg(feature = "tracing")]
pub const DEFAULT_DIRECTIVE: &str = "castview=info";

/// Installs a stderr subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_DIRECTIVE`]. Timestamps are time since start.
///
/// Only the first call in a process installs anything; later calls, and
/// calls after another subscriber was set, are ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use discard as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as warn;
