//! Multicast image viewer.
//!
//! Joins the configured group, reassembles each image sent to it and shows
//! it scaled to the width of the screen, until interrupted or the window is
//! closed.
//!
//! # Usage
//!
//! ```sh
//! castview --group 239.1.2.3 --port 5000 --read-timeout-ms 500
//! CASTVIEW_CAPACITY=1400 castview --headless
//! ```
//!
//! Every option can also be given as a `CASTVIEW_*` environment variable;
//! flags win over the environment.
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: stop after the current cycle; a second signal
//!   exits immediately

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use castview::config::{ConfigError, KEYS, ViewerConfig};
use castview::display::{DisplaySink, HeadlessSink};
use castview::viewer::{self, StartupError, Viewer};

/// Read timeout forced on the windowed viewer when none is configured.
#[cfg(feature = "window")]
const WINDOW_EVENT_TICK: std::time::Duration = std::time::Duration::from_millis(100);

fn main() {
    if let Err(e) = run() {
        eprintln!("castview: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), StartupError> {
    castview::init_tracing();

    let mut config = ViewerConfig::from_env()?;
    let mut headless = false;
    for arg in config.apply_args(std::env::args().skip(1))? {
        match arg.as_str() {
            "--headless" => headless = true,
            "--help" | "-h" => {
                eprint!("{}", usage());
                std::process::exit(0);
            }
            other => return Err(ConfigError::UnknownKey(other.to_owned()).into()),
        }
    }

    let endpoint = config.endpoint()?;
    viewer::preflight(&endpoint)?;

    #[cfg(feature = "window")]
    if !headless {
        config.ensure_read_timeout(WINDOW_EVENT_TICK);
    }

    let sink = open_sink(&config, headless)?;
    let mut viewer = Viewer::from_config(&config, sink)?;
    install_signal_handlers(&viewer.shutdown_flag())?;

    eprintln!(
        "castview: listening on {endpoint} ({} framing, width {})",
        config.framing,
        viewer.target_width()
    );

    viewer.run()?;

    let stats = viewer.stats();
    eprintln!(
        "castview: stopped after {} cycles, {} frames shown",
        stats.cycles, stats.presented
    );
    Ok(())
}

#[cfg(feature = "window")]
fn open_sink(config: &ViewerConfig, headless: bool) -> Result<Box<dyn DisplaySink>, StartupError> {
    if headless {
        return Ok(Box::new(HeadlessSink::new(config.screen_size.0)));
    }
    let (width, height) = config.screen_size;
    let window = castview::display::WindowSink::open("castview", width, height)?;
    Ok(Box::new(window))
}

#[cfg(not(feature = "window"))]
fn open_sink(config: &ViewerConfig, headless: bool) -> Result<Box<dyn DisplaySink>, StartupError> {
    if !headless {
        eprintln!(
            "castview: built without the `window` feature; frames are logged, not shown \
             (rebuild with `--features window`)"
        );
    }
    Ok(Box::new(HeadlessSink::new(config.screen_size.0)))
}

/// SIGINT/SIGTERM raise `shutdown`; a second one while it is raised exits.
///
/// Without a read timeout the loop may sit in a blocking read, so the stop
/// only takes effect once the next datagram arrives.
fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<(), StartupError> {
    use signal_hook::consts::TERM_SIGNALS;
    use signal_hook::flag;

    for &signal in TERM_SIGNALS {
        flag::register_conditional_shutdown(signal, 1, Arc::clone(shutdown))
            .map_err(StartupError::Signals)?;
        flag::register(signal, Arc::clone(shutdown)).map_err(StartupError::Signals)?;
    }
    Ok(())
}

fn usage() -> String {
    let mut text = String::from("Usage: castview [OPTIONS]\n\n");
    text.push_str("Options (each also read from CASTVIEW_<NAME>):\n");
    for key in KEYS {
        let _ = writeln!(text, "  --{key} <VALUE>");
    }
    text.push_str("  --headless             Log frames instead of opening a window\n");
    text.push_str("  -h, --help             Print this help\n");
    if !cfg!(feature = "window") {
        text.push_str(
            "\nThis build has no `window` feature: frames are only logged.\n\
             Rebuild with `cargo build --features window` to show them.\n",
        );
    }
    text
}
