//! Receive images over UDP multicast and show them full width.
//!
//! A sender cuts each encoded image into datagrams of at most `capacity`
//! bytes; a datagram shorter than `capacity` ends the image. The viewer
//! joins the group, reassembles one image per cycle, decodes it, scales it to
//! the display width and presents it, forever.
//!
//! ```no_run
//! use castview::config::ViewerConfig;
//! use castview::display::HeadlessSink;
//! use castview::viewer::Viewer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ViewerConfig::from_env()?;
//! let sink = HeadlessSink::new(config.screen_size.0);
//! let mut viewer = Viewer::from_config(&config, sink)?;
//! viewer.run()?;
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod codec;
pub mod config;
pub mod display;
pub mod net;
pub mod receiver;
pub mod sender;
pub mod viewer;

mod trace;

pub use trace::init_tracing;

#[doc(inline)]
pub use assembly::{EncodedImage, ReassemblyBuffer};
#[doc(inline)]
pub use codec::{DecodeError, DecodedFrame};
#[doc(inline)]
pub use net::MulticastEndpoint;
#[doc(inline)]
pub use receiver::{Framing, Receiver, TransportError};
#[doc(inline)]
pub use viewer::{CycleOutcome, StartupError, Viewer};
