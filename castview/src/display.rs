//! Display sinks: where scaled frames end up.
//!
//! The viewer owns exactly one sink for its whole life and only ever talks to
//! it through [`DisplaySink`], so the receive/decode path can be exercised
//! against [`LastFrameSink`] without a window system.

mod capture;
#[cfg(feature = "window")]
mod window;

use thiserror::Error;

use crate::codec::DecodedFrame;

pub use capture::{HeadlessSink, LastFrameSink};
#[cfg(feature = "window")]
pub use window::WindowSink;

/// Failure creating or updating a display surface.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The surface was closed by the user; stop presenting.
    #[error("display surface closed")]
    Closed,
    /// The windowing backend reported an error.
    #[error("display backend error: {0}")]
    Backend(String),
}

/// One on-screen surface that shows the latest frame.
pub trait DisplaySink {
    /// Surface width in pixels, fixed when the surface was created.
    ///
    /// Frames are scaled to this width unless the configuration overrides it.
    fn width(&self) -> u32;

    /// Replaces the shown bitmap with `frame` and redraws.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Closed`] once the surface is gone, or
    /// [`DisplayError::Backend`] if the redraw failed.
    fn present(&mut self, frame: DecodedFrame) -> Result<(), DisplayError>;

    /// Pumps the surface's event loop without a new frame.
    ///
    /// Called after every cycle that ends without presenting. Sinks with no
    /// event loop keep the default.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Closed`] once the surface is gone.
    fn refresh(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

impl<D: DisplaySink + ?Sized> DisplaySink for Box<D> {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn present(&mut self, frame: DecodedFrame) -> Result<(), DisplayError> {
        (**self).present(frame)
    }

    fn refresh(&mut self) -> Result<(), DisplayError> {
        (**self).refresh()
    }
}
