//! Sinks without a real surface.

use super::{DisplayError, DisplaySink};
use crate::codec::DecodedFrame;
use crate::trace::info;

/// Keeps the most recently presented frame in memory.
#[derive(Debug, Clone)]
pub struct LastFrameSink {
    width: u32,
    frame: Option<DecodedFrame>,
    presented: usize,
}

impl LastFrameSink {
    /// Creates a sink that reports a surface `width` pixels wide.
    #[must_use]
    pub const fn new(width: u32) -> Self {
        Self {
            width,
            frame: None,
            presented: 0,
        }
    }

    /// The frame currently "on screen", if any has been presented.
    #[must_use]
    pub const fn frame(&self) -> Option<&DecodedFrame> {
        self.frame.as_ref()
    }

    /// How many frames have been presented.
    #[must_use]
    pub const fn presented(&self) -> usize {
        self.presented
    }
}

impl DisplaySink for LastFrameSink {
    fn width(&self) -> u32 {
        self.width
    }

    fn present(&mut self, frame: DecodedFrame) -> Result<(), DisplayError> {
        self.frame = Some(frame);
        self.presented += 1;
        Ok(())
    }
}

/// Logs each frame instead of drawing it.
///
/// Used when the binary runs without a window.
#[derive(Debug)]
pub struct HeadlessSink {
    inner: LastFrameSink,
}

impl HeadlessSink {
    /// Creates a headless sink that scales to `width`.
    #[must_use]
    pub const fn new(width: u32) -> Self {
        Self {
            inner: LastFrameSink::new(width),
        }
    }
}

impl DisplaySink for HeadlessSink {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn present(&mut self, frame: DecodedFrame) -> Result<(), DisplayError> {
        info!(
            width = frame.width(),
            height = frame.height(),
            frame = self.inner.presented() + 1,
            "frame presented (headless)"
        );
        self.inner.present(frame)
    }
}
