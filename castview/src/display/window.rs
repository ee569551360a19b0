//! Borderless top-most window backed by minifb.
//!
//! minifb has no portable full-screen mode, so the window is created
//! undecorated at the requested size (normally the screen resolution) and
//! kept above other windows.
//!
//! minifb only processes window events inside an update call. The viewer
//! calls [`DisplaySink::refresh`] after every cycle that shows nothing, so
//! the window repaints and notices Escape or close once per read timeout.
//! Without a read timeout a blocked receive also blocks the window.

use minifb::{Key, ScaleMode, Window, WindowOptions};

use super::{DisplayError, DisplaySink};
use crate::codec::DecodedFrame;
use crate::trace::debug;

/// An undecorated on-screen window showing the latest frame.
pub struct WindowSink {
    window: Window,
    width: u32,
}

impl WindowSink {
    /// Opens the window. Its width is queried once here and never again.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Backend`] if the window cannot be created.
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self, DisplayError> {
        let options = WindowOptions {
            borderless: true,
            title: false,
            resize: false,
            topmost: true,
            scale_mode: ScaleMode::UpperLeft,
            ..WindowOptions::default()
        };

        let window = Window::new(title, width as usize, height as usize, options)
            .map_err(|e| DisplayError::Backend(e.to_string()))?;

        let (actual_width, actual_height) = window.get_size();
        debug!(
            width = actual_width,
            height = actual_height,
            "display surface created"
        );

        Ok(Self {
            width: u32::try_from(actual_width).unwrap_or(width),
            window,
        })
    }
}

impl DisplaySink for WindowSink {
    fn width(&self) -> u32 {
        self.width
    }

    fn present(&mut self, frame: DecodedFrame) -> Result<(), DisplayError> {
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            return Err(DisplayError::Closed);
        }

        let buffer = frame.to_xrgb();
        self.window
            .update_with_buffer(&buffer, frame.width() as usize, frame.height() as usize)
            .map_err(|e| DisplayError::Backend(e.to_string()))
    }

    fn refresh(&mut self) -> Result<(), DisplayError> {
        self.window.update();
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            return Err(DisplayError::Closed);
        }
        Ok(())
    }
}
