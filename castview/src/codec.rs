//! Image decoding and width-fitted scaling.
//!
//! Decoding goes through the `image` crate's format sniffing. Network input
//! is routinely truncated or corrupted, so every failure comes back as a
//! [`DecodeError`] value for the caller to skip over.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageReader, Limits, RgbaImage};
use thiserror::Error;

use crate::trace::trace;

/// Default resampling filter for [`scale_to_width`].
pub const DEFAULT_FILTER: FilterType = FilterType::Lanczos3;

/// The reassembled bytes are not a complete image in a known format.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Zero bytes arrived.
    #[error("empty image buffer")]
    Empty,
    /// No supported format matched the leading bytes.
    #[error("unrecognised image format")]
    UnknownFormat,
    /// The format was recognised but the data did not decode.
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    /// Scaling to the target width would need more memory than the decoder
    /// is allowed to allocate.
    #[error("scaled image {width}x{height} exceeds the {limit} byte allocation limit")]
    TooLarge { width: u32, height: u32, limit: u64 },
}

/// A decoded RGBA bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pixels: RgbaImage,
}

impl DecodedFrame {
    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the underlying bitmap.
    #[must_use]
    pub const fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Packs each pixel as `0x00RRGGBB`, row-major.
    ///
    /// Alpha is dropped; the surface this feeds is opaque.
    #[must_use]
    pub fn to_xrgb(&self) -> Vec<u32> {
        self.pixels
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
            })
            .collect()
    }
}

impl From<RgbaImage> for DecodedFrame {
    fn from(pixels: RgbaImage) -> Self {
        Self { pixels }
    }
}

/// Decodes `bytes`, detecting the format from its contents.
///
/// # Errors
///
/// Returns a [`DecodeError`] for empty input, an unknown format, or data
/// that fails to decode (truncated, corrupted).
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    let Some(format) = reader.format() else {
        return Err(DecodeError::UnknownFormat);
    };

    let image = reader.decode()?;
    trace!(
        ?format,
        width = image.width(),
        height = image.height(),
        "image decoded"
    );

    Ok(DecodedFrame {
        pixels: image.into_rgba8(),
    })
}

/// Height that keeps the aspect ratio of a `width` × `height` source scaled
/// to `target_width`: `floor(target_width * height / width)`, at least 1.
#[must_use]
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let h = u64::from(target_width) * u64::from(height) / u64::from(width);
    u32::try_from(h).unwrap_or(u32::MAX).max(1)
}

/// Largest RGBA buffer [`scale_to_width`] will allocate: the `image`
/// crate's default decoder allocation limit.
#[must_use]
pub fn max_scaled_bytes() -> u64 {
    Limits::default().max_alloc.unwrap_or(u64::MAX)
}

/// Resamples `frame` to exactly `target_width` pixels wide, keeping its
/// aspect ratio. `target_width` of 0 is treated as 1.
///
/// # Errors
///
/// Returns [`DecodeError::TooLarge`] if the scaled RGBA buffer would exceed
/// [`max_scaled_bytes`]. A 1-pixel-wide strip scaled to screen width is
/// the usual culprit.
pub fn scale_to_width(
    frame: &DecodedFrame,
    target_width: u32,
    filter: FilterType,
) -> Result<DecodedFrame, DecodeError> {
    let target_width = target_width.max(1);
    let target_height = scaled_height(frame.width(), frame.height(), target_width);

    if (target_width, target_height) == (frame.width(), frame.height()) {
        return Ok(frame.clone());
    }

    let limit = max_scaled_bytes();
    let bytes = u64::from(target_width) * u64::from(target_height) * 4;
    if bytes > limit {
        return Err(DecodeError::TooLarge {
            width: target_width,
            height: target_height,
            limit,
        });
    }

    Ok(DecodedFrame {
        pixels: imageops::resize(&frame.pixels, target_width, target_height, filter),
    })
}
