//! Image decoding and the frame loader seam.
//!
//! The pipeline never touches the filesystem or network. A
//! [`FrameLoader`] hands it a decoded RGBA image; this module provides
//! the in-memory implementation ([`BytesLoader`]) and the decoding
//! helper shared by every loader that starts from encoded bytes.

use crate::types::{PipelineError, RasterBuffer};

/// Decode raw image bytes into an RGBA buffer.
///
/// Supports whatever formats the `image` crate was built with (PNG,
/// JPEG, BMP, WebP, GIF by default). Every input is converted to 8-bit
/// RGBA.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
/// Returns [`PipelineError::ZeroDimension`] if the decoded image has no
/// pixels.
pub fn decode_rgba(bytes: &[u8]) -> Result<RasterBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(PipelineError::ZeroDimension {
            width: rgba.width(),
            height: rgba.height(),
        });
    }
    Ok(rgba)
}

/// Something that can produce a decoded source frame.
///
/// Loaders may be slow (network, large files); the orchestrator runs them
/// off the caller's thread, hence the `Send + 'static` bound.
pub trait FrameLoader: Send + 'static {
    /// Produce the decoded RGBA source image.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] whose [`kind`](PipelineError::kind) is
    /// `InvalidSource` for missing or undecodable input and
    /// `DecodeBlocked` when pixel access is refused.
    fn load(&self) -> Result<RasterBuffer, PipelineError>;
}

impl<F> FrameLoader for F
where
    F: Fn() -> Result<RasterBuffer, PipelineError> + Send + 'static,
{
    fn load(&self) -> Result<RasterBuffer, PipelineError> {
        self()
    }
}

/// Loader for an encoded image already held in memory.
#[derive(Debug, Clone)]
pub struct BytesLoader {
    bytes: Vec<u8>,
}

impl BytesLoader {
    /// Wrap encoded image bytes.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl FrameLoader for BytesLoader {
    fn load(&self) -> Result<RasterBuffer, PipelineError> {
        decode_rgba(&self.bytes)
    }
}
