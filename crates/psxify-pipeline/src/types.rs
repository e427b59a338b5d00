//! Shared types for the psxify effects pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fit::ResizeFilter;

/// Re-export `RgbaImage` so downstream crates can reference raster
/// buffers without depending on `image` directly.
pub use image::RgbaImage;

/// The buffer handed from stage to stage.
///
/// Always 8-bit RGBA with `width * height * 4` bytes of storage; the
/// `image` crate enforces the length invariant on construction.
pub type RasterBuffer = RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing buffer.
    #[must_use]
    pub fn of(buffer: &RasterBuffer) -> Self {
        Self::new(buffer.width(), buffer.height())
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Ordered dithering algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherType {
    /// 8x8 Bayer threshold matrix quantizing to `dither_depth` levels.
    #[default]
    Bayer,
    /// 2x2 console-style matrix that floors and ceils alternate pixels to
    /// multiples of 64.
    Psx,
}

impl fmt::Display for DitherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bayer => f.write_str("Bayer"),
            Self::Psx => f.write_str("Psx"),
        }
    }
}

/// Parameters for one pipeline run.
///
/// Every field is independently settable. Values outside the documented
/// ranges are never rejected; [`EffectConfig::clamped`] pulls them back
/// into range and the orchestrator always runs on the clamped copy.
///
/// Missing fields deserialize to their defaults, so partial JSON such as
/// `{"pixel_size": 12}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Coherent noise frequency and blend opacity, `[0, 0.1]`.
    /// Zero disables the noise overlay.
    pub noise_scale: f64,

    /// Mosaic fraction in percent of the output size, `[1, 100]`.
    /// Smaller values produce coarser blocks; 1 disables pixelation.
    pub pixel_size: u32,

    /// Whether the dither stage runs.
    pub dithering_enabled: bool,

    /// Quantization levels per channel for Bayer dithering, `[1, 256]`.
    pub dither_depth: u32,

    /// Strength of the Bayer bias, `[0.1, 2.0]`. The stage itself caps the
    /// effective factor at 1.0.
    pub dither_intensity: f64,

    /// Which dither matrix to apply.
    pub dither_type: DitherType,

    /// Whether per-quad vertex jitter runs.
    pub vertex_wobble_enabled: bool,

    /// Maximum jitter in pixels, `[0, 1]`.
    pub vertex_intensity: f64,

    /// Number of luminance palette entries, `[2, 256]`. 256 disables the
    /// palette stage.
    pub palette_size: u32,

    /// Whether the affine perspective smear runs.
    pub perspective_enabled: bool,

    /// Horizontal scale added at the bottom row, `[0, 1]`.
    pub perspective_intensity: f64,

    /// Output width bound, `None` for unbounded.
    pub max_width: Option<u32>,

    /// Output height bound, `None` for unbounded.
    pub max_height: Option<u32>,

    /// Filter used when fitting the source into the output bounds.
    pub resize_filter: ResizeFilter,
}

impl EffectConfig {
    /// Default noise scale (overlay disabled).
    pub const DEFAULT_NOISE_SCALE: f64 = 0.0;
    /// Default pixel size (pixelation disabled).
    pub const DEFAULT_PIXEL_SIZE: u32 = 1;
    /// Default dither depth.
    pub const DEFAULT_DITHER_DEPTH: u32 = 32;
    /// Default dither intensity.
    pub const DEFAULT_DITHER_INTENSITY: f64 = 1.0;
    /// Default vertex jitter.
    pub const DEFAULT_VERTEX_INTENSITY: f64 = 0.015;
    /// Default palette size (palette stage disabled).
    pub const DEFAULT_PALETTE_SIZE: u32 = 256;
    /// Default perspective intensity.
    pub const DEFAULT_PERSPECTIVE_INTENSITY: f64 = 0.2;
    /// Default output width bound.
    pub const DEFAULT_MAX_WIDTH: u32 = 800;
    /// Default output height bound.
    pub const DEFAULT_MAX_HEIGHT: u32 = 500;

    /// Accepted range for [`noise_scale`](Self::noise_scale).
    pub const NOISE_SCALE_RANGE: (f64, f64) = (0.0, 0.1);
    /// Accepted range for [`pixel_size`](Self::pixel_size).
    pub const PIXEL_SIZE_RANGE: (u32, u32) = (1, 100);
    /// Accepted range for [`dither_depth`](Self::dither_depth).
    pub const DITHER_DEPTH_RANGE: (u32, u32) = (1, 256);
    /// Accepted range for [`dither_intensity`](Self::dither_intensity).
    pub const DITHER_INTENSITY_RANGE: (f64, f64) = (0.1, 2.0);
    /// Accepted range for [`vertex_intensity`](Self::vertex_intensity).
    pub const VERTEX_INTENSITY_RANGE: (f64, f64) = (0.0, 1.0);
    /// Accepted range for [`palette_size`](Self::palette_size).
    pub const PALETTE_SIZE_RANGE: (u32, u32) = (2, 256);
    /// Accepted range for [`perspective_intensity`](Self::perspective_intensity).
    pub const PERSPECTIVE_INTENSITY_RANGE: (f64, f64) = (0.0, 1.0);

    /// Return a copy with every field pulled into its accepted range.
    ///
    /// Non-finite floats fall back to the field default. Zero output
    /// bounds become 1.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            noise_scale: clamp_f64(
                self.noise_scale,
                Self::NOISE_SCALE_RANGE,
                Self::DEFAULT_NOISE_SCALE,
            ),
            pixel_size: self
                .pixel_size
                .clamp(Self::PIXEL_SIZE_RANGE.0, Self::PIXEL_SIZE_RANGE.1),
            dithering_enabled: self.dithering_enabled,
            dither_depth: self
                .dither_depth
                .clamp(Self::DITHER_DEPTH_RANGE.0, Self::DITHER_DEPTH_RANGE.1),
            dither_intensity: clamp_f64(
                self.dither_intensity,
                Self::DITHER_INTENSITY_RANGE,
                Self::DEFAULT_DITHER_INTENSITY,
            ),
            dither_type: self.dither_type,
            vertex_wobble_enabled: self.vertex_wobble_enabled,
            vertex_intensity: clamp_f64(
                self.vertex_intensity,
                Self::VERTEX_INTENSITY_RANGE,
                Self::DEFAULT_VERTEX_INTENSITY,
            ),
            palette_size: self
                .palette_size
                .clamp(Self::PALETTE_SIZE_RANGE.0, Self::PALETTE_SIZE_RANGE.1),
            perspective_enabled: self.perspective_enabled,
            perspective_intensity: clamp_f64(
                self.perspective_intensity,
                Self::PERSPECTIVE_INTENSITY_RANGE,
                Self::DEFAULT_PERSPECTIVE_INTENSITY,
            ),
            max_width: self.max_width.map(|w| w.max(1)),
            max_height: self.max_height.map(|h| h.max(1)),
            resize_filter: self.resize_filter,
        }
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            noise_scale: Self::DEFAULT_NOISE_SCALE,
            pixel_size: Self::DEFAULT_PIXEL_SIZE,
            dithering_enabled: false,
            dither_depth: Self::DEFAULT_DITHER_DEPTH,
            dither_intensity: Self::DEFAULT_DITHER_INTENSITY,
            dither_type: DitherType::default(),
            vertex_wobble_enabled: false,
            vertex_intensity: Self::DEFAULT_VERTEX_INTENSITY,
            palette_size: Self::DEFAULT_PALETTE_SIZE,
            perspective_enabled: false,
            perspective_intensity: Self::DEFAULT_PERSPECTIVE_INTENSITY,
            max_width: Some(Self::DEFAULT_MAX_WIDTH),
            max_height: Some(Self::DEFAULT_MAX_HEIGHT),
            resize_filter: ResizeFilter::default(),
        }
    }
}

fn clamp_f64(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The final RGBA buffer.
    pub buffer: RasterBuffer,

    /// Dimensions actually produced (after fitting).
    pub dimensions: Dimensions,
}

/// Coarse classification of a [`PipelineError`].
///
/// Callers that only need to decide how to report a failure can match
/// on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing, empty, undecodable, or zero-sized input.
    InvalidSource,
    /// The source exists but its pixels may not be read.
    DecodeBlocked,
}

/// Errors that can occur during a pipeline run.
///
/// Every variant is fatal for the run that produced it only; the
/// orchestrator keeps accepting new runs afterwards.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The decoded source has a zero-length side.
    #[error("source image has zero dimension ({width}x{height})")]
    ZeroDimension {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
    },

    /// The source could not be reached (missing file, I/O failure).
    #[error("image source unavailable: {0}")]
    SourceUnavailable(String),

    /// Access to the source pixels was refused.
    #[error("pixel access blocked: {0}")]
    DecodeBlocked(String),
}

impl PipelineError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DecodeBlocked(_) => ErrorKind::DecodeBlocked,
            Self::ImageDecode(_)
            | Self::EmptyInput
            | Self::ZeroDimension { .. }
            | Self::SourceUnavailable(_) => ErrorKind::InvalidSource,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Dimensions tests ---

    #[test]
    fn dimensions_of_buffer() {
        let buf = RgbaImage::new(7, 3);
        assert_eq!(Dimensions::of(&buf), Dimensions::new(7, 3));
        assert_eq!(Dimensions::of(&buf).pixel_count(), 21);
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(640, 480).to_string(), "640x480");
    }

    // --- EffectConfig tests ---

    #[test]
    fn effect_config_defaults() {
        let config = EffectConfig::default();
        assert!(config.noise_scale.abs() < f64::EPSILON);
        assert_eq!(config.pixel_size, 1);
        assert!(!config.dithering_enabled);
        assert_eq!(config.dither_type, DitherType::Bayer);
        assert!((config.vertex_intensity - 0.015).abs() < f64::EPSILON);
        assert_eq!(config.palette_size, 256);
        assert!((config.perspective_intensity - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_width, Some(800));
        assert_eq!(config.max_height, Some(500));
    }

    #[test]
    fn defaults_are_already_in_range() {
        let config = EffectConfig::default();
        assert_eq!(config.clamped(), config);
    }

    #[test]
    fn clamped_pulls_values_into_range() {
        let config = EffectConfig {
            noise_scale: 0.5,
            pixel_size: 0,
            dither_depth: 1000,
            dither_intensity: 0.0,
            vertex_intensity: -1.0,
            palette_size: 1,
            perspective_intensity: 3.0,
            max_width: Some(0),
            max_height: None,
            ..EffectConfig::default()
        }
        .clamped();

        assert!((config.noise_scale - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.pixel_size, 1);
        assert_eq!(config.dither_depth, 256);
        assert!((config.dither_intensity - 0.1).abs() < f64::EPSILON);
        assert!(config.vertex_intensity.abs() < f64::EPSILON);
        assert_eq!(config.palette_size, 2);
        assert!((config.perspective_intensity - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.max_width, Some(1));
        assert_eq!(config.max_height, None);
    }

    #[test]
    fn clamped_replaces_non_finite_with_default() {
        let config = EffectConfig {
            noise_scale: f64::NAN,
            vertex_intensity: f64::INFINITY,
            ..EffectConfig::default()
        }
        .clamped();
        assert!(config.noise_scale.abs() < f64::EPSILON);
        assert!((config.vertex_intensity - 0.015).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EffectConfig =
            serde_json::from_str(r#"{"pixel_size": 12, "dither_type": "psx"}"#).unwrap();
        assert_eq!(config.pixel_size, 12);
        assert_eq!(config.dither_type, DitherType::Psx);
        assert_eq!(config.palette_size, EffectConfig::DEFAULT_PALETTE_SIZE);
    }

    #[test]
    fn effect_config_serde_round_trip() {
        let config = EffectConfig {
            noise_scale: 0.02,
            pixel_size: 25,
            dithering_enabled: true,
            dither_type: DitherType::Psx,
            vertex_wobble_enabled: true,
            max_width: None,
            resize_filter: ResizeFilter::Nearest,
            ..EffectConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EffectConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_kinds() {
        assert_eq!(PipelineError::EmptyInput.kind(), ErrorKind::InvalidSource);
        assert_eq!(
            PipelineError::ZeroDimension {
                width: 0,
                height: 4
            }
            .kind(),
            ErrorKind::InvalidSource,
        );
        assert_eq!(
            PipelineError::SourceUnavailable("gone".into()).kind(),
            ErrorKind::InvalidSource,
        );
        assert_eq!(
            PipelineError::DecodeBlocked("denied".into()).kind(),
            ErrorKind::DecodeBlocked,
        );
    }

    #[test]
    fn error_zero_dimension_display() {
        let err = PipelineError::ZeroDimension {
            width: 0,
            height: 10,
        };
        assert_eq!(err.to_string(), "source image has zero dimension (0x10)");
    }
}
