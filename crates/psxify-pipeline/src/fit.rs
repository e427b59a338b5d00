//! Fitting the source image into the caller's output bounds.
//!
//! The target size preserves the source aspect ratio and never exceeds
//! the source size. Width is constrained first, then height is checked
//! against the already-scaled value, matching how a canvas is sized
//! before the first draw.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, RasterBuffer};

/// Resampling filter used when the source is scaled to the fitted size.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, close to a browser canvas draw.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Compute the output size for a `source` image under optional bounds.
///
/// Fractional results are truncated and never drop below one pixel.
///
/// # Errors
///
/// Returns [`PipelineError::ZeroDimension`] if either source side is zero.
pub fn fit_dimensions(
    source: Dimensions,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Result<Dimensions, PipelineError> {
    if source.width == 0 || source.height == 0 {
        return Err(PipelineError::ZeroDimension {
            width: source.width,
            height: source.height,
        });
    }

    let mut width = f64::from(source.width);
    let mut height = f64::from(source.height);

    if let Some(max_w) = max_width.map(f64::from)
        && width > max_w
    {
        height *= max_w / width;
        width = max_w;
    }

    if let Some(max_h) = max_height.map(f64::from)
        && height > max_h
    {
        width *= max_h / height;
        height = max_h;
    }

    Ok(Dimensions::new(truncate_side(width), truncate_side(height)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate_side(value: f64) -> u32 {
    (value.floor() as u32).max(1)
}

/// Resize `image` to `target` with the given filter.
///
/// Returns the image unchanged (no copy) when it already has the target
/// size.
#[must_use = "returns the resized image"]
pub fn resize_to(image: RasterBuffer, target: Dimensions, filter: ResizeFilter) -> RasterBuffer {
    if Dimensions::of(&image) == target {
        return image;
    }
    image::imageops::resize(
        &image,
        target.width,
        target.height,
        filter.to_image_filter(),
    )
}
