//! Mosaic pixelation.
//!
//! Shrinks the image to a fraction of its size with nearest-neighbor
//! sampling, then blows it back up the same way. No interpolation happens
//! in either direction, so each reduced pixel becomes a hard-edged block.

use image::imageops::FilterType;

use crate::types::{Dimensions, RasterBuffer};

/// Largest accepted pixel size; at this value the image is unchanged.
pub const MAX_PIXEL_SIZE: u32 = 100;

/// Size of the intermediate image for a given `pixel_size`.
///
/// `pixel_size` is a percentage of the full size, clamped to
/// `[1, MAX_PIXEL_SIZE]`. Sides are truncated and never drop below one
/// pixel.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn reduced_dimensions(full: Dimensions, pixel_size: u32) -> Dimensions {
    let fraction = f64::from(pixel_size.clamp(1, MAX_PIXEL_SIZE)) / f64::from(MAX_PIXEL_SIZE);
    let side = |v: u32| ((f64::from(v) * fraction).floor() as u32).max(1);
    Dimensions::new(side(full.width), side(full.height))
}

/// Apply the mosaic effect.
///
/// `pixel_size <= 1` disables the stage and returns the input untouched,
/// as does any size whose reduced image equals the full image.
#[must_use = "returns the pixelated image"]
pub fn pixelate(image: RasterBuffer, pixel_size: u32) -> RasterBuffer {
    if pixel_size <= 1 {
        return image;
    }

    let full = Dimensions::of(&image);
    let reduced = reduced_dimensions(full, pixel_size);
    if reduced == full {
        return image;
    }

    let small = image::imageops::resize(&image, reduced.width, reduced.height, FilterType::Nearest);
    image::imageops::resize(&small, full.width, full.height, FilterType::Nearest)
}
