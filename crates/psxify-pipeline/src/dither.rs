//! Ordered dithering.
//!
//! Two mutually exclusive algorithms:
//!
//! - [`DitherType::Bayer`]: an 8x8 threshold matrix biases each channel
//!   before rounding to `levels` evenly spaced values. Higher depth gives
//!   finer levels; lower intensity gives a subtler pattern.
//! - [`DitherType::Psx`]: a 2x2 matrix floors the top-left pixel of every
//!   block to a multiple of 64 and ceils the bottom-left one (odd row,
//!   even column). The other
//!   two positions pass through untouched, reproducing the console's
//!   asymmetric hardware pattern. Depth and intensity are ignored.
//!
//! Both operate in place on RGB and leave alpha alone.

use crate::types::{DitherType, RasterBuffer};

/// 8x8 Bayer threshold matrix, values `0..64`, indexed `[x % 8][y % 8]`.
pub const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// 2x2 console dither matrix, indexed `[y % 2][x % 2]`.
pub const PSX_2X2: [[u8; 2]; 2] = [[0, 2], [3, 1]];

/// Granularity of the PSX floor/ceil steps.
const PSX_STEP: u16 = 64;

/// Dither parameters for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DitherParams {
    /// Which matrix to use.
    pub kind: DitherType,
    /// Quantization levels for Bayer, clamped to `[2, 256]`.
    pub depth: u32,
    /// Bias strength for Bayer, clamped to `[0, 1]`.
    pub intensity: f64,
}

/// Apply the selected dither algorithm in place.
pub fn dither(image: &mut RasterBuffer, params: DitherParams) {
    match params.kind {
        DitherType::Bayer => bayer(image, params.depth, params.intensity),
        DitherType::Psx => psx(image),
    }
}

/// Bayer ordered dither to `depth` levels per channel.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bayer(image: &mut RasterBuffer, depth: u32, intensity: f64) {
    let levels = depth.clamp(2, 256);
    let step = 255.0 / f64::from(levels - 1);
    let factor = intensity.clamp(0.0, 1.0);

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let threshold = BAYER_8X8[(x % 8) as usize][(y % 8) as usize];
        let bias = (f64::from(threshold) / 64.0 - 0.5) * factor;

        for channel in &mut pixel.0[..3] {
            let biased = bias.mul_add(step, f64::from(*channel));
            let snapped = (biased / step).round() * step;
            *channel = snapped.clamp(0.0, 255.0).round_ties_even() as u8;
        }
    }
}

/// Console 2x2 floor/ceil dither.
pub fn psx(image: &mut RasterBuffer) {
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        match PSX_2X2[(y % 2) as usize][(x % 2) as usize] {
            0 => pixel.0[..3].iter_mut().for_each(|c| *c = psx_floor(*c)),
            3 => pixel.0[..3].iter_mut().for_each(|c| *c = psx_ceil(*c)),
            _ => {}
        }
    }
}

/// Floor to a multiple of 64.
const fn psx_floor(value: u8) -> u8 {
    value / PSX_STEP as u8 * PSX_STEP as u8
}

/// Ceil to a multiple of 64, saturating at 255.
#[allow(clippy::cast_possible_truncation)]
const fn psx_ceil(value: u8) -> u8 {
    let ceiled = (value as u16).div_ceil(PSX_STEP) * PSX_STEP;
    if ceiled > 255 { 255 } else { ceiled as u8 }
}
