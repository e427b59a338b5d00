//! Color depth reduction and luminance palettes.
//!
//! First every RGB channel drops to 5 bits (32 levels, the 15-bit color
//! of the target hardware). Below a full 256-entry palette the pixel is
//! then collapsed onto a gray ramp of `palette_size` evenly spaced
//! entries indexed by average brightness. Alpha is never modified.

use crate::types::RasterBuffer;

/// Palette size at which the luminance collapse is disabled.
pub const FULL_PALETTE: u32 = 256;

/// Width of one 5-bit quantization step.
const CHANNEL_STEP: u8 = 8;

/// Quantize a single channel to 5 bits: `floor(v / 8) * 8`.
#[must_use]
pub const fn quantize_channel(value: u8) -> u8 {
    value / CHANNEL_STEP * CHANNEL_STEP
}

/// Map an RGB triple onto the gray ramp of a `palette_size` palette.
///
/// `palette_size` is clamped to `[2, 256]`. The returned level is
/// `floor(brightness / step) * step` with `step = 256 / palette_size`,
/// rounded to the nearest integer with ties to even.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn luminance_level(rgb: [u8; 3], palette_size: u32) -> u8 {
    let size = palette_size.clamp(2, FULL_PALETTE);
    let step = f64::from(FULL_PALETTE) / f64::from(size);
    let brightness = (f64::from(rgb[0]) + f64::from(rgb[1]) + f64::from(rgb[2])) / 3.0;
    let index = (brightness / step).floor();
    (index * step).round_ties_even().clamp(0.0, 255.0) as u8
}

/// Apply 5-bit quantization and, when `palette_size < 256`, the
/// luminance collapse. Operates in place.
pub fn quantize(image: &mut RasterBuffer, palette_size: u32) {
    let collapse = palette_size < FULL_PALETTE;
    for pixel in image.pixels_mut() {
        let rgb = [
            quantize_channel(pixel[0]),
            quantize_channel(pixel[1]),
            quantize_channel(pixel[2]),
        ];
        let rgb = if collapse {
            let level = luminance_level(rgb, palette_size);
            [level; 3]
        } else {
            rgb
        };
        pixel.0[..3].copy_from_slice(&rgb);
    }
}

/// Count the distinct RGB colors in an image.
///
/// Used by diagnostics to report how far the palette stage reduced the
/// image.
#[must_use]
pub fn distinct_colors(image: &RasterBuffer) -> usize {
    let mut seen = std::collections::HashSet::new();
    for pixel in image.pixels() {
        seen.insert([pixel[0], pixel[1], pixel[2]]);
    }
    seen.len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn noisy(w: u32, h: u32) -> RasterBuffer {
        RasterBuffer::from_fn(w, h, |x, y| {
            let v = x * 31 + y * 57;
            image::Rgba([(v % 256) as u8, ((v * 3) % 256) as u8, ((v * 7) % 256) as u8, 77])
        })
    }

    #[test]
    fn quantize_channel_floors_to_multiples_of_eight() {
        assert_eq!(quantize_channel(0), 0);
        assert_eq!(quantize_channel(7), 0);
        assert_eq!(quantize_channel(8), 8);
        assert_eq!(quantize_channel(100), 96);
        assert_eq!(quantize_channel(255), 248);
    }

    #[test]
    fn full_palette_only_quantizes_channels() {
        let mut img = RasterBuffer::from_pixel(2, 2, image::Rgba([100, 150, 203, 9]));
        quantize(&mut img, FULL_PALETTE);
        for p in img.pixels() {
            assert_eq!(p.0, [96, 144, 200, 9]);
        }
    }

    #[test]
    fn full_palette_keeps_color() {
        let mut img = noisy(16, 16);
        quantize(&mut img, FULL_PALETTE);
        assert!(
            img.pixels().any(|p| p[0] != p[1] || p[1] != p[2]),
            "channels should stay independent at full palette size",
        );
        for p in img.pixels() {
            assert!(p.0[..3].iter().all(|c| c % 8 == 0));
        }
    }

    #[test]
    fn two_color_palette_is_gray_with_two_levels() {
        let mut img = noisy(32, 32);
        quantize(&mut img, 2);
        for p in img.pixels() {
            assert_eq!(p[0], p[1]);
            assert_eq!(p[1], p[2]);
            assert!(p[0] == 0 || p[0] == 128, "unexpected level {}", p[0]);
        }
        assert_eq!(distinct_colors(&img), 2);
    }

    #[test]
    fn palette_never_exceeds_requested_size() {
        for size in [2, 3, 4, 7, 16, 100, 255] {
            let mut img = noisy(64, 64);
            quantize(&mut img, size);
            assert!(
                distinct_colors(&img) <= size as usize,
                "palette {size} produced {} colors",
                distinct_colors(&img),
            );
        }
    }

    #[test]
    fn alpha_is_untouched() {
        let mut img = noisy(8, 8);
        quantize(&mut img, 4);
        assert!(img.pixels().all(|p| p[3] == 77));
    }

    #[test]
    fn luminance_level_examples() {
        // brightness 255 with 2 entries: floor(255 / 128) * 128 = 128
        assert_eq!(luminance_level([255, 255, 255], 2), 128);
        // brightness 127 with 2 entries: 0
        assert_eq!(luminance_level([127, 127, 127], 2), 0);
        // non-integer step: 256 / 3 = 85.33; brightness 200 -> index 2 -> 170.67 -> 171
        assert_eq!(luminance_level([200, 200, 200], 3), 171);
        // out-of-range sizes clamp to 2
        assert_eq!(luminance_level([255, 255, 255], 1), 128);
    }

    #[test]
    fn distinct_colors_ignores_alpha() {
        let img = RasterBuffer::from_fn(2, 1, |x, _| image::Rgba([1, 2, 3, x as u8]));
        assert_eq!(distinct_colors(&img), 1);
    }
}
