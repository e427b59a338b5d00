//! Geometric distortion: vertex wobble and affine perspective smear.
//!
//! Both effects rebuild the whole buffer from a read-only source and
//! force alpha to 255 on every pixel they write.

use rand::Rng;

use crate::types::RasterBuffer;

/// Side length of a wobble quad.
const QUAD: u32 = 2;

/// Jitter every 2x2 quad of `image` by a random sub-quad offset.
///
/// Each quad draws one horizontal and one vertical offset uniformly from
/// `[-intensity, intensity)`. The top-left corner of a quad is never
/// displaced; the right column shifts by the horizontal offset and the
/// bottom row by the vertical one. A displaced sample that falls outside
/// the source leaves its destination transparent black (a tear).
///
/// Negative or non-finite intensity is treated as zero, which reduces the
/// stage to copying RGB with alpha forced opaque. Intensity is capped at
/// the longer image side; every displaced sample past that tears anyway.
#[must_use = "returns the wobbled image"]
#[allow(clippy::cast_possible_truncation)]
pub fn vertex_wobble<R: Rng + ?Sized>(
    image: &RasterBuffer,
    intensity: f64,
    rng: &mut R,
) -> RasterBuffer {
    let (width, height) = image.dimensions();
    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, f64::from(width.max(height)))
    } else {
        0.0
    };
    let mut out = RasterBuffer::new(width, height);

    for y in (0..height).step_by(QUAD as usize) {
        for x in (0..width).step_by(QUAD as usize) {
            let wobble_x = draw_offset(intensity, rng);
            let wobble_y = draw_offset(intensity, rng);

            for py in 0..QUAD {
                for px in 0..QUAD {
                    let (dst_x, dst_y) = (x + px, y + py);
                    if dst_x >= width || dst_y >= height {
                        continue;
                    }
                    let src_x = wobble_x.mul_add(f64::from(px), f64::from(dst_x)).floor();
                    let src_y = wobble_y.mul_add(f64::from(py), f64::from(dst_y)).floor();
                    if let Some((sx, sy)) = in_bounds(src_x, src_y, width, height) {
                        let [r, g, b, _] = image.get_pixel(sx, sy).0;
                        out.put_pixel(dst_x, dst_y, image::Rgba([r, g, b, 255]));
                    }
                }
            }
        }
    }
    out
}

fn draw_offset<R: Rng + ?Sized>(intensity: f64, rng: &mut R) -> f64 {
    if intensity > 0.0 {
        rng.gen_range(-intensity..intensity)
    } else {
        0.0
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn in_bounds(x: f64, y: f64, width: u32, height: u32) -> Option<(u32, u32)> {
    if x < 0.0 || y < 0.0 || x >= f64::from(width) || y >= f64::from(height) {
        return None;
    }
    Some((x as u32, y as u32))
}

/// Horizontally stretch each row by an amount that grows toward the
/// bottom of the image, wrapping around at the right edge.
///
/// Row `y` samples column `floor(x * (1 + y / height * intensity)) mod
/// width`. Intensity zero copies RGB unchanged with alpha forced opaque.
#[must_use = "returns the distorted image"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn perspective(image: &RasterBuffer, intensity: f64) -> RasterBuffer {
    let (width, height) = image.dimensions();
    let intensity = if intensity.is_finite() {
        intensity.max(0.0)
    } else {
        0.0
    };

    RasterBuffer::from_fn(width, height, |x, y| {
        let scale = 1.0 + f64::from(y) / f64::from(height) * intensity;
        let src_x = ((f64::from(x) * scale).floor() as u64 % u64::from(width)) as u32;
        let [r, g, b, _] = image.get_pixel(src_x, y).0;
        image::Rgba([r, g, b, 255])
    })
}

/// Number of fully transparent pixels, i.e. tears left by
/// [`vertex_wobble`].
#[must_use]
pub fn torn_pixels(image: &RasterBuffer) -> u64 {
    image.pixels().filter(|p| p[3] == 0).count() as u64
}
