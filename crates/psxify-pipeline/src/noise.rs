//! Coherent noise overlay.
//!
//! A 2D noise field is sampled at `(x * scale, y * scale)`, mapped to a
//! gray level and blended over the image with opacity `scale`. The same
//! knob therefore controls both grain size and strength.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::types::RasterBuffer;

/// A 2D noise field.
///
/// Implementations must be deterministic for a given instance and return
/// values in `[-1, 1]`; the overlay clamps anything outside that range.
pub trait NoiseSource: Send + Sync {
    /// Sample the field at `(x, y)`.
    fn sample(&self, x: f64, y: f64) -> f64;
}

impl<F> NoiseSource for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn sample(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// Skew factor `(sqrt(3) - 1) / 2` for the 2D simplex grid.
const F2: f64 = 0.366_025_403_784_438_6;
/// Unskew factor `(3 - sqrt(3)) / 6`.
const G2: f64 = 0.211_324_865_405_187_1;

/// Gradient directions for the simplex corners.
const GRADIENTS: [[f64; 2]; 12] = [
    [1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [-1.0, -1.0],
    [1.0, 0.0],
    [-1.0, 0.0],
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [0.0, 1.0],
    [0.0, -1.0],
];

/// Output scale that maps the summed corner contributions to `[-1, 1]`.
const NORMALIZE: f64 = 70.0;

/// 2D simplex gradient noise with a seeded permutation table.
#[derive(Clone)]
pub struct SimplexNoise {
    perm: [u8; 512],
}

impl SimplexNoise {
    /// Build a noise field from `seed`. Equal seeds give equal fields.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { perm }
    }

    fn hash(&self, i: usize) -> usize {
        usize::from(self.perm[i])
    }
}

/// Contribution of one simplex corner at offset `(x, y)`.
fn corner(gi: usize, x: f64, y: f64) -> f64 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        return 0.0;
    }
    let [gx, gy] = GRADIENTS[gi % GRADIENTS.len()];
    let t2 = t * t;
    t2 * t2 * gx.mul_add(x, gy * y)
}

impl std::fmt::Debug for SimplexNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplexNoise").finish_non_exhaustive()
    }
}

impl NoiseSource for SimplexNoise {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::similar_names
    )]
    fn sample(&self, x: f64, y: f64) -> f64 {
        let s = (x + y) * F2;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let t = (i + j) * G2;
        let x0 = x - (i - t);
        let y0 = y - (j - t);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };
        let x1 = x0 - f64::from(i1) + G2;
        let y1 = y0 - f64::from(j1) + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i as i64).rem_euclid(256) as usize;
        let jj = (j as i64).rem_euclid(256) as usize;
        let (i1, j1) = (i1 as usize, j1 as usize);

        let g0 = self.hash(ii + self.hash(jj));
        let g1 = self.hash(ii + i1 + self.hash(jj + j1));
        let g2 = self.hash(ii + 1 + self.hash(jj + 1));

        let n = corner(g0, x0, y0) + corner(g1, x1, y1) + corner(g2, x2, y2);
        (NORMALIZE * n).clamp(-1.0, 1.0)
    }
}

/// Blend the noise field over `image` in place.
///
/// `scale` is both the sampling frequency and the blend opacity. A scale
/// of zero (or any non-positive or non-finite value) leaves the image
/// untouched. Alpha is never modified.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn overlay_noise(image: &mut RasterBuffer, scale: f64, noise: &dyn NoiseSource) {
    if !scale.is_finite() || scale <= 0.0 {
        return;
    }
    let opacity = scale.min(1.0);

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let n = noise
            .sample(f64::from(x) * scale, f64::from(y) * scale)
            .clamp(-1.0, 1.0);
        let gray = ((n + 1.0) * 128.0).floor().min(255.0);

        for channel in &mut pixel.0[..3] {
            let blended = f64::from(*channel).mul_add(1.0 - opacity, gray * opacity);
            *channel = blended.round_ties_even().clamp(0.0, 255.0) as u8;
        }
    }
}
