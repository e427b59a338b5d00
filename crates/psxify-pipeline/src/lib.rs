//! psxify-pipeline: retro console raster effects (sans-IO).
//!
//! Degrades a decoded RGBA image into a low-fidelity console rendering
//! through a fixed sequence of stages:
//! fit -> pixelate -> palette -> dither -> distort -> noise.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! buffers; filesystem access, logging setup and output encoding live in
//! the `psxify` binary. The only ways in are a [`FrameLoader`] (anything
//! that yields a decoded [`RasterBuffer`]) or a buffer the caller already
//! holds.

pub mod decode;
pub mod diagnostics;
pub mod distort;
pub mod dither;
pub mod fit;
pub mod noise;
pub mod orchestrator;
pub mod palette;
pub mod pipeline;
pub mod pixelate;
pub mod types;

pub use decode::{BytesLoader, FrameLoader, decode_rgba};
pub use fit::ResizeFilter;
pub use noise::{NoiseSource, SimplexNoise};
pub use orchestrator::{Orchestrator, RequestToken, RunOutcome};
pub use pipeline::{Pipeline, PipelineStage};
pub use types::{
    Dimensions, DitherType, EffectConfig, ErrorKind, PipelineError, PipelineResult, RasterBuffer,
};

use rand::Rng;

/// Run every effect stage on a decoded source image.
///
/// The config is clamped first; out-of-range values never cause an
/// error. `rng` drives vertex wobble and `noise` the overlay, so fixed
/// inputs give a fixed output.
///
/// # Pipeline steps
///
/// 1. Fit into `max_width` / `max_height`, preserving aspect ratio
/// 2. Mosaic pixelation (when `pixel_size > 1`)
/// 3. 5-bit quantization and luminance palette (when `palette_size < 256`)
/// 4. Bayer or PSX ordered dithering (when enabled)
/// 5. Vertex wobble, then perspective smear (each when enabled)
/// 6. Coherent noise overlay (when `noise_scale > 0`)
///
/// # Errors
///
/// Returns [`PipelineError::ZeroDimension`] if the source has a zero
/// side.
pub fn process<R: Rng + ?Sized>(
    source: RasterBuffer,
    config: &EffectConfig,
    rng: &mut R,
    noise: &dyn NoiseSource,
) -> Result<PipelineResult, PipelineError> {
    Ok(Pipeline::new(source, config)
        .fit()?
        .pixelate()
        .quantize()
        .dither()
        .distort(rng)
        .overlay_noise(noise)
        .into_result())
}
