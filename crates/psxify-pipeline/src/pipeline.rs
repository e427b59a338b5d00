//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate buffer before continuing.
//!
//! Unlike [`crate::process`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use psxify_pipeline::{EffectConfig, Pipeline, PipelineError, RasterBuffer, SimplexNoise};
//! # fn run(source: RasterBuffer) -> Result<(), PipelineError> {
//! let noise = SimplexNoise::new(7);
//! let mut rng = rand::thread_rng();
//! let result = Pipeline::new(source, &EffectConfig::default())
//!     .fit()?
//!     .pixelate()
//!     .quantize()
//!     .dither()
//!     .distort(&mut rng)
//!     .overlay_noise(&noise)
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! moving the single working buffer along. No stage keeps a copy of an
//! earlier buffer, so peak memory stays at one fitted image plus whatever
//! scratch a stage needs while it runs.
//!
//! Whether a stage actually modifies the buffer is decided by the
//! configuration (which is clamped once, in [`Pipeline::new`]). Disabled
//! stages pass the buffer through untouched and report `applied: false`
//! in their [`StageMetrics`].

use rand::Rng;

use crate::diagnostics::StageMetrics;
use crate::dither::DitherParams;
use crate::noise::NoiseSource;
use crate::palette::FULL_PALETTE;
use crate::types::{Dimensions, EffectConfig, PipelineError, PipelineResult, RasterBuffer};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`fit`](Self::fit) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .fit() to continue"]
pub struct Pending {
    config: EffectConfig,
    source: RasterBuffer,
}

impl Pending {
    /// The decoded source image.
    #[must_use]
    pub const fn source(&self) -> &RasterBuffer {
        &self.source
    }

    /// The clamped configuration this run will use.
    #[must_use]
    pub const fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Fit the source into the configured bounds and advance to the
    /// [`Fitted`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ZeroDimension`] if the source has a zero
    /// side.
    pub fn fit(self) -> Result<Fitted, PipelineError> {
        let source_dimensions = Dimensions::of(&self.source);
        let target = crate::fit::fit_dimensions(
            source_dimensions,
            self.config.max_width,
            self.config.max_height,
        )?;
        let buffer = crate::fit::resize_to(self.source, target, self.config.resize_filter);
        tracing::debug!(source = %source_dimensions, target = %target, "fit");
        Ok(Fitted {
            config: self.config,
            buffer,
            source_dimensions,
        })
    }
}

// ───────────────────────── Stage 1: Fitted ───────────────────────────

/// Pipeline state after fitting the source into the output bounds.
///
/// Every later stage works on buffers of exactly this size. Call
/// [`pixelate`](Self::pixelate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .pixelate() to continue"]
pub struct Fitted {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
}

impl Fitted {
    /// Whether the source was resized.
    #[must_use]
    pub fn applied(&self) -> bool {
        Dimensions::of(&self.buffer) != self.source_dimensions
    }

    /// Advance to the pixelation stage.
    pub fn pixelate(self) -> Pixelated {
        let pixel_size = self.config.pixel_size;
        let buffer = crate::pixelate::pixelate(self.buffer, pixel_size);
        tracing::debug!(pixel_size, "pixelate");
        Pixelated {
            config: self.config,
            buffer,
            source_dimensions: self.source_dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Pixelated ────────────────────────

/// Pipeline state after mosaic pixelation.
///
/// Call [`quantize`](Self::quantize) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .quantize() to continue"]
pub struct Pixelated {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
}

impl Pixelated {
    /// Whether the mosaic changed the buffer.
    ///
    /// False when the reduced size equals the full size, which is always
    /// the case at a pixel size of 1 or 100.
    #[must_use]
    pub fn applied(&self) -> bool {
        let full = Dimensions::of(&self.buffer);
        self.config.pixel_size > 1
            && crate::pixelate::reduced_dimensions(full, self.config.pixel_size) != full
    }

    /// Advance to the palette stage.
    ///
    /// Runs only when `palette_size` is below a full palette; a full
    /// palette leaves the buffer untouched, 5-bit step included.
    pub fn quantize(self) -> Quantized {
        let mut buffer = self.buffer;
        let applied = self.config.palette_size < FULL_PALETTE;
        if applied {
            crate::palette::quantize(&mut buffer, self.config.palette_size);
        }
        tracing::debug!(palette_size = self.config.palette_size, applied, "quantize");
        Quantized {
            config: self.config,
            buffer,
            source_dimensions: self.source_dimensions,
            applied,
        }
    }
}

// ───────────────────────── Stage 3: Quantized ────────────────────────

/// Pipeline state after palette quantization.
///
/// Call [`dither`](Self::dither) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .dither() to continue"]
pub struct Quantized {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
    applied: bool,
}

impl Quantized {
    /// Whether the palette stage ran.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Advance to the dither stage.
    pub fn dither(self) -> Dithered {
        let mut buffer = self.buffer;
        let applied = self.config.dithering_enabled && self.config.dither_depth > 0;
        if applied {
            crate::dither::dither(
                &mut buffer,
                DitherParams {
                    kind: self.config.dither_type,
                    depth: self.config.dither_depth,
                    intensity: self.config.dither_intensity,
                },
            );
        }
        tracing::debug!(kind = %self.config.dither_type, applied, "dither");
        Dithered {
            config: self.config,
            buffer,
            source_dimensions: self.source_dimensions,
            applied,
        }
    }
}

// ───────────────────────── Stage 4: Dithered ─────────────────────────

/// Pipeline state after ordered dithering.
///
/// Call [`distort`](Self::distort) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .distort() to continue"]
pub struct Dithered {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
    applied: bool,
}

impl Dithered {
    /// Whether the dither stage ran.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Advance to the geometric distortion stage.
    ///
    /// `rng` drives the vertex wobble offsets and is not touched when
    /// wobble is disabled.
    pub fn distort<R: Rng + ?Sized>(self, rng: &mut R) -> Distorted {
        let mut buffer = self.buffer;
        let mut torn_pixels = 0;

        if self.config.vertex_wobble_enabled {
            buffer = crate::distort::vertex_wobble(&buffer, self.config.vertex_intensity, rng);
            torn_pixels = crate::distort::torn_pixels(&buffer);
        }
        if self.config.perspective_enabled {
            buffer = crate::distort::perspective(&buffer, self.config.perspective_intensity);
        }
        tracing::debug!(
            wobble = self.config.vertex_wobble_enabled,
            perspective = self.config.perspective_enabled,
            torn_pixels,
            "distort"
        );
        Distorted {
            config: self.config,
            buffer,
            source_dimensions: self.source_dimensions,
            torn_pixels,
        }
    }
}

// ───────────────────────── Stage 5: Distorted ────────────────────────

/// Pipeline state after vertex wobble and perspective smear.
///
/// Call [`overlay_noise`](Self::overlay_noise) to advance to the final
/// stage.
#[must_use = "pipeline stages are consumed by advancing; call .overlay_noise() to continue"]
pub struct Distorted {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
    torn_pixels: u64,
}

impl Distorted {
    /// Pixels left transparent by wobble tears.
    #[must_use]
    pub const fn torn_pixels(&self) -> u64 {
        self.torn_pixels
    }

    /// Blend the noise field over the buffer, the last pipeline step.
    pub fn overlay_noise(self, noise: &dyn NoiseSource) -> Finished {
        let mut buffer = self.buffer;
        crate::noise::overlay_noise(&mut buffer, self.config.noise_scale, noise);
        tracing::debug!(scale = self.config.noise_scale, "noise");
        Finished {
            config: self.config,
            buffer,
            source_dimensions: self.source_dimensions,
        }
    }
}

// ───────────────────────── Stage 6: Finished ─────────────────────────

/// Pipeline state after the noise overlay, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`PipelineResult`].
#[must_use = "call .into_result() to extract the PipelineResult"]
pub struct Finished {
    config: EffectConfig,
    buffer: RasterBuffer,
    source_dimensions: Dimensions,
}

impl Finished {
    /// Dimensions of the source before fitting.
    #[must_use]
    pub const fn source_dimensions(&self) -> Dimensions {
        self.source_dimensions
    }

    /// Output dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.buffer)
    }

    /// Consume the pipeline and return the final buffer.
    #[must_use]
    pub fn into_result(self) -> PipelineResult {
        let dimensions = Dimensions::of(&self.buffer);
        PipelineResult {
            buffer: self.buffer,
            dimensions,
        }
    }
}

// ──────────────────────── PipelineStage trait ────────────────────────

/// Total number of processing stages (excluding [`Pending`]).
pub const STAGE_COUNT: usize = 6;

/// Trait implemented by every processing stage, giving uniform access
/// to the current buffer and its metrics.
pub trait PipelineStage {
    /// Short machine-friendly name (e.g. `"pixelate"`).
    const NAME: &str;

    /// One-based position in the pipeline.
    const INDEX: usize;

    /// The buffer as it stands after this stage.
    fn buffer(&self) -> &RasterBuffer;

    /// Stage-specific metrics for diagnostics.
    fn metrics(&self) -> StageMetrics;

    /// Current buffer dimensions.
    fn dimensions(&self) -> Dimensions {
        Dimensions::of(self.buffer())
    }
}

impl PipelineStage for Fitted {
    const NAME: &str = "fit";
    const INDEX: usize = 1;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Fit {
            source_width: self.source_dimensions.width,
            source_height: self.source_dimensions.height,
            width: self.buffer.width(),
            height: self.buffer.height(),
            filter: self.config.resize_filter.to_string(),
            applied: self.applied(),
        }
    }
}

impl PipelineStage for Pixelated {
    const NAME: &str = "pixelate";
    const INDEX: usize = 2;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        let reduced =
            crate::pixelate::reduced_dimensions(Dimensions::of(&self.buffer), self.config.pixel_size);
        StageMetrics::Pixelate {
            pixel_size: self.config.pixel_size,
            reduced_width: reduced.width,
            reduced_height: reduced.height,
            applied: self.applied(),
        }
    }
}

impl PipelineStage for Quantized {
    const NAME: &str = "palette";
    const INDEX: usize = 3;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Palette {
            palette_size: self.config.palette_size,
            distinct_colors: crate::palette::distinct_colors(&self.buffer),
            applied: self.applied,
        }
    }
}

impl PipelineStage for Dithered {
    const NAME: &str = "dither";
    const INDEX: usize = 4;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Dither {
            kind: self.config.dither_type.to_string(),
            depth: self.config.dither_depth,
            intensity: self.config.dither_intensity,
            applied: self.applied,
        }
    }
}

impl PipelineStage for Distorted {
    const NAME: &str = "distort";
    const INDEX: usize = 5;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Distort {
            wobble: self.config.vertex_wobble_enabled,
            perspective: self.config.perspective_enabled,
            torn_pixels: self.torn_pixels,
        }
    }
}

impl PipelineStage for Finished {
    const NAME: &str = "noise";
    const INDEX: usize = 6;

    fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Noise {
            scale: self.config.noise_scale,
            applied: self.config.noise_scale > 0.0,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental effects pipeline.
///
/// Created via [`Pipeline::new`], which stores the source and a clamped
/// copy of the config without doing any processing. Each stage method
/// consumes the current state and returns the next, making it a
/// compile-time error to skip stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a decoded source and config.
    ///
    /// Out-of-range config values are clamped here, never rejected.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(source: RasterBuffer, config: &EffectConfig) -> Pending {
        Pending {
            config: config.clamped(),
            source,
        }
    }
}
