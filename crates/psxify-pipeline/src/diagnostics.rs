//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter experimentation. [`process_with_diagnostics`] runs the
//! same stage chain as [`crate::process`] and records how long each
//! stage took and what it did.
//!
//! Timestamps come from a caller-supplied [`Clock`] so the library stays
//! free of platform timing concerns. [`SystemClock`] uses the `web-time`
//! crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::noise::NoiseSource;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{EffectConfig, PipelineError, PipelineResult, RasterBuffer};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Capture the current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Every stage is always recorded; stages that were disabled by the
/// configuration report `applied: false` in their metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: fit into output bounds.
    pub fit: StageDiagnostics,
    /// Stage 2: mosaic pixelation.
    pub pixelate: StageDiagnostics,
    /// Stage 3: 5-bit quantization and luminance palette.
    pub palette: StageDiagnostics,
    /// Stage 4: ordered dithering.
    pub dither: StageDiagnostics,
    /// Stage 5: vertex wobble and perspective smear.
    pub distort: StageDiagnostics,
    /// Stage 6: noise overlay.
    pub noise: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Dimension fitting metrics.
    Fit {
        /// Source width in pixels.
        source_width: u32,
        /// Source height in pixels.
        source_height: u32,
        /// Fitted width in pixels.
        width: u32,
        /// Fitted height in pixels.
        height: u32,
        /// Resize filter name.
        filter: String,
        /// Whether the source was actually resized.
        applied: bool,
    },
    /// Pixelation metrics.
    Pixelate {
        /// Mosaic percentage.
        pixel_size: u32,
        /// Width of the intermediate image.
        reduced_width: u32,
        /// Height of the intermediate image.
        reduced_height: u32,
        /// Whether the stage ran.
        applied: bool,
    },
    /// Palette quantization metrics.
    Palette {
        /// Requested palette size.
        palette_size: u32,
        /// Distinct RGB colors in the stage output.
        distinct_colors: usize,
        /// Whether the stage ran.
        applied: bool,
    },
    /// Dither metrics.
    Dither {
        /// Dither algorithm name.
        kind: String,
        /// Bayer quantization levels.
        depth: u32,
        /// Bayer bias strength.
        intensity: f64,
        /// Whether the stage ran.
        applied: bool,
    },
    /// Geometric distortion metrics.
    Distort {
        /// Whether vertex wobble ran.
        wobble: bool,
        /// Whether the perspective smear ran.
        perspective: bool,
        /// Pixels left transparent by wobble tears.
        torn_pixels: u64,
    },
    /// Noise overlay metrics.
    Noise {
        /// Noise frequency and opacity.
        scale: f64,
        /// Whether the stage ran.
        applied: bool,
    },
}

/// High-level summary of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output pixel count.
    pub pixel_count: u64,
    /// Names of the stages that modified the buffer.
    pub applied_stages: Vec<String>,
}

impl StageMetrics {
    /// Whether the stage changed the buffer (or may have).
    #[must_use]
    pub const fn applied(&self) -> bool {
        match self {
            Self::Fit { applied, .. }
            | Self::Pixelate { applied, .. }
            | Self::Palette { applied, .. }
            | Self::Dither { applied, .. }
            | Self::Noise { applied, .. } => *applied,
            Self::Distort {
                wobble,
                perspective,
                ..
            } => *wobble || *perspective,
        }
    }
}

impl PipelineDiagnostics {
    /// Stages in pipeline order, paired with their display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Fit", &self.fit),
            ("Pixelate", &self.pixelate),
            ("Palette", &self.palette),
            ("Dither", &self.dither),
            ("Distort", &self.distort),
            ("Noise", &self.noise),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} -> {}x{} ({} pixels)",
            self.summary.source_width,
            self.summary.source_height,
            self.summary.width,
            self.summary.height,
            self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let applied = if self.summary.applied_stages.is_empty() {
            "none".to_string()
        } else {
            self.summary.applied_stages.join(", ")
        };
        lines.push(format!("Applied stages: {applied}"));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    if !metrics.applied() {
        return "skipped".to_string();
    }
    match metrics {
        StageMetrics::Fit {
            source_width,
            source_height,
            width,
            height,
            filter,
            ..
        } => format!("{source_width}x{source_height} -> {width}x{height} ({filter})"),
        StageMetrics::Pixelate {
            pixel_size,
            reduced_width,
            reduced_height,
            ..
        } => format!("{pixel_size}% via {reduced_width}x{reduced_height}"),
        StageMetrics::Palette {
            palette_size,
            distinct_colors,
            ..
        } => format!("size={palette_size} colors={distinct_colors}"),
        StageMetrics::Dither {
            kind,
            depth,
            intensity,
            ..
        } => format!("{kind} depth={depth} intensity={intensity:.2}"),
        StageMetrics::Distort {
            wobble,
            perspective,
            torn_pixels,
        } => format!("wobble={wobble} perspective={perspective} torn={torn_pixels}"),
        StageMetrics::Noise { scale, .. } => format!("scale={scale:.4}"),
    }
}

/// Run the full pipeline, timing every stage.
///
/// Identical output to [`crate::process`] for the same inputs.
///
/// # Errors
///
/// Returns [`PipelineError::ZeroDimension`] if the source has a zero
/// side.
pub fn process_with_diagnostics<R, C>(
    source: RasterBuffer,
    config: &EffectConfig,
    rng: &mut R,
    noise: &dyn NoiseSource,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), PipelineError>
where
    R: Rng + ?Sized,
    C: Clock,
{
    let start = clock.now();

    let t = clock.now();
    let fitted = Pipeline::new(source, config).fit()?;
    let fit = timed(&fitted, clock.elapsed(&t));

    let t = clock.now();
    let pixelated = fitted.pixelate();
    let pixelate = timed(&pixelated, clock.elapsed(&t));

    let t = clock.now();
    let quantized = pixelated.quantize();
    let palette = timed(&quantized, clock.elapsed(&t));

    let t = clock.now();
    let dithered = quantized.dither();
    let dither = timed(&dithered, clock.elapsed(&t));

    let t = clock.now();
    let distorted = dithered.distort(rng);
    let distort = timed(&distorted, clock.elapsed(&t));

    let t = clock.now();
    let finished = distorted.overlay_noise(noise);
    let noise = timed(&finished, clock.elapsed(&t));

    let total_duration = clock.elapsed(&start);

    let source_dims = finished.source_dimensions();
    let dims = finished.dimensions();
    let applied_stages = [
        ("fit", &fit),
        ("pixelate", &pixelate),
        ("palette", &palette),
        ("dither", &dither),
        ("distort", &distort),
        ("noise", &noise),
    ]
    .into_iter()
    .filter(|(_, d)| d.metrics.applied())
    .map(|(name, _)| name.to_string())
    .collect();

    let diagnostics = PipelineDiagnostics {
        fit,
        pixelate,
        palette,
        dither,
        distort,
        noise,
        total_duration,
        summary: PipelineSummary {
            source_width: source_dims.width,
            source_height: source_dims.height,
            width: dims.width,
            height: dims.height,
            pixel_count: dims.pixel_count(),
            applied_stages,
        },
    };

    Ok((finished.into_result(), diagnostics))
}

fn timed<S: PipelineStage>(stage: &S, duration: Duration) -> StageDiagnostics {
    let metrics = stage.metrics();
    tracing::debug!(
        stage = S::NAME,
        elapsed_ms = duration_ms(duration),
        applied = metrics.applied(),
        "stage complete"
    );
    StageDiagnostics { duration, metrics }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::noise::SimplexNoise;

    /// Clock that advances one millisecond per reading.
    struct StepClock(Cell<u64>);

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn sample_source() -> RasterBuffer {
        RasterBuffer::from_fn(40, 30, |x, y| image::Rgba([(x * 6) as u8, (y * 8) as u8, 90, 255]))
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_plain_process() {
        let config = EffectConfig {
            pixel_size: 20,
            palette_size: 8,
            dithering_enabled: true,
            vertex_wobble_enabled: true,
            noise_scale: 0.05,
            ..EffectConfig::default()
        };
        let noise = SimplexNoise::new(4);
        let (with_diag, _) = process_with_diagnostics(
            sample_source(),
            &config,
            &mut StdRng::seed_from_u64(9),
            &noise,
            &SystemClock,
        )
        .unwrap();
        let plain = crate::process(
            sample_source(),
            &config,
            &mut StdRng::seed_from_u64(9),
            &noise,
        )
        .unwrap();
        assert_eq!(with_diag.buffer.as_raw(), plain.buffer.as_raw());
    }

    #[test]
    fn default_config_applies_nothing() {
        let (_, diag) = process_with_diagnostics(
            sample_source(),
            &EffectConfig::default(),
            &mut StdRng::seed_from_u64(0),
            &SimplexNoise::new(0),
            &StepClock(Cell::new(0)),
        )
        .unwrap();
        assert!(diag.summary.applied_stages.is_empty());
        assert!(diag.stages().iter().all(|(_, d)| !d.metrics.applied()));
        assert_eq!(diag.summary.pixel_count, 40 * 30);
    }

    #[test]
    fn stage_durations_come_from_the_clock() {
        let (_, diag) = process_with_diagnostics(
            sample_source(),
            &EffectConfig::default(),
            &mut StdRng::seed_from_u64(0),
            &SimplexNoise::new(0),
            &StepClock(Cell::new(0)),
        )
        .unwrap();
        for (name, stage) in diag.stages() {
            assert_eq!(stage.duration, Duration::from_millis(1), "stage {name}");
        }
        assert!(diag.total_duration >= Duration::from_millis(6));
    }

    #[test]
    fn applied_stages_are_listed_in_order() {
        let config = EffectConfig {
            max_width: Some(20),
            palette_size: 4,
            noise_scale: 0.01,
            ..EffectConfig::default()
        };
        let (result, diag) = process_with_diagnostics(
            sample_source(),
            &config,
            &mut StdRng::seed_from_u64(0),
            &SimplexNoise::new(0),
            &SystemClock,
        )
        .unwrap();
        assert_eq!(diag.summary.applied_stages, vec!["fit", "palette", "noise"]);
        assert_eq!(result.dimensions.width, 20);
        assert_eq!(result.dimensions.height, 15);
    }

    #[test]
    fn report_mentions_every_stage() {
        let (_, diag) = process_with_diagnostics(
            sample_source(),
            &EffectConfig {
                dithering_enabled: true,
                ..EffectConfig::default()
            },
            &mut StdRng::seed_from_u64(0),
            &SimplexNoise::new(0),
            &SystemClock,
        )
        .unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        for name in ["Fit", "Pixelate", "Palette", "Dither", "Distort", "Noise"] {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("Bayer depth=32"));
        assert!(report.contains("Applied stages: dither"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let (_, diag) = process_with_diagnostics(
            sample_source(),
            &EffectConfig::default(),
            &mut StdRng::seed_from_u64(0),
            &SimplexNoise::new(0),
            &StepClock(Cell::new(0)),
        )
        .unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["fit"]["duration"].as_f64().unwrap() - 0.001).abs() < 1e-9);
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.pixelate.metrics, diag.pixelate.metrics);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = serde_json::json!({
            "duration": -1.0,
            "metrics": { "Noise": { "scale": 0.0, "applied": false } }
        });
        assert!(serde_json::from_value::<StageDiagnostics>(json).is_err());
    }
}
