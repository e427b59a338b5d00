//! Integration test: whole-pipeline properties on small synthetic images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use psxify_pipeline::{
    BytesLoader, DitherType, EffectConfig, FrameLoader, PipelineResult, RasterBuffer,
    SimplexNoise, palette,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn photo(width: u32, height: u32) -> RasterBuffer {
    RasterBuffer::from_fn(width, height, |x, y| {
        image::Rgba([
            ((x * 255) / width.max(2)) as u8,
            ((y * 255) / height.max(2)) as u8,
            ((x * y) % 251) as u8,
            255,
        ])
    })
}

fn run(source: RasterBuffer, config: &EffectConfig) -> PipelineResult {
    psxify_pipeline::process(
        source,
        config,
        &mut StdRng::seed_from_u64(1234),
        &SimplexNoise::new(1234),
    )
    .expect("pipeline should succeed")
}

fn encode_png(img: &RasterBuffer) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();
    buf
}

#[test]
fn output_length_matches_dimensions_for_any_config() {
    let configs = [
        EffectConfig::default(),
        EffectConfig {
            pixel_size: 7,
            palette_size: 3,
            dithering_enabled: true,
            dither_depth: 2,
            ..EffectConfig::default()
        },
        EffectConfig {
            vertex_wobble_enabled: true,
            vertex_intensity: 1.0,
            perspective_enabled: true,
            perspective_intensity: 1.0,
            noise_scale: 0.1,
            max_width: Some(19),
            max_height: None,
            ..EffectConfig::default()
        },
    ];
    for config in &configs {
        let result = run(photo(53, 31), config);
        let expected = result.dimensions.pixel_count() * 4;
        assert_eq!(result.buffer.len() as u64, expected, "config {config:?}");
    }
}

#[test]
fn pixel_size_one_and_hundred_are_identity() {
    let source = photo(30, 20);
    for pixel_size in [1, 100] {
        let config = EffectConfig {
            pixel_size,
            ..EffectConfig::default()
        };
        let result = run(source.clone(), &config);
        assert_eq!(result.buffer.as_raw(), source.as_raw(), "pixel_size {pixel_size}");
    }
}

#[test]
fn disabled_dithering_is_identity_regardless_of_settings() {
    let source = photo(16, 16);
    let config = EffectConfig {
        dithering_enabled: false,
        dither_type: DitherType::Psx,
        dither_depth: 2,
        dither_intensity: 2.0,
        ..EffectConfig::default()
    };
    assert_eq!(run(source.clone(), &config).buffer.as_raw(), source.as_raw());
}

#[test]
fn zero_noise_is_identity() {
    let source = photo(16, 16);
    let config = EffectConfig {
        noise_scale: 0.0,
        ..EffectConfig::default()
    };
    assert_eq!(run(source.clone(), &config).buffer.as_raw(), source.as_raw());
}

#[test]
fn full_palette_quantizer_only_drops_low_bits() {
    let source = photo(20, 20);
    let mut quantized = source.clone();
    palette::quantize(&mut quantized, 256);
    for (q, s) in quantized.pixels().zip(source.pixels()) {
        for c in 0..3 {
            assert_eq!(q[c], s[c] / 8 * 8);
        }
        assert_eq!(q[3], s[3]);
    }
}

#[test]
fn two_entry_palette_is_two_gray_levels() {
    let config = EffectConfig {
        palette_size: 2,
        ..EffectConfig::default()
    };
    let result = run(photo(40, 40), &config);
    let mut levels = std::collections::BTreeSet::new();
    for p in result.buffer.pixels() {
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        levels.insert(p[0]);
    }
    assert_eq!(levels.into_iter().collect::<Vec<_>>(), vec![0, 128]);
}

#[test]
fn zero_intensity_distortions_only_force_alpha() {
    let source = RasterBuffer::from_fn(11, 9, |x, y| {
        image::Rgba([(x * 20) as u8, (y * 25) as u8, 77, (x * y) as u8])
    });
    let wobble = EffectConfig {
        vertex_wobble_enabled: true,
        vertex_intensity: 0.0,
        ..EffectConfig::default()
    };
    let perspective = EffectConfig {
        perspective_enabled: true,
        perspective_intensity: 0.0,
        ..EffectConfig::default()
    };
    for config in [&wobble, &perspective] {
        let result = run(source.clone(), config);
        for (out, src) in result.buffer.pixels().zip(source.pixels()) {
            assert_eq!(out.0[..3], src.0[..3]);
            assert_eq!(out[3], 255);
        }
    }
}

#[test]
fn uniform_image_with_defaults_is_untouched() {
    let source = RasterBuffer::from_pixel(4, 4, image::Rgba([100, 150, 200, 255]));
    let result = run(source, &EffectConfig::default());
    assert!(result.buffer.pixels().all(|p| p.0 == [100, 150, 200, 255]));
}

#[test]
fn psx_dither_on_flat_seventy() {
    let source = RasterBuffer::from_pixel(4, 4, image::Rgba([70, 70, 70, 255]));
    let config = EffectConfig {
        dithering_enabled: true,
        dither_type: DitherType::Psx,
        ..EffectConfig::default()
    };
    let result = run(source, &config);
    let row = |y: u32| -> Vec<u8> { (0..4).map(|x| result.buffer.get_pixel(x, y)[0]).collect() };
    // Floor at (even x, even y), ceil at (even x, odd y).
    assert_eq!(row(0), vec![64, 70, 64, 70]);
    assert_eq!(row(1), vec![128, 70, 128, 70]);
    assert_eq!(row(2), vec![64, 70, 64, 70]);
    assert_eq!(row(3), vec![128, 70, 128, 70]);
}

#[test]
fn encoded_source_runs_end_to_end() {
    let source = photo(120, 90);
    let loader = BytesLoader::new(encode_png(&source));
    let decoded = loader.load().unwrap();
    let config = EffectConfig {
        max_width: Some(60),
        pixel_size: 20,
        palette_size: 8,
        dithering_enabled: true,
        ..EffectConfig::default()
    };
    let result = run(decoded, &config);
    assert_eq!(result.dimensions.width, 60);
    assert_eq!(result.dimensions.height, 45);
}

#[test]
fn same_seed_same_output() {
    let config = EffectConfig {
        vertex_wobble_enabled: true,
        vertex_intensity: 0.9,
        noise_scale: 0.07,
        ..EffectConfig::default()
    };
    let a = run(photo(24, 24), &config);
    let b = run(photo(24, 24), &config);
    assert_eq!(a.buffer.as_raw(), b.buffer.as_raw());
}
