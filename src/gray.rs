//! Archival grayscale conversion.
//!
//! Matches the legacy archival grayscale look rather than a plain luminance
//! formula: each channel is level-stretched between thresholds derived from
//! whole-image brightness and saturation statistics, then the lightness is
//! extracted from the stretched image's HSV representation as
//! `L = V * (1 - S/2)`.

use image::{GrayImage, RgbImage};

#[derive(Debug, Default, Clone, Copy)]
struct ChannelStats {
    min: f64,
    max: f64,
    mean: f64,
    std: f64,
}

fn channel_stats(image: &RgbImage, channel: usize) -> ChannelStats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let count = (image.width() * image.height()) as f64;

    for pixel in image.pixels() {
        let v = pixel.0[channel] as f64 / 255.0;
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let mean = sum / count;

    let mut var = 0.0;
    for pixel in image.pixels() {
        let v = pixel.0[channel] as f64 / 255.0;
        var += (v - mean) * (v - mean);
    }

    ChannelStats {
        min,
        max,
        mean,
        std: (var / count).sqrt(),
    }
}

fn percent_to_value(percent: f64) -> f64 {
    percent * 255.0 / 100.0
}

/// Stretch a 0..255 value between the given thresholds; values outside clamp
/// to black/white.
fn level(value: f64, min_value: f64, max_value: f64) -> f64 {
    if value < min_value {
        return 0.0;
    }
    if value > max_value {
        return 255.0;
    }
    let interval = (max_value / 255.0) - (min_value / 255.0);
    (value - min_value) / interval
}

/// Convert a color page image to grayscale with the archival level-stretch
/// transform. Deterministic for a given input.
pub fn archival_grayscale(image: &RgbImage) -> GrayImage {
    let stats = [
        channel_stats(image, 0),
        channel_stats(image, 1),
        channel_stats(image, 2),
    ];
    let (r, g, b) = (stats[0], stats[1], stats[2]);

    let denom = b.max * (1.0 - r.std) * (1.0 - g.std) * (1.0 - b.std);
    let bright_adjust = if denom == 0.0 {
        0.0
    } else {
        (r.mean * g.mean * b.mean / denom * 10_000.0).round() / 10_000.0
    };

    let low = ((196.0 * r.min + 14.5).trunc()).min(50.0);
    let highs = [
        ((35.66 * bright_adjust + 48.5).trunc()).min(95.0),
        ((39.22 * bright_adjust + 44.5).trunc()).min(95.0),
        ((45.16 * bright_adjust + 36.5).trunc()).min(95.0),
    ];

    let low_value = percent_to_value(low);
    let high_values = [
        percent_to_value(highs[0]),
        percent_to_value(highs[1]),
        percent_to_value(highs[2]),
    ];

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let stretched = [
            level(pixel.0[0] as f64, low_value, high_values[0]) / 255.0,
            level(pixel.0[1] as f64, low_value, high_values[1]) / 255.0,
            level(pixel.0[2] as f64, low_value, high_values[2]) / 255.0,
        ];

        // HSV value and saturation of the stretched pixel.
        let value = stretched[0].max(stretched[1]).max(stretched[2]);
        let min = stretched[0].min(stretched[1]).min(stretched[2]);
        let saturation = if value == 0.0 { 0.0 } else { (value - min) / value };

        let lightness = value * (1.0 - saturation / 2.0);
        image::Luma([(lightness * 255.0).clamp(0.0, 255.0) as u8])
    })
}
