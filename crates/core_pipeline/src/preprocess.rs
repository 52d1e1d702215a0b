//! Image preprocessing module
//!
//! Classical filter chain that turns a receipt photo into a high-contrast
//! binary image for the second OCR pass:
//! - Grayscale conversion
//! - 3x3 Gaussian smoothing
//! - Adaptive Gaussian thresholding
//!
//! Receipts are photographed under uneven light, so a single global cutoff
//! loses text in shadowed regions. The threshold is computed per pixel from
//! a Gaussian-weighted neighbourhood instead. Output dimensions always match
//! the input so bounding boxes from both passes share one coordinate space.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::filter::separable_filter_equal;
use imageproc::map::map_colors;
use thiserror::Error;

/// Side length of the thresholding neighbourhood
pub const THRESHOLD_WINDOW: usize = 11;

/// Constant subtracted from the local mean before comparison
pub const THRESHOLD_BIAS: i32 = 2;

/// Fixed 3-tap kernel used for smoothing (Gaussian with automatic sigma)
const SMOOTHING_KERNEL: [f32; 3] = [0.25, 0.5, 0.25];

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("cannot preprocess an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}

/// Binarize an RGB receipt matrix: grayscale, smooth, adaptive threshold.
///
/// Every output pixel is 0 or 255.
pub fn binarize(input: &RgbImage) -> Result<GrayImage, PreprocessError> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let gray = to_grayscale(input);
    let smoothed = smooth(&gray);
    Ok(adaptive_threshold_gaussian(
        &smoothed,
        THRESHOLD_WINDOW,
        THRESHOLD_BIAS,
    ))
}

/// Rec.601 luma weights for R, G, B
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Luminance-weighted channel reduction (Rec.601)
pub fn to_grayscale(input: &RgbImage) -> GrayImage {
    map_colors(input, |Rgb([r, g, b])| {
        let [wr, wg, wb] = LUMA_WEIGHTS;
        let luma = wr * r as f32 + wg * g as f32 + wb * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Suppress speckle noise ahead of thresholding
pub fn smooth(input: &GrayImage) -> GrayImage {
    separable_filter_equal(input, &SMOOTHING_KERNEL)
}

/// Gaussian-weighted adaptive threshold.
///
/// A pixel is set when it exceeds its local weighted mean minus `bias`.
/// Borders replicate the edge pixels.
pub fn adaptive_threshold_gaussian(input: &GrayImage, window: usize, bias: i32) -> GrayImage {
    let kernel = gaussian_kernel(window);
    let local_mean: GrayImage = separable_filter_equal(input, &kernel);

    ImageBuffer::from_fn(input.width(), input.height(), |x, y| {
        let pixel = input.get_pixel(x, y)[0] as i32;
        let mean = local_mean.get_pixel(x, y)[0] as i32;
        if pixel - mean > -bias {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Normalized 1-D Gaussian weights for an odd window size.
///
/// Sigma is derived from the window the usual way:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let size = if size % 2 == 0 { size + 1 } else { size };
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;

    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}
