//! Decoder module for uploaded receipt images
//!
//! Produces two independent in-memory forms of the same upload:
//! - a general decoded image, which the first OCR pass reads directly
//! - an RGB pixel matrix, which feeds the binarization filter chain
//!
//! The matrix decode is allowed to fail quietly; the pipeline then runs
//! a single pass.

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read image bytes: {0}")]
    Io(#[from] std::io::Error),
}

/// Both decoded forms of one upload
#[derive(Debug)]
pub struct DecodedReceipt {
    /// General-purpose decoded image
    pub image: DynamicImage,
    /// H x W x 3 matrix, or `None` when the matrix decode failed
    pub matrix: Option<RgbImage>,
}

/// Decode raw JPEG/PNG bytes into both representations.
///
/// Only a failure of the general decode is an error.
pub fn decode(data: &[u8]) -> Result<DecodedReceipt, DecodeError> {
    let image = decode_image(data)?;
    let matrix = decode_matrix(data);
    Ok(DecodedReceipt { image, matrix })
}

/// Decode the general image handle, accepting JPEG and PNG streams only
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    match reader.format() {
        Some(ImageFormat::Jpeg) | Some(ImageFormat::Png) => {}
        Some(other) => return Err(DecodeError::UnsupportedFormat(format!("{other:?}"))),
        None => return Err(DecodeError::UnsupportedFormat("unknown".to_string())),
    }

    Ok(reader.decode()?)
}

/// Decode the RGB pixel matrix; `None` on any failure or an empty image
pub fn decode_matrix(data: &[u8]) -> Option<RgbImage> {
    let matrix = image::load_from_memory(data).ok()?.into_rgb8();
    if matrix.width() == 0 || matrix.height() == 0 {
        return None;
    }
    Some(matrix)
}

/// SHA-256 of the raw upload as lowercase hex, used to correlate log lines
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
