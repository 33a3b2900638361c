//! Receipt image normalizer
//!
//! Decodes whatever the camera or upload produced, bounds the longest side,
//! flattens to RGB and re-encodes as JPEG for transmission to the vision model.
//! Knows nothing about receipts or categories.

use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, RgbImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Default bound on the longest side, in pixels
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Normalizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Longest side after normalization; smaller images are not upscaled
    pub max_dimension: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A receipt image ready to embed in an inference request
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// JPEG-encoded RGB image
    pub jpeg: Vec<u8>,
    /// Base64 of `jpeg` (standard alphabet, padded)
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    /// SHA-256 of the input bytes, hex encoded
    pub content_hash: String,
}

impl NormalizedImage {
    /// `data:` URL form used by both delivery strategies
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }

    /// Whether the normalizer had to downsample
    pub fn was_resized(&self) -> bool {
        self.width != self.original_width || self.height != self.original_height
    }
}

/// Decode, bound, flatten and re-encode an image
pub fn normalize_image(bytes: &[u8], options: &NormalizeOptions) -> Result<NormalizedImage> {
    if bytes.is_empty() {
        return Err(Error::ImageDecode("image data is empty".into()));
    }
    if options.max_dimension == 0 {
        return Err(Error::InvalidData("max_dimension must be positive".into()));
    }

    let content_hash = hex::encode(Sha256::digest(bytes));

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::ImageDecode(format!("unrecognised or corrupt image: {}", e)))?;
    let (original_width, original_height) = decoded.dimensions();

    let resized = match fit_within(original_width, original_height, options.max_dimension) {
        Some((w, h)) => {
            debug!(
                from = format!("{original_width}x{original_height}"),
                to = format!("{w}x{h}"),
                hash = %content_hash,
                "Downsampling receipt image"
            );
            decoded.resize_exact(w, h, FilterType::Lanczos3)
        }
        None => decoded,
    };

    let rgb = to_rgb(resized);
    let (width, height) = rgb.dimensions();
    let jpeg = encode_jpeg(&rgb, options.jpeg_quality)?;
    let base64 = base64::engine::general_purpose::STANDARD.encode(&jpeg);

    debug!(
        width,
        height,
        bytes = jpeg.len(),
        hash = %content_hash,
        "Normalized receipt image"
    );

    Ok(NormalizedImage {
        jpeg,
        base64,
        width,
        height,
        original_width,
        original_height,
        content_hash,
    })
}

/// Target dimensions when the longest side exceeds `max_dimension`
///
/// Returns `None` when the image already fits. The longest side lands exactly
/// on the bound; the shorter side is rounded and never drops below 1.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_dimension || width == 0 || height == 0 {
        return None;
    }

    let scale = f64::from(max_dimension) / f64::from(longest);
    let scaled = |side: u32| -> u32 {
        ((f64::from(side) * scale).round() as u32)
            .max(1)
            .min(max_dimension)
    };

    if width >= height {
        Some((max_dimension, scaled(height)))
    } else {
        Some((scaled(width), max_dimension))
    }
}

/// Flatten any color model (indexed, alpha, gray, 16-bit) to 8-bit RGB
fn to_rgb(image: DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let quality = quality.clamp(1, 100);
    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, quality)
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8,
        )
        .map_err(|e| Error::ImageEncode(format!("JPEG encoding failed: {}", e)))?;
    Ok(cursor.into_inner())
}
