//! Pre-transfer image transform.
//!
//! Shrinks large images before they go on the wire: bound the long edge,
//! then re-encode until the output fits the byte budget. Any failure falls
//! back to the original bytes; the transform can never fail an upload.
//!
//! The work is CPU-bound. The manager runs it on the blocking pool.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use uplink_core::{TransformConfig, is_image_type};

/// JPEG qualities tried in order until the output fits.
const JPEG_QUALITIES: [u8; 8] = [90, 80, 70, 60, 50, 40, 30, 20];

/// Extra downscale rounds once the lowest quality still does not fit.
const MAX_DOWNSCALE_ROUNDS: u32 = 6;

/// Dimension factor applied per downscale round.
const DOWNSCALE_FACTOR: f64 = 0.75;

/// Result of the transform stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// Bytes to transfer.
    pub bytes: Bytes,
    /// Content type of `bytes`.
    pub content_type: String,
    /// Whether `bytes` differ from the input.
    pub applied: bool,
}

impl TransformOutput {
    fn unchanged(bytes: &Bytes, content_type: &str) -> Self {
        Self {
            bytes: bytes.clone(),
            content_type: content_type.to_string(),
            applied: false,
        }
    }

    /// Output size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the output is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reasons the transform fell back to the original bytes.
#[derive(Debug, Error)]
enum TransformError {
    #[error("unsupported image type: {0}")]
    Unsupported(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("re-encoding would not reduce size")]
    NoGain,
}

/// Image transform stage.
#[derive(Debug, Clone)]
pub struct TransformStage {
    config: TransformConfig,
}

impl TransformStage {
    /// Create a stage with the given bounds.
    #[must_use]
    pub const fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Whether `content_type` is eligible for transformation at all.
    #[must_use]
    pub fn applies_to(&self, content_type: &str) -> bool {
        self.config.enabled && is_image_type(content_type)
    }

    /// Transform a payload. Never fails.
    ///
    /// Non-image payloads, vector and animated formats, and anything the
    /// codec cannot handle come back byte-identical with `applied = false`.
    pub fn transform(&self, bytes: &Bytes, content_type: &str) -> TransformOutput {
        if !self.applies_to(content_type) {
            return TransformOutput::unchanged(bytes, content_type);
        }

        match self.try_transform(bytes, content_type) {
            Ok(output) => {
                tracing::info!(
                    target: "uplink.upload",
                    original_bytes = bytes.len(),
                    transformed_bytes = output.bytes.len(),
                    content_type = %output.content_type,
                    "Image transformed"
                );
                output
            }
            Err(TransformError::NoGain) => TransformOutput::unchanged(bytes, content_type),
            Err(e) => {
                tracing::debug!(
                    target: "uplink.upload",
                    error = %e,
                    content_type,
                    "Transform skipped, using original bytes"
                );
                TransformOutput::unchanged(bytes, content_type)
            }
        }
    }

    fn try_transform(&self, bytes: &Bytes, content_type: &str) -> Result<TransformOutput, TransformError> {
        let format = decodable_format(bytes, content_type)?;
        let image = image::load_from_memory_with_format(bytes, format)?;

        let max_dim = self.config.max_dimension.max(1);
        let oversized = image.width() > max_dim || image.height() > max_dim;
        let budget = usize::try_from(self.config.max_bytes).unwrap_or(usize::MAX);

        if !oversized && bytes.len() <= budget {
            return Err(TransformError::NoGain);
        }

        let mut current = if oversized {
            image.resize(max_dim, max_dim, FilterType::Lanczos3)
        } else {
            image
        };

        let mut smallest: Option<(Vec<u8>, &'static str)> = None;
        for round in 0..=MAX_DOWNSCALE_ROUNDS {
            if round > 0 {
                current = downscale(&current);
            }
            if let Some(found) = encode_within(&current, budget, &mut smallest)? {
                return Ok(finish(found.0, found.1));
            }
        }

        match smallest {
            // A resized image must ship even if it never got under budget.
            Some((encoded, mime)) if oversized || encoded.len() < bytes.len() => {
                Ok(finish(encoded, mime))
            }
            _ => Err(TransformError::NoGain),
        }
    }
}

fn finish(encoded: Vec<u8>, mime: &'static str) -> TransformOutput {
    TransformOutput {
        bytes: Bytes::from(encoded),
        content_type: mime.to_string(),
        applied: true,
    }
}

/// Resolve a raster format we can decode, preferring the declared type.
fn decodable_format(bytes: &[u8], content_type: &str) -> Result<ImageFormat, TransformError> {
    let declared = content_type.trim().to_ascii_lowercase();
    if declared == "image/svg+xml" || declared == "image/gif" {
        return Err(TransformError::Unsupported(declared));
    }
    let format = ImageFormat::from_mime_type(&declared)
        .or_else(|| image::guess_format(bytes).ok())
        .ok_or_else(|| TransformError::Unsupported(declared.clone()))?;
    if format == ImageFormat::Gif {
        return Err(TransformError::Unsupported(declared));
    }
    Ok(format)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn downscale(image: &DynamicImage) -> DynamicImage {
    let width = ((f64::from(image.width()) * DOWNSCALE_FACTOR) as u32).max(1);
    let height = ((f64::from(image.height()) * DOWNSCALE_FACTOR) as u32).max(1);
    image.resize(width, height, FilterType::Triangle)
}

/// Try the encodings for one resolution, tracking the smallest result.
///
/// Images with transparency try lossless PNG first so the alpha channel
/// survives when it can.
fn encode_within(
    image: &DynamicImage,
    budget: usize,
    smallest: &mut Option<(Vec<u8>, &'static str)>,
) -> Result<Option<(Vec<u8>, &'static str)>, TransformError> {
    if image.color().has_alpha() {
        let png = encode_png(image)?;
        if png.len() <= budget {
            return Ok(Some((png, "image/png")));
        }
        keep_smallest(smallest, png, "image/png");
    }

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    for quality in JPEG_QUALITIES {
        let jpeg = encode_jpeg(&rgb, quality)?;
        if jpeg.len() <= budget {
            return Ok(Some((jpeg, "image/jpeg")));
        }
        keep_smallest(smallest, jpeg, "image/jpeg");
    }
    Ok(None)
}

fn keep_smallest(smallest: &mut Option<(Vec<u8>, &'static str)>, encoded: Vec<u8>, mime: &'static str) {
    if smallest.as_ref().is_none_or(|(best, _)| encoded.len() < best.len()) {
        *smallest = Some((encoded, mime));
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    image.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out.into_inner())
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    image.write_with_encoder(PngEncoder::new_with_quality(
        &mut out,
        CompressionType::Best,
        PngFilter::Adaptive,
    ))?;
    Ok(out.into_inner())
}
