//! Cover artwork normalization.
//!
//! Uploaded artwork comes in as whatever the user embedded or attached. The
//! processor enforces the minimum resolution, bounds the output size, and
//! re-encodes everything as baseline JPEG so downstream platforms always get
//! one predictable format.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork must be at least {min}x{min} pixels (got {width}x{height})")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("artwork exceeds the maximum accepted input size of {max}px (got {width}x{height})")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Artwork acceptance and output policy.
#[derive(Debug, Clone)]
pub struct ArtworkPolicy {
    pub min_dimension: u32,
    pub max_dimensions: (u32, u32),
    /// Hard cap on input dimensions, for deployments that want to reject
    /// absurd uploads outright instead of downscaling them. None = no cap.
    pub max_input_dimension: Option<u32>,
    pub jpeg_quality: u8,
}

impl Default for ArtworkPolicy {
    fn default() -> Self {
        ArtworkPolicy {
            min_dimension: 1400,
            max_dimensions: (1400, 1400),
            max_input_dimension: None,
            jpeg_quality: 85,
        }
    }
}

/// Normalized artwork, always JPEG.
#[derive(Debug, Clone)]
pub struct ProcessedArtwork {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ArtworkProcessor {
    policy: ArtworkPolicy,
}

impl ArtworkProcessor {
    pub fn new(policy: ArtworkPolicy) -> Self {
        ArtworkProcessor { policy }
    }

    /// Validate and normalize one artwork image.
    ///
    /// Images larger than the bound are downscaled (aspect ratio preserved,
    /// Lanczos3); images are never upscaled. Output is always re-encoded as
    /// RGB JPEG at the policy quality, even when no resize happened.
    pub fn process(&self, data: &[u8]) -> Result<ProcessedArtwork, ArtworkError> {
        let mut img = image::load_from_memory(data)?;
        let (width, height) = (img.width(), img.height());

        if width < self.policy.min_dimension || height < self.policy.min_dimension {
            return Err(ArtworkError::TooSmall {
                width,
                height,
                min: self.policy.min_dimension,
            });
        }

        if let Some(max_input) = self.policy.max_input_dimension {
            if width > max_input || height > max_input {
                return Err(ArtworkError::TooLarge {
                    width,
                    height,
                    max: max_input,
                });
            }
        }

        let (max_width, max_height) = self.policy.max_dimensions;
        if width > max_width || height > max_height {
            img = img.resize(max_width, max_height, FilterType::Lanczos3);
        }

        let rgb = img.to_rgb8();
        let mut encoded = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, self.policy.jpeg_quality);
        encoder.encode_image(&rgb)?;

        Ok(ProcessedArtwork {
            width: rgb.width(),
            height: rgb.height(),
            size_bytes: encoded.len(),
            data: encoded,
        })
    }
}
