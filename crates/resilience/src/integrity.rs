//! Sanity checks for assets returned by a transformation service.

use std::io::Cursor;

use image::ImageReader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error("Original asset is empty")]
    EmptyOriginal,

    #[error("Transformed asset is {ratio:.3}x the original, outside {min}..={max}")]
    SizeRatio { ratio: f64, min: f64, max: f64 },

    #[error("Transformed asset does not decode as an image: {0}")]
    Undecodable(String),

    #[error("Image dimensions {width}x{height} outside {min}..={max}")]
    Dimensions {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },
}

/// Acceptance band for a transformed asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrityPolicy {
    /// Smallest accepted `transformed / original` byte ratio. Below it the
    /// output is likely truncated.
    pub min_size_ratio: f64,
    /// Largest accepted ratio. Above it the output is likely a decompression bomb.
    pub max_size_ratio: f64,
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self {
            min_size_ratio: 0.05,
            max_size_ratio: 3.0,
            min_dimension: 10,
            max_dimension: 10_000,
        }
    }
}

/// What a passing verification learned about the asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifiedAsset {
    pub width: u32,
    pub height: u32,
    pub size_ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityVerifier {
    policy: IntegrityPolicy,
}

impl IntegrityVerifier {
    /// Creates a verifier enforcing `policy`.
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in force.
    pub fn policy(&self) -> &IntegrityPolicy {
        &self.policy
    }

    /// Checks the size ratio first, then reads only the image header for
    /// dimensions. The pixel data is never decoded.
    pub fn verify(
        &self,
        original_len: usize,
        transformed: &[u8],
    ) -> Result<VerifiedAsset, IntegrityError> {
        let size_ratio = self.check_size_ratio(original_len, transformed.len())?;

        let (width, height) = ImageReader::new(Cursor::new(transformed))
            .with_guessed_format()
            .map_err(|e| IntegrityError::Undecodable(e.to_string()))?
            .into_dimensions()
            .map_err(|e| IntegrityError::Undecodable(e.to_string()))?;

        let IntegrityPolicy {
            min_dimension: min,
            max_dimension: max,
            ..
        } = self.policy;
        if !(min..=max).contains(&width) || !(min..=max).contains(&height) {
            warn!(width, height, "Transformed asset has implausible dimensions");
            return Err(IntegrityError::Dimensions {
                width,
                height,
                min,
                max,
            });
        }

        Ok(VerifiedAsset {
            width,
            height,
            size_ratio,
        })
    }

    /// Returns the size ratio, or an error if it falls outside the policy's band.
    pub fn check_size_ratio(
        &self,
        original_len: usize,
        transformed_len: usize,
    ) -> Result<f64, IntegrityError> {
        if original_len == 0 {
            return Err(IntegrityError::EmptyOriginal);
        }
        let ratio = transformed_len as f64 / original_len as f64;
        let (min, max) = (self.policy.min_size_ratio, self.policy.max_size_ratio);
        if ratio < min || ratio > max {
            warn!(
                original_len,
                transformed_len, ratio, "Transformed asset size outside accepted band"
            );
            return Err(IntegrityError::SizeRatio { ratio, min, max });
        }
        Ok(ratio)
    }
}
