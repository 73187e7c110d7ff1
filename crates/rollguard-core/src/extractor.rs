//! Feature extraction: raw image bytes to comparable representations.
//!
//! Faces go through detect → select → encode and come out as embeddings;
//! signatures are reduced to a canonical grayscale raster with no detection
//! step. Both paths are pure transformations of the input bytes.

use crate::detector::{DetectorError, FaceBox, FaceDetector};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::signature;
use crate::types::{Embedding, SignatureRaster};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The input bytes could not be decoded as an image. Hard failure.
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
    /// Zero faces detected in the probe image.
    #[error("no face detected")]
    NoFaceDetected,
    /// More than one face under the `RejectAmbiguous` policy.
    #[error("ambiguous probe: {count} faces detected")]
    AmbiguousFaces { count: usize },
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
}

/// Which face to use when an image contains more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// Use the first (highest-confidence) detection.
    First,
    /// Use the detection with the largest box area.
    Largest,
    /// Fail with [`ExtractError::AmbiguousFaces`] when more than one face
    /// is present.
    RejectAmbiguous,
}

impl std::str::FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "largest" => Ok(Self::Largest),
            "reject_ambiguous" => Ok(Self::RejectAmbiguous),
            other => Err(format!(
                "unknown face selection policy: {other} (expected first | largest | reject_ambiguous)"
            )),
        }
    }
}

/// Face feature extractor: owns the detection and embedding models.
pub struct FeatureExtractor {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl FeatureExtractor {
    pub fn new(detector: FaceDetector, encoder: FaceEncoder) -> Self {
        Self { detector, encoder }
    }

    /// Extract a face embedding from raw image bytes.
    ///
    /// Fails explicitly with [`ExtractError::NoFaceDetected`] when the image
    /// contains no face — never returns a zero vector.
    pub fn extract_face(
        &mut self,
        bytes: &[u8],
        selection: FaceSelection,
    ) -> Result<Embedding, ExtractError> {
        let rgb = decode_rgb(bytes)?;
        let faces = self.detector.detect(&rgb)?;
        let face = select_face(&faces, selection)?;

        tracing::debug!(
            detected = faces.len(),
            confidence = face.confidence,
            "face selected for encoding"
        );

        Ok(self.encoder.extract(&rgb, face)?)
    }
}

/// Extract a canonical signature raster from raw image bytes.
///
/// Color-to-grayscale reduction plus canonicalization; no face detection
/// applies to signatures.
pub fn extract_signature(bytes: &[u8]) -> Result<SignatureRaster, ExtractError> {
    let gray = image::load_from_memory(bytes)
        .map_err(|e| ExtractError::UnreadableImage(e.to_string()))?
        .to_luma8();
    Ok(signature::canonicalize(&gray))
}

fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ExtractError> {
    Ok(image::load_from_memory(bytes)
        .map_err(|e| ExtractError::UnreadableImage(e.to_string()))?
        .to_rgb8())
}

/// Apply the face selection policy to a confidence-sorted detection list.
fn select_face(faces: &[FaceBox], selection: FaceSelection) -> Result<&FaceBox, ExtractError> {
    if faces.is_empty() {
        return Err(ExtractError::NoFaceDetected);
    }

    match selection {
        FaceSelection::First => Ok(&faces[0]),
        FaceSelection::Largest => faces
            .iter()
            .max_by(|a, b| {
                a.area()
                    .partial_cmp(&b.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(ExtractError::NoFaceDetected),
        FaceSelection::RejectAmbiguous => {
            if faces.len() > 1 {
                Err(ExtractError::AmbiguousFaces { count: faces.len() })
            } else {
                Ok(&faces[0])
            }
        }
    }
}
