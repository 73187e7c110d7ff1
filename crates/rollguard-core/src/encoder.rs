//! Face embedding encoder via ONNX Runtime.
//!
//! Produces the 128-dimensional embedding used for duplicate detection.
//! The face crop is expanded by a fixed margin, resized to the model input
//! shape, and symmetrically normalized. Output embeddings are left
//! unnormalized — the Euclidean decision threshold is calibrated against
//! the raw embedding space.

use crate::detector::FaceBox;
use crate::types::{Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const ENCODER_INPUT_SIZE: usize = 150;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 127.5;
/// Fractional margin added on each side of the detected box before encoding.
const CROP_MARGIN: f32 = 0.25;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { session })
    }

    /// Extract a 128-dim embedding for one detected face.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: &FaceBox,
    ) -> Result<Embedding, EncoderError> {
        let (cx, cy, cw, ch) = crop_region(face, image.width(), image.height());
        let crop = image::imageops::crop_imm(image, cx, cy, cw, ch).to_image();
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(raw.to_vec()))
    }
}

/// Expand a face box by the crop margin and clamp to image bounds.
///
/// Returns (x, y, width, height) in integer pixel coordinates, always at
/// least 1x1.
fn crop_region(face: &FaceBox, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let margin_x = face.width * CROP_MARGIN;
    let margin_y = face.height * CROP_MARGIN;

    let x1 = (face.x - margin_x).max(0.0);
    let y1 = (face.y - margin_y).max(0.0);
    let x2 = (face.x + face.width + margin_x).min(image_width as f32);
    let y2 = (face.y + face.height + margin_y).min(image_height as f32);

    let x = x1.floor() as u32;
    let y = y1.floor() as u32;
    let w = ((x2 - x1).ceil() as u32).max(1).min(image_width - x);
    let h = ((y2 - y1).ceil() as u32).max(1).min(image_height - y);

    (x, y, w, h)
}

/// Resize a face crop to the encoder input shape and normalize into NCHW.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        crop,
        ENCODER_INPUT_SIZE as u32,
        ENCODER_INPUT_SIZE as u32,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor =
        Array4::<f32>::zeros((1, 3, ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - ENCODER_MEAN) / ENCODER_STD;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_crop_region_adds_margin() {
        let (x, y, w, h) = crop_region(&face(100.0, 100.0, 80.0, 80.0), 640, 480);
        // 25% margin of 80 = 20 on each side.
        assert_eq!(x, 80);
        assert_eq!(y, 80);
        assert_eq!(w, 120);
        assert_eq!(h, 120);
    }

    #[test]
    fn test_crop_region_clamps_to_image() {
        let (x, y, w, h) = crop_region(&face(0.0, 0.0, 100.0, 100.0), 110, 110);
        assert_eq!(x, 0);
        assert_eq!(y, 0);
        assert!(x + w <= 110);
        assert!(y + h <= 110);
    }

    #[test]
    fn test_crop_region_never_degenerate() {
        let (_, _, w, h) = crop_region(&face(639.0, 479.0, 0.5, 0.5), 640, 480);
        assert!(w >= 1);
        assert!(h >= 1);
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = RgbImage::from_pixel(97, 133, image::Rgb([128, 128, 128]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = RgbImage::from_pixel(150, 150, image::Rgb([255, 0, 128]));
        let tensor = preprocess(&crop);
        let expected_r = (255.0 - ENCODER_MEAN) / ENCODER_STD;
        let expected_g = (0.0 - ENCODER_MEAN) / ENCODER_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected_r).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - expected_g).abs() < 1e-6);
    }
}
