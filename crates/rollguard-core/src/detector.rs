//! Face detector via ONNX Runtime.
//!
//! Runs an RFB-320 style single-stage detector: one forward pass produces a
//! flat list of candidate boxes (normalized corner coordinates) with
//! per-candidate background/face scores, followed by confidence filtering
//! and NMS.

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.3;
/// Scores/boxes per candidate: [background, face] and [x1, y1, x2, y2].
const SCORES_PER_CANDIDATE: usize = 2;
const COORDS_PER_CANDIDATE: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in source-image pixel coordinates.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Output tensor indices: (scores_idx, boxes_idx).
type OutputIndices = (usize, usize);

pub struct FaceDetector {
    session: Session,
    output_indices: OutputIndices,
}

impl FaceDetector {
    /// Load the detection ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded face detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detection model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "detection output tensor mapping");

        Ok(Self { session, output_indices })
    }

    /// Detect faces in an RGB image, returning boxes sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        let input = preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (scores_idx, boxes_idx) = self.output_indices;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = scores.len() / SCORES_PER_CANDIDATE;
        if boxes.len() < candidates * COORDS_PER_CANDIDATE {
            return Err(DetectorError::InferenceFailed(format!(
                "box tensor too short: {} coords for {} candidates",
                boxes.len(),
                candidates
            )));
        }

        let detections = decode_detections(
            scores,
            boxes,
            image.width(),
            image.height(),
            DETECTOR_CONFIDENCE_THRESHOLD,
        );

        let mut result = nms(detections, DETECTOR_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Resize to the detector input shape and normalize into a NCHW tensor.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        DETECTOR_INPUT_WIDTH as u32,
        DETECTOR_INPUT_HEIGHT as u32,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor =
        Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
        }
    }

    tensor
}

/// Discover output tensor ordering by name.
///
/// RFB-320 exports name the tensors "scores" and "boxes"; generic exports
/// fall back to positional ordering [0]=scores, [1]=boxes.
fn discover_output_indices(names: &[String]) -> OutputIndices {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");

    match (scores, boxes) {
        (Some(s), Some(b)) => {
            tracing::info!("detector: using name-based output tensor mapping");
            (s, b)
        }
        _ => {
            tracing::info!(
                ?names,
                "detector: output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Decode raw score/box tensors into pixel-space detections.
///
/// Scores are [background, face] pairs per candidate; boxes are normalized
/// [x1, y1, x2, y2] corners in [0, 1] relative to the source image.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    image_width: u32,
    image_height: u32,
    threshold: f32,
) -> Vec<FaceBox> {
    let candidates = scores.len() / SCORES_PER_CANDIDATE;
    let mut detections = Vec::new();

    for idx in 0..candidates {
        let confidence = scores[idx * SCORES_PER_CANDIDATE + 1];
        if confidence <= threshold {
            continue;
        }

        let off = idx * COORDS_PER_CANDIDATE;
        if off + 3 >= boxes.len() {
            continue;
        }

        let x1 = boxes[off].clamp(0.0, 1.0) * image_width as f32;
        let y1 = boxes[off + 1].clamp(0.0, 1.0) * image_height as f32;
        let x2 = boxes[off + 2].clamp(0.0, 1.0) * image_width as f32;
        let y2 = boxes[off + 3].clamp(0.0, 1.0) * image_height as f32;

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Compute Intersection-over-Union between two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
