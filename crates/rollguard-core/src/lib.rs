//! rollguard-core — duplicate-biometric detection engine.
//!
//! Face probes become 128-dim embeddings compared under Euclidean distance;
//! signature probes become canonical grayscale rasters compared by
//! structural similarity. Matching runs against an abstract enrollment
//! store, and the verification orchestrator composes an OTP gate with the
//! per-channel matchers.

pub mod detector;
pub mod encoder;
pub mod extractor;
pub mod matcher;
pub mod signature;
pub mod ssim;
pub mod store;
pub mod types;
pub mod verify;

pub use extractor::{extract_signature, ExtractError, FaceSelection, FeatureExtractor};
pub use matcher::{FaceMatchConfig, MatchOrdering, SignatureMatchConfig};
pub use store::{EnrollmentStore, MemoryStore, StoreError};
pub use types::{Embedding, FaceMatch, SignatureMatch, SignatureRaster, VoterId, EMBEDDING_DIM};
pub use verify::{Decision, OtpGate, Probes, RejectReason, VerificationOrchestrator, VerifyChannel};

/// Default directory for ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/rollguard/models")
}

/// File name of the face detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "face_det_rfb320.onnx";
/// File name of the face embedding model inside the model directory.
pub const ENCODER_MODEL_FILE: &str = "face_rec_128.onnx";
