use rollguard_core::extractor::FaceSelection;
use rollguard_core::matcher::{
    FaceMatchConfig, MatchOrdering, SignatureMatchConfig, DEFAULT_FACE_DISTANCE_THRESHOLD,
    DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD,
};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// HTTP listen address (default: 0.0.0.0:8001).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance threshold for a face duplicate.
    pub face_distance_threshold: f32,
    /// Structural similarity threshold for a signature duplicate.
    pub signature_similarity_threshold: f32,
    /// Which face to use when a probe contains more than one.
    pub face_selection: FaceSelection,
    /// Ordering policy for face duplicate results.
    pub match_ordering: MatchOrdering,
    /// Validity window for issued one-time passcodes, in seconds.
    pub otp_ttl_secs: u64,
    /// Timeout in seconds for a single feature extraction.
    pub extract_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `ROLLGUARD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLGUARD_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollguard_core::default_model_dir());

        Self {
            bind_addr: std::env::var("ROLLGUARD_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8001".to_string()),
            model_dir,
            face_distance_threshold: env_parse(
                "ROLLGUARD_FACE_DISTANCE_THRESHOLD",
                DEFAULT_FACE_DISTANCE_THRESHOLD,
            ),
            signature_similarity_threshold: env_parse(
                "ROLLGUARD_SIGNATURE_SIMILARITY_THRESHOLD",
                DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD,
            ),
            face_selection: env_parse("ROLLGUARD_FACE_SELECTION", FaceSelection::First),
            match_ordering: env_parse("ROLLGUARD_MATCH_ORDERING", MatchOrdering::BestFirst),
            otp_ttl_secs: env_parse("ROLLGUARD_OTP_TTL_SECS", 300),
            extract_timeout_secs: env_parse("ROLLGUARD_EXTRACT_TIMEOUT_SECS", 10),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(rollguard_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join(rollguard_core::ENCODER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn face_match_config(&self) -> FaceMatchConfig {
        FaceMatchConfig {
            distance_threshold: self.face_distance_threshold,
            ordering: self.match_ordering,
        }
    }

    pub fn signature_match_config(&self) -> SignatureMatchConfig {
        SignatureMatchConfig {
            similarity_threshold: self.signature_similarity_threshold,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
