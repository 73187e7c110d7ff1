//! HTTP surface of the biometric service.
//!
//! Consumed by the external registration workflow. Image payloads are
//! base64 in JSON bodies. Verification rejections are normal responses
//! with a machine-readable reason code; only infrastructure problems
//! (unreadable store, stalled extraction) surface as 5xx.

use crate::engine::{EngineError, EngineHandle};
use crate::otp::MemoryOtpCache;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rollguard_core::extractor::ExtractError;
use rollguard_core::matcher::{self, FaceMatchConfig, SignatureMatchConfig};
use rollguard_core::store::{EnrollmentStore, MemoryStore, StoreError};
use rollguard_core::types::{Embedding, SignatureRaster, VoterId};
use rollguard_core::verify::{Decision, Probes, VerificationOrchestrator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub faces: Arc<MemoryStore<Embedding>>,
    pub signatures: Arc<MemoryStore<SignatureRaster>>,
    pub fingerprints: Arc<MemoryStore<Vec<u8>>>,
    pub otp: Arc<MemoryOtpCache>,
    pub face_config: FaceMatchConfig,
    pub signature_config: SignatureMatchConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/faces/:voter_id", post(register_face))
        .route("/faces/check", post(check_face_duplicates))
        .route("/signatures/:voter_id", post(register_signature))
        .route("/signatures/check", post(check_signature_duplicates))
        .route("/fingerprints/:voter_id", post(register_fingerprint))
        .route("/fingerprints/check", post(check_fingerprint))
        .route("/otp/:voter_id", post(issue_otp))
        .route("/verify", post(verify))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- DTOs ---

#[derive(Deserialize)]
struct ImagePayload {
    /// Base64-encoded image bytes.
    image: String,
}

#[derive(Deserialize)]
struct FingerprintPayload {
    /// Base64-encoded raw sample bytes.
    data: String,
}

#[derive(Deserialize)]
struct FingerprintCheckRequest {
    voter_id: VoterId,
    data: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct OtpIssuedResponse {
    status: &'static str,
    /// Handed back to the trusted registration workflow, which owns
    /// delivery to the voter.
    code: String,
}

#[derive(Serialize)]
struct FaceDuplicate {
    voter_id: VoterId,
    distance: f32,
}

#[derive(Serialize)]
struct FaceDuplicatesResponse {
    duplicates: Vec<FaceDuplicate>,
}

#[derive(Serialize)]
struct SignatureDuplicate {
    voter_id: VoterId,
    similarity: f32,
}

#[derive(Serialize)]
struct SignatureDuplicatesResponse {
    duplicates: Vec<SignatureDuplicate>,
}

#[derive(Serialize)]
struct FingerprintCheckResponse {
    #[serde(rename = "match")]
    matched: bool,
    voter_id: VoterId,
}

#[derive(Deserialize)]
struct VerifyRequest {
    voter_id: VoterId,
    otp: String,
    face_image: Option<String>,
    signature_image: Option<String>,
    fingerprint: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponse {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

// --- Error mapping ---

pub enum ApiError {
    InvalidPayload,
    UnreadableImage,
    NoFaceFound,
    AmbiguousFaces,
    Service(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Extract(ExtractError::UnreadableImage(_)) => Self::UnreadableImage,
            EngineError::Extract(ExtractError::NoFaceDetected) => Self::NoFaceFound,
            EngineError::Extract(ExtractError::AmbiguousFaces { .. }) => Self::AmbiguousFaces,
            other => Self::Service(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Service(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidPayload => (StatusCode::BAD_REQUEST, "invalid_payload"),
            Self::UnreadableImage => (StatusCode::BAD_REQUEST, "unreadable_image"),
            Self::NoFaceFound => (StatusCode::UNPROCESSABLE_ENTITY, "no_face_found"),
            Self::AmbiguousFaces => (StatusCode::UNPROCESSABLE_ENTITY, "ambiguous_faces"),
            Self::Service(err) => {
                tracing::error!(error = %err, "service error");
                (StatusCode::INTERNAL_SERVER_ERROR, "service_error")
            }
        };
        (status, Json(serde_json::json!({ "error": code }))).into_response()
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, ApiError> {
    BASE64.decode(payload).map_err(|_| ApiError::InvalidPayload)
}

// --- Handlers ---

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_face(
    State(state): State<AppState>,
    Path(voter_id): Path<VoterId>,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    let bytes = decode_base64(&payload.image)?;
    let embedding = state.engine.extract_face(bytes).await?;
    state.faces.put(voter_id, embedding)?;
    tracing::info!(voter = voter_id, "face enrolled");
    Ok(Json(StatusResponse { status: "ok" }))
}

async fn check_face_duplicates(
    State(state): State<AppState>,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<FaceDuplicatesResponse>, ApiError> {
    let bytes = decode_base64(&payload.image)?;
    let probe = state.engine.extract_face(bytes).await?;

    let outcome = matcher::scan_faces(&probe, state.faces.snapshot()?, &state.face_config);
    if !outcome.skipped.is_empty() {
        tracing::warn!(skipped = outcome.skipped.len(), "face scan skipped unreadable records");
    }
    tracing::info!(candidates = outcome.candidates.len(), "face duplicate check");

    Ok(Json(FaceDuplicatesResponse {
        duplicates: outcome
            .candidates
            .into_iter()
            .map(|c| FaceDuplicate { voter_id: c.voter, distance: c.distance })
            .collect(),
    }))
}

async fn register_signature(
    State(state): State<AppState>,
    Path(voter_id): Path<VoterId>,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    let bytes = decode_base64(&payload.image)?;
    let raster = state.engine.extract_signature(bytes).await?;
    state.signatures.put(voter_id, raster)?;
    tracing::info!(voter = voter_id, "signature enrolled");
    Ok(Json(StatusResponse { status: "ok" }))
}

async fn check_signature_duplicates(
    State(state): State<AppState>,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<SignatureDuplicatesResponse>, ApiError> {
    let bytes = decode_base64(&payload.image)?;
    let probe = state.engine.extract_signature(bytes).await?;

    let outcome =
        matcher::scan_signatures(&probe, state.signatures.snapshot()?, &state.signature_config);
    if !outcome.skipped.is_empty() {
        tracing::warn!(
            skipped = outcome.skipped.len(),
            "signature scan skipped unreadable records"
        );
    }
    tracing::info!(candidates = outcome.candidates.len(), "signature duplicate check");

    Ok(Json(SignatureDuplicatesResponse {
        duplicates: outcome
            .candidates
            .into_iter()
            .map(|c| SignatureDuplicate { voter_id: c.voter, similarity: c.similarity })
            .collect(),
    }))
}

async fn register_fingerprint(
    State(state): State<AppState>,
    Path(voter_id): Path<VoterId>,
    Json(payload): Json<FingerprintPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    let bytes = decode_base64(&payload.data)?;
    state.fingerprints.put(voter_id, bytes)?;
    tracing::info!(voter = voter_id, "fingerprint enrolled");
    Ok(Json(StatusResponse { status: "ok" }))
}

async fn check_fingerprint(
    State(state): State<AppState>,
    Json(request): Json<FingerprintCheckRequest>,
) -> Result<Json<FingerprintCheckResponse>, ApiError> {
    let bytes = decode_base64(&request.data)?;
    let matched = match state.fingerprints.get(request.voter_id)? {
        Some(stored) => stored == bytes,
        None => false,
    };
    tracing::info!(voter = request.voter_id, matched, "fingerprint check");
    Ok(Json(FingerprintCheckResponse { matched, voter_id: request.voter_id }))
}

async fn issue_otp(
    State(state): State<AppState>,
    Path(voter_id): Path<VoterId>,
) -> Json<OtpIssuedResponse> {
    let code = state.otp.issue(voter_id);
    Json(OtpIssuedResponse { status: "ok", code })
}

async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    // Extraction failures are fatal to the call; the orchestrator is only
    // invoked once every supplied probe has a representation.
    let face = match &request.face_image {
        Some(payload) => Some(state.engine.extract_face(decode_base64(payload)?).await?),
        None => None,
    };
    let signature = match &request.signature_image {
        Some(payload) => Some(state.engine.extract_signature(decode_base64(payload)?).await?),
        None => None,
    };
    let fingerprint = match &request.fingerprint {
        Some(payload) => Some(decode_base64(payload)?),
        None => None,
    };

    let orchestrator = VerificationOrchestrator::new(
        state.faces.clone() as Arc<dyn EnrollmentStore<Embedding>>,
        state.signatures.clone() as Arc<dyn EnrollmentStore<SignatureRaster>>,
        state.fingerprints.clone() as Arc<dyn EnrollmentStore<Vec<u8>>>,
        state.otp.clone(),
    )
    .with_configs(state.face_config.clone(), state.signature_config.clone());

    let probes = Probes { face, signature, fingerprint };
    let decision = orchestrator.verify(request.voter_id, &request.otp, &probes)?;

    let response = match decision {
        Decision::Accepted => VerifyResponse { decision: "accepted", reason: None },
        Decision::Rejected(reason) => {
            VerifyResponse { decision: "rejected", reason: Some(reason.code()) }
        }
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_mapping() {
        let err: ApiError =
            EngineError::Extract(ExtractError::NoFaceDetected).into();
        assert!(matches!(err, ApiError::NoFaceFound));

        let err: ApiError =
            EngineError::Extract(ExtractError::UnreadableImage("bad magic".into())).into();
        assert!(matches!(err, ApiError::UnreadableImage));

        let err: ApiError =
            EngineError::Extract(ExtractError::AmbiguousFaces { count: 3 }).into();
        assert!(matches!(err, ApiError::AmbiguousFaces));

        let err: ApiError = EngineError::Timeout.into();
        assert!(matches!(err, ApiError::Service(_)));
    }

    #[test]
    fn test_verify_request_optional_channels() {
        let req: VerifyRequest =
            serde_json::from_str(r#"{"voter_id": 12, "otp": "123456"}"#).unwrap();
        assert_eq!(req.voter_id, 12);
        assert!(req.face_image.is_none());
        assert!(req.signature_image.is_none());
        assert!(req.fingerprint.is_none());
    }

    #[test]
    fn test_verify_response_omits_empty_reason() {
        let accepted =
            serde_json::to_value(VerifyResponse { decision: "accepted", reason: None }).unwrap();
        assert_eq!(accepted, serde_json::json!({ "decision": "accepted" }));

        let rejected = serde_json::to_value(VerifyResponse {
            decision: "rejected",
            reason: Some("otp_invalid"),
        })
        .unwrap();
        assert_eq!(
            rejected,
            serde_json::json!({ "decision": "rejected", "reason": "otp_invalid" })
        );
    }

    #[test]
    fn test_fingerprint_match_field_name() {
        let value =
            serde_json::to_value(FingerprintCheckResponse { matched: true, voter_id: 5 }).unwrap();
        assert_eq!(value, serde_json::json!({ "match": true, "voter_id": 5 }));
    }
}
