use rollguard_core::detector::{DetectorError, FaceDetector};
use rollguard_core::encoder::{EncoderError, FaceEncoder};
use rollguard_core::extractor::{self, ExtractError, FaceSelection, FeatureExtractor};
use rollguard_core::types::{Embedding, SignatureRaster};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("extraction timed out")]
    Timeout,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    ExtractFace {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<Embedding, ExtractError>>,
    },
    ExtractSignature {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<SignatureRaster, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Every request is bounded by the configured extraction timeout, so a
/// stalled extraction can never wedge a request handler — and since stores
/// are only touched after extraction returns, it never holds a store lock
/// either.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Extract a face embedding from raw image bytes.
    pub async fn extract_face(&self, bytes: Vec<u8>) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExtractFace { bytes, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        match tokio::time::timeout(self.timeout, reply_rx).await {
            Err(_) => Err(EngineError::Timeout),
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Extract a canonical signature raster from raw image bytes.
    pub async fn extract_signature(&self, bytes: Vec<u8>) -> Result<SignatureRaster, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExtractSignature { bytes, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        match tokio::time::timeout(self.timeout, reply_rx).await {
            Err(_) => Err(EngineError::Timeout),
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

/// Spawn the extraction engine on a dedicated OS thread.
///
/// Loads both ONNX models synchronously (fail-fast at startup), then enters
/// a request loop. ONNX sessions need `&mut` access, so all inference is
/// serialized through this one thread; matching itself runs read-only in
/// the request handlers.
pub fn spawn_engine(
    detector_path: &str,
    encoder_path: &str,
    selection: FaceSelection,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let detector = FaceDetector::load(detector_path)?;
    tracing::info!(path = detector_path, "face detector loaded");

    let encoder = FaceEncoder::load(encoder_path)?;
    tracing::info!(path = encoder_path, "face encoder loaded");

    let mut extractor = FeatureExtractor::new(detector, encoder);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollguard-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::ExtractFace { bytes, reply } => {
                        let result = extractor.extract_face(&bytes, selection);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ExtractSignature { bytes, reply } => {
                        let result = extractor::extract_signature(&bytes);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx, timeout })
}
