//! Duplicate matching: probe representation against every enrolled one.
//!
//! Face candidates are selected by Euclidean distance below a threshold;
//! signature candidates by structural similarity above one. Unreadable
//! enrollment records are skipped and reported, never fatal — one bad
//! record must not block verification of all others.

use crate::ssim;
use crate::store::StoreError;
use crate::types::{Embedding, FaceMatch, SignatureMatch, SignatureRaster, VoterId};
use serde::{Deserialize, Serialize};

/// Industry-standard decision threshold for the 128-dim embedding scheme.
/// Scheme-dependent: recalibrate when the embedding model changes.
pub const DEFAULT_FACE_DISTANCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Ordering policy for face duplicate results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrdering {
    /// Ascending distance, ties broken by voter id. Deterministic and
    /// most-likely-first. Default.
    BestFirst,
    /// Store iteration order (ascending voter id). Legacy contract.
    EnrollmentOrder,
}

impl std::str::FromStr for MatchOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_first" => Ok(Self::BestFirst),
            "enrollment_order" => Ok(Self::EnrollmentOrder),
            other => Err(format!(
                "unknown match ordering: {other} (expected best_first | enrollment_order)"
            )),
        }
    }
}

/// Face matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatchConfig {
    /// Report a candidate when Euclidean distance is strictly below this.
    pub distance_threshold: f32,
    pub ordering: MatchOrdering,
}

impl Default for FaceMatchConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_FACE_DISTANCE_THRESHOLD,
            ordering: MatchOrdering::BestFirst,
        }
    }
}

/// Signature matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureMatchConfig {
    /// Report a candidate when structural similarity is strictly above this.
    pub similarity_threshold: f32,
}

impl Default for SignatureMatchConfig {
    fn default() -> Self {
        Self { similarity_threshold: DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD }
    }
}

/// Result of scanning a probe against an enrollment snapshot.
#[derive(Debug, Clone)]
pub struct ScanOutcome<M> {
    /// Candidates passing the decision threshold, in policy order.
    pub candidates: Vec<M>,
    /// Voters whose enrollment records were unreadable and skipped.
    pub skipped: Vec<VoterId>,
}

impl<M> ScanOutcome<M> {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Scan a probe embedding against every enrolled face embedding.
pub fn scan_faces(
    probe: &Embedding,
    entries: Vec<(VoterId, Result<Embedding, StoreError>)>,
    config: &FaceMatchConfig,
) -> ScanOutcome<FaceMatch> {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for (voter, entry) in entries {
        let enrolled = match entry {
            Ok(e) => e,
            Err(error) => {
                tracing::warn!(voter, error = %error, "skipping unreadable face enrollment");
                skipped.push(voter);
                continue;
            }
        };

        let distance = probe.euclidean_distance(&enrolled);
        if distance < config.distance_threshold {
            candidates.push(FaceMatch { voter, distance });
        }
    }

    if config.ordering == MatchOrdering::BestFirst {
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.voter.cmp(&b.voter))
        });
    }

    ScanOutcome { candidates, skipped }
}

/// Scan a probe raster against every enrolled signature raster.
///
/// Results are always ordered most-similar-first, ties broken by voter id.
pub fn scan_signatures(
    probe: &SignatureRaster,
    entries: Vec<(VoterId, Result<SignatureRaster, StoreError>)>,
    config: &SignatureMatchConfig,
) -> ScanOutcome<SignatureMatch> {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for (voter, entry) in entries {
        let enrolled = match entry {
            Ok(r) => r,
            Err(error) => {
                tracing::warn!(voter, error = %error, "skipping unreadable signature enrollment");
                skipped.push(voter);
                continue;
            }
        };

        let similarity = ssim::structural_similarity(probe, &enrolled);
        if similarity > config.similarity_threshold {
            candidates.push(SignatureMatch { voter, similarity });
        }
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.voter.cmp(&b.voter))
    });

    ScanOutcome { candidates, skipped }
}
