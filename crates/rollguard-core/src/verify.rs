//! Verification orchestration: OTP gate plus per-channel biometric checks.
//!
//! A verification call walks a small state machine:
//! `PendingOtp → OtpVerified → (supplied channels) → Accepted | Rejected`.
//! Channels the caller does not supply are skipped — callers requiring
//! strict verification must supply every channel they consider mandatory.
//! A failed channel is a normal rejected outcome with a reason code;
//! store-infrastructure failures are surfaced as errors instead.

use crate::matcher::{self, FaceMatchConfig, SignatureMatchConfig};
use crate::store::{EnrollmentStore, StoreError};
use crate::types::{Embedding, SignatureRaster, VoterId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One-time-passcode precondition gate. Black box to this core; the
/// service layer supplies the implementation and its validity window.
pub trait OtpGate: Send + Sync {
    /// Check a submitted code for the claimed voter. Implementations
    /// consume the code on success (single-use).
    fn verify(&self, voter: VoterId, code: &str) -> bool;
}

/// Independent verification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyChannel {
    Face,
    Signature,
    Fingerprint,
}

/// Probe representations supplied by the caller. Extraction happens before
/// orchestration; an extraction failure short-circuits the whole call and
/// this orchestrator is never invoked.
#[derive(Default)]
pub struct Probes {
    pub face: Option<Embedding>,
    pub signature: Option<SignatureRaster>,
    pub fingerprint: Option<Vec<u8>>,
}

/// Terminal outcome of a verification call. No retries within one call —
/// retry means a fresh OTP request at the caller level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Submitted code did not match or was outside its validity window.
    OtpInvalid,
    /// The claimed voter has no enrollment for a supplied channel.
    UnknownIdentity(VerifyChannel),
    /// The supplied probe did not verify as the claimed voter.
    ChannelFailed(VerifyChannel),
}

impl RejectReason {
    /// Machine-readable reason code for the service boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OtpInvalid => "otp_invalid",
            Self::UnknownIdentity(_) => "unknown_identity",
            Self::ChannelFailed(VerifyChannel::Face) => "face_channel_failed",
            Self::ChannelFailed(VerifyChannel::Signature) => "signature_channel_failed",
            Self::ChannelFailed(VerifyChannel::Fingerprint) => "fingerprint_channel_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PendingOtp,
    OtpVerified,
}

/// Composes the OTP gate with the per-channel matchers.
pub struct VerificationOrchestrator {
    faces: Arc<dyn EnrollmentStore<Embedding>>,
    signatures: Arc<dyn EnrollmentStore<SignatureRaster>>,
    fingerprints: Arc<dyn EnrollmentStore<Vec<u8>>>,
    otp: Arc<dyn OtpGate>,
    face_config: FaceMatchConfig,
    signature_config: SignatureMatchConfig,
}

impl VerificationOrchestrator {
    pub fn new(
        faces: Arc<dyn EnrollmentStore<Embedding>>,
        signatures: Arc<dyn EnrollmentStore<SignatureRaster>>,
        fingerprints: Arc<dyn EnrollmentStore<Vec<u8>>>,
        otp: Arc<dyn OtpGate>,
    ) -> Self {
        Self {
            faces,
            signatures,
            fingerprints,
            otp,
            face_config: FaceMatchConfig::default(),
            signature_config: SignatureMatchConfig::default(),
        }
    }

    pub fn with_configs(
        mut self,
        face_config: FaceMatchConfig,
        signature_config: SignatureMatchConfig,
    ) -> Self {
        self.face_config = face_config;
        self.signature_config = signature_config;
        self
    }

    /// Run one verification call for a claimed identity.
    ///
    /// `Err` is reserved for infrastructure failures (store unavailable);
    /// every biometric or OTP outcome is a [`Decision`].
    pub fn verify(
        &self,
        claim: VoterId,
        code: &str,
        probes: &Probes,
    ) -> Result<Decision, StoreError> {
        let mut state = State::PendingOtp;
        tracing::debug!(voter = claim, ?state, "verification started");

        if !self.otp.verify(claim, code) {
            tracing::info!(voter = claim, "verification rejected: otp");
            return Ok(Decision::Rejected(RejectReason::OtpInvalid));
        }
        state = State::OtpVerified;
        tracing::debug!(voter = claim, ?state, "otp accepted");

        if let Some(probe) = &probes.face {
            if let Some(reason) = self.check_face(claim, probe)? {
                tracing::info!(voter = claim, reason = reason.code(), "verification rejected");
                return Ok(Decision::Rejected(reason));
            }
        }

        if let Some(probe) = &probes.signature {
            if let Some(reason) = self.check_signature(claim, probe)? {
                tracing::info!(voter = claim, reason = reason.code(), "verification rejected");
                return Ok(Decision::Rejected(reason));
            }
        }

        if let Some(probe) = &probes.fingerprint {
            if let Some(reason) = self.check_fingerprint(claim, probe)? {
                tracing::info!(voter = claim, reason = reason.code(), "verification rejected");
                return Ok(Decision::Rejected(reason));
            }
        }

        tracing::info!(voter = claim, "verification accepted");
        Ok(Decision::Accepted)
    }

    /// Face channel passes when the claimed voter appears in the duplicate
    /// candidate set for the probe.
    fn check_face(
        &self,
        claim: VoterId,
        probe: &Embedding,
    ) -> Result<Option<RejectReason>, StoreError> {
        if self.faces.get(claim)?.is_none() {
            return Ok(Some(RejectReason::UnknownIdentity(VerifyChannel::Face)));
        }

        let outcome = matcher::scan_faces(probe, self.faces.snapshot()?, &self.face_config);
        if outcome.candidates.iter().any(|c| c.voter == claim) {
            Ok(None)
        } else {
            Ok(Some(RejectReason::ChannelFailed(VerifyChannel::Face)))
        }
    }

    fn check_signature(
        &self,
        claim: VoterId,
        probe: &SignatureRaster,
    ) -> Result<Option<RejectReason>, StoreError> {
        if self.signatures.get(claim)?.is_none() {
            return Ok(Some(RejectReason::UnknownIdentity(VerifyChannel::Signature)));
        }

        let outcome =
            matcher::scan_signatures(probe, self.signatures.snapshot()?, &self.signature_config);
        if outcome.candidates.iter().any(|c| c.voter == claim) {
            Ok(None)
        } else {
            Ok(Some(RejectReason::ChannelFailed(VerifyChannel::Signature)))
        }
    }

    /// Fingerprint is a placeholder modality: exact-byte comparison against
    /// the single stored sample.
    fn check_fingerprint(
        &self,
        claim: VoterId,
        probe: &[u8],
    ) -> Result<Option<RejectReason>, StoreError> {
        match self.fingerprints.get(claim)? {
            None => Ok(Some(RejectReason::UnknownIdentity(VerifyChannel::Fingerprint))),
            Some(stored) if stored == probe => Ok(None),
            Some(_) => Ok(Some(RejectReason::ChannelFailed(VerifyChannel::Fingerprint))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct FixedOtp(bool);

    impl OtpGate for FixedOtp {
        fn verify(&self, _voter: VoterId, _code: &str) -> bool {
            self.0
        }
    }

    fn embedding(fill: f32) -> Embedding {
        Embedding::new(vec![fill; 128])
    }

    fn flat_raster(value: u8) -> SignatureRaster {
        SignatureRaster::new(vec![value; 32 * 32], 32, 32)
    }

    struct Fixture {
        faces: Arc<MemoryStore<Embedding>>,
        signatures: Arc<MemoryStore<SignatureRaster>>,
        fingerprints: Arc<MemoryStore<Vec<u8>>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                faces: Arc::new(MemoryStore::new()),
                signatures: Arc::new(MemoryStore::new()),
                fingerprints: Arc::new(MemoryStore::new()),
            }
        }

        fn orchestrator(&self, otp_ok: bool) -> VerificationOrchestrator {
            VerificationOrchestrator::new(
                self.faces.clone(),
                self.signatures.clone(),
                self.fingerprints.clone(),
                Arc::new(FixedOtp(otp_ok)),
            )
        }
    }

    #[test]
    fn test_otp_only_accepts() {
        let fx = Fixture::new();
        let decision = fx
            .orchestrator(true)
            .verify(1, "123456", &Probes::default())
            .unwrap();
        assert_eq!(decision, Decision::Accepted);
    }

    #[test]
    fn test_bad_otp_rejects_before_channels() {
        let fx = Fixture::new();
        fx.faces.put(1, embedding(0.2)).unwrap();
        // The face probe would have passed, but the gate comes first.
        let probes = Probes { face: Some(embedding(0.2)), ..Default::default() };
        let decision = fx.orchestrator(false).verify(1, "000000", &probes).unwrap();
        assert_eq!(decision, Decision::Rejected(RejectReason::OtpInvalid));
    }

    #[test]
    fn test_face_channel_passes_for_claimed_voter() {
        let fx = Fixture::new();
        fx.faces.put(1, embedding(0.2)).unwrap();
        fx.faces.put(2, embedding(5.0)).unwrap();
        let probes = Probes { face: Some(embedding(0.2)), ..Default::default() };
        let decision = fx.orchestrator(true).verify(1, "123456", &probes).unwrap();
        assert_eq!(decision, Decision::Accepted);
    }

    #[test]
    fn test_face_matching_different_voter_fails_channel() {
        let fx = Fixture::new();
        fx.faces.put(1, embedding(0.2)).unwrap();
        fx.faces.put(2, embedding(5.0)).unwrap();
        // Probe matches voter 1, but voter 2 is claimed.
        let probes = Probes { face: Some(embedding(0.2)), ..Default::default() };
        let decision = fx.orchestrator(true).verify(2, "123456", &probes).unwrap();
        assert_eq!(
            decision,
            Decision::Rejected(RejectReason::ChannelFailed(VerifyChannel::Face))
        );
    }

    #[test]
    fn test_unenrolled_claim_is_unknown_identity() {
        let fx = Fixture::new();
        let probes = Probes { face: Some(embedding(0.2)), ..Default::default() };
        let decision = fx.orchestrator(true).verify(9, "123456", &probes).unwrap();
        assert_eq!(
            decision,
            Decision::Rejected(RejectReason::UnknownIdentity(VerifyChannel::Face))
        );
    }

    #[test]
    fn test_signature_channel_pass_and_fail() {
        let fx = Fixture::new();
        fx.signatures.put(1, flat_raster(60)).unwrap();

        let pass = Probes { signature: Some(flat_raster(60)), ..Default::default() };
        assert_eq!(
            fx.orchestrator(true).verify(1, "123456", &pass).unwrap(),
            Decision::Accepted
        );

        let fail = Probes { signature: Some(flat_raster(230)), ..Default::default() };
        assert_eq!(
            fx.orchestrator(true).verify(1, "123456", &fail).unwrap(),
            Decision::Rejected(RejectReason::ChannelFailed(VerifyChannel::Signature))
        );
    }

    #[test]
    fn test_fingerprint_channel_exact_bytes() {
        let fx = Fixture::new();
        fx.fingerprints.put(1, vec![1, 2, 3, 4]).unwrap();

        let pass = Probes { fingerprint: Some(vec![1, 2, 3, 4]), ..Default::default() };
        assert_eq!(
            fx.orchestrator(true).verify(1, "123456", &pass).unwrap(),
            Decision::Accepted
        );

        let fail = Probes { fingerprint: Some(vec![9, 9]), ..Default::default() };
        assert_eq!(
            fx.orchestrator(true).verify(1, "123456", &fail).unwrap(),
            Decision::Rejected(RejectReason::ChannelFailed(VerifyChannel::Fingerprint))
        );
    }

    #[test]
    fn test_all_supplied_channels_must_pass() {
        let fx = Fixture::new();
        fx.faces.put(1, embedding(0.2)).unwrap();
        fx.fingerprints.put(1, vec![1, 2, 3]).unwrap();

        let probes = Probes {
            face: Some(embedding(0.2)),
            fingerprint: Some(vec![0, 0, 0]),
            ..Default::default()
        };
        let decision = fx.orchestrator(true).verify(1, "123456", &probes).unwrap();
        assert_eq!(
            decision,
            Decision::Rejected(RejectReason::ChannelFailed(VerifyChannel::Fingerprint))
        );
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(RejectReason::OtpInvalid.code(), "otp_invalid");
        assert_eq!(
            RejectReason::UnknownIdentity(VerifyChannel::Face).code(),
            "unknown_identity"
        );
        assert_eq!(
            RejectReason::ChannelFailed(VerifyChannel::Signature).code(),
            "signature_channel_failed"
        );
    }
}
