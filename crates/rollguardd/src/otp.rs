//! In-memory one-time-passcode cache.
//!
//! Implements the [`OtpGate`] collaborator interface: 6-digit codes with a
//! fixed validity window, consumed on first successful verification.
//! Delivery of the code to the voter is the registration workflow's
//! concern, not this service's.

use rand::Rng;
use rollguard_core::types::VoterId;
use rollguard_core::verify::OtpGate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct IssuedCode {
    code: String,
    issued_at: Instant,
}

pub struct MemoryOtpCache {
    ttl: Duration,
    codes: Mutex<HashMap<VoterId, IssuedCode>>,
}

impl MemoryOtpCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, codes: Mutex::new(HashMap::new()) }
    }

    /// Issue a fresh code for a voter, replacing any outstanding one.
    pub fn issue(&self, voter: VoterId) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let mut codes = self.lock();
        codes.insert(voter, IssuedCode { code: code.clone(), issued_at: Instant::now() });
        tracing::debug!(voter, "otp issued");
        code
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<VoterId, IssuedCode>> {
        // The map stays structurally valid even if a holder panicked.
        self.codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OtpGate for MemoryOtpCache {
    fn verify(&self, voter: VoterId, code: &str) -> bool {
        let mut codes = self.lock();

        let Some(issued) = codes.get(&voter) else {
            return false;
        };

        if issued.issued_at.elapsed() > self.ttl {
            tracing::debug!(voter, "otp expired");
            codes.remove(&voter);
            return false;
        }

        if issued.code != code {
            return false;
        }

        // Single-use: consume on success.
        codes.remove(&voter);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let cache = MemoryOtpCache::new(Duration::from_secs(300));
        let code = cache.issue(1);
        assert_eq!(code.len(), 6);
        assert!(cache.verify(1, &code));
    }

    #[test]
    fn test_code_is_single_use() {
        let cache = MemoryOtpCache::new(Duration::from_secs(300));
        let code = cache.issue(1);
        assert!(cache.verify(1, &code));
        assert!(!cache.verify(1, &code));
    }

    #[test]
    fn test_wrong_code_rejected_and_retained() {
        let cache = MemoryOtpCache::new(Duration::from_secs(300));
        let code = cache.issue(1);
        assert!(!cache.verify(1, "999999x"));
        // A mismatch does not consume the outstanding code.
        assert!(cache.verify(1, &code));
    }

    #[test]
    fn test_expired_code_rejected() {
        let cache = MemoryOtpCache::new(Duration::ZERO);
        let code = cache.issue(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.verify(1, &code));
    }

    #[test]
    fn test_unknown_voter_rejected() {
        let cache = MemoryOtpCache::new(Duration::from_secs(300));
        assert!(!cache.verify(42, "123456"));
    }

    #[test]
    fn test_reissue_replaces_prior_code() {
        let cache = MemoryOtpCache::new(Duration::from_secs(300));
        let first = cache.issue(1);
        let second = cache.issue(1);
        if first != second {
            assert!(!cache.verify(1, &first));
        }
        assert!(cache.verify(1, &second));
    }
}
