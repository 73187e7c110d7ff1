//! Enrollment store: keyed registry of enrolled biometric representations.
//!
//! The matching core never touches a concrete backend directly — it works
//! against [`EnrollmentStore`], so a persistent backend can be substituted
//! without changing any comparison logic. Per-entry results in
//! [`EnrollmentStore::snapshot`] let a backend surface unreadable records
//! individually; the scan layer skips them instead of aborting.

use crate::types::VoterId;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// One enrollment record could not be read. Skippable during scans.
    #[error("enrollment record for voter {voter} unreadable: {reason}")]
    ReadFailed { voter: VoterId, reason: String },
    /// The store itself is unusable. Fatal to the calling operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed registry of enrolled representations, one per identity.
///
/// `put` replaces atomically and unconditionally — the minimal enrollment
/// model keeps only the most recent representation, with no merge and no
/// history. `snapshot` is consistent at call time and iterates in ascending
/// voter-id order so scoring is deterministic.
pub trait EnrollmentStore<R>: Send + Sync {
    fn put(&self, voter: VoterId, repr: R) -> Result<(), StoreError>;

    fn get(&self, voter: VoterId) -> Result<Option<R>, StoreError>;

    /// All enrollments at call time. The outer `Result` is an
    /// infrastructure failure; inner `Err` entries are per-record read
    /// failures to be skipped and reported by the caller.
    #[allow(clippy::type_complexity)]
    fn snapshot(&self) -> Result<Vec<(VoterId, Result<R, StoreError>)>, StoreError>;
}

/// In-process reference implementation backed by `RwLock<HashMap>`.
///
/// Writers replace whole values under the write lock, so concurrent
/// readers never observe a partially-written representation.
pub struct MemoryStore<R> {
    inner: RwLock<HashMap<VoterId, R>>,
}

impl<R> MemoryStore<R> {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send + Sync> EnrollmentStore<R> for MemoryStore<R> {
    fn put(&self, voter: VoterId, repr: R) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        map.insert(voter, repr);
        Ok(())
    }

    fn get(&self, voter: VoterId) -> Result<Option<R>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        Ok(map.get(&voter).cloned())
    }

    fn snapshot(&self) -> Result<Vec<(VoterId, Result<R, StoreError>)>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        let mut entries: Vec<_> = map
            .iter()
            .map(|(&voter, repr)| (voter, Ok(repr.clone())))
            .collect();
        entries.sort_by_key(|(voter, _)| *voter);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_then_get() {
        let store = MemoryStore::new();
        store.put(7, vec![1u8, 2, 3]).unwrap();
        assert_eq!(store.get(7).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get(8).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_prior_representation() {
        let store = MemoryStore::new();
        store.put(7, vec![1u8]).unwrap();
        store.put(7, vec![2u8]).unwrap();
        assert_eq!(store.get(7).unwrap(), Some(vec![2]));
        // No history: exactly one entry remains.
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_sorted_by_voter_id() {
        let store = MemoryStore::new();
        for id in [42u64, 3, 17, 9] {
            store.put(id, id as u32).unwrap();
        }
        let ids: Vec<VoterId> = store
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![3, 9, 17, 42]);
    }

    #[test]
    fn test_snapshot_isolated_from_later_puts() {
        let store = MemoryStore::new();
        store.put(1, 10u32).unwrap();
        let snap = store.snapshot().unwrap();
        store.put(2, 20u32).unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_concurrent_puts_distinct_voters() {
        // Interleaved writers for distinct identities must never corrupt
        // each other's representation.
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for writer in 0..8u64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for round in 0..100u64 {
                    let voter = writer;
                    let repr: Vec<u64> = vec![writer; 64];
                    store.put(voter, repr).unwrap();
                    // Interleave with reads of other writers' entries.
                    let _ = store.get((writer + round) % 8);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Post-hoc read-back: every representation is internally consistent.
        for voter in 0..8u64 {
            let repr = store.get(voter).unwrap().unwrap();
            assert_eq!(repr.len(), 64);
            assert!(repr.iter().all(|&v| v == voter), "torn write for voter {voter}");
        }
    }

    #[test]
    fn test_concurrent_put_and_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    store.put(i % 4, vec![i; 32]).unwrap();
                }
            })
        };

        for _ in 0..200 {
            for (_, repr) in store.snapshot().unwrap() {
                let repr = repr.unwrap();
                // Whole-value replace: all elements of a read value agree.
                assert!(repr.windows(2).all(|w| w[0] == w[1]));
            }
        }
        writer.join().unwrap();
    }
}
