//! Deduplication of assignment logging.
//!
//! The cache records the last logged decision per (subject, flag) pair and suppresses
//! redundant deliveries to the assignment logger. This gives *at-most-once logging per
//! distinct decision*, not globally exactly-once: if a subject's variation changes and later
//! reverts, the reversion is logged as new. Keeping only the last value bounds the cache at
//! O(distinct subject-flag pairs) instead of O(history).

use std::{collections::HashMap, sync::Mutex};

/// Uniquely identifies "this subject got this variation from this allocation of this flag."
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct AssignmentCacheKey {
    pub subject_key: String,
    pub flag_key: String,
    pub allocation_key: String,
    pub variation_key: String,
}

/// Storage for the last logged decision per (subject, flag) pair.
///
/// Implementations must tolerate concurrent `get`/`set` calls. Two threads evaluating the
/// same subject and flag simultaneously may both observe "not yet logged" and both log once;
/// that race is accepted.
pub trait AssignmentCache: Send + Sync {
    /// Returns `true` iff `key` equals the decision most recently recorded for its subject
    /// and flag.
    fn has_logged_assignment(&self, key: &AssignmentCacheKey) -> bool;

    /// Record `key` as the last logged decision for its subject and flag, overwriting any
    /// previous marker.
    fn set_last_logged_assignment(&self, key: &AssignmentCacheKey);
}

/// In-memory last-value implementation of [`AssignmentCache`].
#[derive(Debug, Default)]
pub struct InMemoryAssignmentCache {
    entries: Mutex<HashMap<(String, String), (String, String)>>,
}

impl InMemoryAssignmentCache {
    /// Create a new empty cache.
    pub fn new() -> InMemoryAssignmentCache {
        InMemoryAssignmentCache::default()
    }
}

impl AssignmentCache for InMemoryAssignmentCache {
    fn has_logged_assignment(&self, key: &AssignmentCacheKey) -> bool {
        let entries = self
            .entries
            .lock()
            .expect("thread holding assignment cache lock should not panic");
        entries
            .get(&(key.subject_key.clone(), key.flag_key.clone()))
            .is_some_and(|(allocation, variation)| {
                *allocation == key.allocation_key && *variation == key.variation_key
            })
    }

    fn set_last_logged_assignment(&self, key: &AssignmentCacheKey) {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding assignment cache lock should not panic");
        entries.insert(
            (key.subject_key.clone(), key.flag_key.clone()),
            (key.allocation_key.clone(), key.variation_key.clone()),
        );
    }
}
