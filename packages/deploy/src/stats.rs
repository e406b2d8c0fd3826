//! Run-wide counters and the changed-key log.
//!
//! Both are written concurrently by upload workers and read once the run
//! (or a failed part of it) is over.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::DeployStats;

/// Atomic counters behind [`DeployStats`].
#[derive(Debug, Default)]
pub struct StatsCollector {
    deleted: AtomicU64,
    stale: AtomicU64,
    uploaded: AtomicU64,
    skipped: AtomicU64,
}

impl StatsCollector {
    /// Records `n` deleted objects.
    pub fn add_deleted(&self, n: u64) {
        self.deleted.fetch_add(n, Ordering::Relaxed);
    }

    /// Records `n` objects left in place by the max-delete ceiling.
    pub fn add_stale(&self, n: u64) {
        self.stale.fetch_add(n, Ordering::Relaxed);
    }

    /// Records `n` uploaded files.
    pub fn add_uploaded(&self, n: u64) {
        self.uploaded.fetch_add(n, Ordering::Relaxed);
    }

    /// Records `n` unchanged files.
    pub fn add_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> DeployStats {
        DeployStats {
            deleted: self.deleted.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Keys uploaded or deleted during the run, for CDN invalidation.
#[derive(Debug, Default)]
pub struct ChangedKeys {
    keys: Mutex<Vec<String>>,
}

impl ChangedKeys {
    /// Records one changed key.
    pub fn track(&self, key: &str) {
        self.lock().push(key.to_string());
    }

    /// Records a batch of changed keys.
    pub fn track_all(&self, keys: &[String]) {
        self.lock().extend_from_slice(keys);
    }

    /// Sorted copy of every key recorded so far.
    #[must_use]
    pub fn sorted(&self) -> Vec<String> {
        let mut keys = self.lock().clone();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
