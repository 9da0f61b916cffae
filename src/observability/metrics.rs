//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only when a registry is created
//! - Relaxed atomics; values are exact once writers are quiescent

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one store instance.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Nids handed out for previously unseen UUIDs
    nids_allocated: AtomicU64,
    /// UUID shards loaded or created
    shards_loaded: AtomicU64,
    /// UUID shards written to disk
    shards_flushed: AtomicU64,
    /// Sequences assigned across all namespaces
    sequences_assigned: AtomicU64,
    /// Component payloads written
    components_written: AtomicU64,
    /// Write-and-notify tasks submitted to the pool
    write_tasks: AtomicU64,
    /// Commits that produced a record
    commits: AtomicU64,
    /// Commits reverted by an ERROR alert
    commits_reverted: AtomicU64,
    /// Commits with nothing pending
    commits_noop: AtomicU64,
    /// Stamps finalized by commits
    stamps_finalized: AtomicU64,
    /// Stamps finalized as cancelled
    stamps_canceled: AtomicU64,
    /// Alerts raised by change checkers
    alerts_raised: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_nids_allocated(&self) {
        self.nids_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_shards_loaded(&self) {
        self.shards_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_shards_flushed(&self) {
        self.shards_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sequences_assigned(&self) {
        self.sequences_assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_components_written(&self) {
        self.components_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_tasks(&self) {
        self.write_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits_reverted(&self) {
        self.commits_reverted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits_noop(&self) {
        self.commits_noop.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stamps_finalized(&self, count: u64) {
        self.stamps_finalized.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_stamps_canceled(&self, count: u64) {
        self.stamps_canceled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_alerts_raised(&self, count: u64) {
        self.alerts_raised.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nids_allocated: self.nids_allocated.load(Ordering::Relaxed),
            shards_loaded: self.shards_loaded.load(Ordering::Relaxed),
            shards_flushed: self.shards_flushed.load(Ordering::Relaxed),
            sequences_assigned: self.sequences_assigned.load(Ordering::Relaxed),
            components_written: self.components_written.load(Ordering::Relaxed),
            write_tasks: self.write_tasks.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commits_reverted: self.commits_reverted.load(Ordering::Relaxed),
            commits_noop: self.commits_noop.load(Ordering::Relaxed),
            stamps_finalized: self.stamps_finalized.load(Ordering::Relaxed),
            stamps_canceled: self.stamps_canceled.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
        }
    }

    /// Get current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub nids_allocated: u64,
    pub shards_loaded: u64,
    pub shards_flushed: u64,
    pub sequences_assigned: u64,
    pub components_written: u64,
    pub write_tasks: u64,
    pub commits: u64,
    pub commits_reverted: u64,
    pub commits_noop: u64,
    pub stamps_finalized: u64,
    pub stamps_canceled: u64,
    pub alerts_raised: u64,
}
