//! Health monitoring and metrics for pipeline

use std::sync::atomic::{AtomicU64, Ordering};

use super::types::unix_now;

/// Health metrics for a pipeline run
///
/// Shared by every stage of a run through the `StageContext`.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Envelopes emitted by the source
    pub messages_emitted: AtomicU64,

    /// Poll attempts that produced no envelope (network, status or parse failure)
    pub polls_skipped: AtomicU64,

    /// Envelopes dropped by a filter
    pub messages_filtered: AtomicU64,

    /// Envelopes successfully written by the sink
    pub messages_written: AtomicU64,

    /// Failed sink writes
    pub sink_failures: AtomicU64,

    /// Unix seconds of the last envelope seen by any stage
    pub last_activity: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            messages_emitted: AtomicU64::new(0),
            polls_skipped: AtomicU64::new(0),
            messages_filtered: AtomicU64::new(0),
            messages_written: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            last_activity: AtomicU64::new(now_secs()),
        }
    }

    /// Record an envelope leaving the source
    pub fn record_emitted(&self) {
        self.touch();
        self.messages_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a poll that was skipped
    pub fn record_poll_skipped(&self) {
        self.polls_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope dropped by a filter
    pub fn record_filtered(&self) {
        self.messages_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful sink write
    pub fn record_written(&self) {
        self.touch();
        self.messages_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed sink write
    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        self.last_activity.store(now_secs(), Ordering::Relaxed);
    }

    pub fn messages_emitted(&self) -> u64 {
        self.messages_emitted.load(Ordering::Relaxed)
    }

    pub fn polls_skipped(&self) -> u64 {
        self.polls_skipped.load(Ordering::Relaxed)
    }

    pub fn messages_filtered(&self) -> u64 {
        self.messages_filtered.load(Ordering::Relaxed)
    }

    pub fn messages_written(&self) -> u64 {
        self.messages_written.load(Ordering::Relaxed)
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    /// Unix seconds of the last recorded activity
    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Time since any stage last recorded activity
    pub fn idle_for(&self) -> std::time::Duration {
        std::time::Duration::from_secs(now_secs().saturating_sub(self.last_activity()))
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            messages_emitted: self.messages_emitted(),
            polls_skipped: self.polls_skipped(),
            messages_filtered: self.messages_filtered(),
            messages_written: self.messages_written(),
            sink_failures: self.sink_failures(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    unix_now().max(0) as u64
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSummary {
    pub messages_emitted: u64,
    pub polls_skipped: u64,
    pub messages_filtered: u64,
    pub messages_written: u64,
    pub sink_failures: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} emitted, {} written, {} filtered, {} polls skipped, {} sink failures",
            self.messages_emitted,
            self.messages_written,
            self.messages_filtered,
            self.polls_skipped,
            self.sink_failures
        )
    }
}
