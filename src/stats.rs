//! In-process counters for the control plane (supplemented feature; see
//! SPEC_FULL.md "Metrics-shaped counters without a metrics backend").
//!
//! Not a metrics exporter — deployment packaging (alarms, dashboards) is an
//! explicit Non-goal — but the plain atomic counters a caller would wire
//! into one: a stats struct of `AtomicU64`s with a cheap snapshot method,
//! rather than pulling in a metrics crate for a handful of counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, lock-free counters updated by the admission and lifecycle
/// handlers. Cheap to clone (wrap in `Arc`) and share across every
/// connection task.
#[derive(Default)]
pub struct ControlPlaneStats {
    sessions_created: AtomicU64,
    joins_admitted: AtomicU64,
    joins_rejected_not_found: AtomicU64,
    joins_rejected_full: AtomicU64,
    joins_rejected_unsupported_language: AtomicU64,
    joins_rejected_rate_limited: AtomicU64,
    joins_rejected_invalid_input: AtomicU64,
    sessions_ended: AtomicU64,
    broadcast_sent: AtomicU64,
    broadcast_gone: AtomicU64,
    broadcast_failed: AtomicU64,
}

/// A point-in-time copy of [`ControlPlaneStats`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Sessions successfully created via `createSession`.
    pub sessions_created: u64,
    /// Listener joins that were admitted.
    pub joins_admitted: u64,
    /// Joins rejected with `SESSION_NOT_FOUND`.
    pub joins_rejected_not_found: u64,
    /// Joins rejected with `SESSION_FULL`.
    pub joins_rejected_full: u64,
    /// Joins rejected with `UNSUPPORTED_LANGUAGE`.
    pub joins_rejected_unsupported_language: u64,
    /// Joins rejected with `RATE_LIMITED`.
    pub joins_rejected_rate_limited: u64,
    /// Joins rejected with `INVALID_INPUT`.
    pub joins_rejected_invalid_input: u64,
    /// Sessions that reached a terminal speaker disconnect.
    pub sessions_ended: u64,
    /// Broadcast sends that succeeded.
    pub broadcast_sent: u64,
    /// Broadcast sends whose peer had already gone.
    pub broadcast_gone: u64,
    /// Broadcast sends that failed for another reason.
    pub broadcast_failed: u64,
}

impl ControlPlaneStats {
    /// Build a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful `createSession`.
    pub fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a `joinSession` outcome by its wire error code, or `None` for
    /// admitted.
    pub fn record_join_outcome(&self, code: Option<&'static str>) {
        let counter = match code {
            None => &self.joins_admitted,
            Some("SESSION_NOT_FOUND") => &self.joins_rejected_not_found,
            Some("SESSION_FULL") => &self.joins_rejected_full,
            Some("UNSUPPORTED_LANGUAGE") => &self.joins_rejected_unsupported_language,
            Some("RATE_LIMITED") => &self.joins_rejected_rate_limited,
            Some("INVALID_INPUT") => &self.joins_rejected_invalid_input,
            Some(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal speaker disconnect (session end).
    pub fn record_session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a [`crate::fanout::BroadcastSummary`] into the running totals.
    pub fn record_broadcast(&self, summary: &crate::fanout::BroadcastSummary) {
        self.broadcast_sent
            .fetch_add(summary.sent.len() as u64, Ordering::Relaxed);
        self.broadcast_gone
            .fetch_add(summary.gone.len() as u64, Ordering::Relaxed);
        self.broadcast_failed
            .fetch_add(summary.failed.len() as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough point-in-time snapshot. Individual counters
    /// are read independently (no cross-field atomicity), which is fine for
    /// observability but not for invariant checks.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            joins_admitted: self.joins_admitted.load(Ordering::Relaxed),
            joins_rejected_not_found: self.joins_rejected_not_found.load(Ordering::Relaxed),
            joins_rejected_full: self.joins_rejected_full.load(Ordering::Relaxed),
            joins_rejected_unsupported_language: self
                .joins_rejected_unsupported_language
                .load(Ordering::Relaxed),
            joins_rejected_rate_limited: self.joins_rejected_rate_limited.load(Ordering::Relaxed),
            joins_rejected_invalid_input: self.joins_rejected_invalid_input.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            broadcast_sent: self.broadcast_sent.load(Ordering::Relaxed),
            broadcast_gone: self.broadcast_gone.load(Ordering::Relaxed),
            broadcast_failed: self.broadcast_failed.load(Ordering::Relaxed),
        }
    }
}
