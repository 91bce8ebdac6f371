//! Metrics registry for topowatch
//!
//! - Counters only, monotonic, reset on process start
//! - Thread-safe and lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the topology service
///
/// All counters use Relaxed ordering; they are observational and never
/// used to synchronise anything.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Snapshots published
    publishes: AtomicU64,
    /// Requests answered without waiting
    immediate_responses: AtomicU64,
    /// Requests that registered a waiter
    waiters_registered: AtomicU64,
    /// Waiters released by a publish
    waiters_changed: AtomicU64,
    /// Waiters whose deadline passed
    waiters_timed_out: AtomicU64,
    /// Waiters released by shutdown
    waiters_shutdown: AtomicU64,
    /// Waiters abandoned by their caller before resolving
    waiters_cancelled: AtomicU64,
    /// Requests rejected by validation
    validation_failures: AtomicU64,
    /// Internal invariant violations
    internal_errors: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment publishes
    pub fn increment_publishes(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment immediate responses
    pub fn increment_immediate_responses(&self) {
        self.immediate_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment registered waiters
    pub fn increment_waiters_registered(&self) {
        self.waiters_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Add waiters released by a publish
    pub fn add_waiters_changed(&self, count: u64) {
        self.waiters_changed.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment timed-out waiters
    pub fn increment_waiters_timed_out(&self) {
        self.waiters_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Add waiters released by shutdown
    pub fn add_waiters_shutdown(&self, count: u64) {
        self.waiters_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment abandoned waiters
    pub fn increment_waiters_cancelled(&self) {
        self.waiters_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment validation failures
    pub fn increment_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment internal errors
    pub fn increment_internal_errors(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            publishes: self.publishes.load(Ordering::Relaxed),
            immediate_responses: self.immediate_responses.load(Ordering::Relaxed),
            waiters_registered: self.waiters_registered.load(Ordering::Relaxed),
            waiters_changed: self.waiters_changed.load(Ordering::Relaxed),
            waiters_timed_out: self.waiters_timed_out.load(Ordering::Relaxed),
            waiters_shutdown: self.waiters_shutdown.load(Ordering::Relaxed),
            waiters_cancelled: self.waiters_cancelled.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub publishes: u64,
    pub immediate_responses: u64,
    pub waiters_registered: u64,
    pub waiters_changed: u64,
    pub waiters_timed_out: u64,
    pub waiters_shutdown: u64,
    pub waiters_cancelled: u64,
    pub validation_failures: u64,
    pub internal_errors: u64,
}
