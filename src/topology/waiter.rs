//! Waiters
//!
//! A waiter is a parked request bound to the version it last saw and a deadline.
//! Its completion handle is resolved at most once: by a publish, by shutdown,
//! or, after the deadline, by the waiter itself.
//!
//! A completion can be awaited from a thread (`wait_until`) or from a task
//! (`wait_until_async`); the async path never occupies a blocking thread.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::snapshot::TopologySnapshot;
use super::version::TopologyVersion;

/// How a wait ended.
pub enum WaitOutcome<S> {
    /// The requested version was already out of date; answered without waiting
    Stale(Arc<TopologySnapshot<S>>),
    /// The topology moved past the requested version
    Changed(Arc<TopologySnapshot<S>>),
    /// The deadline passed with no change; carries the unchanged snapshot
    TimedOut(Arc<TopologySnapshot<S>>),
    /// The service is shutting down
    ShuttingDown,
}

impl<S> WaitOutcome<S> {
    /// Snapshot to answer with, if any.
    pub fn snapshot(&self) -> Option<&Arc<TopologySnapshot<S>>> {
        match self {
            WaitOutcome::Stale(s) | WaitOutcome::Changed(s) | WaitOutcome::TimedOut(s) => Some(s),
            WaitOutcome::ShuttingDown => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            WaitOutcome::Stale(_) => "stale",
            WaitOutcome::Changed(_) => "changed",
            WaitOutcome::TimedOut(_) => "timed_out",
            WaitOutcome::ShuttingDown => "shutting_down",
        }
    }
}

impl<S> Clone for WaitOutcome<S> {
    fn clone(&self) -> Self {
        match self {
            WaitOutcome::Stale(s) => WaitOutcome::Stale(Arc::clone(s)),
            WaitOutcome::Changed(s) => WaitOutcome::Changed(Arc::clone(s)),
            WaitOutcome::TimedOut(s) => WaitOutcome::TimedOut(Arc::clone(s)),
            WaitOutcome::ShuttingDown => WaitOutcome::ShuttingDown,
        }
    }
}

impl<S> fmt::Debug for WaitOutcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snapshot() {
            Some(s) => write!(f, "WaitOutcome::{}({})", self.label(), s.version()),
            None => write!(f, "WaitOutcome::{}", self.label()),
        }
    }
}

/// One-shot completion slot shared between a waiter and whoever resolves it.
pub(crate) struct Completion<S> {
    slot: Mutex<Option<WaitOutcome<S>>>,
    ready: Condvar,
    woken: Notify,
}

impl<S> Completion<S> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            woken: Notify::new(),
        }
    }

    /// Store `outcome` and wake the waiter. Returns false if already resolved.
    pub(crate) fn resolve(&self, outcome: WaitOutcome<S>) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.ready.notify_all();
        // A single task awaits each completion; the stored permit covers a
        // resolve that lands between its check and its `notified()`.
        self.woken.notify_one();
        true
    }

    /// Block until resolved or `deadline` passes. `None` means the deadline won.
    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<WaitOutcome<S>> {
        let mut slot = self.slot.lock();
        while slot.is_none() {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        (*slot).clone()
    }

    /// Async [`wait_until`](Self::wait_until). Dropping the future abandons the wait.
    pub(crate) async fn wait_until_async(&self, deadline: Instant) -> Option<WaitOutcome<S>> {
        let resolved = async {
            loop {
                if let Some(outcome) = self.outcome() {
                    return outcome;
                }
                self.woken.notified().await;
            }
        };
        tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), resolved)
            .await
            .ok()
    }

    /// Current resolution, if any.
    pub(crate) fn outcome(&self) -> Option<WaitOutcome<S>> {
        (*self.slot.lock()).clone()
    }
}

/// Identifier of a registered waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(pub(crate) u64);

impl WaiterId {
    /// Raw value, for logs.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter-{}", self.0)
    }
}

/// A registered long-poll request.
pub(crate) struct Waiter<S> {
    id: WaiterId,
    requested: TopologyVersion,
    deadline: Instant,
    completion: Arc<Completion<S>>,
}

impl<S> Waiter<S> {
    pub(crate) fn new(id: WaiterId, requested: TopologyVersion, deadline: Instant) -> Self {
        Self {
            id,
            requested,
            deadline,
            completion: Arc::new(Completion::new()),
        }
    }

    pub(crate) fn completion(&self) -> Arc<Completion<S>> {
        Arc::clone(&self.completion)
    }

    /// Resolve this waiter, consuming it.
    pub(crate) fn resolve(self, outcome: WaitOutcome<S>) -> bool {
        self.completion.resolve(outcome)
    }
}

impl<S> fmt::Debug for Waiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.id)
            .field("requested", &self.requested)
            .field("deadline", &self.deadline)
            .finish()
    }
}
