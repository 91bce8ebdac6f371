//! Topology Notifier
//!
//! Owns the topology state and the waiter registry, and keeps them consistent.
//!
//! # Locking
//!
//! One mutex guards the registry. Every snapshot swap happens while it is held,
//! which gives the two guarantees the long poll depends on:
//!
//! - Check-then-register is atomic: a request that saw the current version is
//!   registered before any publish can run
//! - A publish drains and resolves every registered waiter before the lock is
//!   released, so no registered waiter can miss it
//!
//! Lock order is registry, then completion slot. A waiter never holds its
//! completion slot while taking the registry lock.
//!
//! Waits are either blocking (`register_and_wait`, for threads) or async
//! (`register_and_wait_async`, for the HTTP path). An async waiter whose future
//! is dropped removes itself from the registry.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::errors::{InternalError, TopologyError, TopologyResult};
use super::process_id::ProcessId;
use super::registry::WaiterRegistry;
use super::snapshot::TopologySnapshot;
use super::state::TopologyState;
use super::version::{TopologyVersion, VersionRelation};
use super::waiter::{Completion, WaitOutcome, WaiterId};
use crate::observability::{Event, MetricsRegistry};

enum Registration<S> {
    Answered(WaitOutcome<S>),
    Parked(WaiterId, Arc<Completion<S>>),
}

/// Deregisters an async waiter whose future is dropped mid-wait.
struct CancelGuard<'a, S> {
    notifier: &'a Notifier<S>,
    id: WaiterId,
    armed: bool,
}

impl<S> CancelGuard<'_, S> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S> Drop for CancelGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.notifier.cancel(self.id);
        }
    }
}

/// Publishes topology snapshots and parks requests until they change.
pub struct Notifier<S> {
    state: TopologyState<S>,
    registry: Mutex<WaiterRegistry<S>>,
    metrics: Arc<MetricsRegistry>,
}

impl<S> Notifier<S> {
    /// Start a new process lifetime with `initial` at counter 0.
    pub fn new(initial: S) -> Self {
        Self::with_state(TopologyState::new(initial), Arc::new(MetricsRegistry::new()))
    }

    /// Wrap an existing state, reporting into `metrics`.
    pub fn with_state(state: TopologyState<S>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            state,
            registry: Mutex::new(WaiterRegistry::new()),
            metrics,
        }
    }

    /// Latest published snapshot. Never blocks on the registry lock.
    pub fn current(&self) -> Arc<TopologySnapshot<S>> {
        self.state.current()
    }

    /// Latest published version.
    pub fn version(&self) -> TopologyVersion {
        self.state.version()
    }

    /// Identifier of this process lifetime.
    pub fn process_id(&self) -> ProcessId {
        self.state.process_id()
    }

    /// Counters shared with the rest of the service.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Number of requests currently parked.
    pub fn pending_waiters(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.registry.lock().is_shutting_down()
    }

    /// Install `new_state` at the next version and wake every waiter with it.
    pub fn publish(&self, new_state: S) -> TopologyResult<TopologyVersion> {
        let mut registry = self.registry.lock();
        if registry.is_shutting_down() {
            return Err(TopologyError::ShutdownInProgress);
        }

        let snapshot = match self.state.advance(new_state) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                drop(registry);
                self.report_internal(&err);
                return Err(err);
            }
        };

        let mut woken = 0u64;
        for waiter in registry.drain() {
            if waiter.resolve(WaitOutcome::Changed(Arc::clone(&snapshot))) {
                woken += 1;
            }
        }
        drop(registry);

        let version = snapshot.version();
        self.metrics.increment_publishes();
        self.metrics.add_waiters_changed(woken);

        info!(event = %Event::TopologyPublished, %version, "published topology");
        if woken > 0 {
            debug!(event = %Event::WaitersWoken, %version, count = woken, "woke waiters");
        }
        Ok(version)
    }

    /// Wait until the topology moves past `requested` or `deadline` passes.
    ///
    /// A `requested` version that is not the current one is answered at once with
    /// [`WaitOutcome::Stale`]. Expiry yields [`WaitOutcome::TimedOut`] with the
    /// unchanged snapshot; it is not an error. Blocks the calling thread.
    pub fn register_and_wait(
        &self,
        requested: TopologyVersion,
        deadline: Instant,
    ) -> TopologyResult<WaitOutcome<S>> {
        let (id, completion) = match self.register(requested, deadline) {
            Registration::Answered(outcome) => return Ok(outcome),
            Registration::Parked(id, completion) => (id, completion),
        };

        match completion.wait_until(deadline) {
            Some(outcome) => Ok(outcome),
            None => self.expire(id, &completion),
        }
    }

    /// Async [`register_and_wait`](Self::register_and_wait).
    ///
    /// Parks the calling task, not a thread. Dropping the future before it
    /// completes deregisters the waiter.
    pub async fn register_and_wait_async(
        &self,
        requested: TopologyVersion,
        deadline: Instant,
    ) -> TopologyResult<WaitOutcome<S>> {
        let (id, completion) = match self.register(requested, deadline) {
            Registration::Answered(outcome) => return Ok(outcome),
            Registration::Parked(id, completion) => (id, completion),
        };

        let guard = CancelGuard {
            notifier: self,
            id,
            armed: true,
        };
        let resolved = completion.wait_until_async(deadline).await;
        guard.disarm();

        match resolved {
            Some(outcome) => Ok(outcome),
            None => self.expire(id, &completion),
        }
    }

    /// Check the requested version against the current one and park it if it is current.
    fn register(&self, requested: TopologyVersion, deadline: Instant) -> Registration<S> {
        let mut registry = self.registry.lock();
        if registry.is_shutting_down() {
            return Registration::Answered(WaitOutcome::ShuttingDown);
        }

        let current = self.state.current();
        match current.version().relate(&requested) {
            VersionRelation::Current => {}
            VersionRelation::Ahead => {
                drop(registry);
                warn!(
                    %requested,
                    current = %current.version(),
                    "request carries a counter this process never produced"
                );
                return Registration::Answered(WaitOutcome::Stale(current));
            }
            VersionRelation::Behind | VersionRelation::OtherProcess => {
                return Registration::Answered(WaitOutcome::Stale(current));
            }
        }

        let (id, completion) = registry.register(requested, deadline);
        drop(registry);

        self.metrics.increment_waiters_registered();
        debug!(event = %Event::WaiterRegistered, waiter = %id, %requested, "waiting for topology change");
        Registration::Parked(id, completion)
    }

    /// Deadline passed. Either the waiter is still registered and times out, or a
    /// publish or shutdown drained it first and that resolution wins.
    fn expire(&self, id: WaiterId, completion: &Completion<S>) -> TopologyResult<WaitOutcome<S>> {
        let mut registry = self.registry.lock();
        if registry.deregister(id).is_some() {
            let current = self.state.current();
            drop(registry);

            self.metrics.increment_waiters_timed_out();
            debug!(event = %Event::WaiterTimedOut, waiter = %id, version = %current.version(), "wait timed out");
            return Ok(WaitOutcome::TimedOut(current));
        }
        drop(registry);

        match completion.outcome() {
            Some(outcome) => Ok(outcome),
            None => {
                let err = TopologyError::from(InternalError::OrphanedWaiter(id.as_u64()));
                self.report_internal(&err);
                Err(err)
            }
        }
    }

    /// Remove a waiter whose caller went away. No-op if it was already drained.
    fn cancel(&self, id: WaiterId) {
        if self.registry.lock().deregister(id).is_some() {
            self.metrics.increment_waiters_cancelled();
            debug!(event = %Event::WaiterCancelled, waiter = %id, "wait abandoned");
        }
    }

    /// Release every waiter with [`WaitOutcome::ShuttingDown`] and refuse further work.
    ///
    /// Returns the number of waiters released. Calling it again is a no-op.
    pub fn shutdown(&self) -> usize {
        let mut registry = self.registry.lock();
        if registry.is_shutting_down() {
            return 0;
        }
        registry.begin_shutdown();

        let mut released = 0usize;
        for waiter in registry.drain() {
            if waiter.resolve(WaitOutcome::ShuttingDown) {
                released += 1;
            }
        }
        drop(registry);

        self.metrics.add_waiters_shutdown(released as u64);
        info!(event = %Event::ShutdownStart, released, "topology notifier shut down");
        released
    }

    /// Log and count an invariant violation.
    pub(crate) fn report_internal(&self, err: &TopologyError) {
        self.metrics.increment_internal_errors();
        error!(event = %Event::InvariantViolation, error = %err, "topology invariant violated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::document::Document;
    use std::thread;
    use std::time::Duration;

    fn notifier() -> Arc<Notifier<Document>> {
        Arc::new(Notifier::new(Document::new().with("n", 0i32)))
    }

    fn in_ms(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_publish_increments_counter() {
        let notifier = notifier();
        let before = notifier.version();
        let after = notifier.publish(Document::new().with("n", 1i32)).unwrap();

        assert_eq!(after.process_id(), before.process_id());
        assert_eq!(after.counter(), before.counter() + 1);
        assert_eq!(notifier.metrics().snapshot().publishes, 1);
    }

    #[test]
    fn test_stale_version_returns_immediately() {
        let notifier = notifier();
        let old = notifier.version();
        notifier.publish(Document::new()).unwrap();

        let start = Instant::now();
        let outcome = notifier.register_and_wait(old, in_ms(5_000)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome.label(), "stale");
        assert_eq!(outcome.snapshot().unwrap().version().counter(), 1);
        assert_eq!(notifier.pending_waiters(), 0);
    }

    #[test]
    fn test_other_process_is_stale() {
        let notifier = notifier();
        let foreign = TopologyVersion::new(ProcessId::from_bytes([0xee; 12]), 0);

        let outcome = notifier.register_and_wait(foreign, in_ms(5_000)).unwrap();
        assert_eq!(outcome.label(), "stale");
    }

    #[test]
    fn test_ahead_counter_is_stale() {
        let notifier = notifier();
        let ahead = TopologyVersion::new(notifier.process_id(), 42);

        let outcome = notifier.register_and_wait(ahead, in_ms(5_000)).unwrap();
        assert_eq!(outcome.label(), "stale");
        assert_eq!(outcome.snapshot().unwrap().version().counter(), 0);
    }

    #[test]
    fn test_timeout_returns_unchanged_snapshot() {
        let notifier = notifier();
        let current = notifier.version();

        let start = Instant::now();
        let outcome = notifier.register_and_wait(current, in_ms(50)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(outcome.label(), "timed_out");
        assert_eq!(outcome.snapshot().unwrap().version(), current);
        assert_eq!(notifier.pending_waiters(), 0);
        assert_eq!(notifier.metrics().snapshot().waiters_timed_out, 1);
    }

    #[test]
    fn test_publish_wakes_waiter() {
        let notifier = notifier();
        let current = notifier.version();

        let waiting = Arc::clone(&notifier);
        let handle = thread::spawn(move || waiting.register_and_wait(current, in_ms(10_000)));

        while notifier.pending_waiters() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        notifier.publish(Document::new().with("n", 1i32)).unwrap();

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.label(), "changed");
        assert_eq!(outcome.snapshot().unwrap().version().counter(), 1);
        assert_eq!(notifier.metrics().snapshot().waiters_changed, 1);
    }

    #[test]
    fn test_shutdown_releases_waiters() {
        let notifier = notifier();
        let current = notifier.version();

        let waiting = Arc::clone(&notifier);
        let handle = thread::spawn(move || waiting.register_and_wait(current, in_ms(10_000)));

        while notifier.pending_waiters() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(notifier.shutdown(), 1);
        assert_eq!(notifier.shutdown(), 0);

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.label(), "shutting_down");
    }

    #[test]
    fn test_after_shutdown() {
        let notifier = notifier();
        notifier.shutdown();

        let outcome = notifier
            .register_and_wait(notifier.version(), in_ms(10_000))
            .unwrap();
        assert_eq!(outcome.label(), "shutting_down");
        assert_eq!(
            notifier.publish(Document::new()),
            Err(TopologyError::ShutdownInProgress)
        );
        assert!(notifier.is_shutting_down());
    }

    #[tokio::test]
    async fn test_async_wait_wakes_on_publish() {
        let notifier = notifier();
        let current = notifier.version();

        let waiting = Arc::clone(&notifier);
        let pending =
            tokio::spawn(async move { waiting.register_and_wait_async(current, in_ms(10_000)).await });

        while notifier.pending_waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        notifier.publish(Document::new().with("n", 1i32)).unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome.label(), "changed");
        assert_eq!(outcome.snapshot().unwrap().version().counter(), 1);
    }

    #[tokio::test]
    async fn test_async_wait_times_out() {
        let notifier = notifier();
        let current = notifier.version();

        let start = Instant::now();
        let outcome = notifier
            .register_and_wait_async(current, in_ms(50))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(outcome.label(), "timed_out");
        assert_eq!(notifier.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_dropped_async_wait_deregisters() {
        let notifier = notifier();
        let current = notifier.version();

        let waiting = Arc::clone(&notifier);
        let pending =
            tokio::spawn(async move { waiting.register_and_wait_async(current, in_ms(60_000)).await });

        while notifier.pending_waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        assert_eq!(notifier.pending_waiters(), 0);
        assert_eq!(notifier.metrics().snapshot().waiters_cancelled, 1);
    }
}
