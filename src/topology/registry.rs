//! Waiter Registry
//!
//! Outstanding long-poll requests. The registry itself is not synchronised: it lives
//! inside the notifier's lock, next to the snapshot swap, so that registering and
//! publishing can never interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::version::TopologyVersion;
use super::waiter::{Completion, Waiter, WaiterId};

/// Registered waiters plus the shutdown flag.
pub(crate) struct WaiterRegistry<S> {
    waiters: HashMap<WaiterId, Waiter<S>>,
    next_id: u64,
    shutting_down: bool,
}

impl<S> WaiterRegistry<S> {
    /// Create an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            next_id: 0,
            shutting_down: false,
        }
    }

    /// Register a waiter and hand back its completion handle.
    pub(crate) fn register(
        &mut self,
        requested: TopologyVersion,
        deadline: Instant,
    ) -> (WaiterId, Arc<Completion<S>>) {
        let id = WaiterId(self.next_id);
        self.next_id += 1;

        let waiter = Waiter::new(id, requested, deadline);
        let completion = waiter.completion();
        self.waiters.insert(id, waiter);
        (id, completion)
    }

    /// Remove a waiter. `None` if it was already drained.
    pub(crate) fn deregister(&mut self, id: WaiterId) -> Option<Waiter<S>> {
        self.waiters.remove(&id)
    }

    /// Remove every waiter.
    pub(crate) fn drain(&mut self) -> Vec<Waiter<S>> {
        self.waiters.drain().map(|(_, waiter)| waiter).collect()
    }

    /// Number of registered waiters.
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Refuse new registrations from now on.
    pub(crate) fn begin_shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// Whether shutdown has begun.
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}
