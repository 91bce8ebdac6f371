//! Topology State
//!
//! The single source of truth for the current snapshot.
//!
//! - Reads are lock-free: the current snapshot sits behind an atomically swapped `Arc`
//! - Writes replace the snapshot, never edit it
//! - Writes happen only through the notifier, under its exclusive lock
//!
//! A process restart is a new `TopologyState`: fresh processId, counter back at 0.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::errors::{InternalError, TopologyResult};
use super::process_id::ProcessId;
use super::snapshot::TopologySnapshot;
use super::version::TopologyVersion;

/// Current topology snapshot plus the identity of this process lifetime.
pub struct TopologyState<S> {
    process_id: ProcessId,
    current: ArcSwap<TopologySnapshot<S>>,
}

impl<S> TopologyState<S> {
    /// Start a new process lifetime with `initial` at counter 0.
    pub fn new(initial: S) -> Self {
        Self::with_process_id(ProcessId::generate(), initial)
    }

    /// Start a process lifetime with a known identifier.
    pub fn with_process_id(process_id: ProcessId, initial: S) -> Self {
        let snapshot = TopologySnapshot::new(TopologyVersion::initial(process_id), initial);
        Self {
            process_id,
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Identifier of this process lifetime.
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<TopologySnapshot<S>> {
        self.current.load_full()
    }

    /// Latest published version.
    pub fn version(&self) -> TopologyVersion {
        self.current.load().version()
    }

    /// Install `new_state` at the next version.
    ///
    /// Callers must hold the notifier's exclusive lock so that the swap and the
    /// waiter registry change together.
    pub(crate) fn advance(&self, new_state: S) -> TopologyResult<Arc<TopologySnapshot<S>>> {
        let previous = self.current.load();
        let found = previous.version().process_id();
        if found != self.process_id {
            return Err(InternalError::ProcessIdMismatch {
                expected: self.process_id.to_hex(),
                found: found.to_hex(),
            }
            .into());
        }

        let next = previous.version().next()?;
        let snapshot = Arc::new(TopologySnapshot::new(next, new_state));
        self.current.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}
