//! Topology Version
//!
//! A `(processId, counter)` pair identifying a point-in-time topology snapshot.
//!
//! - `processId` is fixed for a process lifetime
//! - `counter` starts at 0 and only moves forward
//! - Versions from different processes are incomparable; the older one is stale

use std::cmp::Ordering;
use std::fmt;

use super::errors::{InternalError, TopologyResult};
use super::process_id::ProcessId;

/// Largest counter a version may carry; the wire encodes it as a signed 64-bit integer.
pub const MAX_COUNTER: u64 = i64::MAX as u64;

/// How a client-supplied version relates to the server's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    /// Same process, same counter: nothing has changed yet
    Current,
    /// Same process, older counter: the client missed a change
    Behind,
    /// Same process, newer counter: the client claims a version never produced
    Ahead,
    /// Different process: incomparable, treated as stale
    OtherProcess,
}

impl VersionRelation {
    /// Whether a waiter holding this version must be answered right away.
    pub fn is_stale(&self) -> bool {
        !matches!(self, VersionRelation::Current)
    }
}

/// A topology version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopologyVersion {
    process_id: ProcessId,
    counter: u64,
}

impl TopologyVersion {
    /// Create a version.
    pub const fn new(process_id: ProcessId, counter: u64) -> Self {
        Self {
            process_id,
            counter,
        }
    }

    /// The first version of a process lifetime.
    pub const fn initial(process_id: ProcessId) -> Self {
        Self::new(process_id, 0)
    }

    /// Process identifier.
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Counter within the process.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The version assigned by the next publish.
    ///
    /// Counters stop at [`MAX_COUNTER`] so every version stays encodable on the wire.
    pub fn next(&self) -> TopologyResult<Self> {
        let counter = self
            .counter
            .checked_add(1)
            .filter(|next| *next <= MAX_COUNTER)
            .ok_or(InternalError::CounterOverflow(self.counter))?;
        Ok(Self::new(self.process_id, counter))
    }

    /// Relate a client-supplied version to this (current) version.
    pub fn relate(&self, requested: &TopologyVersion) -> VersionRelation {
        if requested.process_id != self.process_id {
            return VersionRelation::OtherProcess;
        }
        match requested.counter.cmp(&self.counter) {
            Ordering::Equal => VersionRelation::Current,
            Ordering::Less => VersionRelation::Behind,
            Ordering::Greater => VersionRelation::Ahead,
        }
    }
}

/// Only versions of the same process are ordered.
impl PartialOrd for TopologyVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.process_id != other.process_id {
            return None;
        }
        Some(self.counter.cmp(&other.counter))
    }
}

impl fmt::Display for TopologyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process_id, self.counter)
    }
}
