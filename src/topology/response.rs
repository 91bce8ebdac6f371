//! Hello responses

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::document::Document;
use super::errors::TopologyResult;
use super::snapshot::{TopologyDescription, TopologySnapshot};

/// Response field signalling success
pub const OK_FIELD: &str = "ok";

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Without waiting: no version supplied, or the supplied one was out of date
    Immediate,
    /// After a publish moved the topology past the requested version
    Changed,
    /// After the wait budget ran out with no change
    TimedOut,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Immediate => "immediate",
            ResponseKind::Changed => "changed",
            ResponseKind::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful answer to a hello request.
pub struct HelloResponse<S> {
    /// Snapshot the request is answered with
    pub snapshot: Arc<TopologySnapshot<S>>,
    /// How the request was answered
    pub kind: ResponseKind,
    /// Time spent parked
    pub waited: Duration,
}

impl<S> HelloResponse<S> {
    pub fn new(snapshot: Arc<TopologySnapshot<S>>, kind: ResponseKind, waited: Duration) -> Self {
        Self {
            snapshot,
            kind,
            waited,
        }
    }
}

impl<S: TopologyDescription> HelloResponse<S> {
    /// Snapshot fields, `topologyVersion`, then `ok: 1`.
    pub fn to_document(&self) -> TopologyResult<Document> {
        Ok(self.snapshot.to_document()?.with(OK_FIELD, 1.0))
    }
}

impl<S> fmt::Debug for HelloResponse<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelloResponse")
            .field("version", &self.snapshot.version())
            .field("kind", &self.kind)
            .field("waited", &self.waited)
            .finish()
    }
}
