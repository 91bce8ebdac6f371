//! Topology Snapshots
//!
//! An immutable capture of topology state plus the version it was published at.
//! Snapshots are shared behind `Arc` and never edited; a publish builds a new one.

use chrono::{DateTime, Utc};

use super::document::{Document, Value};
use super::errors::{InternalError, TopologyResult};
use super::validator::{COUNTER_FIELD, PROCESS_ID_FIELD, TOPOLOGY_VERSION_FIELD};
use super::version::TopologyVersion;

/// State carried by a snapshot.
///
/// The service never looks inside; it only needs to render the state's fields into a response.
pub trait TopologyDescription: Send + Sync + 'static {
    /// Response fields describing this state.
    fn to_document(&self) -> Document;
}

impl TopologyDescription for Document {
    fn to_document(&self) -> Document {
        self.clone()
    }
}

/// A published topology.
#[derive(Debug)]
pub struct TopologySnapshot<S> {
    version: TopologyVersion,
    state: S,
    published_at: DateTime<Utc>,
}

impl<S> TopologySnapshot<S> {
    pub(crate) fn new(version: TopologyVersion, state: S) -> Self {
        Self {
            version,
            state,
            published_at: Utc::now(),
        }
    }

    /// Version this snapshot was published at.
    pub fn version(&self) -> TopologyVersion {
        self.version
    }

    /// The topology state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Wall-clock publish time.
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

impl<S: TopologyDescription> TopologySnapshot<S> {
    /// Response document: the state's fields followed by `topologyVersion`.
    pub fn to_document(&self) -> TopologyResult<Document> {
        let mut doc = self.state.to_document();
        doc.insert(TOPOLOGY_VERSION_FIELD, version_document(&self.version)?);
        Ok(doc)
    }
}

/// `{processId, counter}` as a document.
///
/// Fails with `CounterOverflow` if the counter does not fit a signed 64-bit integer.
pub fn version_document(version: &TopologyVersion) -> TopologyResult<Value> {
    let counter = i64::try_from(version.counter())
        .map_err(|_| InternalError::CounterOverflow(version.counter()))?;
    Ok(Value::Document(
        Document::new()
            .with(PROCESS_ID_FIELD, version.process_id())
            .with(COUNTER_FIELD, counter),
    ))
}
