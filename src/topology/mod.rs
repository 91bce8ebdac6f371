//! Awaitable topology notification
//!
//! Clients poll with the `topologyVersion` they last saw plus a wait budget
//! (`maxAwaitTimeMS`). The request is answered as soon as the topology moves past
//! that version, or with the unchanged topology once the budget runs out.
//!
//! # Components
//!
//! - [`VersionValidator`]: ordered, side-effect free request checks
//! - [`TopologyState`]: the current snapshot, swapped atomically on publish
//! - [`Notifier`]: publish, register-and-wait, shutdown
//! - [`RequestHandler`]: validation plus dispatch to the notifier
//!
//! # Versions
//!
//! A version is `(processId, counter)`. The processId is fresh on every start
//! and the counter starts at 0. Versions from another process are never
//! compared; they are always out of date.

mod description;
mod document;
mod errors;
mod handler;
mod notifier;
mod process_id;
mod registry;
mod response;
mod snapshot;
mod state;
mod validator;
mod version;
mod waiter;

pub use description::{DescriptionError, MemberRole, ReplicaSetDescription};
pub use document::{Document, DocumentError, Value};
pub use errors::{ErrorKind, InternalError, TopologyError, TopologyResult, ValidationError};
pub use handler::{RequestHandler, MAX_AWAIT_HORIZON};
pub use notifier::Notifier;
pub use process_id::{ProcessId, ProcessIdError, PROCESS_ID_LEN};
pub use response::{HelloResponse, ResponseKind, OK_FIELD};
pub use snapshot::{version_document, TopologyDescription, TopologySnapshot};
pub use state::TopologyState;
pub use validator::{
    AwaitRequest, RequestFields, VersionValidator, COUNTER_FIELD, MAX_AWAIT_TIME_MS_FIELD,
    PROCESS_ID_FIELD, TOPOLOGY_VERSION_FIELD,
};
pub use version::{TopologyVersion, VersionRelation, MAX_COUNTER};
pub use waiter::{WaitOutcome, WaiterId};
