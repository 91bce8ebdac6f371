//! Replica Set Description
//!
//! The topology state topowatch serves out of the box: this node's view of its
//! replica set, rendered as the fields of a hello response.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::{Document, Value};
use super::snapshot::TopologyDescription;

/// Role of this node within its set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Primary,
    Secondary,
    Arbiter,
    /// Not part of a replica set
    #[default]
    Standalone,
    /// Member in any other state (startup, recovering, rollback)
    Other,
}

impl MemberRole {
    /// Whether this node accepts writes.
    pub fn is_writable(&self) -> bool {
        matches!(self, MemberRole::Primary | MemberRole::Standalone)
    }

    /// Whether the role only makes sense inside a replica set.
    pub fn is_member(&self) -> bool {
        !matches!(self, MemberRole::Standalone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Primary => "primary",
            MemberRole::Secondary => "secondary",
            MemberRole::Arbiter => "arbiter",
            MemberRole::Standalone => "standalone",
            MemberRole::Other => "other",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inconsistent replica set description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    #[error("'me' must name this node")]
    EmptyMe,

    #[error("role {0} requires a setName")]
    MissingSetName(MemberRole),

    #[error("a standalone node cannot carry setName '{0}'")]
    StandaloneWithSetName(String),

    #[error("primary '{0}' is not listed in hosts")]
    PrimaryNotInHosts(String),

    #[error("node is primary but primary is {found:?}, expected '{me}'")]
    PrimaryMismatch { me: String, found: Option<String> },
}

/// This node's view of its replica set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetDescription {
    /// Replica set name; absent for a standalone node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,

    /// Replica set configuration version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_version: Option<i32>,

    /// Data-bearing members, as `host:port`
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Current primary, if one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    /// This node, as `host:port`
    pub me: String,

    #[serde(default)]
    pub role: MemberRole,
}

impl ReplicaSetDescription {
    /// A node outside any replica set.
    pub fn standalone(me: impl Into<String>) -> Self {
        Self {
            set_name: None,
            set_version: None,
            hosts: Vec::new(),
            primary: None,
            me: me.into(),
            role: MemberRole::Standalone,
        }
    }

    /// A member of `set_name` with `role`.
    pub fn member(set_name: impl Into<String>, me: impl Into<String>, role: MemberRole) -> Self {
        Self {
            set_name: Some(set_name.into()),
            set_version: Some(1),
            role,
            ..Self::standalone(me)
        }
    }

    pub fn with_hosts<I, H>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary(mut self, primary: impl Into<String>) -> Self {
        self.primary = Some(primary.into());
        self
    }

    pub fn with_set_version(mut self, set_version: i32) -> Self {
        self.set_version = Some(set_version);
        self
    }

    /// Check the description is internally consistent.
    pub fn validate(&self) -> Result<(), DescriptionError> {
        if self.me.trim().is_empty() {
            return Err(DescriptionError::EmptyMe);
        }

        match (&self.set_name, self.role.is_member()) {
            (None, true) => return Err(DescriptionError::MissingSetName(self.role)),
            (Some(name), false) => {
                return Err(DescriptionError::StandaloneWithSetName(name.clone()))
            }
            _ => {}
        }

        if let Some(primary) = &self.primary {
            if !self.hosts.iter().any(|h| h == primary) {
                return Err(DescriptionError::PrimaryNotInHosts(primary.clone()));
            }
        }

        if self.role == MemberRole::Primary && self.primary.as_deref() != Some(self.me.as_str()) {
            return Err(DescriptionError::PrimaryMismatch {
                me: self.me.clone(),
                found: self.primary.clone(),
            });
        }

        Ok(())
    }
}

impl TopologyDescription for ReplicaSetDescription {
    fn to_document(&self) -> Document {
        let writable = self.role.is_writable();
        let mut doc = Document::new()
            .with("isWritablePrimary", writable)
            .with("ismaster", writable)
            .with("secondary", self.role == MemberRole::Secondary);

        if self.role == MemberRole::Arbiter {
            doc.insert("arbiterOnly", true);
        }

        if let Some(set_name) = &self.set_name {
            doc.insert("setName", set_name.as_str());
            if let Some(set_version) = self.set_version {
                doc.insert("setVersion", set_version);
            }
            let hosts = self.hosts.iter().map(|h| Value::from(h.as_str())).collect();
            doc.insert("hosts", Value::Array(hosts));
            if let Some(primary) = &self.primary {
                doc.insert("primary", primary.as_str());
            }
        }

        doc.insert("me", self.me.as_str());
        doc
    }
}

impl Default for ReplicaSetDescription {
    fn default() -> Self {
        Self::standalone("localhost:54321")
    }
}
