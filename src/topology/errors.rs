//! Topology Error Types
//!
//! Three families of failure reach callers of the topology service:
//! - Validation errors: terminal, side-effect free, raised before any waiter is registered
//! - Shutdown: the explicit outcome for requests that arrive or wait during teardown
//! - Internal errors: invariant violations that must never be swallowed
//!
//! A timed-out wait is not an error and never appears here.

use std::fmt;

use thiserror::Error;

/// Validation error kinds, in the vocabulary the dispatch layer maps to wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong type for `topologyVersion`, one of its fields, or `maxAwaitTimeMS`
    TypeMismatch,

    /// `topologyVersion` lacks `processId` or `counter`
    MissingField,

    /// `topologyVersion` carries a field it does not define
    UnknownField,

    /// `topologyVersion` repeats one of its fields
    DuplicateField,

    /// `counter` is below zero
    NegativeCounter,

    /// `maxAwaitTimeMS` is below zero
    NegativeTimeout,

    /// Exactly one of `topologyVersion` / `maxAwaitTimeMS` was supplied
    PairingViolation,
}

impl ErrorKind {
    /// Numeric code reported on the wire.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::TypeMismatch => 14,
            ErrorKind::MissingField => 40414,
            ErrorKind::UnknownField => 40415,
            ErrorKind::DuplicateField => 40413,
            ErrorKind::NegativeCounter => 31372,
            ErrorKind::NegativeTimeout => 31373,
            ErrorKind::PairingViolation => 31368,
        }
    }

    /// Stable name reported next to the numeric code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::MissingField => "MissingField",
            ErrorKind::UnknownField => "UnknownField",
            ErrorKind::DuplicateField => "DuplicateField",
            ErrorKind::NegativeCounter => "NegativeCounter",
            ErrorKind::NegativeTimeout => "NegativeTimeout",
            ErrorKind::PairingViolation => "PairingViolation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    /// Error kind
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
    code_override: Option<i32>,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code_override: None,
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    /// Type mismatch raised because `topologyVersion` itself is not an object.
    ///
    /// Reported under its own wire code so clients can tell it apart from a bad inner field.
    pub fn not_an_object(message: impl Into<String>) -> Self {
        Self {
            code_override: Some(10065),
            ..Self::type_mismatch(message)
        }
    }

    /// Create a missing field error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorKind::MissingField,
            format!("topologyVersion is missing required field '{}'", field),
        )
    }

    /// Create an unknown field error.
    pub fn unknown_field(field: &str) -> Self {
        Self::new(
            ErrorKind::UnknownField,
            format!("topologyVersion has unknown field '{}'", field),
        )
    }

    /// Create a duplicate field error.
    pub fn duplicate_field(field: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateField,
            format!("topologyVersion has duplicate field '{}'", field),
        )
    }

    /// Create a negative counter error.
    pub fn negative_counter(counter: i64) -> Self {
        Self::new(
            ErrorKind::NegativeCounter,
            format!("topologyVersion counter cannot be negative, got {}", counter),
        )
    }

    /// Create a negative timeout error.
    pub fn negative_timeout(max_await_time_ms: i64) -> Self {
        Self::new(
            ErrorKind::NegativeTimeout,
            format!("maxAwaitTimeMS must be >= 0, got {}", max_await_time_ms),
        )
    }

    /// Create a pairing violation error.
    pub fn pairing_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PairingViolation, message)
    }

    /// Numeric code reported on the wire.
    pub fn code(&self) -> i32 {
        self.code_override.unwrap_or_else(|| self.kind.code())
    }
}

/// Invariant violations detected inside the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// Publishing would wrap the version counter
    #[error("topology version counter overflow at {0}")]
    CounterOverflow(u64),

    /// A snapshot carries a processId other than the state's own
    #[error("snapshot processId {found} does not match process {expected}")]
    ProcessIdMismatch { expected: String, found: String },

    /// A timed-out waiter was neither registered nor resolved
    #[error("waiter {0} was neither registered nor resolved")]
    OrphanedWaiter(u64),
}

/// Errors surfaced by the topology service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// The request was rejected before any wait
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service is shutting down
    #[error("topology service is shutting down")]
    ShutdownInProgress,

    /// An invariant was violated
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl TopologyError {
    /// Numeric code reported on the wire.
    pub fn code(&self) -> i32 {
        match self {
            TopologyError::Validation(e) => e.code(),
            TopologyError::ShutdownInProgress => 91,
            TopologyError::Internal(_) => 1,
        }
    }

    /// Stable code name reported on the wire.
    pub fn code_name(&self) -> &'static str {
        match self {
            TopologyError::Validation(e) => e.kind.as_str(),
            TopologyError::ShutdownInProgress => "ShutdownInProgress",
            TopologyError::Internal(_) => "InternalError",
        }
    }

    /// Validation kind, if this is a validation failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TopologyError::Validation(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Internal errors indicate a bug, not a bad request.
    pub fn is_internal(&self) -> bool {
        matches!(self, TopologyError::Internal(_))
    }
}

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;
