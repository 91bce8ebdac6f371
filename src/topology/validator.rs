//! Request Validation
//!
//! Checks the `topologyVersion` / `maxAwaitTimeMS` pair of an awaitable request.
//!
//! Validation is:
//! - Deterministic and side-effect free
//! - An explicit ordered rule table: the first failing rule decides the error
//!
//! Rule order:
//! 1. Pairing: both fields or neither
//! 2. Shape: `topologyVersion` is an object holding exactly `processId` and `counter`
//! 3. `processId` is an ObjectId
//! 4. `counter` is a non-negative 64-bit integer
//! 5. `maxAwaitTimeMS` is a non-negative integer

use std::time::Duration;

use super::document::{Document, Value};
use super::errors::ValidationError;
use super::process_id::ProcessId;
use super::version::TopologyVersion;

/// Request field holding the client's last seen version
pub const TOPOLOGY_VERSION_FIELD: &str = "topologyVersion";
/// Request field holding the wait budget in milliseconds
pub const MAX_AWAIT_TIME_MS_FIELD: &str = "maxAwaitTimeMS";
/// `topologyVersion` field holding the process identifier
pub const PROCESS_ID_FIELD: &str = "processId";
/// `topologyVersion` field holding the counter
pub const COUNTER_FIELD: &str = "counter";

const TOPOLOGY_VERSION_FIELDS: [&str; 2] = [PROCESS_ID_FIELD, COUNTER_FIELD];

/// A validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitRequest {
    /// No version supplied: answer with the current snapshot
    Immediate,
    /// Wait up to `max_await` for the topology to move past `version`
    Await {
        version: TopologyVersion,
        max_await: Duration,
    },
}

/// The two raw request fields under validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFields<'a> {
    pub topology_version: Option<&'a Value>,
    pub max_await_time_ms: Option<&'a Value>,
}

impl<'a> RequestFields<'a> {
    /// Pick the fields out of a command document. Other fields are ignored.
    pub fn from_document(request: &'a Document) -> Self {
        Self {
            topology_version: request.get(TOPOLOGY_VERSION_FIELD),
            max_await_time_ms: request.get(MAX_AWAIT_TIME_MS_FIELD),
        }
    }
}

/// Values extracted while the rules run.
#[derive(Debug, Default)]
struct Normalized {
    process_id: Option<ProcessId>,
    counter: Option<u64>,
    max_await: Option<Duration>,
}

type Rule = fn(&RequestFields<'_>, &mut Normalized) -> Result<(), ValidationError>;

/// Ordered rule table. Earlier rules take precedence.
const RULES: [(&str, Rule); 5] = [
    ("pairing", check_pairing),
    ("topology_version_shape", check_shape),
    ("process_id", check_process_id),
    ("counter", check_counter),
    ("max_await_time", check_max_await_time),
];

/// Stateless validator for awaitable requests.
pub struct VersionValidator;

impl VersionValidator {
    /// Validate the awaitable fields of a command document.
    pub fn validate(request: &Document) -> Result<AwaitRequest, ValidationError> {
        Self::validate_fields(RequestFields::from_document(request))
    }

    /// Validate the two raw fields.
    pub fn validate_fields(fields: RequestFields<'_>) -> Result<AwaitRequest, ValidationError> {
        let mut normalized = Normalized::default();
        for (_name, rule) in RULES.iter() {
            rule(&fields, &mut normalized)?;
        }

        match (normalized.process_id, normalized.counter, normalized.max_await) {
            (Some(process_id), Some(counter), Some(max_await)) => Ok(AwaitRequest::Await {
                version: TopologyVersion::new(process_id, counter),
                max_await,
            }),
            _ => Ok(AwaitRequest::Immediate),
        }
    }

    /// Names of the rules in evaluation order.
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|(name, _)| *name)
    }
}

fn check_pairing(fields: &RequestFields<'_>, _: &mut Normalized) -> Result<(), ValidationError> {
    match (fields.topology_version, fields.max_await_time_ms) {
        (Some(_), None) => Err(ValidationError::pairing_violation(format!(
            "A request with a '{}' must include '{}'",
            TOPOLOGY_VERSION_FIELD, MAX_AWAIT_TIME_MS_FIELD
        ))),
        (None, Some(_)) => Err(ValidationError::pairing_violation(format!(
            "A request with '{}' must include a '{}'",
            MAX_AWAIT_TIME_MS_FIELD, TOPOLOGY_VERSION_FIELD
        ))),
        _ => Ok(()),
    }
}

fn topology_version_document<'a>(fields: &RequestFields<'a>) -> Option<&'a Document> {
    match fields.topology_version {
        Some(Value::Document(doc)) => Some(doc),
        _ => None,
    }
}

fn check_shape(fields: &RequestFields<'_>, _: &mut Normalized) -> Result<(), ValidationError> {
    let Some(value) = fields.topology_version else {
        return Ok(());
    };
    let Value::Document(doc) = value else {
        return Err(ValidationError::not_an_object(format!(
            "'{}' must be an object, got {}",
            TOPOLOGY_VERSION_FIELD,
            value.type_name()
        )));
    };

    let mut seen: Vec<&str> = Vec::with_capacity(TOPOLOGY_VERSION_FIELDS.len());
    for key in doc.keys() {
        if !TOPOLOGY_VERSION_FIELDS.contains(&key) {
            return Err(ValidationError::unknown_field(key));
        }
        if seen.contains(&key) {
            return Err(ValidationError::duplicate_field(key));
        }
        seen.push(key);
    }

    for required in TOPOLOGY_VERSION_FIELDS {
        if !seen.contains(&required) {
            return Err(ValidationError::missing_field(required));
        }
    }
    Ok(())
}

fn check_process_id(
    fields: &RequestFields<'_>,
    normalized: &mut Normalized,
) -> Result<(), ValidationError> {
    let Some(doc) = topology_version_document(fields) else {
        return Ok(());
    };
    match doc.get(PROCESS_ID_FIELD) {
        Some(Value::ObjectId(id)) => {
            normalized.process_id = Some(*id);
            Ok(())
        }
        Some(other) => Err(ValidationError::type_mismatch(format!(
            "'{}.{}' must be an objectId, got {}",
            TOPOLOGY_VERSION_FIELD,
            PROCESS_ID_FIELD,
            other.type_name()
        ))),
        None => Err(ValidationError::missing_field(PROCESS_ID_FIELD)),
    }
}

fn check_counter(
    fields: &RequestFields<'_>,
    normalized: &mut Normalized,
) -> Result<(), ValidationError> {
    let Some(doc) = topology_version_document(fields) else {
        return Ok(());
    };
    match doc.get(COUNTER_FIELD) {
        Some(Value::Int64(counter)) if *counter < 0 => {
            Err(ValidationError::negative_counter(*counter))
        }
        Some(Value::Int64(counter)) => {
            normalized.counter = Some(*counter as u64);
            Ok(())
        }
        Some(other) => Err(ValidationError::type_mismatch(format!(
            "'{}.{}' must be a long, got {}",
            TOPOLOGY_VERSION_FIELD,
            COUNTER_FIELD,
            other.type_name()
        ))),
        None => Err(ValidationError::missing_field(COUNTER_FIELD)),
    }
}

fn check_max_await_time(
    fields: &RequestFields<'_>,
    normalized: &mut Normalized,
) -> Result<(), ValidationError> {
    let Some(value) = fields.max_await_time_ms else {
        return Ok(());
    };
    let millis = match value {
        Value::Int32(ms) => i64::from(*ms),
        Value::Int64(ms) => *ms,
        Value::Double(ms) if ms.is_finite() && ms.fract() == 0.0 => {
            if *ms < i64::MIN as f64 || *ms > i64::MAX as f64 {
                return Err(ValidationError::type_mismatch(format!(
                    "'{}' is out of range: {}",
                    MAX_AWAIT_TIME_MS_FIELD, ms
                )));
            }
            *ms as i64
        }
        other => {
            return Err(ValidationError::type_mismatch(format!(
                "'{}' must be an integer, got {}",
                MAX_AWAIT_TIME_MS_FIELD,
                describe(other)
            )))
        }
    };
    if millis < 0 {
        return Err(ValidationError::negative_timeout(millis));
    }
    normalized.max_await = Some(Duration::from_millis(millis as u64));
    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Double(d) => format!("double {}", d),
        other => other.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::errors::ErrorKind;

    fn version_doc(pid: ProcessId, counter: i64) -> Document {
        Document::new()
            .with(PROCESS_ID_FIELD, pid)
            .with(COUNTER_FIELD, counter)
    }

    fn request(tv: impl Into<Value>, max_await: impl Into<Value>) -> Document {
        Document::new()
            .with("hello", 1i32)
            .with(TOPOLOGY_VERSION_FIELD, tv)
            .with(MAX_AWAIT_TIME_MS_FIELD, max_await)
    }

    fn kind_of(doc: &Document) -> ErrorKind {
        VersionValidator::validate(doc).unwrap_err().kind
    }

    #[test]
    fn test_neither_field_is_immediate() {
        let doc = Document::new().with("hello", 1i32);
        assert_eq!(VersionValidator::validate(&doc), Ok(AwaitRequest::Immediate));
    }

    #[test]
    fn test_valid_pair() {
        let pid = ProcessId::generate();
        let doc = request(version_doc(pid, 3), 2000i32);
        assert_eq!(
            VersionValidator::validate(&doc),
            Ok(AwaitRequest::Await {
                version: TopologyVersion::new(pid, 3),
                max_await: Duration::from_millis(2000),
            })
        );
    }

    #[test]
    fn test_pairing_wins_over_bad_values() {
        let only_version = Document::new().with(TOPOLOGY_VERSION_FIELD, "not-an-object");
        assert_eq!(kind_of(&only_version), ErrorKind::PairingViolation);

        let only_timeout = Document::new().with(MAX_AWAIT_TIME_MS_FIELD, -1i32);
        assert_eq!(kind_of(&only_timeout), ErrorKind::PairingViolation);
    }

    #[test]
    fn test_topology_version_not_an_object() {
        let err = VersionValidator::validate(&request("topology_version_string", 0i32)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.code(), 10065);
    }

    #[test]
    fn test_unknown_field() {
        let tv = version_doc(ProcessId::generate(), 0).with("randomField", "x");
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::UnknownField);
    }

    #[test]
    fn test_unknown_field_beats_missing_field() {
        let tv = Document::new().with(COUNTER_FIELD, 0i64).with("extra", 1i32);
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::UnknownField);
    }

    #[test]
    fn test_duplicate_field() {
        let pid = ProcessId::generate();
        let tv = version_doc(pid, 0).with(COUNTER_FIELD, 1i64);
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::DuplicateField);
    }

    #[test]
    fn test_missing_fields() {
        let no_counter = Document::new().with(PROCESS_ID_FIELD, ProcessId::generate());
        assert_eq!(kind_of(&request(no_counter, 0i32)), ErrorKind::MissingField);

        let no_pid = Document::new().with(COUNTER_FIELD, 0i64);
        assert_eq!(kind_of(&request(no_pid, 0i32)), ErrorKind::MissingField);
    }

    #[test]
    fn test_process_id_must_be_object_id() {
        let tv = Document::new().with(PROCESS_ID_FIELD, "pid1").with(COUNTER_FIELD, 0i64);
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_counter_must_be_long() {
        let pid = ProcessId::generate();
        let int_counter = Document::new().with(PROCESS_ID_FIELD, pid).with(COUNTER_FIELD, 0i32);
        assert_eq!(kind_of(&request(int_counter, 0i32)), ErrorKind::TypeMismatch);

        let double_counter = Document::new().with(PROCESS_ID_FIELD, pid).with(COUNTER_FIELD, 1.0);
        assert_eq!(kind_of(&request(double_counter, 0i32)), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_negative_counter() {
        let tv = version_doc(ProcessId::generate(), -1);
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::NegativeCounter);
    }

    #[test]
    fn test_process_id_checked_before_counter() {
        let tv = Document::new().with(PROCESS_ID_FIELD, "pid1").with(COUNTER_FIELD, -1i64);
        assert_eq!(kind_of(&request(tv, 0i32)), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_counter_checked_before_timeout() {
        let tv = version_doc(ProcessId::generate(), -1);
        assert_eq!(kind_of(&request(tv, -1i32)), ErrorKind::NegativeCounter);
    }

    #[test]
    fn test_negative_timeout() {
        let tv = version_doc(ProcessId::generate(), 0);
        assert_eq!(kind_of(&request(tv.clone(), -1i32)), ErrorKind::NegativeTimeout);
        assert_eq!(kind_of(&request(tv, -1i64)), ErrorKind::NegativeTimeout);
    }

    #[test]
    fn test_timeout_types() {
        let pid = ProcessId::generate();
        assert_eq!(
            kind_of(&request(version_doc(pid, 0), "stringMaxAwaitTimeMS")),
            ErrorKind::TypeMismatch
        );
        assert_eq!(kind_of(&request(version_doc(pid, 0), 1.5)), ErrorKind::TypeMismatch);

        let whole_double = request(version_doc(pid, 0), 250.0);
        assert_eq!(
            VersionValidator::validate(&whole_double),
            Ok(AwaitRequest::Await {
                version: TopologyVersion::new(pid, 0),
                max_await: Duration::from_millis(250),
            })
        );
    }

    #[test]
    fn test_zero_timeout_is_valid() {
        let pid = ProcessId::generate();
        assert!(VersionValidator::validate(&request(version_doc(pid, 0), 0i32)).is_ok());
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<_> = VersionValidator::rule_names().collect();
        assert_eq!(
            names,
            vec![
                "pairing",
                "topology_version_shape",
                "process_id",
                "counter",
                "max_await_time"
            ]
        );
    }
}
