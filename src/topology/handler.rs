//! Request Handler
//!
//! Entry point for awaitable hello requests: validate, then answer immediately
//! or park on the notifier.
//!
//! | topologyVersion | maxAwaitTimeMS | behavior                                   |
//! |-----------------|----------------|--------------------------------------------|
//! | absent          | absent         | current snapshot, no wait                  |
//! | present         | present        | stale: no wait; current: wait up to budget |
//! | present         | absent         | `PairingViolation`                         |
//! | absent          | present        | `PairingViolation`                         |
//! | malformed       | any            | first failing validation rule              |

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::document::{Document, Value};
use super::errors::{TopologyError, TopologyResult};
use super::notifier::Notifier;
use super::response::{HelloResponse, ResponseKind};
use super::snapshot::{TopologyDescription, TopologySnapshot};
use super::validator::{AwaitRequest, RequestFields, VersionValidator};
use super::waiter::WaitOutcome;
use crate::observability::Event;

/// Longest wait honoured by default; larger budgets are clamped so the deadline stays representable.
pub const MAX_AWAIT_HORIZON: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Answers hello requests against a shared notifier.
pub struct RequestHandler<S> {
    notifier: Arc<Notifier<S>>,
    max_await: Duration,
}

impl<S> Clone for RequestHandler<S> {
    fn clone(&self) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            max_await: self.max_await,
        }
    }
}

impl<S: TopologyDescription> RequestHandler<S> {
    pub fn new(notifier: Arc<Notifier<S>>) -> Self {
        Self::with_max_await(notifier, MAX_AWAIT_HORIZON)
    }

    /// Clamp every wait budget to `max_await` (itself capped at [`MAX_AWAIT_HORIZON`]).
    pub fn with_max_await(notifier: Arc<Notifier<S>>, max_await: Duration) -> Self {
        Self {
            notifier,
            max_await: max_await.min(MAX_AWAIT_HORIZON),
        }
    }

    /// The notifier requests are parked on.
    pub fn notifier(&self) -> &Arc<Notifier<S>> {
        &self.notifier
    }

    /// Longest wait this handler grants.
    pub fn max_await(&self) -> Duration {
        self.max_await
    }

    /// Answer from the two raw fields.
    pub fn get(
        &self,
        topology_version: Option<&Value>,
        max_await_time_ms: Option<&Value>,
    ) -> TopologyResult<Arc<TopologySnapshot<S>>> {
        let fields = RequestFields {
            topology_version,
            max_await_time_ms,
        };
        self.validate(fields)
            .and_then(|request| self.await_change(request))
            .map(|response| response.snapshot)
    }

    /// Answer a whole command document, blocking the calling thread while it waits.
    /// Unrelated fields are ignored.
    pub fn handle(&self, request: &Document) -> TopologyResult<HelloResponse<S>> {
        let request = self.validate(RequestFields::from_document(request))?;
        self.await_change(request)
    }

    /// [`handle`](Self::handle) for async callers. Waits park the task, never a
    /// thread; dropping the future abandons the wait.
    pub async fn handle_async(&self, request: &Document) -> TopologyResult<HelloResponse<S>> {
        let request = self.validate(RequestFields::from_document(request))?;
        self.await_change_async(request).await
    }

    /// Answer an already validated request, blocking while it waits.
    pub fn await_change(&self, request: AwaitRequest) -> TopologyResult<HelloResponse<S>> {
        let (version, max_await) = match request {
            AwaitRequest::Immediate => return Ok(self.immediate()),
            AwaitRequest::Await { version, max_await } => (version, max_await),
        };

        let start = Instant::now();
        let outcome = self
            .notifier
            .register_and_wait(version, self.deadline(start, max_await))?;
        self.finish(outcome, start)
    }

    /// Async [`await_change`](Self::await_change).
    pub async fn await_change_async(
        &self,
        request: AwaitRequest,
    ) -> TopologyResult<HelloResponse<S>> {
        let (version, max_await) = match request {
            AwaitRequest::Immediate => return Ok(self.immediate()),
            AwaitRequest::Await { version, max_await } => (version, max_await),
        };

        let start = Instant::now();
        let outcome = self
            .notifier
            .register_and_wait_async(version, self.deadline(start, max_await))
            .await?;
        self.finish(outcome, start)
    }

    fn validate(&self, fields: RequestFields<'_>) -> TopologyResult<AwaitRequest> {
        VersionValidator::validate_fields(fields).map_err(|err| {
            self.notifier.metrics().increment_validation_failures();
            debug!(event = %Event::RequestRejected, code = err.code(), error = %err, "rejected request");
            TopologyError::from(err)
        })
    }

    fn deadline(&self, start: Instant, max_await: Duration) -> Instant {
        start + max_await.min(self.max_await)
    }

    fn immediate(&self) -> HelloResponse<S> {
        self.notifier.metrics().increment_immediate_responses();
        let snapshot = self.notifier.current();
        trace!(event = %Event::RequestAnswered, version = %snapshot.version(), "answered without wait");
        HelloResponse::new(snapshot, ResponseKind::Immediate, Duration::ZERO)
    }

    fn finish(&self, outcome: WaitOutcome<S>, start: Instant) -> TopologyResult<HelloResponse<S>> {
        let waited = start.elapsed();
        let (snapshot, kind) = match outcome {
            WaitOutcome::Stale(snapshot) => {
                self.notifier.metrics().increment_immediate_responses();
                (snapshot, ResponseKind::Immediate)
            }
            WaitOutcome::Changed(snapshot) => (snapshot, ResponseKind::Changed),
            WaitOutcome::TimedOut(snapshot) => (snapshot, ResponseKind::TimedOut),
            WaitOutcome::ShuttingDown => return Err(TopologyError::ShutdownInProgress),
        };

        trace!(
            event = %Event::RequestAnswered,
            %kind,
            version = %snapshot.version(),
            waited_ms = waited.as_millis() as u64,
            "answered"
        );
        Ok(HelloResponse::new(snapshot, kind, waited))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::errors::ErrorKind;
    use crate::topology::snapshot::version_document;
    use crate::topology::validator::{MAX_AWAIT_TIME_MS_FIELD, TOPOLOGY_VERSION_FIELD};
    use crate::topology::version::TopologyVersion;

    fn handler() -> RequestHandler<Document> {
        RequestHandler::new(Arc::new(Notifier::new(Document::new().with("ismaster", true))))
    }

    #[test]
    fn test_no_fields_answers_immediately() {
        let handler = handler();
        let response = handler.handle(&Document::new().with("hello", 1i32)).unwrap();

        assert_eq!(response.kind, ResponseKind::Immediate);
        assert_eq!(response.waited, Duration::ZERO);
        assert_eq!(response.snapshot.version(), handler.notifier().version());
    }

    #[test]
    fn test_get_with_current_version_times_out() {
        let handler = handler();
        let current = version_document(&handler.notifier().version()).unwrap();

        let start = Instant::now();
        let snapshot = handler
            .get(Some(&current), Some(&Value::Int32(30)))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(snapshot.version(), handler.notifier().version());
    }

    #[test]
    fn test_validation_error_counted() {
        let handler = handler();
        let err = handler
            .get(None, Some(&Value::Int32(10)))
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::PairingViolation));
        assert_eq!(handler.notifier().metrics().snapshot().validation_failures, 1);
        assert_eq!(handler.notifier().pending_waiters(), 0);
    }

    #[test]
    fn test_shutdown_maps_to_error() {
        let handler = handler();
        handler.notifier().shutdown();

        let request = Document::new()
            .with(TOPOLOGY_VERSION_FIELD, version_document(&handler.notifier().version()).unwrap())
            .with(MAX_AWAIT_TIME_MS_FIELD, 1000i32);
        let err = handler.handle(&request).unwrap_err();
        assert_eq!(err, TopologyError::ShutdownInProgress);
        assert_eq!(err.code(), 91);
    }

    #[test]
    fn test_huge_budget_is_clamped() {
        let handler = handler();
        let initial = TopologyVersion::initial(handler.notifier().process_id());
        handler.notifier().publish(Document::new()).unwrap();

        let response = handler
            .await_change(AwaitRequest::Await {
                version: initial,
                max_await: Duration::MAX,
            })
            .unwrap();
        assert_eq!(response.kind, ResponseKind::Immediate);
        assert_eq!(response.snapshot.version().counter(), 1);
    }

    #[test]
    fn test_configured_cap_shortens_wait() {
        let handler = RequestHandler::with_max_await(
            Arc::new(Notifier::new(Document::new())),
            Duration::from_millis(20),
        );
        let current = version_document(&handler.notifier().version()).unwrap();

        let start = Instant::now();
        let response = handler
            .handle(
                &Document::new()
                    .with(TOPOLOGY_VERSION_FIELD, current)
                    .with(MAX_AWAIT_TIME_MS_FIELD, 60_000i32),
            )
            .unwrap();
        assert_eq!(response.kind, ResponseKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_cap_never_exceeds_horizon() {
        let handler = RequestHandler::with_max_await(
            Arc::new(Notifier::new(Document::new())),
            Duration::MAX,
        );
        assert_eq!(handler.max_await(), MAX_AWAIT_HORIZON);
    }

    #[tokio::test]
    async fn test_handle_async() {
        let handler = handler();
        let response = handler.handle_async(&Document::new()).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Immediate);
    }

    #[tokio::test]
    async fn test_handle_async_rejects_without_waiting() {
        let handler = handler();
        let request = Document::new().with(MAX_AWAIT_TIME_MS_FIELD, 1000i32);
        let err = handler.handle_async(&request).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PairingViolation));
        assert_eq!(handler.notifier().metrics().snapshot().validation_failures, 1);
    }
}
