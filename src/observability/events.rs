//! Observability events for topowatch
//!
//! Every lifecycle log line carries one of these names in its `event` field,
//! so logs can be filtered by event without parsing messages.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Configuration loaded
    ConfigLoaded,
    /// Server listening, ready for requests
    Serving,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete, every waiter released
    ShutdownComplete,

    // Topology
    /// A new snapshot was published
    TopologyPublished,

    // Waiters
    /// A request registered to wait for a change
    WaiterRegistered,
    /// Waiters released by a publish
    WaitersWoken,
    /// A waiter's deadline passed with no change
    WaiterTimedOut,
    /// A waiter was abandoned before it resolved
    WaiterCancelled,

    // Requests
    /// Request answered without waiting
    RequestAnswered,
    /// Request failed validation
    RequestRejected,

    // Faults
    /// An internal invariant was violated
    InvariantViolation,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            // Boot & Lifecycle
            Event::BootStart => "BOOT_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            // Topology
            Event::TopologyPublished => "TOPOLOGY_PUBLISHED",

            // Waiters
            Event::WaiterRegistered => "WAITER_REGISTERED",
            Event::WaitersWoken => "WAITERS_WOKEN",
            Event::WaiterTimedOut => "WAITER_TIMED_OUT",
            Event::WaiterCancelled => "WAITER_CANCELLED",

            // Requests
            Event::RequestAnswered => "REQUEST_ANSWERED",
            Event::RequestRejected => "REQUEST_REJECTED",

            // Faults
            Event::InvariantViolation => "INVARIANT_VIOLATION",
        }
    }

    /// Returns true if this event indicates a bug
    pub fn is_fault(&self) -> bool {
        matches!(self, Event::InvariantViolation)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
