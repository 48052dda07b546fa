//! Typed interaction events decoded from archive records.

use chrono::{DateTime, Duration, FixedOffset};

/// One interaction event recorded by the IDE plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// IDE session identifier. May be empty.
    pub session_id: String,
    /// When the event was triggered, in the recording machine's offset.
    pub triggered_at: DateTime<FixedOffset>,
    /// Kind-specific data.
    pub payload: EventPayload,
}

/// The kind-specific part of an [`Event`].
///
/// Variants that model a bounded activity carry the optional span it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Command { duration: Option<Duration> },
    Activity { duration: Option<Duration> },
    Install { duration: Option<Duration> },
    Completion {
        duration: Option<Duration>,
        /// Selected proposals in the order they were chosen.
        selections: Vec<String>,
    },
    TestRun { duration: Option<Duration> },
    UserProfile {
        /// Profile identifier; empty means the user never set one.
        profile_id: String,
    },
    VersionControl,
    Window,
    Build { duration: Option<Duration> },
    Debugger,
    Document,
    Edit { duration: Option<Duration> },
    Find,
    IdeState,
    Solution,
    Update,
    Error,
    Info,
    Navigation,
    System,
    /// A type outside the closed set, kept by name for diagnostics.
    Other { type_name: String },
}
