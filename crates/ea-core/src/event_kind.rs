//! Event kind enum as the single source of truth for event type names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of interaction event kinds.
///
/// Anything not recognised is classified as [`EventKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Command,
    Activity,
    Install,
    Completion,
    TestRun,
    UserProfile,
    VersionControl,
    Window,
    Build,
    Debugger,
    Document,
    Edit,
    Find,
    IdeState,
    Solution,
    Update,
    Error,
    Info,
    Navigation,
    System,
    Other,
}

impl EventKind {
    /// Every kind, in report order.
    pub const ALL: [Self; 21] = [
        Self::Command,
        Self::Activity,
        Self::Install,
        Self::Completion,
        Self::TestRun,
        Self::UserProfile,
        Self::VersionControl,
        Self::Window,
        Self::Build,
        Self::Debugger,
        Self::Document,
        Self::Edit,
        Self::Find,
        Self::IdeState,
        Self::Solution,
        Self::Update,
        Self::Error,
        Self::Info,
        Self::Navigation,
        Self::System,
        Self::Other,
    ];

    /// Short type name as written in payloads and report rows.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "CommandEvent",
            Self::Activity => "ActivityEvent",
            Self::Install => "InstallEvent",
            Self::Completion => "CompletionEvent",
            Self::TestRun => "TestRunEvent",
            Self::UserProfile => "UserProfileEvent",
            Self::VersionControl => "VersionControlEvent",
            Self::Window => "WindowEvent",
            Self::Build => "BuildEvent",
            Self::Debugger => "DebuggerEvent",
            Self::Document => "DocumentEvent",
            Self::Edit => "EditEvent",
            Self::Find => "FindEvent",
            Self::IdeState => "IDEStateEvent",
            Self::Solution => "SolutionEvent",
            Self::Update => "UpdateEvent",
            Self::Error => "ErrorEvent",
            Self::Info => "InfoEvent",
            Self::Navigation => "NavigationEvent",
            Self::System => "SystemEvent",
            Self::Other => "OtherEvent",
        }
    }

    /// Whether events of this kind model a bounded activity with a duration.
    #[must_use]
    pub const fn has_duration(&self) -> bool {
        matches!(
            self,
            Self::Command
                | Self::Activity
                | Self::Install
                | Self::Completion
                | Self::TestRun
                | Self::Build
                | Self::Edit
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Parses a short type name. `OtherEvent` is not accepted: the fallback
    /// kind is never named in a payload.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| *kind != Self::Other && kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == Self::Other.as_str() {
            return Ok(Self::Other);
        }
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for type names outside the closed kind set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(String);

impl UnknownEventKind {
    /// The unrecognised type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}
