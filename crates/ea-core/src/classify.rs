//! Mapping of typed events onto their [`EventKind`] and report fields.
//!
//! Classification is a single exhaustive match over [`EventPayload`]: adding
//! a variant there fails to compile here until it is given a kind.

use chrono::{DateTime, Duration, FixedOffset};

use crate::event::{Event, EventPayload};
use crate::event_kind::EventKind;

/// Fields shared by every classified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonFields {
    /// `None` when not applicable (unrecognised event types).
    pub session_id: Option<String>,
    pub triggered_at: DateTime<FixedOffset>,
    /// `None` for kinds without a span, or when the span was not recorded.
    pub duration: Option<Duration>,
}

impl CommonFields {
    /// Whole seconds of the duration, if any.
    pub fn duration_seconds(&self) -> Option<i64> {
        self.duration.map(|d| d.num_seconds())
    }
}

/// Kind-specific fields the aggregation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindFields {
    None,
    Completion { selections: Vec<String> },
    UserProfile { profile_id: String },
    Other { type_name: String },
}

/// Result of classifying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: EventKind,
    pub common: CommonFields,
    pub fields: KindFields,
}

impl Classification {
    /// The profile id carried by a user profile event.
    pub fn profile_id(&self) -> Option<&str> {
        match &self.fields {
            KindFields::UserProfile { profile_id } => Some(profile_id.as_str()),
            _ => None,
        }
    }
}

/// Classifies an event. Total and side-effect free.
pub fn classify(event: Event) -> Classification {
    let Event {
        session_id,
        triggered_at,
        payload,
    } = event;

    let (kind, duration, fields) = match payload {
        EventPayload::Command { duration } => (EventKind::Command, duration, KindFields::None),
        EventPayload::Activity { duration } => (EventKind::Activity, duration, KindFields::None),
        EventPayload::Install { duration } => (EventKind::Install, duration, KindFields::None),
        EventPayload::Completion {
            duration,
            selections,
        } => (
            EventKind::Completion,
            duration,
            KindFields::Completion { selections },
        ),
        EventPayload::TestRun { duration } => (EventKind::TestRun, duration, KindFields::None),
        EventPayload::UserProfile { profile_id } => (
            EventKind::UserProfile,
            None,
            KindFields::UserProfile { profile_id },
        ),
        EventPayload::VersionControl => (EventKind::VersionControl, None, KindFields::None),
        EventPayload::Window => (EventKind::Window, None, KindFields::None),
        EventPayload::Build { duration } => (EventKind::Build, duration, KindFields::None),
        EventPayload::Debugger => (EventKind::Debugger, None, KindFields::None),
        EventPayload::Document => (EventKind::Document, None, KindFields::None),
        EventPayload::Edit { duration } => (EventKind::Edit, duration, KindFields::None),
        EventPayload::Find => (EventKind::Find, None, KindFields::None),
        EventPayload::IdeState => (EventKind::IdeState, None, KindFields::None),
        EventPayload::Solution => (EventKind::Solution, None, KindFields::None),
        EventPayload::Update => (EventKind::Update, None, KindFields::None),
        EventPayload::Error => (EventKind::Error, None, KindFields::None),
        EventPayload::Info => (EventKind::Info, None, KindFields::None),
        EventPayload::Navigation => (EventKind::Navigation, None, KindFields::None),
        EventPayload::System => (EventKind::System, None, KindFields::None),
        EventPayload::Other { type_name } => {
            return Classification {
                kind: EventKind::Other,
                common: CommonFields {
                    session_id: None,
                    triggered_at,
                    duration: None,
                },
                fields: KindFields::Other { type_name },
            };
        }
    };

    Classification {
        kind,
        common: CommonFields {
            session_id: Some(session_id),
            triggered_at,
            duration,
        },
        fields,
    }
}
