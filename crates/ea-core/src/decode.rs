//! Decoding of raw archive records into typed [`Event`]s.
//!
//! Each record is a JSON object naming its concrete type in a `$type` field,
//! e.g. `KaVE.Commons.Model.Events.CommandEvent, KaVE.Commons`. Decoding
//! never panics: anything malformed comes back as a [`DecodeError`] so the
//! caller can skip the record and keep reading the archive.

use chrono::{DateTime, Duration};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, EventPayload};
use crate::event_kind::EventKind;

/// Why a single record could not be turned into an [`Event`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),
}

impl DecodeError {
    /// True for missing or unparseable trigger times.
    pub fn is_timestamp(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp { .. } | Self::MissingField("TriggeredAt")
        )
    }
}

/// A record that failed to decode, kept for the error report.
#[derive(Debug)]
pub struct DecodeFailure {
    /// Archive the record came from.
    pub archive: String,
    /// The offending payload text.
    pub raw: String,
    pub error: DecodeError,
}

impl DecodeFailure {
    pub fn new(archive: impl Into<String>, raw: &[u8], error: DecodeError) -> Self {
        Self {
            archive: archive.into(),
            raw: String::from_utf8_lossy(raw).into_owned(),
            error,
        }
    }
}

/// The subset of the payload the pipeline reads. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "$type")]
    type_name: String,
    #[serde(rename = "IDESessionUUID", default)]
    session_id: Option<String>,
    #[serde(rename = "TriggeredAt", default)]
    triggered_at: Option<String>,
    #[serde(rename = "Duration", default)]
    duration: Option<String>,
    #[serde(rename = "ProfileId", default)]
    profile_id: Option<String>,
    #[serde(rename = "Selections", default)]
    selections: Option<Vec<Value>>,
}

/// Decodes one raw record.
pub fn decode(raw: &[u8]) -> Result<Event, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let envelope: Envelope = serde_json::from_str(text)?;

    let triggered_at = envelope
        .triggered_at
        .as_deref()
        .ok_or(DecodeError::MissingField("TriggeredAt"))?;
    let triggered_at =
        DateTime::parse_from_rfc3339(triggered_at).map_err(|source| {
            DecodeError::InvalidTimestamp {
                value: triggered_at.to_string(),
                source,
            }
        })?;

    let type_name = short_type_name(&envelope.type_name);
    let payload = match type_name.parse::<EventKind>() {
        Ok(kind) => build_payload(kind, &envelope)?,
        Err(unknown) => EventPayload::Other {
            type_name: unknown.name().to_string(),
        },
    };

    Ok(Event {
        session_id: envelope.session_id.unwrap_or_default(),
        triggered_at,
        payload,
    })
}

fn build_payload(kind: EventKind, envelope: &Envelope) -> Result<EventPayload, DecodeError> {
    let duration = if kind.has_duration() {
        envelope
            .duration
            .as_deref()
            .map(|text| parse_span(text).ok_or_else(|| DecodeError::InvalidDuration(text.to_string())))
            .transpose()?
    } else {
        None
    };

    Ok(match kind {
        EventKind::Command => EventPayload::Command { duration },
        EventKind::Activity => EventPayload::Activity { duration },
        EventKind::Install => EventPayload::Install { duration },
        EventKind::Completion => EventPayload::Completion {
            duration,
            selections: envelope
                .selections
                .iter()
                .flatten()
                .map(describe_selection)
                .collect(),
        },
        EventKind::TestRun => EventPayload::TestRun { duration },
        EventKind::UserProfile => EventPayload::UserProfile {
            profile_id: envelope.profile_id.clone().unwrap_or_default(),
        },
        EventKind::VersionControl => EventPayload::VersionControl,
        EventKind::Window => EventPayload::Window,
        EventKind::Build => EventPayload::Build { duration },
        EventKind::Debugger => EventPayload::Debugger,
        EventKind::Document => EventPayload::Document,
        EventKind::Edit => EventPayload::Edit { duration },
        EventKind::Find => EventPayload::Find,
        EventKind::IdeState => EventPayload::IdeState,
        EventKind::Solution => EventPayload::Solution,
        EventKind::Update => EventPayload::Update,
        EventKind::Error => EventPayload::Error,
        EventKind::Info => EventPayload::Info,
        EventKind::Navigation => EventPayload::Navigation,
        EventKind::System => EventPayload::System,
        EventKind::Other => EventPayload::Other {
            type_name: kind.as_str().to_string(),
        },
    })
}

/// `KaVE.Commons.Model.Events.CommandEvent, KaVE.Commons` -> `CommandEvent`.
fn short_type_name(qualified: &str) -> &str {
    let type_part = qualified.split(',').next().unwrap_or(qualified).trim();
    type_part.rsplit('.').next().unwrap_or(type_part)
}

/// Prefers the selected proposal's name; falls back to the compact JSON.
fn describe_selection(selection: &Value) -> String {
    if let Some(name) = selection.pointer("/Proposal/Name").and_then(Value::as_str) {
        return name.to_string();
    }
    match selection {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a non-negative `[d.]hh:mm:ss[.fffffff]` span.
fn parse_span(text: &str) -> Option<Duration> {
    let mut parts = text.split(':');
    let (hour_part, minute_part, second_part) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match hour_part.split_once('.') {
        Some((days, hours)) => (parse_digits(days)?, parse_digits(hours)?),
        None => (0, parse_digits(hour_part)?),
    };
    let minutes = parse_digits(minute_part)?;
    let (seconds, fraction) = second_part.split_once('.').unwrap_or((second_part, ""));
    let seconds = parse_digits(seconds)?;
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let nanos = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let padded: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
        padded.parse::<i64>().ok()?
    };

    Some(
        Duration::days(i64::from(days))
            + Duration::hours(i64::from(hours))
            + Duration::minutes(i64::from(minutes))
            + Duration::seconds(i64::from(seconds))
            + Duration::nanoseconds(nanos),
    )
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
