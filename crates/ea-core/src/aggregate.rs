//! Run-wide tallies built while streaming archives.

use std::collections::{BTreeMap, BTreeSet};

use crate::classify::{Classification, KindFields};
use crate::event_kind::EventKind;

/// Mutable counters for one analysis run.
///
/// Counters only ever grow. The state is not synchronised: when archives are
/// scanned concurrently, a single owner folds their outcomes in.
#[derive(Debug, Default, Clone)]
pub struct AggregationState {
    counts_by_kind: BTreeMap<EventKind, u64>,
    counts_by_user: BTreeMap<String, u64>,
    profile_files: BTreeMap<String, BTreeSet<String>>,
    archives: BTreeSet<String>,
    unknown_types: BTreeMap<String, u64>,
    exceptions: u64,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an archive as part of the run, whether or not it opens.
    pub fn record_archive(&mut self, archive: &str) {
        if !self.archives.contains(archive) {
            self.archives.insert(archive.to_string());
        }
    }

    /// Counts one classified event against its kind and archive.
    ///
    /// User profile events with a non-empty id also link the archive to that
    /// profile; repeated links are no-ops.
    pub fn record_event(&mut self, archive: &str, classification: &Classification) {
        *self.counts_by_kind.entry(classification.kind).or_insert(0) += 1;
        *self.counts_by_user.entry(archive.to_string()).or_insert(0) += 1;
        self.record_archive(archive);

        match &classification.fields {
            KindFields::UserProfile { profile_id } if !profile_id.is_empty() => {
                self.profile_files
                    .entry(profile_id.clone())
                    .or_default()
                    .insert(archive.to_string());
            }
            KindFields::Other { type_name } => {
                *self.unknown_types.entry(type_name.clone()).or_insert(0) += 1;
            }
            KindFields::None | KindFields::Completion { .. } | KindFields::UserProfile { .. } => {}
        }
    }

    /// Counts one record that failed to decode.
    ///
    /// The record still counts towards its archive's total, which is the
    /// number of records read from it.
    pub fn record_failure(&mut self, archive: &str) {
        self.exceptions += 1;
        *self.counts_by_user.entry(archive.to_string()).or_insert(0) += 1;
        self.record_archive(archive);
    }

    /// Events of `kind` seen so far.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Per-kind counts, including zeros, in report order.
    pub fn counts_by_kind(&self) -> impl Iterator<Item = (EventKind, u64)> + '_ {
        EventKind::ALL.into_iter().map(|kind| (kind, self.count(kind)))
    }

    /// Records read from one archive, decoded or not.
    pub fn records_for(&self, archive: &str) -> u64 {
        self.counts_by_user.get(archive).copied().unwrap_or(0)
    }

    pub const fn profile_files(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.profile_files
    }

    /// Every archive registered during the run.
    pub const fn archives(&self) -> &BTreeSet<String> {
        &self.archives
    }

    /// Occurrences of each unrecognised type name.
    pub const fn unknown_types(&self) -> &BTreeMap<String, u64> {
        &self.unknown_types
    }

    pub const fn exceptions(&self) -> u64 {
        self.exceptions
    }

    /// Successfully classified events across all kinds.
    pub fn total_events(&self) -> u64 {
        self.counts_by_kind.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::DateTime;

    use crate::classify::classify;
    use crate::decode::decode;
    use crate::event::{Event, EventPayload};

    fn classified(payload: EventPayload) -> Classification {
        classify(Event {
            session_id: "sess".to_string(),
            triggered_at: DateTime::parse_from_rfc3339("2016-09-26T10:15:21Z").unwrap(),
            payload,
        })
    }

    fn profile(id: &str) -> Classification {
        classified(EventPayload::UserProfile {
            profile_id: id.to_string(),
        })
    }

    #[test]
    fn kind_totals_match_classified_events() {
        let mut state = AggregationState::new();
        state.record_event("a.zip", &classified(EventPayload::Window));
        state.record_event("a.zip", &classified(EventPayload::Window));
        state.record_event("b.zip", &classified(EventPayload::Command { duration: None }));
        state.record_failure("b.zip");

        assert_eq!(state.count(EventKind::Window), 2);
        assert_eq!(state.count(EventKind::Command), 1);
        assert_eq!(state.count(EventKind::Build), 0);
        assert_eq!(state.total_events(), 3);
        assert_eq!(state.counts_by_kind().map(|(_, n)| n).sum::<u64>(), 3);
        assert_eq!(state.exceptions(), 1);
        assert_eq!(state.records_for("a.zip"), 2);
        assert_eq!(state.records_for("b.zip"), 2);
    }

    #[test]
    fn failures_count_as_records_read_but_not_events() {
        let mut state = AggregationState::new();
        state.record_failure("a.zip");
        state.record_event("a.zip", &classified(EventPayload::Window));

        assert_eq!(state.exceptions(), 1);
        assert_eq!(state.total_events(), 1);
        assert_eq!(state.records_for("a.zip"), 2);
        assert!(state.archives().contains("a.zip"));
    }

    #[test]
    fn repeated_profile_links_are_idempotent() {
        let mut state = AggregationState::new();
        state.record_event("a.zip", &profile("U1"));
        state.record_event("a.zip", &profile("U1"));

        assert_eq!(state.profile_files()["U1"].len(), 1);
        assert_eq!(state.count(EventKind::UserProfile), 2);
    }

    // An empty id means the user never set one: it links nothing, and the
    // archive is reported as missing a profile rather than under "".
    #[test]
    fn empty_profile_id_is_not_linked() {
        let mut state = AggregationState::new();
        state.record_event("a.zip", &profile(""));
        assert!(state.profile_files().is_empty());
        assert!(state.archives().contains("a.zip"));
    }

    #[test]
    fn profile_ids_compare_by_value_across_decodes() {
        let json = r#"{"$type":"UserProfileEvent","TriggeredAt":"2016-09-26T10:15:21Z","ProfileId":"U1"}"#;
        let first = classify(decode(json.as_bytes()).unwrap());
        let second = classify(decode(json.to_string().as_bytes()).unwrap());

        let mut state = AggregationState::new();
        state.record_event("a.zip", &first);
        state.record_event("a.zip", &second);

        assert_eq!(state.profile_files().len(), 1);
        assert_eq!(state.profile_files()["U1"].len(), 1);
    }

    #[test]
    fn unknown_type_names_are_tallied() {
        let mut state = AggregationState::new();
        let other = classified(EventPayload::Other {
            type_name: "MysteryEvent".to_string(),
        });
        state.record_event("a.zip", &other);
        state.record_event("b.zip", &other);
        assert_eq!(state.unknown_types()["MysteryEvent"], 2);
        assert_eq!(state.count(EventKind::Other), 2);
    }
}
