//! Post-run check that each archive resolves to at most one profile id.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::aggregate::AggregationState;

/// An archive observed under more than one distinct profile id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileAnomaly {
    pub archive: String,
    /// Every profile id seen in the archive, sorted.
    pub profile_ids: Vec<String>,
}

/// Findings of [`check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// True when every archive with a profile id has exactly one.
    pub all_files_map_to_single_profile: bool,
    pub anomalies: Vec<ProfileAnomaly>,
    /// Archives in the run with no profile id at all, sorted.
    pub files_missing_profile: Vec<String>,
    /// `(profile id, archive)` pairs, sorted by profile id then archive.
    pub profile_file_associations: Vec<(String, String)>,
}

/// Inverts the profile -> archives map and checks it.
pub fn check(state: &AggregationState) -> ConsistencyReport {
    let mut file_to_profiles: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut profile_file_associations = Vec::new();

    for (profile_id, archives) in state.profile_files() {
        for archive in archives {
            file_to_profiles
                .entry(archive.as_str())
                .or_default()
                .insert(profile_id.as_str());
            profile_file_associations.push((profile_id.clone(), archive.clone()));
        }
    }

    let anomalies: Vec<ProfileAnomaly> = file_to_profiles
        .iter()
        .filter(|(_, profiles)| profiles.len() > 1)
        .map(|(archive, profiles)| ProfileAnomaly {
            archive: (*archive).to_string(),
            profile_ids: profiles.iter().map(|p| (*p).to_string()).collect(),
        })
        .collect();

    let files_missing_profile = state
        .archives()
        .iter()
        .filter(|archive| !file_to_profiles.contains_key(archive.as_str()))
        .cloned()
        .collect();

    ConsistencyReport {
        all_files_map_to_single_profile: anomalies.is_empty(),
        anomalies,
        files_missing_profile,
        profile_file_associations,
    }
}
