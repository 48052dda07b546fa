//! Append-only CSV report files.
//!
//! Every append opens the file, writes, flushes and closes it again, so rows
//! already reported survive a crash later in the run. Write failures are
//! returned to the caller and abort the run.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use ea_core::{Classification, KindFields};
use thiserror::Error;

/// Placeholder for fields that do not apply to an event.
pub const NOT_APPLICABLE: &str = "N/A";

/// Report write errors.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open report {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush report {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One CSV report file with a fixed header.
#[derive(Debug)]
pub struct ReportSink {
    path: PathBuf,
}

impl ReportSink {
    /// Creates (or truncates) the file and writes its header row.
    pub fn create(path: PathBuf, header: &[&str]) -> Result<Self, ReportError> {
        let file = File::create(&path).map_err(|source| ReportError::Open {
            path: path.clone(),
            source,
        })?;
        let sink = Self { path };
        sink.write_rows(file, [header])?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends rows. Rows may have differing field counts.
    pub fn append<R, F>(&self, rows: impl IntoIterator<Item = R>) -> Result<(), ReportError>
    where
        R: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| ReportError::Open {
                path: self.path.clone(),
                source,
            })?;
        self.write_rows(file, rows)
    }

    fn write_rows<R, F>(&self, file: File, rows: impl IntoIterator<Item = R>) -> Result<(), ReportError>
    where
        R: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for row in rows {
            writer.write_record(row).map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        writer.flush().map_err(|source| ReportError::Flush {
            path: self.path.clone(),
            source,
        })
    }
}

/// The full set of report files for one run.
#[derive(Debug)]
pub struct Reports {
    /// One row per classified event.
    pub events: ReportSink,
    /// One row per archive that opened.
    pub events_per_user: ReportSink,
    /// One row per record that failed to decode.
    pub errors: ReportSink,
    /// One row per `(profile id, archive)` link.
    pub profile_archives: ReportSink,
    /// Archives at or above the high-volume threshold.
    pub high_volume: ReportSink,
    /// Selections made in each completion event.
    pub completions: ReportSink,
}

impl Reports {
    /// Creates every report file under `dir` with its header.
    pub fn create(dir: &Path) -> Result<Self, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            events: ReportSink::create(
                dir.join("events.csv"),
                &["file", "IDESessionUUID", "Event", "TriggeredAt", "Duration", "ProfileID"],
            )?,
            events_per_user: ReportSink::create(
                dir.join("events_per_user.csv"),
                &["user", "number of events"],
            )?,
            errors: ReportSink::create(dir.join("errors.csv"), &["file", "JSON"])?,
            profile_archives: ReportSink::create(dir.join("ids_and_zips.csv"), &["id", "file"])?,
            high_volume: ReportSink::create(
                dir.join("users_with_many_events.csv"),
                &["user", "number of events"],
            )?,
            completions: ReportSink::create(
                dir.join("completion_selections.csv"),
                &["file", "selections"],
            )?,
        })
    }
}

/// `file, session, event, triggered at, duration seconds, profile id`.
///
/// The event column holds the kind name, or the unrecognised type name for
/// events that fell into [`EventKind::Other`].
///
/// [`EventKind::Other`]: ea_core::EventKind::Other
pub fn event_row(archive: &str, classification: &Classification) -> [String; 6] {
    let common = &classification.common;
    let event = match &classification.fields {
        KindFields::Other { type_name } => type_name.clone(),
        _ => classification.kind.to_string(),
    };
    [
        archive.to_string(),
        common
            .session_id
            .clone()
            .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        event,
        common.triggered_at.to_rfc3339(),
        common
            .duration_seconds()
            .map_or_else(|| NOT_APPLICABLE.to_string(), |s| s.to_string()),
        classification.profile_id().unwrap_or_default().to_string(),
    ]
}

/// `file, selection...` for completion events; `None` for anything else.
pub fn completion_row(archive: &str, classification: &Classification) -> Option<Vec<String>> {
    let KindFields::Completion { selections } = &classification.fields else {
        return None;
    };
    let mut row = Vec::with_capacity(selections.len() + 1);
    row.push(archive.to_string());
    row.extend(selections.iter().cloned());
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ea_core::{classify, decode};
    use tempfile::TempDir;

    fn classified(json: &str) -> Classification {
        classify(decode(json.as_bytes()).unwrap())
    }

    #[test]
    fn create_writes_header_once_and_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("r.csv");
        std::fs::write(&path, "stale\n").unwrap();

        let sink = ReportSink::create(path.clone(), &["a", "b"]).unwrap();
        sink.append([["1", "2"]]).unwrap();
        sink.append([["3", "4"]]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn raw_payloads_are_quoted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("errors.csv");
        let sink = ReportSink::create(path.clone(), &["file", "JSON"]).unwrap();
        sink.append([["a.zip", r#"{"x":1,"y":"q"}"#]]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "file,JSON\na.zip,\"{\"\"x\"\":1,\"\"y\"\":\"\"q\"\"}\"\n");
    }

    #[test]
    fn append_to_removed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.csv");
        let sink = ReportSink::create(path.clone(), &["a"]).unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = sink.append([["1"]]).unwrap_err();
        assert!(matches!(err, ReportError::Open { .. }));
    }

    #[test]
    fn reports_create_every_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("out");
        let reports = Reports::create(&dir).unwrap();

        assert_eq!(
            std::fs::read_to_string(reports.events.path()).unwrap(),
            "file,IDESessionUUID,Event,TriggeredAt,Duration,ProfileID\n"
        );
        for name in [
            "events_per_user.csv",
            "errors.csv",
            "ids_and_zips.csv",
            "users_with_many_events.csv",
            "completion_selections.csv",
        ] {
            assert!(dir.join(name).exists(), "{name} missing");
        }
    }

    #[test]
    fn event_row_for_span_kind() {
        let c = classified(
            r#"{"$type":"BuildEvent","IDESessionUUID":"s-1","TriggeredAt":"2016-09-26T10:15:21+02:00","Duration":"00:01:05.9"}"#,
        );
        assert_eq!(
            event_row("u.zip", &c),
            [
                "u.zip".to_string(),
                "s-1".to_string(),
                "BuildEvent".to_string(),
                "2016-09-26T10:15:21+02:00".to_string(),
                "65".to_string(),
                String::new(),
            ]
        );
    }

    #[test]
    fn event_row_for_user_profile_and_unknown_type() {
        let profile = classified(
            r#"{"$type":"UserProfileEvent","IDESessionUUID":"s","TriggeredAt":"2016-09-26T10:15:21Z","ProfileId":"U1"}"#,
        );
        let row = event_row("u.zip", &profile);
        assert_eq!(row[4], NOT_APPLICABLE);
        assert_eq!(row[5], "U1");

        let other = classified(
            r#"{"$type":"KaVE.X.MysteryEvent","IDESessionUUID":"s","TriggeredAt":"2016-09-26T10:15:21Z"}"#,
        );
        assert_eq!(
            event_row("a.zip", &other),
            [
                "a.zip".to_string(),
                NOT_APPLICABLE.to_string(),
                "MysteryEvent".to_string(),
                "2016-09-26T10:15:21+00:00".to_string(),
                NOT_APPLICABLE.to_string(),
                String::new(),
            ]
        );
    }

    #[test]
    fn completion_row_lists_selections() {
        let c = classified(
            r#"{"$type":"CompletionEvent","TriggeredAt":"2016-09-26T10:15:21Z","Selections":[{"Proposal":{"Name":"a"}},{"Proposal":{"Name":"b"}}]}"#,
        );
        assert_eq!(
            completion_row("u.zip", &c),
            Some(vec!["u.zip".to_string(), "a".to_string(), "b".to_string()])
        );

        let w = classified(r#"{"$type":"WindowEvent","TriggeredAt":"2016-09-26T10:15:21Z"}"#);
        assert_eq!(completion_row("u.zip", &w), None);
    }
}
