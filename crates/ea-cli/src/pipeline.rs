//! Pipeline driver: discovery, per-archive streaming, consistency check and
//! final reports.
//!
//! Archives are independent units of work. Per-record and per-archive
//! failures are logged and absorbed here; only report write failures and an
//! unreadable data directory end the run early.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ea_core::{
    AggregationState, ArchiveFormat, Classification, ConsistencyReport, DecodeFailure, EventKind,
    ScanEnd, ScanEvent, ScanOutcome, check, discover_archives, scan_archive, scan_parallel,
};
use serde::Serialize;

use crate::Config;
use crate::report::{ReportError, Reports, completion_row, event_row};

/// Where the driver is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Discovering,
    PerArchive,
    ConsistencyChecking,
    Reporting,
    Done,
}

/// Run settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_records_per_archive: usize,
    pub high_volume_threshold: u64,
    pub jobs: usize,
    pub archive_extension: String,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            max_records_per_archive: config.max_records_per_archive,
            high_volume_threshold: config.high_volume_threshold,
            jobs: config.jobs.max(1),
            archive_extension: config.archive_extension.clone(),
        }
    }
}

/// Everything the final summary needs.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub total_files: usize,
    /// Archives that could not be opened at all.
    pub unreadable_files: usize,
    pub counts_by_kind: BTreeMap<EventKind, u64>,
    pub exceptions: u64,
    /// Number of archives each profile id appears in.
    pub files_per_profile: BTreeMap<String, usize>,
    /// Unrecognised type names that were counted as other events.
    pub unknown_types: BTreeMap<String, u64>,
    pub consistency: ConsistencyReport,
}

/// Run-wide state, fed one scan event at a time.
struct Tally<'a> {
    reports: &'a Reports,
    high_volume_threshold: u64,
    state: AggregationState,
    unreadable_files: usize,
}

impl Tally<'_> {
    fn handle(&mut self, archive: &str, event: ScanEvent) -> Result<(), ReportError> {
        match event {
            ScanEvent::Record(Ok(classification)) => self.record_event(archive, &classification),
            ScanEvent::Record(Err(failure)) => self.record_failure(archive, &failure),
            ScanEvent::Finished(outcome) => self.finish_archive(archive, outcome),
        }
    }

    fn record_event(
        &mut self,
        archive: &str,
        classification: &Classification,
    ) -> Result<(), ReportError> {
        self.state.record_event(archive, classification);
        self.reports
            .events
            .append([event_row(archive, classification)])?;
        if let Some(row) = completion_row(archive, classification) {
            self.reports.completions.append([row])?;
        }
        Ok(())
    }

    fn record_failure(&mut self, archive: &str, failure: &DecodeFailure) -> Result<(), ReportError> {
        self.state.record_failure(archive);
        self.reports
            .errors
            .append([[failure.archive.as_str(), failure.raw.as_str()]])
    }

    fn finish_archive(&mut self, archive: &str, outcome: ScanOutcome) -> Result<(), ReportError> {
        let (records_read, end) = match outcome {
            ScanOutcome::OpenFailed(_) => {
                self.unreadable_files += 1;
                return Ok(());
            }
            ScanOutcome::Scanned { records_read, end } => (records_read, end),
        };

        let records = self.state.records_for(archive);
        let records_text = records.to_string();
        self.reports
            .events_per_user
            .append([[archive, records_text.as_str()]])?;
        if records >= self.high_volume_threshold {
            self.reports
                .high_volume
                .append([[archive, records_text.as_str()]])?;
        }

        let stop = match end {
            ScanEnd::Exhausted => "exhausted",
            ScanEnd::CapReached => "record cap",
            ScanEnd::Corrupt(_) => "corrupt entry",
        };
        tracing::info!(archive, records_read, stop, "finished archive");
        Ok(())
    }
}

/// Drives one analysis run over a data directory.
pub struct Pipeline<'a, F> {
    format: F,
    settings: Settings,
    tally: Tally<'a>,
    phase: Phase,
}

impl<'a, F: ArchiveFormat> Pipeline<'a, F> {
    pub fn new(format: F, settings: Settings, reports: &'a Reports) -> Self {
        let tally = Tally {
            reports,
            high_volume_threshold: settings.high_volume_threshold,
            state: AggregationState::new(),
            unreadable_files: 0,
        };
        Self {
            format,
            settings,
            tally,
            phase: Phase::Idle,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn state(&self) -> &AggregationState {
        &self.tally.state
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "pipeline phase");
        self.phase = phase;
    }

    /// Processes every archive under `root` and writes all reports.
    pub fn run(&mut self, root: &Path) -> Result<RunSummary> {
        self.enter(Phase::Discovering);
        let archives = discover_archives(root, &self.settings.archive_extension)
            .context("failed to discover archives")?;
        tracing::info!(root = %root.display(), count = archives.len(), "found archives");
        for archive in &archives {
            self.tally.state.record_archive(archive);
        }

        self.enter(Phase::PerArchive);
        let max_records = self.settings.max_records_per_archive;
        let format = &self.format;
        let tally = &mut self.tally;
        if self.settings.jobs <= 1 {
            for archive in &archives {
                let outcome = scan_archive(format, root, archive, max_records, |record| {
                    tally.handle(archive, ScanEvent::Record(record))
                })?;
                tally.handle(archive, ScanEvent::Finished(outcome))?;
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.jobs)
                .build()
                .context("failed to build scanning thread pool")?;
            scan_parallel(&pool, format, root, &archives, max_records, |archive, event| {
                tally.handle(archive, event)
            })?;
        }

        self.enter(Phase::ConsistencyChecking);
        let consistency = check(&self.tally.state);
        if !consistency.all_files_map_to_single_profile {
            tracing::warn!(
                anomalies = consistency.anomalies.len(),
                "some archives map to more than one profile id"
            );
        }

        self.enter(Phase::Reporting);
        self.tally
            .reports
            .profile_archives
            .append(
                consistency
                    .profile_file_associations
                    .iter()
                    .map(|(profile, archive)| [profile.as_str(), archive.as_str()]),
            )
            .context("failed to write profile associations")?;

        let state = &self.tally.state;
        let summary = RunSummary {
            total_files: archives.len(),
            unreadable_files: self.tally.unreadable_files,
            counts_by_kind: state.counts_by_kind().collect(),
            exceptions: state.exceptions(),
            files_per_profile: state
                .profile_files()
                .iter()
                .map(|(profile, files)| (profile.clone(), files.len()))
                .collect(),
            unknown_types: state.unknown_types().clone(),
            consistency,
        };
        self.enter(Phase::Done);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::File;
    use std::io::Write;

    use ea_core::ZipFormat;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const WINDOW: &str = r#"{"$type":"KaVE.Commons.Model.Events.VisualStudio.WindowEvent, KaVE.Commons","IDESessionUUID":"s","TriggeredAt":"2016-09-26T10:15:21+02:00"}"#;
    const BAD_TIME: &str = r#"{"$type":"KaVE.Commons.Model.Events.VisualStudio.WindowEvent, KaVE.Commons","TriggeredAt":"2016-13-45T10:15:21+02:00"}"#;

    fn profile(id: &str) -> String {
        format!(
            r#"{{"$type":"KaVE.Commons.Model.Events.UserProfiles.UserProfileEvent, KaVE.Commons","IDESessionUUID":"s","TriggeredAt":"2016-09-26T10:15:21+02:00","ProfileId":"{id}"}}"#
        )
    }

    fn write_zip(root: &Path, name: &str, records: &[&str]) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (i, record) in records.iter().enumerate() {
            zip.start_file(format!("{i}.json"), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(record.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn settings() -> Settings {
        Settings::from(&Config::default())
    }

    fn read(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn run_counts_every_record_and_reaches_done() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let u1 = profile("U1");
        write_zip(data.path(), "2016-09-26/1.zip", &[WINDOW, WINDOW, BAD_TIME, u1.as_str(), WINDOW]);
        write_zip(data.path(), "2016-09-26/2.zip", &[WINDOW]);
        std::fs::write(data.path().join("2016-09-26/3.zip"), "not a zip").unwrap();

        let reports = Reports::create(out.path()).unwrap();
        let mut pipeline = Pipeline::new(ZipFormat, settings(), &reports);
        let summary = pipeline.run(data.path()).unwrap();

        assert_eq!(pipeline.phase(), Phase::Done);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.unreadable_files, 1);
        assert_eq!(summary.exceptions, 1);
        assert_eq!(summary.counts_by_kind[&EventKind::Window], 4);
        assert_eq!(summary.counts_by_kind[&EventKind::UserProfile], 1);
        assert_eq!(summary.counts_by_kind.values().sum::<u64>() + summary.exceptions, 6);

        assert!(summary.consistency.all_files_map_to_single_profile);
        assert_eq!(
            summary.consistency.files_missing_profile,
            vec!["2016-09-26/2.zip".to_string(), "2016-09-26/3.zip".to_string()]
        );
        assert_eq!(read(out.path(), "ids_and_zips.csv"), "id,file\nU1,2016-09-26/1.zip\n");
        assert_eq!(
            read(out.path(), "events_per_user.csv"),
            "user,number of events\n2016-09-26/1.zip,5\n2016-09-26/2.zip,1\n"
        );
        assert_eq!(read(out.path(), "errors.csv").lines().count(), 2);
        assert_eq!(read(out.path(), "events.csv").lines().count(), 6);
    }

    #[test]
    fn record_cap_limits_each_archive() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_zip(data.path(), "a.zip", &[WINDOW; 5]);

        let reports = Reports::create(out.path()).unwrap();
        let mut settings = settings();
        settings.max_records_per_archive = 2;
        let mut pipeline = Pipeline::new(ZipFormat, settings, &reports);
        let summary = pipeline.run(data.path()).unwrap();

        assert_eq!(summary.counts_by_kind[&EventKind::Window], 2);
        assert_eq!(summary.exceptions, 0);
        assert_eq!(pipeline.state().records_for("a.zip"), 2);
    }

    #[test]
    fn high_volume_threshold_is_inclusive() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_zip(data.path(), "big.zip", &[WINDOW; 3]);
        write_zip(data.path(), "small.zip", &[WINDOW; 2]);

        let reports = Reports::create(out.path()).unwrap();
        let mut settings = settings();
        settings.high_volume_threshold = 3;
        Pipeline::new(ZipFormat, settings, &reports)
            .run(data.path())
            .unwrap();

        assert_eq!(
            read(out.path(), "users_with_many_events.csv"),
            "user,number of events\nbig.zip,3\n"
        );
    }

    #[test]
    fn failed_records_count_towards_the_high_volume_threshold() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let unset = profile("");
        let mystery = r#"{"$type":"KaVE.X.MysteryEvent","TriggeredAt":"2016-09-26T10:15:21Z"}"#;
        write_zip(data.path(), "a.zip", &[unset.as_str(), mystery, BAD_TIME]);

        let reports = Reports::create(out.path()).unwrap();
        let mut settings = settings();
        settings.high_volume_threshold = 3;
        let summary = Pipeline::new(ZipFormat, settings, &reports)
            .run(data.path())
            .unwrap();

        assert_eq!(summary.exceptions, 1);
        assert_eq!(
            read(out.path(), "events_per_user.csv"),
            "user,number of events\na.zip,3\n"
        );
        assert_eq!(
            read(out.path(), "users_with_many_events.csv"),
            "user,number of events\na.zip,3\n"
        );
    }

    #[test]
    fn rows_are_written_while_the_run_is_in_progress() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_zip(data.path(), "a.zip", &[WINDOW, WINDOW, WINDOW]);

        let reports = Reports::create(out.path()).unwrap();
        // Removing the per-user report makes the end-of-archive write fail,
        // after every event row has already been appended.
        std::fs::remove_file(out.path().join("events_per_user.csv")).unwrap();
        let result = Pipeline::new(ZipFormat, settings(), &reports).run(data.path());

        assert!(result.is_err());
        assert_eq!(read(out.path(), "events.csv").lines().count(), 4);
    }

    #[test]
    fn parallel_run_matches_sequential_output() {
        let data = TempDir::new().unwrap();
        let u1 = profile("U1");
        let u2 = profile("U2");
        for i in 0..12 {
            let records: Vec<&str> = match i % 3 {
                0 => vec![WINDOW, u1.as_str()],
                1 => vec![BAD_TIME, WINDOW, u2.as_str(), u1.as_str()],
                _ => vec![WINDOW; i],
            };
            write_zip(data.path(), &format!("day/{i:02}.zip"), &records);
        }

        let run_with = |jobs: usize| {
            let out = TempDir::new().unwrap();
            let reports = Reports::create(out.path()).unwrap();
            let mut settings = settings();
            settings.jobs = jobs;
            let summary = Pipeline::new(ZipFormat, settings, &reports)
                .run(data.path())
                .unwrap();
            let files: Vec<String> = ["events.csv", "errors.csv", "events_per_user.csv", "ids_and_zips.csv"]
                .iter()
                .map(|name| read(out.path(), name))
                .collect();
            (summary.counts_by_kind, summary.consistency, files)
        };

        let sequential = run_with(1);
        let parallel = run_with(3);
        assert_eq!(sequential, parallel);
        assert!(!sequential.1.all_files_map_to_single_profile);
        assert_eq!(sequential.1.anomalies.len(), 4);
    }

    #[test]
    fn missing_data_dir_fails_the_run() {
        let out = TempDir::new().unwrap();
        let reports = Reports::create(out.path()).unwrap();
        let mut pipeline = Pipeline::new(ZipFormat, settings(), &reports);
        assert!(pipeline.run(&out.path().join("nope")).is_err());
    }
}
