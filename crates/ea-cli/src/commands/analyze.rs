//! `ea analyze`: run the full pipeline and print the summary.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ea_core::ZipFormat;

use crate::Config;
use crate::pipeline::{Pipeline, RunSummary, Settings};
use crate::report::Reports;

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Directory searched recursively for per-user archives.
    pub data_dir: PathBuf,

    /// Directory to write the report files to.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of records read from a single archive.
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Number of archives scanned concurrently.
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Print the summary as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeArgs {
    /// Layers explicit flags over the loaded configuration.
    fn apply(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(max) = self.max_records {
            config.max_records_per_archive = max;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        config
    }
}

pub fn run<W: Write>(out: &mut W, args: &AnalyzeArgs, config: &Config) -> Result<RunSummary> {
    let config = args.apply(config);
    tracing::debug!(?config, "effective configuration");
    if !args.json {
        writeln!(
            out,
            "looking (recursively) for events in folder {}",
            args.data_dir.display()
        )?;
    }

    let reports = Reports::create(&config.output_dir).context("failed to create report files")?;
    let summary =
        Pipeline::new(ZipFormat, Settings::from(&config), &reports).run(&args.data_dir)?;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &summary).context("failed to serialize summary")?;
        writeln!(out)?;
    } else {
        write_summary(out, &summary)?;
    }
    Ok(summary)
}

/// Human-readable run summary.
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(out, "Total files: {}", summary.total_files)?;
    writeln!(out, "Unreadable files: {}", summary.unreadable_files)?;
    for (kind, count) in &summary.counts_by_kind {
        writeln!(out, "{kind}: {count}")?;
    }
    writeln!(out, "Exceptions: {}", summary.exceptions)?;

    if !summary.unknown_types.is_empty() {
        writeln!(out, "Unrecognised event types:")?;
        for (name, count) in &summary.unknown_types {
            writeln!(out, "  {name}: {count}")?;
        }
    }

    writeln!(out, "Profile ids: {}", summary.files_per_profile.len())?;
    for (profile, files) in &summary.files_per_profile {
        writeln!(out, "  {profile} appears in {files} file(s)")?;
    }

    let consistency = &summary.consistency;
    writeln!(
        out,
        "Each file maps to exactly one profile id: {}",
        consistency.all_files_map_to_single_profile
    )?;
    for anomaly in &consistency.anomalies {
        writeln!(out, "  {}: {}", anomaly.archive, anomaly.profile_ids.join(", "))?;
    }

    writeln!(
        out,
        "Files missing a profile id: {}",
        consistency.files_missing_profile.len()
    )?;
    for archive in &consistency.files_missing_profile {
        writeln!(out, "  {archive}")?;
    }
    Ok(())
}
