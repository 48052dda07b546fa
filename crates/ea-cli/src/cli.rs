//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::analyze::AnalyzeArgs;

/// Interaction event audit.
///
/// Reads per-user archives of recorded IDE interaction events and produces
/// per-event, per-user and per-profile reports.
#[derive(Debug, Parser)]
#[command(name = "ea", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every archive under a data directory and write the reports.
    Analyze(AnalyzeArgs),

    /// List the archives found under a data directory.
    List {
        /// Directory searched recursively for archives.
        data_dir: PathBuf,
    },
}
