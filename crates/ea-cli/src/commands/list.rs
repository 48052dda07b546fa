//! `ea list`: show which archives a run would process.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ea_core::discover_archives;

use crate::Config;

/// Writes one archive path per line followed by the total.
pub fn run<W: Write>(out: &mut W, data_dir: &Path, config: &Config) -> Result<usize> {
    let archives = discover_archives(data_dir, &config.archive_extension)
        .with_context(|| format!("failed to list archives in {}", data_dir.display()))?;
    for archive in &archives {
        writeln!(out, "{archive}")?;
    }
    writeln!(out, "Total files: {}", archives.len())?;
    Ok(archives.len())
}
