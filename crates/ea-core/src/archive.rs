//! Archive discovery and sequential record reading.
//!
//! Each archive holds every event collected for one user, one JSON record per
//! entry. Entry order is treated as chronological order.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipArchive;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Archive-level errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The path is unreadable or not a valid container.
    #[error("cannot open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The container index or an entry is damaged; nothing after it is read.
    #[error("archive {path} is corrupt at entry {index}: {source}")]
    Corrupt {
        path: PathBuf,
        index: usize,
        #[source]
        source: BoxError,
    },

    /// The data directory itself could not be walked.
    #[error("failed to discover archives under {root}: {source}")]
    Discover {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A container format that yields raw records in native entry order.
///
/// The reader owns the underlying handle; dropping it releases the archive,
/// so every exit path closes it exactly once.
pub trait ArchiveFormat: Sync {
    type Reader: Iterator<Item = Result<Vec<u8>, ArchiveError>>;

    fn open(&self, path: &Path) -> Result<Self::Reader, ArchiveError>;
}

/// Zip archives with one serialized event per file entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFormat;

impl ArchiveFormat for ZipFormat {
    type Reader = ZipRecords;

    fn open(&self, path: &Path) -> Result<Self::Reader, ArchiveError> {
        let open_error = |source: BoxError| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|e| open_error(e.into()))?;
        let archive = ZipArchive::new(file).map_err(|e| open_error(e.into()))?;

        Ok(ZipRecords {
            path: path.to_path_buf(),
            archive,
            index: 0,
            failed: false,
        })
    }
}

/// Iterator over the file entries of one zip archive.
pub struct ZipRecords {
    path: PathBuf,
    archive: ZipArchive<File>,
    index: usize,
    failed: bool,
}

impl ZipRecords {
    fn corrupt(&mut self, index: usize, source: BoxError) -> ArchiveError {
        self.failed = true;
        ArchiveError::Corrupt {
            path: self.path.clone(),
            index,
            source,
        }
    }
}

/// Reads entry `index` in full; `None` for directory entries.
fn read_entry(archive: &mut ZipArchive<File>, index: usize) -> Result<Option<Vec<u8>>, BoxError> {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() {
        return Ok(None);
    }
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw)?;
    Ok(Some(raw))
}

impl Iterator for ZipRecords {
    type Item = Result<Vec<u8>, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;

            match read_entry(&mut self.archive, index) {
                Ok(Some(raw)) => return Some(Ok(raw)),
                Ok(None) => {}
                Err(source) => return Some(Err(self.corrupt(index, source))),
            }
        }
        None
    }
}

/// Finds every archive under `root` with the given extension.
///
/// Paths are returned relative to `root`, `/`-separated, sorted by name.
/// Unreadable subdirectories are skipped with a warning; an unreadable root
/// is an error.
pub fn discover_archives(root: &Path, extension: &str) -> Result<Vec<String>, ArchiveError> {
    let mut archives = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(ArchiveError::Discover {
                    root: root.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path during discovery");
                continue;
            }
        };

        if !entry.file_type().is_file()
            || !entry
                .path()
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        archives.push(relative);
    }

    tracing::debug!(root = %root.display(), count = archives.len(), "discovered archives");
    Ok(archives)
}
