//! Streaming archives through decode and classification.
//!
//! Records are handed to the caller one at a time as they are read, so
//! memory does not grow with archive size. The parallel scan bounds how far
//! each worker may run ahead of the consumer.

use std::path::Path;
use std::sync::mpsc;

use rayon::ThreadPool;

use crate::archive::{ArchiveError, ArchiveFormat};
use crate::classify::{Classification, classify};
use crate::decode::{DecodeFailure, decode};

/// Records a parallel worker may buffer before it waits for the consumer.
pub const RECORDS_IN_FLIGHT: usize = 1024;

/// Why reading an archive stopped.
#[derive(Debug)]
pub enum ScanEnd {
    /// Every entry was read.
    Exhausted,
    /// The per-archive record cap was hit with entries left unread.
    CapReached,
    /// The container became unreadable part way through.
    Corrupt(ArchiveError),
}

/// How one archive ended.
#[derive(Debug)]
pub enum ScanOutcome {
    OpenFailed(ArchiveError),
    Scanned {
        /// Records read, successful or not.
        records_read: usize,
        end: ScanEnd,
    },
}

/// One step of a scan, delivered in archive order.
#[derive(Debug)]
pub enum ScanEvent {
    Record(Result<Classification, DecodeFailure>),
    /// Always the last event for an archive.
    Finished(ScanOutcome),
}

/// Opens `root/archive`, streams at most `max_records` records to
/// `on_record` and closes it.
///
/// Undecodable records are passed on as failures and reading continues with
/// the next one. An error from `on_record` stops the scan and is returned;
/// the archive is closed on that path too.
pub fn scan_archive<F, E>(
    format: &F,
    root: &Path,
    archive: &str,
    max_records: usize,
    mut on_record: impl FnMut(Result<Classification, DecodeFailure>) -> Result<(), E>,
) -> Result<ScanOutcome, E>
where
    F: ArchiveFormat,
{
    let mut reader = match format.open(&root.join(archive)) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(archive, error = %e, "skipping archive that failed to open");
            return Ok(ScanOutcome::OpenFailed(e));
        }
    };
    tracing::debug!(archive, "opened archive");

    let mut records_read = 0;
    let mut end = ScanEnd::Exhausted;
    for item in reader.by_ref().take(max_records) {
        let raw = match item {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(archive, error = %e, "stopping at corrupt archive entry");
                end = ScanEnd::Corrupt(e);
                break;
            }
        };
        records_read += 1;
        on_record(decode_record(archive, &raw))?;
    }

    if matches!(end, ScanEnd::Exhausted) && records_read == max_records && reader.next().is_some() {
        tracing::info!(archive, max_records, "record cap reached, ignoring the rest of the archive");
        end = ScanEnd::CapReached;
    }
    drop(reader);
    tracing::debug!(archive, records_read, "closed archive");

    Ok(ScanOutcome::Scanned { records_read, end })
}

fn decode_record(archive: &str, raw: &[u8]) -> Result<Classification, DecodeFailure> {
    decode(raw).map(classify).map_err(|error| {
        if error.is_timestamp() {
            tracing::debug!(archive, error = %error, "skipping record with invalid trigger time");
        } else {
            tracing::debug!(archive, error = %error, "skipping malformed record");
        }
        DecodeFailure::new(archive, raw, error)
    })
}

/// Scans archives on `pool`, one worker per archive, and feeds every
/// [`ScanEvent`] to `handle` on the calling thread in archive order.
///
/// Archives are taken in windows of the pool's size. Each worker streams
/// through a channel holding at most [`RECORDS_IN_FLIGHT`] records. When
/// `handle` fails the remaining workers stop at their next record and the
/// error is returned.
pub fn scan_parallel<F, E>(
    pool: &ThreadPool,
    format: &F,
    root: &Path,
    archives: &[String],
    max_records: usize,
    mut handle: impl FnMut(&str, ScanEvent) -> Result<(), E>,
) -> Result<(), E>
where
    F: ArchiveFormat,
{
    for window in archives.chunks(pool.current_num_threads().max(1)) {
        pool.in_place_scope(|scope| {
            let receivers: Vec<_> = window
                .iter()
                .map(|archive| {
                    let (tx, rx) = mpsc::sync_channel(RECORDS_IN_FLIGHT);
                    scope.spawn(move |_| {
                        let scanned = scan_archive(format, root, archive, max_records, |record| {
                            tx.send(ScanEvent::Record(record))
                        });
                        // A send error means the consumer has stopped.
                        if let Ok(outcome) = scanned {
                            let _ = tx.send(ScanEvent::Finished(outcome));
                        }
                    });
                    (archive, rx)
                })
                .collect();

            for (archive, rx) in receivers {
                for event in rx {
                    handle(archive, event)?;
                }
            }
            Ok::<(), E>(())
        })?;
    }
    Ok(())
}
