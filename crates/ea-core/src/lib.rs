//! Core domain logic for interaction archive analysis.
//!
//! This crate contains the fundamental types and logic for:
//! - Archives: discovering per-user archives and streaming their records
//! - Decoding: turning raw records into typed events
//! - Classification: mapping events onto a closed set of kinds
//! - Aggregation: run-wide tallies and the profile/archive consistency check

pub mod aggregate;
pub mod archive;
mod classify;
pub mod consistency;
pub mod decode;
pub mod event;
pub mod event_kind;
pub mod scan;

pub use aggregate::AggregationState;
pub use archive::{ArchiveError, ArchiveFormat, ZipFormat, discover_archives};
pub use classify::{Classification, CommonFields, KindFields, classify};
pub use consistency::{ConsistencyReport, ProfileAnomaly, check};
pub use decode::{DecodeError, DecodeFailure, decode};
pub use event::{Event, EventPayload};
pub use event_kind::{EventKind, UnknownEventKind};
pub use scan::{RECORDS_IN_FLIGHT, ScanEnd, ScanEvent, ScanOutcome, scan_archive, scan_parallel};
