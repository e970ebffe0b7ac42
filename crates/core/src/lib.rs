//! Snapshot metadata extraction for web-archive captures.
//!
//! The pipeline lists the latest captures of a domain from a CDX-style index,
//! fetches each archived document, extracts its head metadata and optionally
//! classifies the site. Batches of domains are reported incrementally as a
//! newline-delimited JSON progress stream.

pub mod batch;
pub mod classify;
#[cfg(feature = "cleanup")]
pub mod cleanup;
pub mod error;
pub mod fetch;
pub mod index;
pub mod metadata;
pub mod parse;
pub mod processor;
pub mod stream;

pub use batch::{BatchLimits, BatchRequest, BatchSummary, BulkError, BulkResponse, drive_batch, run_bulk};
pub use classify::{HeuristicClassifier, RemoteClassifier, Verdict};
#[cfg(feature = "cleanup")]
pub use cleanup::strip_archive_chrome;
pub use error::{FetchCause, FetchError, Result, WaymarkError};
pub use fetch::{FetchConfig, FetchOptions, FetchedPage, Fetcher, RetryPolicy, retry_with_backoff};
pub use index::{IndexQuery, SnapshotRecord, parse_index_response, snapshot_url};
pub use metadata::{ExtractedMetadata, extract_metadata};
pub use parse::Document;
pub use processor::{
    DomainResult, Pacing, ProcessOptions, Processor, ProcessorConfig, ProcessorConfigBuilder, SnapshotResult,
};
pub use stream::{LineDecoder, StreamEvent};
