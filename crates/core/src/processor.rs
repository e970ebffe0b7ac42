//! Per-domain orchestration.
//!
//! [`Processor::process`] runs the whole pipeline for one domain: index
//! query, then fetch and extraction for every listed capture, then optional
//! classification. Only the index query can fail the domain; everything
//! after it is isolated per snapshot.
//!
//! # Example
//!
//! ```rust,no_run
//! use waymark_core::{ProcessOptions, Processor, ProcessorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> waymark_core::Result<()> {
//! let processor = Processor::new(ProcessorConfig::default())?;
//! let result = processor.process("example.com", &ProcessOptions::default()).await?;
//! for snapshot in &result.snapshots {
//!     println!("{} {}", snapshot.record.timestamp, snapshot.metadata.title);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::{self, HeuristicClassifier, RemoteClassifier, Verdict};
use crate::fetch::{FetchConfig, FetchOptions, Fetcher};
use crate::index::{DEFAULT_ARCHIVE_BASE, DEFAULT_INDEX_ENDPOINT, IndexQuery, SnapshotRecord, parse_index_response};
use crate::metadata::{ExtractedMetadata, extract_metadata};
use crate::{Result, WaymarkError};

/// How captures of one domain are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// One capture at a time with a pause between archived-document fetches.
    Sequential { delay: Duration },
    /// Up to `limit` captures in flight; results keep index order.
    Concurrent { limit: usize },
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Sequential { delay: Duration::from_millis(150) }
    }
}

/// Configuration for the [`Processor`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use waymark_core::{Pacing, ProcessorConfig};
///
/// let config = ProcessorConfig::builder()
///     .pacing(Pacing::Concurrent { limit: 4 })
///     .document_timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.max_parallel_domains, 4);
/// ```
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Index API endpoint (default: the Wayback CDX server).
    pub index_endpoint: String,
    /// Base URL archived documents are fetched from.
    pub archive_base: String,
    /// Timeout for one index query attempt (default: 60s).
    pub index_timeout: Duration,
    /// Timeout for one archived-document attempt (default: 10s).
    pub document_timeout: Duration,
    /// Per-domain fetch policy.
    pub pacing: Pacing,
    /// Domains processed at once within a batch (default: 4).
    pub max_parallel_domains: usize,
    /// Keep each document, stripped of archive chrome, in [`SnapshotResult::html`].
    pub keep_cleaned_html: bool,
    /// HTTP client settings.
    pub fetch: FetchConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            index_endpoint: DEFAULT_INDEX_ENDPOINT.to_string(),
            archive_base: DEFAULT_ARCHIVE_BASE.to_string(),
            index_timeout: Duration::from_secs(60),
            document_timeout: Duration::from_secs(10),
            pacing: Pacing::default(),
            max_parallel_domains: 4,
            keep_cleaned_html: false,
            fetch: FetchConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}

/// Builder for ProcessorConfig.
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: ProcessorConfig::default() }
    }

    /// Sets the archive index endpoint.
    pub fn index_endpoint(mut self, value: impl Into<String>) -> Self {
        self.config.index_endpoint = value.into();
        self
    }

    /// Sets the base URL archived documents are fetched from.
    pub fn archive_base(mut self, value: impl Into<String>) -> Self {
        self.config.archive_base = value.into();
        self
    }

    /// Sets the timeout of one index query attempt.
    pub fn index_timeout(mut self, value: Duration) -> Self {
        self.config.index_timeout = value;
        self
    }

    /// Sets the timeout of one archived document fetch attempt.
    pub fn document_timeout(mut self, value: Duration) -> Self {
        self.config.document_timeout = value;
        self
    }

    /// Sets how the captures of one domain are fetched.
    pub fn pacing(mut self, value: Pacing) -> Self {
        self.config.pacing = value;
        self
    }

    /// Sets the number of domains processed at once in a batch.
    pub fn max_parallel_domains(mut self, value: usize) -> Self {
        self.config.max_parallel_domains = value;
        self
    }

    /// Sets whether cleaned archive HTML is attached to each result.
    pub fn keep_cleaned_html(mut self, value: bool) -> Self {
        self.config.keep_cleaned_html = value;
        self
    }

    /// Sets the HTTP client and retry configuration.
    pub fn fetch(mut self, value: FetchConfig) -> Self {
        self.config.fetch = value;
        self
    }

    /// Builds the config.
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Number of most recent captures to request.
    pub count: u32,
    /// Collapse captures with identical content digests.
    pub dedupe: bool,
    /// Label each titled snapshot and the domain itself.
    pub classify: bool,
    /// Remote tier, consulted only when `classify` is set.
    pub remote: Option<RemoteClassifier>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self { count: 10, dedupe: false, classify: false, remote: None }
    }
}

/// One capture with whatever could be extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    #[serde(flatten)]
    pub record: SnapshotRecord,
    #[serde(flatten)]
    pub metadata: ExtractedMetadata,
    pub archive_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspicious: Option<bool>,
    /// Set when the capture could not be fetched; metadata is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cleaned document, when [`ProcessorConfig::keep_cleaned_html`] is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl SnapshotResult {
    fn failed(record: SnapshotRecord, archive_url: String, error: String) -> Self {
        Self {
            record,
            metadata: ExtractedMetadata::default(),
            archive_url,
            category: None,
            suspicious: None,
            error: Some(error),
            html: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything gathered for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: String,
    /// Heuristic label of the domain name, when classification was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// One entry per index row, in index order.
    pub snapshots: Vec<SnapshotResult>,
}

impl DomainResult {
    /// Number of snapshots that carry an error.
    pub fn error_count(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_error()).count()
    }
}

/// Drives the pipeline for individual domains.
#[derive(Debug, Clone)]
pub struct Processor {
    fetcher: Fetcher,
    heuristic: HeuristicClassifier,
    index_endpoint: Url,
    archive_base: Url,
    config: ProcessorConfig,
}

impl Processor {
    /// Builds a processor, validating the configured endpoints.
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let index_endpoint = parse_endpoint(&config.index_endpoint)?;
        let archive_base = parse_endpoint(&config.archive_base)?;
        let fetcher = Fetcher::new(config.fetch.clone())?;

        Ok(Self { fetcher, heuristic: HeuristicClassifier::default(), index_endpoint, archive_base, config })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Lists the captures of `domain`. Escalates fetch and format failures.
    pub async fn query_index(&self, domain: &str, count: u32, dedupe: bool) -> Result<Vec<SnapshotRecord>> {
        let url = IndexQuery::new(domain, count).dedupe(dedupe).to_url(&self.index_endpoint);
        let page = self
            .fetcher
            .fetch(&url, &FetchOptions::with_timeout(self.config.index_timeout))
            .await?;

        parse_index_response(&page.body, dedupe)
    }

    /// Processes one domain.
    ///
    /// Returns an error only when the index query fails. The result holds
    /// exactly one [`SnapshotResult`] per index row.
    pub async fn process(&self, domain: &str, options: &ProcessOptions) -> Result<DomainResult> {
        let records = self.query_index(domain, options.count, options.dedupe).await?;
        tracing::debug!(domain, captures = records.len(), "index query complete");

        let category = options.classify.then(|| self.heuristic.classify_domain(domain).label);

        let snapshots = match self.config.pacing {
            Pacing::Sequential { delay } => {
                let mut snapshots = Vec::with_capacity(records.len());
                for (i, record) in records.into_iter().enumerate() {
                    if i > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    snapshots.push(self.process_snapshot(domain, record, options).await);
                }
                snapshots
            }
            Pacing::Concurrent { limit } => {
                stream::iter(records)
                    .map(|record| self.process_snapshot(domain, record, options))
                    .buffered(limit.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
        };

        let result = DomainResult { domain: domain.to_string(), category, snapshots };
        tracing::info!(
            domain,
            snapshots = result.snapshots.len(),
            failed = result.error_count(),
            "domain processed"
        );
        Ok(result)
    }

    async fn process_snapshot(&self, domain: &str, record: SnapshotRecord, options: &ProcessOptions) -> SnapshotResult {
        let archive_url = match record.archive_url(&self.archive_base) {
            Ok(url) => url,
            Err(e) => return SnapshotResult::failed(record, String::new(), e.to_string()),
        };

        let page = match self
            .fetcher
            .fetch(&archive_url, &FetchOptions::with_timeout(self.config.document_timeout))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(domain, timestamp = %record.timestamp, error = %e, "snapshot fetch failed");
                return SnapshotResult::failed(record, archive_url.to_string(), e.to_string());
            }
        };

        let metadata = extract_metadata(&page.body);
        let html = self.cleaned_html(&page.body);

        let verdict = if options.classify && !metadata.title.is_empty() {
            Some(self.classify_page(domain, &metadata, options.remote.as_ref()).await)
        } else {
            None
        };

        SnapshotResult {
            record,
            metadata,
            archive_url: archive_url.to_string(),
            category: verdict.as_ref().map(|v| v.label.clone()),
            suspicious: verdict.as_ref().map(|v| v.suspicious),
            error: None,
            html,
        }
    }

    /// Heuristic first, then the remote tier if present; remote errors are logged and dropped.
    async fn classify_page(
        &self, domain: &str, metadata: &ExtractedMetadata, remote: Option<&RemoteClassifier>,
    ) -> Verdict {
        let heuristic = self.heuristic.classify(domain, &metadata.title, &metadata.description);

        let remote_label = match remote {
            Some(remote) => match remote.classify(domain, &metadata.title, &metadata.description).await {
                Ok(label) => Some(label),
                Err(e) => {
                    tracing::warn!(domain, error = %e, "remote classification failed, keeping heuristic label");
                    None
                }
            },
            None => None,
        };

        classify::resolve(heuristic, remote_label)
    }

    #[cfg(feature = "cleanup")]
    fn cleaned_html(&self, body: &str) -> Option<String> {
        self.config.keep_cleaned_html.then(|| crate::cleanup::strip_archive_chrome(body))
    }

    #[cfg(not(feature = "cleanup"))]
    fn cleaned_html(&self, _body: &str) -> Option<String> {
        None
    }
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| WaymarkError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WaymarkError::InvalidUrl(format!("{}: scheme must be http or https", raw)));
    }
    Ok(url)
}
