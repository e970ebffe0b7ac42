//! Batch requests and the drivers that run them.
//!
//! A [`BatchRequest`] is validated against [`BatchLimits`] before any network
//! call. [`drive_batch`] then runs its domains with bounded parallelism and
//! reports each one through the progress stream; [`run_bulk`] collects the
//! same events into a single [`BulkResponse`].

use std::fmt;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::classify::RemoteClassifier;
use crate::processor::{DomainResult, ProcessOptions, Processor};
use crate::stream::StreamEvent;
use crate::{Result, WaymarkError};

/// Default cap on domains per request.
pub const DEFAULT_MAX_DOMAINS: usize = 50;

/// Default cap on captures per domain.
pub const DEFAULT_MAX_COUNT: u32 = 50;

const EVENT_BUFFER: usize = 64;

fn default_count() -> u32 {
    10
}

/// Upper bounds enforced by [`BatchRequest::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_domains: usize,
    pub max_count: u32,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self { max_domains: DEFAULT_MAX_DOMAINS, max_count: DEFAULT_MAX_COUNT }
    }
}

/// Inbound batch request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub dedupe: bool,
    #[serde(default)]
    pub classify: bool,
    /// Credential for the remote classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("domains", &self.domains)
            .field("count", &self.count)
            .field("dedupe", &self.dedupe)
            .field("classify", &self.classify)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BatchRequest {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            count: default_count(),
            dedupe: false,
            classify: false,
            credential: None,
        }
    }

    /// Normalizes the domain list and checks it against `limits`.
    ///
    /// Domains are trimmed and lowercased, with scheme, path, query and
    /// fragment stripped. Blank entries and repeats are dropped.
    pub fn validate(mut self, limits: &BatchLimits) -> Result<Self> {
        let mut domains: Vec<String> = Vec::with_capacity(self.domains.len());
        for domain in self.domains.iter().filter_map(|d| normalize_domain(d)) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }

        if domains.is_empty() {
            return Err(WaymarkError::InvalidRequest("at least one domain is required".to_string()));
        }
        if domains.len() > limits.max_domains {
            return Err(WaymarkError::InvalidRequest(format!(
                "too many domains: {} (maximum {})",
                domains.len(),
                limits.max_domains
            )));
        }
        if self.count == 0 || self.count > limits.max_count {
            return Err(WaymarkError::InvalidRequest(format!(
                "count must be between 1 and {}, got {}",
                limits.max_count, self.count
            )));
        }

        self.domains = domains;
        Ok(self)
    }

    /// Processing options for this request. `remote` is only kept when
    /// classification was asked for.
    pub fn process_options(&self, remote: Option<RemoteClassifier>) -> ProcessOptions {
        ProcessOptions {
            count: self.count,
            dedupe: self.dedupe,
            classify: self.classify,
            remote: if self.classify { remote } else { None },
        }
    }
}

/// Reduces user input such as `https://Example.com/path?q` to `example.com`.
///
/// Returns `None` when nothing is left.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let mut rest = raw.trim();
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    }

    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = rest[..end].trim().trim_end_matches('.').to_lowercase();

    if host.is_empty() { None } else { Some(host) }
}

/// Outcome counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// A domain that produced an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkError {
    pub domain: String,
    pub error: String,
}

/// Aggregated reply of the non-streaming variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub data: Vec<DomainResult>,
    pub errors: Vec<BulkError>,
    pub meta: BatchSummary,
}

/// Runs every domain and reports it on `events`.
///
/// At most `max_parallel_domains` domains are in flight. Each emits
/// `progress` right before it starts and one terminal event when it ends;
/// completion order across domains is not fixed. Once the receiver is gone
/// no further domain is started; those already running finish and their
/// events are discarded.
pub async fn drive_batch(
    processor: &Processor, domains: Vec<String>, options: &ProcessOptions, events: mpsc::Sender<StreamEvent>,
) -> BatchSummary {
    let total = domains.len();
    let limit = processor.config().max_parallel_domains.max(1);
    tracing::info!(domains = total, parallel = limit, "batch started");

    let outcomes = stream::iter(domains)
        .map(|domain| {
            let events = events.clone();
            async move {
                if events.is_closed() || events.send(StreamEvent::Progress { domain: domain.clone() }).await.is_err() {
                    return None;
                }

                let event = match processor.process(&domain, options).await {
                    Ok(data) => StreamEvent::Result { data },
                    Err(e) => {
                        tracing::warn!(domain = %domain, error = %e, "domain failed");
                        StreamEvent::Error { domain, message: e.to_string() }
                    }
                };
                let succeeded = !matches!(event, StreamEvent::Error { .. });

                if events.send(event).await.is_err() {
                    tracing::debug!("stream receiver dropped, discarding event");
                }
                Some(succeeded)
            }
        })
        .buffer_unordered(limit)
        .collect::<Vec<Option<bool>>>()
        .await;

    let successful = outcomes.iter().filter(|o| **o == Some(true)).count();
    let failed = outcomes.iter().filter(|o| **o == Some(false)).count();
    tracing::info!(total, successful, failed, "batch finished");

    BatchSummary { total, successful, failed }
}

/// Runs a batch and aggregates its events; `data` and `errors` are sorted by domain.
pub async fn run_bulk(processor: &Processor, domains: Vec<String>, options: &ProcessOptions) -> BulkResponse {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

    let driver = drive_batch(processor, domains, options, tx);
    let collector = async {
        let mut data = Vec::new();
        let mut errors = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Result { data: result } => data.push(result),
                StreamEvent::Error { domain, message } => errors.push(BulkError { domain, error: message }),
                StreamEvent::Progress { .. } => {}
            }
        }
        (data, errors)
    };

    let (meta, (mut data, mut errors)) = tokio::join!(driver, collector);
    data.sort_by(|a, b| a.domain.cmp(&b.domain));
    errors.sort_by(|a, b| a.domain.cmp(&b.domain));

    BulkResponse { data, errors, meta }
}
