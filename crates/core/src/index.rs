//! Archive index queries.
//!
//! Builds the "last N captures of a domain" request against a CDX-style
//! index API and decodes its tabular JSON reply into [`SnapshotRecord`]s.
//!
//! # Example
//!
//! ```rust
//! use url::Url;
//! use waymark_core::index::IndexQuery;
//!
//! let endpoint = Url::parse("https://web.archive.org/cdx/search/cdx").unwrap();
//! let url = IndexQuery::new("example.com", 5).dedupe(true).to_url(&endpoint);
//! assert!(url.as_str().contains("limit=-5"));
//! assert!(url.as_str().contains("collapse=digest"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::PrimitiveDateTime;
use time::format_description;
use url::Url;

use crate::{Result, WaymarkError};

/// Default CDX endpoint of the Wayback Machine.
pub const DEFAULT_INDEX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

/// Default base URL for archived documents.
pub const DEFAULT_ARCHIVE_BASE: &str = "https://web.archive.org";

/// Field list requested from the index, in column order.
pub const INDEX_FIELDS: [&str; 6] = ["timestamp", "original", "mimetype", "statuscode", "digest", "length"];

/// One capture listed by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    /// Capture time as `YYYYMMDDHHMMSS`.
    pub timestamp: String,
    /// URL as it was captured.
    pub original_url: String,
    pub mime_type: String,
    /// `None` when the index reports `-` (revisit records).
    pub status_code: Option<u16>,
    /// Content digest; identical digests mean identical content.
    pub digest: String,
    /// Compressed record length, when known.
    pub length: Option<u64>,
}

impl SnapshotRecord {
    /// Parses the 14-digit timestamp.
    pub fn captured_at(&self) -> Option<PrimitiveDateTime> {
        let format = format_description::parse("[year][month][day][hour][minute][second]").ok()?;
        PrimitiveDateTime::parse(&self.timestamp, &format).ok()
    }

    /// URL of this capture's unmodified document under `archive_base`.
    pub fn archive_url(&self, archive_base: &Url) -> Result<Url> {
        snapshot_url(archive_base, &self.timestamp, &self.original_url)
    }

    fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() != INDEX_FIELDS.len() {
            return Err(WaymarkError::IndexFormat(format!(
                "expected {} columns, found {}",
                INDEX_FIELDS.len(),
                row.len()
            )));
        }

        Ok(Self {
            timestamp: cell_text(&row[0]),
            original_url: cell_text(&row[1]),
            mime_type: cell_text(&row[2]),
            status_code: cell_text(&row[3]).parse().ok(),
            digest: cell_text(&row[4]),
            length: cell_text(&row[5]).parse().ok(),
        })
    }
}

/// Request descriptor for "the last `count` HTML captures of `domain`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    domain: String,
    count: u32,
    dedupe: bool,
}

impl IndexQuery {
    /// A `count` of 0 is raised to 1; the index reads `limit=-0` as unlimited.
    pub fn new(domain: impl Into<String>, count: u32) -> Self {
        Self { domain: domain.into(), count: count.max(1), dedupe: false }
    }

    /// Collapse consecutive captures sharing a content digest.
    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Builds the request URL against `endpoint`.
    ///
    /// The limit is negative: the index reads `limit=-N` as "the last N rows".
    pub fn to_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("url", &self.domain)
                .append_pair("output", "json")
                .append_pair("filter", "mimetype:text/html")
                .append_pair("filter", "statuscode:200")
                .append_pair("fl", &INDEX_FIELDS.join(","))
                .append_pair("fastLatest", "true")
                .append_pair("limit", &format!("-{}", self.count));
            if self.dedupe {
                pairs.append_pair("collapse", "digest");
            }
        }
        url
    }
}

/// Decodes an index reply.
///
/// The first row is a header naming the columns; it must equal [`INDEX_FIELDS`]
/// and is discarded. An empty body or an empty array means no captures. With
/// `dedupe` set, a row whose digest equals the previous kept row's digest is
/// dropped.
pub fn parse_index_response(body: &str, dedupe: bool) -> Result<Vec<SnapshotRecord>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| WaymarkError::IndexFormat(format!("not a JSON table: {}", e)))?;

    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };

    let header: Vec<String> = header.iter().map(cell_text).collect();
    if header != INDEX_FIELDS {
        return Err(WaymarkError::IndexFormat(format!(
            "unexpected header [{}]",
            header.join(",")
        )));
    }

    let mut records: Vec<SnapshotRecord> = Vec::new();
    for row in rows {
        let record = SnapshotRecord::from_row(&row)?;
        if dedupe && records.last().is_some_and(|prev| prev.digest == record.digest) {
            continue;
        }
        records.push(record);
    }

    Ok(records)
}

/// `archive_base/web/<timestamp>id_/<original_url>`.
///
/// The `id_` flag asks the archive for the document exactly as captured,
/// without the playback rewriting and toolbar.
pub fn snapshot_url(archive_base: &Url, timestamp: &str, original_url: &str) -> Result<Url> {
    let base = archive_base.as_str().trim_end_matches('/');
    let raw = format!("{}/web/{}id_/{}", base, timestamp, original_url);
    Url::parse(&raw).map_err(|e| WaymarkError::InvalidUrl(format!("{}: {}", raw, e)))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
