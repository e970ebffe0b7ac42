use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use waymark_core::classify::remote::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_CLASSIFIER_URL};
use waymark_core::{BatchLimits, Pacing, ProcessorConfig};

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DELAY_MS: u64 = 150;

/// Remote classifier settings shared by every request.
#[derive(Clone)]
pub struct ClassifierSettings {
    pub base_url: String,
    pub model: String,
    /// Used when a request asks for classification without its own credential.
    pub default_key: Option<String>,
}

impl std::fmt::Debug for ClassifierSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("default_key", &self.default_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub processor: ProcessorConfig,
    pub limits: BatchLimits,
    pub classifier: ClassifierSettings,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("WAYMARK_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("WAYMARK_BIND must be a socket address")?;

        let mut processor = ProcessorConfig::builder();
        if let Some(url) = lookup("WAYMARK_INDEX_URL") {
            processor = processor.index_endpoint(url);
        }
        if let Some(url) = lookup("WAYMARK_ARCHIVE_BASE") {
            processor = processor.archive_base(url);
        }
        if let Some(parallel) = parse_var::<usize, _>(&lookup, "WAYMARK_PARALLEL_DOMAINS")? {
            processor = processor.max_parallel_domains(parallel);
        }

        let concurrency = parse_var::<usize, _>(&lookup, "WAYMARK_CONCURRENCY")?.unwrap_or(0);
        let delay_ms = parse_var::<u64, _>(&lookup, "WAYMARK_DELAY_MS")?.unwrap_or(DEFAULT_DELAY_MS);
        let pacing = if concurrency == 0 {
            Pacing::Sequential { delay: Duration::from_millis(delay_ms) }
        } else {
            Pacing::Concurrent { limit: concurrency }
        };

        let defaults = BatchLimits::default();
        let limits = BatchLimits {
            max_domains: parse_var(&lookup, "WAYMARK_MAX_DOMAINS")?.unwrap_or(defaults.max_domains),
            max_count: parse_var(&lookup, "WAYMARK_MAX_COUNT")?.unwrap_or(defaults.max_count),
        };

        let classifier = ClassifierSettings {
            base_url: lookup("WAYMARK_CLASSIFIER_URL").unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string()),
            model: lookup("WAYMARK_CLASSIFIER_MODEL").unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            default_key: lookup("WAYMARK_CLASSIFIER_KEY").filter(|key| !key.trim().is_empty()),
        };

        Ok(Self { bind, processor: processor.pacing(pacing).build(), limits, classifier })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("{} must be a number, got {:?}", key, value))
        })
        .transpose()
}
