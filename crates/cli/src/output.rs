use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use waymark_core::{BatchSummary, BulkError, BulkResponse, StreamEvent};

use crate::echo;

/// Output format for batch results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One event per line, written as it happens.
    Ndjson,
    /// A single aggregated document at the end.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid format: {}. Valid options: ndjson, json", s)),
        }
    }
}

/// Receives stream events and writes them in the chosen format.
pub struct EventSink {
    format: OutputFormat,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    verbose: bool,
    response: BulkResponse,
}

impl EventSink {
    /// Writes to `path`, or stdout when `None`.
    pub async fn open(path: Option<&Path>, format: OutputFormat, verbose: bool, total: usize) -> anyhow::Result<Self> {
        let writer: Box<dyn AsyncWrite + Unpin + Send> = match path {
            Some(path) => Box::new(
                tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?,
            ),
            None => Box::new(tokio::io::stdout()),
        };

        Ok(Self {
            format,
            writer,
            verbose,
            response: BulkResponse {
                data: Vec::new(),
                errors: Vec::new(),
                meta: BatchSummary { total, ..Default::default() },
            },
        })
    }

    pub async fn accept(&mut self, event: StreamEvent) -> anyhow::Result<()> {
        match &event {
            StreamEvent::Progress { domain } => {
                if self.verbose {
                    echo::print_progress(domain);
                }
            }
            StreamEvent::Result { data } => {
                self.response.meta.successful += 1;
                if self.verbose {
                    echo::print_domain_result(data);
                }
            }
            StreamEvent::Error { domain, message } => {
                self.response.meta.failed += 1;
                echo::print_error(&format!("{}: {}", domain, message));
            }
        }

        match self.format {
            OutputFormat::Ndjson => {
                let line = event.to_line()?;
                self.writer
                    .write_all(line.as_bytes())
                    .await
                    .context("Failed to write output")?;
                self.writer.flush().await.context("Failed to write output")?;
            }
            OutputFormat::Json => match event {
                StreamEvent::Result { data } => self.response.data.push(data),
                StreamEvent::Error { domain, message } => self.response.errors.push(BulkError { domain, error: message }),
                StreamEvent::Progress { .. } => {}
            },
        }

        Ok(())
    }

    /// Writes the aggregated document in JSON mode and flushes.
    pub async fn finish(mut self) -> anyhow::Result<BatchSummary> {
        if self.format == OutputFormat::Json {
            self.response.data.sort_by(|a, b| a.domain.cmp(&b.domain));
            self.response.errors.sort_by(|a, b| a.domain.cmp(&b.domain));

            let mut json = serde_json::to_string_pretty(&self.response).context("Failed to serialize results")?;
            json.push('\n');
            self.writer
                .write_all(json.as_bytes())
                .await
                .context("Failed to write output")?;
        }

        self.writer.flush().await.context("Failed to write output")?;
        Ok(self.response.meta)
    }
}
