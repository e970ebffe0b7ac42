mod echo;
mod output;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;
use waymark_core::classify::remote::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_CLASSIFIER_URL};
use waymark_core::index::{DEFAULT_ARCHIVE_BASE, DEFAULT_INDEX_ENDPOINT};
use waymark_core::{
    BatchLimits, BatchRequest, LineDecoder, Pacing, Processor, ProcessorConfig, RemoteClassifier, drive_batch,
};

use crate::output::{EventSink, OutputFormat};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Streaming endpoint of a waymark server.
const STREAM_PATH: &str = "/api/snapshots/stream";

/// Retrieve a domain's archived snapshots and extract their page metadata
#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(version)]
#[command(about = "Extract page metadata from a domain's archived snapshots", long_about = None)]
struct Args {
    /// Domains to look up (scheme and path are ignored)
    #[arg(value_name = "DOMAINS", required = true)]
    domains: Vec<String>,

    /// Number of most recent snapshots per domain
    #[arg(short = 'n', long, default_value = "10", value_name = "NUM")]
    count: u32,

    /// Skip snapshots whose content is identical to the previous one
    #[arg(long)]
    dedupe: bool,

    /// Label each page as clean or suspicious
    #[arg(long)]
    classify: bool,

    /// Credential for the remote classifier; without it only the keyword heuristic runs
    #[arg(long, env = "WAYMARK_API_KEY", hide_env_values = true, value_name = "KEY")]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completion API
    #[arg(long, default_value = DEFAULT_CLASSIFIER_URL, value_name = "URL")]
    classifier_url: String,

    /// Model used by the remote classifier
    #[arg(long, default_value = DEFAULT_CLASSIFIER_MODEL, value_name = "MODEL")]
    classifier_model: String,

    /// Output format (ndjson, json)
    #[arg(short, long, default_value = "ndjson", value_name = "FORMAT")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Snapshots fetched at once per domain; 0 fetches one at a time with --delay-ms between them
    #[arg(long, default_value = "0", value_name = "NUM")]
    concurrency: usize,

    /// Pause between snapshot fetches in sequential mode
    #[arg(long, default_value = "150", value_name = "MS")]
    delay_ms: u64,

    /// Domains processed at once
    #[arg(long, default_value = "4", value_name = "NUM")]
    parallel: usize,

    /// Archive index endpoint
    #[arg(long, default_value = DEFAULT_INDEX_ENDPOINT, value_name = "URL")]
    index_url: String,

    /// Base URL archived documents are fetched from
    #[arg(long, default_value = DEFAULT_ARCHIVE_BASE, value_name = "URL")]
    archive_base: String,

    /// Read the progress stream of a running waymark server instead of processing locally
    #[arg(long, value_name = "URL")]
    remote: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn request(&self) -> BatchRequest {
        BatchRequest {
            domains: self.domains.clone(),
            count: self.count,
            dedupe: self.dedupe,
            classify: self.classify,
            credential: self.api_key.clone(),
        }
    }

    fn processor_config(&self) -> ProcessorConfig {
        let pacing = if self.concurrency == 0 {
            Pacing::Sequential { delay: Duration::from_millis(self.delay_ms) }
        } else {
            Pacing::Concurrent { limit: self.concurrency }
        };

        ProcessorConfig::builder()
            .index_endpoint(&self.index_url)
            .archive_base(&self.archive_base)
            .pacing(pacing)
            .max_parallel_domains(self.parallel)
            .build()
    }

    fn remote_classifier(&self, credential: Option<&str>) -> Option<RemoteClassifier> {
        credential.map(|key| {
            RemoteClassifier::new(key)
                .with_base_url(&self.classifier_url)
                .with_model(&self.classifier_model)
        })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "waymark=debug,waymark_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        echo::print_banner();
    }

    let request = args
        .request()
        .validate(&BatchLimits::default())
        .context("Invalid request")?;

    let mut sink = EventSink::open(args.output.as_deref(), args.format, args.verbose, request.domains.len()).await?;
    let started = Instant::now();

    match &args.remote {
        Some(server) => consume_remote(server, &request, &mut sink).await?,
        None => run_local(&args, &request, &mut sink).await?,
    }

    let summary = sink.finish().await?;

    if args.verbose {
        echo::print_summary(&summary, started.elapsed());
    }
    if let Some(path) = &args.output {
        echo::print_success(&format!("Output written to {}", path.display()));
    }
    if summary.total > 0 && summary.failed == summary.total {
        anyhow::bail!("All {} domains failed", summary.total);
    }

    Ok(())
}

/// Runs the pipeline in-process, writing events as domains progress.
async fn run_local(args: &Args, request: &BatchRequest, sink: &mut EventSink) -> anyhow::Result<()> {
    let processor = Processor::new(args.processor_config()).context("Failed to configure processor")?;
    tracing::debug!(config = ?processor.config(), "processing locally");
    let options = request.process_options(args.remote_classifier(request.credential.as_deref()));

    let (tx, mut rx) = mpsc::channel(64);
    let driver = drive_batch(&processor, request.domains.clone(), &options, tx);
    let writer = async move {
        while let Some(event) = rx.recv().await {
            sink.accept(event).await?;
        }
        Ok::<(), anyhow::Error>(())
    };

    let (_, written) = tokio::join!(driver, writer);
    written
}

/// Posts the request to a server and decodes its NDJSON reply chunk by chunk.
async fn consume_remote(server: &str, request: &BatchRequest, sink: &mut EventSink) -> anyhow::Result<()> {
    let url = Url::parse(server)
        .and_then(|base| base.join(STREAM_PATH))
        .with_context(|| format!("Invalid server URL: {}", server))?;
    tracing::debug!(%url, domains = request.domains.len(), "consuming remote stream");

    let response = reqwest::Client::new()
        .post(url.clone())
        .json(request)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Server rejected the request ({}): {}", status, body.trim());
    }

    let mut decoder = LineDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Stream interrupted")?;
        for event in decoder.push(&chunk) {
            sink.accept(event).await?;
        }
    }
    if let Some(event) = decoder.finish() {
        sink.accept(event).await?;
    }

    if decoder.skipped() > 0 {
        echo::print_warning(&format!("Skipped {} malformed stream lines", decoder.skipped()));
    }

    Ok(())
}
