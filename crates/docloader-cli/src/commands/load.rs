//! Load command implementation

use clap::Args;
use docloader_core::engine::{ElasticClient, MemoryEngine, SearchEngine};
use docloader_core::index::{
    BatchLimits, CoordinatorConfig, IndexingCoordinator, IngestMode, Preparation, Report,
    RetryPolicy,
};
use docloader_core::source::{DirectorySourceOptions, open_source};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Data directory or NDJSON file (default: ./data)
    #[arg(default_value = "data")]
    pub path: PathBuf,

    /// Target index name
    #[arg(short, long, default_value = "recettes")]
    pub index: String,

    /// Ingestion mode: bulk or stream
    #[arg(short, long, default_value = "bulk")]
    pub mode: String,

    /// Keep the existing index instead of recreating it
    #[arg(long)]
    pub append: bool,

    /// Maximum documents per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Maximum bytes per batch
    #[arg(long)]
    pub batch_bytes: Option<usize>,

    /// Maximum batches in flight
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Attempts per batch on transport failures
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Retries allowed across the whole run
    #[arg(long)]
    pub retry_budget: Option<usize>,

    /// Payload field to use as the document id
    #[arg(long)]
    pub id_field: Option<String>,

    /// File extensions to load from a directory (repeatable)
    #[arg(short, long = "extension", default_value = "json")]
    pub extensions: Vec<String>,

    /// Directory walk depth (0 = unlimited)
    #[arg(long, default_value = "1")]
    pub depth: usize,

    /// Don't refresh the index after loading
    #[arg(long)]
    pub no_refresh: bool,

    /// Load into an in-memory engine instead of the search engine
    #[arg(long)]
    pub dry_run: bool,

    /// Write failed, skipped and unsubmitted documents to this JSON file
    #[arg(long)]
    pub failures_out: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadArgs {
    fn coordinator_config(&self) -> anyhow::Result<CoordinatorConfig> {
        let mode: IngestMode = self
            .mode
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid mode: {}", e))?;

        let defaults = CoordinatorConfig::default();
        let limits = BatchLimits {
            max_documents: self.batch_size.unwrap_or(defaults.limits.max_documents),
            max_bytes: self.batch_bytes.unwrap_or(defaults.limits.max_bytes),
        };
        let retry = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.retry.max_attempts),
            retry_budget: self.retry_budget.unwrap_or(defaults.retry.retry_budget),
            ..defaults.retry
        };

        Ok(CoordinatorConfig {
            index_name: self.index.clone(),
            mode,
            preparation: if self.append {
                Preparation::Append
            } else {
                Preparation::Recreate
            },
            limits,
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            retry,
            refresh: !self.no_refresh,
            ..defaults
        })
    }

    fn source_options(&self) -> DirectorySourceOptions {
        DirectorySourceOptions {
            extensions: self.extensions.clone(),
            max_depth: (self.depth > 0).then_some(self.depth),
            id_field: self.id_field.clone(),
            ..Default::default()
        }
    }
}

pub async fn run(args: LoadArgs, url: Option<&str>, timeout: Duration) -> anyhow::Result<()> {
    let config = args.coordinator_config()?;

    let report = if args.dry_run {
        info!("Dry run: loading into an in-memory engine");
        load(&args, Arc::new(MemoryEngine::new()), config).await?
    } else {
        let engine = ElasticClient::new(url, timeout)?;
        info!("Using engine at {}", engine.base_url());
        load(&args, Arc::new(engine), config).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", report);
    }

    if let Some(path) = &args.failures_out {
        write_failures(path, &report)?;
        println!(
            "Wrote {} failed, {} skipped and {} unsubmitted documents to {:?}",
            report.failed, report.skipped, report.not_submitted, path
        );
    }

    match &report.abort_reason {
        Some(reason) => Err(anyhow::anyhow!("Indexing aborted: {}", reason)),
        None => Ok(()),
    }
}

async fn load<E: SearchEngine>(
    args: &LoadArgs,
    engine: Arc<E>,
    config: CoordinatorConfig,
) -> anyhow::Result<Report> {
    let source = open_source(&args.path, args.source_options())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    info!("Interrupted, finishing in-flight batches");
                    on_signal.cancel();
                }
            }
            _ = on_signal.cancelled() => {}
        }
    });

    let coordinator = IndexingCoordinator::new(engine, config);
    let report = coordinator.run(source, cancel.clone()).await;
    // Stop the signal listener from outliving the run
    cancel.cancel();

    Ok(report)
}

/// Dump everything that did not make it into the index so it can be re-run
fn write_failures(path: &Path, report: &Report) -> anyhow::Result<()> {
    let subset = serde_json::json!({
        "index": report.index_name,
        "state": report.state,
        "failures": report.failures,
        "skips": report.skips,
        "unsubmitted": report.unsubmitted,
    });
    std::fs::write(path, serde_json::to_string_pretty(&subset)?)?;
    Ok(())
}
