//! Ingest one document from the command line
//!
//! Run with: cargo run -p doc-ingest -- ./contracts/msa.docx --tag owner=legal

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_ingest::ingestion::{ExtractorRegistry, O200kTokenCounter, TokenCounter};
use doc_ingest::providers::{self, DocumentStore, LocalDocumentStore};
use doc_ingest::{
    CancelToken, DataPipeline, ExtractionHandler, InProcessOrchestrator, IngestConfig, ReturnType, SummarizationHandler,
    TagCollection, TaggingHandler,
};

#[derive(Parser, Debug)]
#[command(name = "doc-ingest", version, about = "Extract, summarize and tag a document")]
struct Args {
    /// Document to ingest
    file: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target index (overrides pipeline.index)
    #[arg(short, long)]
    index: Option<String>,

    /// Extra tag as key=value; repeatable
    #[arg(short, long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Comma-separated steps (overrides pipeline.steps)
    #[arg(short, long, value_delimiter = ',')]
    steps: Vec<String>,

    /// Continue the saved run of this document instead of starting over
    #[arg(long)]
    resume: bool,
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, tag)) if !key.trim().is_empty() => Ok((key.trim().to_string(), tag.trim().to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "doc_ingest=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => IngestConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => IngestConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(index) = &args.index {
        config.pipeline.index = index.clone();
    }
    if !args.steps.is_empty() {
        config.pipeline.steps = args.steps.clone();
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Index: {}", config.pipeline.index);
    tracing::info!("  - Steps: {}", config.pipeline.steps.join(", "));
    tracing::info!("  - Storage: {}", config.storage.root_dir.display());

    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("Input path has no file name")?;
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let store: Arc<dyn DocumentStore> = Arc::new(LocalDocumentStore::new(config.storage.root_dir.clone())?);
    let generator = providers::text_generator_from_config(&config.llm)?;
    if !generator.health_check().await.unwrap_or(false) {
        tracing::warn!("Text generator {} is not reachable at {}", generator.name(), config.llm.base_url);
    }

    let mut orchestrator = InProcessOrchestrator::new(store, generator);
    let services = orchestrator.services();
    let counter: Arc<dyn TokenCounter> = Arc::new(O200kTokenCounter::new()?);

    let ocr = providers::ocr_service_from_config(&config.ocr)?;
    orchestrator.add_handler(Arc::new(ExtractionHandler::new(
        services.clone(),
        ExtractorRegistry::with_defaults(&config.extraction, ocr),
    )));
    orchestrator.add_handler(Arc::new(SummarizationHandler::new(
        services.clone(),
        counter.clone(),
        config.summarization.clone(),
    )));
    orchestrator.add_handler(Arc::new(TaggingHandler::new(services, counter, config.tagging.clone())));

    let document_id = DataPipeline::document_id_from_file_name(&file_name);
    let index = config.pipeline.index.clone();

    let previous = if args.resume {
        orchestrator.read_pipeline_status(&index, &document_id).await?
    } else {
        None
    };

    let mut pipeline = match previous {
        Some(pipeline) => {
            tracing::info!(
                "Resuming {}/{} with {} remaining step(s)",
                index,
                document_id,
                pipeline.remaining_steps().len()
            );
            pipeline
        }
        None => {
            let mut tags: TagCollection = config.pipeline.tags.clone();
            for (key, value) in &args.tags {
                tags.add(key.as_str(), value.as_str());
            }

            let mut builder = orchestrator
                .prepare_new_document_upload(index, document_id, tags)
                .add_upload_file(file_name.clone(), file_name.clone(), Bytes::from(data));
            for step in &config.pipeline.steps {
                builder = builder.then(step.as_str());
            }
            builder.build()
        }
    };

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current suspension point");
            ctrl_c.cancel();
        }
    });

    let result = orchestrator.run_pipeline(&mut pipeline, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&pipeline)?);

    if result != ReturnType::Success {
        bail!(
            "Pipeline stopped with {:?}; pending steps: {}",
            result,
            pipeline.remaining_steps().join(", ")
        );
    }
    Ok(())
}
