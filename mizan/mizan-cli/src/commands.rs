//! Command implementations.

use crate::output::{self, OutputFormat};
use crate::workspace::Workspace;
use anyhow::{Context, Result, bail};
use comfy_table::Cell;
use mizan_core::config::MizanConfig;
use mizan_core::language::Language;
use mizan_core::traits::VectorStore;
use mizan_core::types::{DocumentSource, MetadataFilter};
use mizan_ingestion::chunker::SentenceChunker;
use mizan_ingestion::embeddings::{EmbeddingService, ProgressCallback};
use mizan_ingestion::extractor::ExtractionCascade;
use mizan_ingestion::ingester::IngestionOrchestrator;
use mizan_semantic::generation::BackendPreference;
use mizan_semantic::orchestration::{QueryOrchestrator, QueryRequest, create_translator};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

async fn read_sources(files: &[PathBuf], source_label: &str) -> Result<Vec<DocumentSource>> {
    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        sources.push(DocumentSource::new(file_name, source_label, bytes));
    }
    Ok(sources)
}

/// Ingest files under one source label and save the workspace.
pub async fn ingest(
    config: MizanConfig,
    files: Vec<PathBuf>,
    source_label: String,
    format: OutputFormat,
) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }

    let workspace = Workspace::open(config).await?;
    let config = &workspace.config;
    let http_timeout = Duration::from_secs(config.providers.http_timeout_secs);

    let mut embeddings = EmbeddingService::with_provider(workspace.embedder.clone());
    if config.retrieval.translate_chunks {
        if config.providers.translator_url.is_none() {
            warn!("retrieval.translate_chunks is set but no translator is configured");
        }
        embeddings = embeddings.with_translation(
            create_translator(&config.providers)?,
            config.retrieval.index_language,
        );
    }

    let orchestrator = IngestionOrchestrator::new(
        ExtractionCascade::from_config(&config.extraction, http_timeout)?,
        SentenceChunker::from_config(&config.chunking)?,
        embeddings,
        workspace.store.clone(),
        workspace.repository.clone(),
    );

    let sources = read_sources(&files, &source_label).await?;
    let pb = output::progress_bar(
        sources.len() as u64,
        format!("Ingesting into {}", source_label),
        format,
    );
    let progress: ProgressCallback = {
        let pb = pb.clone();
        Arc::new(move |done, _total| pb.set_position(done as u64))
    };

    let coordinator = orchestrator.coordinator().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current document");
            coordinator.cancel();
        }
    });

    let report = orchestrator.ingest_batch(sources, Some(progress)).await;
    interrupt.abort();
    pb.finish_and_clear();
    let report = report?;

    workspace.persist().await?;
    info!("Ingestion finished: {:?}", report.final_state);

    if format.is_json() {
        return output::json(&report);
    }

    for item in &report.succeeded {
        let mut line = format!(
            "{} ({} pages, {} chunks, {} extraction, quality {:.2})",
            item.document.file_name, item.page_count, item.chunk_count, item.method, item.quality
        );
        if item.degraded {
            line.push_str(" [degraded]");
        }
        output::success(line);
    }
    for failure in &report.failed {
        output::error(format!("{}: {}", failure.file_name, failure.error));
    }
    if !report.skipped.is_empty() {
        output::warning(format!("Cancelled; skipped {}", report.skipped.join(", ")));
    }
    output::info(format!(
        "{} indexed, {} failed, {} chunks in index",
        report.succeeded.len(),
        report.failed.len(),
        workspace.store.len().await?
    ));
    Ok(())
}

/// Options for `ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub response_language: Option<String>,
    pub backend: Option<String>,
    pub source: Option<String>,
    pub language: Option<String>,
}

fn parse_language(code: &str) -> Result<Language> {
    Language::from_code(code)
        .with_context(|| format!("unsupported language '{}', expected ar, en or ms", code))
}

/// Answer one question from the indexed sources.
pub async fn ask(
    config: MizanConfig,
    question: String,
    options: AskOptions,
    format: OutputFormat,
) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    if workspace.store.is_empty().await? {
        output::warning("The index is empty; ingest documents first");
    }

    let mut request = QueryRequest::new(question).with_filter(MetadataFilter {
        source_label: options.source,
        language: options.language.as_deref().map(parse_language).transpose()?,
    });
    if let Some(code) = options.response_language.as_deref() {
        request = request.with_response_language(parse_language(code)?);
    }
    if let Some(backend) = options.backend.as_deref() {
        request = request.with_backend(backend.parse::<BackendPreference>()?);
    }

    let orchestrator = QueryOrchestrator::from_config(
        &workspace.config,
        workspace.embedder.clone(),
        workspace.store.clone(),
    )?;
    let response = orchestrator.ask(request).await?;

    if format.is_json() {
        return output::json(&response);
    }

    let answer = &response.answer;
    println!("\n{}\n", answer.text);
    output::kv("Language", answer.response_language.display_name());
    output::kv("Confidence", answer.confidence);
    if let Some(backend) = &answer.backend {
        output::kv("Backend", backend);
    }

    if !answer.citations.is_empty() {
        output::header("Sources");
        let mut table = output::table(["#", "Source", "Title", "Page", "Score", "Excerpt"]);
        for (i, citation) in answer.citations.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(citation.source_label()),
                Cell::new(&citation.chunk.title),
                Cell::new(format!("{} of {}", citation.page_number(), citation.total_pages())),
                Cell::new(format!("{:.2}", citation.rerank_score)),
                Cell::new(output::truncate(&citation.chunk.text, 80)),
            ]);
        }
        println!("{}", table);
    }
    Ok(())
}

/// List stored documents.
pub async fn documents(config: MizanConfig, format: OutputFormat) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let records = workspace.documents();

    if format.is_json() {
        return output::json(&records);
    }
    if records.is_empty() {
        output::info("No documents ingested");
        return Ok(());
    }

    let mut table =
        output::table(["Source", "File", "Status", "Language", "Extraction", "Quality"]);
    for record in &records {
        let doc = &record.document;
        table.add_row(vec![
            Cell::new(&doc.source_label),
            Cell::new(&doc.file_name),
            Cell::new(&record.status),
            Cell::new(doc.language.code()),
            Cell::new(&doc.extraction_method),
            Cell::new(format!(
                "{:.2}{}",
                doc.extraction_quality,
                if doc.extraction_degraded { " (degraded)" } else { "" }
            )),
        ]);
    }
    println!("{}", table);
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &MizanConfig, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        return output::json(&json!({
            "config": config,
            "snapshot_path": config.snapshot_path(),
        }));
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}
