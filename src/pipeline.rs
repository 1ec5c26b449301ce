//! Pipeline commands: wire loader, splitter, indexer and query engine
//! together for the CLI.
//!
//! [`ingest`] and [`answer`] return their results for library callers;
//! the `run_*` functions print them the way the `docrag` binary shows them.

use anyhow::Result;
use tracing::{info, warn};

use crate::chunk;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::indexer;
use crate::loader;
use crate::models::{Chunk, Document, ExportMode, QueryResult};
use crate::query::QueryEngine;
use crate::store::SqliteStore;

/// Per-invocation overrides for `docrag ingest`.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub export_mode: Option<ExportMode>,
    pub overwrite: Option<bool>,
    pub dry_run: bool,
}

/// What an ingest run produced.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// `None` for a dry run.
    pub dims: Option<usize>,
    pub entries_written: usize,
    pub store: String,
}

/// Loads `source` and splits every document into chunks.
pub async fn load_and_split(
    config: &Config,
    source: &str,
    export_mode: ExportMode,
) -> Result<(Vec<Document>, Vec<Chunk>)> {
    let docs = loader::load(source, export_mode, &config.loader).await?;
    let chunks: Vec<Chunk> = docs
        .iter()
        .flat_map(|doc| chunk::split(doc, config.chunking.max_tokens))
        .collect();
    Ok((docs, chunks))
}

/// Load, split, embed and index `source` into the configured store.
pub async fn ingest(config: &Config, source: &str, opts: &IngestOptions) -> Result<IngestReport> {
    let export_mode = opts.export_mode.unwrap_or(config.loader.export_mode);
    let (docs, chunks) = load_and_split(config, source, export_mode).await?;

    let mut store_config = config.store.clone();
    if let Some(overwrite) = opts.overwrite {
        store_config.overwrite = overwrite;
    }

    if opts.dry_run {
        return Ok(IngestReport {
            documents: docs.len(),
            chunks: chunks.len(),
            dims: None,
            entries_written: 0,
            store: store_config.path().display().to_string(),
        });
    }

    let embedder = create_provider(&config.embedding)?;
    let handle = indexer::build(
        &chunks,
        embedder.as_ref(),
        &store_config,
        config.embedding.batch_size,
    )
    .await?;

    let report = IngestReport {
        documents: docs.len(),
        chunks: chunks.len(),
        dims: Some(handle.dims),
        entries_written: handle.entries_written,
        store: handle.store.path().display().to_string(),
    };
    handle.store.close().await;
    Ok(report)
}

/// Answers `question` from the configured store.
pub async fn answer(config: &Config, question: &str, top_k: Option<usize>) -> Result<QueryResult> {
    let store = SqliteStore::open_existing(&config.store).await?;
    let embedder = create_provider(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    if let Some(built_with) = store.summary().await?.model {
        if built_with != embedder.model_name() {
            warn!(
                store_model = %built_with,
                query_model = embedder.model_name(),
                "store was built with a different embedding model"
            );
        }
    }

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let engine = QueryEngine::new(&store, embedder.as_ref(), generator.as_ref())
        .with_template(config.retrieval.prompt_template.clone());
    let result = engine.query(question, top_k).await;

    store.close().await;
    result
}

pub async fn run_ingest(config: &Config, source: &str, opts: &IngestOptions) -> Result<()> {
    if opts.dry_run {
        println!("ingest {} (dry-run)", source);
    } else {
        println!("ingest {}", source);
    }

    let report = ingest(config, source, opts).await?;

    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    if let Some(dims) = report.dims {
        println!("  dims: {}", dims);
        println!("  entries written: {}", report.entries_written);
        println!("  store: {}", report.store);
    }
    println!("ok");

    info!(
        source,
        documents = report.documents,
        chunks = report.chunks,
        dry_run = opts.dry_run,
        "ingest finished"
    );
    Ok(())
}

pub async fn run_query(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let result = answer(config, question, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    println!();
    println!("Sources:");
    for (i, source) in result.sources.iter().enumerate() {
        let meta = &source.metadata;
        let mut line = format!("  {}. {}", i + 1, meta.file_name);
        if let Some(page) = meta.page {
            line.push_str(&format!(" p.{}", page));
        }
        if !meta.headings.is_empty() {
            line.push_str(&format!(" [{}]", meta.headings.join(" > ")));
        }
        println!("{}  (score {:.3})", line, source.score);
        println!("     {}", excerpt(&source.text, 160));
    }
    Ok(())
}

pub async fn run_chunks(config: &Config, source: &str, export_mode: Option<ExportMode>) -> Result<()> {
    let export_mode = export_mode.unwrap_or(config.loader.export_mode);
    let (docs, chunks) = load_and_split(config, source, export_mode).await?;

    for chunk in &chunks {
        let meta = &chunk.metadata;
        let page = meta.page.map_or_else(|| "-".to_string(), |p| p.to_string());
        let span = meta
            .char_span
            .map_or_else(|| "-".to_string(), |s| format!("{}..{}", s.start, s.end));
        println!(
            "[{}#{}] page={} span={} headings={}",
            meta.file_name,
            chunk.chunk_index,
            page,
            span,
            meta.headings.join(" > ")
        );
        println!("    {}", excerpt(&chunk.text, 100));
    }
    println!();
    println!("{} documents, {} chunks ({})", docs.len(), chunks.len(), export_mode);
    Ok(())
}

/// First `max_chars` characters of `text` on one line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n\n b\tc", 10), "a b c");
        assert_eq!(excerpt("abcdef ghij", 7), "abcdef...");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
