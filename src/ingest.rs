//! Segment-and-store pipeline for a single source.
//!
//! Indexing is delete-then-recreate: the content is re-segmented and the
//! source's chunks are swapped for the fresh set in one
//! [`Store::replace_chunks`] call, embeddings absent. A failed swap never
//! leaves a partial set behind. When a generator is supplied
//! each chunk is embedded inline; inline failures are non-fatal and leave
//! the chunk for the embedding backfill.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;

use crate::chunk::{segment, should_chunk};
use crate::config::{Config, SegmenterSettings};
use crate::db;
use crate::embedding::{EmbeddingCategory, EmbeddingGenerator};
use crate::error::{Error, Result, ValidationError};
use crate::models::{Chunk, ContentType, Source, TextChunk};
use crate::store::{SqliteStore, Store};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub source_id: String,
    /// Chunks removed before re-segmenting.
    pub chunks_deleted: u64,
    pub chunks_written: u64,
    pub embeddings_written: u64,
    pub embeddings_pending: u64,
}

/// Segment a source's content with the config chosen for its length.
///
/// Returns an empty vector for content that [`should_chunk`] rejects.
pub fn prepare_chunks(
    source: &Source,
    settings: &SegmenterSettings,
) -> std::result::Result<Vec<TextChunk>, ValidationError> {
    let len = source.content.chars().count();
    if !should_chunk(source.content_type, len) {
        return Ok(Vec::new());
    }
    segment(&source.content, source.content_type, &settings.for_length(len))
}

/// Upsert `source` and rebuild its chunks.
pub async fn index_source(
    store: &dyn Store,
    generator: Option<&EmbeddingGenerator>,
    source: &Source,
    settings: &SegmenterSettings,
) -> Result<IndexReport> {
    let text_chunks = prepare_chunks(source, settings)?;

    store
        .upsert_source(source)
        .await
        .map_err(Error::persistence)?;
    rebuild_chunks(store, generator, source, text_chunks).await
}

/// Replace the chunks of an already stored source. Summary embeddings are left alone.
pub async fn reindex_source(
    store: &dyn Store,
    generator: Option<&EmbeddingGenerator>,
    source: &Source,
    settings: &SegmenterSettings,
) -> Result<IndexReport> {
    let text_chunks = prepare_chunks(source, settings)?;
    rebuild_chunks(store, generator, source, text_chunks).await
}

async fn rebuild_chunks(
    store: &dyn Store,
    generator: Option<&EmbeddingGenerator>,
    source: &Source,
    text_chunks: Vec<TextChunk>,
) -> Result<IndexReport> {
    let mut report = IndexReport {
        source_id: source.id.clone(),
        ..Default::default()
    };

    let chunks: Vec<Chunk> = text_chunks
        .into_iter()
        .map(|tc| Chunk::from_text_chunk(&source.id, tc))
        .collect();

    report.chunks_deleted = store
        .replace_chunks(&source.id, &chunks)
        .await
        .map_err(Error::persistence)?;
    report.chunks_written = chunks.len() as u64;

    if let Some(generator) = generator {
        for chunk in &chunks {
            match generator
                .generate(&chunk.content, EmbeddingCategory::Chunk)
                .await
            {
                Ok(embedding) => {
                    store
                        .update_chunk_embedding(&chunk.id, &embedding.vector)
                        .await
                        .map_err(Error::persistence)?;
                    report.embeddings_written += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        source_id = %source.id,
                        chunk_id = %chunk.id,
                        error = %err,
                        "inline embedding failed; left for backfill"
                    );
                    report.embeddings_pending += 1;
                }
            }
        }
    } else {
        report.embeddings_pending = report.chunks_written;
    }

    tracing::info!(
        source_id = %source.id,
        content_type = %source.content_type,
        chunks = report.chunks_written,
        embedded = report.embeddings_written,
        pending = report.embeddings_pending,
        "indexed source"
    );
    Ok(report)
}

/// Arguments of `recall ingest`.
#[derive(Debug, Clone)]
pub struct IngestRequest<'a> {
    pub path: &'a Path,
    pub content_type: &'a str,
    pub owner_id: &'a str,
    /// Reuse an existing source id so the source is replaced in place.
    pub source_id: Option<&'a str>,
    pub summary: Option<&'a str>,
    /// Skip inline embedding even when a provider is configured.
    pub no_embed: bool,
}

/// Run the ingest command: store one file as a source and index it.
pub async fn run_ingest(config: &Config, req: &IngestRequest<'_>) -> anyhow::Result<()> {
    let content_type: ContentType = req.content_type.parse()?;
    let content = std::fs::read_to_string(req.path)
        .with_context(|| format!("Failed to read {}", req.path.display()))?;

    let mut source = Source::new(req.owner_id, content_type, &content);
    if let Some(id) = req.source_id {
        source.id = id.to_string();
    }
    if let Some(summary) = req.summary {
        source = source.with_summary(summary);
    }

    let generator = if req.no_embed || !config.embedding.is_enabled() {
        None
    } else {
        match EmbeddingGenerator::from_config(&config.embedding) {
            Ok(g) => Some(g),
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable; chunks left pending");
                None
            }
        }
    };

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let report = index_source(&store, generator.as_ref(), &source, &config.segmenter).await?;

    println!("ingest {}", req.path.display());
    println!("  source: {}", report.source_id);
    println!("  content type: {}", content_type);
    println!("  chunks deleted: {}", report.chunks_deleted);
    println!("  chunks written: {}", report.chunks_written);
    println!("  embedded: {}", report.embeddings_written);
    println!("  pending: {}", report.embeddings_pending);

    pool.close().await;
    Ok(())
}

/// Run the chunk command: segment a file and print the chunks. Touches no database.
pub fn run_chunk_preview(
    settings: &SegmenterSettings,
    path: &Path,
    content_type: &str,
    json: bool,
) -> anyhow::Result<()> {
    let content_type: ContentType = content_type.parse()?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = settings.for_length(content.chars().count());
    let chunks = segment(&content, content_type, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{} chunk(s) from {} (max_tokens={}, overlap_tokens={})",
        chunks.len(),
        path.display(),
        config.max_tokens,
        config.overlap_tokens
    );
    for chunk in &chunks {
        let m = &chunk.metadata;
        print!(
            "[{}] {} ~{} tokens, chars {}..{}",
            chunk.index,
            m.boundary.as_str(),
            m.token_estimate,
            m.start_offset,
            m.end_offset
        );
        if let Some(page) = m.page_number {
            print!(", page {}", page);
        }
        if let Some(heading) = &m.heading {
            print!(", under \"{}\"", heading);
        }
        println!();
        println!("    {}", preview(chunk.own_content(), 80));
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
