//! Backfill orchestrator: fills in missing chunks and embeddings.
//!
//! Every operation scans the store for items whose derived data is absent,
//! handles them one at a time, and reports a [`BackfillResult`]. A failing
//! item is recorded and the run moves on; only a failing scan aborts.
//!
//! | Operation | Candidates | Default batch |
//! |-----------|------------|---------------|
//! | [`backfill_chunks`](BackfillOrchestrator::backfill_chunks) | sources without chunks | 10 |
//! | [`backfill_summaries`](BackfillOrchestrator::backfill_summaries) | summaries without embedding | 1000 |
//! | [`backfill_embeddings`](BackfillOrchestrator::backfill_embeddings) | chunks without embedding | 50 |
//!
//! Scans are keyset-paginated by id, so an item that fails is not fetched
//! again within the same run but stays eligible for the next one.
//! Re-running after success is a no-op: completed items are no longer
//! candidates.
//!
//! An item's embedding moves `absent → present` on success and stays
//! `absent` when retries are exhausted. Only
//! [`regenerate_source`](BackfillOrchestrator::regenerate_source) moves it
//! back from `present` to `absent`.

use serde::Serialize;
use std::fmt::Display;
use std::time::Instant;

use crate::chunk::should_chunk;
use crate::config::{BackfillConfig, SegmenterSettings};
use crate::embedding::{EmbeddingCategory, EmbeddingGenerator};
use crate::error::{Error, Result};
use crate::ingest;
use crate::models::Chunk;
use crate::store::{ChunkFilter, SourceFilter, Store};

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Count candidates, write nothing.
    pub dry_run: bool,
    pub owner_id: Option<String>,
    /// Page size; `None` uses the operation's configured default.
    pub batch_size: Option<usize>,
    /// Only target items whose embedding is absent.
    pub skip_existing: bool,
    /// Stop after this many candidates.
    pub limit: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            owner_id: None,
            batch_size: None,
            skip_existing: true,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillFailure {
    pub item_id: String,
    pub error: String,
}

/// Outcome of one run. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillResult {
    pub candidates: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: u64,
    pub failures: Vec<BackfillFailure>,
}

impl BackfillResult {
    fn record_failure(&mut self, item_id: &str, err: impl Display) {
        tracing::warn!(item_id, error = %err, "backfill item failed");
        self.failed += 1;
        self.failures.push(BackfillFailure {
            item_id: item_id.to_string(),
            error: err.to_string(),
        });
    }

    fn finish(mut self, started: Instant, operation: &str, dry_run: bool) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            operation,
            dry_run,
            candidates = self.candidates,
            processed = self.processed,
            failed = self.failed,
            skipped = self.skipped,
            duration_ms = self.duration_ms,
            "backfill finished"
        );
        self
    }
}

/// Remaining candidate budget for one run.
struct Budget(Option<usize>);

impl Budget {
    fn page(&self, batch: usize) -> usize {
        match self.0 {
            Some(left) => left.min(batch),
            None => batch,
        }
    }

    fn take(&mut self) {
        if let Some(left) = self.0.as_mut() {
            *left = left.saturating_sub(1);
        }
    }

    fn exhausted(&self) -> bool {
        self.0 == Some(0)
    }
}

pub struct BackfillOrchestrator<'a> {
    store: &'a dyn Store,
    generator: &'a EmbeddingGenerator,
    segmenter: SegmenterSettings,
    batches: BackfillConfig,
}

impl<'a> BackfillOrchestrator<'a> {
    pub fn new(store: &'a dyn Store, generator: &'a EmbeddingGenerator) -> Self {
        Self {
            store,
            generator,
            segmenter: SegmenterSettings::default(),
            batches: BackfillConfig::default(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: SegmenterSettings) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_batches(mut self, batches: BackfillConfig) -> Self {
        self.batches = batches;
        self
    }

    /// Chunks still waiting for an embedding.
    pub async fn pending_count(&self, owner_id: Option<&str>) -> Result<u64> {
        self.store
            .count_chunks(owner_id, false)
            .await
            .map_err(Error::persistence)
    }

    /// Chunks that have an embedding.
    pub async fn completed_count(&self, owner_id: Option<&str>) -> Result<u64> {
        self.store
            .count_chunks(owner_id, true)
            .await
            .map_err(Error::persistence)
    }

    /// Segment sources that have no chunks yet, embedding the new chunks inline.
    ///
    /// Sources too short to chunk (or images) are counted as skipped.
    /// Inline embedding failures do not fail the source; those chunks are
    /// picked up by [`backfill_embeddings`](Self::backfill_embeddings).
    pub async fn backfill_chunks(&self, opts: &BackfillOptions) -> Result<BackfillResult> {
        let started = Instant::now();
        let batch = opts.batch_size.unwrap_or(self.batches.chunk_batch_size).max(1);
        let mut budget = Budget(opts.limit);
        let mut result = BackfillResult::default();
        let mut after_id: Option<String> = None;

        while !budget.exhausted() {
            let filter = SourceFilter {
                owner_id: opts.owner_id.clone(),
                after_id: after_id.clone(),
                limit: budget.page(batch),
            };
            let sources = self
                .store
                .sources_without_chunks(&filter)
                .await
                .map_err(Error::persistence)?;
            let Some(last) = sources.last() else { break };
            after_id = Some(last.id.clone());
            tracing::info!(batch = sources.len(), "chunk backfill batch");

            for source in &sources {
                budget.take();
                result.candidates += 1;
                if opts.dry_run {
                    continue;
                }
                if !should_chunk(source.content_type, source.content.chars().count()) {
                    result.skipped += 1;
                    continue;
                }
                match ingest::reindex_source(
                    self.store,
                    Some(self.generator),
                    source,
                    &self.segmenter,
                )
                .await
                {
                    Ok(report) if report.chunks_written == 0 => result.skipped += 1,
                    Ok(_) => result.processed += 1,
                    Err(err) => result.record_failure(&source.id, err),
                }
            }
        }

        Ok(result.finish(started, "chunks", opts.dry_run))
    }

    /// Embed source summaries whose embedding is absent. Blank summaries are skipped.
    pub async fn backfill_summaries(&self, opts: &BackfillOptions) -> Result<BackfillResult> {
        let started = Instant::now();
        let batch = opts
            .batch_size
            .unwrap_or(self.batches.summary_scan_window)
            .max(1);
        let mut budget = Budget(opts.limit);
        let mut result = BackfillResult::default();
        let mut after_id: Option<String> = None;

        while !budget.exhausted() {
            let filter = SourceFilter {
                owner_id: opts.owner_id.clone(),
                after_id: after_id.clone(),
                limit: budget.page(batch),
            };
            let sources = self
                .store
                .sources_with_pending_summary(&filter)
                .await
                .map_err(Error::persistence)?;
            let Some(last) = sources.last() else { break };
            after_id = Some(last.id.clone());
            tracing::info!(batch = sources.len(), "summary backfill batch");

            for source in &sources {
                budget.take();
                result.candidates += 1;
                if opts.dry_run {
                    continue;
                }
                let summary = match source.summary.as_deref() {
                    Some(s) if !s.trim().is_empty() => s,
                    _ => {
                        result.skipped += 1;
                        continue;
                    }
                };
                let outcome = match self
                    .generator
                    .generate(summary, EmbeddingCategory::Summary)
                    .await
                {
                    Ok(embedding) => self
                        .store
                        .update_summary_embedding(&source.id, &embedding.vector)
                        .await
                        .map_err(Error::persistence),
                    Err(err) => Err(err),
                };
                match outcome {
                    Ok(()) => result.processed += 1,
                    Err(err) => result.record_failure(&source.id, err),
                }
            }
        }

        Ok(result.finish(started, "summaries", opts.dry_run))
    }

    /// Embed chunks whose embedding is absent, or every chunk when
    /// `skip_existing` is off.
    pub async fn backfill_embeddings(&self, opts: &BackfillOptions) -> Result<BackfillResult> {
        let started = Instant::now();
        let batch = opts
            .batch_size
            .unwrap_or(self.batches.embedding_batch_size)
            .max(1);
        let mut budget = Budget(opts.limit);
        let mut result = BackfillResult::default();
        let mut after_id: Option<String> = None;

        while !budget.exhausted() {
            let filter = ChunkFilter {
                owner_id: opts.owner_id.clone(),
                pending_only: opts.skip_existing,
                after_id: after_id.clone(),
                limit: budget.page(batch),
            };
            let chunks = self
                .store
                .list_chunks(&filter)
                .await
                .map_err(Error::persistence)?;
            let Some(last) = chunks.last() else { break };
            after_id = Some(last.id.clone());
            tracing::info!(batch = chunks.len(), "embedding backfill batch");

            for chunk in &chunks {
                budget.take();
                result.candidates += 1;
                if opts.dry_run {
                    continue;
                }
                self.embed_chunk(chunk, &mut result).await;
            }
        }

        Ok(result.finish(started, "embeddings", opts.dry_run))
    }

    /// Delete and re-create every chunk of one source, then embed them.
    ///
    /// All of the source's chunk embeddings are absent between the two steps.
    pub async fn regenerate_source(&self, source_id: &str) -> Result<BackfillResult> {
        let started = Instant::now();
        let source = self
            .store
            .get_source(source_id)
            .await
            .map_err(Error::persistence)?
            .ok_or_else(|| {
                Error::persistence(anyhow::anyhow!("source not found: {}", source_id))
            })?;

        let report = ingest::reindex_source(self.store, None, &source, &self.segmenter).await?;
        tracing::info!(
            source_id,
            deleted = report.chunks_deleted,
            created = report.chunks_written,
            "regenerating source chunks"
        );

        let chunks = self
            .store
            .chunks_by_source(&source.id)
            .await
            .map_err(Error::persistence)?;
        let mut result = BackfillResult::default();
        for chunk in &chunks {
            result.candidates += 1;
            self.embed_chunk(chunk, &mut result).await;
        }

        Ok(result.finish(started, "regenerate", false))
    }

    async fn embed_chunk(&self, chunk: &Chunk, result: &mut BackfillResult) {
        if chunk.content.trim().is_empty() {
            result.skipped += 1;
            return;
        }
        let outcome = match self
            .generator
            .generate(&chunk.content, EmbeddingCategory::Chunk)
            .await
        {
            Ok(embedding) => self
                .store
                .update_chunk_embedding(&chunk.id, &embedding.vector)
                .await
                .map_err(Error::persistence),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => result.processed += 1,
            Err(err) => result.record_failure(&chunk.id, err),
        }
    }
}
