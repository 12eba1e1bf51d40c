//! `recall embed ...` command handlers.
//!
//! Thin wrappers that open the database, build the generator from config,
//! run one [`BackfillOrchestrator`] operation and print its result.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::backfill::{BackfillOptions, BackfillOrchestrator, BackfillResult};
use crate::config::Config;
use crate::db;
use crate::embedding::{DisabledProvider, EmbeddingGenerator};
use crate::store::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTarget {
    /// Chunks without an embedding.
    Pending,
    /// Sources without chunks.
    Chunks,
    /// Summaries without an embedding.
    Summaries,
}

impl EmbedTarget {
    fn label(&self) -> &'static str {
        match self {
            EmbedTarget::Pending => "embed pending",
            EmbedTarget::Chunks => "embed chunks",
            EmbedTarget::Summaries => "embed summaries",
        }
    }
}

/// A dry run never calls the provider, so it does not need credentials.
fn generator_for(config: &Config, dry_run: bool) -> Result<EmbeddingGenerator> {
    if dry_run {
        return Ok(
            EmbeddingGenerator::new(Arc::new(DisabledProvider), config.embedding.retry.policy())
                .with_dims(config.embedding.dims),
        );
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    EmbeddingGenerator::from_config(&config.embedding)
}

pub async fn run_embed(config: &Config, target: EmbedTarget, opts: &BackfillOptions) -> Result<()> {
    let generator = generator_for(config, opts.dry_run)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let orchestrator = BackfillOrchestrator::new(&store, &generator)
        .with_segmenter(config.segmenter.clone())
        .with_batches(config.backfill.clone());

    let result = match target {
        EmbedTarget::Pending => orchestrator.backfill_embeddings(opts).await?,
        EmbedTarget::Chunks => orchestrator.backfill_chunks(opts).await?,
        EmbedTarget::Summaries => orchestrator.backfill_summaries(opts).await?,
    };
    print_result(target.label(), opts.dry_run, &result);

    if target == EmbedTarget::Pending && !opts.dry_run {
        let owner = opts.owner_id.as_deref();
        println!("  remaining: {}", orchestrator.pending_count(owner).await?);
        println!("  completed: {}", orchestrator.completed_count(owner).await?);
    }

    pool.close().await;
    Ok(())
}

/// Delete and re-create one source's chunks, then embed them.
pub async fn run_regenerate(config: &Config, source_id: &str) -> Result<()> {
    let generator = generator_for(config, false)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let orchestrator =
        BackfillOrchestrator::new(&store, &generator).with_segmenter(config.segmenter.clone());

    let result = orchestrator.regenerate_source(source_id).await?;
    print_result("embed regenerate", false, &result);

    pool.close().await;
    Ok(())
}

fn print_result(label: &str, dry_run: bool, result: &BackfillResult) {
    if dry_run {
        println!("{} (dry-run)", label);
        println!("  candidates: {}", result.candidates);
        return;
    }
    println!("{}", label);
    println!("  candidates: {}", result.candidates);
    println!("  processed: {}", result.processed);
    println!("  skipped: {}", result.skipped);
    println!("  failed: {}", result.failed);
    println!("  duration: {} ms", result.duration_ms);
    for failure in &result.failures {
        println!("    {}: {}", failure.item_id, failure.error);
    }
}
