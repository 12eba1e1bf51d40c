//! Storage abstraction for the retrieval core.
//!
//! The [`Store`] trait lists every persistence primitive that ingest and
//! backfill need, so the same pipeline runs against SQLite in the binary
//! and against memory in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Failures are plain `anyhow::Error`s; callers wrap them as
//! [`Error::Persistence`](crate::error::Error::Persistence) and never retry.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Source};

/// Selects chunks for [`Store::list_chunks`].
///
/// Results are ordered by chunk id. Pass the last id of one page as
/// `after_id` to fetch the next.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub owner_id: Option<String>,
    /// Only chunks whose embedding is absent.
    pub pending_only: bool,
    pub after_id: Option<String>,
    pub limit: usize,
}

/// Selects sources for the backfill scans. Ordered by source id.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub owner_id: Option<String>,
    pub after_id: Option<String>,
    pub limit: usize,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](Store::upsert_source) | Insert or update a source |
/// | [`delete_source`](Store::delete_source) | Delete a source and its chunks |
/// | [`insert_chunk`](Store::insert_chunk) | Insert one chunk |
/// | [`delete_chunks_by_source`](Store::delete_chunks_by_source) | Bulk delete a source's chunks |
/// | [`replace_chunks`](Store::replace_chunks) | Swap a source's chunks for a new set |
/// | [`chunks_by_source`](Store::chunks_by_source) | A source's chunks ordered by index |
/// | [`update_chunk_embedding`](Store::update_chunk_embedding) | Overwrite a chunk's embedding |
/// | [`count_chunks`](Store::count_chunks) | Count embedded or pending chunks |
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_source(&self, source: &Source) -> Result<()>;

    async fn get_source(&self, id: &str) -> Result<Option<Source>>;

    /// Returns `false` when no such source existed.
    async fn delete_source(&self, id: &str) -> Result<bool>;

    /// Fails if the source already has a chunk at `chunk.chunk_index`.
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Returns the number of chunks removed.
    async fn delete_chunks_by_source(&self, source_id: &str) -> Result<u64>;

    /// Delete every chunk of `source_id`, then insert `chunks`. Returns the
    /// number of chunks removed.
    ///
    /// A source is never left with a partial set: if an insert fails, the
    /// source ends up with no chunks so it is picked up again by the chunk
    /// backfill. Backends with transactions override this to keep the old
    /// set instead.
    async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<u64> {
        let deleted = self.delete_chunks_by_source(source_id).await?;
        for chunk in chunks {
            if let Err(err) = self.insert_chunk(chunk).await {
                if let Err(cleanup) = self.delete_chunks_by_source(source_id).await {
                    tracing::warn!(source_id, error = %cleanup, "failed to clear partial chunks");
                }
                return Err(err);
            }
        }
        Ok(deleted)
    }

    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>>;

    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>>;

    /// Fails if the chunk does not exist.
    async fn update_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()>;

    async fn count_chunks(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64>;

    /// Sources that currently have no chunks at all.
    async fn sources_without_chunks(&self, filter: &SourceFilter) -> Result<Vec<Source>>;

    /// Sources with a summary but no summary embedding.
    async fn sources_with_pending_summary(&self, filter: &SourceFilter) -> Result<Vec<Source>>;

    async fn update_summary_embedding(&self, source_id: &str, vector: &[f32]) -> Result<()>;

    /// Counts sources that have a summary, split by whether it is embedded.
    async fn count_summaries(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64>;
}
