//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Chunks are keyed by id so
//! keyset pagination falls out of the map order.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{Chunk, Source};

use super::{ChunkFilter, SourceFilter, Store};

#[derive(Default)]
pub struct InMemoryStore {
    sources: RwLock<BTreeMap<String, Source>>,
    chunks: RwLock<BTreeMap<String, Chunk>>,
    writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls that changed state.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn owned_by(sources: &BTreeMap<String, Source>, source_id: &str, owner_id: Option<&str>) -> bool {
    match owner_id {
        None => true,
        Some(owner) => sources
            .get(source_id)
            .map(|s| s.owner_id == owner)
            .unwrap_or(false),
    }
}

fn scan_sources<F>(sources: &BTreeMap<String, Source>, filter: &SourceFilter, keep: F) -> Vec<Source>
where
    F: Fn(&Source) -> bool,
{
    sources
        .values()
        .filter(|s| filter.owner_id.as_deref().map_or(true, |o| s.owner_id == o))
        .filter(|s| filter.after_id.as_deref().map_or(true, |a| s.id.as_str() > a))
        .filter(|s| keep(s))
        .take(filter.limit)
        .cloned()
        .collect()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        write(&self.sources)?.insert(source.id.clone(), source.clone());
        self.wrote();
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        Ok(read(&self.sources)?.get(id).cloned())
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let removed = write(&self.sources)?.remove(id).is_some();
        write(&self.chunks)?.retain(|_, c| c.source_id != id);
        if removed {
            self.wrote();
        }
        Ok(removed)
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut chunks = write(&self.chunks)?;
        if chunks
            .values()
            .any(|c| c.source_id == chunk.source_id && c.chunk_index == chunk.chunk_index)
        {
            bail!(
                "chunk index {} already exists for source {}",
                chunk.chunk_index,
                chunk.source_id
            );
        }
        chunks.insert(chunk.id.clone(), chunk.clone());
        self.wrote();
        Ok(())
    }

    async fn delete_chunks_by_source(&self, source_id: &str) -> Result<u64> {
        let mut chunks = write(&self.chunks)?;
        let before = chunks.len();
        chunks.retain(|_, c| c.source_id != source_id);
        let removed = (before - chunks.len()) as u64;
        if removed > 0 {
            self.wrote();
        }
        Ok(removed)
    }

    /// All-or-nothing: the new set is checked before anything is removed.
    async fn replace_chunks(&self, source_id: &str, new_chunks: &[Chunk]) -> Result<u64> {
        let mut indices = HashSet::new();
        for chunk in new_chunks {
            if chunk.source_id != source_id {
                bail!("chunk {} belongs to source {}", chunk.id, chunk.source_id);
            }
            if !indices.insert(chunk.chunk_index) {
                bail!(
                    "chunk index {} already exists for source {}",
                    chunk.chunk_index,
                    source_id
                );
            }
        }

        let mut chunks = write(&self.chunks)?;
        if let Some(c) = new_chunks.iter().find(|c| {
            chunks
                .get(&c.id)
                .map_or(false, |existing| existing.source_id != source_id)
        }) {
            bail!("chunk id {} already in use", c.id);
        }
        let before = chunks.len();
        chunks.retain(|_, c| c.source_id != source_id);
        let removed = (before - chunks.len()) as u64;
        for chunk in new_chunks {
            chunks.insert(chunk.id.clone(), chunk.clone());
        }
        if removed > 0 || !new_chunks.is_empty() {
            self.wrote();
        }
        Ok(removed)
    }

    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let mut out: Vec<Chunk> = read(&self.chunks)?
            .values()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
        let sources = read(&self.sources)?;
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .values()
            .filter(|c| filter.after_id.as_deref().map_or(true, |a| c.id.as_str() > a))
            .filter(|c| !filter.pending_only || c.embedding.is_none())
            .filter(|c| owned_by(&sources, &c.source_id, filter.owner_id.as_deref()))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn update_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let mut chunks = write(&self.chunks)?;
        let chunk = chunks
            .get_mut(chunk_id)
            .ok_or_else(|| anyhow!("chunk not found: {}", chunk_id))?;
        chunk.embedding = Some(vector.to_vec());
        self.wrote();
        Ok(())
    }

    async fn count_chunks(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64> {
        let sources = read(&self.sources)?;
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .values()
            .filter(|c| c.embedding.is_some() == embedded)
            .filter(|c| owned_by(&sources, &c.source_id, owner_id))
            .count() as u64)
    }

    async fn sources_without_chunks(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        let sources = read(&self.sources)?;
        let chunks = read(&self.chunks)?;
        let with_chunks: HashSet<&str> = chunks.values().map(|c| c.source_id.as_str()).collect();
        Ok(scan_sources(&sources, filter, |s| {
            !with_chunks.contains(s.id.as_str())
        }))
    }

    async fn sources_with_pending_summary(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        let sources = read(&self.sources)?;
        Ok(scan_sources(&sources, filter, |s| {
            s.summary.is_some() && s.summary_embedding.is_none()
        }))
    }

    async fn update_summary_embedding(&self, source_id: &str, vector: &[f32]) -> Result<()> {
        let mut sources = write(&self.sources)?;
        let source = sources
            .get_mut(source_id)
            .ok_or_else(|| anyhow!("source not found: {}", source_id))?;
        source.summary_embedding = Some(vector.to_vec());
        self.wrote();
        Ok(())
    }

    async fn count_summaries(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64> {
        Ok(read(&self.sources)?
            .values()
            .filter(|s| s.summary.is_some())
            .filter(|s| s.summary_embedding.is_some() == embedded)
            .filter(|s| owner_id.map_or(true, |o| s.owner_id == o))
            .count() as u64)
    }
}
