//! SQLite-backed [`Store`] implementation.
//!
//! Embeddings are stored inline as little-endian `f32` BLOBs (see
//! [`vec_to_blob`]); `NULL` means the embedding is absent.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{BoundaryType, Chunk, ChunkMetadata, ContentType, Source};

use super::{ChunkFilter, SourceFilter, Store};

const CHUNK_COLUMNS: &str = "c.id, c.source_id, c.chunk_index, c.content, c.hash, c.embedding, \
     c.start_offset, c.end_offset, c.token_estimate, c.boundary_type, c.heading, \
     c.page_number, c.overlap_len";

const SOURCE_COLUMNS: &str = "s.id, s.owner_id, s.content_type, s.content, s.summary, \
     s.summary_embedding, s.created_at, s.updated_at";

/// SQLite implementation of the [`Store`] trait over the schema created by
/// [`migrate`](crate::migrate::migrate).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let boundary: String = row.try_get("boundary_type")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let page_number: Option<i64> = row.try_get("page_number")?;

    Ok(Chunk {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        hash: row.try_get("hash")?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        metadata: ChunkMetadata {
            start_offset: row.try_get::<i64, _>("start_offset")? as usize,
            end_offset: row.try_get::<i64, _>("end_offset")? as usize,
            token_estimate: row.try_get::<i64, _>("token_estimate")? as usize,
            boundary: boundary.parse::<BoundaryType>().map_err(|e| anyhow!(e))?,
            heading: row.try_get("heading")?,
            page_number: page_number.map(|p| p as u32),
            overlap_len: row.try_get::<i64, _>("overlap_len")? as usize,
        },
    })
}

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let content_type: String = row.try_get("content_type")?;
    let summary_embedding: Option<Vec<u8>> = row.try_get("summary_embedding")?;

    Ok(Source {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        content_type: content_type.parse::<ContentType>()?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        summary_embedding: summary_embedding.map(|b| blob_to_vec(&b)),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

async fn insert_chunk_row<'e, E>(executor: E, chunk: &Chunk) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let m = &chunk.metadata;
    sqlx::query(
        r#"
        INSERT INTO chunks (id, source_id, chunk_index, content, hash, embedding,
                            start_offset, end_offset, token_estimate, boundary_type,
                            heading, page_number, overlap_len)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.source_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.content)
    .bind(&chunk.hash)
    .bind(chunk.embedding.as_deref().map(vec_to_blob))
    .bind(m.start_offset as i64)
    .bind(m.end_offset as i64)
    .bind(m.token_estimate as i64)
    .bind(m.boundary.as_str())
    .bind(&m.heading)
    .bind(m.page_number.map(i64::from))
    .bind(m.overlap_len as i64)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, owner_id, content_type, content, summary,
                                 summary_embedding, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                content_type = excluded.content_type,
                content = excluded.content,
                summary = excluded.summary,
                summary_embedding = excluded.summary_embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&source.id)
        .bind(&source.owner_id)
        .bind(source.content_type.as_str())
        .bind(&source.content)
        .bind(&source.summary)
        .bind(source.summary_embedding.as_deref().map(vec_to_blob))
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let row = sqlx::query(&format!("SELECT {} FROM sources s WHERE s.id = ?", SOURCE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        insert_chunk_row(&self.pool, chunk).await
    }

    async fn delete_chunks_by_source(&self, source_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Runs in one transaction; on failure the previous chunks are kept.
    async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for chunk in chunks {
            insert_chunk_row(&mut *tx, chunk).await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks c WHERE c.source_id = ? ORDER BY c.chunk_index",
            CHUNK_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM chunks c
            JOIN sources s ON s.id = c.source_id
            WHERE (? IS NULL OR s.owner_id = ?)
              AND (? = 0 OR c.embedding IS NULL)
              AND (? IS NULL OR c.id > ?)
            ORDER BY c.id
            LIMIT ?
            "#,
            CHUNK_COLUMNS
        ))
        .bind(filter.owner_id.as_deref())
        .bind(filter.owner_id.as_deref())
        .bind(filter.pending_only)
        .bind(filter.after_id.as_deref())
        .bind(filter.after_id.as_deref())
        .bind(limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn update_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("chunk not found: {}", chunk_id);
        }
        Ok(())
    }

    async fn count_chunks(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM chunks c
            JOIN sources s ON s.id = c.source_id
            WHERE (? IS NULL OR s.owner_id = ?)
              AND (c.embedding IS NOT NULL) = ?
            "#,
        )
        .bind(owner_id)
        .bind(owner_id)
        .bind(embedded)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn sources_without_chunks(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM sources s
            WHERE NOT EXISTS (SELECT 1 FROM chunks c WHERE c.source_id = s.id)
              AND (? IS NULL OR s.owner_id = ?)
              AND (? IS NULL OR s.id > ?)
            ORDER BY s.id
            LIMIT ?
            "#,
            SOURCE_COLUMNS
        ))
        .bind(filter.owner_id.as_deref())
        .bind(filter.owner_id.as_deref())
        .bind(filter.after_id.as_deref())
        .bind(filter.after_id.as_deref())
        .bind(limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn sources_with_pending_summary(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM sources s
            WHERE s.summary IS NOT NULL
              AND s.summary_embedding IS NULL
              AND (? IS NULL OR s.owner_id = ?)
              AND (? IS NULL OR s.id > ?)
            ORDER BY s.id
            LIMIT ?
            "#,
            SOURCE_COLUMNS
        ))
        .bind(filter.owner_id.as_deref())
        .bind(filter.owner_id.as_deref())
        .bind(filter.after_id.as_deref())
        .bind(filter.after_id.as_deref())
        .bind(limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn update_summary_embedding(&self, source_id: &str, vector: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE sources SET summary_embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("source not found: {}", source_id);
        }
        Ok(())
    }

    async fn count_summaries(&self, owner_id: Option<&str>, embedded: bool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sources s
            WHERE s.summary IS NOT NULL
              AND (? IS NULL OR s.owner_id = ?)
              AND (s.summary_embedding IS NOT NULL) = ?
            "#,
        )
        .bind(owner_id)
        .bind(owner_id)
        .bind(embedded)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
