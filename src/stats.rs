//! Embedding coverage overview.
//!
//! Summarizes how much of the corpus can take part in semantic matching:
//! chunk and summary counts split by whether their embedding is present.
//! Used by `recall stats` to confirm that backfills are making progress.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::store::{SqliteStore, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Coverage {
    pub embedded: u64,
    pub pending: u64,
}

impl Coverage {
    pub fn total(&self) -> u64 {
        self.embedded + self.pending
    }

    /// Whole-number percentage embedded; `100` when there is nothing to embed.
    pub fn percent(&self) -> u64 {
        match self.total() {
            0 => 100,
            total => self.embedded * 100 / total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub owner_id: Option<String>,
    pub chunks: Coverage,
    pub summaries: Coverage,
}

pub async fn coverage(store: &dyn Store, owner_id: Option<&str>) -> Result<CoverageReport> {
    Ok(CoverageReport {
        owner_id: owner_id.map(str::to_string),
        chunks: Coverage {
            embedded: store.count_chunks(owner_id, true).await?,
            pending: store.count_chunks(owner_id, false).await?,
        },
        summaries: Coverage {
            embedded: store.count_summaries(owner_id, true).await?,
            pending: store.count_summaries(owner_id, false).await?,
        },
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, owner_id: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let report = coverage(&store, owner_id).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Recall Index — Embedding Coverage");
    println!("=================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Owner:       {}", owner_id.unwrap_or("(all)"));
    println!();
    print_coverage("Chunks", &report.chunks);
    print_coverage("Summaries", &report.summaries);
    println!();

    pool.close().await;
    Ok(())
}

fn print_coverage(label: &str, c: &Coverage) {
    println!(
        "  {:<12} {} / {} embedded ({}%), {} pending",
        format!("{}:", label),
        c.embedded,
        c.total(),
        c.percent(),
        c.pending
    );
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ContentType, Source, TextChunk};
    use crate::store::InMemoryStore;

    #[test]
    fn test_percent() {
        assert_eq!(Coverage::default().percent(), 100);
        let c = Coverage {
            embedded: 1,
            pending: 3,
        };
        assert_eq!(c.total(), 4);
        assert_eq!(c.percent(), 25);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_coverage_counts() {
        let store = InMemoryStore::new();
        let source = Source::new("alice", ContentType::Note, "x").with_summary("s");
        store.upsert_source(&source).await.unwrap();
        let chunks = crate::chunk::segment(
            "one\n\ntwo",
            ContentType::Note,
            &crate::chunk::SegmenterConfig {
                max_tokens: 1,
                overlap_tokens: 0,
                min_chunk_size: 0,
                respect_boundaries: true,
            },
        )
        .unwrap();
        let stored: Vec<Chunk> = chunks
            .into_iter()
            .map(|tc: TextChunk| Chunk::from_text_chunk(&source.id, tc))
            .collect();
        for c in &stored {
            store.insert_chunk(c).await.unwrap();
        }
        store
            .update_chunk_embedding(&stored[0].id, &[1.0])
            .await
            .unwrap();

        let report = coverage(&store, Some("alice")).await.unwrap();
        assert_eq!(report.chunks, Coverage { embedded: 1, pending: 1 });
        assert_eq!(report.summaries, Coverage { embedded: 0, pending: 1 });
        let other = coverage(&store, Some("bob")).await.unwrap();
        assert_eq!(other.chunks.total(), 0);
    }
}
