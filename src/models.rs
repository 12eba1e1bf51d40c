//! Core data models used throughout the retrieval core.
//!
//! These types represent the sources, chunks and chunk metadata that flow
//! through segmentation, embedding and backfill.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Kind of content a source holds. Drives segmentation dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Url,
    Text,
    Note,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Url => "url",
            ContentType::Text => "text",
            ContentType::Note => "note",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ContentType::Pdf),
            "url" | "web" => Ok(ContentType::Url),
            "text" | "txt" => Ok(ContentType::Text),
            "note" => Ok(ContentType::Note),
            "image" => Ok(ContentType::Image),
            other => Err(ValidationError::UnknownContentType(other.to_string())),
        }
    }
}

/// A stored content unit, already materialized as text.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub owner_id: String,
    pub content_type: ContentType,
    pub content: String,
    /// Produced upstream; this crate only embeds it.
    pub summary: Option<String>,
    pub summary_embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Source {
    pub fn new(owner_id: &str, content_type: ContentType, content: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            content_type,
            content: content.to_string(),
            summary: None,
            summary_embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }
}

/// How a chunk's boundaries were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryType {
    /// One or more whole paragraphs.
    Paragraph,
    /// Part of a paragraph that alone exceeded the token budget.
    Sentence,
    /// Fixed-size window, boundaries ignored.
    Arbitrary,
}

impl BoundaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryType::Paragraph => "paragraph",
            BoundaryType::Sentence => "sentence",
            BoundaryType::Arbitrary => "arbitrary",
        }
    }
}

impl FromStr for BoundaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paragraph" => Ok(BoundaryType::Paragraph),
            "sentence" => Ok(BoundaryType::Sentence),
            "arbitrary" => Ok(BoundaryType::Arbitrary),
            other => Err(format!("unknown boundary type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Character offset of the chunk's own (non-overlap) content.
    pub start_offset: usize,
    pub end_offset: usize,
    pub token_estimate: usize,
    pub boundary: BoundaryType,
    pub heading: Option<String>,
    pub page_number: Option<u32>,
    /// Byte length of the content prefix copied from the previous chunk.
    pub overlap_len: usize,
}

/// Segmenter output, before it is attached to a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl TextChunk {
    /// Content with the overlap prefix stripped.
    pub fn own_content(&self) -> &str {
        own_content(&self.content, self.metadata.overlap_len)
    }
}

/// A chunk of a source's content.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub hash: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn from_text_chunk(source_id: &str, tc: TextChunk) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            chunk_index: tc.index as i64,
            hash: hash_text(&tc.content),
            content: tc.content,
            embedding: None,
            metadata: tc.metadata,
        }
    }

    pub fn own_content(&self) -> &str {
        own_content(&self.content, self.metadata.overlap_len)
    }
}

fn own_content(content: &str, overlap_len: usize) -> &str {
    content.get(overlap_len..).unwrap_or(content).trim_start()
}

/// SHA-256 of `text`, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!("PDF".parse::<ContentType>().unwrap(), ContentType::Pdf);
        assert_eq!("note".parse::<ContentType>().unwrap(), ContentType::Note);
        assert_eq!(ContentType::Url.to_string(), "url");
        assert!("video".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_own_content_strips_overlap() {
        let tc = TextChunk {
            index: 1,
            content: "tail words\n\nNext paragraph.".to_string(),
            metadata: ChunkMetadata {
                start_offset: 0,
                end_offset: 15,
                token_estimate: 7,
                boundary: BoundaryType::Paragraph,
                heading: None,
                page_number: None,
                overlap_len: "tail words".len(),
            },
        };
        assert_eq!(tc.own_content(), "Next paragraph.");
        let chunk = Chunk::from_text_chunk("src-1", tc);
        assert_eq!(chunk.own_content(), "Next paragraph.");
        assert_eq!(chunk.chunk_index, 1);
        assert_eq!(chunk.hash.len(), 64);
    }
}
