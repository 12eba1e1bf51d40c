//! Boundary-preserving text segmenter.
//!
//! Splits source text into ordered [`TextChunk`]s bounded by an approximate
//! token budget. The strategy is chosen by content type:
//!
//! | Content type | Segmenter |
//! |--------------|-----------|
//! | `pdf` | [`PageSegmenter`]: split on `Page N` markers, segment each page |
//! | `url`, `text`, `note` | [`ParagraphSegmenter`] (or [`WindowSegmenter`] when boundaries are ignored) |
//! | `image` | never segmented |
//!
//! # Algorithm
//!
//! 1. Split on blank-line paragraph boundaries.
//! 2. Accumulate paragraphs until the next one would exceed `max_tokens`.
//! 3. Emit the chunk; seed the next one with ~`overlap_tokens` of trailing
//!    words from the previous paragraph.
//! 4. A paragraph that alone exceeds `max_tokens` is decomposed at sentence
//!    boundaries with the same accumulate-and-overlap strategy.
//! 5. A trailing fragment shorter than `min_chunk_size` characters is merged
//!    into the previous chunk when the merge still fits.
//!
//! Token counts are estimated as `ceil(chars / 4)`. This is a sizing
//! heuristic, not a tokenizer.
//!
//! # Example
//!
//! ```rust
//! use recall_index::chunk::{segment, SegmenterConfig};
//! use recall_index::models::{BoundaryType, ContentType};
//!
//! let chunks = segment("Hello world.\n\nSecond paragraph.", ContentType::Note, &SegmenterConfig::default()).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].metadata.boundary, BoundaryType::Paragraph);
//! ```

mod paragraph;
mod pdf;
mod window;

pub use paragraph::ParagraphSegmenter;
pub use pdf::PageSegmenter;
pub use window::WindowSegmenter;

use serde::Deserialize;

use crate::error::ValidationError;
use crate::models::{BoundaryType, ChunkMetadata, ContentType, TextChunk};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_chars(text.chars().count())
}

fn tokens_for_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SegmenterConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// Characters.
    pub min_chunk_size: usize,
    pub respect_boundaries: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
            min_chunk_size: 100,
            respect_boundaries: true,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_tokens == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_tokens must be > 0".to_string(),
            ));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(ValidationError::InvalidConfig(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    pub(crate) fn max_chars(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    pub(crate) fn overlap_chars(&self) -> usize {
        self.overlap_tokens * CHARS_PER_TOKEN
    }

    pub(crate) fn fits(&self, chars: usize) -> bool {
        tokens_for_chars(chars) <= self.max_tokens
    }
}

/// Pick a config from the total content length in characters.
///
/// - `< 1000` ⇒ effectively unchunked (`max_tokens = 1000`, no overlap)
/// - `1000..=5000` ⇒ `{500, 50, 200}`
/// - `> 5000` ⇒ `{400, 50, 150}`
pub fn select_config(content_len: usize) -> SegmenterConfig {
    let (max_tokens, overlap_tokens, min_chunk_size) = if content_len < 1000 {
        (1000, 0, 100)
    } else if content_len <= 5000 {
        (500, 50, 200)
    } else {
        (400, 50, 150)
    };
    SegmenterConfig {
        max_tokens,
        overlap_tokens,
        min_chunk_size,
        respect_boundaries: true,
    }
}

/// Whether content of this type and length is worth splitting into chunks.
pub fn should_chunk(content_type: ContentType, content_len: usize) -> bool {
    match content_type {
        ContentType::Pdf | ContentType::Url => content_len > 500,
        ContentType::Text | ContentType::Note => content_len > 1000,
        ContentType::Image => false,
    }
}

/// Shared contract for every segmentation strategy.
pub trait Segmenter: Send + Sync {
    /// Split `text` into chunks with contiguous indices starting at 0.
    ///
    /// Empty or whitespace-only input yields an empty vector.
    fn segment(
        &self,
        text: &str,
        config: &SegmenterConfig,
    ) -> Result<Vec<TextChunk>, ValidationError>;
}

/// Strategy used for non-paged text under `config`.
pub(crate) fn base_segmenter(config: &SegmenterConfig) -> &'static dyn Segmenter {
    if config.respect_boundaries {
        &ParagraphSegmenter
    } else {
        &WindowSegmenter
    }
}

/// The segmenter for a content type, or `None` for content that is never segmented.
pub fn segmenter_for(
    content_type: ContentType,
    config: &SegmenterConfig,
) -> Option<&'static dyn Segmenter> {
    match content_type {
        ContentType::Image => None,
        ContentType::Pdf => Some(&PageSegmenter),
        ContentType::Url | ContentType::Text | ContentType::Note => Some(base_segmenter(config)),
    }
}

/// Segment `text` with the strategy for `content_type`.
pub fn segment(
    text: &str,
    content_type: ContentType,
    config: &SegmenterConfig,
) -> Result<Vec<TextChunk>, ValidationError> {
    config.validate()?;
    match segmenter_for(content_type, config) {
        Some(s) => s.segment(text, config),
        None => Ok(Vec::new()),
    }
}

/// A chunk under construction. Offsets are byte offsets into the source text.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub content: String,
    pub overlap_len: usize,
    pub start: usize,
    pub end: usize,
    pub boundary: BoundaryType,
    pub heading: Option<String>,
}

impl Draft {
    fn own_content(&self) -> &str {
        self.content
            .get(self.overlap_len..)
            .unwrap_or(&self.content)
            .trim_start()
    }
}

pub(crate) fn separator(boundary: BoundaryType) -> &'static str {
    match boundary {
        BoundaryType::Paragraph => "\n\n",
        BoundaryType::Sentence | BoundaryType::Arbitrary => " ",
    }
}

/// Trailing words of `text` totalling at most `max_chars` characters.
pub(crate) fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    let mut start = text.len();
    for idx in word_starts(text).into_iter().rev() {
        if text[idx..].trim_end().chars().count() > max_chars {
            break;
        }
        start = idx;
    }
    text[start..].trim_end()
}

fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut prev_ws = true;
    for (i, c) in text.char_indices() {
        if !c.is_whitespace() && prev_ws {
            starts.push(i);
        }
        prev_ws = c.is_whitespace();
    }
    starts
}

/// Merge a short trailing draft into its predecessor, then number and
/// convert offsets to characters.
pub(crate) fn finalize(text: &str, mut drafts: Vec<Draft>, config: &SegmenterConfig) -> Vec<TextChunk> {
    merge_trailing_fragment(&mut drafts, config);

    drafts
        .into_iter()
        .enumerate()
        .map(|(index, d)| TextChunk {
            index,
            metadata: ChunkMetadata {
                start_offset: char_offset(text, d.start),
                end_offset: char_offset(text, d.end),
                token_estimate: estimate_tokens(&d.content),
                boundary: d.boundary,
                heading: d.heading,
                page_number: None,
                overlap_len: d.overlap_len,
            },
            content: d.content,
        })
        .collect()
}

fn merge_trailing_fragment(drafts: &mut Vec<Draft>, config: &SegmenterConfig) {
    if drafts.len() < 2 {
        return;
    }
    let n = drafts.len();
    let (head, tail) = drafts.split_at_mut(n - 1);
    let prev = &mut head[n - 2];
    let last = &tail[0];

    let own = last.own_content();
    if own.chars().count() >= config.min_chunk_size {
        return;
    }
    let sep = separator(last.boundary);
    let merged_chars = prev.content.chars().count() + sep.len() + own.chars().count();
    if !config.fits(merged_chars) {
        return;
    }

    prev.content.push_str(sep);
    prev.content.push_str(own);
    prev.end = last.end;
    drafts.pop();
}

pub(crate) fn char_offset(text: &str, byte: usize) -> usize {
    text.get(..byte)
        .map(|s| s.chars().count())
        .unwrap_or_else(|| text.chars().count())
}
