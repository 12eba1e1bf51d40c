//! Page-aware segmentation for text extracted from PDFs.
//!
//! Extractors mark page breaks in a few common ways; all of these are
//! recognized (case-insensitive):
//!
//! - `[Page N]` anywhere in a line
//! - a line `--- Page N ---`
//! - a line `Page N` or `Page N of M`
//!
//! Each page is segmented independently with [`ParagraphSegmenter`], so no
//! chunk spans two pages. `respect_boundaries = false` does not switch pages
//! to word windows. Text before the first marker is segmented with
//! `page_number = None`.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{char_offset, ParagraphSegmenter, Segmenter, SegmenterConfig};
use crate::error::ValidationError;
use crate::models::TextChunk;

static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)\[page[ \t]+(\d+)\]|^[ \t]*-{2,}[ \t]*page[ \t]+(\d+)[ \t]*-{2,}[ \t]*$|^[ \t]*page[ \t]+(\d+)(?:[ \t]+of[ \t]+\d+)?[ \t]*$",
    )
    .expect("valid regex")
});

pub struct PageSegmenter;

#[derive(Debug, PartialEq)]
struct Page {
    number: Option<u32>,
    start: usize,
    end: usize,
}

impl Segmenter for PageSegmenter {
    fn segment(
        &self,
        text: &str,
        config: &SegmenterConfig,
    ) -> Result<Vec<TextChunk>, ValidationError> {
        config.validate()?;
        let base = ParagraphSegmenter;

        let pages = split_pages(text);
        if pages.is_empty() {
            return base.segment(text, config);
        }

        let mut out = Vec::new();
        for page in pages {
            let offset = char_offset(text, page.start);
            for mut chunk in base.segment(&text[page.start..page.end], config)? {
                chunk.index = out.len();
                chunk.metadata.start_offset += offset;
                chunk.metadata.end_offset += offset;
                chunk.metadata.page_number = page.number;
                out.push(chunk);
            }
        }
        Ok(out)
    }
}

/// Byte spans of each page body, markers excluded. Empty when no marker is found.
fn split_pages(text: &str) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut number = None;
    let mut cursor = 0;

    for caps in PAGE_MARKER.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() > cursor || number.is_some() {
            pages.push(Page {
                number,
                start: cursor,
                end: m.start(),
            });
        }
        number = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .and_then(|n| n.as_str().parse::<u32>().ok());
        cursor = m.end();
    }

    if cursor == 0 && pages.is_empty() {
        return pages;
    }
    pages.push(Page {
        number,
        start: cursor,
        end: text.len(),
    });
    pages
}
