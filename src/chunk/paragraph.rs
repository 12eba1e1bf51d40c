//! Paragraph-first segmentation with sentence fallback.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{finalize, overlap_tail, separator, Draft, Segmenter, SegmenterConfig};
use crate::error::ValidationError;
use crate::models::{BoundaryType, TextChunk};

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Terminal punctuation, optional closing quote/bracket, then whitespace.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]+["'\u{201D}\u{2019})\]]*\s+"#).expect("valid regex"));

/// Accumulates paragraphs into chunks; decomposes oversized paragraphs by sentence.
pub struct ParagraphSegmenter;

impl Segmenter for ParagraphSegmenter {
    fn segment(
        &self,
        text: &str,
        config: &SegmenterConfig,
    ) -> Result<Vec<TextChunk>, ValidationError> {
        config.validate()?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut acc = Accumulator::new(config);
        let mut heading: Option<String> = None;

        for (start, end) in paragraph_spans(text) {
            let para = &text[start..end];
            if let Some(h) = heading_of(para) {
                heading = Some(h);
            }

            if config.fits(para.chars().count()) {
                acc.push(para, start, end, BoundaryType::Paragraph, heading.as_deref());
                continue;
            }

            for (s, e) in sentence_spans(para, start) {
                for (ps, pe) in fit_words(text, s, e, config.max_chars()) {
                    acc.push(&text[ps..pe], ps, pe, BoundaryType::Sentence, heading.as_deref());
                }
            }
            // sentences of one paragraph never share a chunk with the next paragraph
            acc.emit();
        }

        Ok(finalize(text, acc.finish(), config))
    }
}

/// Running chunk state shared by paragraph and sentence units.
struct Accumulator<'c> {
    config: &'c SegmenterConfig,
    drafts: Vec<Draft>,
    current: Option<Current>,
    seed: String,
}

struct Current {
    draft: Draft,
    chars: usize,
    /// Byte offset in `draft.content` where the most recent unit begins.
    last_unit_at: usize,
}

impl<'c> Accumulator<'c> {
    fn new(config: &'c SegmenterConfig) -> Self {
        Self {
            config,
            drafts: Vec::new(),
            current: None,
            seed: String::new(),
        }
    }

    fn push(
        &mut self,
        unit: &str,
        start: usize,
        end: usize,
        boundary: BoundaryType,
        heading: Option<&str>,
    ) {
        let sep = separator(boundary);
        let unit_chars = unit.chars().count();

        if let Some(cur) = self.current.as_mut() {
            let combined = cur.chars + sep.len() + unit_chars;
            if cur.draft.boundary == boundary && self.config.fits(combined) {
                cur.draft.content.push_str(sep);
                cur.last_unit_at = cur.draft.content.len();
                cur.draft.content.push_str(unit);
                cur.draft.end = end;
                cur.chars = combined;
                return;
            }
            self.emit();
        }

        let mut content = String::new();
        let mut overlap_len = 0;
        let seed_chars = self.seed.chars().count();
        if !self.seed.is_empty() && self.config.fits(seed_chars + sep.len() + unit_chars) {
            content.push_str(&self.seed);
            overlap_len = content.len();
            content.push_str(sep);
        }
        let chars = content.chars().count() + unit_chars;
        let last_unit_at = content.len();
        content.push_str(unit);

        self.current = Some(Current {
            draft: Draft {
                content,
                overlap_len,
                start,
                end,
                boundary,
                heading: heading.map(str::to_string),
            },
            chars,
            last_unit_at,
        });
    }

    /// Close the running chunk and derive the overlap seed from its last unit.
    fn emit(&mut self) {
        if let Some(cur) = self.current.take() {
            let last_unit = &cur.draft.content[cur.last_unit_at..];
            self.seed = overlap_tail(last_unit, self.config.overlap_chars()).to_string();
            self.drafts.push(cur.draft);
        }
    }

    fn finish(mut self) -> Vec<Draft> {
        self.emit();
        self.drafts
    }
}

/// Trimmed, non-empty paragraph byte spans.
fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for m in PARAGRAPH_BREAK.find_iter(text) {
        push_trimmed(text, cursor, m.start(), &mut spans);
        cursor = m.end();
    }
    push_trimmed(text, cursor, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    spans.push((start + lead, start + lead + trimmed.len()));
}

/// Sentence byte spans of `para`, offset by `base` into the full text.
fn sentence_spans(para: &str, base: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for m in SENTENCE_END.find_iter(para) {
        let end = cursor + para[cursor..m.end()].trim_end().len();
        if end > cursor {
            spans.push((base + cursor, base + end));
        }
        cursor = m.end();
    }
    let rest = para[cursor..].trim_end();
    if !rest.is_empty() {
        spans.push((base + cursor, base + cursor + rest.len()));
    }
    spans
}

/// Split `text[start..end]` at word boundaries into pieces of at most `max_chars`.
///
/// A single word longer than `max_chars` is cut at character boundaries.
fn fit_words(text: &str, start: usize, end: usize, max_chars: usize) -> Vec<(usize, usize)> {
    let span = &text[start..end];
    if span.chars().count() <= max_chars {
        return vec![(start, end)];
    }

    let mut pieces = Vec::new();
    let mut piece: Option<(usize, usize)> = None;

    for (ws, we) in word_spans(span) {
        let (ws, we) = (start + ws, start + we);
        if text[ws..we].chars().count() > max_chars {
            if let Some(p) = piece.take() {
                pieces.push(p);
            }
            pieces.extend(hard_split(text, ws, we, max_chars));
            continue;
        }
        piece = match piece {
            Some((ps, _)) if text[ps..we].chars().count() <= max_chars => Some((ps, we)),
            Some(p) => {
                pieces.push(p);
                Some((ws, we))
            }
            None => Some((ws, we)),
        };
    }
    if let Some(p) = piece {
        pieces.push(p);
    }
    pieces
}

fn word_spans(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match (c.is_whitespace(), word_start) {
            (false, None) => word_start = Some(i),
            (true, Some(ws)) => {
                spans.push((ws, i));
                word_start = None;
            }
            _ => {}
        }
    }
    if let Some(ws) = word_start {
        spans.push((ws, s.len()));
    }
    spans
}

fn hard_split(text: &str, start: usize, end: usize, max_chars: usize) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut piece_start = start;
    let mut count = 0;
    for (i, _) in text[start..end].char_indices() {
        if count == max_chars {
            pieces.push((piece_start, start + i));
            piece_start = start + i;
            count = 0;
        }
        count += 1;
    }
    if piece_start < end {
        pieces.push((piece_start, end));
    }
    pieces
}

/// Markdown-style heading on the paragraph's first line.
fn heading_of(para: &str) -> Option<String> {
    let first = para.lines().next()?.trim_start();
    if !first.starts_with('#') {
        return None;
    }
    let h = first.trim_start_matches('#').trim();
    if h.is_empty() {
        None
    } else {
        Some(h.to_string())
    }
}
