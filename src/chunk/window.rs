//! Fixed-size word windows, used when `respect_boundaries` is off.

use super::{finalize, Draft, Segmenter, SegmenterConfig};
use crate::error::ValidationError;
use crate::models::{BoundaryType, TextChunk};

/// Greedy word windows of at most `max_tokens`, each starting with up to
/// `overlap_tokens` of the previous window's trailing words.
pub struct WindowSegmenter;

/// A word (or a piece of an oversized word) with byte and char offsets.
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    char_start: usize,
    char_end: usize,
}

impl Segmenter for WindowSegmenter {
    fn segment(
        &self,
        text: &str,
        config: &SegmenterConfig,
    ) -> Result<Vec<TextChunk>, ValidationError> {
        config.validate()?;
        let max_chars = config.max_chars();
        let overlap_chars = config.overlap_chars();
        let units = units(text, max_chars);

        let span = |a: usize, b: usize| units[b].char_end - units[a].char_start;

        let mut drafts = Vec::new();
        let mut first = 0;
        let mut own = 0;

        while own < units.len() {
            if first < own && span(first, own) > max_chars {
                first = own;
            }
            let mut last = own;
            while last + 1 < units.len() && span(first, last + 1) <= max_chars {
                last += 1;
            }

            let overlap_len = if first < own {
                units[own - 1].end - units[first].start
            } else {
                0
            };
            drafts.push(Draft {
                content: text[units[first].start..units[last].end].to_string(),
                overlap_len,
                start: units[own].start,
                end: units[last].end,
                boundary: BoundaryType::Arbitrary,
                heading: None,
            });

            let mut next_first = last + 1;
            while next_first > first + 1 && span(next_first - 1, last) <= overlap_chars {
                next_first -= 1;
            }
            first = next_first;
            own = last + 1;
        }

        Ok(finalize(text, drafts, config))
    }
}

fn units(text: &str, max_chars: usize) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut word: Option<(usize, usize)> = None;
    let mut chars = 0;

    for (byte, c) in text.char_indices() {
        match (c.is_whitespace(), word) {
            (false, None) => word = Some((byte, chars)),
            (true, Some((start, char_start))) => {
                push_word(text, start, byte, char_start, chars, max_chars, &mut units);
                word = None;
            }
            _ => {}
        }
        chars += 1;
    }
    if let Some((start, char_start)) = word {
        push_word(text, start, text.len(), char_start, chars, max_chars, &mut units);
    }
    units
}

fn push_word(
    text: &str,
    start: usize,
    end: usize,
    char_start: usize,
    char_end: usize,
    max_chars: usize,
    units: &mut Vec<Unit>,
) {
    if char_end - char_start <= max_chars {
        units.push(Unit {
            start,
            end,
            char_start,
            char_end,
        });
        return;
    }

    let mut piece_start = start;
    let mut piece_char_start = char_start;
    for (n, (offset, _)) in text[start..end].char_indices().enumerate() {
        if n > 0 && n % max_chars == 0 {
            units.push(Unit {
                start: piece_start,
                end: start + offset,
                char_start: piece_char_start,
                char_end: char_start + n,
            });
            piece_start = start + offset;
            piece_char_start = char_start + n;
        }
    }
    units.push(Unit {
        start: piece_start,
        end,
        char_start: piece_char_start,
        char_end,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::estimate_tokens;

    fn cfg(max_tokens: usize, overlap_tokens: usize) -> SegmenterConfig {
        SegmenterConfig {
            max_tokens,
            overlap_tokens,
            min_chunk_size: 0,
            respect_boundaries: false,
        }
    }

    fn sample() -> String {
        (0..120)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_input() {
        assert!(WindowSegmenter.segment("", &cfg(10, 2)).unwrap().is_empty());
        assert!(WindowSegmenter.segment(" \n\t ", &cfg(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_windows_respect_max_tokens() {
        let text = sample();
        let config = cfg(10, 3);
        let chunks = WindowSegmenter.segment(&text, &config).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(estimate_tokens(&c.content) <= config.max_tokens);
            assert_eq!(c.metadata.boundary, BoundaryType::Arbitrary);
        }
    }

    #[test]
    fn test_windows_overlap_and_reconstruct() {
        let text = sample();
        let config = cfg(10, 3);
        let chunks = WindowSegmenter.segment(&text, &config).unwrap();

        assert_eq!(chunks[0].metadata.overlap_len, 0);
        for pair in chunks.windows(2) {
            let overlap = &pair[1].content[..pair[1].metadata.overlap_len];
            assert!(!overlap.is_empty());
            assert!(overlap.chars().count() <= config.overlap_tokens * 4);
            assert!(pair[0].content.ends_with(overlap));
        }

        let rebuilt = chunks
            .iter()
            .map(|c| c.own_content())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_no_overlap_when_disabled() {
        let text = sample();
        let chunks = WindowSegmenter.segment(&text, &cfg(10, 0)).unwrap();
        for c in &chunks {
            assert_eq!(c.metadata.overlap_len, 0);
        }
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let slice: String = chars[c.metadata.start_offset..c.metadata.end_offset]
                .iter()
                .collect();
            assert_eq!(slice, c.content);
        }
    }

    #[test]
    fn test_oversized_word_hard_split() {
        let text = "x".repeat(50);
        let chunks = WindowSegmenter.segment(&text, &cfg(5, 0)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.len(), 20);
        assert_eq!(chunks[2].content.len(), 10);
        assert_eq!(chunks[2].metadata.end_offset, 50);
    }
}
