//! Text cleanup and recursive chunking for extracted PDF text.
//!
//! Splits on the coarsest separator that keeps chunks under the target size
//! (paragraphs, then sentences, then words, then a hard character split),
//! carrying a tail of the previous chunk into the next one for context.
//! All sizes are in characters, not bytes.

use std::collections::{HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;

use docshelf_core::defaults::{
    CHUNK_MIN_CHARS, CHUNK_MIN_MEANINGFUL_RATIO, CHUNK_OVERLAP_RATIO, CHUNK_SIZE,
};

const SEPARATORS: [&str; 4] = ["\n\n", ". ", " ", ""];

static INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}-\u{200F}\u{202A}-\u{202E}]").unwrap());
static BULLETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[■◆◇●○▶▷◀◁▲△▼▽※☆★♥•▪◦·]").unwrap());
static UNPRINTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\t\n\r\x20-\x7E\u{00A0}-\u{D7FF}]").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static LINE_EDGES: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\n ?").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target maximum characters per chunk.
    pub chunk_size: usize,
    /// Share of `chunk_size` carried over into the following chunk.
    pub overlap_ratio: f32,
    /// Chunks shorter than this are dropped.
    pub min_chunk_chars: usize,
    /// Minimum share of letters for a chunk to be kept.
    pub min_meaningful_ratio: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            overlap_ratio: CHUNK_OVERLAP_RATIO,
            min_chunk_chars: CHUNK_MIN_CHARS,
            min_meaningful_ratio: CHUNK_MIN_MEANINGFUL_RATIO,
        }
    }
}

/// Recursive separator-based text chunker.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Strip invisible marks, bullet glyphs and unprintable characters, then
    /// normalize whitespace. Paragraph breaks survive as a single blank line.
    pub fn clean_text(text: &str) -> String {
        let text = INVISIBLE.replace_all(text, "");
        let text = BULLETS.replace_all(&text, " ");
        let text = UNPRINTABLE.replace_all(&text, " ");
        let text = SPACES.replace_all(&text, " ");
        let text = LINE_EDGES.replace_all(&text, "\n");
        let text = BLANK_LINES.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    fn is_meaningful(&self, chunk: &str) -> bool {
        let total = char_len(chunk);
        if total == 0 || total < self.config.min_chunk_chars {
            return false;
        }
        let letters = chunk.chars().filter(|c| c.is_alphabetic()).count();
        (letters as f32 / total as f32) >= self.config.min_meaningful_ratio
    }

    /// Clean and split `text`. Returned chunks are trimmed, unique, and pass
    /// the size and letter-ratio filters, in document order.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = Self::clean_text(text);
        if text.is_empty() {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size.max(1);
        let overlap = ((chunk_size as f32) * self.config.overlap_ratio) as usize;
        let mut raw = Vec::new();
        split_recursive(&text, &SEPARATORS, chunk_size, overlap, &mut raw);

        let mut seen = HashSet::new();
        raw.into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && self.is_meaningful(c))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }
}

fn flush(parts: &VecDeque<&str>, separator: &str, out: &mut Vec<String>) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    if !joined.trim().is_empty() {
        out.push(joined);
    }
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    overlap: usize,
    out: &mut Vec<String>,
) {
    if separators.is_empty() || char_len(text) <= chunk_size {
        out.push(text.to_string());
        return;
    }

    let separator = separators[0];
    let rest = &separators[1..];

    if separator.is_empty() {
        let chars: Vec<char> = text.chars().collect();
        let step = chunk_size.saturating_sub(overlap).max(1);
        let mut start = 0;
        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        return;
    }

    let sep_len = char_len(separator);
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut current_len = 0usize;

    for piece in text.split(separator) {
        let piece_len = char_len(piece);

        if piece_len > chunk_size {
            if !current.is_empty() {
                flush(&current, separator, out);
                current.clear();
                current_len = 0;
            }
            split_recursive(piece, rest, chunk_size, overlap, out);
            continue;
        }

        let joiner = if current.is_empty() { 0 } else { sep_len };
        if current_len + joiner + piece_len > chunk_size {
            flush(&current, separator, out);
            // Keep a tail no longer than `overlap` as context for the next
            // chunk, and short enough that the piece still fits after it.
            while !current.is_empty()
                && (current_len > overlap || current_len + sep_len + piece_len > chunk_size)
            {
                let Some(removed) = current.pop_front() else {
                    break;
                };
                current_len = current_len.saturating_sub(char_len(removed));
                if !current.is_empty() {
                    current_len = current_len.saturating_sub(sep_len);
                }
            }
        }

        current.push_back(piece);
        current_len += piece_len + if current.len() > 1 { sep_len } else { 0 };
    }

    if !current.is_empty() {
        flush(&current, separator, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(i: usize) -> String {
        format!("This is sentence number {} about the quarterly report", i)
    }

    #[test]
    fn test_clean_text_normalizes_whitespace() {
        let cleaned = TextChunker::clean_text("  Hello\t\t world  \n\n\n\nNext \u{200B}para ");
        assert_eq!(cleaned, "Hello world\n\nNext para");
    }

    #[test]
    fn test_clean_text_replaces_bullets_and_control_chars() {
        let cleaned = TextChunker::clean_text("• item one\x0Cpage two ▶ arrow");
        assert_eq!(cleaned, "item one page two arrow");
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::default();
        let text = "A single paragraph that is long enough to pass the minimum size filter.";
        assert_eq!(chunker.chunk(text), vec![text.to_string()]);
    }

    #[test]
    fn test_empty_and_noise_yield_nothing() {
        let chunker = TextChunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
        assert!(chunker.chunk("12345 67890 12345 67890 12345 67890 12345 67890 12345").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 200,
            ..ChunkerConfig::default()
        });
        let text = (0..40).map(sentence).collect::<Vec<_>>().join(". ");
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 200, "chunk too long: {}", char_len(chunk));
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 200,
            overlap_ratio: 0.5,
            ..ChunkerConfig::default()
        });
        let text = (0..20).map(sentence).collect::<Vec<_>>().join(". ");
        let chunks = chunker.chunk(&text);
        let last_of_first = chunks[0].rsplit(". ").next().unwrap();
        assert!(chunks[1].starts_with(last_of_first));
    }

    #[test]
    fn test_overlap_never_pushes_chunk_past_limit() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 100,
            overlap_ratio: 0.5,
            ..ChunkerConfig::default()
        });
        let a = format!("Alpha{}", "a".repeat(35));
        let b = format!("Bravo{}", "b".repeat(35));
        let c = format!("Charlie{}", "c".repeat(83));
        let chunks = chunker.chunk(&format!("{}. {}. {}", a, b, c));

        for chunk in &chunks {
            assert!(char_len(chunk) <= 100, "chunk too long: {}", char_len(chunk));
        }
        assert_eq!(chunks, vec![format!("{}. {}", a, b), c]);
    }

    #[test]
    fn test_paragraphs_preferred_over_sentences() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 120,
            overlap_ratio: 0.0,
            ..ChunkerConfig::default()
        });
        let first = "First paragraph talks about invoices and how they are filed each month.";
        let second = "Second paragraph covers receipts, which are scanned and archived weekly.";
        let chunks = chunker.chunk(&format!("{}\n\n{}", first, second));
        assert_eq!(chunks, vec![first.to_string(), second.to_string()]);
    }

    #[test]
    fn test_hard_split_for_unbroken_text() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 100,
            overlap_ratio: 0.2,
            ..ChunkerConfig::default()
        });
        let text: String = (0..250)
            .map(|i| (b'a' + ((i * 7) % 26) as u8) as char)
            .collect();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| char_len(c) <= 100));
        assert_eq!(&chunks[1][..20], &chunks[0][80..100]);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 60,
            ..ChunkerConfig::default()
        });
        let text = "한국어문서요약".repeat(30);
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| char_len(c) <= 60));
    }

    #[test]
    fn test_duplicates_removed() {
        let chunker = TextChunker::new(ChunkerConfig {
            chunk_size: 80,
            overlap_ratio: 0.0,
            ..ChunkerConfig::default()
        });
        let para = "Repeated boilerplate footer text that appears on every single page.";
        let chunks = chunker.chunk(&format!("{0}\n\n{0}\n\n{0}", para));
        assert_eq!(chunks, vec![para.to_string()]);
    }
}
