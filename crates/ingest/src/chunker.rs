use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex is valid"));

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Validated chunking parameters. Every constructor, deserialization included,
/// goes through [`ChunkerConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChunkerConfig")]
pub struct ChunkerConfig {
    max_chunk_size: usize,
    overlap: usize,
}

#[derive(Deserialize)]
struct RawChunkerConfig {
    max_chunk_size: usize,
    overlap: usize,
}

impl TryFrom<RawChunkerConfig> for ChunkerConfig {
    type Error = RagError;

    fn try_from(raw: RawChunkerConfig) -> Result<Self> {
        Self::new(raw.max_chunk_size, raw.overlap)
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(RagError::Config(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_chunk_size {
            return Err(RagError::Config(format!(
                "overlap ({overlap}) must be less than max_chunk_size ({max_chunk_size})"
            )));
        }
        Ok(Self {
            max_chunk_size,
            overlap,
        })
    }

    /// Same as [`ChunkerConfig::new`] but for values that arrive signed, e.g. from JSON.
    pub fn from_signed(max_chunk_size: i64, overlap: i64) -> Result<Self> {
        if max_chunk_size <= 0 {
            return Err(RagError::Config(format!(
                "max_chunk_size must be greater than zero, got {max_chunk_size}"
            )));
        }
        if overlap < 0 {
            return Err(RagError::Config(format!(
                "overlap must not be negative, got {overlap}"
            )));
        }
        let max = usize::try_from(max_chunk_size)
            .map_err(|_| RagError::Config("max_chunk_size out of range".to_string()))?;
        let overlap = usize::try_from(overlap)
            .map_err(|_| RagError::Config("overlap out of range".to_string()))?;
        Self::new(max, overlap)
    }

    /// Upper bound on chunk length, in characters.
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Characters shared between consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// How a document is split before embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Sliding window that snaps to sentence, then word boundaries.
    #[default]
    Sentence,
    /// Blank-line paragraphs first; only oversized paragraphs are windowed.
    Paragraph,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, text: &str, strategy: ChunkStrategy) -> Vec<String> {
        let chunks = match strategy {
            ChunkStrategy::Sentence => self.chunk_text(text),
            ChunkStrategy::Paragraph => self.chunk_by_paragraphs(text),
        };
        debug!(
            ?strategy,
            max_chunk_size = self.config.max_chunk_size,
            overlap = self.config.overlap,
            chunks = chunks.len(),
            "chunked text"
        );
        chunks
    }

    /// Split `text` into overlapping chunks of at most `max_chunk_size` characters.
    ///
    /// Offsets are counted in chars on the whitespace-normalized text. Each
    /// window is cut at the last sentence terminator inside it, else at the last
    /// space, else hard at the window end. The cursor always moves forward, so
    /// the scan terminates for every valid config.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() <= self.config.max_chunk_size {
            return vec![normalized];
        }

        self.spans(&chars)
            .into_iter()
            .filter_map(|(start, end)| {
                let piece: String = chars[start..end].iter().collect();
                let piece = piece.trim();
                (!piece.is_empty()).then(|| piece.to_string())
            })
            .collect()
    }

    /// Raw `[start, end)` windows over `chars`, before trimming.
    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let max = self.config.max_chunk_size;
        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let candidate_end = (start + max).min(len);
            let mut end = candidate_end;

            if candidate_end < len {
                if let Some(p) = find_sentence_boundary(chars, start, candidate_end) {
                    end = p + 1;
                } else if let Some(p) = find_word_boundary(chars, start, candidate_end) {
                    end = p;
                }
            }

            spans.push((start, end));

            if end >= len {
                break;
            }

            let next = end.saturating_sub(self.config.overlap);
            start = if next > start { next } else { end };
        }

        spans
    }

    /// Paragraph-aware chunking: short paragraphs are kept verbatim (trimmed),
    /// long ones are windowed with [`Chunker::chunk_text`].
    pub fn chunk_by_paragraphs(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();

        for paragraph in PARAGRAPH_BREAK.split(text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if paragraph.chars().count() <= self.config.max_chunk_size {
                chunks.push(paragraph.to_string());
            } else {
                chunks.extend(self.chunk_text(paragraph));
            }
        }

        chunks
    }
}

/// Collapse every whitespace run to one space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last sentence terminator at a position strictly after `start` inside `[start, end)`.
fn find_sentence_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start + 1..end)
        .rev()
        .find(|&i| SENTENCE_TERMINATORS.contains(&chars[i]))
}

/// Last space at a position strictly after `start` inside `[start, end)`.
fn find_word_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start + 1..end).rev().find(|&i| chars[i] == ' ')
}
