use std::ops::Range;

use distill_core::config::{default_separators, ChunkingConfig};
use serde::Serialize;
use thiserror::Error;

/// A contiguous slice of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// 1-based position in the chunk sequence.
    pub index: usize,
    pub text: String,
    /// Byte offset of the first character in the document.
    pub start: usize,
    /// Byte offset one past the last character in the document.
    pub end: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_size})")]
    OverlapTooLarge { overlap: usize, max_size: usize },
}

/// Splitter settings. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub max_size: usize,
    pub overlap: usize,
    /// Tried in order; an empty separator means a hard character cut.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            overlap: 100,
            separators: default_separators(),
        }
    }
}

impl From<&ChunkingConfig> for ChunkerConfig {
    fn from(cfg: &ChunkingConfig) -> Self {
        Self {
            max_size: cfg.chunk_size,
            overlap: cfg.chunk_overlap,
            separators: cfg.separators.clone(),
        }
    }
}

/// Recursive separator-based splitter with a fixed character overlap.
///
/// Every chunk after the first starts with exactly `overlap` characters taken
/// from the end of its predecessor, followed by at most `max_size - overlap`
/// new characters. The first chunk may use the full `max_size`.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkerConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkError> {
        if config.max_size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if config.overlap >= config.max_size {
            return Err(ChunkError::OverlapTooLarge {
                overlap: config.overlap,
                max_size: config.max_size,
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into ordered chunks. Empty text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let max_size = self.config.max_size;
        let overlap = self.config.overlap;

        if char_len(text) <= max_size {
            return vec![Chunk {
                index: 1,
                text: text.to_string(),
                start: 0,
                end: text.len(),
            }];
        }

        // Pieces must leave room for the overlap prefix of a later chunk.
        let budget = max_size - overlap;
        let mut pieces = Vec::new();
        split_pieces(text, 0, budget, &self.config.separators, &mut pieces);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut next = 0;
        while next < pieces.len() {
            let fresh_start = pieces[next].start;
            let limit = if chunks.is_empty() { max_size } else { budget };

            let mut fresh_len = 0;
            let mut fresh_end = fresh_start;
            while next < pieces.len() {
                let len = char_len(&text[pieces[next].clone()]);
                if fresh_len > 0 && fresh_len + len > limit {
                    break;
                }
                fresh_len += len;
                fresh_end = pieces[next].end;
                next += 1;
            }

            let start = if chunks.is_empty() {
                fresh_start
            } else {
                back_chars(text, fresh_start, overlap)
            };

            chunks.push(Chunk {
                index: chunks.len() + 1,
                text: text[start..fresh_end].to_string(),
                start,
                end: fresh_end,
            });
        }

        chunks
    }
}

/// Rebuild the source text from a chunk sequence by dropping overlaps.
pub fn stitch(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0;
    for chunk in chunks {
        if chunk.end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start);
        out.push_str(&chunk.text[skip..]);
        covered = chunk.end;
    }
    out
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset `n` characters before `pos` (clamped to the start of `text`).
fn back_chars(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    text[..pos]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Tile `text` into byte ranges of at most `budget` characters each.
/// Separators stay attached to the end of the piece they close.
fn split_pieces(
    text: &str,
    offset: usize,
    budget: usize,
    separators: &[String],
    out: &mut Vec<Range<usize>>,
) {
    if char_len(text) <= budget {
        out.push(offset..offset + text.len());
        return;
    }

    let found = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(sep.as_str()));

    let Some((pos, sep)) = found else {
        hard_cut(text, offset, budget, out);
        return;
    };
    if sep.is_empty() {
        hard_cut(text, offset, budget, out);
        return;
    }

    let finer = &separators[pos + 1..];
    let mut piece_start = 0;
    for piece in text.split_inclusive(sep.as_str()) {
        split_pieces(piece, offset + piece_start, budget, finer, out);
        piece_start += piece.len();
    }
}

fn hard_cut(text: &str, offset: usize, budget: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == budget {
            out.push(offset + start..offset + i);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(offset + start..offset + text.len());
    }
}
