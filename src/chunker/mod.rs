//! Chunker
//!
//! Groups extracted text lines into paragraph-like chunks. A new chunk
//! starts when the page changes, when the vertical gap to the previous line
//! exceeds the merge distance, or when the next line would push the chunk
//! past the character limit. Lines are never split, so a single line longer
//! than the limit becomes a chunk of its own.
//!
//! Chunking is lazy and restartable: [`Chunker::chunks`] borrows the line
//! slice and can be called again to walk the same chunks from the start.

use serde::{Deserialize, Serialize};

use crate::annotations::Rect;
use crate::extraction::TextLine;

/// Default character limit per chunk
pub const DEFAULT_MAX_CHARS: usize = 1200;

/// Default vertical gap (PDF points) that starts a new paragraph
pub const DEFAULT_MERGE_DISTANCE: f32 = 12.0;

/// Chunking thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub merge_distance: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            merge_distance: DEFAULT_MERGE_DISTANCE,
        }
    }
}

/// A contiguous group of lines on one page, scored as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in document order
    pub ordinal: usize,
    pub page_index: u32,
    /// One rectangle per line, reading order
    pub rects: Vec<Rect>,
    /// Line texts concatenated verbatim
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
}

impl Chunk {
    /// Short single-line preview of the text
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Line grouping with fixed thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Lazily chunk `lines`, which must be in reading order per page
    pub fn chunks<'a>(&self, lines: &'a [TextLine]) -> Chunks<'a> {
        Chunks {
            lines,
            position: 0,
            next_ordinal: 0,
            config: self.config,
        }
    }
}

/// Iterator over the chunks of a line slice
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    lines: &'a [TextLine],
    position: usize,
    next_ordinal: usize,
    config: ChunkerConfig,
}

struct OpenChunk {
    page_index: u32,
    rects: Vec<Rect>,
    text: String,
    char_count: usize,
    last_bottom: f32,
}

impl OpenChunk {
    fn start(line: &TextLine, line_chars: usize) -> Self {
        Self {
            page_index: line.page_index,
            rects: vec![line.rect],
            text: line.text.clone(),
            char_count: line_chars,
            last_bottom: line.rect.bottom(),
        }
    }

    fn accepts(&self, line: &TextLine, line_chars: usize, config: &ChunkerConfig) -> bool {
        if line.page_index != self.page_index {
            return false;
        }
        if line.rect.top() - self.last_bottom > config.merge_distance {
            return false;
        }
        self.char_count + line_chars <= config.max_chars
    }

    fn push(&mut self, line: &TextLine, line_chars: usize) {
        self.rects.push(line.rect);
        self.text.push_str(&line.text);
        self.char_count += line_chars;
        self.last_bottom = line.rect.bottom();
    }

    fn finish(self, ordinal: usize) -> Chunk {
        let word_count = word_count(&self.text);
        Chunk {
            ordinal,
            page_index: self.page_index,
            rects: self.rects,
            text: self.text,
            char_count: self.char_count,
            word_count,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut open: Option<OpenChunk> = None;

        while let Some(line) = self.lines.get(self.position) {
            if !line.has_words() {
                self.position += 1;
                continue;
            }

            let line_chars = line.text.chars().count();
            match open.as_mut() {
                None => open = Some(OpenChunk::start(line, line_chars)),
                Some(chunk) if chunk.accepts(line, line_chars, &self.config) => {
                    chunk.push(line, line_chars)
                }
                // Leave the line for the next call
                Some(_) => break,
            }
            self.position += 1;
        }

        let chunk = open?.finish(self.next_ordinal);
        self.next_ordinal += 1;
        Some(chunk)
    }
}
