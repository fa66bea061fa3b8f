//! Recursive character splitter.
//!
//! Text is split on the first separator that occurs in it (paragraph, line,
//! sentence, word, then single characters), each piece keeping the separator
//! that ends it. Pieces are packed greedily into
//! windows of at most `max_chars`; when a window is emitted, the trailing
//! pieces that fit within `overlap_chars` are carried into the next window.
//! Pieces that are still too long are split again with the next separator.
//! Lengths are counted in `char`s.

use crate::error::IngestError;
use crate::models::{Chunk, TextUnit};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

pub const DEFAULT_MAX_CHARS: usize = 5_000;
pub const DEFAULT_OVERLAP_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS, DEFAULT_OVERLAP_CHARS)
    }
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
            separators: ["\n\n", "\n", ". ", " ", ""]
                .iter()
                .map(|separator| separator.to_string())
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(mut config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        // Character splitting is the terminal fallback that bounds every piece.
        if config.separators.last().map(String::as_str) != Some("") {
            config.separators.push(String::new());
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.config.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let mut output = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.config.max_chars {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                output.extend(self.merge(&fitting));
                fitting.clear();
            }

            if remaining.is_empty() {
                if let Some(trimmed) = trimmed_window(&piece) {
                    output.push(trimmed);
                }
            } else {
                output.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !fitting.is_empty() {
            output.extend(self.merge(&fitting));
        }

        output
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > max && !current.is_empty() {
                if let Some(window) = trimmed_window(&current.iter().copied().collect::<String>()) {
                    windows.push(window);
                }

                while total > overlap || (total > 0 && total + len > max) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(window) = trimmed_window(&current.iter().copied().collect::<String>()) {
            windows.push(window);
        }

        windows
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (position, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[position + 1..]);
        }
    }
    ("", &[])
}

/// Splits on `separator`, keeping it at the end of the piece it terminates.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn trimmed_window(window: &str) -> Option<String> {
    let trimmed = window.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits every unit independently; chunk indices run across the whole batch.
pub fn build_chunks(units: &[TextUnit], splitter: &TextSplitter) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for unit in units {
        for text in splitter.split_text(&unit.text) {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(&unit.document_id, unit.page, cursor, &text),
                document_id: unit.document_id.clone(),
                source_name: unit.source_name.clone(),
                page: unit.page,
                chunk_index: cursor,
                text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    chunks
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
