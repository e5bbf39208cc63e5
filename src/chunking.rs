use crate::config::{ConfigError, Settings};
use crate::document::{Document, Metadata, SOURCE_KEY};
use serde_json::Value;

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The actual text content of this chunk
    pub content: String,
    /// Metadata of the parent document, unchanged
    pub metadata: Metadata,
    /// Character offset of this chunk in the parent document
    pub start_position: usize,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }
}

/// Window size, overlap (both in characters) and separator preference
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tried in order; an empty separator allows a cut at any character
    pub separators: Vec<String>,
}

impl SplitterConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        SplitterConfig {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            separators: settings.separators.clone(),
        }
    }
}

/// Recursive character splitter producing overlapping windows.
///
/// A window never exceeds `chunk_size` characters and the next window of the same
/// document starts exactly `chunk_overlap` characters before the previous one
/// ended, so consecutive chunks share that many characters verbatim.
#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitterConfig,
    separators: Vec<Vec<char>>,
}

impl Splitter {
    pub fn new(config: SplitterConfig) -> Result<Self, ConfigError> {
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        let separators = config
            .separators
            .iter()
            .map(|s| s.chars().collect())
            .collect();

        Ok(Splitter { config, separators })
    }

    /// Split every document, keeping each parent's metadata on its chunks
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .map(move |(start_position, content)| Chunk {
                        content,
                        metadata: doc.metadata.clone(),
                        start_position,
                    })
            })
            .collect()
    }

    /// Split text into `(start offset, window)` pairs, offsets counted in chars
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= size {
                windows.push((start, chars[start..].iter().collect()));
                break;
            }

            let end = self.window_end(&chars, start);
            windows.push((start, chars[start..end].iter().collect()));
            start = end - overlap;
        }

        windows
    }

    /// Furthest cut within `chunk_size` that still extends past the overlap
    fn window_end(&self, chars: &[char], start: usize) -> usize {
        let lowest = start + self.config.chunk_overlap;
        let highest = start + self.config.chunk_size;

        self.separators
            .iter()
            .find_map(|separator| last_boundary(chars, separator, start, lowest, highest))
            .unwrap_or(highest)
    }
}

/// Last position in `(lowest, highest]` directly after an occurrence of
/// `separator` lying entirely at or after `start`
fn last_boundary(
    chars: &[char],
    separator: &[char],
    start: usize,
    lowest: usize,
    highest: usize,
) -> Option<usize> {
    if separator.is_empty() {
        return Some(highest);
    }

    (lowest + 1..=highest).rev().find(|&end| {
        end >= start + separator.len() && chars[end - separator.len()..end] == *separator
    })
}
