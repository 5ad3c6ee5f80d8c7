//! Query configuration
//!
//! Extraction defaults and streaming chunk size. Populated from global CLI
//! flags (with environment fallbacks) or left at the defaults.

use serde::{Deserialize, Serialize};

use crate::source::extract::ExtractOptions;

/// Default read chunk size for streamed accessors (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration shared by every accessor of a content source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Options for printable-string extraction on binary targets
    #[serde(default)]
    pub extract: ExtractOptions,

    /// Bytes requested per read when streaming a file
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            extract: ExtractOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl QueryConfig {
    /// Override the chunk size; zero is clamped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }
}
