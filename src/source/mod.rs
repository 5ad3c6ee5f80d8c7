//! Source module - Everything a query can read
//!
//! Provides:
//! - chunked: chunk-driven lazy scanning shared by the streaming accessors
//! - extract: printable string extraction (batch and streaming)
//! - lines: line splitting (batch and streaming)
//! - content: document resolution and the three content views

pub mod chunked;
pub mod content;
pub mod extract;
pub mod lines;
