//! Line splitting
//!
//! `\n` and `\r\n` both terminate a line. A trailing terminator does not
//! produce an empty final line, and the final unterminated segment is still
//! yielded, so `"a\nb\n"` and `"a\nb"` both split into `["a", "b"]`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::source::chunked::{scan_all, ChunkScanner, ChunkedStream};

/// Incremental splitter holding the partial segment between chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, out: &mut VecDeque<String>) {
        out.push_back(String::from_utf8_lossy(&self.partial).into_owned());
        self.partial.clear();
    }
}

impl ChunkScanner for LineSplitter {
    fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<String>) {
        let mut rest = chunk;
        while let Some(idx) = rest.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&rest[..idx]);
            // `\r` may have arrived at the end of the previous chunk
            if self.partial.last() == Some(&b'\r') {
                self.partial.pop();
            }
            self.emit(out);
            rest = &rest[idx + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn finish(&mut self, out: &mut VecDeque<String>) {
        if !self.partial.is_empty() {
            self.emit(out);
        }
    }
}

/// Streaming line reader over any reader
pub type LineReader<R> = ChunkedStream<R, LineSplitter>;

/// Split an in-memory text into lines.
pub fn split_lines(text: &str) -> Vec<String> {
    scan_all(LineSplitter::new(), text.as_bytes())
}

/// Read a whole file and split it into lines.
pub fn read_file_lines(path: &Path) -> io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    Ok(scan_all(LineSplitter::new(), &bytes))
}

pub fn lines_from_reader<R: Read>(reader: R, chunk_size: usize) -> LineReader<R> {
    ChunkedStream::new(reader, LineSplitter::new(), chunk_size)
}

/// Stream the lines of a file without loading it.
pub fn stream_file_lines(path: &Path, chunk_size: usize) -> io::Result<LineReader<File>> {
    let file = File::open(path)?;
    Ok(lines_from_reader(file, chunk_size))
}
