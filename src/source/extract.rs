//! Printable string extraction
//!
//! Finds maximal runs of printable ASCII bytes (32..=126) in binary content,
//! the way `strings(1)` does. The batch and streaming variants share one
//! [`RunScanner`], so they emit identical runs no matter how the input is
//! chunked.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use crate::source::chunked::{scan_all, ChunkScanner, ChunkedStream};

/// Default minimum run length
pub const DEFAULT_MIN_LENGTH: usize = 4;

/// Encoding used to turn a run of bytes into a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Utf16le,
}

impl std::str::FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "ascii" => Ok(TextEncoding::Ascii),
            "latin1" | "binary" => Ok(TextEncoding::Latin1),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(TextEncoding::Utf16le),
            _ => Err(format!("Unknown encoding: {}", s)),
        }
    }
}

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Utf16le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        }
    }
}

/// Extraction options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOptions {
    #[serde(default)]
    pub encoding: TextEncoding,

    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

#[inline]
fn is_printable(byte: u8) -> bool {
    (32..=126).contains(&byte)
}

/// Run detector carrying the open run across chunk boundaries.
///
/// Only the current open run is buffered. An empty run never qualifies,
/// even with `min_length` 0.
#[derive(Debug)]
pub struct RunScanner {
    options: ExtractOptions,
    current: Vec<u8>,
}

impl RunScanner {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            current: Vec::new(),
        }
    }

    fn close(&mut self, out: &mut VecDeque<String>) {
        if !self.current.is_empty() && self.current.len() >= self.options.min_length {
            out.push_back(self.options.encoding.decode(&self.current));
        }
        self.current.clear();
    }
}

impl ChunkScanner for RunScanner {
    fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<String>) {
        let mut rest = chunk;
        while !rest.is_empty() {
            match rest.iter().position(|b| !is_printable(*b)) {
                Some(idx) => {
                    self.current.extend_from_slice(&rest[..idx]);
                    self.close(out);
                    rest = &rest[idx + 1..];
                }
                None => {
                    self.current.extend_from_slice(rest);
                    break;
                }
            }
        }
    }

    fn finish(&mut self, out: &mut VecDeque<String>) {
        self.close(out);
    }
}

/// Streaming extractor over any reader
pub type ExtractedStrings<R> = ChunkedStream<R, RunScanner>;

/// Extract runs from an in-memory buffer.
pub fn extract_from_bytes(bytes: &[u8], options: ExtractOptions) -> Vec<String> {
    scan_all(RunScanner::new(options), bytes)
}

/// Batch extraction: read the whole file, then scan it.
pub fn extract_strings(path: &Path, options: ExtractOptions) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    Ok(extract_from_bytes(&bytes, options))
}

/// Streaming extraction over an arbitrary reader.
pub fn extract_from_reader<R: Read>(
    reader: R,
    options: ExtractOptions,
    chunk_size: usize,
) -> ExtractedStrings<R> {
    ChunkedStream::new(reader, RunScanner::new(options), chunk_size)
}

/// Streaming extraction: runs are yielded as soon as they close.
pub fn extract_strings_lazy(
    path: &Path,
    options: ExtractOptions,
    chunk_size: usize,
) -> io::Result<ExtractedStrings<File>> {
    let file = File::open(path)?;
    Ok(extract_from_reader(file, options, chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::chunked::testing::{FailingReader, SplitReader, TrackedReader};
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn opts(min_length: usize) -> ExtractOptions {
        ExtractOptions {
            encoding: TextEncoding::Utf8,
            min_length,
        }
    }

    fn collect_lazy<R: Read>(reader: R, options: ExtractOptions) -> Vec<String> {
        extract_from_reader(reader, options, 4096)
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_extracts_runs_between_control_bytes() {
        let data = b"\x00\x01hello\x00ab\x7fworld!\xff";
        assert_eq!(
            extract_from_bytes(data, ExtractOptions::default()),
            vec!["hello", "world!"]
        );
    }

    #[test]
    fn test_min_length_is_inclusive() {
        let data = b"abc\x00abcd\x00abcde";
        assert_eq!(extract_from_bytes(data, opts(4)), vec!["abcd", "abcde"]);
        assert_eq!(extract_from_bytes(data, opts(3)), vec!["abc", "abcd", "abcde"]);
    }

    #[test]
    fn test_trailing_run_is_flushed() {
        let data = b"\x00\x00tail-run";
        assert_eq!(extract_from_bytes(data, opts(4)), vec!["tail-run"]);
    }

    #[test]
    fn test_newline_and_tab_break_runs() {
        let data = b"line one\nline\ttwo";
        assert_eq!(extract_from_bytes(data, opts(4)), vec!["line one", "line"]);
    }

    #[test]
    fn test_zero_min_length_skips_empty_runs() {
        let data = b"\x00\x00a\x00";
        assert_eq!(extract_from_bytes(data, opts(0)), vec!["a"]);
    }

    #[test]
    fn test_run_split_across_chunks() {
        let data = b"\x01abcdefgh\x02ijkl";
        let reader = SplitReader::new(data, &[3, 1, 2]);
        assert_eq!(collect_lazy(reader, opts(4)), vec!["abcdefgh", "ijkl"]);
    }

    #[test]
    fn test_encodings() {
        assert_eq!(TextEncoding::Latin1.decode(b"abc"), "abc");
        assert_eq!(TextEncoding::Ascii.decode(b"abc"), "abc");
        assert_eq!(TextEncoding::Utf16le.decode(b"a\0b\0"), "ab");
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("ucs2".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16le);
        assert!("ebcdic".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_batch_missing_file_propagates_not_found() {
        let temp = tempdir().unwrap();
        let err = extract_strings(&temp.path().join("nope.bin"), opts(4)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(extract_strings_lazy(&temp.path().join("nope.bin"), opts(4), 16).is_err());
    }

    #[test]
    fn test_file_batch_and_lazy_agree() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("app.exe");
        let mut data = Vec::new();
        for i in 0..500u32 {
            data.extend_from_slice(format!("symbol_{i}").as_bytes());
            data.extend_from_slice(&[0, (i % 7) as u8, 0xff]);
        }
        fs::write(&path, &data).unwrap();

        let batch = extract_strings(&path, opts(4)).unwrap();
        let lazy: Vec<String> = extract_strings_lazy(&path, opts(4), 7)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(batch.len(), 500);
        assert_eq!(batch, lazy);
    }

    #[test]
    fn test_reader_released_on_completion() {
        let (reader, released) = TrackedReader::new(SplitReader::new(b"abcd\0efgh", &[2]));
        let mut stream = extract_from_reader(reader, opts(4), 8);
        assert_eq!(stream.next().unwrap().unwrap(), "abcd");
        assert!(!released.load(Ordering::SeqCst));
        assert_eq!(stream.next().unwrap().unwrap(), "efgh");
        assert!(stream.next().is_none());
        assert!(stream.is_exhausted());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reader_released_on_early_drop() {
        let (reader, released) = TrackedReader::new(SplitReader::new(b"abcd\0efgh\0ijkl", &[5]));
        let mut stream = extract_from_reader(reader, opts(4), 8);
        assert_eq!(stream.next().unwrap().unwrap(), "abcd");
        drop(stream);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_error_is_propagated_after_partial_output() {
        let reader = FailingReader {
            prefix: b"first\0sec".to_vec(),
            served: false,
        };
        let mut stream = extract_from_reader(reader, opts(4), 64);
        assert_eq!(stream.next().unwrap().unwrap(), "first");
        let err = stream.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "disk went away");
        assert!(stream.next().is_none());
    }

    proptest! {
        #[test]
        fn prop_chunking_never_changes_output(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            sizes in proptest::collection::vec(1usize..64, 1..8),
            min_length in 0usize..8,
        ) {
            let options = opts(min_length);
            let batch = extract_from_bytes(&data, options);
            let lazy = collect_lazy(SplitReader::new(&data, &sizes), options);
            prop_assert_eq!(batch, lazy);
        }

        #[test]
        fn prop_printable_heavy_input(
            data in proptest::collection::vec(prop_oneof![32u8..127, Just(0u8), Just(10u8)], 0..512),
            chunk in 1usize..32,
        ) {
            let options = ExtractOptions::default();
            let batch = extract_from_bytes(&data, options);
            let lazy = collect_lazy(SplitReader::new(&data, &[chunk]), options);
            prop_assert_eq!(batch, lazy);
        }
    }
}
