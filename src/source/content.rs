//! Content source
//!
//! Normalises a file path or an open document into three views: a
//! materialised line list, a lazy line stream and the full text. Binary
//! files (by extension) are viewed through printable-string extraction.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::core::config::QueryConfig;
use crate::core::error::QueryError;
use crate::source::extract::{extract_strings, extract_strings_lazy};
use crate::source::lines::{read_file_lines, split_lines, stream_file_lines};

/// Extensions treated as binary content
pub const BINARY_EXTENSIONS: &[&str] = &["exe", "dll", "so", "bin", "rpa", "img"];

/// Lazy, single-pass sequence of lines
pub type LineStream = Box<dyn Iterator<Item = Result<String, QueryError>> + Send>;

/// Binary/text tag derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Binary,
}

impl ContentKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            ContentKind::Binary
        } else {
            ContentKind::Text
        }
    }
}

/// Read-only capabilities of a document open in the host.
pub trait OpenDocument: Send + Sync {
    /// Current live text.
    fn text(&self) -> String;

    fn line_at(&self, index: usize) -> String;

    fn line_count(&self) -> usize;

    /// Name the host shows for the document, if any.
    fn file_name(&self) -> Option<String> {
        None
    }
}

/// Document held entirely in memory (stdin, request payloads, tests)
#[derive(Debug, Clone)]
pub struct InMemoryDocument {
    name: Option<String>,
    text: String,
    lines: Vec<String>,
}

impl InMemoryDocument {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = split_lines(&text);
        Self {
            name: None,
            text,
            lines,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl OpenDocument for InMemoryDocument {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn line_at(&self, index: usize) -> String {
        self.lines.get(index).cloned().unwrap_or_default()
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn file_name(&self) -> Option<String> {
        self.name.clone()
    }
}

/// What a query runs against: a file path, an open document, or both.
#[derive(Clone, Default)]
pub struct DocumentRef {
    file_path: Option<PathBuf>,
    document: Option<Arc<dyn OpenDocument>>,
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRef")
            .field("file_path", &self.file_path)
            .field("document", &self.document.as_ref().map(|d| d.file_name()))
            .finish()
    }
}

/// Target after resolution
#[derive(Clone)]
pub enum Resolved {
    File(PathBuf),
    Document(Arc<dyn OpenDocument>),
}

impl DocumentRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            document: None,
        }
    }

    pub fn document(document: Arc<dyn OpenDocument>) -> Self {
        Self {
            file_path: None,
            document: Some(document),
        }
    }

    pub fn with_document(mut self, document: Arc<dyn OpenDocument>) -> Self {
        self.document = Some(document);
        self
    }

    /// Prefer the path when it exists, fall back to the live document.
    pub fn resolve(&self) -> Result<Resolved, QueryError> {
        if let Some(path) = &self.file_path {
            if path.exists() {
                return Ok(Resolved::File(path.clone()));
            }
            debug!(path = %path.display(), "file path does not exist, trying open document");
        }
        match &self.document {
            Some(doc) => Ok(Resolved::Document(doc.clone())),
            None => Err(QueryError::NoReadableTarget),
        }
    }

    /// Display name: the file name of the path or the document's name.
    pub fn display_name(&self) -> String {
        self.file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .or_else(|| {
                self.document
                    .as_ref()
                    .and_then(|d| d.file_name())
                    .and_then(|n| {
                        Path::new(&n)
                            .file_name()
                            .map(|s| s.to_string_lossy().into_owned())
                    })
            })
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn classify(&self) -> ContentKind {
        match &self.file_path {
            Some(path) => ContentKind::from_path(path),
            None => self
                .document
                .as_ref()
                .and_then(|d| d.file_name())
                .map(|n| ContentKind::from_path(Path::new(&n)))
                .unwrap_or(ContentKind::Text),
        }
    }
}

/// The queryable document bound into the sandbox
#[derive(Clone, Debug)]
pub struct ContentSource {
    reference: DocumentRef,
    kind: ContentKind,
    config: QueryConfig,
}

impl ContentSource {
    pub fn new(reference: DocumentRef, config: QueryConfig) -> Self {
        let kind = reference.classify();
        Self {
            reference,
            kind,
            config,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn file_name(&self) -> String {
        self.reference.display_name()
    }

    /// Materialised lines; extracted strings for binary files.
    pub fn lines(&self) -> Result<Vec<String>, QueryError> {
        match self.reference.resolve()? {
            Resolved::Document(doc) => Ok(split_lines(&doc.text())),
            Resolved::File(path) => {
                let result = match self.kind {
                    ContentKind::Binary => extract_strings(&path, self.config.extract),
                    ContentKind::Text => read_file_lines(&path),
                };
                result.map_err(|e| QueryError::read(&path, e))
            }
        }
    }

    /// Lazy lines; the file is read chunk by chunk as the stream is pulled.
    pub fn lines_async(&self) -> Result<LineStream, QueryError> {
        match self.reference.resolve()? {
            Resolved::Document(doc) => {
                let count = doc.line_count();
                Ok(Box::new(
                    (0..count).map(move |i| Ok::<_, QueryError>(doc.line_at(i))),
                ))
            }
            Resolved::File(path) => {
                let chunk_size = self.config.chunk_size;
                let err_path = path.clone();
                let wrap = move |e: std::io::Error| QueryError::read(&err_path, e);
                match self.kind {
                    ContentKind::Binary => {
                        let strings =
                            extract_strings_lazy(&path, self.config.extract, chunk_size)
                                .map_err(|e| QueryError::read(&path, e))?;
                        Ok(Box::new(strings.map(move |r| r.map_err(&wrap))))
                    }
                    ContentKind::Text => {
                        let lines = stream_file_lines(&path, chunk_size)
                            .map_err(|e| QueryError::read(&path, e))?;
                        Ok(Box::new(lines.map(move |r| r.map_err(&wrap))))
                    }
                }
            }
        }
    }

    /// Entire text; binary classification is ignored here.
    pub fn full_text(&self) -> Result<String, QueryError> {
        match self.reference.resolve()? {
            Resolved::Document(doc) => Ok(doc.text()),
            Resolved::File(path) => std::fs::read(&path)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|e| QueryError::read(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn source(reference: DocumentRef) -> ContentSource {
        ContentSource::new(reference, QueryConfig::default().with_chunk_size(3))
    }

    fn doc(text: &str) -> Arc<dyn OpenDocument> {
        Arc::new(InMemoryDocument::new(text).with_name("untitled.txt"))
    }

    fn drain(stream: LineStream) -> Vec<String> {
        stream.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn test_binary_extensions() {
        for ext in ["exe", "DLL", "so", "bin", "rpa", "img"] {
            let path = PathBuf::from(format!("file.{ext}"));
            assert_eq!(ContentKind::from_path(&path), ContentKind::Binary, "{ext}");
        }
        assert_eq!(ContentKind::from_path(Path::new("notes.txt")), ContentKind::Text);
        assert_eq!(ContentKind::from_path(Path::new("Makefile")), ContentKind::Text);
    }

    #[test]
    fn test_no_target_fails_every_accessor() {
        let src = source(DocumentRef::default());
        assert!(matches!(src.lines(), Err(QueryError::NoReadableTarget)));
        assert!(matches!(src.lines_async(), Err(QueryError::NoReadableTarget)));
        assert!(matches!(src.full_text(), Err(QueryError::NoReadableTarget)));
    }

    #[test]
    fn test_missing_path_without_document_fails() {
        let src = source(DocumentRef::file("/definitely/not/here.txt"));
        assert!(matches!(src.lines(), Err(QueryError::NoReadableTarget)));
    }

    #[test]
    fn test_missing_path_falls_back_to_document() {
        let reference = DocumentRef::file("/definitely/not/here.txt").with_document(doc("x\ny"));
        let src = source(reference);
        assert_eq!(src.lines().unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_existing_path_wins_over_document() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("real.txt");
        fs::write(&path, "from disk\n").unwrap();
        let src = source(DocumentRef::file(&path).with_document(doc("from editor")));
        assert_eq!(src.lines().unwrap(), vec!["from disk"]);
        assert_eq!(src.full_text().unwrap(), "from disk\n");
    }

    #[test]
    fn test_document_views() {
        let src = source(DocumentRef::document(doc("one\r\ntwo\nthree")));
        assert_eq!(src.lines().unwrap(), vec!["one", "two", "three"]);
        assert_eq!(drain(src.lines_async().unwrap()), vec!["one", "two", "three"]);
        assert_eq!(src.full_text().unwrap(), "one\r\ntwo\nthree");
        assert_eq!(src.file_name(), "untitled.txt");
        assert_eq!(src.kind(), ContentKind::Text);
    }

    #[test]
    fn test_text_file_lines_and_stream_agree() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.txt");
        let content: String = (0..10).map(|i| format!("entry {i}\r\n")).collect();
        fs::write(&path, content).unwrap();

        let src = source(DocumentRef::file(&path));
        let eager = src.lines().unwrap();
        let lazy = drain(src.lines_async().unwrap());
        assert_eq!(eager.len(), 10);
        assert_eq!(eager, lazy);
    }

    #[test]
    fn test_binary_file_uses_extraction() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("game.rpa");
        fs::write(&path, b"\x00\x01script.rpy\x00\xffab\x00images/bg.png\x00").unwrap();

        let src = source(DocumentRef::file(&path));
        assert_eq!(src.kind(), ContentKind::Binary);
        assert_eq!(src.lines().unwrap(), vec!["script.rpy", "images/bg.png"]);
        assert_eq!(
            drain(src.lines_async().unwrap()),
            vec!["script.rpy", "images/bg.png"]
        );
        // full text ignores classification
        assert!(src.full_text().unwrap().contains("script.rpy\u{0}"));
    }

    #[test]
    fn test_display_name_defaults() {
        assert_eq!(DocumentRef::default().display_name(), "Unknown");
        assert_eq!(DocumentRef::file("/a/b/c.exe").display_name(), "c.exe");
    }
}
