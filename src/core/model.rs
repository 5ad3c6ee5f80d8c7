//! Wire model
//!
//! Requests come in as [`QueryRequest`]; every result, chunk and failure
//! goes out as a [`ResultMessage`] before rendering.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::error::QueryError;
use crate::source::content::{DocumentRef, InMemoryDocument};

/// One query invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Query text
    pub expression: String,
    #[serde(default)]
    pub target: TargetSpec,
}

/// What the query runs against. When both are given, an existing file
/// path wins over the document text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_text: Option<String>,

    /// Name shown for the document (`doc.fileName`); its extension also
    /// decides binary classification when there is no file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
}

impl TargetSpec {
    pub fn to_document_ref(&self) -> DocumentRef {
        let document = self.document_text.as_ref().map(|text| {
            let doc = InMemoryDocument::new(text.clone());
            match &self.document_name {
                Some(name) => doc.with_name(name.clone()),
                None => doc,
            }
        });

        let reference = match &self.file_path {
            Some(path) => DocumentRef::file(path.clone()),
            None => DocumentRef::default(),
        };
        match document {
            Some(doc) => reference.with_document(Arc::new(doc)),
            None => reference,
        }
    }
}

/// Message delivered to the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResultMessage {
    String {
        data: String,
    },
    FlatArray {
        data: Vec<String>,
    },
    ArrayOfArrays {
        data: Vec<Vec<String>>,
    },
    AsyncStreamChunk {
        data: String,
    },
    AsyncStreamEnd,
    Error {
        message: String,
        /// Machine-readable error code
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ResultMessage {
    pub fn error(err: &QueryError) -> Self {
        ResultMessage::Error {
            message: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultMessage::Error { .. })
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ResultMessage::String { .. } => "string",
            ResultMessage::FlatArray { .. } => "flat-array",
            ResultMessage::ArrayOfArrays { .. } => "array-of-arrays",
            ResultMessage::AsyncStreamChunk { .. } => "async-stream-chunk",
            ResultMessage::AsyncStreamEnd => "async-stream-end",
            ResultMessage::Error { .. } => "error",
        }
    }
}
