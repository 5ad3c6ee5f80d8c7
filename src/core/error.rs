//! Query error taxonomy
//!
//! Every failure of a single invocation ends up as one of these variants and
//! is reported to the consumer as an `error` message. Nothing is retried.

use std::any::Any;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Error raised while resolving, reading, compiling or running a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Neither an existing file nor an open document is available.
    #[error("Could not read file or document")]
    NoReadableTarget,

    /// The underlying file could not be read (possibly mid-stream).
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The expression text is not a valid query.
    #[error("{message} (line {line}, column {column})")]
    Compile {
        message: String,
        line: usize,
        column: usize,
    },

    /// The expression threw or an operator received invalid input.
    #[error("{0}")]
    Execution(String),

    /// `first`/`last` found nothing to return.
    #[error("{0}")]
    NotFound(String),

    /// The consumer went away while a stream was still producing.
    #[error("query stream was cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn read(path: &Path, source: io::Error) -> Self {
        QueryError::Read {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        QueryError::Execution(message.into())
    }

    /// Execution error carrying the message of a caught panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "unknown cause".to_string(),
            },
        };
        QueryError::Execution(format!("query panicked: {}", detail))
    }

    /// Stable machine-readable code, mirrors the error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NoReadableTarget => "NO_READABLE_TARGET",
            QueryError::Read { .. } => "READ_ERROR",
            QueryError::Compile { .. } => "COMPILE_ERROR",
            QueryError::Execution(_) => "EXECUTION_ERROR",
            QueryError::NotFound(_) => "NOT_FOUND",
            QueryError::Cancelled => "CANCELLED",
        }
    }
}
