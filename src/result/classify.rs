//! Result classification
//!
//! Turns an [`Evaluation`] into one of the four result shapes and delivers
//! it as [`ResultMessage`]s. Anything that is not a string, a sequence or a
//! stream is shown through its display string.

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::model::ResultMessage;
use crate::sandbox::{Evaluation, QueryStream, Value};

/// Shape of a query result
#[derive(Debug)]
pub enum QueryResult {
    Text(String),
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
    Stream(QueryStream),
}

/// How delivery of a result ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Completed,
    Failed,
    Cancelled,
}

pub fn classify(evaluation: Evaluation) -> QueryResult {
    match evaluation {
        Evaluation::Streaming(stream) => QueryResult::Stream(stream),
        Evaluation::Completed(value) => classify_value(value),
    }
}

fn classify_value(value: Value) -> QueryResult {
    if let Value::Str(s) = &value {
        return QueryResult::Text(s.to_string());
    }

    if let Value::Stream(cell) = &value {
        let stream = cell.borrow_mut().take();
        return match stream {
            Some(lines) => QueryResult::Stream(QueryStream::Lines(lines)),
            None => {
                warn!("query returned a stream that was already consumed");
                QueryResult::Flat(Vec::new())
            }
        };
    }

    let Some(items) = value.as_slice() else {
        debug!(kind = value.type_of(), "coercing result to string");
        return QueryResult::Text(value.to_string());
    };

    // the first element decides between flat and nested
    if !items.first().is_some_and(Value::is_sequence) {
        return QueryResult::Flat(items.iter().map(Value::to_string).collect());
    }

    let rows = items
        .iter()
        .map(|row| match row.as_slice() {
            Some(cells) => cells.iter().map(Value::to_string).collect(),
            None => {
                warn!("non-sequence row in nested result, wrapping it");
                vec![row.to_string()]
            }
        })
        .collect();
    QueryResult::Nested(rows)
}

impl QueryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryResult::Text(_) => "string",
            QueryResult::Flat(_) => "flat-array",
            QueryResult::Nested(_) => "array-of-arrays",
            QueryResult::Stream(_) => "async-stream",
        }
    }

    /// Push the result through `emit`, which returns `false` once the
    /// consumer is gone. Streams produce one chunk per element followed by
    /// an end marker; a stream is cancelled as soon as `emit` refuses a
    /// message.
    pub fn deliver<F>(self, mut emit: F) -> Delivery
    where
        F: FnMut(ResultMessage) -> bool,
    {
        let single = match self {
            QueryResult::Text(data) => ResultMessage::String { data },
            QueryResult::Flat(data) => ResultMessage::FlatArray { data },
            QueryResult::Nested(data) => ResultMessage::ArrayOfArrays { data },
            QueryResult::Stream(stream) => return deliver_stream(stream, emit),
        };
        if emit(single) {
            Delivery::Completed
        } else {
            Delivery::Cancelled
        }
    }
}

fn deliver_stream<F>(mut stream: QueryStream, mut emit: F) -> Delivery
where
    F: FnMut(ResultMessage) -> bool,
{
    let mut delivered = 0usize;
    loop {
        match stream.next() {
            Some(Ok(data)) => {
                if !emit(ResultMessage::AsyncStreamChunk { data }) {
                    debug!(delivered, "consumer gone, cancelling stream");
                    stream.cancel();
                    return Delivery::Cancelled;
                }
                delivered += 1;
            }
            Some(Err(err)) => {
                // chunks already delivered stay delivered
                stream.cancel();
                emit(ResultMessage::error(&err));
                return Delivery::Failed;
            }
            None => {
                debug!(delivered, "stream finished");
                return if emit(ResultMessage::AsyncStreamEnd) {
                    Delivery::Completed
                } else {
                    Delivery::Cancelled
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QueryConfig;
    use crate::sandbox::Sandbox;
    use crate::source::content::{ContentSource, DocumentRef, InMemoryDocument};
    use std::sync::Arc;

    fn result_of(query: &str) -> QueryResult {
        let source = ContentSource::new(
            DocumentRef::document(Arc::new(InMemoryDocument::new("k=1\nj=2\nk=3"))),
            QueryConfig::default(),
        );
        classify(Sandbox::new().run(query, source).unwrap())
    }

    fn messages(result: QueryResult) -> (Vec<ResultMessage>, Delivery) {
        let mut out = Vec::new();
        let delivery = result.deliver(|m| {
            out.push(m);
            true
        });
        (out, delivery)
    }

    #[test]
    fn test_string_result() {
        let result = result_of("lines[0]");
        assert_eq!(result.kind(), "string");
        assert_eq!(
            messages(result).0,
            vec![ResultMessage::String { data: "k=1".into() }]
        );
    }

    #[test]
    fn test_flat_result() {
        let result = result_of("lines.map(l => l.length)");
        assert_eq!(result.kind(), "flat-array");
        let (msgs, delivery) = messages(result);
        assert_eq!(
            msgs,
            vec![ResultMessage::FlatArray {
                data: vec!["3".into(), "3".into(), "3".into()]
            }]
        );
        assert_eq!(delivery, Delivery::Completed);
    }

    #[test]
    fn test_nested_result_from_groups() {
        let result = result_of("lines.groupBy(l => l[0])");
        assert_eq!(result.kind(), "array-of-arrays");
        assert_eq!(
            messages(result).0,
            vec![ResultMessage::ArrayOfArrays {
                data: vec![
                    vec!["k=1".into(), "k=3".into()],
                    vec!["j=2".into()]
                ]
            }]
        );
    }

    #[test]
    fn test_first_element_decides_shape() {
        assert_eq!(result_of("[1, [2]]").kind(), "flat-array");
        assert_eq!(result_of("[]").kind(), "flat-array");
        assert_eq!(result_of("[[1], 2]").kind(), "array-of-arrays");
    }

    #[test]
    fn test_other_values_are_coerced_to_strings() {
        let (msgs, _) = messages(result_of("({ count: lines.length })"));
        assert_eq!(
            msgs,
            vec![ResultMessage::String {
                data: r#"{"count":3}"#.into()
            }]
        );
        let (msgs, _) = messages(result_of("lines.length"));
        assert_eq!(msgs, vec![ResultMessage::String { data: "3".into() }]);
    }

    #[test]
    fn test_returned_line_stream_is_streamed() {
        let result = result_of("linesAsync");
        assert_eq!(result.kind(), "async-stream");
        let (msgs, delivery) = messages(result);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[3], ResultMessage::AsyncStreamEnd);
        assert_eq!(delivery, Delivery::Completed);
    }

    #[test]
    fn test_stream_error_follows_delivered_chunks() {
        let result = result_of("for (const l of lines) { if (l.startsWith('j')) l.nope(); yield l }");
        let (msgs, delivery) = messages(result);
        assert_eq!(delivery, Delivery::Failed);
        assert_eq!(msgs[0], ResultMessage::AsyncStreamChunk { data: "k=1".into() });
        assert!(msgs[1].is_error());
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_refused_message_cancels_stream() {
        let result = result_of("for (const l of lines) yield l");
        let mut taken = Vec::new();
        let delivery = result.deliver(|m| {
            if taken.len() == 1 {
                return false;
            }
            taken.push(m);
            true
        });
        assert_eq!(delivery, Delivery::Cancelled);
        assert_eq!(taken.len(), 1);
    }
}
