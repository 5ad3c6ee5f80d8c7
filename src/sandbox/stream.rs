//! Query streams
//!
//! A streaming query runs on its own worker thread and hands each yielded
//! element over a rendezvous channel, so the worker is never more than one
//! element ahead of the consumer. Dropping the receiver makes the worker's
//! next `yield` fail with [`QueryError::Cancelled`], which unwinds it and
//! drops every reader it holds. A worker that loops without yielding is
//! stopped through its [`CancelFlag`] instead.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::core::error::QueryError;
use crate::sandbox::interp::YieldSink;
use crate::source::content::LineStream;

pub type StreamItem = Result<String, QueryError>;

/// Stack size for threads that evaluate queries.
pub const QUERY_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Shared stop request for a running query. The interpreter polls it on
/// every loop iteration and function call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lazy sequence of strings produced by a query.
pub enum QueryStream {
    /// A line stream returned directly by the query (e.g. `linesAsync`)
    Lines(LineStream),
    /// A producer running on a worker thread
    Worker {
        rx: Receiver<StreamItem>,
        handle: JoinHandle<()>,
        cancel: CancelFlag,
    },
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStream::Lines(_) => f.write_str("QueryStream::Lines"),
            QueryStream::Worker { .. } => f.write_str("QueryStream::Worker"),
        }
    }
}

impl QueryStream {
    /// Start `producer` on a worker thread. The producer gets a sink whose
    /// `emit` blocks until the consumer takes the element. A panicking
    /// producer is reported as an execution error after its last chunk.
    pub fn spawn<F>(cancel: CancelFlag, producer: F) -> Result<Self, QueryError>
    where
        F: FnOnce(&mut ChannelSink) -> Result<(), QueryError> + Send + 'static,
    {
        let (tx, rx) = sync_channel(0);
        let handle = thread::Builder::new()
            .name("querypad-stream".to_string())
            .stack_size(QUERY_STACK_SIZE)
            .spawn(move || {
                let mut sink = ChannelSink { tx };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| producer(&mut sink)))
                    .unwrap_or_else(|payload| Err(QueryError::from_panic(payload)));
                match outcome {
                    Ok(()) => debug!("stream producer finished"),
                    Err(QueryError::Cancelled) => debug!("stream producer cancelled"),
                    Err(err) => {
                        // the consumer may already be gone
                        let _ = sink.tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| QueryError::execution(format!("failed to start stream worker: {}", e)))?;
        Ok(QueryStream::Worker { rx, handle, cancel })
    }

    /// Stop producing and release the underlying readers. For a worker,
    /// waits until it has unwound.
    pub fn cancel(self) {
        match self {
            QueryStream::Lines(stream) => drop(stream),
            QueryStream::Worker { rx, handle, cancel } => {
                cancel.cancel();
                drop(rx);
                if handle.join().is_err() {
                    warn!("stream worker panicked");
                }
            }
        }
    }
}

impl Iterator for QueryStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        match self {
            QueryStream::Lines(stream) => stream.next(),
            QueryStream::Worker { rx, .. } => rx.recv().ok(),
        }
    }
}

/// Sink feeding the rendezvous channel of a worker stream
pub struct ChannelSink {
    tx: SyncSender<StreamItem>,
}

impl YieldSink for ChannelSink {
    fn emit(&mut self, item: String) -> Result<(), QueryError> {
        self.tx.send(Ok(item)).map_err(|_| QueryError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_worker_stream_yields_in_order() {
        let stream = QueryStream::spawn(CancelFlag::new(), |sink| {
            for i in 0..5 {
                sink.emit(i.to_string())?;
            }
            Ok(())
        })
        .unwrap();
        let items: Vec<String> = stream.map(Result::unwrap).collect();
        assert_eq!(items, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_producer_error_is_delivered_last() {
        let mut stream = QueryStream::spawn(CancelFlag::new(), |sink| {
            sink.emit("one".into())?;
            Err(QueryError::execution("boom"))
        })
        .unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "one");
        assert_eq!(stream.next().unwrap().unwrap_err().to_string(), "boom");
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_cancel_stops_producer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let mut stream = QueryStream::spawn(CancelFlag::new(), move |sink| {
            for i in 0..100 {
                sink.emit(i.to_string())?;
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .unwrap();

        for _ in 0..3 {
            stream.next().unwrap().unwrap();
        }
        stream.cancel();
        // rendezvous: at most one element beyond what was taken
        assert!(produced.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_panicking_producer_reports_error() {
        let mut stream = QueryStream::spawn(CancelFlag::new(), |sink| {
            sink.emit("before".into())?;
            panic!("index out of range");
        })
        .unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "before");
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
        assert!(err.to_string().contains("index out of range"));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_cancel_raises_flag_for_silent_producer() {
        let flag = CancelFlag::new();
        let seen = flag.clone();
        let mut stream = QueryStream::spawn(flag, move |sink| {
            sink.emit("start".into())?;
            while !seen.is_cancelled() {
                thread::yield_now();
            }
            Err(QueryError::Cancelled)
        })
        .unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "start");
        // returns only once the producer has observed the flag
        stream.cancel();
    }
}
