//! Query sessions
//!
//! Runs one query on a blocking task and pushes its messages into a bounded
//! channel. A closed receiver cancels the query at its next message or loop
//! iteration, whichever comes first.

use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::config::QueryConfig;
use crate::core::error::QueryError;
use crate::core::model::{QueryRequest, ResultMessage};
use crate::result::classify::{classify, Delivery};
use crate::sandbox::{CancelFlag, Sandbox};
use crate::source::content::{ContentSource, DocumentRef};

/// Capacity of the message channel handed out by [`channel`].
pub const CHANNEL_CAPACITY: usize = 1;

pub fn channel() -> (mpsc::Sender<ResultMessage>, mpsc::Receiver<ResultMessage>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Execute a request, delivering its messages into `tx`.
pub async fn execute(
    request: QueryRequest,
    config: QueryConfig,
    tx: mpsc::Sender<ResultMessage>,
) -> Delivery {
    let reference = request.target.to_document_ref();
    execute_on(request.expression, reference, config, tx).await
}

/// Execute a query against an already-built document reference.
pub async fn execute_on(
    expression: String,
    reference: DocumentRef,
    config: QueryConfig,
    tx: mpsc::Sender<ResultMessage>,
) -> Delivery {
    let target = reference.display_name();
    info!(target = %target, "query session started");

    let cancel = CancelFlag::new();
    let watcher = {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tx.closed().await;
            debug!("consumer closed the channel");
            cancel.cancel();
        })
    };

    let report = tx.clone();
    let task = tokio::task::spawn_blocking(move || {
        run_blocking(&expression, reference, config, cancel, &tx)
    });
    let delivery = match task.await {
        Ok(delivery) => delivery,
        Err(err) => {
            warn!(error = %err, "query task did not complete");
            let error = match err.try_into_panic() {
                Ok(payload) => QueryError::from_panic(payload),
                Err(err) => QueryError::execution(format!("query task failed: {}", err)),
            };
            let _ = report.send(ResultMessage::error(&error)).await;
            Delivery::Failed
        }
    };
    watcher.abort();

    info!(target = %target, outcome = ?delivery, "query session finished");
    delivery
}

/// Synchronous body of a session. Must run off the async runtime since it
/// blocks on the channel. A panic inside the query is delivered as an error
/// message.
pub fn run_blocking(
    expression: &str,
    reference: DocumentRef,
    config: QueryConfig,
    cancel: CancelFlag,
    tx: &mpsc::Sender<ResultMessage>,
) -> Delivery {
    let emit = |message: ResultMessage| tx.blocking_send(message).is_ok();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let source = ContentSource::new(reference, config);
        match Sandbox::new().run_cancellable(expression, source, cancel) {
            Ok(evaluation) => {
                let result = classify(evaluation);
                debug!(kind = result.kind(), "classified result");
                result.deliver(emit)
            }
            Err(QueryError::Cancelled) => Delivery::Cancelled,
            Err(err) => {
                emit(ResultMessage::error(&err));
                Delivery::Failed
            }
        }
    }));

    outcome.unwrap_or_else(|payload| {
        let err = QueryError::from_panic(payload);
        warn!(error = %err, "query panicked");
        emit(ResultMessage::error(&err));
        Delivery::Failed
    })
}
