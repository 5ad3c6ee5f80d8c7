//! Serve command - Answer JSONL query requests on stdin
//!
//! Each input line is a `QueryRequest`. Its messages are written to stdout as
//! JSON lines, in order, before the next request is read. Requests run one at
//! a time; closing stdout cancels the query in flight.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::core::config::QueryConfig;
use crate::core::model::{QueryRequest, ResultMessage};
use crate::result::session;
use crate::sandbox::QUERY_STACK_SIZE;

/// Code reported for lines that are not valid requests
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

pub fn run_serve(config: QueryConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(QUERY_STACK_SIZE)
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let mut served = 0usize;

        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }
            served += 1;
            if !serve_line(&line, config, &mut stdout).await? {
                debug!("stdout closed, stopping");
                break;
            }
        }

        info!(requests = served, "serve loop finished");
        Ok::<(), anyhow::Error>(())
    })
}

/// Answer one request line. Returns `false` once the output is gone.
async fn serve_line<W>(line: &str, config: QueryConfig, out: &mut W) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let request: QueryRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "invalid request line");
            let message = ResultMessage::Error {
                message: format!("invalid request: {}", err),
                code: Some(INVALID_REQUEST.to_string()),
            };
            return write_message(out, &message).await;
        }
    };

    let (tx, mut rx) = session::channel();
    let task = tokio::spawn(session::execute(request, config, tx));

    let mut open = true;
    while let Some(message) = rx.recv().await {
        if !write_message(out, &message).await? {
            open = false;
            break;
        }
    }
    drop(rx);

    let delivery = task.await.context("Query task panicked")?;
    debug!(outcome = ?delivery, "request served");
    Ok(open)
}

async fn write_message<W>(out: &mut W, message: &ResultMessage) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    let written = match out.write_all(&line).await {
        Ok(()) => out.flush().await,
        Err(err) => Err(err),
    };
    match written {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(false),
        Err(err) => Err(err).context("Failed to write to stdout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn answer(line: &str) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        assert!(serve_line(line, QueryConfig::default(), &mut out).await.unwrap());
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_serve_line_answers_request() {
        let messages = answer(
            r#"{"expression":"lines.length","target":{"documentText":"a\nb\nc"}}"#,
        )
        .await;
        assert_eq!(messages, vec![serde_json::json!({"kind": "string", "data": "3"})]);
    }

    #[tokio::test]
    async fn test_serve_line_streams_chunks() {
        let messages = answer(
            r#"{"expression":"for (const l of lines) yield l.toUpperCase()","target":{"documentText":"a\nb"}}"#,
        )
        .await;
        let kinds: Vec<_> = messages.iter().map(|m| m["kind"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            vec!["async-stream-chunk", "async-stream-chunk", "async-stream-end"]
        );
        assert_eq!(messages[1]["data"], "B");
    }

    #[tokio::test]
    async fn test_invalid_request_line() {
        let messages = answer("not json").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["kind"], "error");
        assert_eq!(messages[0]["code"], INVALID_REQUEST);
    }
}
