//! Query command - Run one query against a file or stdin

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::commands::MessagePrinter;
use crate::core::config::QueryConfig;
use crate::core::model::ResultMessage;
use crate::core::render::{OutputFormat, RenderConfig, Renderer};
use crate::result::session;
use crate::result::Delivery;
use crate::sandbox::{ExecutionPlan, Sandbox, QUERY_STACK_SIZE};
use crate::source::content::{DocumentRef, InMemoryDocument};

/// Name given to documents read from stdin
pub const STDIN_DOCUMENT_NAME: &str = "stdin";

/// Build the document reference for `--file` / `--stdin`.
pub fn document_ref(file: Option<&Path>, stdin: bool) -> Result<DocumentRef> {
    let reference = match file {
        Some(path) => DocumentRef::file(path.to_path_buf()),
        None => DocumentRef::default(),
    };
    if !stdin {
        return Ok(reference);
    }

    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read document from stdin")?;
    let document = InMemoryDocument::new(text).with_name(STDIN_DOCUMENT_NAME);
    Ok(reference.with_document(Arc::new(document)))
}

/// Run a query and print every message it delivers.
///
/// `take` stops after that many stream chunks; the rest of the stream is
/// cancelled and no end marker is printed.
pub fn run_query(
    expression: &str,
    file: Option<&Path>,
    stdin: bool,
    take: Option<usize>,
    config: QueryConfig,
    render_config: RenderConfig,
) -> Result<()> {
    if take == Some(0) {
        bail!("--take must be at least 1");
    }
    let reference = document_ref(file, stdin)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(QUERY_STACK_SIZE)
        .build()
        .context("Failed to start async runtime")?;

    let expression = expression.to_string();
    let (delivery, failure) = runtime.block_on(async move {
        let (tx, mut rx) = session::channel();
        let task = tokio::spawn(session::execute_on(expression, reference, config, tx));

        let mut printer = MessagePrinter::new(render_config);
        let mut chunks = 0usize;
        while let Some(message) = rx.recv().await {
            let is_chunk = matches!(message, ResultMessage::AsyncStreamChunk { .. });
            if !printer.push(message)? {
                debug!("stdout closed, cancelling query");
                break;
            }
            if is_chunk {
                chunks += 1;
                if take.is_some_and(|limit| chunks >= limit) {
                    debug!(chunks, "take limit reached, cancelling query");
                    break;
                }
            }
        }
        drop(rx);

        let delivery = task.await.context("Query task panicked")?;
        let failure = printer.finish()?;
        Ok::<_, anyhow::Error>((delivery, failure))
    })?;

    match (delivery, failure) {
        (Delivery::Failed, Some(message)) => bail!("query failed: {}", message),
        (Delivery::Failed, None) => bail!("query failed"),
        _ => Ok(()),
    }
}

/// Plan report printed by `querypad plan`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport {
    #[serde(flatten)]
    plan: ExecutionPlan,
    statements: usize,
}

/// Plan and compile a query without running it.
pub fn run_plan(expression: &str, render_config: RenderConfig) -> Result<()> {
    let sandbox = Sandbox::new();
    let compiled = sandbox
        .plan(expression)
        .and_then(|plan| sandbox.compile(expression, plan));

    let compiled = match compiled {
        Ok(compiled) => compiled,
        Err(err) => {
            let renderer = Renderer::with_config(render_config);
            println!("{}", renderer.render(&[ResultMessage::error(&err)]));
            bail!("query does not compile: {}", err);
        }
    };

    let report = PlanReport {
        plan: compiled.plan(),
        statements: compiled.statement_count(),
    };
    match render_config.format {
        OutputFormat::Raw => println!(
            "implicitReturn={} isAsync={} statements={}",
            report.plan.implicit_return, report.plan.is_async, report.statements
        ),
        _ if render_config.pretty => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", serde_json::to_string(&report)?),
    }
    Ok(())
}
