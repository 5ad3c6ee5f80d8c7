//! Commands - Runners behind each CLI subcommand
//!
//! - query: run a query or print its execution plan
//! - strings: printable-string extraction on a file
//! - operators: list the installed operator catalog
//! - serve: JSONL request loop on stdin/stdout

pub mod operators;
pub mod query;
pub mod serve;
pub mod strings;

use anyhow::{Context, Result};
use std::io::{self, Write};

use crate::core::model::ResultMessage;
use crate::core::render::{RenderConfig, Renderer};

/// Writes result messages to stdout as they arrive, or collects them when
/// the output format needs the whole batch.
pub struct MessagePrinter {
    renderer: Renderer,
    pending: Vec<ResultMessage>,
    failure: Option<String>,
    closed: bool,
}

impl MessagePrinter {
    pub fn new(render_config: RenderConfig) -> Self {
        Self {
            renderer: Renderer::with_config(render_config),
            pending: Vec::new(),
            failure: None,
            closed: false,
        }
    }

    /// Print or buffer one message. Returns `false` once stdout is gone
    /// (broken pipe), which callers treat as a cancelled consumer.
    pub fn push(&mut self, message: ResultMessage) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if let ResultMessage::Error { message: text, .. } = &message {
            self.failure = Some(text.clone());
        }
        if !self.renderer.is_incremental() {
            self.pending.push(message);
            return Ok(true);
        }

        let mut stdout = io::stdout().lock();
        let written = self
            .renderer
            .write_message(&message, &mut stdout)
            .and_then(|_| stdout.flush());
        match written {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Ok(false)
            }
            Err(err) => Err(err).context("Failed to write to stdout"),
        }
    }

    /// Flush buffered output. Returns the message of the last error
    /// delivered, if any.
    pub fn finish(self) -> Result<Option<String>> {
        if !self.renderer.is_incremental() {
            println!("{}", self.renderer.render(&self.pending));
        }
        Ok(self.failure)
    }
}
