//! Strings command - Printable-string extraction on any file

use anyhow::{bail, Result};
use std::path::Path;
use tracing::debug;

use crate::commands::MessagePrinter;
use crate::core::config::QueryConfig;
use crate::core::error::QueryError;
use crate::core::model::ResultMessage;
use crate::core::render::RenderConfig;
use crate::source::extract::{extract_strings, extract_strings_lazy};

/// Extract printable runs from `path`, regardless of its extension.
///
/// Batch mode prints one flat-array message. Streaming mode prints one
/// chunk per run as soon as it closes, then an end marker.
pub fn run_strings(
    path: &Path,
    stream: bool,
    config: QueryConfig,
    render_config: RenderConfig,
) -> Result<()> {
    let mut printer = MessagePrinter::new(render_config);

    if !stream {
        let message = match extract_strings(path, config.extract) {
            Ok(data) => {
                debug!(runs = data.len(), "extracted strings");
                ResultMessage::FlatArray { data }
            }
            Err(err) => ResultMessage::error(&QueryError::read(path, err)),
        };
        printer.push(message)?;
        return report(printer);
    }

    let runs = match extract_strings_lazy(path, config.extract, config.chunk_size) {
        Ok(runs) => runs,
        Err(err) => {
            printer.push(ResultMessage::error(&QueryError::read(path, err)))?;
            return report(printer);
        }
    };

    for run in runs {
        let message = match run {
            Ok(data) => ResultMessage::AsyncStreamChunk { data },
            Err(err) => {
                printer.push(ResultMessage::error(&QueryError::read(path, err)))?;
                return report(printer);
            }
        };
        if !printer.push(message)? {
            return Ok(());
        }
    }
    printer.push(ResultMessage::AsyncStreamEnd)?;
    report(printer)
}

fn report(printer: MessagePrinter) -> Result<()> {
    match printer.finish()? {
        Some(message) => bail!("{}", message),
        None => Ok(()),
    }
}
