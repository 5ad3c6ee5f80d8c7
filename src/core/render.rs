//! Renderer module
//!
//! Renders result messages to different output formats: jsonl, json, raw

use crate::core::model::ResultMessage;
use std::io::Write;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Json,
    Raw,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "json" => Ok(OutputFormat::Json),
            "raw" => Ok(OutputFormat::Raw),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Render configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl RenderConfig {
    /// Create a new render config with pretty option
    pub fn with_pretty(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }
}

/// Renderer for result messages
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    /// Create a new renderer with render config
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Whether messages can be written as they arrive. JSON output is a
    /// single array and has to wait for the last message.
    pub fn is_incremental(&self) -> bool {
        self.config.format != OutputFormat::Json
    }

    /// Render one message; `None` when the format has nothing to show for it.
    pub fn render_message(&self, message: &ResultMessage) -> Option<String> {
        match self.config.format {
            OutputFormat::Jsonl | OutputFormat::Json => self.to_json(message),
            OutputFormat::Raw => Self::render_raw(message),
        }
    }

    /// Render a complete batch of messages
    pub fn render(&self, messages: &[ResultMessage]) -> String {
        match self.config.format {
            OutputFormat::Json => {
                let rendered = if self.config.pretty {
                    serde_json::to_string_pretty(messages)
                } else {
                    serde_json::to_string(messages)
                };
                rendered.unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Jsonl => messages
                .iter()
                .filter_map(|m| self.to_json(m))
                .collect::<Vec<_>>()
                .join(if self.config.pretty { "\n\n" } else { "\n" }),
            OutputFormat::Raw => messages
                .iter()
                .filter_map(Self::render_raw)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Render a message followed by a newline to a writer
    pub fn write_message<W: Write>(
        &self,
        message: &ResultMessage,
        writer: &mut W,
    ) -> std::io::Result<()> {
        if let Some(line) = self.render_message(message) {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    fn to_json(&self, message: &ResultMessage) -> Option<String> {
        if self.config.pretty {
            serde_json::to_string_pretty(message).ok()
        } else {
            serde_json::to_string(message).ok()
        }
    }

    /// Plain text: strings verbatim, one element per line, rows tab-separated
    fn render_raw(message: &ResultMessage) -> Option<String> {
        match message {
            ResultMessage::String { data } | ResultMessage::AsyncStreamChunk { data } => {
                Some(data.clone())
            }
            ResultMessage::FlatArray { data } => Some(data.join("\n")),
            ResultMessage::ArrayOfArrays { data } => Some(
                data.iter()
                    .map(|row| row.join("\t"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            ResultMessage::AsyncStreamEnd => None,
            ResultMessage::Error { message, .. } => Some(format!("error: {}", message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<ResultMessage> {
        vec![
            ResultMessage::AsyncStreamChunk { data: "a".into() },
            ResultMessage::AsyncStreamChunk { data: "b".into() },
            ResultMessage::AsyncStreamEnd,
        ]
    }

    fn renderer(format: OutputFormat) -> Renderer {
        Renderer::with_config(RenderConfig::with_pretty(format, false))
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSONL".parse::<OutputFormat>(), Ok(OutputFormat::Jsonl));
        assert_eq!("raw".parse::<OutputFormat>(), Ok(OutputFormat::Raw));
        assert!("md".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_jsonl() {
        let output = renderer(OutputFormat::Jsonl).render(&messages());
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"kind":"async-stream-chunk","data":"a"}"#);
        assert_eq!(lines[2], r#"{"kind":"async-stream-end"}"#);
    }

    #[test]
    fn test_render_json_array() {
        let output = renderer(OutputFormat::Json).render(&messages());
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(!renderer(OutputFormat::Json).is_incremental());
    }

    #[test]
    fn test_render_raw() {
        let raw = renderer(OutputFormat::Raw);
        assert_eq!(raw.render(&messages()), "a\nb");
        let nested = ResultMessage::ArrayOfArrays {
            data: vec![vec!["k".into(), "1".into()], vec!["j".into(), "2".into()]],
        };
        assert_eq!(raw.render_message(&nested).unwrap(), "k\t1\nj\t2");
        let error = ResultMessage::Error {
            message: "boom".into(),
            code: None,
        };
        assert_eq!(raw.render_message(&error).unwrap(), "error: boom");
    }
}
