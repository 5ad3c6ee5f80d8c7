//! CLI module - Command-line interface definitions and handlers

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::{QueryConfig, DEFAULT_CHUNK_SIZE};
use crate::core::render::{OutputFormat, RenderConfig};
use crate::source::extract::{ExtractOptions, TextEncoding, DEFAULT_MIN_LENGTH};

/// querypad - run small query programs over the lines of a file or document.
#[derive(Parser, Debug)]
#[command(name = "querypad")]
#[command(
    author,
    version,
    about,
    long_about = r#"querypad runs a query expression against the content of a file (or a
document piped on stdin) and prints the result as a stream of messages.

Inside a query the document is available as:
- lines:      all lines, materialised
- linesAsync: a lazy, single-pass line stream
- fullText:   the whole text
- doc:        the same views plus doc.fileName and doc.isBinary

Files ending in .exe .dll .so .bin .rpa .img are read through printable-string
extraction instead of line splitting.

Each result is one of: string, flat-array, array-of-arrays, or an async stream
(one chunk per yielded value followed by an end marker). Failures print an
error message and exit non-zero.

Output formats:
- jsonl: one JSON message per line (default)
- json: a single JSON array, printed when the query finishes
- raw: plain text

Examples:
    querypad run 'lines.filter(l => l.includes("TODO")).length' --file src/main.rs
    querypad run 'lines.groupBy(l => l.split("=")[0])' --file app.env
    querypad run 'for await (const l of linesAsync) yield l.toUpperCase()' --file big.log --take 10
    cat notes.txt | querypad run 'lines.distinct().sortBy(l => l.length)' --stdin
    querypad strings firmware.bin --min-length 8
"#
)]
pub struct Cli {
    /// Output format (jsonl/json/raw).
    #[arg(
        long,
        global = true,
        default_value = "jsonl",
        value_name = "FORMAT",
        long_help = "Select the output format for result messages.\n\n\
Supported values:\n\
- jsonl (default)\n\
- json\n\
- raw\n\n\
Tip: jsonl prints stream chunks as they are produced; json waits for the end."
    )]
    pub format: String,

    /// Quiet mode (errors only on stderr).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Only log errors to stderr. Result messages are still printed to stdout."
    )]
    pub quiet: bool,

    /// Verbose mode (more diagnostics).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Log planning, compilation and stream lifecycle events to stderr.\n\n\
RUST_LOG, when set, takes precedence over this flag."
    )]
    pub verbose: bool,

    /// Pretty-print JSON/JSONL output with indentation.
    #[arg(
        long,
        global = true,
        long_help = "Pretty-print JSON and JSONL output with indentation for human readability.\n\n\
Has no effect on the raw format or on `serve`, which always writes one message per line."
    )]
    pub pretty: bool,

    /// Minimum length of an extracted string on binary targets.
    #[arg(
        long,
        global = true,
        env = "QUERYPAD_MIN_LENGTH",
        default_value_t = DEFAULT_MIN_LENGTH,
        value_name = "N",
        long_help = "Minimum number of consecutive printable ASCII bytes (32..=126) for a run\n\
to count as a string when reading a binary target."
    )]
    pub min_length: usize,

    /// Encoding used to decode extracted strings.
    #[arg(
        long,
        global = true,
        env = "QUERYPAD_ENCODING",
        default_value = "utf8",
        value_name = "ENCODING",
        long_help = "Encoding used to decode extracted runs.\n\n\
Supported values: utf8, ascii, latin1, utf16le."
    )]
    pub encoding: String,

    /// Bytes read per chunk when streaming a file.
    #[arg(
        long,
        global = true,
        env = "QUERYPAD_CHUNK_SIZE",
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_name = "BYTES",
        long_help = "Number of bytes requested per read by the streaming accessors\n\
(linesAsync, `strings --stream`). Output does not depend on this value."
    )]
    pub chunk_size: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query and print its result messages.
    #[command(
        long_about = "Plan, compile and run a query expression against --file or --stdin.\n\n\
When both are given, an existing file wins and stdin is the fallback.\n\
A query without `return` yields its last expression; a query using `yield`\n\
or `for await` streams its values.\n\n\
Examples:\n\
  querypad run 'lines.length' --file README.md\n\
  querypad run 'const n = lines.map(l => l.length); return n.max()' --file README.md\n\
  querypad run 'for (const l of lines) if (l.startsWith(\"#\")) yield l' --stdin < README.md\n"
    )]
    Run {
        /// Query expression.
        #[arg(value_name = "EXPRESSION")]
        expression: String,

        /// File to query.
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Read the document from stdin.
        #[arg(
            long,
            long_help = "Read the document text from stdin. Its name (doc.fileName) is \"stdin\"."
        )]
        stdin: bool,

        /// Stop after N stream chunks.
        #[arg(
            long,
            value_name = "N",
            long_help = "Stop after N stream chunks and cancel the rest of the stream.\n\n\
Has no effect on non-stream results."
        )]
        take: Option<usize>,
    },

    /// Extract printable strings from a file.
    #[command(
        long_about = "Extract runs of printable ASCII from any file, like strings(1).\n\n\
Honours --min-length and --encoding. With --stream, each run is printed as soon\n\
as it is found; the output is identical to batch mode.\n\n\
Examples:\n\
  querypad strings app.exe\n\
  querypad strings disk.img --stream --min-length 10\n"
    )]
    Strings {
        /// File to scan.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print runs as they are found.
        #[arg(long)]
        stream: bool,
    },

    /// Show how a query would be executed.
    #[command(
        long_about = "Plan and compile a query without running it, and print whether it gets an\n\
implicit return and whether it runs as a stream.\n\n\
Examples:\n\
  querypad plan 'lines.length'\n\
  querypad plan 'for await (const l of linesAsync) yield l'\n"
    )]
    Plan {
        /// Query expression.
        #[arg(value_name = "EXPRESSION")]
        expression: String,
    },

    /// List the sequence and JSON operators available to queries.
    #[command(
        long_about = "List every operator of the query library with its signature.\n\n\
Operators whose name the host already provides are listed with shadowed=true;\n\
the host method is used for them."
    )]
    Operators,

    /// Answer JSONL query requests on stdin.
    #[command(
        long_about = r#"Read one JSON request per line from stdin and write the resulting
messages to stdout as JSON lines. Requests are answered in order.

Request shape:
    {"expression": "lines.length", "target": {"filePath": "notes.txt"}}
    {"expression": "lines", "target": {"documentText": "a\nb", "documentName": "notes.txt"}}
"#
    )]
    Serve,
}

impl Cli {
    /// Query configuration from the global flags.
    pub fn query_config(&self) -> Result<QueryConfig> {
        let encoding: TextEncoding = self.encoding.parse().map_err(|e: String| anyhow!(e))?;
        let extract = ExtractOptions {
            encoding,
            min_length: self.min_length,
        };
        Ok(QueryConfig::default()
            .with_extract(extract)
            .with_chunk_size(self.chunk_size))
    }

    /// Default log level implied by --quiet / --verbose.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    // Parse output format
    let format: OutputFormat = cli.format.parse().unwrap_or_default();
    let render_config = RenderConfig::with_pretty(format, cli.pretty);
    let config = cli.query_config()?;

    match cli.command {
        Commands::Run {
            expression,
            file,
            stdin,
            take,
        } => crate::commands::query::run_query(
            &expression,
            file.as_deref(),
            stdin,
            take,
            config,
            render_config,
        ),

        Commands::Strings { file, stream } => {
            crate::commands::strings::run_strings(&file, stream, config, render_config)
        }

        Commands::Plan { expression } => crate::commands::query::run_plan(&expression, render_config),

        Commands::Operators => crate::commands::operators::run_operators(render_config),

        Commands::Serve => crate::commands::serve::run_serve(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_flags() {
        let cli = Cli::parse_from([
            "querypad",
            "--min-length",
            "6",
            "--encoding",
            "latin1",
            "--chunk-size",
            "0",
            "plan",
            "lines",
        ]);
        let config = cli.query_config().unwrap();
        assert_eq!(config.extract.min_length, 6);
        assert_eq!(config.extract.encoding, TextEncoding::Latin1);
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_unknown_encoding_is_an_error() {
        let cli = Cli::parse_from(["querypad", "--encoding", "ebcdic", "operators"]);
        assert!(cli.query_config().is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(Cli::parse_from(["querypad", "-q", "operators"]).log_level(), "error");
        assert_eq!(Cli::parse_from(["querypad", "-v", "operators"]).log_level(), "debug");
        assert_eq!(Cli::parse_from(["querypad", "operators"]).log_level(), "warn");
    }
}
