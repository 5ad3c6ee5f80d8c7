//! Operators command - List the operator catalog

use anyhow::Result;
use serde::Serialize;

use crate::core::render::{OutputFormat, RenderConfig};
use crate::ops::library::{OperatorLibrary, OperatorSpec};
use crate::sandbox::Sandbox;

#[derive(Debug, Serialize)]
struct OperatorEntry<'a> {
    #[serde(flatten)]
    spec: &'a OperatorSpec,
    /// Skipped because the host already provides a method with this name
    shadowed: bool,
}

fn entries(library: &OperatorLibrary) -> Vec<OperatorEntry<'static>> {
    let installed = library.catalog().map(|spec| OperatorEntry {
        spec,
        shadowed: false,
    });
    let shadowed = library.shadowed().iter().copied().map(|spec| OperatorEntry {
        spec,
        shadowed: true,
    });
    installed.chain(shadowed).collect()
}

pub fn run_operators(render_config: RenderConfig) -> Result<()> {
    let sandbox = Sandbox::new();
    let entries = entries(sandbox.library());

    match render_config.format {
        OutputFormat::Jsonl => {
            for entry in &entries {
                if render_config.pretty {
                    println!("{}", serde_json::to_string_pretty(entry)?);
                } else {
                    println!("{}", serde_json::to_string(entry)?);
                }
            }
        }
        OutputFormat::Json => {
            if render_config.pretty {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{}", serde_json::to_string(&entries)?);
            }
        }
        OutputFormat::Raw => {
            for entry in &entries {
                let marker = if entry.shadowed { " (host)" } else { "" };
                println!(
                    "{}\t{}{}\t{}",
                    entry.spec.name, entry.spec.signature, marker, entry.spec.description
                );
            }
        }
    }
    Ok(())
}
