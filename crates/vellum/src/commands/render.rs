/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render command implementation
 */

//! Render command implementation.
//!
//! Renders a template file against a JSON data file, optionally piping the
//! result through the external document converter.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use vellum_core::{ConvertFormat, DocumentConverter, OfficeConverter, RenderOptions};

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    pub template: PathBuf,
    pub data: PathBuf,
    pub output: Option<PathBuf>,
    pub long_table_split: bool,
    pub no_table_page_breaking: bool,
    pub convert: Option<String>,
    pub convert_timeout: u64,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    let markup = std::fs::read_to_string(&args.template)
        .with_context(|| format!("reading template {}", args.template.display()))?;
    let data: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&args.data)
            .with_context(|| format!("reading data {}", args.data.display()))?,
    )
    .with_context(|| format!("parsing data {}", args.data.display()))?;

    let options = RenderOptions {
        table_page_breaking: !args.no_table_page_breaking,
        long_table_split: args.long_table_split,
        convert_timeout_secs: args.convert_timeout,
    };

    let output = vellum_core::render(&markup, &data, &options)?;
    for warning in &output.warnings {
        tracing::warn!("{warning}");
    }

    let bytes = match &args.convert {
        None => output.content.into_bytes(),
        Some(format_name) => {
            let Some(format) = ConvertFormat::parse(format_name) else {
                bail!("unsupported conversion format: {format_name}");
            };
            if args.output.is_none() {
                bail!("--convert requires --output");
            }
            let converter = OfficeConverter::discover(options.convert_timeout())?;
            converter.convert(output.content.as_bytes(), "document.xml", format)?
        }
    };

    match &args.output {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("writing output {}", path.display()))?,
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
