/*
 * check.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Check command implementation
 */

//! Check command implementation.
//!
//! Runs the repair pass and the directive/expression validator, reporting
//! the fatal errors a render would hit, with offsets, before any data is
//! involved.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute(template: &Path) -> Result<()> {
    let markup = std::fs::read_to_string(template)
        .with_context(|| format!("reading template {}", template.display()))?;

    let repaired = vellum_ooxml::repair(&markup)
        .with_context(|| format!("normalizing {}", template.display()))?;
    vellum_doctemplate::check(&repaired)
        .with_context(|| format!("validating {}", template.display()))?;

    println!("{}: OK", template.display());
    Ok(())
}
