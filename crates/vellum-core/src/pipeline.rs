/*
 * pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The render pipeline.
//!
//! A render chains three pure stages over in-memory text:
//!
//! 1. **Repair**: reassemble directive markers split across text runs
//! 2. **Evaluate**: expand directives against the rendering data
//! 3. **Plan**: annotate table rows with page-break-control properties
//!
//! Each render call is independent: no state is shared across calls except
//! the read-only function registry, so renders of different documents are
//! safe to run on parallel worker threads. Packaging the output back into a
//! document container and converting it are collaborator concerns (see
//! [`convert`](crate::convert)).

use std::time::Instant;

use vellum_doctemplate::TemplateValue;

use crate::error::Result;
use crate::observer::{NoopObserver, RenderObserver};
use crate::render::{RenderOptions, RenderOutput};

/// Render a template against JSON data.
///
/// This is the main entry point: repair, evaluate, plan. The input data is
/// never mutated. Warnings are collected across the whole pipeline and
/// returned with the output; fatal errors abort before any output exists.
pub fn render(
    markup: &str,
    data: &serde_json::Value,
    options: &RenderOptions,
) -> Result<RenderOutput> {
    render_with_observer(markup, data, options, &NoopObserver)
}

/// [`render`], reporting stage progress and the outcome to `observer`.
pub fn render_with_observer(
    markup: &str,
    data: &serde_json::Value,
    options: &RenderOptions,
    observer: &dyn RenderObserver,
) -> Result<RenderOutput> {
    let started = Instant::now();
    observer.on_render_start();

    let result = run_stages(markup, data, options, observer, started);
    match &result {
        Ok(output) => {
            tracing::info!(
                duration_ms = output.duration.as_millis() as u64,
                warnings = output.warnings.len(),
                "render complete"
            );
            observer.on_render_complete(output.duration, output.warnings.len());
        }
        Err(error) => {
            tracing::warn!(%error, "render failed");
            observer.on_render_error(error);
        }
    }
    result
}

fn run_stages(
    markup: &str,
    data: &serde_json::Value,
    options: &RenderOptions,
    observer: &dyn RenderObserver,
    started: Instant,
) -> Result<RenderOutput> {
    let repaired = {
        let _span = tracing::debug_span!("repair").entered();
        observer.on_stage_start("repair");
        let repaired = vellum_ooxml::repair(markup)?;
        observer.on_stage_complete("repair");
        repaired
    };

    let rendered = {
        let _span = tracing::debug_span!("evaluate").entered();
        observer.on_stage_start("evaluate");
        let value = TemplateValue::from(data);
        let rendered = vellum_doctemplate::process(&repaired, &value)?;
        observer.on_stage_complete("evaluate");
        rendered
    };

    let planned = {
        let _span = tracing::debug_span!("plan").entered();
        observer.on_stage_start("plan");
        let planned = vellum_ooxml::plan(&rendered.content, &options.page_break_config())?;
        observer.on_stage_complete("plan");
        planned
    };

    Ok(RenderOutput {
        content: planned,
        warnings: rendered.warnings,
        duration: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_plain_markup() {
        let output = render(
            "<w:p><w:r><w:t>Hello ${name}</w:t></w:r></w:p>",
            &json!({"name": "World"}),
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(output.content, "<w:p><w:r><w:t>Hello World</w:t></w:r></w:p>");
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_fatal_error_before_any_output() {
        let err = render(
            "<w:p><w:r><w:t>${#if a}</w:t></w:r></w:p>",
            &json!({}),
            &RenderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::RenderError::Template(_)));
    }
}
