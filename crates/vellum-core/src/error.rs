/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Top-level error type for the render pipeline.

use thiserror::Error;

use crate::convert::ConvertError;
use crate::template::TemplateSourceError;
use vellum_doctemplate::TemplateError;
use vellum_ooxml::{NormalizationError, PlannerError};

/// A fatal render failure.
///
/// Each variant corresponds to one pipeline stage; the wrapped error carries
/// the offending text snippet and position needed to diagnose the failure
/// without re-running. Non-fatal problems never appear here; they are
/// returned as warnings on [`RenderOutput`](crate::render::RenderOutput).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markup normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("template evaluation failed: {0}")]
    Template(#[from] TemplateError),

    #[error("page-break planning failed: {0}")]
    Planner(#[from] PlannerError),

    #[error("template source failed: {0}")]
    Source(#[from] TemplateSourceError),

    #[error("document conversion failed: {0}")]
    Convert(#[from] ConvertError),
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;
