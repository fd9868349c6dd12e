/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render options and output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use vellum_doctemplate::Warning;
use vellum_ooxml::PageBreakConfig;

/// Per-render configuration.
///
/// The planner flags mirror the request-level configuration surface:
/// `tablePageBreaking` keeps tables intact across page boundaries,
/// `longTableSplit` lets long tables break row-by-row instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    pub table_page_breaking: bool,
    pub long_table_split: bool,

    /// Upper bound for external document conversion.
    pub convert_timeout_secs: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            table_page_breaking: true,
            long_table_split: false,
            convert_timeout_secs: 120,
        }
    }
}

impl RenderOptions {
    /// The planner configuration slice of these options.
    pub fn page_break_config(&self) -> PageBreakConfig {
        PageBreakConfig {
            table_page_breaking: self.table_page_breaking,
            long_table_split: self.long_table_split,
        }
    }

    /// The conversion timeout as a [`Duration`].
    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }
}

/// The result of a successful render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Final markup, ready for packaging or conversion.
    pub content: String,

    /// Non-fatal warnings, in the order they were encountered. Always
    /// surfaced, never dropped.
    pub warnings: Vec<Warning>,

    /// Wall-clock time spent in the pipeline, for the caller's operational
    /// records.
    pub duration: Duration,
}
