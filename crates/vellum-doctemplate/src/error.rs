/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for directive parsing and evaluation.
//!
//! Only structural problems are errors: malformed expression syntax,
//! unmatched block directives, and unterminated markers. Data-shape problems
//! (missing fields, type mismatches, empty loop sources) are reported as
//! [`Warning`](crate::warnings::Warning)s instead, so a render always
//! completes with best-effort output.

use thiserror::Error;

/// Errors that can occur while parsing or evaluating a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Malformed expression syntax inside a directive.
    #[error("parse error in `{directive}` at offset {offset}: expected {expected}, found {found}")]
    Parse {
        /// The directive text that failed to parse.
        directive: String,
        /// Character offset of the failure within the directive text.
        offset: usize,
        /// Description of what the parser expected.
        expected: String,
        /// What the parser actually saw.
        found: String,
    },

    /// A block closer (`/each`, `/if`, `:else`) with no matching opener.
    #[error("`${{{directive}}}` at offset {offset} has no matching opener")]
    UnmatchedCloser { directive: String, offset: usize },

    /// End of input reached while a block directive was still open.
    #[error("`${{{directive}}}` at offset {offset} is never closed")]
    UnclosedBlock { directive: String, offset: usize },

    /// A `${` marker with no terminating `}`.
    #[error("unterminated directive marker at offset {offset}")]
    UnterminatedMarker { offset: usize },
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
