/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for the markup passes.
//!
//! Both passes fail only on structural damage. Partial output from either
//! would silently corrupt the document, so there is no warning tier here.

use thiserror::Error;

/// The repair pass could not reassemble a directive marker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    /// A `${` marker is still open at the end of its enclosing paragraph.
    #[error("directive `{snippet}` at offset {offset} is not closed before the end of its paragraph")]
    UnterminatedDirective { snippet: String, offset: usize },

    /// Tag nesting is unbalanced beyond repair.
    #[error("`{tag}` at offset {offset} has no matching close tag")]
    UnbalancedMarkup { tag: String, offset: usize },

    /// A close tag appeared with nothing open.
    #[error("`</{tag}>` at offset {offset} has no matching open tag")]
    UnmatchedClose { tag: String, offset: usize },

    /// The markup ends in the middle of a tag.
    #[error("markup ends inside a tag starting at offset {offset}")]
    UnterminatedTag { offset: usize },
}

/// The planner found row or table boundaries it could not match.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    /// A `<w:tr>` with no matching close tag.
    #[error("table row at offset {offset} has no matching `</w:tr>`")]
    UnclosedRow { offset: usize },

    /// A `<w:tbl>` with no matching close tag.
    #[error("table at offset {offset} has no matching `</w:tbl>`")]
    UnclosedTable { offset: usize },

    /// A close tag appeared with nothing open.
    #[error("`</{tag}>` at offset {offset} has no matching open tag")]
    UnmatchedClose { tag: String, offset: usize },

    /// The markup ends in the middle of a tag.
    #[error("markup ends inside a tag starting at offset {offset}")]
    UnterminatedTag { offset: usize },
}
