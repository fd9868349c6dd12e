/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Directive template engine for word-processing markup.
//!
//! This crate evaluates an embedded directive language directly against
//! serialized document markup. Directives are `${...}` markers found in text
//! content:
//!
//! - Interpolation: `${customer.name}`, `${items:sum('amount')}`
//! - Loops: `${#each collateral}...${/each}`
//! - Conditionals: `${#if this.type == 'Individual'}...${:else}...${/if}`
//!
//! Markup outside directives passes through byte-for-byte; the engine never
//! builds a document tree. Data-shape problems (missing fields, empty loop
//! sources, type mismatches) produce [`Warning`]s and best-effort output
//! rather than failures; partial output is always better than none for a
//! long multi-page document.
//!
//! # Example
//!
//! ```
//! use vellum_doctemplate::{TemplateValue, process};
//!
//! let data = TemplateValue::from(serde_json::json!({"name": "World"}));
//! let rendered = process("Hello ${name}!", &data).unwrap();
//! assert_eq!(rendered.content, "Hello World!");
//! assert!(rendered.warnings.is_empty());
//! ```
//!
//! Aggregations and formatters live in a process-wide [`registry`]; custom
//! functions may be registered at startup via [`registry::register`].

pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod registry;
pub mod warnings;

// Re-export main types at crate root
pub use ast::{BinaryOp, Call, Expr, Literal, PathRef, UnaryOp};
pub use context::{ScopeStack, TemplateValue, format_number, loose_eq};
pub use error::{TemplateError, TemplateResult};
pub use evaluator::{Rendered, check, process};
pub use parser::parse;
pub use registry::{FunctionError, TemplateFn};
pub use warnings::{Warning, WarningKind, WarningSink};
