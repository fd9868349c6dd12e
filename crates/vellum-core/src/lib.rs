/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Core rendering infrastructure for vellum.
//!
//! This crate ties the markup passes and the directive engine into one
//! render pipeline, and defines the interfaces the surrounding system
//! implements: template storage, document conversion, and operational
//! observation.
//!
//! # Example
//!
//! ```
//! use vellum_core::{RenderOptions, render};
//!
//! let markup = "<w:p><w:r><w:t>Dear ${customer.name},</w:t></w:r></w:p>";
//! let data = serde_json::json!({"customer": {"name": "Shiva"}});
//!
//! let output = render(markup, &data, &RenderOptions::default()).unwrap();
//! assert!(output.content.contains("Dear Shiva,"));
//! ```

pub mod convert;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod render;
pub mod template;

// Re-export commonly used types
pub use convert::{ConvertError, ConvertFormat, DocumentConverter, OfficeConverter};
pub use error::{RenderError, Result};
pub use observer::{NoopObserver, RenderObserver};
pub use pipeline::{render, render_with_observer};
pub use render::{RenderOptions, RenderOutput};
pub use template::{DirectorySource, MemorySource, TemplateSource, TemplateSourceError};
