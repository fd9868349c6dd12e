/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template source resolution.
//!
//! Named templates resolve to raw document markup bytes. Storage is a
//! collaborator concern; the pipeline only needs the resolution interface
//! plus the two implementations every deployment wants: an in-memory map
//! (tests, embedding) and a directory on disk.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Template resolution failures.
#[derive(Debug, Error)]
pub enum TemplateSourceError {
    /// No template with the given identifier.
    #[error("template not found: {id}")]
    NotFound { id: String },

    /// The identifier is not acceptable to this source (e.g. a path that
    /// escapes the template directory).
    #[error("invalid template identifier: {id}")]
    InvalidId { id: String },

    #[error("failed to read template {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a template identifier to raw markup bytes.
pub trait TemplateSource: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Vec<u8>, TemplateSourceError>;
}

/// In-memory template source.
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under an identifier, replacing any existing one.
    pub fn insert(&mut self, id: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.templates.insert(id.into(), content.into());
    }
}

impl TemplateSource for MemorySource {
    fn resolve(&self, id: &str) -> Result<Vec<u8>, TemplateSourceError> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateSourceError::NotFound { id: id.to_string() })
    }
}

/// Filesystem template source rooted at a directory.
///
/// Identifiers are relative paths under the root; absolute paths and parent
/// components are rejected rather than resolved.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateSource for DirectorySource {
    fn resolve(&self, id: &str) -> Result<Vec<u8>, TemplateSourceError> {
        let relative = Path::new(id);
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes {
            return Err(TemplateSourceError::InvalidId { id: id.to_string() });
        }

        let path = self.root.join(relative);
        match std::fs::read(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateSourceError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(TemplateSourceError::Io {
                id: id.to_string(),
                source: e,
            }),
        }
    }
}
