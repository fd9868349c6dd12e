/*
 * warnings.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Non-fatal evaluation warnings.
//!
//! Data-shape problems never abort a render: the evaluator substitutes an
//! empty value and records a [`Warning`] instead. Warnings are collected in
//! order and always returned to the caller alongside the output, never
//! dropped.

use serde::Serialize;

/// Category of a non-fatal evaluation warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A path did not resolve in any scope.
    MissingValue,
    /// A value could not be coerced to the type an operation required.
    TypeMismatch,
    /// A loop source was absent or empty; the loop body was dropped.
    EmptyLoop,
    /// A function name was not found in the registry.
    UnknownFunction,
    /// A registered function rejected its receiver or arguments.
    FunctionFailed,
}

/// A non-fatal problem encountered during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// What went wrong.
    pub kind: WarningKind,
    /// The directive text in which the problem occurred.
    pub directive: String,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in `${{{}}}`", self.message, self.directive)
    }
}

/// Ordered collector for evaluation warnings.
#[derive(Debug, Default)]
pub struct WarningSink {
    warnings: Vec<Warning>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(
        &mut self,
        kind: WarningKind,
        directive: impl Into<String>,
        message: impl Into<String>,
    ) {
        let warning = Warning {
            kind,
            directive: directive.into(),
            message: message.into(),
        };
        tracing::debug!(directive = %warning.directive, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// The warnings collected so far, in order.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Consume the sink and return the collected warnings.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
