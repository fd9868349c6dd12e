/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Directive evaluation engine.
//!
//! The evaluator makes a single left-to-right scan over repaired markup,
//! identifying `${...}` directive markers without a structural parse; all
//! markup outside directives passes through byte-for-byte. Loop bodies are
//! expanded eagerly and independently per item, with a scope pushed per
//! iteration. Data-shape problems warn and substitute empty output; only
//! structural problems (unmatched or unclosed blocks, malformed
//! expressions) abort the render.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BinaryOp, Call, Expr, Literal, UnaryOp};
use crate::context::{ScopeStack, TemplateValue, loose_eq};
use crate::error::{TemplateError, TemplateResult};
use crate::registry;
use crate::warnings::{Warning, WarningKind, WarningSink};

/// The result of a successful render: best-effort output plus every warning
/// collected along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub content: String,
    pub warnings: Vec<Warning>,
}

/// Evaluate directives in `markup` against `data`.
///
/// The markup must already be repaired: every directive marker wholly
/// contained in one text span. `data` is never mutated.
pub fn process(markup: &str, data: &TemplateValue) -> TemplateResult<Rendered> {
    let segments = scan(markup)?;
    tracing::debug!(
        markers = segments.iter().filter(|s| matches!(s, Segment::Marker(_))).count(),
        "evaluating template"
    );

    let mut evaluator = Evaluator::new();
    let mut scope = ScopeStack::new(data.clone());
    let mut out = String::with_capacity(markup.len());
    evaluator.eval_range(&segments, 0, segments.len(), &mut scope, &mut out)?;

    Ok(Rendered {
        content: out,
        warnings: evaluator.sink.into_warnings(),
    })
}

/// Validate directive structure and expression syntax without rendering.
///
/// Catches everything `process` would treat as fatal: unterminated markers,
/// malformed expressions, unmatched or unclosed blocks.
pub fn check(markup: &str) -> TemplateResult<()> {
    let segments = scan(markup)?;
    // Open blocks, with an else-seen flag for conditions.
    let mut open: Vec<(&Marker, bool)> = Vec::new();

    for segment in &segments {
        let Segment::Marker(marker) = segment else {
            continue;
        };
        match marker.kind {
            MarkerKind::Interpolation | MarkerKind::LoopStart | MarkerKind::CondStart => {
                crate::parser::parse(marker.expr)?;
            }
            MarkerKind::LoopEnd | MarkerKind::CondEnd | MarkerKind::Else => {}
        }
        match marker.kind {
            MarkerKind::LoopStart | MarkerKind::CondStart => open.push((marker, false)),
            MarkerKind::LoopEnd => pop_matching(&mut open, marker, MarkerKind::LoopStart)?,
            MarkerKind::CondEnd => pop_matching(&mut open, marker, MarkerKind::CondStart)?,
            MarkerKind::Else => match open.last_mut() {
                Some((opener, else_seen))
                    if opener.kind == MarkerKind::CondStart && !*else_seen =>
                {
                    *else_seen = true;
                }
                _ => {
                    return Err(TemplateError::UnmatchedCloser {
                        directive: marker.directive.to_string(),
                        offset: marker.offset,
                    });
                }
            },
            MarkerKind::Interpolation => {}
        }
    }

    if let Some((marker, _)) = open.last() {
        return Err(TemplateError::UnclosedBlock {
            directive: marker.directive.to_string(),
            offset: marker.offset,
        });
    }
    Ok(())
}

fn pop_matching(
    open: &mut Vec<(&Marker, bool)>,
    closer: &Marker,
    expected: MarkerKind,
) -> TemplateResult<()> {
    if open.last().map(|(m, _)| m.kind) == Some(expected) {
        open.pop();
        Ok(())
    } else {
        Err(TemplateError::UnmatchedCloser {
            directive: closer.directive.to_string(),
            offset: closer.offset,
        })
    }
}

// ============================================================================
// Marker scanning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Interpolation,
    LoopStart,
    LoopEnd,
    CondStart,
    Else,
    CondEnd,
}

#[derive(Debug)]
struct Marker<'a> {
    kind: MarkerKind,
    /// The expression payload (empty for closers and `:else`).
    expr: &'a str,
    /// The trimmed directive text, for diagnostics.
    directive: &'a str,
    /// Byte offset of `${` in the markup.
    offset: usize,
}

#[derive(Debug)]
enum Segment<'a> {
    Text(&'a str),
    Marker(Marker<'a>),
}

fn scan(markup: &str) -> TemplateResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(rel) = markup[pos..].find("${") {
        let start = pos + rel;
        if start > pos {
            segments.push(Segment::Text(&markup[pos..start]));
        }
        let body_start = start + 2;
        let close = find_marker_close(markup, body_start)
            .ok_or(TemplateError::UnterminatedMarker { offset: start })?;
        segments.push(Segment::Marker(classify(&markup[body_start..close], start)));
        pos = close + 1;
    }
    if pos < markup.len() {
        segments.push(Segment::Text(&markup[pos..]));
    }

    Ok(segments)
}

/// Find the `}` terminating a marker. A `}` inside a quoted string literal
/// does not terminate the marker.
fn find_marker_close(markup: &str, from: usize) -> Option<usize> {
    let bytes = markup.as_bytes();
    let mut pos = from;
    let mut quote: Option<u8> = None;

    while pos < bytes.len() {
        match (quote, bytes[pos]) {
            (Some(_), b'\\') if pos + 1 < bytes.len() => {
                pos += 2;
                continue;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(bytes[pos]),
            (None, b'}') => return Some(pos),
            (None, _) => {}
        }
        pos += 1;
    }
    None
}

fn classify(body: &str, offset: usize) -> Marker<'_> {
    let directive = body.trim();
    let (kind, expr) = if let Some(rest) = keyword(directive, "#each") {
        (MarkerKind::LoopStart, rest)
    } else if let Some(rest) = keyword(directive, "#if") {
        (MarkerKind::CondStart, rest)
    } else if directive == "/each" {
        (MarkerKind::LoopEnd, "")
    } else if directive == "/if" {
        (MarkerKind::CondEnd, "")
    } else if directive == ":else" {
        (MarkerKind::Else, "")
    } else {
        (MarkerKind::Interpolation, directive)
    };
    Marker {
        kind,
        expr,
        directive,
        offset,
    }
}

/// Strip a directive keyword, requiring it to stand alone: `#each items`
/// matches, `#eachitems` does not (that is a malformed interpolation).
fn keyword<'a>(directive: &'a str, name: &str) -> Option<&'a str> {
    let rest = directive.strip_prefix(name)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

// ============================================================================
// Evaluation
// ============================================================================

struct Evaluator<'a> {
    /// Expression trees are pure, so one parse per distinct directive text.
    cache: HashMap<&'a str, Rc<Expr>>,
    sink: WarningSink,
}

impl<'a> Evaluator<'a> {
    fn new() -> Self {
        Self {
            cache: HashMap::new(),
            sink: WarningSink::new(),
        }
    }

    fn eval_range(
        &mut self,
        segments: &[Segment<'a>],
        start: usize,
        end: usize,
        scope: &mut ScopeStack,
        out: &mut String,
    ) -> TemplateResult<()> {
        let mut i = start;
        while i < end {
            match &segments[i] {
                Segment::Text(text) => {
                    out.push_str(text);
                    i += 1;
                }
                Segment::Marker(marker) => match marker.kind {
                    MarkerKind::Interpolation => {
                        let value = self.eval_cached(marker, scope)?;
                        self.write_value(value, marker, out);
                        i += 1;
                    }
                    MarkerKind::LoopStart => {
                        let close = find_loop_end(segments, i + 1, end).ok_or_else(|| {
                            TemplateError::UnclosedBlock {
                                directive: marker.directive.to_string(),
                                offset: marker.offset,
                            }
                        })?;
                        let items = self.loop_source(marker, scope)?;
                        for item in items {
                            scope.push(item);
                            let result = self.eval_range(segments, i + 1, close, scope, out);
                            scope.pop();
                            result?;
                        }
                        i = close + 1;
                    }
                    MarkerKind::CondStart => {
                        let (else_idx, close) = find_cond_arms(segments, i + 1, end)
                            .ok_or_else(|| TemplateError::UnclosedBlock {
                                directive: marker.directive.to_string(),
                                offset: marker.offset,
                            })?;
                        let value = self.eval_cached(marker, scope)?;
                        if value.is_truthy() {
                            self.eval_range(segments, i + 1, else_idx.unwrap_or(close), scope, out)?;
                        } else if let Some(else_idx) = else_idx {
                            self.eval_range(segments, else_idx + 1, close, scope, out)?;
                        }
                        i = close + 1;
                    }
                    MarkerKind::LoopEnd | MarkerKind::CondEnd | MarkerKind::Else => {
                        return Err(TemplateError::UnmatchedCloser {
                            directive: marker.directive.to_string(),
                            offset: marker.offset,
                        });
                    }
                },
            }
        }
        Ok(())
    }

    /// Resolve a loop source to its items. Absent, empty, or non-sequence
    /// sources warn and yield no iterations, dropping the body entirely.
    fn loop_source(
        &mut self,
        marker: &Marker<'a>,
        scope: &ScopeStack,
    ) -> TemplateResult<Vec<TemplateValue>> {
        let expr = self.parse_cached(marker.expr, marker.offset)?;
        let value = match expr.as_ref() {
            // A plain path gets a single loop-specific warning on absence
            // instead of the generic missing-value one.
            Expr::Path(path) => scope.resolve(&path.segments).cloned(),
            _ => Some(self.eval_tree(&expr, marker.directive, scope)),
        };

        match value {
            Some(TemplateValue::List(items)) if !items.is_empty() => Ok(items),
            Some(TemplateValue::List(_)) => {
                self.sink.warn(
                    WarningKind::EmptyLoop,
                    marker.directive,
                    format!("sequence `{}` is empty", marker.expr),
                );
                Ok(Vec::new())
            }
            None | Some(TemplateValue::Null) => {
                self.sink.warn(
                    WarningKind::EmptyLoop,
                    marker.directive,
                    format!("no sequence at `{}`", marker.expr),
                );
                Ok(Vec::new())
            }
            Some(other) => {
                self.sink.warn(
                    WarningKind::TypeMismatch,
                    marker.directive,
                    format!("loop source `{}` is a {}, expected a sequence", marker.expr, other.type_name()),
                );
                Ok(Vec::new())
            }
        }
    }

    fn write_value(&mut self, value: TemplateValue, marker: &Marker<'a>, out: &mut String) {
        if matches!(value, TemplateValue::Map(_)) {
            self.sink.warn(
                WarningKind::TypeMismatch,
                marker.directive,
                format!("`{}` is a mapping and has no text form", marker.expr),
            );
            return;
        }
        out.push_str(&value.render());
    }

    fn parse_cached(&mut self, text: &'a str, offset: usize) -> TemplateResult<Rc<Expr>> {
        if let Some(expr) = self.cache.get(text) {
            return Ok(Rc::clone(expr));
        }
        let expr = Rc::new(crate::parser::parse(text).map_err(|e| at_marker(e, offset))?);
        self.cache.insert(text, Rc::clone(&expr));
        Ok(expr)
    }

    fn eval_cached(
        &mut self,
        marker: &Marker<'a>,
        scope: &ScopeStack,
    ) -> TemplateResult<TemplateValue> {
        let expr = self.parse_cached(marker.expr, marker.offset)?;
        Ok(self.eval_tree(&expr, marker.directive, scope))
    }

    /// Evaluate an expression tree. Never fails: data-shape problems warn
    /// and produce `Null` (or `false` for comparisons).
    fn eval_tree(
        &mut self,
        expr: &Expr,
        directive: &'a str,
        scope: &ScopeStack,
    ) -> TemplateValue {
        match expr {
            Expr::Literal(Literal::String(s)) => TemplateValue::String(s.clone()),
            Expr::Literal(Literal::Number(n)) => TemplateValue::Number(*n),
            Expr::Literal(Literal::Bool(b)) => TemplateValue::Bool(*b),

            Expr::Path(path) => match scope.resolve(&path.segments) {
                Some(value) => value.clone(),
                None => {
                    self.sink.warn(
                        WarningKind::MissingValue,
                        directive,
                        format!("no value at `{}`", path.segments.join(".")),
                    );
                    TemplateValue::Null
                }
            },

            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let value = self.eval_tree(operand, directive, scope);
                TemplateValue::Bool(!value.is_truthy())
            }

            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, directive, scope),

            Expr::Call(call) => self.eval_call(call, directive, scope),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        directive: &'a str,
        scope: &ScopeStack,
    ) -> TemplateValue {
        match op {
            // Short-circuit, so the untaken side cannot warn.
            BinaryOp::And => {
                let lhs = self.eval_tree(lhs, directive, scope);
                if !lhs.is_truthy() {
                    return TemplateValue::Bool(false);
                }
                TemplateValue::Bool(self.eval_tree(rhs, directive, scope).is_truthy())
            }
            BinaryOp::Or => {
                let lhs = self.eval_tree(lhs, directive, scope);
                if lhs.is_truthy() {
                    return TemplateValue::Bool(true);
                }
                TemplateValue::Bool(self.eval_tree(rhs, directive, scope).is_truthy())
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let lhs = self.eval_tree(lhs, directive, scope);
                let rhs = self.eval_tree(rhs, directive, scope);
                let equal = loose_eq(&lhs, &rhs);
                TemplateValue::Bool(if op == BinaryOp::Eq { equal } else { !equal })
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let lhs = self.eval_tree(lhs, directive, scope);
                let rhs = self.eval_tree(rhs, directive, scope);
                match (lhs.as_number(), rhs.as_number()) {
                    (Some(a), Some(b)) => TemplateValue::Bool(match op {
                        BinaryOp::Lt => a < b,
                        BinaryOp::Gt => a > b,
                        BinaryOp::Le => a <= b,
                        BinaryOp::Ge => a >= b,
                        _ => unreachable!(),
                    }),
                    _ => {
                        self.sink.warn(
                            WarningKind::TypeMismatch,
                            directive,
                            format!(
                                "cannot compare {} {} {}",
                                lhs.type_name(),
                                op.symbol(),
                                rhs.type_name()
                            ),
                        );
                        TemplateValue::Bool(false)
                    }
                }
            }
        }
    }

    fn eval_call(&mut self, call: &Call, directive: &'a str, scope: &ScopeStack) -> TemplateValue {
        let receiver = match scope.resolve(&call.receiver.segments) {
            Some(value) => value.clone(),
            None => {
                self.sink.warn(
                    WarningKind::MissingValue,
                    directive,
                    format!("no value at `{}`", call.receiver.segments.join(".")),
                );
                TemplateValue::Null
            }
        };
        let args: Vec<TemplateValue> = call
            .args
            .iter()
            .map(|arg| self.eval_tree(arg, directive, scope))
            .collect();

        let Some(function) = registry::get(&call.name) else {
            self.sink.warn(
                WarningKind::UnknownFunction,
                directive,
                format!("unknown function `{}`", call.name),
            );
            return TemplateValue::Null;
        };

        match function(&receiver, &args) {
            Ok(value) => value,
            Err(error) => {
                let kind = match error {
                    crate::registry::FunctionError::NotASequence { .. } => {
                        WarningKind::TypeMismatch
                    }
                    crate::registry::FunctionError::BadArgs { .. } => WarningKind::FunctionFailed,
                };
                self.sink.warn(kind, directive, error.to_string());
                TemplateValue::Null
            }
        }
    }
}

/// Rebase a parse error's position onto the marker's markup offset.
fn at_marker(error: TemplateError, marker_offset: usize) -> TemplateError {
    match error {
        TemplateError::Parse {
            directive,
            offset,
            expected,
            found,
        } => TemplateError::Parse {
            directive,
            offset: marker_offset + offset,
            expected,
            found,
        },
        other => other,
    }
}

/// Find the `/each` closing the loop opened just before `from`, counting
/// only loop-kind markers.
fn find_loop_end(segments: &[Segment], from: usize, end: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, segment) in segments.iter().enumerate().take(end).skip(from) {
        if let Segment::Marker(marker) = segment {
            match marker.kind {
                MarkerKind::LoopStart => depth += 1,
                MarkerKind::LoopEnd => {
                    if depth == 0 {
                        return Some(j);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }
    None
}

/// Find the optional `:else` and the `/if` closing the condition opened
/// just before `from`, counting only condition-kind markers.
fn find_cond_arms(
    segments: &[Segment],
    from: usize,
    end: usize,
) -> Option<(Option<usize>, usize)> {
    let mut depth = 0usize;
    let mut else_idx = None;
    for (j, segment) in segments.iter().enumerate().take(end).skip(from) {
        if let Segment::Marker(marker) = segment {
            match marker.kind {
                MarkerKind::CondStart => depth += 1,
                MarkerKind::Else if depth == 0 => {
                    if else_idx.is_none() {
                        else_idx = Some(j);
                    }
                }
                MarkerKind::CondEnd => {
                    if depth == 0 {
                        return Some((else_idx, j));
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }
    None
}
