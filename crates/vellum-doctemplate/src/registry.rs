/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Process-wide aggregation and formatter registry.
//!
//! The registry maps names to pure functions consulted by the evaluator for
//! call expressions like `items:sum('amount')`. Built-ins are installed on
//! first access; [`register`] is an explicit extension point intended for
//! startup, not runtime patching. Last writer wins; there is no removal.
//!
//! Aggregations operate on a sequence receiver plus an optional dot-path
//! argument selecting a field per item. Numeric aggregations coerce each
//! selected value to a number and silently discard values that do not
//! parse. Formatters are unary value-to-text functions.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::context::{TemplateValue, loose_eq};

/// A registered template function.
///
/// The receiver (the path before `:` in the call syntax) arrives as the
/// first parameter; remaining call arguments follow in order.
pub type TemplateFn =
    Arc<dyn Fn(&TemplateValue, &[TemplateValue]) -> Result<TemplateValue, FunctionError> + Send + Sync>;

/// A function rejected its receiver or arguments.
///
/// These surface as evaluation warnings, never as fatal errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    #[error("`{name}` expects a sequence receiver, got {actual}")]
    NotASequence {
        name: &'static str,
        actual: &'static str,
    },

    #[error("`{name}` expects {expected}")]
    BadArgs {
        name: &'static str,
        expected: &'static str,
    },
}

static REGISTRY: Lazy<RwLock<HashMap<String, TemplateFn>>> =
    Lazy::new(|| RwLock::new(builtins()));

/// Look up a function by name.
pub fn get(name: &str) -> Option<TemplateFn> {
    let registry = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    registry.get(name).cloned()
}

/// Register a function, replacing any existing entry with the same name.
pub fn register(name: impl Into<String>, function: TemplateFn) {
    let mut registry = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    registry.insert(name.into(), function);
}

fn builtins() -> HashMap<String, TemplateFn> {
    let mut map: HashMap<String, TemplateFn> = HashMap::new();

    map.insert("sum".into(), Arc::new(|recv, args| sum(recv, args)));
    map.insert("count".into(), Arc::new(|recv, args| count(recv, args)));
    map.insert("avg".into(), Arc::new(|recv, args| avg(recv, args)));
    map.insert("min".into(), Arc::new(|recv, args| min_max(recv, args, "min")));
    map.insert("max".into(), Arc::new(|recv, args| min_max(recv, args, "max")));
    map.insert("first".into(), Arc::new(|recv, _| edge(recv, "first", false)));
    map.insert("last".into(), Arc::new(|recv, _| edge(recv, "last", true)));
    map.insert("unique".into(), Arc::new(|recv, args| unique(recv, args)));
    map.insert("filter".into(), Arc::new(|recv, args| filter(recv, args)));
    map.insert("sort".into(), Arc::new(|recv, args| sort(recv, args)));
    map.insert("groupBy".into(), Arc::new(|recv, args| group_by(recv, args)));
    map.insert("pluck".into(), Arc::new(|recv, args| pluck(recv, args)));

    map.insert("upper".into(), Arc::new(|recv, _| formatter(recv, str::to_uppercase)));
    map.insert("lower".into(), Arc::new(|recv, _| formatter(recv, str::to_lowercase)));
    map.insert("trim".into(), Arc::new(|recv, _| formatter(recv, |s| s.trim().to_string())));

    map
}

// ============================================================================
// Argument helpers
// ============================================================================

fn items<'v>(
    recv: &'v TemplateValue,
    name: &'static str,
) -> Result<&'v [TemplateValue], FunctionError> {
    match recv {
        TemplateValue::List(items) => Ok(items),
        // An absent receiver aggregates as an empty sequence rather than
        // failing; the evaluator has already warned about the missing path.
        TemplateValue::Null => Ok(&[]),
        other => Err(FunctionError::NotASequence {
            name,
            actual: other.type_name(),
        }),
    }
}

/// An optional leading dot-path argument selecting a field per item.
fn field_arg(
    args: &[TemplateValue],
    name: &'static str,
) -> Result<Option<Vec<String>>, FunctionError> {
    match args.first() {
        None => Ok(None),
        Some(TemplateValue::String(path)) => {
            Ok(Some(path.split('.').map(str::to_string).collect()))
        }
        Some(_) => Err(FunctionError::BadArgs {
            name,
            expected: "a field path string",
        }),
    }
}

fn required_field_arg(
    args: &[TemplateValue],
    name: &'static str,
) -> Result<Vec<String>, FunctionError> {
    field_arg(args, name)?.ok_or(FunctionError::BadArgs {
        name,
        expected: "a field path string",
    })
}

fn select<'v>(item: &'v TemplateValue, field: Option<&[String]>) -> Option<&'v TemplateValue> {
    match field {
        None => Some(item),
        Some(path) => item.get_path(path),
    }
}

/// Selected values that coerce to numbers; everything else is discarded.
fn numeric_values<'v>(
    items: &'v [TemplateValue],
    field: Option<&[String]>,
) -> impl Iterator<Item = f64> + 'v {
    let field = field.map(<[String]>::to_vec);
    items
        .iter()
        .filter_map(move |item| select(item, field.as_deref()))
        .filter_map(TemplateValue::as_number)
}

// ============================================================================
// Aggregations
// ============================================================================

fn sum(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "sum")?;
    let field = field_arg(args, "sum")?;
    Ok(TemplateValue::Number(
        numeric_values(items, field.as_deref()).sum(),
    ))
}

fn count(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "count")?;
    let field = field_arg(args, "count")?;
    let n = match field {
        None => items.len(),
        Some(path) => items
            .iter()
            .filter(|item| {
                select(item, Some(&path)).is_some_and(|v| !matches!(v, TemplateValue::Null))
            })
            .count(),
    };
    Ok(TemplateValue::Number(n as f64))
}

fn avg(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "avg")?;
    let field = field_arg(args, "avg")?;
    let values: Vec<f64> = numeric_values(items, field.as_deref()).collect();
    if values.is_empty() {
        return Ok(TemplateValue::Null);
    }
    Ok(TemplateValue::Number(
        values.iter().sum::<f64>() / values.len() as f64,
    ))
}

fn min_max(
    recv: &TemplateValue,
    args: &[TemplateValue],
    name: &'static str,
) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, name)?;
    let field = field_arg(args, name)?;
    let result = numeric_values(items, field.as_deref()).reduce(|a, b| {
        if (name == "min") == (b < a) { b } else { a }
    });
    Ok(result.map(TemplateValue::Number).unwrap_or(TemplateValue::Null))
}

fn edge(
    recv: &TemplateValue,
    name: &'static str,
    last: bool,
) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, name)?;
    let item = if last { items.last() } else { items.first() };
    Ok(item.cloned().unwrap_or(TemplateValue::Null))
}

fn unique(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "unique")?;
    let field = field_arg(args, "unique")?;
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for item in items {
        let key = match select(item, field.as_deref()) {
            Some(v) => (v.type_name(), v.render()),
            None => ("absent", String::new()),
        };
        if seen.insert(key) {
            result.push(item.clone());
        }
    }
    Ok(TemplateValue::List(result))
}

fn filter(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "filter")?;
    let field = required_field_arg(args, "filter")?;
    let Some(expected) = args.get(1) else {
        return Err(FunctionError::BadArgs {
            name: "filter",
            expected: "a field path and a comparison value",
        });
    };
    let result = items
        .iter()
        .filter(|item| {
            select(item, Some(&field)).is_some_and(|actual| loose_eq(actual, expected))
        })
        .cloned()
        .collect();
    Ok(TemplateValue::List(result))
}

fn sort(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "sort")?;
    let field = required_field_arg(args, "sort")?;
    let descending = match args.get(1) {
        None => false,
        Some(TemplateValue::String(order)) => match order.as_str() {
            "asc" | "ascending" => false,
            "desc" | "descending" => true,
            _ => {
                return Err(FunctionError::BadArgs {
                    name: "sort",
                    expected: "`asc` or `desc` as the order",
                });
            }
        },
        Some(_) => {
            return Err(FunctionError::BadArgs {
                name: "sort",
                expected: "`asc` or `desc` as the order",
            });
        }
    };

    let mut sorted = items.to_vec();
    // Stable sort; nulls sort last regardless of direction.
    sorted.sort_by(|a, b| {
        let a = select(a, Some(&field)).filter(|v| !matches!(v, TemplateValue::Null));
        let b = select(b, Some(&field)).filter(|v| !matches!(v, TemplateValue::Null));
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b);
                if descending { ordering.reverse() } else { ordering }
            }
        }
    });
    Ok(TemplateValue::List(sorted))
}

/// Numeric comparison when both sides coerce, text comparison otherwise.
fn compare_values(a: &TemplateValue, b: &TemplateValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.render().cmp(&b.render()),
    }
}

fn group_by(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "groupBy")?;
    let field = required_field_arg(args, "groupBy")?;

    // First-seen key order, so the result is deterministic and directly
    // iterable by a loop directive.
    let mut keys: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<TemplateValue>> = HashMap::new();
    for item in items {
        let key = select(item, Some(&field))
            .map(TemplateValue::render)
            .unwrap_or_default();
        if !groups.contains_key(&key) {
            keys.push(key.clone());
        }
        groups.entry(key).or_default().push(item.clone());
    }

    let result = keys
        .into_iter()
        .map(|key| {
            let items = groups.remove(&key).unwrap_or_default();
            let mut entry = HashMap::new();
            entry.insert("key".to_string(), TemplateValue::String(key));
            entry.insert("items".to_string(), TemplateValue::List(items));
            TemplateValue::Map(entry)
        })
        .collect();
    Ok(TemplateValue::List(result))
}

fn pluck(recv: &TemplateValue, args: &[TemplateValue]) -> Result<TemplateValue, FunctionError> {
    let items = items(recv, "pluck")?;
    let field = required_field_arg(args, "pluck")?;
    let result = items
        .iter()
        .map(|item| select(item, Some(&field)).cloned().unwrap_or(TemplateValue::Null))
        .collect();
    Ok(TemplateValue::List(result))
}

// ============================================================================
// Formatters
// ============================================================================

fn formatter(
    recv: &TemplateValue,
    transform: impl Fn(&str) -> String,
) -> Result<TemplateValue, FunctionError> {
    Ok(TemplateValue::String(transform(&recv.render())))
}
