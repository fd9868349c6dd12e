/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template values and evaluation scopes.
//!
//! [`TemplateValue`] is the dynamic value type directives evaluate against.
//! Rendering data arrives as arbitrary nested JSON, so a lossless conversion
//! from [`serde_json::Value`] is provided. The engine never mutates the
//! input data; scopes clone the values they bind.
//!
//! [`ScopeStack`] is the evaluation context: an ordered stack of scopes, one
//! pushed per loop-body entry, each binding `this` to the current iteration
//! item. It is local to a single render call and must not be shared across
//! concurrent evaluations.

use std::collections::HashMap;

/// A value that can appear in template evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TemplateValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<TemplateValue>),
    Map(HashMap<String, TemplateValue>),
    #[default]
    Null,
}

impl TemplateValue {
    /// Truthiness for conditional evaluation.
    ///
    /// Empty string, `0`, `false`, null, and an empty sequence are false;
    /// everything else (including the string `"false"` and any mapping) is
    /// true.
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::Bool(b) => *b,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(_) => true,
            TemplateValue::Null => false,
        }
    }

    /// Get a nested field by path segments.
    pub fn get_path(&self, path: &[String]) -> Option<&TemplateValue> {
        let mut current = self;
        for segment in path {
            match current {
                TemplateValue::Map(m) => current = m.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Coerce this value to a number, if it has one.
    ///
    /// Numbers coerce to themselves; strings coerce when they parse as a
    /// decimal number. Everything else has no numeric form.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TemplateValue::Number(n) => Some(*n),
            TemplateValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// A short name for the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            TemplateValue::String(_) => "string",
            TemplateValue::Number(_) => "number",
            TemplateValue::Bool(_) => "boolean",
            TemplateValue::List(_) => "sequence",
            TemplateValue::Map(_) => "mapping",
            TemplateValue::Null => "null",
        }
    }

    /// Render this value as output text.
    ///
    /// - String: as-is
    /// - Number: locale-independent decimal, no trailing `.0`
    /// - Bool: the literal words `true` / `false`
    /// - List: concatenation of rendered elements
    /// - Map: empty (a mapping has no sensible text form; the evaluator
    ///   warns before calling this)
    /// - Null: empty
    pub fn render(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Number(n) => format_number(*n),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::List(items) => items.iter().map(|v| v.render()).collect(),
            TemplateValue::Map(_) => String::new(),
            TemplateValue::Null => String::new(),
        }
    }
}

/// Format a number in locale-independent decimal form.
///
/// Integral values print without a fractional part: `15`, not `15.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Loose equality mirroring loosely-typed document data.
///
/// Two strings compare as strings (`"5" == "5.0"` is false). A number and a
/// numeric string compare numerically (`"5" == 5` is true). Booleans equal
/// only booleans, null equals only null; sequences and mappings compare
/// structurally.
pub fn loose_eq(a: &TemplateValue, b: &TemplateValue) -> bool {
    match (a, b) {
        (TemplateValue::String(x), TemplateValue::String(y)) => x == y,
        (TemplateValue::Number(x), TemplateValue::String(s))
        | (TemplateValue::String(s), TemplateValue::Number(x)) => {
            s.trim().parse::<f64>().map(|y| *x == y).unwrap_or(false)
        }
        _ => a == b,
    }
}

impl From<serde_json::Value> for TemplateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => {
                TemplateValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from).collect())
            }
            serde_json::Value::Object(fields) => TemplateValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for TemplateValue {
    fn from(value: &serde_json::Value) -> Self {
        TemplateValue::from(value.clone())
    }
}

/// The evaluation context: an ordered stack of scopes.
///
/// The outermost scope binds `this` to the root data mapping; each loop
/// iteration pushes a scope binding `this` to the iteration item. Paths
/// starting with `this` resolve strictly in the innermost scope; any other
/// path is looked up scope-by-scope from innermost to outermost.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<TemplateValue>,
}

impl ScopeStack {
    /// Create a stack with the root data as its only scope.
    pub fn new(root: TemplateValue) -> Self {
        Self { frames: vec![root] }
    }

    /// Enter a loop body, binding `this` to `item`.
    pub fn push(&mut self, item: TemplateValue) {
        self.frames.push(item);
    }

    /// Leave a loop body. The root scope is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// The item bound to `this` in the innermost scope.
    pub fn this(&self) -> &TemplateValue {
        self.frames.last().expect("root scope always present")
    }

    /// Resolve a path against the stack.
    pub fn resolve(&self, segments: &[String]) -> Option<&TemplateValue> {
        if segments.first().map(String::as_str) == Some("this") {
            return self.this().get_path(&segments[1..]);
        }
        // Innermost scope wins; fall outward until the first segment binds.
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get_path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, TemplateValue)]) -> TemplateValue {
        TemplateValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_truthiness() {
        assert!(!TemplateValue::String(String::new()).is_truthy());
        assert!(TemplateValue::String("false".to_string()).is_truthy());
        assert!(!TemplateValue::Number(0.0).is_truthy());
        assert!(TemplateValue::Number(-1.5).is_truthy());
        assert!(!TemplateValue::Bool(false).is_truthy());
        assert!(!TemplateValue::List(vec![]).is_truthy());
        assert!(TemplateValue::List(vec![TemplateValue::Bool(false)]).is_truthy());
        assert!(!TemplateValue::Null.is_truthy());
        assert!(map(&[]).is_truthy());
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(TemplateValue::Number(15.0).render(), "15");
        assert_eq!(TemplateValue::Number(15.5).render(), "15.5");
        assert_eq!(TemplateValue::Number(-3.0).render(), "-3");
        assert_eq!(TemplateValue::Number(0.25).render(), "0.25");
    }

    #[test]
    fn test_bool_rendering() {
        assert_eq!(TemplateValue::Bool(true).render(), "true");
        assert_eq!(TemplateValue::Bool(false).render(), "false");
    }

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(TemplateValue::Null.render(), "");
    }

    #[test]
    fn test_loose_eq_string_number() {
        let five_str = TemplateValue::String("5".to_string());
        let five_num = TemplateValue::Number(5.0);
        assert!(loose_eq(&five_str, &five_num));
        assert!(loose_eq(&five_num, &five_str));
    }

    #[test]
    fn test_loose_eq_two_strings_no_coercion() {
        let a = TemplateValue::String("5".to_string());
        let b = TemplateValue::String("5.0".to_string());
        assert!(!loose_eq(&a, &b));
        assert!(!loose_eq(&b, &a));
    }

    #[test]
    fn test_loose_eq_bool_is_strict() {
        assert!(!loose_eq(
            &TemplateValue::String("0".to_string()),
            &TemplateValue::Bool(false)
        ));
        assert!(!loose_eq(
            &TemplateValue::Number(1.0),
            &TemplateValue::Bool(true)
        ));
        assert!(loose_eq(
            &TemplateValue::Bool(true),
            &TemplateValue::Bool(true)
        ));
    }

    #[test]
    fn test_loose_eq_null() {
        assert!(loose_eq(&TemplateValue::Null, &TemplateValue::Null));
        assert!(!loose_eq(
            &TemplateValue::Null,
            &TemplateValue::String(String::new())
        ));
    }

    #[test]
    fn test_get_path() {
        let owner = map(&[(
            "name",
            TemplateValue::String("Shiva".to_string()),
        )]);
        let item = map(&[("collateralOwner", owner)]);

        assert_eq!(
            item.get_path(&segs(&["collateralOwner", "name"])),
            Some(&TemplateValue::String("Shiva".to_string()))
        );
        assert_eq!(item.get_path(&segs(&["collateralOwner", "age"])), None);
        assert_eq!(item.get_path(&segs(&["missing"])), None);
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value = serde_json::json!({
            "name": "Land",
            "size": 42,
            "owners": ["a", "b"],
            "active": true,
            "note": null,
        });
        let value = TemplateValue::from(json);
        assert_eq!(
            value.get_path(&segs(&["name"])),
            Some(&TemplateValue::String("Land".to_string()))
        );
        assert_eq!(
            value.get_path(&segs(&["size"])),
            Some(&TemplateValue::Number(42.0))
        );
        assert_eq!(value.get_path(&segs(&["note"])), Some(&TemplateValue::Null));
    }

    #[test]
    fn test_scope_this_shadowing() {
        let outer = map(&[("type", TemplateValue::String("outer".to_string()))]);
        let inner = map(&[("type", TemplateValue::String("inner".to_string()))]);

        let mut scope = ScopeStack::new(map(&[]));
        scope.push(outer);
        scope.push(inner);

        assert_eq!(
            scope.resolve(&segs(&["this", "type"])),
            Some(&TemplateValue::String("inner".to_string()))
        );
        scope.pop();
        assert_eq!(
            scope.resolve(&segs(&["this", "type"])),
            Some(&TemplateValue::String("outer".to_string()))
        );
    }

    #[test]
    fn test_scope_outward_lookup() {
        let root = map(&[("company", TemplateValue::String("Acme".to_string()))]);
        let item = map(&[("name", TemplateValue::String("Widget".to_string()))]);

        let mut scope = ScopeStack::new(root);
        scope.push(item);

        // Not found on the item, falls out to the root data.
        assert_eq!(
            scope.resolve(&segs(&["company"])),
            Some(&TemplateValue::String("Acme".to_string()))
        );
        // Innermost scope wins when both bind.
        assert_eq!(
            scope.resolve(&segs(&["name"])),
            Some(&TemplateValue::String("Widget".to_string()))
        );
    }

    #[test]
    fn test_scope_this_never_escapes() {
        let root = map(&[("type", TemplateValue::String("root".to_string()))]);
        let item = map(&[("name", TemplateValue::String("inner".to_string()))]);

        let mut scope = ScopeStack::new(root);
        scope.push(item);

        // `this.type` must not fall through to the root even though the
        // inner item has no `type` field.
        assert_eq!(scope.resolve(&segs(&["this", "type"])), None);
    }

    #[test]
    fn test_root_scope_survives_pop() {
        let mut scope = ScopeStack::new(map(&[("a", TemplateValue::Bool(true))]));
        scope.pop();
        assert_eq!(
            scope.resolve(&segs(&["a"])),
            Some(&TemplateValue::Bool(true))
        );
    }
}
