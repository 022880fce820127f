//! `Context`: the single mutable JSON object that flows through a machine execution.
//!
//! Realized directly as `serde_json::Value` restricted to `Object` at the root — the
//! "tagged-value type" called for by a statically typed implementation of a dynamic,
//! duck-typed scripting context (see `SPEC_FULL.md` §3).

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A JSON object that can be merged into, read by dotted path, and serialized at
/// every checkpoint (invariant 5, §3: "context contents are JSON-serializable at
/// every checkpoint event" — trivially true since `Context` never leaves JSON).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self, ContextError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ContextError::NotAnObject(type_name(&other))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merges `updates` (a JSON object) into this context, top-level keys only —
    /// the shape `output_to_context` mappings and hook returns both produce.
    pub fn merge_object(&mut self, updates: Map<String, Value>) {
        for (k, v) in updates {
            self.0.insert(k, v);
        }
    }

    /// Dotted-path lookup, e.g. `"a.b.c"`. A missing intermediate field, or indexing
    /// into a non-container, yields `None` (the expression engine maps this to JSON
    /// `null`, not an error) — see §4.A "missing intermediate fields yield null".
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut cur = self.0.get(path.split('.').next()?)?;
        let mut segments = path.split('.');
        segments.next();
        for seg in segments {
            cur = index_value(cur, seg)?;
        }
        Some(cur)
    }
}

/// Indexes a JSON value by one dotted-path segment: object key, or array index
/// when the segment parses as an integer.
pub fn index_value<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
