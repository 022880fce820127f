//! `{{ expr }}` template substitution.
//!
//! When the *entire* trimmed template is a single `{{ ... }}` span, the result is
//! the expression's native JSON value (so `output_to_context: {score: "{{ output.score }}"}`
//! assigns a number, not its string form). Otherwise each span is stringified and
//! spliced into the surrounding literal text, producing a `Value::String`.

use serde_json::{Map, Value};

use super::error::ExpressionError;
use super::scope::Scope;
use super::{CompiledExpr, ExpressionEngine};

/// Renders every string leaf of a JSON tree as a template, recursing through
/// arrays/objects and passing non-string scalars through unchanged — what an
/// agent state's `input:` map, a machine-launch's `input`/`launch_input`, and
/// a `foreach` element binding all need (a template isn't just one string,
/// it's a whole JSON shape with templates scattered through it).
///
/// Uses the simple engine; prefer [`render_value_engine`] for a machine whose
/// `expression_engine` may be `cel`.
pub fn render_value(value: &Value, scope: &Scope) -> Result<Value, ExpressionError> {
    render_value_engine(ExpressionEngine::Simple, value, scope)
}

pub fn render_value_engine(engine: ExpressionEngine, value: &Value, scope: &Scope) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => render_template_engine(engine, s, scope),
        Value::Array(items) => {
            let rendered: Result<Vec<Value>, ExpressionError> =
                items.iter().map(|item| render_value_engine(engine, item, scope)).collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value_engine(engine, v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Renders with the simple engine. Prefer [`render_template_engine`] for a
/// machine whose `expression_engine` may be `cel` (§4.A: template mode is
/// part of the same per-machine engine contract as condition evaluation).
pub fn render_template(template: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    render_template_engine(ExpressionEngine::Simple, template, scope)
}

pub fn render_template_engine(engine: ExpressionEngine, template: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    let spans = find_spans(template);

    if spans.len() == 1 {
        let (start, end) = spans[0];
        if template[..start].trim().is_empty() && template[end..].trim().is_empty() {
            let expr = CompiledExpr::compile(template[start + 2..end - 2].trim(), engine)?;
            return expr.eval(scope);
        }
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for (start, end) in spans {
        out.push_str(&template[last..start]);
        let expr = CompiledExpr::compile(template[start + 2..end - 2].trim(), engine)?;
        let value = expr.eval(scope)?;
        out.push_str(&stringify(&value));
        last = end;
    }
    out.push_str(&template[last..]);
    Ok(Value::String(out))
}

/// Byte offsets of each `{{ ... }}` span, end-exclusive of the closing `}}`.
fn find_spans(template: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut search_from = 0;
    while let Some(rel_start) = template[search_from..].find("{{") {
        let start = search_from + rel_start;
        match template[start + 2..].find("}}") {
            Some(rel_end) => {
                let end = start + 2 + rel_end + 2;
                spans.push((start, end));
                search_from = end;
            }
            None => break,
        }
    }
    spans
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
