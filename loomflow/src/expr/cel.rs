//! Optional CEL expression mode (`expression_engine: cel` in machine config),
//! gated behind the `cel` feature. Grounded on `cel-interpreter`'s own
//! `Context`/`Program` split — we mirror the simple-mode `Scope` by binding
//! `context`, `input`, and `output` as top-level CEL variables.

use cel_interpreter::{Context as CelContext, Program};
use serde_json::Value;

use super::error::ExpressionError;
use super::scope::Scope;

pub fn eval_cel(src: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    let program = Program::compile(src).map_err(|e| ExpressionError::Expected(e.to_string()))?;
    let mut ctx = CelContext::default();
    ctx.add_variable("context", scope.context.clone())
        .map_err(|e| ExpressionError::Expected(e.to_string()))?;
    ctx.add_variable("input", scope.input.clone())
        .map_err(|e| ExpressionError::Expected(e.to_string()))?;
    ctx.add_variable("output", scope.output.clone())
        .map_err(|e| ExpressionError::Expected(e.to_string()))?;
    if let Some((name, value)) = scope.var() {
        ctx.add_variable(name, value.clone())
            .map_err(|e| ExpressionError::Expected(e.to_string()))?;
    }

    let result = program
        .execute(&ctx)
        .map_err(|e| ExpressionError::Expected(e.to_string()))?;
    cel_value_to_json(result).ok_or_else(|| {
        ExpressionError::Expected("CEL result could not be converted to JSON".to_string())
    })
}

fn cel_value_to_json(value: cel_interpreter::Value) -> Option<Value> {
    serde_json::to_value(value).ok()
}
