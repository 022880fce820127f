//! The expression engine: condition guards on transitions, `output_to_context`
//! value mappings, and `foreach` source expressions are all small JSON-valued
//! expressions evaluated against a [`Scope`] of `context`/`input`/`output`.
//!
//! Two engines are supported per machine (`expression_engine` in machine config,
//! §4.A): `simple` (this module's own recursive-descent parser, the default) and,
//! behind the `cel` feature, full CEL via `cel-interpreter`. `simple` exists
//! because CEL's type system doesn't map cleanly onto bare `serde_json::Value`
//! (no native "object with arbitrary string keys and mixed value types" story
//! without per-machine schema registration) — see `SPEC_FULL.md` for the tradeoff.

mod ast;
#[cfg(feature = "cel")]
mod cel;
mod error;
mod eval;
mod lexer;
mod parser;
mod scope;
mod template;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::ExpressionError;
pub use scope::Scope;

/// Which engine a machine's expressions are parsed/evaluated with. Chosen once
/// per machine config and fixed for its whole lifetime (mixing engines within one
/// machine would make resumed executions ambiguous about how to recompile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionEngine {
    #[default]
    Simple,
    Cel,
}

/// A parsed expression, ready to evaluate repeatedly against different scopes
/// without re-parsing — transitions compile their `condition` once when the
/// machine config loads (Loading state, §4.G).
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Simple(ast::Expr),
    /// Kept as source text: `cel_interpreter::Program` does not implement the
    /// trait bounds (`Clone`/`Debug`) this engine demands of a `CompiledExpr`,
    /// so we recompile on each `eval` call when the `cel` feature is enabled.
    Cel(String),
}

impl CompiledExpr {
    pub fn compile(src: &str, engine: ExpressionEngine) -> Result<Self, ExpressionError> {
        match engine {
            ExpressionEngine::Simple => Ok(Self::Simple(parser::parse(src)?)),
            ExpressionEngine::Cel => Ok(Self::Cel(src.to_string())),
        }
    }

    pub fn eval(&self, scope: &Scope) -> Result<Value, ExpressionError> {
        match self {
            Self::Simple(expr) => eval::eval(expr, scope),
            #[cfg(feature = "cel")]
            Self::Cel(src) => cel::eval_cel(src, scope),
            #[cfg(not(feature = "cel"))]
            Self::Cel(_) => Err(ExpressionError::Expected(
                "CEL expression mode requires the \"cel\" feature".to_string(),
            )),
        }
    }

    /// Evaluates and coerces the result to a boolean via JSON truthiness — what
    /// transition `condition` guards and `foreach` continue-predicates use.
    pub fn eval_bool(&self, scope: &Scope) -> Result<bool, ExpressionError> {
        Ok(eval::is_truthy(&self.eval(scope)?))
    }
}

/// Parses and evaluates `src` once, using the simple engine. Prefer
/// [`CompiledExpr`] when the same expression will be evaluated more than once.
pub fn evaluate(src: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    evaluate_engine(ExpressionEngine::Simple, src, scope)
}

/// Parses and evaluates `src` once, using the machine's configured engine —
/// what `foreach` sources and `foreach` `key` expressions use, since those
/// are as much a per-machine expression as a transition `condition` is.
pub fn evaluate_engine(engine: ExpressionEngine, src: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    CompiledExpr::compile(src, engine)?.eval(scope)
}

pub use template::{render_template, render_template_engine, render_value, render_value_engine};
