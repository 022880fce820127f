//! Tree-walking evaluator: `Expr` + `Scope` -> `serde_json::Value`.
//!
//! Comparisons between mismatched types evaluate to `false` rather than raising
//! (§4.A) — a writer-critic loop comparing a context field that hasn't been set
//! yet should fail its "good enough" gate, not crash the machine. Arithmetic on
//! non-numeric operands, and indexing errors that escape the `null`-on-missing
//! rule (e.g. calling an unknown function), do raise `ExpressionError`.

use serde_json::{Map, Number, Value};

use super::ast::{BinOp, Expr, PathSegment, UnaryOp};
use super::error::ExpressionError;
use super::scope::Scope;

pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Number((*n).into())),
        Expr::Float(f) => Ok(Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, scope)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Object(fields) => {
            let mut out = Map::new();
            for (k, v) in fields {
                out.insert(k.clone(), eval(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        Expr::Path(segments) => eval_path(segments, scope),
        Expr::Unary(op, inner) => eval_unary(*op, inner, scope),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope),
        Expr::Call(name, args) => eval_call(name, args, scope),
    }
}

fn eval_path(segments: &[PathSegment], scope: &Scope) -> Result<Value, ExpressionError> {
    let (root, rest) = segments.split_first().expect("path always has a root segment");
    let PathSegment::Ident(root_name) = root else {
        return Err(ExpressionError::Expected("root path segment must be an identifier".to_string()));
    };
    let Some(mut cur) = scope.root(root_name) else {
        return Err(ExpressionError::UnknownIdentifier(root_name.clone()));
    };
    let mut owned: Option<Value> = None;
    for segment in rest {
        let next = match segment {
            PathSegment::Ident(name) => index_by_key(cur, name),
            PathSegment::Index(index_expr) => {
                let index_value = eval(index_expr, scope)?;
                index_by_value(cur, &index_value)
            }
        };
        match next {
            Some(v) => {
                owned = Some(v);
                cur = owned.as_ref().unwrap();
            }
            None => return Ok(Value::Null),
        }
    }
    Ok(cur.clone())
}

fn index_by_key(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)).cloned(),
        _ => None,
    }
}

fn index_by_value(value: &Value, index: &Value) -> Option<Value> {
    match (value, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_u64()? as usize;
            items.get(i).cloned()
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned(),
        _ => None,
    }
}

fn eval_unary(op: UnaryOp, inner: &Expr, scope: &Scope) -> Result<Value, ExpressionError> {
    let v = eval(inner, scope)?;
    match op {
        UnaryOp::Not => Ok(Value::Bool(!is_truthy(&v))),
        UnaryOp::Neg => match as_f64(&v) {
            Some(n) => Ok(json_number(-n)),
            None => Err(ExpressionError::NotNumeric("unary -")),
        },
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value, ExpressionError> {
    match op {
        BinOp::And => {
            let l = eval(lhs, scope)?;
            if !is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&eval(rhs, scope)?)))
        }
        BinOp::Or => {
            let l = eval(lhs, scope)?;
            if is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&eval(rhs, scope)?)))
        }
        BinOp::Eq => Ok(Value::Bool(eval(lhs, scope)? == eval(rhs, scope)?)),
        BinOp::Ne => Ok(Value::Bool(eval(lhs, scope)? != eval(rhs, scope)?)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            Ok(Value::Bool(compare(op, &l, &r)))
        }
        BinOp::In => {
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            Ok(Value::Bool(membership(&l, &r)))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            arithmetic(op, &l, &r)
        }
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => unreachable!(),
        };
    }
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => unreachable!(),
        };
    }
    // mismatched/uncomparable types: the gate simply doesn't pass.
    false
}

fn membership(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            _ => false,
        },
        Value::Object(map) => match needle {
            Value::String(k) => map.contains_key(k),
            _ => false,
        },
        _ => false,
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, ExpressionError> {
    if op == BinOp::Add {
        if let (Value::String(a), Value::String(b)) = (l, r) {
            return Ok(Value::String(format!("{a}{b}")));
        }
    }
    let (a, b) = match (as_f64(l), as_f64(r)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(ExpressionError::NotNumeric(op_name(op))),
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            a % b
        }
        _ => unreachable!(),
    };
    Ok(json_number(result))
}

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        _ => "?",
    }
}

fn eval_call(name: &str, args: &[Expr], scope: &Scope) -> Result<Value, ExpressionError> {
    match name {
        "length" => {
            if args.len() != 1 {
                return Err(ExpressionError::ArityMismatch("length", 1, args.len()));
            }
            let v = eval(&args[0], scope)?;
            let len = match &v {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                _ => return Err(ExpressionError::NotNumeric("length")),
            };
            Ok(Value::Number((len as i64).into()))
        }
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

/// JSON truthiness: `false`, `null`, `0`, `0.0`, `""`, `[]`, `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn json_number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Number((f as i64).into())
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}
