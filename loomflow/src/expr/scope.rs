use serde_json::Value;

/// The three root bindings every expression is evaluated against: the running
/// machine's context, the input payload for the current transition, and (where
/// applicable) the most recent agent/executor output.
///
/// `var` is a fourth, optional binding used only inside a `foreach` (§4.H):
/// `foreach: expr, as: item` binds the current element under whatever name
/// `as` names, visible alongside `context`/`input`/`output` for that one
/// element's `input`/`key` rendering.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub context: &'a Value,
    pub input: &'a Value,
    pub output: &'a Value,
    var: Option<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(context: &'a Value, input: &'a Value, output: &'a Value) -> Self {
        Self {
            context,
            input,
            output,
            var: None,
        }
    }

    /// A scope with only `context` bound; `input`/`output` resolve to `null`.
    pub fn context_only(context: &'a Value) -> Self {
        Self {
            context,
            input: &Value::Null,
            output: &Value::Null,
            var: None,
        }
    }

    /// Binds a named `foreach` element alongside this scope's existing roots.
    pub fn with_var(mut self, name: &'a str, value: &'a Value) -> Self {
        self.var = Some((name, value));
        self
    }

    /// The bound `foreach` element, if any — `(as_name, value)`.
    pub fn var(&self) -> Option<(&'a str, &'a Value)> {
        self.var
    }

    pub fn root(&self, name: &str) -> Option<&'a Value> {
        if let Some((var_name, var_value)) = self.var {
            if name == var_name {
                return Some(var_value);
            }
        }
        match name {
            "context" => Some(self.context),
            "input" => Some(self.input),
            "output" => Some(self.output),
            _ => None,
        }
    }
}
