//! Expression evaluation against a context.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::{BinaryOp, ComprehensionKind, Expr, UnaryOp};
use crate::error::{is_missing_data, ExprError, ExprResult};
use crate::functions::{call_global, call_method, values_equal};
use crate::value::Value;

/// The named bindings an expression can see during evaluation.
///
/// The context behaves like a bag of variables with explicit save/restore:
/// [`Context::bind`] returns the previous binding (if any) and
/// [`Context::restore`] puts it back. [`Context::scoped`] wraps the pair so
/// the outer context is structurally unchanged on every exit path.
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: IndexMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object's top-level entries.
    pub fn from_json(map: &serde_json::Map<String, JsonValue>) -> Self {
        Context {
            vars: map
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        }
    }

    /// Insert a binding.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Whether a binding exists.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Replace a binding, returning what was there before. Pair with
    /// [`Context::restore`].
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Value> {
        self.vars.insert(name.to_string(), value)
    }

    /// Undo a [`Context::bind`], reinstating the previous binding or
    /// removing the name entirely.
    pub fn restore(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.vars.insert(name.to_string(), value);
            }
            None => {
                self.vars.shift_remove(name);
            }
        }
    }

    /// Run `f` with `name` bound to `value`, restoring the previous binding
    /// afterwards whether `f` succeeded or failed.
    pub fn scoped<T>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Context) -> ExprResult<T>,
    ) -> ExprResult<T> {
        let previous = self.bind(name, value);
        let result = f(self);
        self.restore(name, previous);
        result
    }
}

/// Evaluate an expression against a context.
///
/// Before evaluation, every free root identifier is checked against the
/// context's key set; an unbound name is an [`ExprError::UnknownVariable`]
/// even when it sits in a branch that would not be taken.
pub fn evaluate(expr: &Expr, ctx: &mut Context) -> ExprResult<Value> {
    let mut free = Vec::new();
    expr.free_variables(&mut free);
    for name in &free {
        if !ctx.contains(name) {
            return Err(ExprError::UnknownVariable { name: name.clone() });
        }
    }
    eval(expr, ctx)
}

fn eval(expr: &Expr, ctx: &mut Context) -> ExprResult<Value> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),

        Expr::Ident(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownVariable { name: name.clone() }),

        Expr::Member(target, field) => {
            let target = eval(target, ctx)?;
            member(&target, field)
        }

        Expr::Index(target, key) => {
            let target = eval(target, ctx)?;
            let key = eval(key, ctx)?;
            match (&target, &key) {
                (Value::Map(_), Value::String(field)) => member(&target, field),
                (Value::List(items), Value::Int(index)) => {
                    let len = items.len();
                    usize::try_from(*index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or(ExprError::IndexOutOfBounds { index: *index, len })
                }
                (target, key) => Err(ExprError::Type {
                    message: format!(
                        "cannot index {} with {}",
                        target.type_name(),
                        key.type_name()
                    ),
                }),
            }
        }

        Expr::List(items) => {
            let values: ExprResult<Vec<Value>> = items.iter().map(|e| eval(e, ctx)).collect();
            Ok(Value::List(values?))
        }

        Expr::Map(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key_expr, value_expr) in entries {
                let key = eval(key_expr, ctx)?;
                let key = match key {
                    Value::String(s) => s,
                    other => {
                        return Err(ExprError::Type {
                            message: format!("map key must be a string, got {}", other.type_name()),
                        });
                    }
                };
                map.insert(key, eval(value_expr, ctx)?);
            }
            Ok(Value::Map(map))
        }

        Expr::Unary(op, inner) => {
            let value = eval(inner, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
                UnaryOp::Neg => match value {
                    Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(ExprError::Arithmetic {
                        message: "integer overflow in negation".to_string(),
                    }),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(ExprError::Type {
                        message: format!("cannot negate {}", other.type_name()),
                    }),
                },
            }
        }

        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),

        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, ctx)?.as_bool()? {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }

        Expr::Call(name, args) => {
            let values: ExprResult<Vec<Value>> = args.iter().map(|e| eval(e, ctx)).collect();
            call_global(name, values?)
        }

        Expr::Method(target, name, args) => {
            let target = eval(target, ctx)?;
            let values: ExprResult<Vec<Value>> = args.iter().map(|e| eval(e, ctx)).collect();
            call_method(target, name, values?)
        }

        Expr::Has(inner) => match eval(inner, ctx) {
            Ok(_) => Ok(Value::Bool(true)),
            Err(err) if is_missing_data(&err) => Ok(Value::Bool(false)),
            Err(err) => Err(err),
        },

        Expr::Comprehension {
            target,
            kind,
            var,
            body,
        } => {
            let items = match eval(target, ctx)? {
                Value::List(items) => items,
                // Comprehending over a map iterates its keys.
                Value::Map(map) => map.keys().cloned().map(Value::String).collect(),
                other => {
                    return Err(ExprError::Type {
                        message: format!("cannot iterate over {}", other.type_name()),
                    });
                }
            };
            match kind {
                ComprehensionKind::Map => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(ctx.scoped(var, item, |ctx| eval(body, ctx))?);
                    }
                    Ok(Value::List(out))
                }
                ComprehensionKind::Filter => {
                    let mut out = Vec::new();
                    for item in items {
                        let keep = ctx
                            .scoped(var, item.clone(), |ctx| eval(body, ctx))?
                            .as_bool()?;
                        if keep {
                            out.push(item);
                        }
                    }
                    Ok(Value::List(out))
                }
                ComprehensionKind::Exists => {
                    for item in items {
                        if ctx.scoped(var, item, |ctx| eval(body, ctx))?.as_bool()? {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                ComprehensionKind::All => {
                    for item in items {
                        if !ctx.scoped(var, item, |ctx| eval(body, ctx))?.as_bool()? {
                            return Ok(Value::Bool(false));
                        }
                    }
                    Ok(Value::Bool(true))
                }
            }
        }
    }
}

fn member(target: &Value, field: &str) -> ExprResult<Value> {
    match target {
        Value::Map(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| ExprError::MissingField {
                field: field.to_string(),
            }),
        Value::Null => Err(ExprError::MissingField {
            field: field.to_string(),
        }),
        other => Err(ExprError::Type {
            message: format!("cannot select field {:?} on {}", field, other.type_name()),
        }),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &mut Context) -> ExprResult<Value> {
    // Short-circuit logic first.
    match op {
        BinaryOp::And => {
            if !eval(lhs, ctx)?.as_bool()? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?));
        }
        BinaryOp::Or => {
            if eval(lhs, ctx)?.as_bool()? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?));
        }
        _ => {}
    }

    let lhs = eval(lhs, ctx)?;
    let rhs = eval(rhs, ctx)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
        BinaryOp::In => match (&lhs, &rhs) {
            (needle, Value::List(items)) => {
                Ok(Value::Bool(items.iter().any(|v| values_equal(v, needle))))
            }
            (Value::String(key), Value::Map(map)) => Ok(Value::Bool(map.contains_key(key))),
            (_, other) => Err(ExprError::Type {
                message: format!("'in' expects a list or map, got {}", other.type_name()),
            }),
        },
        BinaryOp::Add => add(&lhs, &rhs),
        BinaryOp::Sub => arithmetic(op, &lhs, &rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, &lhs, &rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => arithmetic(op, &lhs, &rhs, i64::checked_div, |a, b| a / b),
        BinaryOp::Mod => arithmetic(op, &lhs, &rhs, i64::checked_rem, |a, b| a % b),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> ExprResult<Value> {
    use std::cmp::Ordering;
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Int(a), Value::Float(b)) => float_cmp(*a as f64, *b)?,
        (Value::Float(a), Value::Int(b)) => float_cmp(*a, *b as f64)?,
        (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b)?,
        (a, b) => {
            return Err(ExprError::Type {
                message: format!("cannot compare {} with {}", a.type_name(), b.type_name()),
            });
        }
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("compare only handles relational ops"),
    }))
}

fn float_cmp(a: f64, b: f64) -> ExprResult<std::cmp::Ordering> {
    a.partial_cmp(&b).ok_or(ExprError::Arithmetic {
        message: "NaN is not comparable".to_string(),
    })
}

fn add(lhs: &Value, rhs: &Value) -> ExprResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            a.checked_add(*b).map(Value::Int).ok_or(ExprError::Arithmetic {
                message: "integer overflow in addition".to_string(),
            })
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (a, b) => Err(ExprError::Type {
            message: format!("cannot add {} and {}", a.type_name(), b.type_name()),
        }),
    }
}

fn arithmetic(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> ExprResult<Value> {
    let op_name = match op {
        BinaryOp::Sub => "subtraction",
        BinaryOp::Mul => "multiplication",
        BinaryOp::Div => "division",
        BinaryOp::Mod => "remainder",
        _ => "arithmetic",
    };
    match (lhs, rhs) {
        (Value::Int(_), Value::Int(0)) if matches!(op, BinaryOp::Div | BinaryOp::Mod) => {
            Err(ExprError::Arithmetic {
                message: "division by zero".to_string(),
            })
        }
        (Value::Int(a), Value::Int(b)) => {
            int_op(*a, *b).map(Value::Int).ok_or(ExprError::Arithmetic {
                message: format!("integer overflow in {}", op_name),
            })
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (a, b) => Err(ExprError::Type {
            message: format!(
                "cannot apply {} to {} and {}",
                op_name,
                a.type_name(),
                b.type_name()
            ),
        }),
    }
}
