//! Template interpolation engine.
//!
//! The engine walks arbitrary JSON trees and evaluates `${...}` expressions
//! found in string values. A string that is exactly one expression takes the
//! expression's native value (an integer stays an integer); expressions
//! embedded in a larger string are coerced to text and concatenated with the
//! surrounding literal. Keys are never evaluated.
//!
//! Compiled expressions are cached by source text; compilation is pure, so
//! the cache is shared across renders and safe for parallel readers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use crate::ast::Expr;
use crate::error::{ExprError, ExprResult};
use crate::eval::{evaluate, Context};
use crate::parser::parse;
use crate::value::{prune, Value};

/// A compiled expression, ready for repeated evaluation.
#[derive(Debug)]
pub struct Compiled {
    ast: Expr,
}

impl Compiled {
    /// Evaluate against a context.
    pub fn evaluate(&self, ctx: &mut Context) -> ExprResult<Value> {
        evaluate(&self.ast, ctx)
    }
}

/// The template engine. Cheap to share by reference; holds only the
/// compiled-expression cache.
#[derive(Debug, Default)]
pub struct Engine {
    cache: RwLock<HashMap<String, Arc<Compiled>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile an expression, consulting the cache first.
    pub fn compile(&self, source: &str) -> ExprResult<Arc<Compiled>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(compiled) = cache.get(source) {
                return Ok(Arc::clone(compiled));
            }
        }
        let compiled = Arc::new(Compiled {
            ast: parse(source)?,
        });
        if let Ok(mut cache) = self.cache.write() {
            cache
                .entry(source.to_string())
                .or_insert_with(|| Arc::clone(&compiled));
        }
        Ok(compiled)
    }

    /// Render a value tree: every `${...}` in every string value is
    /// evaluated. The result may contain omit sentinels; run
    /// [`prune`] (or use [`Engine::render_pruned`]) before converting back
    /// to JSON.
    pub fn render(&self, template: &JsonValue, ctx: &mut Context) -> ExprResult<Value> {
        match template {
            JsonValue::String(s) => self.render_string(s, ctx),
            JsonValue::Array(items) => {
                let rendered: ExprResult<Vec<Value>> =
                    items.iter().map(|item| self.render(item, ctx)).collect();
                Ok(Value::List(rendered?))
            }
            JsonValue::Object(map) => {
                let mut out = indexmap::IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.render(value, ctx)?);
                }
                Ok(Value::Map(out))
            }
            scalar => Ok(Value::from_json(scalar)),
        }
    }

    /// Render a value tree and erase omit sentinels in one call.
    pub fn render_pruned(&self, template: &JsonValue, ctx: &mut Context) -> ExprResult<Value> {
        Ok(prune(self.render(template, ctx)?))
    }

    /// Render a single string value (the `includeWhen`/`forEach`/`where`
    /// entry point). A string without `${...}` is returned as-is.
    pub fn render_string(&self, source: &str, ctx: &mut Context) -> ExprResult<Value> {
        let segments = split_template(source)?;

        // Fast path: no expressions at all.
        if segments.len() == 1 {
            if let Segment::Literal(text) = &segments[0] {
                return Ok(Value::String(text.clone()));
            }
        }

        // A string that is exactly one expression keeps its native type.
        if segments.len() == 1 {
            if let Segment::Expr(expr_src) = &segments[0] {
                return self.compile(expr_src)?.evaluate(ctx);
            }
        }

        let mut out = String::new();
        for segment in &segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr_src) => {
                    let value = self.compile(expr_src)?.evaluate(ctx)?;
                    match value.coerce_string() {
                        Some(text) => out.push_str(&text),
                        // An omitted fragment takes the whole string with it.
                        None => return Ok(Value::Omit),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Expr(String),
}

/// Split a string into literal and `${...}` expression segments.
///
/// Matching braces are tracked through nested `{}` and through quoted
/// strings inside the expression, so map literals like `${{"a": 1}}` work.
fn split_template(source: &str) -> ExprResult<Vec<Segment>> {
    let bytes = source.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let expr_start = i + 2;
            let expr_end = find_closing_brace(source, expr_start)?;
            if literal_start < i {
                segments.push(Segment::Literal(source[literal_start..i].to_string()));
            }
            segments.push(Segment::Expr(source[expr_start..expr_end].to_string()));
            i = expr_end + 1;
            literal_start = i;
        } else {
            i += 1;
        }
    }

    if literal_start < bytes.len() || segments.is_empty() {
        segments.push(Segment::Literal(source[literal_start..].to_string()));
    }
    Ok(segments)
}

/// Find the index of the `}` closing the expression starting at `start`.
fn find_closing_brace(source: &str, start: usize) -> ExprResult<usize> {
    let bytes = source.as_bytes();
    let mut depth = 1usize;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1; // skip the escaped byte
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    Err(ExprError::Parse {
        message: format!("unclosed expression starting at offset {}", start),
    })
}
