//! Expression AST.

use crate::value::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal scalar (null, bool, int, float, string).
    Lit(Value),
    /// A variable reference.
    Ident(String),
    /// Field selection: `expr.field`.
    Member(Box<Expr>, String),
    /// Index access: `expr[key]` with a string or integer key.
    Index(Box<Expr>, Box<Expr>),
    /// List literal: `[a, b, c]`.
    List(Vec<Expr>),
    /// Map literal: `{"key": value, ...}`. Keys are expressions that must
    /// evaluate to strings.
    Map(Vec<(Expr, Expr)>),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Ternary conditional: `cond ? a : b`.
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Global function call: `name(args...)`.
    Call(String, Vec<Expr>),
    /// Member function call: `target.name(args...)`.
    Method(Box<Expr>, String, Vec<Expr>),
    /// Presence test: `has(expr.field)`.
    Has(Box<Expr>),
    /// Comprehension: `target.map(x, body)` and friends. The variable is
    /// bound per element while evaluating the body.
    Comprehension {
        target: Box<Expr>,
        kind: ComprehensionKind,
        var: String,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    Map,
    Filter,
    Exists,
    All,
}

impl Expr {
    /// Collect the free root identifiers of this expression into `out`,
    /// skipping names bound by enclosing comprehensions.
    ///
    /// This is the input to undeclared-variable checking: every name
    /// reported here must be a context key.
    pub fn free_variables(&self, out: &mut Vec<String>) {
        self.collect_free(&mut Vec::new(), out);
    }

    fn collect_free(&self, bound: &mut Vec<String>, out: &mut Vec<String>) {
        match self {
            Expr::Lit(_) => {}
            Expr::Ident(name) => {
                if !bound.iter().any(|b| b == name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Member(target, _) => target.collect_free(bound, out),
            Expr::Index(target, key) => {
                target.collect_free(bound, out);
                key.collect_free(bound, out);
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_free(bound, out);
                }
            }
            Expr::Map(entries) => {
                for (k, v) in entries {
                    k.collect_free(bound, out);
                    v.collect_free(bound, out);
                }
            }
            Expr::Unary(_, inner) => inner.collect_free(bound, out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_free(bound, out);
                rhs.collect_free(bound, out);
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.collect_free(bound, out);
                then.collect_free(bound, out);
                otherwise.collect_free(bound, out);
            }
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_free(bound, out);
                }
            }
            Expr::Method(target, _, args) => {
                target.collect_free(bound, out);
                for arg in args {
                    arg.collect_free(bound, out);
                }
            }
            Expr::Has(inner) => inner.collect_free(bound, out),
            Expr::Comprehension {
                target, var, body, ..
            } => {
                target.collect_free(bound, out);
                bound.push(var.clone());
                body.collect_free(bound, out);
                bound.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_variables_skip_comprehension_bindings() {
        // containers.map(c, c.name + suffix) has free vars: containers, suffix
        let expr = Expr::Comprehension {
            target: Box::new(Expr::Ident("containers".into())),
            kind: ComprehensionKind::Map,
            var: "c".into(),
            body: Box::new(Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Member(Box::new(Expr::Ident("c".into())), "name".into())),
                Box::new(Expr::Ident("suffix".into())),
            )),
        };
        let mut free = Vec::new();
        expr.free_variables(&mut free);
        assert_eq!(free, vec!["containers".to_string(), "suffix".to_string()]);
    }
}
