//! Recursive-descent parser for the expression language.
//!
//! Precedence, loosest first: ternary, `||`, `&&`, relations
//! (`== != < <= > >= in`), additive, multiplicative, unary, postfix
//! (member, index, call).

use crate::ast::{BinaryOp, ComprehensionKind, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::lexer::{lex, Span, Token};
use crate::value::Value;

/// Parse an expression source string into an AST.
pub fn parse(source: &str) -> ExprResult<Expr> {
    let tokens = lex(source);
    if let Some((_, span)) = tokens.iter().find(|(t, _)| t.is_err()) {
        return Err(ExprError::Parse {
            message: format!(
                "unrecognized input at offset {}: {:?}",
                span.start,
                &source[span.clone()]
            ),
        });
    }
    let tokens: Vec<(Token, Span)> = tokens
        .into_iter()
        .filter_map(|(t, s)| t.ok().map(|t| (t, s)))
        .collect();

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    if let Some((tok, span)) = parser.tokens.get(parser.pos) {
        return Err(ExprError::Parse {
            message: format!("unexpected {:?} at offset {}", tok, span.start),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> ExprResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn unexpected(&self, context: &str) -> ExprError {
        match self.tokens.get(self.pos) {
            Some((tok, span)) => ExprError::Parse {
                message: format!(
                    "unexpected {:?} at offset {} while parsing {}",
                    tok, span.start, context
                ),
            },
            None => ExprError::Parse {
                message: format!("unexpected end of expression while parsing {}", context),
            },
        }
    }

    fn ternary(&mut self) -> ExprResult<Expr> {
        let cond = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.ternary()?;
        self.expect(&Token::Colon, "ternary")?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn or(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.relation()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.relation()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn relation(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                Some(Token::Less) => BinaryOp::Lt,
                Some(Token::LessEq) => BinaryOp::Le,
                Some(Token::Greater) => BinaryOp::Gt,
                Some(Token::GreaterEq) => BinaryOp::Ge,
                Some(Token::In) => BinaryOp::In,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        if self.eat(&Token::Bang) {
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            // Fold negation of numeric literals so "-1" is a literal.
            return Ok(match inner {
                Expr::Lit(Value::Int(i)) => Expr::Lit(Value::Int(-i)),
                Expr::Lit(Value::Float(f)) => Expr::Lit(Value::Float(-f)),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    // Keywords are fine as field names after a dot.
                    Some(Token::In) => "in".to_string(),
                    Some(Token::True) => "true".to_string(),
                    Some(Token::False) => "false".to_string(),
                    Some(Token::Null) => "null".to_string(),
                    Some(_) => {
                        self.pos -= 1;
                        return Err(self.unexpected("member access"));
                    }
                    None => return Err(self.unexpected("member access")),
                };
                if self.peek() == Some(&Token::ParenOpen) {
                    expr = self.method_call(expr, name)?;
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat(&Token::BracketOpen) {
                let key = self.ternary()?;
                self.expect(&Token::BracketClose, "index")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn method_call(&mut self, target: Expr, name: String) -> ExprResult<Expr> {
        let args = self.call_args(&name)?;
        let kind = match name.as_str() {
            "map" => Some(ComprehensionKind::Map),
            "filter" => Some(ComprehensionKind::Filter),
            "exists" => Some(ComprehensionKind::Exists),
            "all" => Some(ComprehensionKind::All),
            _ => None,
        };
        if let Some(kind) = kind {
            if args.len() != 2 {
                return Err(ExprError::Parse {
                    message: format!("{}() takes a variable and a body expression", name),
                });
            }
            let mut args = args.into_iter();
            let var = match args.next() {
                Some(Expr::Ident(var)) => var,
                _ => {
                    return Err(ExprError::Parse {
                        message: format!("{}() first argument must be an identifier", name),
                    });
                }
            };
            let body = args.next().expect("arity checked above");
            return Ok(Expr::Comprehension {
                target: Box::new(target),
                kind,
                var,
                body: Box::new(body),
            });
        }
        Ok(Expr::Method(Box::new(target), name, args))
    }

    fn call_args(&mut self, context: &str) -> ExprResult<Vec<Expr>> {
        self.expect(&Token::ParenOpen, context)?;
        let mut args = Vec::new();
        if self.eat(&Token::ParenClose) {
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::ParenClose, context)?;
            break;
        }
        Ok(args)
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Lit(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(Value::Float(f))),
            Some(Token::String(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::True) => Ok(Expr::Lit(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Lit(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Lit(Value::Null)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::ParenOpen) {
                    let args = self.call_args(&name)?;
                    if name == "has" {
                        return self.build_has(args);
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::ParenOpen) => {
                let expr = self.ternary()?;
                self.expect(&Token::ParenClose, "parenthesized expression")?;
                Ok(expr)
            }
            Some(Token::BracketOpen) => {
                let mut items = Vec::new();
                if self.eat(&Token::BracketClose) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.ternary()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.expect(&Token::BracketClose, "list literal")?;
                    break;
                }
                Ok(Expr::List(items))
            }
            Some(Token::BraceOpen) => {
                let mut entries = Vec::new();
                if self.eat(&Token::BraceClose) {
                    return Ok(Expr::Map(entries));
                }
                loop {
                    let key = self.ternary()?;
                    self.expect(&Token::Colon, "map literal")?;
                    let value = self.ternary()?;
                    entries.push((key, value));
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.expect(&Token::BraceClose, "map literal")?;
                    break;
                }
                Ok(Expr::Map(entries))
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
            None => Err(self.unexpected("expression")),
        }
    }

    fn build_has(&self, args: Vec<Expr>) -> ExprResult<Expr> {
        if args.len() != 1 {
            return Err(ExprError::Parse {
                message: "has() takes exactly one argument".to_string(),
            });
        }
        let arg = args.into_iter().next().expect("arity checked above");
        match arg {
            Expr::Member(..) | Expr::Index(..) => Ok(Expr::Has(Box::new(arg))),
            _ => Err(ExprError::Parse {
                message: "has() argument must be a field selection".to_string(),
            }),
        }
    }
}
