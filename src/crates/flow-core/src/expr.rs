//! Sandboxed boolean expression interpreter for condition nodes
//!
//! Expressions are evaluated over exactly four named variables
//! (`intent`, `scope`, `needsBackend`, `hasFiles`) with short-circuit
//! `&&`/`||`, `!`, strict `===`/`!==`, string and boolean literals, and
//! parentheses. There is no host-language eval anywhere in this path;
//! validation rejects any identifier outside the allowed set before a
//! template is saved.

use crate::error::{FlowError, Result};
use std::collections::HashSet;

/// Variables an expression may reference
pub const ALLOWED_VARIABLES: &[&str] = &["intent", "scope", "needsBackend", "hasFiles"];

/// Identifiers rejected outright by validation
pub const DANGEROUS_IDENTIFIERS: &[&str] = &[
    "eval",
    "Function",
    "require",
    "import",
    "process",
    "window",
    "document",
    "globalThis",
    "__proto__",
];

/// Variable bindings for evaluation
#[derive(Debug, Clone)]
pub struct ExprContext {
    /// Classified intent as a string (`build`/`fix`/`question`)
    pub intent: String,
    /// Classified scope as a string (`frontend`/`backend`/`styling`/`full`)
    pub scope: String,
    /// Whether the request needs backend work
    pub needs_backend: bool,
    /// Whether the project already has files
    pub has_files: bool,
}

/// Runtime value produced while evaluating
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Strict equality: values of different types are never equal
    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    Eq,
    Neq,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(FlowError::Expression(format!(
                        "unexpected '&' at offset {}",
                        i
                    )));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(FlowError::Expression(format!(
                        "unexpected '|' at offset {}",
                        i
                    )));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') && chars.get(i + 2) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 3;
                } else {
                    return Err(FlowError::Expression(
                        "only strict equality '===' is supported".to_string(),
                    ));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    if chars.get(i + 2) == Some(&'=') {
                        tokens.push(Token::Neq);
                        i += 3;
                    } else {
                        return Err(FlowError::Expression(
                            "only strict inequality '!==' is supported".to_string(),
                        ));
                    }
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(FlowError::Expression(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.get(i) {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    _ => tokens.push(Token::Ident(ident)),
                }
            }
            other => {
                return Err(FlowError::Expression(format!(
                    "unexpected character '{}' at offset {}",
                    other, i
                )))
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Ast {
    Bool(bool),
    Str(String),
    Var(String),
    Not(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Eq(Box<Ast>, Box<Ast>),
    Neq(Box<Ast>, Box<Ast>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(FlowError::Expression(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn parse_expr(&mut self) -> Result<Ast> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Ast> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Ast::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Ast::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Ast::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Ast> {
        let left = self.parse_primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.advance();
                let right = self.parse_primary()?;
                Ok(Ast::Eq(Box::new(left), Box::new(right)))
            }
            Some(Token::Neq) => {
                self.advance();
                let right = self.parse_primary()?;
                Ok(Ast::Neq(Box::new(left), Box::new(right)))
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> Result<Ast> {
        match self.advance() {
            Some(Token::True) => Ok(Ast::Bool(true)),
            Some(Token::False) => Ok(Ast::Bool(false)),
            Some(Token::Str(s)) => Ok(Ast::Str(s)),
            Some(Token::Ident(name)) => Ok(Ast::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(FlowError::Expression(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

fn parse(src: &str) -> Result<Ast> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(FlowError::Expression("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(FlowError::Expression(format!(
            "trailing tokens after expression: {:?}",
            &parser.tokens[parser.pos..]
        )));
    }
    Ok(ast)
}

fn eval_ast(ast: &Ast, ctx: &ExprContext) -> Result<Value> {
    match ast {
        Ast::Bool(b) => Ok(Value::Bool(*b)),
        Ast::Str(s) => Ok(Value::Str(s.clone())),
        Ast::Var(name) => match name.as_str() {
            "intent" => Ok(Value::Str(ctx.intent.clone())),
            "scope" => Ok(Value::Str(ctx.scope.clone())),
            "needsBackend" => Ok(Value::Bool(ctx.needs_backend)),
            "hasFiles" => Ok(Value::Bool(ctx.has_files)),
            other => Err(FlowError::Expression(format!(
                "unknown variable '{}'",
                other
            ))),
        },
        Ast::Not(inner) => Ok(Value::Bool(!eval_ast(inner, ctx)?.truthy())),
        Ast::And(l, r) => {
            // Short-circuit
            if !eval_ast(l, ctx)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_ast(r, ctx)?.truthy()))
        }
        Ast::Or(l, r) => {
            if eval_ast(l, ctx)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_ast(r, ctx)?.truthy()))
        }
        Ast::Eq(l, r) => Ok(Value::Bool(
            eval_ast(l, ctx)?.strict_eq(&eval_ast(r, ctx)?),
        )),
        Ast::Neq(l, r) => Ok(Value::Bool(
            !eval_ast(l, ctx)?.strict_eq(&eval_ast(r, ctx)?),
        )),
    }
}

/// Evaluate an expression against the given context
pub fn evaluate(src: &str, ctx: &ExprContext) -> Result<bool> {
    let ast = parse(src)?;
    Ok(eval_ast(&ast, ctx)?.truthy())
}

/// Collect every identifier referenced by an expression
///
/// Used by validation to reject references outside [`ALLOWED_VARIABLES`]
/// and anything in [`DANGEROUS_IDENTIFIERS`]. Lexing errors surface as
/// parse failures at validation time, so this never hides a bad expression.
pub fn identifiers(src: &str) -> Result<HashSet<String>> {
    let tokens = tokenize(src)?;
    Ok(tokens
        .into_iter()
        .filter_map(|t| match t {
            Token::Ident(name) => Some(name),
            _ => None,
        })
        .collect())
}

/// Parse an expression without evaluating it, surfacing syntax errors
pub fn check_syntax(src: &str) -> Result<()> {
    parse(src).map(|_| ())
}
