//! Shunting-yard expression parser.
//!
//! Operands go to an output stack and operators wait on an operator stack
//! until something of lower precedence shows up. Two flags carry the
//! context a token needs: `call_possible` (the last thing was a callee or
//! an indexable value) and `unary_possible` (an operand is expected, so
//! `-` and `*` are unary).

use num_bigint::BigInt;

use crate::ast::{Expr, ExprKind};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lexer::{Token, TokenKind, TokenStream};
use crate::operators::{is_keyword, precedence, Assoc, BinOp, UnOp};
use crate::parser::parse_type;
use crate::span::Span;

/// Something waiting on the operator stack.
#[derive(Debug)]
enum Pending {
    Binary(BinOp, Span),
    Unary(UnOp, Span),
    /// A callee waiting for its `)`.
    Call(Expr),
    /// A value waiting for its `]`.
    Index(Expr),
    OpenParen(Span),
    OpenSquare(Span),
}

impl Pending {
    fn precedence(&self) -> u8 {
        match self {
            Pending::Binary(op, _) => op.precedence(),
            Pending::Unary(op, _) => op.precedence(),
            Pending::Call(_) => precedence::CALL,
            Pending::Index(_) => precedence::INDEX,
            Pending::OpenParen(_) | Pending::OpenSquare(_) => 0,
        }
    }
}

#[derive(Debug)]
enum Operand {
    Expr(Expr),
    /// Stands in for the arguments of `f()`.
    NoArgs(Span),
}

/// Parse one expression, stopping before any single-character operator in
/// `end` that appears outside brackets, or at end of input.
///
/// Returns `None` when the expression is empty.
pub fn parse_expression(
    stream: &mut TokenStream,
    end: &str,
    cfg: &Config,
) -> CoreResult<Option<Expr>> {
    ExprParser {
        stream,
        cfg,
        end,
        stack: Vec::new(),
        output: Vec::new(),
        nest: 0,
        call_possible: false,
        unary_possible: true,
    }
    .run()
}

struct ExprParser<'a> {
    stream: &'a mut TokenStream,
    cfg: &'a Config,
    end: &'a str,
    stack: Vec<Pending>,
    output: Vec<Operand>,
    nest: u32,
    call_possible: bool,
    unary_possible: bool,
}

impl<'a> ExprParser<'a> {
    fn run(mut self) -> CoreResult<Option<Expr>> {
        while self.read_one()? {}

        while let Some(pending) = self.stack.pop() {
            match pending {
                Pending::OpenParen(span) => {
                    return Err(CoreError::syntax("mismatched parentheses", span));
                }
                Pending::OpenSquare(span) => {
                    return Err(CoreError::syntax("mismatched brackets", span));
                }
                other => self.reduce(other)?,
            }
        }

        let Some(top) = self.output.pop() else {
            return Ok(None);
        };
        let expr = match top {
            Operand::Expr(expr) => expr,
            Operand::NoArgs(span) => return Err(CoreError::syntax("invalid in expression", span)),
        };
        if let Some(first) = self.output.first() {
            let span = match first {
                Operand::Expr(e) => e.leftmost_span(),
                Operand::NoArgs(span) => *span,
            };
            return Err(CoreError::syntax("split expression", span));
        }
        Ok(Some(expr))
    }

    fn is_end(&self, token: &Token) -> bool {
        token.kind == TokenKind::Oper
            && token.text.len() == 1
            && self.nest == 0
            && self.end.contains(token.text.as_str())
    }

    fn read_one(&mut self) -> CoreResult<bool> {
        let token = self.stream.peek().clone();
        if token.is_eof() || self.is_end(&token) {
            return Ok(false);
        }
        if self.read_value(&token)? {
            return Ok(true);
        }
        match (token.kind, token.text.as_str()) {
            (TokenKind::Oper, "(") => self.open_paren(&token),
            (TokenKind::Oper, ")") => self.close_paren(&token)?,
            (TokenKind::Oper, "[") => self.open_square(&token)?,
            (TokenKind::Oper, "]") => self.close_square(&token)?,
            (TokenKind::Oper, _) => self.read_operator(&token)?,
            (TokenKind::Word, word) if is_keyword(word, false) => self.read_operator(&token)?,
            _ => return Err(CoreError::syntax("invalid in expression", token.span)),
        }
        Ok(true)
    }

    fn push_value(&mut self, kind: ExprKind, span: Span, callable: bool) {
        self.output.push(Operand::Expr(Expr::new(kind, span)));
        self.call_possible = callable;
        self.unary_possible = false;
    }

    fn read_value(&mut self, token: &Token) -> CoreResult<bool> {
        let span = token.span;
        match token.kind {
            TokenKind::Int => {
                self.stream.next();
                let value = parse_int(&token.text)
                    .ok_or_else(|| CoreError::syntax("invalid integer", span))?;
                self.push_value(ExprKind::Int(value), span, false);
            }
            TokenKind::Real => {
                self.stream.next();
                let value: f64 = token
                    .text
                    .replace('_', "")
                    .parse()
                    .map_err(|_| CoreError::syntax("invalid double", span))?;
                self.push_value(ExprKind::Real(value), span, false);
            }
            TokenKind::Str => {
                self.stream.next();
                self.push_value(ExprKind::Str(token.text.clone()), span, false);
            }
            TokenKind::Oper if token.text == "{" => {
                let items = self.array_literal()?;
                self.push_value(ExprKind::Array(items), span, false);
            }
            TokenKind::Word => match token.text.as_str() {
                "true" | "false" => {
                    self.stream.next();
                    self.push_value(ExprKind::Bool(token.text == "true"), span, false);
                }
                "null" => {
                    self.stream.next();
                    self.push_value(ExprKind::Null, span, false);
                }
                "new" => {
                    self.stream.next();
                    let ty = parse_type(self.stream, self.cfg)?;
                    self.push_value(ExprKind::New { ty, args: Vec::new() }, span, true);
                }
                word if !is_keyword(word, false) => {
                    self.stream.next();
                    self.push_value(ExprKind::Name(word.to_string()), span, true);
                }
                _ => return Ok(false),
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn array_literal(&mut self) -> CoreResult<Vec<Expr>> {
        self.stream.next();
        let mut items = Vec::new();
        loop {
            let next = self.stream.peek();
            if next.is_oper(",") || next.is_oper("}") {
                return Err(CoreError::expected("expression", next.span));
            }
            let item = parse_expression(self.stream, ",}", self.cfg)?;
            items.extend(item);
            let sep = self.stream.next();
            if sep.is_oper("}") {
                return Ok(items);
            }
            if sep.is_eof() {
                return Err(CoreError::unexpected_eof(", or }", sep.span));
            }
            if !sep.is_oper(",") {
                return Err(CoreError::expected(", or }", sep.span));
            }
        }
    }

    fn open_paren(&mut self, token: &Token) {
        self.stream.next();
        if self.call_possible {
            if let Some(Operand::Expr(callee)) = self.output.pop() {
                self.stack.push(Pending::Call(callee));
            }
            self.stack.push(Pending::OpenParen(token.span));
            let next = self.stream.peek();
            if next.is_oper(")") {
                self.output.push(Operand::NoArgs(next.span));
            }
        } else {
            self.stack.push(Pending::OpenParen(token.span));
        }
        self.nest += 1;
        self.call_possible = false;
        self.unary_possible = true;
    }

    fn close_paren(&mut self, token: &Token) -> CoreResult<()> {
        loop {
            match self.stack.pop() {
                Some(Pending::OpenParen(_)) => break,
                Some(other) => self.reduce(other)?,
                None => return Err(CoreError::syntax("mismatched parentheses", token.span)),
            }
        }
        if matches!(self.stack.last(), Some(Pending::Call(_))) {
            if let Some(call) = self.stack.pop() {
                self.reduce(call)?;
            }
        }
        self.stream.next();
        self.nest = self.nest.saturating_sub(1);
        self.call_possible = true;
        self.unary_possible = false;
        Ok(())
    }

    fn open_square(&mut self, token: &Token) -> CoreResult<()> {
        if !self.call_possible {
            return Err(CoreError::unexpected("indexable before [", token.span));
        }
        if let Some(Operand::Expr(base)) = self.output.pop() {
            self.stack.push(Pending::Index(base));
        }
        self.stack.push(Pending::OpenSquare(token.span));
        self.stream.next();
        self.nest += 1;
        self.call_possible = false;
        self.unary_possible = true;
        Ok(())
    }

    fn close_square(&mut self, token: &Token) -> CoreResult<()> {
        loop {
            match self.stack.pop() {
                Some(Pending::OpenSquare(_)) => break,
                Some(other) => self.reduce(other)?,
                None => return Err(CoreError::syntax("mismatched brackets", token.span)),
            }
        }
        match self.stack.pop() {
            Some(index @ Pending::Index(_)) => self.reduce(index)?,
            other => panic!("`[` without a pending index: {other:?}"),
        }
        self.stream.next();
        self.nest = self.nest.saturating_sub(1);
        self.call_possible = true;
        self.unary_possible = false;
        Ok(())
    }

    fn read_operator(&mut self, token: &Token) -> CoreResult<()> {
        let span = token.span;
        let pending = if self.unary_possible {
            UnOp::from_symbol(&token.text)
                .map(|op| Pending::Unary(op, span))
                .ok_or_else(|| CoreError::unexpected("unary operator", span))?
        } else {
            BinOp::from_symbol(&token.text)
                .map(|op| Pending::Binary(op, span))
                .ok_or_else(|| CoreError::unexpected("binary operator", span))?
        };
        self.stream.next();
        self.call_possible = false;
        self.unary_possible = true;

        let is_cast = matches!(pending, Pending::Binary(BinOp::As, _));
        self.shunt(pending)?;

        if is_cast {
            let at = self.stream.peek().span;
            let ty = parse_type(self.stream, self.cfg)?;
            self.output.push(Operand::Expr(Expr::new(ExprKind::TypeValue(ty), at)));
            self.unary_possible = false;
        }
        Ok(())
    }

    fn shunt(&mut self, pending: Pending) -> CoreResult<()> {
        let (prec, assoc) = match &pending {
            Pending::Binary(op, _) => (op.precedence(), op.assoc()),
            Pending::Unary(op, _) => (op.precedence(), op.assoc()),
            other => (other.precedence(), Assoc::Left),
        };
        while let Some(top) = self.stack.last() {
            let top_prec = top.precedence();
            let pops = match assoc {
                Assoc::Left => prec <= top_prec,
                Assoc::Right => prec < top_prec,
            };
            if !pops {
                break;
            }
            if let Some(top) = self.stack.pop() {
                self.reduce(top)?;
            }
        }
        self.stack.push(pending);
        Ok(())
    }

    fn pop_operand(&mut self, message: &str, span: Span) -> CoreResult<Operand> {
        self.output
            .pop()
            .ok_or_else(|| CoreError::syntax(message, span))
    }

    fn pop_expr(&mut self, message: &str, span: Span) -> CoreResult<Expr> {
        match self.pop_operand(message, span)? {
            Operand::Expr(expr) => Ok(expr),
            Operand::NoArgs(at) => Err(CoreError::syntax("invalid in expression", at)),
        }
    }

    /// Apply a waiting operator to its operands and push the result.
    fn reduce(&mut self, pending: Pending) -> CoreResult<()> {
        let expr = match pending {
            Pending::Unary(op, span) => {
                let operand = self.pop_expr("requires one operand", span)?;
                Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            Pending::Binary(op, span) => {
                let rhs = self.pop_expr("requires two operands", span)?;
                let lhs = self.pop_expr("requires two operands", span)?;
                Expr::new(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                )
            }
            Pending::Call(callee) => {
                let span = callee.span;
                let args = match self.pop_operand("requires one operand", span)? {
                    Operand::NoArgs(_) => Vec::new(),
                    Operand::Expr(args) => args.unpack_comma(),
                };
                match callee.kind {
                    ExprKind::New { ty, args: none } if none.is_empty() => {
                        Expr::new(ExprKind::New { ty, args }, span)
                    }
                    _ => Expr::new(
                        ExprKind::Call {
                            callee: Box::new(callee),
                            args,
                        },
                        span,
                    ),
                }
            }
            Pending::Index(base) => {
                let span = base.span;
                let index = self.pop_expr("requires one operand", span)?;
                Expr::new(
                    ExprKind::Index {
                        base: Box::new(base),
                        index: Box::new(index),
                    },
                    span,
                )
            }
            Pending::OpenParen(span) | Pending::OpenSquare(span) => {
                panic!("bracket sentinel reduced at {span}")
            }
        };
        self.output.push(Operand::Expr(expr));
        Ok(())
    }
}

/// Parse an integer token: decimal, or `0x`/`0d`/`0o`/`0b` prefixed, with
/// `_` separators.
pub fn parse_int(text: &str) -> Option<BigInt> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let (body, radix) = match lower.get(..2) {
        Some("0x") => (&digits[2..], 16),
        Some("0d") => (&digits[2..], 10),
        Some("0o") => (&digits[2..], 8),
        Some("0b") => (&digits[2..], 2),
        _ => (digits.as_str(), 10),
    };
    if body.is_empty() {
        return None;
    }
    BigInt::parse_bytes(body.as_bytes(), radix)
}
