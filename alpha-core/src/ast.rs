//! Untyped syntax tree produced by the parser.
//!
//! The tree is a closed sum type; later passes `match` on it and never
//! mutate it. Types written in source (casts, `let` annotations, `new`) are
//! already resolved to [`Type`] values because type syntax needs only the
//! target configuration.

use num_bigint::BigInt;

use crate::operators::{BinOp, UnOp};
use crate::span::Span;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(BigInt),
    Real(f64),
    Bool(bool),
    Null,
    Str(String),
    /// `{a, b, c}`
    Array(Vec<Expr>),
    Name(String),
    /// `new T`, `new T (n)`, `new T[] (n)`, `new T[] (p, n)`
    New { ty: Type, args: Vec<Expr> },
    /// Right operand of `as`.
    TypeValue(Type),
    Unary { op: UnOp, operand: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    /// Span of the leftmost leaf, used to point at split expressions.
    pub fn leftmost_span(&self) -> Span {
        match &self.kind {
            ExprKind::Unary { operand, .. } => operand.leftmost_span(),
            ExprKind::Binary { lhs, .. } => lhs.leftmost_span(),
            ExprKind::Call { callee, .. } => callee.leftmost_span(),
            ExprKind::Index { base, .. } => base.leftmost_span(),
            ExprKind::Array(items) => items.first().map_or(self.span, Expr::leftmost_span),
            _ => self.span,
        }
    }

    /// Flatten a left-leaning `,` chain into its elements.
    pub fn unpack_comma(self) -> Vec<Expr> {
        match self.kind {
            ExprKind::Binary {
                op: BinOp::Comma,
                lhs,
                rhs,
            } => {
                let mut items = lhs.unpack_comma();
                items.extend(rhs.unpack_comma());
                items
            }
            kind => vec![Expr { kind, span: self.span }],
        }
    }

    /// Borrowing version of [`Expr::unpack_comma`].
    pub fn comma_items(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Binary {
                op: BinOp::Comma,
                lhs,
                rhs,
            } => {
                let mut items = lhs.comma_items();
                items.extend(rhs.comma_items());
                items
            }
            _ => vec![self],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: String,
    pub ty: Option<Type>,
    pub value: Expr,
    pub span: Span,
}

/// How a `let`-style statement stores its bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// `let`: a stack slot.
    Local,
    /// `const`: a stack slot that cannot be assigned after initialisation.
    Const,
    /// `static`: a module-level global visible only in this scope.
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Let {
        storage: Storage,
        bindings: Vec<LetBinding>,
    },
    If {
        cond: Expr,
        then: Block,
        otherwise: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Block,
    },
    /// `break N;` Levels to leave, at least one.
    Break(u32),
    Continue(u32),
    Return(Vec<Expr>),
    Delete(Vec<Expr>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Empty for unnamed `extern` parameters.
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub is_operator: bool,
    /// Empty for `void`.
    pub returns: Vec<Type>,
    pub params: Vec<Param>,
    pub nomangle: bool,
    pub allow_conflict: bool,
    pub global: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function { decl: FunctionDecl, body: Block },
    Extern(FunctionDecl),
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Name from a `package NAME;` / `executable NAME;` header.
    pub package: Option<String>,
    pub executable: bool,
    pub items: Vec<Item>,
}
