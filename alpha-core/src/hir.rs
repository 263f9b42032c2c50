//! Typed high-level IR.
//!
//! The checker produces this from the AST. Every name is resolved to a
//! storage slot or a symbol, every implicit conversion is an explicit
//! [`HirExprKind::Cast`], and every operator has already been decided
//! between its built-in form and an overload call. Lowering reads HIR and
//! cannot fail.

use num_bigint::BigInt;

use crate::cast::CastPlan;
use crate::operators::BinOp;
use crate::span::Span;
use crate::types::Type;

/// One checked compilation unit (or package).
#[derive(Debug, Clone, PartialEq)]
pub struct HirModule {
    pub functions: Vec<HirFunction>,
    pub externs: Vec<HirExtern>,
    pub statics: Vec<HirStatic>,
    /// An `@oom` handler was declared; `new` passes `@$$oom` to the runtime.
    pub handle_oom: bool,
    /// An `@bounds` handler was declared.
    pub handle_oob: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirExtern {
    pub symbol: String,
    /// Empty for `void`.
    pub returns: Vec<Type>,
    pub params: Vec<Type>,
}

/// A module-level global created by a `static` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct HirStatic {
    /// `@N`
    pub name: String,
    pub ty: Type,
    /// Constant initialiser as LLVM text.
    pub init: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirParam {
    /// Stack slot the argument is spilled to (`%x`, `%x.1`).
    pub slot: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub symbol: String,
    /// Empty for `void`. Returns after the first are written through
    /// out-pointer parameters placed before `params`.
    pub returns: Vec<Type>,
    pub params: Vec<HirParam>,
    pub body: Vec<HirStmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmt {
    Expr(HirExpr),
    /// `let`/`const`: a fresh stack slot initialised with `value`.
    Local {
        slot: String,
        ty: Type,
        value: HirExpr,
    },
    If {
        cond: HirExpr,
        then: Vec<HirStmt>,
        otherwise: Option<Vec<HirStmt>>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    DoWhile {
        body: Vec<HirStmt>,
        cond: HirExpr,
    },
    For {
        init: Vec<HirStmt>,
        cond: Option<HirExpr>,
        step: Option<HirExpr>,
        body: Vec<HirStmt>,
    },
    /// Leave `levels` enclosing loops; already checked against the loop
    /// nesting.
    Break(u32),
    Continue(u32),
    /// Values already converted to the declared return types.
    Return(Vec<HirExpr>),
    Delete(Vec<HirExpr>),
    Block(Vec<HirStmt>),
}

/// Something that has an address.
#[derive(Debug, Clone, PartialEq)]
pub enum HirPlace {
    /// A named stack slot or global (`%x`, `@3`).
    Slot { name: String, volatile: bool },
    /// `*p`
    Deref(Box<HirExpr>),
    /// `a[i]`; `index` is already a `size`.
    Index {
        array: Box<HirExpr>,
        index: Box<HirExpr>,
    },
}

/// In-place modification of a place (`+=`, `++`).
#[derive(Debug, Clone, PartialEq)]
pub enum HirUpdate {
    /// `place = place op rhs`; `rhs` has the place's type.
    Arith { op: BinOp, rhs: Box<HirExpr> },
    /// Move a pointer by `index` elements (negated for `-=` / `--`).
    Offset { index: Box<HirExpr>, negate: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirNew {
    /// `new T` / `new T (n)`: room for one or `n` values, giving `T*`.
    Scalar {
        elem: Type,
        count: Option<Box<HirExpr>>,
    },
    /// `new T[] (n)`
    Array { elem: Type, len: Box<HirExpr> },
    /// `new T[] (p, n)`: an array header over an existing buffer.
    Backed {
        elem: Type,
        ptr: Box<HirExpr>,
        len: Box<HirExpr>,
    },
}

/// One destination of an assignment fed by a multi-return call.
#[derive(Debug, Clone, PartialEq)]
pub struct HirTarget {
    pub place: HirPlace,
    pub ty: Type,
    /// Conversion from the call's return type to `ty`.
    pub plan: CastPlan,
    pub from: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirExprKind {
    Int(BigInt),
    /// LLVM hex spelling of a double constant.
    Real(String),
    Bool(bool),
    Null,
    /// Bytes of a string literal, without terminator.
    Str(Vec<u8>),
    Array(Vec<HirExpr>),
    Load(HirPlace),
    Address(HirPlace),
    /// `arr.length`
    Length(Box<HirExpr>),
    Cast {
        value: Box<HirExpr>,
        plan: CastPlan,
    },
    /// Built-in arithmetic or bitwise operator; both operands have the
    /// node's type.
    Arith {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    /// Built-in comparison; both operands have `operand` type.
    Compare {
        op: BinOp,
        operand: Type,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    /// `ptr + n`, `ptr - n`
    Offset {
        ptr: Box<HirExpr>,
        index: Box<HirExpr>,
        negate: bool,
    },
    /// `p - q`: distance in elements.
    PtrDiff {
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
        elem_size: u32,
    },
    /// `&&` / `||`; operands are bools.
    Logical {
        and: bool,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Not(Box<HirExpr>),
    Neg(Box<HirExpr>),
    Compl(Box<HirExpr>),
    Update {
        place: HirPlace,
        update: HirUpdate,
    },
    Ternary {
        cond: Box<HirExpr>,
        then: Box<HirExpr>,
        otherwise: Box<HirExpr>,
    },
    New(HirNew),
    Call {
        symbol: String,
        args: Vec<HirExpr>,
        /// All declared return types; empty for `void`.
        returns: Vec<Type>,
    },
    /// Pairwise assignment; the node's value is the first stored value.
    Assign(Vec<(HirPlace, HirExpr)>),
    /// `a, b := f()`; `None` targets discard a return value.
    AssignCall {
        call: Box<HirExpr>,
        targets: Vec<Option<HirTarget>>,
    },
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: Type, span: Span) -> Self {
        HirExpr { kind, ty, span }
    }

    /// Apply a cast plan. Plans that keep the value as it is only retype
    /// the node.
    pub fn cast(self, plan: CastPlan, ty: Type) -> HirExpr {
        if plan.is_identity() {
            return HirExpr { ty, ..self };
        }
        let span = self.span;
        HirExpr::new(
            HirExprKind::Cast {
                value: Box::new(self),
                plan,
            },
            ty,
            span,
        )
    }

    /// A call to a function that returns nothing.
    pub fn is_void_call(&self) -> bool {
        matches!(&self.kind, HirExprKind::Call { returns, .. } if returns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn identity_casts_are_elided() {
        let span = Span::new(FileId(0), 0, 0);
        let value = HirExpr::new(HirExprKind::Bool(true), Type::bool(), span);
        let same = value.clone().cast(CastPlan::Identity, Type::bool());
        assert_eq!(same, value);

        let widened = value.cast(CastPlan::BoolToInt { extend: true }, Type::int());
        assert!(matches!(widened.kind, HirExprKind::Cast { .. }));
        assert_eq!(widened.ty, Type::int());
    }
}
