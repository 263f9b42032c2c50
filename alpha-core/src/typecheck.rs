//! Type checking: AST in, typed HIR out.
//!
//! Declarations of every unit are registered before any body is checked,
//! so functions may be called before the point where they are defined.
//! Operators try their built-in meaning first; when that fails with a type
//! error and the operator can be overloaded, an overload is looked up
//! instead. If that lookup fails too, the built-in error is reported.

use num_bigint::BigInt;
use num_traits::One;
use tracing::debug;

use crate::ast::{Block, Expr, ExprKind, FunctionDecl, Item, Stmt, StmtKind, Storage, Unit};
use crate::cast::{fold_double_to_float, CastPlan};
use crate::coerce::{arith_coerce, can_coerce, check_coerce, coerce_result_type};
use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, CoreResult};
use crate::hir::{
    HirExpr, HirExprKind, HirExtern, HirFunction, HirModule, HirNew, HirParam, HirPlace,
    HirStatic, HirStmt, HirTarget, HirUpdate,
};
use crate::operators::{is_overloadable, BinOp, UnOp};
use crate::resolver::{FunctionSig, Resolver};
use crate::span::Span;
use crate::types::{Encoding, Type};

/// Check a set of units that form one package.
pub fn check_units(
    units: &[Unit],
    cfg: &Config,
    warnings: &mut Vec<Diagnostic>,
) -> CoreResult<HirModule> {
    let mut checker = Checker {
        cfg,
        resolver: Resolver::new(),
        warnings,
        statics: Vec::new(),
        loops: 0,
        returns: Vec::new(),
    };

    let mut externs: Vec<HirExtern> = Vec::new();
    for unit in units {
        for item in &unit.items {
            let sig = signature(unit, item_decl(item), cfg);
            checker.resolver.add_function(sig.clone(), cfg)?;
            if let Item::Extern(_) = item {
                let symbol = sig.mangled_name();
                if externs.iter().all(|e| e.symbol != symbol) {
                    externs.push(HirExtern {
                        symbol,
                        returns: sig.returns,
                        params: sig.params,
                    });
                }
            }
        }
    }

    let mut functions = Vec::new();
    for unit in units {
        for item in &unit.items {
            if let Item::Function { decl, body } = item {
                let sig = signature(unit, decl, cfg);
                functions.push(checker.check_function(&sig, body)?);
            }
        }
    }

    Ok(HirModule {
        functions,
        externs,
        statics: checker.statics,
        handle_oom: checker.resolver.handle_oom(),
        handle_oob: checker.resolver.handle_oob(),
    })
}

fn item_decl(item: &Item) -> &FunctionDecl {
    match item {
        Item::Function { decl, .. } | Item::Extern(decl) => decl,
    }
}

fn signature(unit: &Unit, decl: &FunctionDecl, cfg: &Config) -> FunctionSig {
    let mut sig = FunctionSig::from_decl(decl, cfg);
    if let Some(package) = &unit.package {
        sig.package = package.clone();
    }
    sig
}

struct Checker<'a> {
    cfg: &'a Config,
    resolver: Resolver,
    warnings: &'a mut Vec<Diagnostic>,
    statics: Vec<HirStatic>,
    /// Number of loops around the statement being checked.
    loops: u32,
    /// Declared returns of the function being checked.
    returns: Vec<Type>,
}

impl<'a> Checker<'a> {
    fn check_function(&mut self, sig: &FunctionSig, body: &Block) -> CoreResult<HirFunction> {
        debug!(function = %sig, "checking function");
        self.resolver.begin_function();
        self.resolver.push_scope();
        self.loops = 0;
        self.returns = sig.returns.iter().map(Type::normalised).collect();

        let mut params = Vec::new();
        for (name, ty) in sig.param_names.iter().zip(&sig.params) {
            let var = self.resolver.add_variable(name, ty.clone(), sig.span)?;
            params.push(HirParam {
                slot: var.real_name,
                ty: ty.normalised(),
            });
        }
        let stmts = self.check_stmts(&body.stmts)?;
        self.resolver.pop_scope();
        debug!(function = %sig, "function checked");

        Ok(HirFunction {
            symbol: sig.mangled_name(),
            returns: self.returns.clone(),
            params,
            body: stmts,
            span: sig.span,
        })
    }

    fn warn(&mut self, message: &str, span: Span) {
        self.warnings.push(Diagnostic::warning(message, span));
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn check_stmts(&mut self, stmts: &[Stmt]) -> CoreResult<Vec<HirStmt>> {
        let mut out = Vec::new();
        for stmt in stmts {
            self.check_stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn scoped_block(&mut self, block: &Block) -> CoreResult<Vec<HirStmt>> {
        self.resolver.push_scope();
        let stmts = self.check_stmts(&block.stmts);
        self.resolver.pop_scope();
        stmts
    }

    fn loop_body(&mut self, block: &Block) -> CoreResult<Vec<HirStmt>> {
        self.loops += 1;
        let body = self.scoped_block(block);
        self.loops -= 1;
        body
    }

    fn check_stmt(&mut self, stmt: &Stmt, out: &mut Vec<HirStmt>) -> CoreResult<()> {
        let hir = match &stmt.kind {
            StmtKind::Expr(expr) => HirStmt::Expr(self.check_expr(expr)?),
            StmtKind::Let {
                storage: Storage::Static,
                bindings,
            } => {
                for binding in bindings {
                    self.check_static(&binding.name, binding.ty.as_ref(), &binding.value, binding.span)?;
                }
                return Ok(());
            }
            StmtKind::Let { storage, bindings } => {
                for binding in bindings {
                    let value = self.check_value(&binding.value)?;
                    let (ty, value) = match &binding.ty {
                        Some(ty) => {
                            let value = self.coerce(value, ty)?;
                            (ty.normalised(), value)
                        }
                        None if value.ty.is_null() => {
                            return Err(CoreError::type_error(
                                "cannot infer a type from null",
                                binding.value.leftmost_span(),
                            ));
                        }
                        None => {
                            let ty = value.ty.normalised();
                            (ty.clone(), value.cast(CastPlan::Identity, ty))
                        }
                    };
                    let var_ty = match storage {
                        Storage::Const => ty.const_(),
                        _ => ty.clone(),
                    };
                    let var = self.resolver.add_variable(&binding.name, var_ty, binding.span)?;
                    out.push(HirStmt::Local {
                        slot: var.real_name,
                        ty,
                        value,
                    });
                }
                return Ok(());
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.check_condition(cond)?;
                let then = self.scoped_block(then)?;
                let otherwise = match otherwise {
                    Some(block) => Some(self.scoped_block(block)?),
                    None => None,
                };
                HirStmt::If {
                    cond,
                    then,
                    otherwise,
                }
            }
            StmtKind::While { cond, body } => {
                let cond = self.check_condition(cond)?;
                let body = self.loop_body(body)?;
                HirStmt::While { cond, body }
            }
            StmtKind::DoWhile { body, cond } => {
                let body = self.loop_body(body)?;
                let cond = self.check_condition(cond)?;
                HirStmt::DoWhile { body, cond }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.resolver.push_scope();
                let result = self.check_for(init.as_deref(), cond.as_ref(), step.as_ref(), body);
                self.resolver.pop_scope();
                result?
            }
            StmtKind::Break(levels) => {
                self.check_levels(*levels, "break", stmt.span)?;
                HirStmt::Break(*levels)
            }
            StmtKind::Continue(levels) => {
                self.check_levels(*levels, "continue", stmt.span)?;
                HirStmt::Continue(*levels)
            }
            StmtKind::Return(values) => {
                if values.len() != self.returns.len() {
                    return Err(CoreError::structural("wrong number of return values", stmt.span));
                }
                let mut hir = Vec::new();
                for (value, ty) in values.iter().zip(self.returns.clone()) {
                    let value = self.check_value(value)?;
                    hir.push(self.coerce(value, &ty)?);
                }
                HirStmt::Return(hir)
            }
            StmtKind::Delete(values) => {
                let mut hir = Vec::new();
                for value in values {
                    let value = self.check_value(value)?;
                    if !matches!(value.ty.encoding(), Encoding::Pointer | Encoding::Array) {
                        return Err(CoreError::type_error(
                            "cannot delete non-pointer",
                            value.span,
                        ));
                    }
                    hir.push(value);
                }
                HirStmt::Delete(hir)
            }
            StmtKind::Block(block) => HirStmt::Block(self.scoped_block(block)?),
        };
        out.push(hir);
        Ok(())
    }

    fn check_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Block,
    ) -> CoreResult<HirStmt> {
        let mut hir_init = Vec::new();
        if let Some(init) = init {
            self.check_stmt(init, &mut hir_init)?;
        }
        let cond = cond.map(|c| self.check_condition(c)).transpose()?;
        let step = step.map(|s| self.check_expr(s)).transpose()?;
        let body = self.loop_body(body)?;
        Ok(HirStmt::For {
            init: hir_init,
            cond,
            step,
            body,
        })
    }

    fn check_levels(&self, levels: u32, what: &str, span: Span) -> CoreResult<()> {
        if levels > self.loops {
            let plural = if levels == 1 { "" } else { "s" };
            return Err(CoreError::structural(
                format!("cannot find {levels} level{plural} to {what} from"),
                span,
            ));
        }
        Ok(())
    }

    fn check_condition(&mut self, cond: &Expr) -> CoreResult<HirExpr> {
        let value = self.check_value(cond)?;
        self.to_bool(value)
    }

    /// `static NAME [T] = literal;`: a module global with a constant
    /// initialiser, visible in the enclosing scope only.
    fn check_static(
        &mut self,
        name: &str,
        declared: Option<&Type>,
        value: &Expr,
        span: Span,
    ) -> CoreResult<()> {
        let not_literal = || {
            CoreError::type_error("static variable default must be primitive literal or null", span)
        };
        let literal = match &value.kind {
            ExprKind::Unary {
                op: UnOp::Neg,
                operand,
            } => match &operand.kind {
                ExprKind::Int(v) => ExprKind::Int(-v),
                ExprKind::Real(v) => ExprKind::Real(-v),
                _ => return Err(not_literal()),
            },
            kind => kind.clone(),
        };
        let (ty, init) = match (literal, declared) {
            (ExprKind::Int(v), ty) => {
                let ty = match ty {
                    Some(ty) => ty.normalised(),
                    None => Type::int_literal(v.clone())
                        .ok_or_else(|| CoreError::type_error("invalid integer value for type", span))?
                        .normalised(),
                };
                if !ty.is_integer() {
                    return Err(CoreError::type_error("integer initialiser for non-integer", span));
                }
                if !ty.fits(&v) {
                    return Err(CoreError::type_error("invalid integer value for type", span));
                }
                (ty, v.to_string())
            }
            (ExprKind::Real(v), ty) => {
                let ty = ty.map(Type::normalised).unwrap_or_else(|| Type::float(8));
                if ty.encoding() != Encoding::Float {
                    return Err(CoreError::type_error("float initialiser for non-float", span));
                }
                let text = real_constant(v);
                let text = if ty.size() == 4 {
                    fold_double_to_float(&text).unwrap_or(text)
                } else {
                    text
                };
                (ty, text)
            }
            (ExprKind::Bool(b), ty) => {
                let ty = ty.map(Type::normalised).unwrap_or_else(Type::bool);
                if ty.encoding() != Encoding::Bool {
                    return Err(CoreError::type_error("bool initialiser for non-bool", span));
                }
                (ty, bool_constant(b).to_string())
            }
            (ExprKind::Null, Some(ty)) => {
                check_coerce(&Type::null(), ty, span)?;
                let ty = ty.normalised();
                let init = zero_constant(&ty);
                (ty, init)
            }
            _ => return Err(not_literal()),
        };
        let var = self.resolver.add_global(name, ty.clone(), span)?;
        self.statics.push(HirStatic {
            name: var.real_name,
            ty,
            init,
        });
        Ok(())
    }

    // ---------------------------------------------------------------
    // Conversions
    // ---------------------------------------------------------------

    /// Implicit conversion, checked.
    fn coerce(&self, value: HirExpr, dst: &Type) -> CoreResult<HirExpr> {
        check_coerce(&value.ty, dst, value.span)?;
        Ok(implicit(value, dst))
    }

    fn to_bool(&self, value: HirExpr) -> CoreResult<HirExpr> {
        let plan = CastPlan::check(&value.ty, &Type::bool(), self.cfg, value.span)?;
        Ok(value.cast(plan, Type::bool()))
    }

    fn to_size(&self, value: HirExpr) -> CoreResult<HirExpr> {
        self.coerce(value, &Type::size_type(self.cfg))
    }

    /// Bring both operands to their common arithmetic type.
    fn arith_pair(
        &self,
        lhs: HirExpr,
        rhs: HirExpr,
        span: Span,
    ) -> CoreResult<(HirExpr, HirExpr, Type)> {
        let side = arith_coerce(&lhs.ty, &rhs.ty, span)?;
        let ty = coerce_result_type(&lhs.ty, &rhs.ty, side);
        Ok((implicit(lhs, &ty), implicit(rhs, &ty), ty))
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    /// An expression whose value is used.
    fn check_value(&mut self, expr: &Expr) -> CoreResult<HirExpr> {
        let value = self.check_expr(expr)?;
        if value.is_void_call() {
            return Err(CoreError::type_error(
                "void function used as a value",
                expr.leftmost_span(),
            ));
        }
        Ok(value)
    }

    fn check_expr(&mut self, expr: &Expr) -> CoreResult<HirExpr> {
        let span = expr.span;
        let value = match &expr.kind {
            ExprKind::Int(value) => int_value(value.clone(), span)?,
            ExprKind::Real(value) => {
                HirExpr::new(HirExprKind::Real(real_constant(*value)), Type::float(8), span)
            }
            ExprKind::Bool(value) => HirExpr::new(HirExprKind::Bool(*value), Type::bool(), span),
            ExprKind::Null => HirExpr::new(HirExprKind::Null, Type::null(), span),
            ExprKind::Str(text) => HirExpr::new(
                HirExprKind::Str(text.as_bytes().to_vec()),
                Type::uint(1).array(self.cfg),
                span,
            ),
            ExprKind::Array(items) => self.check_array(items, span)?,
            ExprKind::Name(_) | ExprKind::Index { .. } => {
                let (place, ty) = self.check_place(expr, false)?;
                HirExpr::new(HirExprKind::Load(place), ty.not_const(), span)
            }
            ExprKind::New { ty, args } => self.check_new(ty, args, span)?,
            ExprKind::TypeValue(_) => {
                return Err(CoreError::syntax("type name in expression", span));
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, span)?,
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, span)?,
            ExprKind::Call { callee, args } => self.check_call(callee, args, span)?,
        };
        Ok(value)
    }

    fn check_array(&mut self, items: &[Expr], span: Span) -> CoreResult<HirExpr> {
        let mut values = Vec::new();
        for item in items {
            values.push(self.check_value(item)?);
        }
        let elem = match values.first() {
            Some(first) => first.ty.normalised(),
            None => return Err(CoreError::type_error("empty array literal", span)),
        };
        let mut hir = Vec::new();
        for value in values {
            if !can_coerce(&value.ty, &elem) {
                return Err(CoreError::type_error(
                    format!("array element mismatch: {} in {}[]", value.ty.non_literal(), elem),
                    value.span,
                ));
            }
            hir.push(implicit(value, &elem));
        }
        Ok(HirExpr::new(HirExprKind::Array(hir), elem.array(self.cfg), span))
    }

    fn check_new(&mut self, ty: &Type, args: &[Expr], span: Span) -> CoreResult<HirExpr> {
        let mut values = Vec::new();
        for arg in args {
            values.push(self.check_value(arg)?);
        }
        let elem = ty.normalised();
        let wanted = match elem.subtype() {
            Some(sub) if elem.encoding() == Encoding::Array => format!("(size) or ({sub}*, size)"),
            _ => "(size) or no arguments".to_string(),
        };
        let new = match elem.encoding() {
            Encoding::SInt | Encoding::UInt | Encoding::Float | Encoding::Pointer | Encoding::Bool => {
                let count = match values.len() {
                    0 => None,
                    1 => Some(Box::new(self.to_size(values.remove(0))?)),
                    _ => return Err(CoreError::unexpected(&wanted, span)),
                };
                let result = elem.pointer(self.cfg);
                return Ok(HirExpr::new(
                    HirExprKind::New(HirNew::Scalar { elem, count }),
                    result,
                    span,
                ));
            }
            Encoding::Array => {
                let sub = elem.subtype().cloned().unwrap_or_else(Type::null);
                match values.len() {
                    1 => HirNew::Array {
                        elem: sub,
                        len: Box::new(self.to_size(values.remove(0))?),
                    },
                    2 => {
                        let ptr = values.remove(0);
                        let backed = ptr.ty.encoding() == Encoding::Pointer
                            && ptr.ty.subtype().is_some_and(|s| *s == sub);
                        if !backed {
                            return Err(CoreError::unexpected(&wanted, span));
                        }
                        HirNew::Backed {
                            elem: sub,
                            ptr: Box::new(ptr),
                            len: Box::new(self.to_size(values.remove(0))?),
                        }
                    }
                    _ => return Err(CoreError::unexpected(&wanted, span)),
                }
            }
            Encoding::Object => {
                return Err(CoreError::type_error(
                    format!("unimplemented: new {elem}"),
                    span,
                ));
            }
            Encoding::Null => return Err(CoreError::unexpected("array or primitive type", span)),
        };
        Ok(HirExpr::new(HirExprKind::New(new), elem, span))
    }

    /// Resolve an expression that names storage. With `write`, the storage
    /// must also be assignable.
    fn check_place(&mut self, expr: &Expr, write: bool) -> CoreResult<(HirPlace, Type)> {
        let span = expr.span;
        let constant = || CoreError::type_error("cannot assign to constant", span);
        match &expr.kind {
            ExprKind::Name(name) => {
                let var = self.resolver.lookup_variable(name, span)?;
                if write && var.ty.is_const() {
                    return Err(constant());
                }
                let place = HirPlace::Slot {
                    name: var.real_name.clone(),
                    volatile: var.ty.is_volatile(),
                };
                Ok((place, var.ty.clone()))
            }
            ExprKind::Unary {
                op: UnOp::Deref,
                operand,
            } => self.check_deref(operand, write, span),
            ExprKind::Index { base, index } => {
                let array = self.check_value(base)?;
                let ty = match (array.ty.encoding(), array.ty.subtype()) {
                    (Encoding::Array, Some(sub)) => sub.clone(),
                    _ => {
                        return Err(CoreError::type_error(
                            format!("cannot index {}", array.ty),
                            span,
                        ))
                    }
                };
                if write && (ty.is_const() || array.ty.is_const()) {
                    return Err(constant());
                }
                let index = self.check_value(index)?;
                let index = self.to_size(index)?;
                let place = HirPlace::Index {
                    array: Box::new(array),
                    index: Box::new(index),
                };
                Ok((place, ty))
            }
            ExprKind::New { .. } => Err(CoreError::type_error("cannot assign to instantiation", span)),
            ExprKind::Call { .. } => Err(CoreError::type_error("cannot assign to call result", span)),
            _ => Err(CoreError::type_error("cannot assign to expression", span)),
        }
    }

    fn check_deref(&mut self, operand: &Expr, write: bool, span: Span) -> CoreResult<(HirPlace, Type)> {
        let ptr = self.check_value(operand)?;
        let ty = match (ptr.ty.encoding(), ptr.ty.subtype()) {
            (Encoding::Pointer, Some(sub)) => sub.clone(),
            _ => return Err(CoreError::type_error("cannot dereference non-pointer", span)),
        };
        if write && ty.is_const() {
            return Err(CoreError::type_error("cannot assign to constant", span));
        }
        Ok((HirPlace::Deref(Box::new(ptr)), ty))
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> CoreResult<HirExpr> {
        let ExprKind::Name(name) = &callee.kind else {
            return Err(CoreError::type_error("callee must be a name", callee.span));
        };
        let mut values = Vec::new();
        for arg in args {
            values.push(self.check_value(arg)?);
        }
        self.call_named(name, values, span)
    }

    /// Resolve `name` against the argument types and build the call.
    fn call_named(&mut self, name: &str, args: Vec<HirExpr>, span: Span) -> CoreResult<HirExpr> {
        let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        let sig = self.resolver.lookup_function(name, &types, span)?.clone();
        let mut hir = Vec::new();
        for (arg, param) in args.into_iter().zip(&sig.params) {
            hir.push(self.coerce(arg, param)?);
        }
        Ok(HirExpr::new(
            HirExprKind::Call {
                symbol: sig.mangled_name(),
                args: hir,
                returns: sig.returns.iter().map(Type::normalised).collect(),
            },
            sig.ret_type().normalised(),
            span,
        ))
    }

    /// Overload fallback: `builtin` failed with `err`; try `operator
    /// symbol (args)` and report `err` if that fails too.
    fn overload_or(
        &mut self,
        err: CoreError,
        symbol: &str,
        args: Vec<HirExpr>,
        span: Span,
    ) -> CoreResult<HirExpr> {
        if !is_overloadable(symbol) {
            return Err(err);
        }
        self.call_named(symbol, args, span).map_err(|lookup| {
            debug!(operator = symbol, error = %lookup, "no overload; keeping built-in error");
            err
        })
    }

    // ---------------------------------------------------------------
    // Unary operators
    // ---------------------------------------------------------------

    fn check_unary(&mut self, op: UnOp, operand: &Expr, span: Span) -> CoreResult<HirExpr> {
        match op {
            UnOp::Neg => {
                if let ExprKind::Int(value) = &operand.kind {
                    return int_value(-value, span);
                }
                if let ExprKind::Real(value) = &operand.kind {
                    return Ok(HirExpr::new(
                        HirExprKind::Real(real_constant(-value)),
                        Type::float(8),
                        span,
                    ));
                }
                let value = self.check_value(operand)?;
                let err = match value.ty.encoding() {
                    Encoding::SInt | Encoding::Float => {
                        let ty = value.ty.normalised();
                        return Ok(HirExpr::new(HirExprKind::Neg(Box::new(value)), ty, span));
                    }
                    Encoding::UInt => CoreError::type_error("negation of unsigned integer", span),
                    _ => CoreError::type_error("invalid type for negation", span),
                };
                self.overload_or(err, "-", vec![value], span)
            }
            UnOp::Compl => {
                let value = self.check_value(operand)?;
                if value.ty.is_integer() {
                    let ty = value.ty.normalised();
                    return Ok(HirExpr::new(HirExprKind::Compl(Box::new(value)), ty, span));
                }
                let err = CoreError::type_error("invalid type for complement", span);
                self.overload_or(err, "~", vec![value], span)
            }
            UnOp::Not => {
                let value = self.check_value(operand)?;
                let value = self.to_bool(value)?;
                Ok(HirExpr::new(HirExprKind::Not(Box::new(value)), Type::bool(), span))
            }
            UnOp::Deref => {
                let (place, ty) = self.check_deref(operand, false, span)?;
                Ok(HirExpr::new(HirExprKind::Load(place), ty.not_const(), span))
            }
            UnOp::Address => {
                let (place, ty) = self.check_place(operand, false).map_err(|err| {
                    match err {
                        CoreError::Type { .. } => {
                            CoreError::type_error("cannot take address of expression", span)
                        }
                        other => other,
                    }
                })?;
                let ptr = ty.pointer(self.cfg);
                Ok(HirExpr::new(HirExprKind::Address(place), ptr, span))
            }
            UnOp::Incr | UnOp::Decr => {
                let (place, ty) = self.check_place(operand, true)?;
                let ty = ty.not_const();
                let negate = op == UnOp::Decr;
                let update = match ty.encoding() {
                    Encoding::SInt | Encoding::UInt => HirUpdate::Arith {
                        op: if negate { BinOp::Sub } else { BinOp::Add },
                        rhs: Box::new(HirExpr::new(
                            HirExprKind::Int(BigInt::one()),
                            ty.clone(),
                            span,
                        )),
                    },
                    Encoding::Pointer => HirUpdate::Offset {
                        index: Box::new(HirExpr::new(
                            HirExprKind::Int(BigInt::one()),
                            Type::size_type(self.cfg),
                            span,
                        )),
                        negate,
                    },
                    _ => {
                        let what = if negate { "decrement" } else { "increment" };
                        return Err(CoreError::type_error(format!("invalid type for {what}"), span));
                    }
                };
                Ok(HirExpr::new(HirExprKind::Update { place, update }, ty, span))
            }
        }
    }

    // ---------------------------------------------------------------
    // Binary operators
    // ---------------------------------------------------------------

    fn check_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> CoreResult<HirExpr> {
        match op {
            BinOp::Assign => return self.check_assign(lhs, rhs, span),
            BinOp::EqError => {
                return Err(CoreError::unexpected(
                    "=; use := for assignment or == for comparison",
                    span,
                ));
            }
            BinOp::Comma => {
                return Err(CoreError::type_error("performing operation on a tuple", span));
            }
            BinOp::As => return self.check_cast(lhs, rhs, span),
            BinOp::Member => return self.check_member(lhs, rhs, span),
            BinOp::Question => return self.check_ternary(lhs, rhs, span),
            BinOp::Colon => return Err(CoreError::unexpected("?", span)),
            BinOp::LogAnd | BinOp::LogOr => {
                let lhs = self.check_value(lhs)?;
                let lhs = self.to_bool(lhs)?;
                let rhs = self.check_value(rhs)?;
                let rhs = self.to_bool(rhs)?;
                return Ok(HirExpr::new(
                    HirExprKind::Logical {
                        and: op == BinOp::LogAnd,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    Type::bool(),
                    span,
                ));
            }
            BinOp::RefEq | BinOp::RefNe => {
                let lhs = self.check_value(lhs)?;
                let rhs = self.check_value(rhs)?;
                return self.ref_compare(op, lhs, rhs, span);
            }
            _ => {}
        }

        if let Some(base) = op.compound_base() {
            return self.check_compound(op, base, lhs, rhs, span);
        }

        let lhs = self.check_value(lhs)?;
        let rhs = self.check_value(rhs)?;
        match self.builtin_binary(op, lhs.clone(), rhs.clone(), span) {
            Ok(value) => Ok(value),
            Err(err) => self.overload_or(err, op.symbol(), vec![lhs, rhs], span),
        }
    }

    fn builtin_binary(&self, op: BinOp, lhs: HirExpr, rhs: HirExpr, span: Span) -> CoreResult<HirExpr> {
        use Encoding::*;

        let (le, re) = (lhs.ty.encoding(), rhs.ty.encoding());
        match (op, le, re) {
            (BinOp::Add, Pointer, SInt | UInt) => return self.offset(lhs, rhs, false, span),
            (BinOp::Add, SInt | UInt, Pointer) => return self.offset(rhs, lhs, false, span),
            (BinOp::Sub, Pointer, SInt | UInt) => return self.offset(lhs, rhs, true, span),
            (BinOp::Sub, Pointer, Pointer) => {
                if lhs.ty != rhs.ty {
                    return Err(CoreError::type_error(
                        "subtraction of pointers: must be same type",
                        span,
                    ));
                }
                let elem_size = lhs.ty.subtype().map_or(1, |t| t.size().max(1));
                return Ok(HirExpr::new(
                    HirExprKind::PtrDiff {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        elem_size,
                    },
                    Type::ssize_type(self.cfg),
                    span,
                ));
            }
            (BinOp::Shl | BinOp::Shr, _, _) => {
                if !lhs.ty.is_integer() || !rhs.ty.is_integer() {
                    return Err(CoreError::type_error("invalid types for shift", span));
                }
                let ty = lhs.ty.normalised();
                let plan = CastPlan::check(&rhs.ty, &ty, self.cfg, span)?;
                let rhs = rhs.cast(plan, ty.clone());
                let lhs = lhs.cast(CastPlan::Identity, ty.clone());
                return Ok(arith(op, lhs, rhs, ty, span));
            }
            _ => {}
        }

        let message = match op {
            BinOp::Add => "invalid types for addition",
            BinOp::Sub => "invalid types for subtraction",
            BinOp::Mul => "invalid types for multiplication",
            BinOp::Div => "invalid types for division",
            BinOp::Mod | BinOp::Rem => "invalid types for modulo",
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => "invalid types for bitwise op",
            _ => "invalid types for compare",
        };
        let numeric = lhs.ty.is_numeric() && rhs.ty.is_numeric();
        let both_bool = le == Bool && re == Bool;
        let (lhs, rhs, ty) = match op {
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor if both_bool => {
                (lhs, rhs, Type::bool())
            }
            _ if op.is_comparison() && both_bool => {
                if !matches!(op, BinOp::Eq | BinOp::Ne) {
                    return Err(CoreError::type_error("invalid comparison for type 'bool'", span));
                }
                (lhs, rhs, Type::bool())
            }
            _ if numeric => self.arith_pair(lhs, rhs, span)?,
            _ => return Err(CoreError::type_error(message, span)),
        };

        if op.is_comparison() {
            return Ok(compare(op, lhs, rhs, ty, span));
        }
        match op {
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor if ty.encoding() == Float => {
                Err(CoreError::type_error(message, span))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Rem
            | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => Ok(arith(op, lhs, rhs, ty, span)),
            other => unreachable!("{} is not a built-in arithmetic operator", other.symbol()),
        }
    }

    /// `ptr + n` / `ptr - n`
    fn offset(&self, ptr: HirExpr, index: HirExpr, negate: bool, span: Span) -> CoreResult<HirExpr> {
        let index = self.pointer_index(index, span)?;
        let ty = ptr.ty.normalised();
        Ok(HirExpr::new(
            HirExprKind::Offset {
                ptr: Box::new(ptr),
                index: Box::new(index),
                negate,
            },
            ty,
            span,
        ))
    }

    /// Widen an integer used to move a pointer to `size`/`ssize`.
    fn pointer_index(&self, index: HirExpr, span: Span) -> CoreResult<HirExpr> {
        if index.ty.literal().is_none() && index.ty.size() > self.cfg.pointer_bytes() {
            return Err(CoreError::type_error("cannot add pointer to wider integer", span));
        }
        let dst = match index.ty.encoding() {
            Encoding::SInt => Type::ssize_type(self.cfg),
            _ => Type::size_type(self.cfg),
        };
        let plan = CastPlan::check(&index.ty, &dst, self.cfg, span)?;
        Ok(index.cast(plan, dst))
    }

    fn ref_compare(&mut self, op: BinOp, lhs: HirExpr, rhs: HirExpr, span: Span) -> CoreResult<HirExpr> {
        use Encoding::*;

        let cmp = if op == BinOp::RefEq { BinOp::Eq } else { BinOp::Ne };
        let (le, re) = (lhs.ty.encoding(), rhs.ty.encoding());
        match (le, re) {
            (Pointer | Array, Pointer | Array) if lhs.ty == rhs.ty => {
                let ty = lhs.ty.normalised();
                Ok(compare(cmp, lhs, rhs, ty, span))
            }
            (Pointer | Array, Null) => {
                let ty = lhs.ty.normalised();
                let rhs = implicit(rhs, &ty);
                Ok(compare(cmp, lhs, rhs, ty, span))
            }
            (Null, Pointer | Array) => {
                let ty = rhs.ty.normalised();
                let lhs = implicit(lhs, &ty);
                Ok(compare(cmp, lhs, rhs, ty, span))
            }
            (Object, _) | (_, Object) => Err(CoreError::type_error(
                "unimplemented: by-reference comparison of objects",
                span,
            )),
            (SInt | UInt | Float | Bool, SInt | UInt | Float | Bool) => {
                self.warn("by-reference comparison of primitives", span);
                if le == Bool && re == Bool {
                    return Ok(compare(cmp, lhs, rhs, Type::bool(), span));
                }
                let (lhs, rhs, ty) = self.arith_pair(lhs, rhs, span)?;
                Ok(compare(cmp, lhs, rhs, ty, span))
            }
            _ => Err(CoreError::type_error("invalid types for compare", span)),
        }
    }

    fn check_compound(
        &mut self,
        op: BinOp,
        base: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> CoreResult<HirExpr> {
        let (place, ty) = self.check_place(lhs, true)?;
        let ty = ty.not_const();
        let rhs = self.check_value(rhs)?;

        match self.builtin_update(base, &ty, rhs.clone(), span) {
            Ok(update) => Ok(HirExpr::new(HirExprKind::Update { place, update }, ty, span)),
            Err(err) => {
                let target = HirExpr::new(HirExprKind::Address(place), ty.pointer(self.cfg), span);
                self.overload_or(err, op.symbol(), vec![target, rhs], span)
            }
        }
    }

    /// `place op= rhs` without overloads.
    fn builtin_update(&self, base: BinOp, ty: &Type, rhs: HirExpr, span: Span) -> CoreResult<HirUpdate> {
        use Encoding::*;

        let bitwise = matches!(base, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor);
        match (base, ty.encoding(), rhs.ty.encoding()) {
            (BinOp::Add | BinOp::Sub, Pointer, SInt | UInt) => {
                return Ok(HirUpdate::Offset {
                    index: Box::new(self.pointer_index(rhs, span)?),
                    negate: base == BinOp::Sub,
                });
            }
            (BinOp::Add, SInt | UInt, Pointer) => {
                return Err(CoreError::type_error(
                    "cannot assign-add int+ptr (changes type)",
                    span,
                ));
            }
            (BinOp::Shl | BinOp::Shr, SInt | UInt, SInt | UInt) => {
                let plan = CastPlan::check(&rhs.ty, ty, self.cfg, span)?;
                return Ok(HirUpdate::Arith {
                    op: base,
                    rhs: Box::new(rhs.cast(plan, ty.clone())),
                });
            }
            (BinOp::Shl | BinOp::Shr, _, _) => {
                return Err(CoreError::type_error("invalid types for shift", span));
            }
            _ => {}
        }

        let legal = match ty.encoding() {
            SInt | UInt => true,
            Float => !bitwise,
            Bool => bitwise,
            _ => false,
        };
        if !legal {
            let message = match base {
                BinOp::Add => "invalid types for addition",
                BinOp::Sub => "invalid types for subtraction",
                BinOp::Mul => "invalid types for multiplication",
                BinOp::Div => "invalid types for division",
                BinOp::Mod | BinOp::Rem => "invalid types for modulo",
                _ => "invalid types for bitwise op",
            };
            return Err(CoreError::type_error(message, span));
        }
        Ok(HirUpdate::Arith {
            op: base,
            rhs: Box::new(self.coerce(rhs, ty)?),
        })
    }

    fn check_cast(&mut self, value: &Expr, ty: &Expr, span: Span) -> CoreResult<HirExpr> {
        let ExprKind::TypeValue(ty) = &ty.kind else {
            return Err(CoreError::expected("type name", ty.span));
        };
        let value = self.check_value(value)?;
        let dst = ty.normalised();
        let plan = CastPlan::check(&value.ty, &dst, self.cfg, span)?;
        Ok(value.cast(plan, dst))
    }

    fn check_member(&mut self, base: &Expr, member: &Expr, span: Span) -> CoreResult<HirExpr> {
        let ExprKind::Name(name) = &member.kind else {
            return Err(CoreError::expected("member name", member.span));
        };
        let value = self.check_value(base)?;
        match value.ty.encoding() {
            Encoding::Array if name == "length" => Ok(HirExpr::new(
                HirExprKind::Length(Box::new(value)),
                Type::size_type(self.cfg),
                span,
            )),
            Encoding::Array => Err(CoreError::name_error(
                format!("array has no member '{name}'"),
                member.span,
            )),
            _ => Err(CoreError::type_error(
                format!("unimplemented: member access on {}", value.ty),
                span,
            )),
        }
    }

    fn check_ternary(&mut self, cond: &Expr, arms: &Expr, span: Span) -> CoreResult<HirExpr> {
        let ExprKind::Binary {
            op: BinOp::Colon,
            lhs: then,
            rhs: otherwise,
        } = &arms.kind
        else {
            return Err(CoreError::unexpected(":", span));
        };
        let cond = self.check_value(cond)?;
        let cond = self.to_bool(cond)?;
        let then = self.check_value(then)?;
        let otherwise = self.check_value(otherwise)?;
        let (then, otherwise, ty) = if then.ty == otherwise.ty {
            let ty = then.ty.normalised();
            (implicit(then, &ty), implicit(otherwise, &ty), ty)
        } else if then.ty.is_null() {
            let ty = otherwise.ty.normalised();
            (self.coerce(then, &ty)?, implicit(otherwise, &ty), ty)
        } else if otherwise.ty.is_null() {
            let ty = then.ty.normalised();
            (implicit(then, &ty), self.coerce(otherwise, &ty)?, ty)
        } else {
            self.arith_pair(then, otherwise, span)?
        };
        Ok(HirExpr::new(
            HirExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            ty,
            span,
        ))
    }

    fn check_assign(&mut self, lhs: &Expr, rhs: &Expr, span: Span) -> CoreResult<HirExpr> {
        let dests = lhs.comma_items();
        let sources = rhs.comma_items();

        if let ([call], true) = (sources.as_slice(), dests.len() > 1) {
            if let ExprKind::Call { .. } = call.kind {
                let value = self.check_expr(call)?;
                if let HirExprKind::Call { returns, .. } = &value.kind {
                    if returns.len() > 1 {
                        let returns = returns.clone();
                        return self.assign_call(value, returns, &dests, span);
                    }
                }
                return self.assign_pairs(&dests, vec![value], span);
            }
        }

        let mut values = Vec::new();
        for source in &sources {
            values.push(self.check_value(source)?);
        }
        self.assign_pairs(&dests, values, span)
    }

    fn warn_asymmetric(&mut self, dests: usize, sources: usize, span: Span) {
        if dests != sources {
            self.warn(
                "multiple assign is not symmetric; only matching pairs will be assigned",
                span,
            );
        }
    }

    fn assign_pairs(&mut self, dests: &[&Expr], values: Vec<HirExpr>, span: Span) -> CoreResult<HirExpr> {
        self.warn_asymmetric(dests.len(), values.len(), span);
        if let Some(void) = values.iter().find(|v| v.is_void_call()) {
            return Err(CoreError::type_error("void function used as a value", void.span));
        }
        let mut pairs = Vec::new();
        let mut result = None;
        for (dest, value) in dests.iter().zip(values) {
            let (place, ty) = self.check_place(dest, true)?;
            let ty = ty.not_const();
            let value = self.coerce(value, &ty)?;
            result.get_or_insert(ty);
            pairs.push((place, value));
        }
        let ty = result.unwrap_or_else(Type::null);
        Ok(HirExpr::new(HirExprKind::Assign(pairs), ty, span))
    }

    fn assign_call(
        &mut self,
        call: HirExpr,
        returns: Vec<Type>,
        dests: &[&Expr],
        span: Span,
    ) -> CoreResult<HirExpr> {
        self.warn_asymmetric(dests.len(), returns.len(), span);
        let mut targets = Vec::new();
        let mut result = None;
        for (dest, from) in dests.iter().zip(&returns) {
            if let ExprKind::Null = dest.kind {
                targets.push(None);
                continue;
            }
            let (place, ty) = self.check_place(dest, true)?;
            let ty = ty.not_const();
            check_coerce(from, &ty, dest.span)?;
            result.get_or_insert(ty.clone());
            targets.push(Some(HirTarget {
                place,
                plan: CastPlan::implicit(from, &ty),
                ty,
                from: from.clone(),
            }));
        }
        let ty = result.unwrap_or_else(Type::null);
        Ok(HirExpr::new(
            HirExprKind::AssignCall {
                call: Box::new(call),
                targets,
            },
            ty,
            span,
        ))
    }
}

/// Convert with a plan already known to be legal.
fn implicit(value: HirExpr, dst: &Type) -> HirExpr {
    let plan = CastPlan::implicit(&value.ty, dst);
    value.cast(plan, dst.normalised())
}

fn arith(op: BinOp, lhs: HirExpr, rhs: HirExpr, ty: Type, span: Span) -> HirExpr {
    HirExpr::new(
        HirExprKind::Arith {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
        span,
    )
}

fn compare(op: BinOp, lhs: HirExpr, rhs: HirExpr, operand: Type, span: Span) -> HirExpr {
    HirExpr::new(
        HirExprKind::Compare {
            op,
            operand,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::bool(),
        span,
    )
}

fn int_value(value: BigInt, span: Span) -> CoreResult<HirExpr> {
    let ty = Type::int_literal(value.clone())
        .ok_or_else(|| CoreError::type_error("integer literal too large", span))?;
    Ok(HirExpr::new(HirExprKind::Int(value), ty, span))
}

/// LLVM spelling of a double constant.
pub fn real_constant(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

pub fn bool_constant(value: bool) -> &'static str {
    if value {
        "-1"
    } else {
        "0"
    }
}

/// LLVM zero value of a type.
pub fn zero_constant(ty: &Type) -> String {
    match ty.encoding() {
        Encoding::SInt | Encoding::UInt | Encoding::Bool => "0".to_string(),
        Encoding::Float => "0.0".to_string(),
        Encoding::Pointer | Encoding::Array => "null".to_string(),
        Encoding::Object | Encoding::Null => "zeroinitializer".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::ConvOp;
    use crate::lexer::{lex, TokenStream};
    use crate::parser::parse_unit;
    use crate::span::FileId;
    use pretty_assertions::assert_eq;

    fn check(source: &str) -> CoreResult<(HirModule, Vec<Diagnostic>)> {
        let cfg = Config::default();
        let mut warnings = Vec::new();
        let mut stream = TokenStream::new(lex(FileId(0), source).tokens);
        let unit = parse_unit(&mut stream, &cfg, &mut warnings)?;
        let module = check_units(&[unit], &cfg, &mut warnings)?;
        Ok((module, warnings))
    }

    fn error(source: &str) -> String {
        check(source).map(|_| ()).unwrap_err().message()
    }

    /// Type of the value returned by the first `return` in `f`.
    fn returned(source: &str) -> HirExpr {
        let (module, _) = check(source).expect("check");
        let body = &module.functions[0].body;
        body.iter()
            .find_map(|s| match s {
                HirStmt::Return(values) => values.first().cloned(),
                _ => None,
            })
            .expect("return")
    }

    #[test]
    fn rank_promotion() {
        let value = returned("i32 f (i32 a, u8 b) { return a + b; }");
        assert_eq!(value.ty, Type::int());
        match value.kind {
            HirExprKind::Arith { rhs, .. } => {
                assert!(matches!(rhs.kind, HirExprKind::Cast { .. }));
                assert_eq!(rhs.ty, Type::int());
            }
            other => panic!("{other:?}"),
        }

        let value = returned("double f (float a, double b) { return a + b; }");
        assert_eq!(value.ty, Type::float(8));
    }

    #[test]
    fn literal_ranges() {
        assert!(check("void f () { let x u8: 255; let y u8: 0; }").is_ok());
        assert_eq!(
            error("void f () { let x u8: 256; }"),
            "integer literal outside range for type"
        );
        assert_eq!(
            error("void f () { let x u8: -1; }"),
            "integer literal outside range for type"
        );
    }

    #[test]
    fn sign_and_width_casts() {
        assert_eq!(
            error("u64 f (i8 a) { return a as u64; }"),
            "cannot cast integer in both sign and width;\nsign and width casts are not commutative"
        );
        let value = returned("u64 f (i8 a) { return (a as u8) as u64; }");
        assert_eq!(value.ty, Type::uint(8));
    }

    #[test]
    fn widen_then_change_sign() {
        let value = returned("u64 f (i8 a) { return (a as i64) as u64; }");
        assert_eq!(value.ty, Type::uint(8));
        match &value.kind {
            HirExprKind::Cast { value: inner, plan } => {
                assert_eq!(*plan, CastPlan::Reinterpret);
                assert_eq!(inner.ty, Type::sint(8));
                match &inner.kind {
                    HirExprKind::Cast { plan, .. } => {
                        assert_eq!(*plan, CastPlan::Convert(ConvOp::Sext));
                    }
                    other => panic!("{other:?}"),
                }
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn overload_fallback() {
        let source = "point + (point a, point b) { return a; }\n\
                      point f (point a, point b) { return a + b; }";
        let (module, _) = check(source).unwrap();
        let body = &module.functions[1].body;
        match &body[0] {
            HirStmt::Return(values) => match &values[0].kind {
                HirExprKind::Call { symbol, .. } => {
                    assert_eq!(symbol, "$OGOpoint$Z$Opoint$ZOpoint$Z");
                }
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }

        assert_eq!(
            error("bool f (bool a, i32 b) { return a + b; }"),
            "invalid types for addition"
        );
    }

    #[test]
    fn loop_levels() {
        assert!(check("void f () { while (true) { while (true) { break 2; } } }").is_ok());
        assert_eq!(
            error("void f () { while (true) { while (true) { break 3; } } }"),
            "cannot find 3 levels to break from"
        );
        assert_eq!(
            error("void f () { continue; }"),
            "cannot find 1 level to continue from"
        );
    }

    #[test]
    fn assignment_rules() {
        assert_eq!(
            error("void f () { const c = 1; c := 2; }"),
            "cannot assign to constant"
        );
        assert_eq!(error("void f () { 1 := 2; }"), "cannot assign to expression");
        let (_, warnings) = check("void f () { let a = 1, b = 2; a, b := 3; }").unwrap();
        assert_eq!(
            warnings[0].message,
            "multiple assign is not symmetric; only matching pairs will be assigned"
        );
        assert_eq!(
            error("void f () { let a = 1; a = 2; }"),
            "unexpected: =; use := for assignment or == for comparison"
        );
    }

    #[test]
    fn multi_return_assignment() {
        let source = "(i32, bool) pair () { return 1, true; }\n\
                      void f () { let a = 0, b = false; a, b := pair(); null, b := pair(); }";
        let (module, _) = check(source).unwrap();
        let body = &module.functions[1].body;
        match &body[2] {
            HirStmt::Expr(HirExpr {
                kind: HirExprKind::AssignCall { targets, .. },
                ..
            }) => assert_eq!(targets.len(), 2),
            other => panic!("{other:?}"),
        }
        match &body[3] {
            HirStmt::Expr(HirExpr {
                kind: HirExprKind::AssignCall { targets, .. },
                ..
            }) => assert!(targets[0].is_none()),
            other => panic!("{other:?}"),
        }
        assert_eq!(
            error("(i32, bool) pair () { return 1; }"),
            "wrong number of return values"
        );
    }

    #[test]
    fn operator_errors() {
        assert_eq!(
            error("u8 f (u8 a) { return -a; }"),
            "negation of unsigned integer"
        );
        assert_eq!(
            error("bool f (bool a) { return ~a; }"),
            "invalid type for complement"
        );
        assert_eq!(
            error("bool f (bool a, bool b) { return a < b; }"),
            "invalid comparison for type 'bool'"
        );
        assert_eq!(
            error("i32 f (i32 a, i32 b) { return a, b; }"),
            "wrong number of return values"
        );
        assert_eq!(
            error("i32 f (i32 a) { return *a; }"),
            "cannot dereference non-pointer"
        );
        assert_eq!(
            error("ssize f (i32* a, u8* b) { return a - b; }"),
            "subtraction of pointers: must be same type"
        );
        assert_eq!(
            error("void f (i32 a, i32* p) { a += p; }"),
            "cannot assign-add int+ptr (changes type)"
        );
    }

    #[test]
    fn by_reference_compare_of_primitives_warns() {
        let (_, warnings) = check("bool f (i32 a, i32 b) { return a === b; }").unwrap();
        assert_eq!(warnings[0].message, "by-reference comparison of primitives");
        let (_, warnings) = check("bool f (i32* a) { return a === null; }").unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn calls_resolve_by_level() {
        let source = "extern void puts (u8*);\n\
                      i32 add (i32 a, i32 b) { return a + b; }\n\
                      i64 add (i64 a, i64 b) { return a + b; }\n\
                      i32 f (i16 x) { return add(x, x); }";
        let err = check(source).unwrap_err();
        assert!(err.message().starts_with("ambiguous call: add (i16, i16)"), "{err}");

        let value = returned(
            "i32 add (i32 a, i32 b) { return a + b; }\n\
             i32 f () { return add(1, 2); }",
        );
        assert_eq!(value.ty, Type::int());
    }

    #[test]
    fn statics_need_literals() {
        let (module, _) = check("i32 f () { static n = 5; return n; }").unwrap();
        assert_eq!(module.statics[0].name, "@0");
        assert_eq!(module.statics[0].init, "5");
        assert_eq!(
            error("i32 f (i32 a) { static n = a; return n; }"),
            "static variable default must be primitive literal or null"
        );
        assert_eq!(
            error("void f () { static n u8 = 300; }"),
            "invalid integer value for type"
        );
    }
}
