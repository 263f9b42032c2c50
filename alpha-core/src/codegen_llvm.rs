//! LLVM lowering of checked HIR.
//!
//! Everything that can go wrong has been reported by the checker, so
//! lowering is infallible; a malformed HIR tree is a bug and panics.
//!
//! Conventions of the emitted code:
//!
//! * `bool` is an `i8` holding `0` or `-1`; conditions are tested with
//!   `icmp ne i8 %c, 0`.
//! * An array value is an `i8*` to a header `{ size len, size data }`,
//!   where `data` is the element buffer's address as an integer.
//! * Parameters arrive as `%.0`, `%.1`, ... and are spilled to named stack
//!   slots. Returns after the first are written through `%.retN`
//!   out-pointers placed before the parameters.

use tracing::debug;

use crate::cast::{fold_double_to_float, CastPlan, ConvOp};
use crate::config::Config;
use crate::hir::{
    HirExpr, HirExprKind, HirFunction, HirModule, HirNew, HirPlace, HirStmt, HirTarget, HirUpdate,
};
use crate::ir::{BlockId, FunctionBuilder, Inst, ModuleBuilder, Value};
use crate::operators::BinOp;
use crate::span::Span;
use crate::typecheck::{bool_constant, zero_constant};
use crate::types::{Encoding, Type};

/// Lower a checked module to LLVM assembly text.
pub fn lower_module(module: &HirModule, cfg: &Config, module_id: &str) -> String {
    let mut out = ModuleBuilder::new();

    for ext in &module.externs {
        let ret = ext.returns.first().map_or_else(|| "void".to_string(), Type::llvm_name);
        let params: Vec<String> = ext.params.iter().map(Type::llvm_name).collect();
        out.declare(
            &ext.symbol,
            format!("declare {ret} @{}({})", ext.symbol, params.join(", ")),
        );
    }
    for global in &module.statics {
        out.add_global(format!(
            "{} = internal global {} {}",
            global.name,
            global.ty.llvm_name(),
            global.init
        ));
    }
    for func in &module.functions {
        let text = lower_function(&mut out, cfg, module, func);
        out.add_function(text);
    }
    out.render(module_id)
}

fn lower_function(
    out: &mut ModuleBuilder,
    cfg: &Config,
    module: &HirModule,
    func: &HirFunction,
) -> String {
    debug!(function = %func.symbol, "lowering function");
    let ret = func.returns.first().map_or_else(|| "void".to_string(), Type::llvm_name);
    let mut params = Vec::new();
    for (i, ty) in func.returns.iter().enumerate().skip(1) {
        params.push((format!("{}*", ty.llvm_name()), format!("%.ret{i}")));
    }
    for (i, param) in func.params.iter().enumerate() {
        params.push((param.ty.llvm_name(), format!("%.{i}")));
    }

    let mut lowering = Lowering {
        cfg,
        module: out,
        handle_oom: module.handle_oom,
        handle_oob: module.handle_oob,
        f: FunctionBuilder::new(func.symbol.clone(), ret, params),
        loops: Vec::new(),
    };
    for (i, param) in func.params.iter().enumerate() {
        let ty = param.ty.llvm_name();
        let slot = lowering.f.entry_alloca(ty.clone(), Some(param.slot.clone()));
        lowering.store(&ty, Value::named(format!("%.{i}")), slot, false);
    }
    lowering.stmts(&func.body);
    debug!(function = %func.symbol, "function lowered");
    lowering.f.finish()
}

/// Jump targets of an enclosing loop.
#[derive(Debug, Clone, Copy)]
struct LoopTarget {
    /// `continue`
    next: BlockId,
    /// `break`
    exit: BlockId,
}

struct Lowering<'a> {
    cfg: &'a Config,
    module: &'a mut ModuleBuilder,
    handle_oom: bool,
    handle_oob: bool,
    f: FunctionBuilder,
    /// Innermost loop last.
    loops: Vec<LoopTarget>,
}

impl<'a> Lowering<'a> {
    // ---------------------------------------------------------------
    // Emission helpers
    // ---------------------------------------------------------------

    fn size(&self) -> String {
        self.cfg.size_llvm()
    }

    fn block(&mut self) -> BlockId {
        self.f.new_block(&mut self.module.counter)
    }

    fn binary(&mut self, op: &str, ty: &str, lhs: Value, rhs: Value) -> Value {
        self.f.push(Inst::Binary {
            op: op.to_string(),
            ty: ty.to_string(),
            lhs,
            rhs,
        })
    }

    fn convert(&mut self, op: ConvOp, from: &str, value: Value, to: &str) -> Value {
        self.f.push(Inst::Convert {
            op,
            from: from.to_string(),
            value,
            to: to.to_string(),
        })
    }

    fn load(&mut self, ty: &str, ptr: Value, volatile: bool) -> Value {
        self.f.push(Inst::Load {
            ty: ty.to_string(),
            ptr,
            volatile,
        })
    }

    fn store(&mut self, ty: &str, value: Value, ptr: Value, volatile: bool) {
        self.f.push(Inst::Store {
            ty: ty.to_string(),
            value,
            ptr,
            volatile,
        });
    }

    fn gep(&mut self, elem: &str, ptr: Value, indices: Vec<(String, Value)>) -> Value {
        self.f.push(Inst::Gep {
            elem: elem.to_string(),
            ptr,
            indices,
        })
    }

    /// `i1` -> `bool`
    fn widen_flag(&mut self, flag: Value) -> Value {
        self.convert(ConvOp::Sext, "i1", flag, "i8")
    }

    /// `bool` -> `i1`
    fn test_flag(&mut self, value: Value) -> Value {
        self.binary("icmp ne", "i8", value, Value::constant("0"))
    }

    fn branch_on(&mut self, cond: &HirExpr, then: BlockId, otherwise: BlockId) {
        let value = self.expr(cond);
        let flag = self.test_flag(value);
        self.f.push(Inst::CondBr {
            cond: flag,
            then,
            otherwise,
        });
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn stmts(&mut self, stmts: &[HirStmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &HirStmt) {
        match stmt {
            HirStmt::Expr(expr) => {
                self.expr(expr);
            }
            HirStmt::Local { slot, ty, value } => {
                let llvm = ty.llvm_name();
                let ptr = self.f.entry_alloca(llvm.clone(), Some(slot.clone()));
                let value = self.expr(value);
                self.store(&llvm, value, ptr, ty.is_volatile());
            }
            HirStmt::If {
                cond,
                then,
                otherwise,
            } => {
                let on_true = self.block();
                let on_false = self.block();
                let end = match otherwise {
                    Some(_) => self.block(),
                    None => on_false,
                };
                self.branch_on(cond, on_true, on_false);

                self.f.position_at(on_true);
                self.stmts(then);
                self.f.br_if_open(end);

                if let Some(otherwise) = otherwise {
                    self.f.position_at(on_false);
                    self.stmts(otherwise);
                    self.f.br_if_open(end);
                }
                self.f.position_at(end);
            }
            HirStmt::While { cond, body } => {
                let top = self.block();
                let inner = self.block();
                let bottom = self.block();

                self.f.br(top);
                self.f.position_at(top);
                self.branch_on(cond, inner, bottom);
                self.f.position_at(inner);
                self.loop_body(body, top, bottom);
                self.f.br_if_open(top);
                self.f.position_at(bottom);
            }
            HirStmt::DoWhile { body, cond } => {
                let inner = self.block();
                let test = self.block();
                let bottom = self.block();

                self.f.br(inner);
                self.f.position_at(inner);
                self.loop_body(body, test, bottom);
                self.f.br_if_open(test);
                self.f.position_at(test);
                self.branch_on(cond, inner, bottom);
                self.f.position_at(bottom);
            }
            HirStmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let test = self.block();
                let inner = self.block();
                let next = self.block();
                let bottom = self.block();

                self.stmts(init);
                self.f.br(test);
                self.f.position_at(test);
                match cond {
                    Some(cond) => self.branch_on(cond, inner, bottom),
                    None => self.f.br(inner),
                }
                self.f.position_at(inner);
                self.loop_body(body, next, bottom);
                self.f.br_if_open(next);
                self.f.position_at(next);
                if let Some(step) = step {
                    self.expr(step);
                }
                self.f.br(test);
                self.f.position_at(bottom);
            }
            HirStmt::Break(levels) => {
                let target = self.enclosing(*levels).exit;
                self.f.br(target);
            }
            HirStmt::Continue(levels) => {
                let target = self.enclosing(*levels).next;
                self.f.br(target);
            }
            HirStmt::Return(values) => match values.split_first() {
                None => {
                    self.f.push(Inst::Ret(None));
                }
                Some((first, rest)) => {
                    let value = self.expr(first);
                    for (i, extra) in rest.iter().enumerate() {
                        let ty = extra.ty.llvm_name();
                        let v = self.expr(extra);
                        self.store(&ty, v, Value::named(format!("%.ret{}", i + 1)), false);
                    }
                    self.f.push(Inst::Ret(Some((first.ty.llvm_name(), value))));
                }
            },
            HirStmt::Delete(values) => {
                let free = self.cfg.free.clone();
                self.module
                    .declare(&free, format!("declare void @{free}(i8*)"));
                for value in values {
                    let ptr = self.expr(value);
                    let raw = self.convert(ConvOp::Bitcast, &value.ty.llvm_name(), ptr, "i8*");
                    self.f.push(Inst::Call {
                        ret: "void".to_string(),
                        callee: format!("@{free}"),
                        args: vec![("i8*".to_string(), raw)],
                    });
                }
            }
            HirStmt::Block(stmts) => self.stmts(stmts),
        }
    }

    fn loop_body(&mut self, body: &[HirStmt], next: BlockId, exit: BlockId) {
        self.loops.push(LoopTarget { next, exit });
        self.stmts(body);
        self.loops.pop();
    }

    fn enclosing(&self, levels: u32) -> LoopTarget {
        let depth = self.loops.len();
        let levels = levels as usize;
        assert!(
            levels >= 1 && levels <= depth,
            "loop level {levels} escaped the checker (depth {depth})"
        );
        self.loops[depth - levels]
    }

    // ---------------------------------------------------------------
    // Places
    // ---------------------------------------------------------------

    /// Address of a place and whether accesses through it are volatile.
    fn place(&mut self, place: &HirPlace) -> (Value, bool) {
        match place {
            HirPlace::Slot { name, volatile } => (Value::named(name.clone()), *volatile),
            HirPlace::Deref(ptr) => {
                let volatile = ptr.ty.subtype().is_some_and(Type::is_volatile);
                (self.expr(ptr), volatile)
            }
            HirPlace::Index { array, index } => {
                let volatile = array.ty.subtype().is_some_and(Type::is_volatile);
                (self.element(array, index), volatile)
            }
        }
    }

    /// Bitcast an array handle to a pointer at its header words.
    fn header(&mut self, array: Value) -> Value {
        let size = self.size();
        self.convert(ConvOp::Bitcast, "i8*", array, &format!("{size}*"))
    }

    /// Pointer to `array[index]`, with null and bounds checks when enabled.
    fn element(&mut self, array: &HirExpr, index: &HirExpr) -> Value {
        let size = self.size();
        let elem = array
            .ty
            .subtype()
            .map(Type::llvm_name)
            .unwrap_or_else(|| panic!("indexing non-array {}", array.ty));
        let handle = self.expr(array);
        let idx = self.expr(index);
        let header = self.header(handle);

        if self.cfg.bound_check {
            let check = self.block();
            let bad = self.block();
            let good = self.block();

            let is_null = self.binary(
                "icmp eq",
                &format!("{size}*"),
                header.clone(),
                Value::constant("null"),
            );
            self.f.push(Inst::CondBr {
                cond: is_null,
                then: bad,
                otherwise: check,
            });

            self.f.position_at(check);
            let len = self.load(&size, header.clone(), false);
            let in_bounds = self.binary("icmp ult", &size, idx.clone(), len);
            self.f.push(Inst::CondBr {
                cond: in_bounds,
                then: good,
                otherwise: bad,
            });

            self.f.position_at(bad);
            self.out_of_bounds(index.span);
            self.f.position_at(good);
        }

        let field = self.gep(&size, header, vec![(size.clone(), Value::constant("1"))]);
        let data = self.load(&size, field, false);
        let base = self.convert(ConvOp::IntToPtr, &size, data, &format!("{elem}*"));
        self.gep(&elem, base, vec![(size, idx)])
    }

    fn out_of_bounds(&mut self, span: Span) {
        self.module.declare(
            "$$oobmsg",
            "declare void @$$oobmsg(i32, i32, void (i32, i32)*)",
        );
        let handler = if self.handle_oob { "@$$bounds" } else { "null" };
        self.f.push(Inst::Call {
            ret: "void".to_string(),
            callee: "@$$oobmsg".to_string(),
            args: vec![
                ("i32".to_string(), Value::constant(span.line_number().to_string())),
                ("i32".to_string(), Value::constant(span.column_number().to_string())),
                ("void (i32, i32)*".to_string(), Value::constant(handler)),
            ],
        });
        self.f.push(Inst::Unreachable);
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn expr(&mut self, expr: &HirExpr) -> Value {
        let ty = expr.ty.llvm_name();
        match &expr.kind {
            HirExprKind::Int(value) => Value::constant(value.to_string()),
            HirExprKind::Real(text) => Value::constant(text.clone()),
            HirExprKind::Bool(value) => Value::constant(bool_constant(*value)),
            HirExprKind::Null => Value::constant("null"),
            HirExprKind::Str(bytes) => self.string(bytes),
            HirExprKind::Array(items) => self.array_literal(items, &expr.ty),
            HirExprKind::Load(place) => {
                let (ptr, volatile) = self.place(place);
                self.load(&ty, ptr, volatile)
            }
            HirExprKind::Address(place) => self.place(place).0,
            HirExprKind::Length(array) => {
                let handle = self.expr(array);
                let header = self.header(handle);
                let size = self.size();
                self.load(&size, header, false)
            }
            HirExprKind::Cast { value, plan } => {
                let v = self.expr(value);
                self.cast(v, *plan, &value.ty, &expr.ty)
            }
            HirExprKind::Arith { op, lhs, rhs } => {
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                self.arith(*op, &expr.ty, l, r)
            }
            HirExprKind::Compare {
                op,
                operand,
                lhs,
                rhs,
            } => {
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                self.compare(*op, operand, l, r)
            }
            HirExprKind::Offset { ptr, index, negate } => {
                let p = self.expr(ptr);
                let i = self.expr(index);
                self.offset(&ptr.ty, p, &index.ty, i, *negate)
            }
            HirExprKind::PtrDiff {
                lhs,
                rhs,
                elem_size,
            } => {
                let size = self.size();
                let l = self.expr(lhs);
                let l = self.convert(ConvOp::PtrToInt, &lhs.ty.llvm_name(), l, &size);
                let r = self.expr(rhs);
                let r = self.convert(ConvOp::PtrToInt, &rhs.ty.llvm_name(), r, &size);
                let bytes = self.binary("sub", &size, l, r);
                self.binary("sdiv", &size, bytes, Value::constant(elem_size.to_string()))
            }
            HirExprKind::Logical { and, lhs, rhs } => self.logical(*and, lhs, rhs),
            HirExprKind::Not(value) => {
                let v = self.expr(value);
                self.binary("xor", "i8", v, Value::constant("-1"))
            }
            HirExprKind::Neg(value) => {
                let v = self.expr(value);
                if expr.ty.encoding() == Encoding::Float {
                    self.binary("fsub", &ty, Value::constant("-0.0"), v)
                } else {
                    self.binary("sub", &ty, Value::constant("0"), v)
                }
            }
            HirExprKind::Compl(value) => {
                let v = self.expr(value);
                self.binary("xor", &ty, v, Value::constant("-1"))
            }
            HirExprKind::Update { place, update } => {
                let (ptr, volatile) = self.place(place);
                let old = self.load(&ty, ptr.clone(), volatile);
                let new = match update {
                    HirUpdate::Arith { op, rhs } => {
                        let r = self.expr(rhs);
                        self.arith(*op, &expr.ty, old, r)
                    }
                    HirUpdate::Offset { index, negate } => {
                        let i = self.expr(index);
                        self.offset(&expr.ty, old, &index.ty, i, *negate)
                    }
                };
                self.store(&ty, new.clone(), ptr, volatile);
                new
            }
            HirExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.ternary(cond, then, otherwise, &ty),
            HirExprKind::New(new) => self.new_value(new, expr.span),
            HirExprKind::Call {
                symbol,
                args,
                returns,
            } => {
                let args = self.args(args);
                let outs = returns
                    .iter()
                    .skip(1)
                    .map(|ret| self.f.entry_alloca(ret.llvm_name(), None))
                    .collect();
                self.call(symbol, returns, outs, args)
            }
            HirExprKind::Assign(pairs) => {
                // Every source is read before any destination is written,
                // so `a, b := b, a` swaps.
                let values: Vec<Value> = pairs.iter().map(|(_, value)| self.expr(value)).collect();
                let places: Vec<(Value, bool)> =
                    pairs.iter().map(|(place, _)| self.place(place)).collect();
                for (((_, value), v), (ptr, volatile)) in pairs.iter().zip(&values).zip(places) {
                    self.store(&value.ty.llvm_name(), v.clone(), ptr, volatile);
                }
                values
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Value::constant("undef"))
            }
            HirExprKind::AssignCall { call, targets } => self.assign_call(call, targets),
        }
    }

    fn args(&mut self, args: &[HirExpr]) -> Vec<(String, Value)> {
        args.iter()
            .map(|arg| {
                let v = self.expr(arg);
                (arg.ty.llvm_name(), v)
            })
            .collect()
    }

    fn call(
        &mut self,
        symbol: &str,
        returns: &[Type],
        outs: Vec<Value>,
        args: Vec<(String, Value)>,
    ) -> Value {
        let ret = returns.first().map_or_else(|| "void".to_string(), Type::llvm_name);
        let mut all: Vec<(String, Value)> = returns
            .iter()
            .skip(1)
            .zip(outs)
            .map(|(ty, ptr)| (format!("{}*", ty.llvm_name()), ptr))
            .collect();
        all.extend(args);
        self.f.push(Inst::Call {
            ret,
            callee: format!("@{symbol}"),
            args: all,
        })
    }

    /// `a, b := f()`: returns after the first land directly in their
    /// destination when no conversion is needed, otherwise in a temporary
    /// that is converted and stored after the call.
    fn assign_call(&mut self, call: &HirExpr, targets: &[Option<HirTarget>]) -> Value {
        let HirExprKind::Call {
            symbol,
            args,
            returns,
        } = &call.kind
        else {
            panic!("multiple assignment from a non-call");
        };

        let dests: Vec<Option<(Value, bool)>> = targets
            .iter()
            .map(|target| target.as_ref().map(|t| self.place(&t.place)))
            .collect();
        let args = self.args(args);

        let mut outs = Vec::new();
        let mut pending = Vec::new();
        for (i, ret) in returns.iter().enumerate().skip(1) {
            let target = targets.get(i).and_then(Option::as_ref);
            let dest = dests.get(i).and_then(Option::as_ref);
            match (target, dest) {
                (Some(t), Some((ptr, false))) if t.plan.is_identity() => outs.push(ptr.clone()),
                (Some(_), Some(_)) => {
                    let tmp = self.f.entry_alloca(ret.llvm_name(), None);
                    pending.push((i, tmp.clone()));
                    outs.push(tmp);
                }
                _ => outs.push(self.f.entry_alloca(ret.llvm_name(), None)),
            }
        }

        let result = self.call(symbol, returns, outs, args);

        if let (Some(Some(target)), Some(Some((ptr, volatile)))) = (targets.first(), dests.first()) {
            let v = self.cast(result.clone(), target.plan, &target.from, &target.ty);
            self.store(&target.ty.llvm_name(), v, ptr.clone(), *volatile);
        }
        for (i, tmp) in pending {
            if let (Some(Some(target)), Some(Some((ptr, volatile)))) = (targets.get(i), dests.get(i)) {
                let raw = self.load(&target.from.llvm_name(), tmp, false);
                let v = self.cast(raw, target.plan, &target.from, &target.ty);
                self.store(&target.ty.llvm_name(), v, ptr.clone(), *volatile);
            }
        }
        result
    }

    fn cast(&mut self, value: Value, plan: CastPlan, from: &Type, to: &Type) -> Value {
        let (src, dst) = (from.llvm_name(), to.llvm_name());
        match plan {
            CastPlan::Identity | CastPlan::Literal | CastPlan::Reinterpret => value,
            CastPlan::Convert(ConvOp::FpTrunc) => {
                if let Value::Const(text) = &value {
                    if let Some(folded) = fold_double_to_float(text) {
                        return Value::Const(folded);
                    }
                }
                self.convert(ConvOp::FpTrunc, &src, value, &dst)
            }
            CastPlan::Convert(op) => self.convert(op, &src, value, &dst),
            CastPlan::IntToBool => {
                let flag = self.binary("icmp ne", &src, value, Value::constant("0"));
                self.widen_flag(flag)
            }
            CastPlan::BoolToInt { extend: true } => self.convert(ConvOp::Sext, "i8", value, &dst),
            CastPlan::BoolToInt { extend: false } => value,
            CastPlan::PtrToBool => {
                let size = self.size();
                let addr = self.convert(ConvOp::PtrToInt, &src, value, &size);
                let flag = self.binary("icmp ne", &size, addr, Value::constant("0"));
                self.widen_flag(flag)
            }
            CastPlan::NullToZero => Value::constant(zero_constant(to)),
        }
    }

    fn arith(&mut self, op: BinOp, ty: &Type, lhs: Value, rhs: Value) -> Value {
        let llvm = ty.llvm_name();
        let pick = |signed: &'static str, unsigned: &'static str, float: &'static str| match ty
            .encoding()
        {
            Encoding::Float => float,
            Encoding::SInt => signed,
            _ => unsigned,
        };
        let rem = pick("srem", "urem", "frem");
        let name = match op {
            BinOp::Add => pick("add", "add", "fadd"),
            BinOp::Sub => pick("sub", "sub", "fsub"),
            BinOp::Mul => pick("mul", "mul", "fmul"),
            BinOp::Div => pick("sdiv", "udiv", "fdiv"),
            BinOp::Rem => rem,
            BinOp::Mod if ty.encoding() == Encoding::UInt => rem,
            BinOp::Mod => {
                // Result takes the sign of the divisor.
                let add = pick("add", "add", "fadd");
                let first = self.binary(rem, &llvm, lhs, rhs.clone());
                let shifted = self.binary(add, &llvm, first, rhs.clone());
                return self.binary(rem, &llvm, shifted, rhs);
            }
            BinOp::BitAnd => "and",
            BinOp::BitOr => "or",
            BinOp::BitXor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => pick("ashr", "lshr", "lshr"),
            other => panic!("{} reached arithmetic lowering", other.symbol()),
        };
        self.binary(name, &llvm, lhs, rhs)
    }

    fn compare(&mut self, op: BinOp, operand: &Type, lhs: Value, rhs: Value) -> Value {
        let llvm = operand.llvm_name();
        let flag = match operand.encoding() {
            Encoding::Bool => {
                let l = self.test_flag(lhs);
                let r = self.test_flag(rhs);
                let pred = if op == BinOp::Eq { "icmp eq" } else { "icmp ne" };
                self.binary(pred, "i1", l, r)
            }
            Encoding::Float => {
                let pred = match op {
                    BinOp::Lt => "fcmp olt",
                    BinOp::Gt => "fcmp ogt",
                    BinOp::Le => "fcmp ole",
                    BinOp::Ge => "fcmp oge",
                    BinOp::Eq => "fcmp oeq",
                    _ => "fcmp one",
                };
                self.binary(pred, &llvm, lhs, rhs)
            }
            encoding => {
                let signed = encoding == Encoding::SInt;
                let pred = match op {
                    BinOp::Lt if signed => "icmp slt",
                    BinOp::Gt if signed => "icmp sgt",
                    BinOp::Le if signed => "icmp sle",
                    BinOp::Ge if signed => "icmp sge",
                    BinOp::Lt => "icmp ult",
                    BinOp::Gt => "icmp ugt",
                    BinOp::Le => "icmp ule",
                    BinOp::Ge => "icmp uge",
                    BinOp::Eq => "icmp eq",
                    _ => "icmp ne",
                };
                self.binary(pred, &llvm, lhs, rhs)
            }
        };
        self.widen_flag(flag)
    }

    fn offset(
        &mut self,
        ptr_ty: &Type,
        ptr: Value,
        index_ty: &Type,
        index: Value,
        negate: bool,
    ) -> Value {
        let elem = ptr_ty
            .subtype()
            .map(Type::llvm_name)
            .unwrap_or_else(|| panic!("offset of non-pointer {ptr_ty}"));
        let index_llvm = index_ty.llvm_name();
        let index = if negate {
            self.binary("sub", &index_llvm, Value::constant("0"), index)
        } else {
            index
        };
        self.gep(&elem, ptr, vec![(index_llvm, index)])
    }

    /// `&&` / `||` with short-circuit and a `phi` merge.
    fn logical(&mut self, and: bool, lhs: &HirExpr, rhs: &HirExpr) -> Value {
        let begin = self.block();
        let rhs_eval = self.block();
        let rhs_end = self.block();
        let out = self.block();

        let l = self.expr(lhs);
        self.f.br(begin);
        self.f.position_at(begin);
        let (default, zero) = if and { (rhs_eval, out) } else { (out, rhs_eval) };
        self.f.push(Inst::Switch {
            ty: "i8".to_string(),
            value: l,
            default,
            cases: vec![("0".to_string(), zero)],
        });

        self.f.position_at(rhs_eval);
        let r = self.expr(rhs);
        self.f.br(rhs_end);
        self.f.position_at(rhs_end);
        self.f.br(out);

        self.f.position_at(out);
        let short = if and { "0" } else { "-1" };
        self.f.push(Inst::Phi {
            ty: "i8".to_string(),
            incoming: vec![(Value::constant(short), begin), (r, rhs_end)],
        })
    }

    fn ternary(&mut self, cond: &HirExpr, then: &HirExpr, otherwise: &HirExpr, ty: &str) -> Value {
        let then_eval = self.block();
        let then_end = self.block();
        let else_eval = self.block();
        let else_end = self.block();
        let out = self.block();

        let c = self.expr(cond);
        self.f.push(Inst::Switch {
            ty: "i8".to_string(),
            value: c,
            default: then_eval,
            cases: vec![("0".to_string(), else_eval)],
        });

        self.f.position_at(then_eval);
        let a = self.expr(then);
        self.f.br(then_end);
        self.f.position_at(then_end);
        self.f.br(out);

        self.f.position_at(else_eval);
        let b = self.expr(otherwise);
        self.f.br(else_end);
        self.f.position_at(else_end);
        self.f.br(out);

        self.f.position_at(out);
        self.f.push(Inst::Phi {
            ty: ty.to_string(),
            incoming: vec![(a, then_end), (b, else_end)],
        })
    }

    // ---------------------------------------------------------------
    // Allocation and aggregate values
    // ---------------------------------------------------------------

    fn malloc(&mut self) -> String {
        let size = self.size();
        let malloc = self.cfg.malloc.clone();
        self.module
            .declare(&malloc, format!("declare i8* @{malloc}({size})"));
        malloc
    }

    fn new_value(&mut self, new: &HirNew, span: Span) -> Value {
        let size = self.size();
        let header_bytes = Value::constant((2 * self.cfg.pointer_bytes()).to_string());
        match new {
            HirNew::Scalar { elem, count } => {
                let count = match count {
                    Some(count) => self.expr(count),
                    None => Value::constant("1"),
                };
                let bytes = self.binary("mul", &size, count, Value::constant(elem.size().to_string()));
                let malloc = self.malloc();
                self.module.declare(
                    "$$new",
                    format!(
                        "declare i8* @$$new({size}, i32, i32, i8 ({size}, i32, i32)*, i8* ({size})*)"
                    ),
                );
                let oom = if self.handle_oom { "@$$oom" } else { "null" };
                let raw = self.f.push(Inst::Call {
                    ret: "i8*".to_string(),
                    callee: "@$$new".to_string(),
                    args: vec![
                        (size.clone(), bytes),
                        ("i32".to_string(), Value::constant(span.line_number().to_string())),
                        ("i32".to_string(), Value::constant(span.column_number().to_string())),
                        (format!("i8 ({size}, i32, i32)*"), Value::constant(oom)),
                        (format!("i8* ({size})*"), Value::constant(format!("@{malloc}"))),
                    ],
                });
                self.convert(ConvOp::Bitcast, "i8*", raw, &format!("{}*", elem.llvm_name()))
            }
            HirNew::Array { elem, len } => {
                let n = self.expr(len);
                let data = self.binary(
                    "mul",
                    &size,
                    n.clone(),
                    Value::constant(elem.size().to_string()),
                );
                let bytes = self.binary("add", &size, data, header_bytes);
                let raw = self.call_malloc(bytes);
                let header = self.header(raw.clone());
                self.store(&size, n, header.clone(), false);
                let start = self.gep(&size, header.clone(), vec![(size.clone(), Value::constant("2"))]);
                let addr = self.convert(ConvOp::PtrToInt, &format!("{size}*"), start, &size);
                let field = self.gep(&size, header, vec![(size.clone(), Value::constant("1"))]);
                self.store(&size, addr, field, false);
                raw
            }
            HirNew::Backed { elem, ptr, len } => {
                let p = self.expr(ptr);
                let n = self.expr(len);
                let raw = self.call_malloc(header_bytes);
                let header = self.header(raw.clone());
                self.store(&size, n, header.clone(), false);
                let addr = self.convert(ConvOp::PtrToInt, &format!("{}*", elem.llvm_name()), p, &size);
                let field = self.gep(&size, header, vec![(size.clone(), Value::constant("1"))]);
                self.store(&size, addr, field, false);
                raw
            }
        }
    }

    fn call_malloc(&mut self, bytes: Value) -> Value {
        let size = self.size();
        let malloc = self.malloc();
        self.f.push(Inst::Call {
            ret: "i8*".to_string(),
            callee: format!("@{malloc}"),
            args: vec![(size, bytes)],
        })
    }

    /// String literal: a private byte array plus a constant header.
    fn string(&mut self, bytes: &[u8]) -> Value {
        let size = self.size();
        let (data, len) = self.module.string_constant(bytes);
        let header = format!("@.arr{}", self.module.counter.next("@.arr"));
        self.module.add_global(format!(
            "{header} = private global {{ {size}, {size} }} {{ {size} {}, {size} ptrtoint ([{len} x i8]* {data} to {size}) }}",
            bytes.len()
        ));
        Value::constant(format!("bitcast ({{ {size}, {size} }}* {header} to i8*)"))
    }

    /// Array literal: elements in a stack buffer, header on the stack.
    fn array_literal(&mut self, items: &[HirExpr], ty: &Type) -> Value {
        let size = self.size();
        let elem = ty
            .subtype()
            .map(Type::llvm_name)
            .unwrap_or_else(|| panic!("array literal of type {ty}"));
        let buffer_ty = format!("[{} x {elem}]", items.len());
        let header_ty = format!("{{ {size}, {size} }}");

        let buffer = self.f.entry_alloca(buffer_ty.clone(), None);
        for (i, item) in items.iter().enumerate() {
            let v = self.expr(item);
            let slot = self.gep(
                &buffer_ty,
                buffer.clone(),
                vec![
                    (size.clone(), Value::constant("0")),
                    (size.clone(), Value::constant(i.to_string())),
                ],
            );
            self.store(&elem, v, slot, false);
        }

        let header = self.f.entry_alloca(header_ty.clone(), None);
        let len_field = self.gep(
            &header_ty,
            header.clone(),
            vec![
                ("i32".to_string(), Value::constant("0")),
                ("i32".to_string(), Value::constant("0")),
            ],
        );
        self.store(&size, Value::constant(items.len().to_string()), len_field, false);
        let addr = self.convert(ConvOp::PtrToInt, &format!("{buffer_ty}*"), buffer, &size);
        let data_field = self.gep(
            &header_ty,
            header.clone(),
            vec![
                ("i32".to_string(), Value::constant("0")),
                ("i32".to_string(), Value::constant("1")),
            ],
        );
        self.store(&size, addr, data_field, false);
        self.convert(ConvOp::Bitcast, &format!("{header_ty}*"), header, "i8*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{lex, TokenStream};
    use crate::parser::parse_unit;
    use crate::span::FileId;
    use crate::typecheck::check_units;
    use pretty_assertions::assert_eq;

    fn lower_with(source: &str, cfg: &Config) -> String {
        let mut warnings = Vec::new();
        let mut stream = TokenStream::new(lex(FileId(0), source).tokens);
        let unit = parse_unit(&mut stream, cfg, &mut warnings).expect("parse");
        let module = check_units(&[unit], cfg, &mut warnings).expect("check");
        lower_module(&module, cfg, "test")
    }

    fn lower(source: &str) -> String {
        lower_with(source, &Config::default())
    }

    /// The definition of `symbol`, up to and including its closing brace.
    fn function<'t>(text: &'t str, symbol: &str) -> &'t str {
        let start = text
            .find(&format!("@{symbol}("))
            .and_then(|at| text[..at].rfind("define"))
            .unwrap_or_else(|| panic!("{symbol} not defined in\n{text}"));
        let end = start + text[start..].find("\n}\n").expect("closing brace") + 3;
        &text[start..end]
    }

    #[test]
    fn let_then_assign() {
        let text = lower("void f () { let x = 5; x := x + 1; }");
        assert_eq!(
            function(&text, "$F4main1f$"),
            "define void @$F4main1f$() {\n  \
             %x = alloca i32\n  \
             store i32 5, i32* %x\n  \
             %1 = load i32, i32* %x\n  \
             %2 = add i32 %1, 1\n  \
             store i32 %2, i32* %x\n  \
             ret void\n}\n"
        );
    }

    #[test]
    fn parameters_are_spilled() {
        let text = lower("i32 id (i32 a) { return a; }");
        assert_eq!(
            function(&text, "$F4main2idC$C"),
            "define i32 @$F4main2idC$C(i32 %.0) {\n  \
             %a = alloca i32\n  \
             store i32 %.0, i32* %a\n  \
             %1 = load i32, i32* %a\n  \
             ret i32 %1\n}\n"
        );
    }

    #[test]
    fn if_else_merges_without_phi() {
        let text = lower("i32 f (bool c) { let r = 0; if (c) { r := 1; } else { r := 2; } return r; }");
        let body = function(&text, "$F4main1fC$t");
        assert!(!body.contains("phi"), "{body}");
        assert!(body.contains("br i1 %2, label %.L0, label %.L1"), "{body}");
        assert!(body.contains(".L0:\n  store i32 1, i32* %r\n  br label %.L2\n"), "{body}");
        assert!(body.contains(".L1:\n  store i32 2, i32* %r\n  br label %.L2\n"), "{body}");
        assert!(body.contains(".L2:\n  %3 = load i32, i32* %r\n  ret i32 %3\n"), "{body}");
    }

    #[test]
    fn break_two_leaves_the_outer_loop() {
        let text = lower("void f () { while (true) { while (true) { break 2; } } }");
        // outer: .L0 top, .L1 body, .L2 bottom; inner: .L3, .L4, .L5
        assert!(text.contains(".L4:\n  br label %.L2\n"), "{text}");
        assert!(text.contains(".L5:\n  br label %.L0\n"), "{text}");
    }

    #[test]
    fn continue_in_for_runs_the_step() {
        let text = lower("void f () { for (let i = 0; i < 3; i += 1) { continue; } }");
        // .L0 cond, .L1 body, .L2 step, .L3 bottom
        assert!(text.contains(".L1:\n  br label %.L2\n"), "{text}");
        assert!(text.contains("icmp slt i32"), "{text}");
    }

    #[test]
    fn short_circuit_or() {
        let text = lower("bool f (bool a, bool b) { return a || b; }");
        assert!(text.contains("switch i8 %1, label %.L3 [ i8 0, label %.L1 ]"), "{text}");
        assert!(text.contains("phi i8 [ -1, %.L0 ], [ %2, %.L2 ]"), "{text}");
    }

    #[test]
    fn modulo_takes_the_divisor_sign() {
        let text = lower("i32 f (i32 a, i32 b) { return a % b; }");
        assert!(text.contains("%3 = srem i32 %1, %2\n  %4 = add i32 %3, %2\n  %5 = srem i32 %4, %2\n"), "{text}");
    }

    #[test]
    fn unsigned_modulo_is_a_single_urem() {
        let text = lower("u32 f (u32 a, u32 b) { return a % b; }");
        assert!(text.contains("%3 = urem i32 %1, %2\n  ret i32 %3\n"), "{text}");
        assert!(!text.contains("add i32"), "{text}");
    }

    #[test]
    fn parallel_assignment_reads_before_writing() {
        let text = lower("void f () { let a = 1, b = 2; a, b := b, a; }");
        assert!(
            text.contains(
                "%1 = load i32, i32* %b\n  \
                 %2 = load i32, i32* %a\n  \
                 store i32 %1, i32* %a\n  \
                 store i32 %2, i32* %b\n"
            ),
            "{text}"
        );
    }

    #[test]
    fn two_step_sign_and_width_cast() {
        let text = lower("u64 f (i8 a) { return (a as i64) as u64; }");
        assert!(text.contains("%2 = sext i8 %1 to i64\n  ret i64 %2\n"), "{text}");
    }

    #[test]
    fn continue_two_from_a_for_inside_a_while() {
        let text = lower(
            "void f () { while (true) { for (let i = 0; i < 3; i += 1) { continue 2; } } }",
        );
        // while: .L0 top, .L1 body, .L2 bottom; for: .L3 cond, .L4 body, .L5 step, .L6 bottom
        assert!(text.contains(".L4:\n  br label %.L0\n"), "{text}");
        assert!(text.contains(", label %.L4, label %.L6\n"), "{text}");
        let step = &text[text.find(".L5:").expect("step block")..];
        let step = &step[..step.find(".L6:").expect("for bottom")];
        assert!(step.contains("add i32"), "{step}");
        assert!(step.ends_with("br label %.L3\n"), "{step}");
    }

    #[test]
    fn do_while_tests_after_the_body() {
        let text = lower("void f () { let n = 0; do { n += 1; } while (n < 3); }");
        // .L0 body, .L1 condition, .L2 bottom
        let body = function(&text, "$F4main1f$");
        assert!(body.contains("  br label %.L0\n.L0:\n"), "{body}");
        assert!(body.contains("store i32 %2, i32* %n\n  br label %.L1\n.L1:\n"), "{body}");
        assert!(body.contains(", label %.L0, label %.L2\n.L2:\n  ret void\n"), "{body}");

        let text = lower("void f () { let n = 0; do { continue; } while (n < 3); }");
        assert!(text.contains(".L0:\n  br label %.L1\n.L1:\n"), "{text}");
    }

    #[test]
    fn ternary_merges_with_phi() {
        let text = lower("i32 f (bool c, i32 a, i32 b) { return c ? a : b; }");
        assert!(text.contains("switch i8 %1, label %.L0 [ i8 0, label %.L2 ]"), "{text}");
        assert!(text.contains(".L0:\n  %2 = load i32, i32* %a\n  br label %.L1\n"), "{text}");
        assert!(text.contains(".L1:\n  br label %.L4\n"), "{text}");
        assert!(text.contains(".L2:\n  %3 = load i32, i32* %b\n  br label %.L3\n"), "{text}");
        assert!(
            text.contains(".L4:\n  %4 = phi i32 [ %2, %.L1 ], [ %3, %.L3 ]\n  ret i32 %4\n"),
            "{text}"
        );
    }

    #[test]
    fn mixed_arithmetic_widens() {
        let text = lower("i32 f (i32 a, u8 b) { return a + b; }");
        assert!(text.contains("zext i8 %2 to i32"), "{text}");
    }

    #[test]
    fn overloads_become_calls() {
        let text = lower(
            "point + (point a, point b) { return a; }\n\
             point f (point a, point b) { return a + b; }",
        );
        assert!(
            text.contains("call %.nonprim @$OGOpoint$Z$Opoint$ZOpoint$Z(%.nonprim %1, %.nonprim %2)"),
            "{text}"
        );
    }

    #[test]
    fn extra_returns_use_out_pointers() {
        let text = lower(
            "(i32, bool) pair () { return 7, true; }\n\
             i32 f () { let n = 0, ok = false; n, ok := pair(); return n; }",
        );
        let pair = function(&text, "$F4main4pairCt$");
        assert!(pair.starts_with("define i32 @$F4main4pairCt$(i8* %.ret1)"), "{pair}");
        assert!(pair.contains("store i8 -1, i8* %.ret1\n  ret i32 7\n"), "{pair}");
        let f = function(&text, "$F4main1fC$");
        assert!(f.contains("call i32 @$F4main4pairCt$(i8* %ok)"), "{f}");
    }

    #[test]
    fn indexing_checks_bounds_when_enabled() {
        let source = "i32 f (i32[] a) { return a[1]; }";
        let text = lower(source);
        assert!(text.contains("declare void @$$oobmsg(i32, i32, void (i32, i32)*)"), "{text}");
        assert!(text.contains("icmp ult i64"), "{text}");
        assert!(text.contains("unreachable"), "{text}");

        let text = lower_with(source, &Config::default().with_bound_check(false));
        assert!(!text.contains("oobmsg"), "{text}");
        assert!(text.contains("inttoptr i64"), "{text}");
    }

    #[test]
    fn new_and_delete() {
        let text = lower("void f () { let a = new i32[] (4); let p = new i64; delete a, p; }");
        assert!(text.contains("declare i8* @malloc(i64)"), "{text}");
        assert!(text.contains("declare void @free(i8*)"), "{text}");
        assert!(text.contains("mul i64 4, 4"), "{text}");
        assert!(text.contains("call i8* @$$new(i64 %"), "{text}");
        assert!(text.contains("i8 (i64, i32, i32)* null, i8* (i64)* @malloc)"), "{text}");
    }

    #[test]
    fn statics_and_strings_are_globals() {
        let text = lower("u8[] f () { static n = 5; n := n + 1; return \"hi\"; }");
        assert!(text.contains("@0 = internal global i32 5"), "{text}");
        assert!(text.contains("@.str0 = private unnamed_addr constant [3 x i8] c\"hi\\00\""), "{text}");
        assert!(
            text.contains("@.arr0 = private global { i64, i64 } { i64 2, i64 ptrtoint ([3 x i8]* @.str0 to i64) }"),
            "{text}"
        );
        assert!(text.contains("ret i8* bitcast ({ i64, i64 }* @.arr0 to i8*)"), "{text}");
    }

    #[test]
    fn narrowing_a_double_constant_is_folded() {
        let text = lower("float f () { return 0.5 as float; }");
        assert!(text.contains("ret float 0x3FE0000000000000"), "{text}");
    }

    #[test]
    fn pointer_bits_follow_the_config() {
        let cfg = Config::default().with_pointer_bits(32);
        let text = lower_with("size f (u8[] s) { return s.length; }", &cfg);
        assert!(text.contains("bitcast i8* %1 to i32*"), "{text}");
        assert!(text.contains("ret i32 %3"), "{text}");
    }
}
