//! Name resolution: scoped variables and overloaded functions.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::ast::FunctionDecl;
use crate::coerce::can_coerce;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::mangle;
use crate::span::Span;
use crate::types::Type;

/// A resolved variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Name as written in source.
    pub name: String,
    /// LLVM name of the variable's slot: `%x`, `%x.1` or `@3`.
    pub real_name: String,
    pub ty: Type,
    pub span: Span,
}

impl Variable {
    pub fn is_global(&self) -> bool {
        self.real_name.starts_with('@')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mangle {
    Mangled,
    NoMangle,
}

/// Signature of a function or extern declaration.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub is_operator: bool,
    pub returns: Vec<Type>,
    pub params: Vec<Type>,
    pub param_names: Vec<String>,
    pub mangle: Mangle,
    pub allow_conflict: bool,
    pub global: bool,
    pub package: String,
    pub span: Span,
}

impl PartialEq for FunctionSig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.mangle == other.mangle && self.params == other.params
    }
}

impl FunctionSig {
    pub fn from_decl(decl: &FunctionDecl, cfg: &Config) -> Self {
        FunctionSig {
            name: decl.name.clone(),
            is_operator: decl.is_operator,
            returns: decl.returns.clone(),
            params: decl.params.iter().map(|p| p.ty.clone()).collect(),
            param_names: decl.params.iter().map(|p| p.name.clone()).collect(),
            mangle: if decl.nomangle {
                Mangle::NoMangle
            } else {
                Mangle::Mangled
            },
            allow_conflict: decl.allow_conflict,
            global: decl.global,
            package: cfg.package.clone(),
            span: decl.span,
        }
    }

    pub fn is_mangled(&self) -> bool {
        self.mangle == Mangle::Mangled
    }

    /// Reserved `@name` handlers.
    pub fn is_handler(&self) -> bool {
        self.name.starts_with('@')
    }

    /// Symbol name, without the leading `@`.
    pub fn mangled_name(&self) -> String {
        if self.is_handler() {
            return mangle::handler_symbol(&self.name);
        }
        if !self.is_mangled() {
            return self.name.clone();
        }
        if self.is_operator {
            if let Some(symbol) = mangle::mangle_operator(&self.name, &self.returns, &self.params) {
                return symbol;
            }
        }
        if self.global {
            mangle::mangle_global(&self.name, &self.returns, &self.params)
        } else {
            mangle::mangle_free(&self.package, &self.name, &self.returns, &self.params)
        }
    }

    /// First return type, `null` for `void`.
    pub fn ret_type(&self) -> Type {
        self.returns.first().cloned().unwrap_or_else(Type::null)
    }

    /// LLVM return type.
    pub fn llvm_ret(&self) -> String {
        match self.returns.first() {
            Some(ty) => ty.llvm_name(),
            None => "void".to_string(),
        }
    }
}

impl fmt::Display for FunctionSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.returns.as_slice() {
            [] => f.write_str("void")?,
            [single] if self.name == "*" => write!(f, "({single})")?,
            [single] => write!(f, "{single}")?,
            many => {
                let list: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, "({})", list.join(", "))?;
            }
        }
        write!(f, " {} (", self.name)?;
        for (i, (ty, name)) in self.params.iter().zip(&self.param_names).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
            if !name.is_empty() {
                write!(f, " {name}")?;
            }
        }
        f.write_str(")")?;
        if !self.is_mangled() {
            f.write_str(" nomangle")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Scope {
    declared: HashMap<String, Span>,
    variables: HashMap<String, Variable>,
}

/// Scoped symbol table for one package.
///
/// Variables live in a stack of scopes; functions are package-wide.
#[derive(Debug)]
pub struct Resolver {
    scopes: Vec<Scope>,
    counts: HashMap<String, u32>,
    functions: Vec<FunctionSig>,
    global_counter: u32,
    handle_oom: bool,
    handle_oob: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            scopes: vec![Scope::default()],
            counts: HashMap::new(),
            functions: Vec::new(),
            global_counter: 0,
            handle_oom: false,
            handle_oob: false,
        }
    }

    /// Reset per-function state before checking a new body.
    pub fn begin_function(&mut self) {
        self.counts.clear();
        self.scopes.truncate(1);
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "popped the package scope");
        self.scopes.pop();
    }

    pub fn handle_oom(&self) -> bool {
        self.handle_oom
    }

    pub fn handle_oob(&self) -> bool {
        self.handle_oob
    }

    fn current(&mut self) -> &mut Scope {
        self.scopes
            .last_mut()
            .unwrap_or_else(|| unreachable!("resolver has no scope"))
    }

    fn check_not_declared(&mut self, name: &str, span: Span) -> CoreResult<()> {
        if let Some(previous) = self.current().declared.get(name) {
            return Err(CoreError::name_error(
                format!(
                    "variable '{name}' already declared at {}:{}",
                    previous.line_number(),
                    previous.column_number()
                ),
                span,
            ));
        }
        Ok(())
    }

    /// Declare a stack variable in the innermost scope.
    pub fn add_variable(&mut self, name: &str, ty: Type, span: Span) -> CoreResult<Variable> {
        self.check_not_declared(name, span)?;
        let count = self.counts.entry(name.to_string()).or_insert(0);
        let real_name = match *count {
            0 => format!("%{name}"),
            n => format!("%{name}.{n}"),
        };
        *count += 1;
        let var = Variable {
            name: name.to_string(),
            real_name,
            ty,
            span,
        };
        let scope = self.current();
        scope.declared.insert(name.to_string(), span);
        scope.variables.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Declare a variable that is only visible in this scope but stored in
    /// a module-level global `@N`.
    pub fn add_global(&mut self, name: &str, ty: Type, span: Span) -> CoreResult<Variable> {
        let number = self.global_counter;
        self.global_counter += 1;
        self.check_not_declared(name, span)?;
        let var = Variable {
            name: name.to_string(),
            real_name: format!("@{number}"),
            ty,
            span,
        };
        let scope = self.current();
        scope.declared.insert(name.to_string(), span);
        scope.variables.insert(name.to_string(), var.clone());
        Ok(var)
    }

    pub fn lookup_variable(&self, name: &str, span: Span) -> CoreResult<&Variable> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
            .ok_or_else(|| CoreError::name_error("cannot resolve name", span))
    }

    /// Register a function. Reserved handler names must carry their fixed
    /// signatures.
    pub fn add_function(&mut self, sig: FunctionSig, cfg: &Config) -> CoreResult<()> {
        match sig.name.as_str() {
            "@oom" => {
                let want = [Type::size_type(cfg), Type::uint(4), Type::uint(4)];
                if sig.returns != [Type::bool()] || sig.params != want {
                    return Err(CoreError::type_error("invalid signature for @oom", sig.span));
                }
                self.handle_oom = true;
            }
            "@bounds" => {
                if !sig.returns.is_empty() || sig.params != [Type::uint(4), Type::uint(4)] {
                    return Err(CoreError::type_error(
                        "invalid signature for @bounds",
                        sig.span,
                    ));
                }
                self.handle_oob = true;
            }
            _ => {}
        }

        for existing in &self.functions {
            let conflict = || format!("Conflict:\n{existing}\n");
            if *existing == sig {
                return Err(
                    CoreError::name_error("duplicate function declaration", sig.span)
                        .with_note(conflict()),
                );
            }
            if existing.name != sig.name {
                continue;
            }
            let clash = if sig.is_mangled() {
                !existing.is_mangled() && !existing.allow_conflict && !sig.allow_conflict
            } else {
                !sig.allow_conflict
            };
            if clash {
                return Err(CoreError::name_error("duplicate function name", sig.span)
                    .with_note(conflict()));
            }
        }
        self.functions.push(sig);
        Ok(())
    }

    /// Resolve a call by name and argument types.
    ///
    /// Match levels, best first: a `nomangle` function of that name (the
    /// only candidate when present), an exact parameter match, then a match
    /// through implicit conversions.
    pub fn lookup_function(
        &self,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> CoreResult<&FunctionSig> {
        let mut candidates: Vec<&FunctionSig> = Vec::new();
        let mut matches: Vec<&FunctionSig> = Vec::new();
        let mut level = u8::MAX;

        let coerces = |sig: &FunctionSig| {
            sig.params.len() == args.len()
                && args.iter().zip(&sig.params).all(|(a, p)| can_coerce(a, p))
        };

        for sig in self.functions.iter().filter(|f| f.name == name) {
            if !sig.is_mangled() {
                candidates = vec![sig];
                matches = if coerces(sig) { vec![sig] } else { Vec::new() };
                level = 0;
                break;
            }
            candidates.push(sig);
            let sig_level = if sig.params.as_slice() == args {
                1
            } else if coerces(sig) {
                2
            } else {
                trace!(%sig, "overload does not match");
                continue;
            };
            if sig_level < level {
                level = sig_level;
                matches.clear();
            }
            if sig_level == level {
                matches.push(sig);
            }
        }

        let shown: Vec<String> = args.iter().map(|t| t.non_literal().to_string()).collect();
        let call = format!("{name} ({})", shown.join(", "));
        let list = |sigs: &[&FunctionSig]| -> String {
            sigs.iter().map(|s| format!("  {s}\n")).collect()
        };
        match matches.as_slice() {
            [] => {
                let err = CoreError::name_error(format!("cannot resolve call: {call}"), span);
                if candidates.is_empty() {
                    Err(err)
                } else {
                    Err(err.with_note(format!("Candidates were:\n{}", list(&candidates))))
                }
            }
            [one] => {
                trace!(sig = %one, level, "call resolved");
                Ok(*one)
            }
            many => Err(
                CoreError::name_error(format!("ambiguous call: {call}"), span)
                    .with_note(format!("Matches were:\n{}", list(many))),
            ),
        }
    }

    pub fn functions(&self) -> &[FunctionSig] {
        &self.functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    fn at(line: u32, col: u32) -> Span {
        Span::new(FileId(0), line, col)
    }

    fn sig(name: &str, returns: Vec<Type>, params: Vec<Type>) -> FunctionSig {
        FunctionSig {
            name: name.to_string(),
            is_operator: false,
            returns,
            param_names: params.iter().map(|_| String::new()).collect(),
            params,
            mangle: Mangle::Mangled,
            allow_conflict: false,
            global: false,
            package: "main".to_string(),
            span: at(0, 0),
        }
    }

    #[test]
    fn inner_scopes_shadow_with_fresh_names() {
        let mut r = Resolver::new();
        r.begin_function();
        r.push_scope();
        let outer = r.add_variable("x", Type::int(), at(1, 4)).unwrap();
        r.push_scope();
        let inner = r.add_variable("x", Type::uint(1), at(2, 8)).unwrap();
        assert_eq!(outer.real_name, "%x");
        assert_eq!(inner.real_name, "%x.1");
        assert_eq!(r.lookup_variable("x", at(3, 0)).unwrap().ty, Type::uint(1));
        r.pop_scope();
        assert_eq!(r.lookup_variable("x", at(3, 0)).unwrap().real_name, "%x");

        let err = r.add_variable("x", Type::int(), at(5, 0)).unwrap_err();
        assert_eq!(err.message(), "variable 'x' already declared at 2:5");
        let err = r.lookup_variable("y", at(5, 0)).unwrap_err();
        assert_eq!(err.message(), "cannot resolve name");

        r.begin_function();
        r.push_scope();
        assert_eq!(r.add_variable("x", Type::int(), at(9, 0)).unwrap().real_name, "%x");
    }

    #[test]
    fn statics_are_numbered_globals() {
        let mut r = Resolver::new();
        r.push_scope();
        let a = r.add_global("a", Type::int(), at(0, 0)).unwrap();
        let b = r.add_global("b", Type::int(), at(1, 0)).unwrap();
        assert_eq!((a.real_name.as_str(), b.real_name.as_str()), ("@0", "@1"));
        assert!(a.is_global());
    }

    #[test]
    fn duplicates_are_rejected() {
        let cfg = Config::default();
        let mut r = Resolver::new();
        r.add_function(sig("f", vec![Type::int()], vec![Type::int()]), &cfg).unwrap();
        let err = r
            .add_function(sig("f", vec![], vec![Type::int()]), &cfg)
            .unwrap_err();
        assert_eq!(err.message(), "duplicate function declaration");
        assert_eq!(err.note(), Some("Conflict:\ni32 f (i32)\n"));

        let mut plain = sig("puts", vec![Type::int()], vec![Type::uint(1).pointer(&cfg)]);
        plain.mangle = Mangle::NoMangle;
        r.add_function(plain.clone(), &cfg).unwrap();
        let err = r
            .add_function(sig("puts", vec![], vec![Type::int()]), &cfg)
            .unwrap_err();
        assert_eq!(err.message(), "duplicate function name");

        let mut tolerant = sig("puts", vec![], vec![Type::int()]);
        tolerant.allow_conflict = true;
        r.add_function(tolerant, &cfg).unwrap();
    }

    #[test]
    fn exact_match_beats_promotion() {
        let cfg = Config::default();
        let mut r = Resolver::new();
        r.add_function(sig("f", vec![], vec![Type::sint(8)]), &cfg).unwrap();
        r.add_function(sig("f", vec![], vec![Type::int()]), &cfg).unwrap();
        let found = r.lookup_function("f", &[Type::int()], at(0, 0)).unwrap();
        assert_eq!(found.params, vec![Type::int()]);

        let found = r.lookup_function("f", &[Type::sint(2)], at(0, 0));
        let err = found.unwrap_err();
        assert_eq!(err.message(), "ambiguous call: f (i16)");
        assert_eq!(err.note(), Some("Matches were:\n  void f (i64)\n  void f (i32)\n"));
    }

    #[test]
    fn unresolved_calls_list_candidates() {
        let cfg = Config::default();
        let mut r = Resolver::new();
        r.add_function(sig("g", vec![], vec![Type::uint(1)]), &cfg).unwrap();
        let lit = Type::int_literal(BigInt::from(1000)).unwrap();
        let err = r.lookup_function("g", &[lit], at(0, 0)).unwrap_err();
        assert_eq!(err.message(), "cannot resolve call: g (i32)");
        assert_eq!(err.note(), Some("Candidates were:\n  void g (u8)\n"));

        let lit = Type::int_literal(BigInt::from(7)).unwrap();
        assert!(r.lookup_function("g", &[lit], at(0, 0)).is_ok());

        let err = r.lookup_function("h", &[], at(0, 0)).unwrap_err();
        assert_eq!(err.note(), None);
    }

    #[test]
    fn nomangle_is_the_only_candidate() {
        let cfg = Config::default();
        let mut r = Resolver::new();
        let mut c = sig("abs", vec![Type::int()], vec![Type::int()]);
        c.mangle = Mangle::NoMangle;
        r.add_function(c, &cfg).unwrap();
        assert_eq!(r.lookup_function("abs", &[Type::sint(2)], at(0, 0)).unwrap().mangled_name(), "abs");
        assert!(r.lookup_function("abs", &[], at(0, 0)).is_err());
    }

    #[test]
    fn mangled_names() {
        let cfg = Config::default();
        let f = sig("f", vec![Type::int()], vec![Type::int()]);
        assert_eq!(f.mangled_name(), "$F4main1fC$C");
        let mut g = f.clone();
        g.global = true;
        assert_eq!(g.mangled_name(), "$G1fC$C");
        let mut op = sig("*", vec![Type::int()], vec![Type::int(), Type::int()]);
        op.is_operator = true;
        assert_eq!(op.mangled_name(), "$OCC$CC");
        assert_eq!(op.to_string(), "(i32) * (i32, i32)");
        let back = mangle::demangle(&f.mangled_name(), &cfg).unwrap();
        assert_eq!(back.params, f.params);
    }

    #[test]
    fn handler_signatures_are_fixed() {
        let cfg = Config::default();
        let mut r = Resolver::new();
        let bad = sig("@oom", vec![Type::bool()], vec![Type::size_type(&cfg)]);
        let err = r.add_function(bad, &cfg).unwrap_err();
        assert_eq!(err.message(), "invalid signature for @oom");
        assert!(!r.handle_oom());

        let good = sig(
            "@oom",
            vec![Type::bool()],
            vec![Type::size_type(&cfg), Type::uint(4), Type::uint(4)],
        );
        assert_eq!(good.mangled_name(), "$$oom");
        r.add_function(good, &cfg).unwrap();
        assert!(r.handle_oom());

        r.add_function(sig("@bounds", vec![], vec![Type::uint(4), Type::uint(4)]), &cfg)
            .unwrap();
        assert!(r.handle_oob());
    }
}
