//! Statement, declaration and type parser.
//!
//! Expressions are handed to [`crate::expr_parser`]; everything around
//! them (unit header, functions, statements, type names) is parsed here by
//! plain recursive descent.

use crate::ast::{Block, FunctionDecl, Item, LetBinding, Param, Stmt, StmtKind, Storage, Unit};
use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, CoreResult};
use crate::expr_parser::{parse_expression, parse_int};
use crate::lexer::{Token, TokenKind, TokenStream};
use crate::operators::{is_keyword, is_overloadable};
use crate::span::Span;
use crate::types::{Encoding, Type};

/// Consume `text` or fail with "expected `text`".
fn expect_oper(stream: &mut TokenStream, text: &str) -> CoreResult<Token> {
    let token = stream.next();
    if token.is_oper(text) {
        Ok(token)
    } else if token.is_eof() {
        Err(CoreError::unexpected_eof(text, token.span))
    } else {
        Err(CoreError::expected(text, token.span))
    }
}

/// A declaration name: a word that is not reserved.
fn expect_name(stream: &mut TokenStream) -> CoreResult<Token> {
    let token = stream.next();
    if token.is_eof() {
        return Err(CoreError::unexpected_eof("name", token.span));
    }
    if token.kind != TokenKind::Word || is_keyword(&token.text, true) {
        return Err(CoreError::expected("name", token.span));
    }
    Ok(token)
}

/// Parse a type: `name [<args>] { * | [] | const | volatile }`.
pub fn parse_type(stream: &mut TokenStream, cfg: &Config) -> CoreResult<Type> {
    let token = stream.next();
    if token.is_eof() {
        return Err(CoreError::unexpected_eof("type name", token.span));
    }
    if token.kind != TokenKind::Word || is_keyword(&token.text, false) {
        return Err(CoreError::expected("type name", token.span));
    }

    let mut args = None;
    if stream.peek().is_oper("<") {
        stream.next();
        let mut list = Vec::new();
        loop {
            list.push(parse_type(stream, cfg)?);
            let sep = stream.next();
            if sep.is_oper(">") {
                break;
            }
            if sep.is_oper(">>") {
                // Leave the second `>` for the enclosing argument list.
                stream.putback();
                stream.replace_peek(Token {
                    kind: TokenKind::Oper,
                    text: ">".to_string(),
                    span: Span::new(sep.span.file, sep.span.line, sep.span.col + 1),
                });
                break;
            }
            if sep.is_eof() {
                return Err(CoreError::unexpected_eof(", or >", sep.span));
            }
            if !sep.is_oper(",") {
                return Err(CoreError::expected(", or >", sep.span));
            }
        }
        args = Some(list);
    }

    let has_args = args.is_some();
    let mut ty = Type::named(&token.text, args.unwrap_or_default(), cfg);
    if has_args && ty.encoding() != Encoding::Object {
        return Err(CoreError::type_error(
            "non-object cannot have type arguments",
            token.span,
        ));
    }

    loop {
        let next = stream.peek();
        if next.is_oper("*") {
            stream.next();
            ty = ty.pointer(cfg);
        } else if next.is_oper("[") {
            stream.next();
            expect_oper(stream, "]")?;
            ty = ty.array(cfg);
        } else if next.is_word("const") {
            stream.next();
            ty = ty.const_();
        } else if next.is_word("volatile") {
            stream.next();
            ty = ty.volatile();
        } else {
            return Ok(ty);
        }
    }
}

/// Which declaration attributes a context accepts.
#[derive(Clone, Copy)]
struct DeclRules {
    multiple_returns: bool,
    operators: bool,
    unnamed_params: bool,
    allow_conflict: bool,
    global: bool,
    /// `nomangle` is implied; writing it earns a warning.
    nomangle_implied: bool,
}

const FUNCTION_RULES: DeclRules = DeclRules {
    multiple_returns: true,
    operators: true,
    unnamed_params: false,
    allow_conflict: true,
    global: true,
    nomangle_implied: false,
};

const EXTERN_RULES: DeclRules = DeclRules {
    multiple_returns: false,
    operators: false,
    unnamed_params: true,
    allow_conflict: false,
    global: false,
    nomangle_implied: true,
};

/// Parser for one compilation unit.
pub struct Parser<'a> {
    stream: &'a mut TokenStream,
    cfg: &'a Config,
    warnings: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(stream: &'a mut TokenStream, cfg: &'a Config) -> Self {
        Parser {
            stream,
            cfg,
            warnings: Vec::new(),
        }
    }

    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.warnings
    }

    /// Parse a whole file: an optional `package NAME;` or
    /// `executable NAME;` header followed by functions and `extern`s.
    pub fn parse_unit(&mut self) -> CoreResult<Unit> {
        let mut unit = Unit {
            package: None,
            executable: false,
            items: Vec::new(),
        };
        let head = self.stream.peek();
        if head.is_word("package") || head.is_word("executable") {
            unit.executable = head.is_word("executable");
            self.stream.next();
            let name = expect_name(self.stream)?;
            expect_oper(self.stream, ";")?;
            unit.package = Some(name.text);
        }

        while !self.stream.at_eof() {
            if self.stream.peek().is_word("extern") {
                self.stream.next();
                let decl = self.parse_decl(EXTERN_RULES)?;
                expect_oper(self.stream, ";")?;
                unit.items.push(Item::Extern(decl));
            } else {
                let decl = self.parse_decl(FUNCTION_RULES)?;
                let body = self.parse_body()?;
                unit.items.push(Item::Function { decl, body });
            }
        }
        Ok(unit)
    }

    fn parse_decl(&mut self, rules: DeclRules) -> CoreResult<FunctionDecl> {
        let start = self.stream.peek().clone();
        if start.is_word("static") {
            return Err(CoreError::expected("type name", start.span));
        }

        let returns = if start.is_word("void") {
            self.stream.next();
            Vec::new()
        } else if start.is_oper("(") {
            if !rules.multiple_returns {
                return Err(CoreError::syntax(
                    "multiple return types not allowed here",
                    start.span,
                ));
            }
            self.stream.next();
            let mut types = Vec::new();
            loop {
                types.push(parse_type(self.stream, self.cfg)?);
                let sep = self.stream.next();
                if sep.is_oper(")") {
                    break;
                }
                if sep.is_eof() {
                    return Err(CoreError::unexpected_eof(") or ,", sep.span));
                }
                if !sep.is_oper(",") {
                    return Err(CoreError::expected(") or ,", sep.span));
                }
            }
            types
        } else {
            vec![parse_type(self.stream, self.cfg)?]
        };

        let token = self.stream.next();
        let mut is_operator = false;
        if token.is_eof() {
            return Err(CoreError::unexpected_eof("name", token.span));
        } else if token.kind == TokenKind::Oper && rules.operators && is_overloadable(&token.text) {
            is_operator = true;
        } else if token.kind != TokenKind::Word || is_keyword(&token.text, true) {
            let err = CoreError::expected("name", token.span);
            return match returns.as_slice() {
                [ret] if token.is_oper("(") && ret.encoding() == Encoding::Pointer => {
                    let sub = ret.subtype().map(ToString::to_string).unwrap_or_default();
                    Err(err.with_note(format!(
                        "Perhaps you meant to overload multiplication?\n({sub}) * (...\n"
                    )))
                }
                _ => Err(err),
            };
        }

        expect_oper(self.stream, "(")?;
        let params = self.parse_params(rules)?;

        let mut decl = FunctionDecl {
            name: token.text,
            is_operator,
            returns,
            params,
            nomangle: rules.nomangle_implied,
            allow_conflict: false,
            global: false,
            span: token.span,
        };

        loop {
            let attr = self.stream.peek().clone();
            if attr.is_word("nomangle") {
                if rules.nomangle_implied {
                    self.warnings
                        .push(Diagnostic::warning("nomangle is redundant here", attr.span));
                }
                if decl.is_operator {
                    return Err(CoreError::syntax("operators must be mangled", attr.span));
                }
                decl.nomangle = true;
            } else if attr.is_word("allowconflict") {
                if !rules.allow_conflict {
                    return Err(CoreError::unexpected("allowconflict", attr.span));
                }
                decl.allow_conflict = true;
            } else if attr.is_word("global") {
                if !rules.global {
                    return Err(CoreError::unexpected("global", attr.span));
                }
                decl.global = true;
            } else {
                break;
            }
            self.stream.next();
        }
        Ok(decl)
    }

    fn parse_params(&mut self, rules: DeclRules) -> CoreResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.stream.peek().is_oper(")") {
            self.stream.next();
            return Ok(params);
        }
        loop {
            let ty = parse_type(self.stream, self.cfg)?;
            let next = self.stream.peek().clone();
            let name = if rules.unnamed_params && (next.is_oper(",") || next.is_oper(")")) {
                String::new()
            } else if next.kind == TokenKind::Word && !is_keyword(&next.text, true) {
                self.stream.next();
                next.text
            } else if rules.unnamed_params {
                return Err(CoreError::expected("name or comma", next.span));
            } else {
                return Err(CoreError::expected("name", next.span));
            };
            params.push(Param { name, ty });

            let sep = self.stream.next();
            if sep.is_oper(")") {
                return Ok(params);
            }
            if !sep.is_oper(",") {
                return Err(CoreError::expected(", or )", sep.span));
            }
        }
    }

    /// A braced block, or a single statement standing in for one.
    fn parse_body(&mut self) -> CoreResult<Block> {
        let start = self.stream.peek().clone();
        if start.is_eof() {
            return Err(CoreError::unexpected_eof("body", start.span));
        }
        if !start.is_oper("{") {
            let stmt = self.parse_stmt()?;
            return Ok(Block {
                stmts: vec![stmt],
                span: start.span,
            });
        }
        self.parse_block()
    }

    fn parse_block(&mut self) -> CoreResult<Block> {
        let open = expect_oper(self.stream, "{")?;
        let mut stmts = Vec::new();
        loop {
            let next = self.stream.peek();
            if next.is_oper("}") {
                self.stream.next();
                break;
            }
            if next.is_eof() {
                return Err(CoreError::unexpected_eof("}", next.span));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block {
            stmts,
            span: open.span,
        })
    }

    fn parse_stmt(&mut self) -> CoreResult<Stmt> {
        let token = self.stream.peek().clone();
        let span = token.span;
        let kind = match (token.kind, token.text.as_str()) {
            (TokenKind::Oper, "{") => StmtKind::Block(self.parse_block()?),
            (TokenKind::Word, "let") => self.parse_let(Storage::Local)?,
            (TokenKind::Word, "const") => self.parse_let(Storage::Const)?,
            (TokenKind::Word, "static") => self.parse_let(Storage::Static)?,
            (TokenKind::Word, "if") => self.parse_if()?,
            (TokenKind::Word, "while") => {
                self.stream.next();
                let cond = self.parse_condition()?;
                let body = self.parse_body()?;
                StmtKind::While { cond, body }
            }
            (TokenKind::Word, "do") => {
                self.stream.next();
                let body = self.parse_body()?;
                let kw = self.stream.next();
                if !kw.is_word("while") {
                    return Err(CoreError::expected("while", kw.span));
                }
                let cond = self.parse_condition()?;
                expect_oper(self.stream, ";")?;
                StmtKind::DoWhile { body, cond }
            }
            (TokenKind::Word, "for") => self.parse_for()?,
            (TokenKind::Word, "break") => StmtKind::Break(self.parse_levels()?),
            (TokenKind::Word, "continue") => StmtKind::Continue(self.parse_levels()?),
            (TokenKind::Word, "return") => {
                self.stream.next();
                let value = parse_expression(self.stream, ";", self.cfg)?;
                expect_oper(self.stream, ";")?;
                StmtKind::Return(value.map(|v| v.unpack_comma()).unwrap_or_default())
            }
            (TokenKind::Word, "delete") => {
                self.stream.next();
                let mut values = Vec::new();
                loop {
                    let value = parse_expression(self.stream, ";,", self.cfg)?
                        .ok_or_else(|| CoreError::expected("expression", self.stream.peek().span))?;
                    values.push(value);
                    let sep = self.stream.next();
                    if sep.is_oper(";") {
                        break;
                    }
                    if !sep.is_oper(",") {
                        return Err(CoreError::expected("; or ,", sep.span));
                    }
                }
                StmtKind::Delete(values)
            }
            _ => {
                let expr = parse_expression(self.stream, ";", self.cfg)?
                    .ok_or_else(|| CoreError::expected("statement or expression", span))?;
                expect_oper(self.stream, ";")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, span })
    }

    /// `( expression )`
    fn parse_condition(&mut self) -> CoreResult<crate::ast::Expr> {
        let open = expect_oper(self.stream, "(")?;
        let cond = parse_expression(self.stream, ")", self.cfg)?
            .ok_or_else(|| CoreError::expected("expression", open.span))?;
        expect_oper(self.stream, ")")?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> CoreResult<StmtKind> {
        self.stream.next();
        let cond = self.parse_condition()?;
        let then = self.parse_body()?;
        let otherwise = if self.stream.peek().is_word("else") {
            self.stream.next();
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> CoreResult<StmtKind> {
        self.stream.next();
        expect_oper(self.stream, "(")?;
        let init = if self.stream.peek().is_word("let") {
            let span = self.stream.peek().span;
            let kind = self.parse_let(Storage::Local)?;
            Some(Box::new(Stmt { kind, span }))
        } else {
            let span = self.stream.peek().span;
            let expr = parse_expression(self.stream, ";", self.cfg)?;
            expect_oper(self.stream, ";")?;
            expr.map(|e| {
                Box::new(Stmt {
                    kind: StmtKind::Expr(e),
                    span,
                })
            })
        };
        let cond = parse_expression(self.stream, ";", self.cfg)?;
        expect_oper(self.stream, ";")?;
        let step = parse_expression(self.stream, ")", self.cfg)?;
        expect_oper(self.stream, ")")?;
        let body = self.parse_body()?;
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// `break;` / `break N;`
    fn parse_levels(&mut self) -> CoreResult<u32> {
        let keyword = self.stream.next();
        let next = self.stream.next();
        if next.is_oper(";") {
            return Ok(1);
        }
        if next.kind != TokenKind::Int {
            return Err(CoreError::expected("; or number", keyword.span));
        }
        let levels = parse_int(&next.text)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| CoreError::expected("valid loop count", next.span))?;
        if levels == 0 {
            return Err(CoreError::unexpected("positive number", next.span));
        }
        expect_oper(self.stream, ";")?;
        Ok(levels)
    }

    /// `let NAME [TYPE] (:|=) EXPR {, ...} ;` and the `const` and `static`
    /// forms.
    fn parse_let(&mut self, storage: Storage) -> CoreResult<StmtKind> {
        self.stream.next();
        let mut bindings = Vec::new();
        loop {
            let name = expect_name(self.stream)?;
            let next = self.stream.peek();
            let ty = if next.is_oper(":") || next.is_oper("=") {
                self.stream.next();
                None
            } else if next.is_eof() {
                return Err(CoreError::unexpected_eof(": or type", next.span));
            } else {
                let ty = parse_type(self.stream, self.cfg)?;
                let sep = self.stream.next();
                if !(sep.is_oper(":") || sep.is_oper("=")) {
                    return Err(CoreError::expected(":", sep.span));
                }
                Some(ty.non_literal())
            };
            let value = parse_expression(self.stream, ";,", self.cfg)?
                .ok_or_else(|| CoreError::expected("expression", self.stream.last().span))?;
            bindings.push(LetBinding {
                name: name.text,
                ty,
                value,
                span: name.span,
            });
            let sep = self.stream.next();
            if sep.is_oper(";") {
                break;
            }
            if !sep.is_oper(",") {
                return Err(CoreError::expected(", or ;", sep.span));
            }
        }
        Ok(StmtKind::Let { storage, bindings })
    }
}

/// Parse one file's tokens into a [`Unit`], collecting warnings.
pub fn parse_unit(
    stream: &mut TokenStream,
    cfg: &Config,
    warnings: &mut Vec<Diagnostic>,
) -> CoreResult<Unit> {
    let mut parser = Parser::new(stream, cfg);
    let unit = parser.parse_unit();
    warnings.extend(parser.into_warnings());
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;
    use crate::lexer::lex;
    use crate::span::FileId;
    use pretty_assertions::assert_eq;

    fn stream(source: &str) -> TokenStream {
        TokenStream::new(lex(FileId(0), source).tokens)
    }

    fn unit(source: &str) -> CoreResult<Unit> {
        parse_unit(&mut stream(source), &Config::default(), &mut Vec::new())
    }

    fn body(source: &str) -> Vec<Stmt> {
        let text = format!("void f () {{ {source} }}");
        match unit(&text).expect("parse").items.remove(0) {
            Item::Function { body, .. } => body.stmts,
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn types_with_modifiers_and_arguments() {
        let cfg = Config::default();
        let ty = parse_type(&mut stream("u8[] const"), &cfg).unwrap();
        assert_eq!(ty.to_string(), "u8[] const");

        let ty = parse_type(&mut stream("map<string, list<int>>*"), &cfg).unwrap();
        assert_eq!(ty.to_string(), "map<string, list<i32>>*");

        let err = parse_type(&mut stream("int<u8>"), &cfg).unwrap_err();
        assert_eq!(err.message(), "non-object cannot have type arguments");
        let err = parse_type(&mut stream("while"), &cfg).unwrap_err();
        assert_eq!(err.message(), "expected type name");
    }

    #[test]
    fn header_and_items() {
        let parsed = unit(
            "package demo;\n\
             extern int puts (u8*);\n\
             (int, bool) pair (int a) { return a, true; }\n\
             point + (point a, point b) allowconflict { return a; }",
        )
        .unwrap();
        assert_eq!(parsed.package.as_deref(), Some("demo"));
        assert_eq!(parsed.items.len(), 3);
        match &parsed.items[0] {
            Item::Extern(decl) => {
                assert!(decl.nomangle);
                assert_eq!(decl.params[0].name, "");
            }
            other => panic!("{other:?}"),
        }
        match &parsed.items[1] {
            Item::Function { decl, body } => {
                assert_eq!(decl.returns, vec![Type::int(), Type::bool()]);
                assert!(matches!(&body.stmts[0].kind, StmtKind::Return(values) if values.len() == 2));
            }
            other => panic!("{other:?}"),
        }
        match &parsed.items[2] {
            Item::Function { decl, .. } => {
                assert!(decl.is_operator && decl.allow_conflict);
                assert_eq!(decl.name, "+");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn declaration_errors() {
        let err = unit("extern (int, int) f ();").unwrap_err();
        assert_eq!(err.message(), "multiple return types not allowed here");
        let err = unit("int + (int a) nomangle {}").unwrap_err();
        assert_eq!(err.message(), "operators must be mangled");
        let err = unit("extern int f () global;").unwrap_err();
        assert_eq!(err.message(), "unexpected: global");
        let err = unit("int * (int a, int b) {}").unwrap_err();
        assert_eq!(err.message(), "expected name");
        assert_eq!(
            err.note(),
            Some("Perhaps you meant to overload multiplication?\n(i32) * (...\n")
        );

        let mut warnings = Vec::new();
        parse_unit(
            &mut stream("extern void exit (int) nomangle;"),
            &Config::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(warnings[0].message, "nomangle is redundant here");
    }

    #[test]
    fn let_accepts_both_separators() {
        let stmts = body("let x = 5; let y u8: 1, z: 2; x := x + 1;");
        assert_eq!(stmts.len(), 3);
        match &stmts[0].kind {
            StmtKind::Let { storage, bindings } => {
                assert_eq!(*storage, Storage::Local);
                assert_eq!(bindings[0].name, "x");
                assert_eq!(bindings[0].ty, None);
                assert!(matches!(bindings[0].value.kind, ExprKind::Int(_)));
            }
            other => panic!("{other:?}"),
        }
        match &stmts[1].kind {
            StmtKind::Let { bindings, .. } => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].ty, Some(Type::uint(1)));
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(&stmts[2].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn control_flow() {
        let stmts = body(
            "if (a) b(); else { c(); }\n\
             while (x) { break 2; }\n\
             do x := x - 1; while (x);\n\
             for (let i = 0; i < 10; i += 1) continue;\n\
             for (;;) {}\n\
             delete p, q;",
        );
        assert!(matches!(&stmts[0].kind, StmtKind::If { otherwise: Some(_), .. }));
        match &stmts[1].kind {
            StmtKind::While { body, .. } => {
                assert!(matches!(body.stmts[0].kind, StmtKind::Break(2)));
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(&stmts[2].kind, StmtKind::DoWhile { .. }));
        assert!(matches!(
            &stmts[3].kind,
            StmtKind::For { init: Some(_), cond: Some(_), step: Some(_), .. }
        ));
        assert!(matches!(
            &stmts[4].kind,
            StmtKind::For { init: None, cond: None, step: None, .. }
        ));
        assert!(matches!(&stmts[5].kind, StmtKind::Delete(v) if v.len() == 2));
    }

    #[test]
    fn statement_errors() {
        let err = unit("void f () { break 0; }").unwrap_err();
        assert_eq!(err.message(), "unexpected: positive number");
        let err = unit("void f () { x := 1").unwrap_err();
        assert_eq!(err.message(), "unexpected EOF; wanted ;");
        let err = unit("void f () { ; }").unwrap_err();
        assert_eq!(err.message(), "expected statement or expression");
        let err = unit("void f () {").unwrap_err();
        assert_eq!(err.message(), "unexpected EOF; wanted }");
    }
}
