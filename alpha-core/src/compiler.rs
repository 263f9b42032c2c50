use std::path::Path;

use tracing::{debug, info};

use crate::ast::Unit;
use crate::codegen_llvm::lower_module;
use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, CoreResult};
use crate::lexer::{lex, TokenStream};
use crate::parser::parse_unit;
use crate::sources::{load_sources, SourceFile};
use crate::span::FileId;
use crate::typecheck::check_units;

/// Name used for source text that did not come from a file.
pub const ANONYMOUS_SOURCE: &str = "<input>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    /// Textual LLVM module.
    pub ir: String,
    pub warnings: Vec<Diagnostic>,
}

/// Compile a single unit of source text.
pub fn compile_source(source: &str, cfg: &Config) -> CoreResult<CompileOutput> {
    compile_files(&[SourceFile::new(ANONYMOUS_SOURCE, source)], cfg)
}

/// Compile every `*.al` file below `dir` as one package.
pub fn compile_dir(dir: impl AsRef<Path>, cfg: &Config) -> CoreResult<CompileOutput> {
    let files = load_sources(dir)?;
    compile_files(&files, cfg)
}

/// Compile files into one module. Spans in errors and warnings carry the
/// index of the file in `files` as their [`FileId`].
pub fn compile_files(files: &[SourceFile], cfg: &Config) -> CoreResult<CompileOutput> {
    let mut warnings = Vec::new();
    let units = parse_files(files, cfg, &mut warnings)?;
    let module = check_units(&units, cfg, &mut warnings)?;
    let ir = lower_module(&module, cfg, &module_id(files));
    info!(
        files = files.len(),
        functions = module.functions.len(),
        warnings = warnings.len(),
        "compiled module"
    );
    Ok(CompileOutput { ir, warnings })
}

/// Lex and parse every file. The first lexical error of a file aborts the
/// compilation; lexer warnings are kept.
pub fn parse_files(
    files: &[SourceFile],
    cfg: &Config,
    warnings: &mut Vec<Diagnostic>,
) -> CoreResult<Vec<Unit>> {
    let mut units = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let id = FileId(index as u32);
        debug!(file = %file.path.display(), "parsing");
        let lexed = lex(id, &file.contents);
        for diag in lexed.diagnostics {
            if diag.is_error() {
                return Err(CoreError::from(diag));
            }
            warnings.push(diag);
        }
        let mut stream = TokenStream::new(lexed.tokens);
        units.push(parse_unit(&mut stream, cfg, warnings)?);
    }
    Ok(units)
}

fn module_id(files: &[SourceFile]) -> String {
    match files {
        [single] => single.path.display().to_string(),
        [first, ..] => first
            .path
            .parent()
            .map_or_else(|| first.path.display().to_string(), |dir| dir.display().to_string()),
        [] => ANONYMOUS_SOURCE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompileOutput {
        compile_source(source, &Config::default()).expect("compile")
    }

    #[test]
    fn let_and_increment_round_trip_to_text() {
        let out = compile("void f () { let x = 5; x := x + 1; }");
        assert_eq!(
            out.ir,
            "; ModuleID = '<input>'\n\n\
             %.nonprim = type { i8*, i8* }\n\n\
             define void @$F4main1f$() {\n  \
             %x = alloca i32\n  \
             store i32 5, i32* %x\n  \
             %1 = load i32, i32* %x\n  \
             %2 = add i32 %1, 1\n  \
             store i32 %2, i32* %x\n  \
             ret void\n}\n"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn if_else_uses_two_arms_and_one_merge() {
        let out = compile("void f (bool flag) { let a = 0; if (flag) { a := 1; } else { a := 2; } }");
        let labels: Vec<&str> = out
            .ir
            .lines()
            .filter(|line| line.starts_with(".L"))
            .collect();
        assert_eq!(labels, [".L0:", ".L1:", ".L2:"]);
        assert_eq!(out.ir.matches("br label %.L2").count(), 2);
        assert!(!out.ir.contains("phi"));
    }

    #[test]
    fn functions_in_a_package_see_each_other() {
        let files = [
            SourceFile::new("pkg/a.al", "package util;\ni32 twice (i32 x) { return helper(x) * 2; }"),
            SourceFile::new("pkg/b.al", "package util;\ni32 helper (i32 x) { return x + 1; }"),
        ];
        let out = compile_files(&files, &Config::default()).expect("compile");
        assert!(out.ir.starts_with("; ModuleID = 'pkg'"), "{}", out.ir);
        assert!(out.ir.contains("call i32 @$F4util6helperC$C(i32 %1)"), "{}", out.ir);
        assert!(out.ir.contains("define i32 @$F4util5twiceC$C(i32 %.0)"), "{}", out.ir);
    }

    #[test]
    fn lexical_errors_stop_compilation() {
        let err = compile_source("void f () { let s = \"open; }", &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::Lex { .. }), "{err:?}");
        assert_eq!(err.message(), "unterminated string literal");
    }

    #[test]
    fn syntax_and_type_errors_carry_positions() {
        let err = compile_source("void f () {\n  let x u8: 300;\n}", &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }), "{err:?}");
        assert_eq!(err.span().map(|s| s.line_number()), Some(2));

        let err = compile_source("void f () { break 0; }", &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }), "{err:?}");
    }

    #[test]
    fn warnings_reach_the_caller() {
        let out = compile("void f () { let a = 1, b = 2; a, b := 3; }");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.ir.contains("store i32 3, i32* %a"), "{}", out.ir);
    }

    #[test]
    fn thirty_two_bit_targets_shrink_size() {
        let cfg = Config::default().with_pointer_bits(32);
        let out = compile_source("size f (u8[] s) { return s.length; }", &cfg).expect("compile");
        assert!(out.ir.contains("define i32 @"), "{}", out.ir);
    }

    #[test]
    fn const_qualifier_round_trips() {
        let ty = Type::uint(2);
        let toggled = ty.const_().not_const();
        assert!(toggled.equals_exact(&ty));
        assert_eq!(toggled.encoding(), ty.encoding());
        assert_eq!(toggled.size(), ty.size());
    }

    #[test]
    fn compiles_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.al"), "i32 one () { return 1; }").expect("write");
        let out = compile_dir(dir.path(), &Config::default()).expect("compile");
        assert!(out.ir.contains("ret i32 1"), "{}", out.ir);
    }
}
