use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use alpha_core::diagnostic::Diagnostic;
use alpha_core::mangle::demangle;
use alpha_core::span::Span;
use alpha_core::{Config, CoreError, SourceFile, compile_files, load_sources, parse_files};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(version, about = "Compile Alpha sources to LLVM IR", long_about = None)]
struct Cli {
    /// Source file or package directory; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Llvm)]
    emit: Emit,

    /// Pointer width of the target
    #[arg(long, default_value_t = 64, value_parser = parse_bits)]
    bits: u32,

    /// Do not emit null and bounds checks on array indexing
    #[arg(long)]
    no_bound_check: bool,

    /// Package name for files without a `package` header
    #[arg(long, default_value = "main")]
    package: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors and suppress warnings
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Textual LLVM IR
    Llvm,
    /// Parsed syntax tree
    Ast,
    /// Decode mangled symbols, one per line
    Demangle,
}

fn parse_bits(text: &str) -> Result<u32, String> {
    match text {
        "32" => Ok(32),
        "64" => Ok(64),
        other => Err(format!("unsupported pointer width {other}; expected 32 or 64")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };
    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true);
    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}

fn execute(cli: &Cli) -> Result<()> {
    let cfg = Config::default()
        .with_pointer_bits(cli.bits)
        .with_bound_check(!cli.no_bound_check)
        .with_package(cli.package.clone());

    match cli.emit {
        Emit::Demangle => {
            let text = read_input_text(cli.input.as_deref())?;
            write_output(cli.output.as_deref(), demangle_lines(&text, &cfg).as_bytes())
        }
        Emit::Ast => {
            let files = read_sources(cli.input.as_deref())?;
            let mut warnings = Vec::new();
            let units = parse_files(&files, &cfg, &mut warnings)
                .map_err(|err| located(&err, &files))?;
            report_warnings(&warnings, &files, cli.quiet);
            let mut out = String::new();
            for unit in &units {
                out.push_str(&format!("{unit:#?}\n"));
            }
            write_output(cli.output.as_deref(), out.as_bytes())
        }
        Emit::Llvm => {
            let files = read_sources(cli.input.as_deref())?;
            debug!(files = files.len(), "sources read");
            let output = compile_files(&files, &cfg).map_err(|err| located(&err, &files))?;
            report_warnings(&output.warnings, &files, cli.quiet);
            write_output(cli.output.as_deref(), output.ir.as_bytes())
        }
    }
}

/// Decoded signature per symbol; lines that are not mangled names pass
/// through unchanged.
fn demangle_lines(text: &str, cfg: &Config) -> String {
    let mut out = String::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match demangle(line, cfg) {
            Some(decoded) => out.push_str(&decoded.to_string()),
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

fn read_input_text(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn read_sources(input: Option<&Path>) -> Result<Vec<SourceFile>> {
    match input {
        Some(dir) if dir.is_dir() => {
            let files = load_sources(dir)
                .with_context(|| format!("failed to read package {}", dir.display()))?;
            if files.is_empty() {
                return Err(anyhow!("no .al files found in {}", dir.display()));
            }
            Ok(files)
        }
        Some(path) => Ok(vec![SourceFile::new(path, read_input_text(Some(path))?)]),
        None => Ok(vec![SourceFile::new("<stdin>", read_input_text(None)?)]),
    }
}

/// `file:line:col` for a span, using the file table of this compilation.
fn position(span: Span, files: &[SourceFile]) -> String {
    let file = files
        .get(span.file.0 as usize)
        .map_or_else(|| "<unknown>".to_string(), |f| f.path.display().to_string());
    format!("{file}:{span}")
}

fn located(err: &CoreError, files: &[SourceFile]) -> anyhow::Error {
    let Some(span) = err.span() else {
        return anyhow!("{err}");
    };
    let mut text = format!("{}: {}", position(span, files), err.message());
    if let Some(note) = err.note() {
        text.push('\n');
        text.push_str(note.trim_end());
    }
    anyhow!(text)
}

fn report_warnings(warnings: &[Diagnostic], files: &[SourceFile], quiet: bool) {
    if quiet {
        return;
    }
    for warning in warnings {
        eprintln!("warning: {}: {}", position(warning.span, files), warning.message);
    }
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes).context("failed to write stdout")?;
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    fn alpha() -> Command {
        Command::cargo_bin("alpha-cli").expect("binary exists")
    }

    #[test]
    fn emits_llvm_ir_to_a_file() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("answer.al");
        fs::write(&input_path, "i32 answer () { return 42; }").expect("write input");
        let output_path = dir.path().join("out/answer.ll");

        alpha()
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .assert()
            .success();

        let ir = fs::read_to_string(&output_path).expect("read ir");
        assert!(ir.contains("define i32 @$F4main6answerC$()"), "{ir}");
        assert!(ir.contains("ret i32 42"), "{ir}");
    }

    #[test]
    fn compiles_a_package_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("a.al"),
            "package calc;\ni32 twice (i32 x) { return inc(x) * 2; }",
        )
        .expect("write a");
        fs::write(
            dir.path().join("b.al"),
            "package calc;\ni32 inc (i32 x) { return x + 1; }",
        )
        .expect("write b");

        alpha()
            .arg("--input")
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("@$F4calc3incC$C"));
    }

    #[test]
    fn reports_errors_with_file_and_position() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("bad.al");
        fs::write(&input_path, "void f () {\n  let x u8: 256;\n}").expect("write input");

        alpha()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("bad.al:2:"))
            .stderr(predicate::str::contains("integer literal outside range for type"));
    }

    #[test]
    fn reads_stdin_and_honours_bound_check_flag() {
        let source = "i32 first (i32[] a) { return a[0]; }";

        alpha()
            .write_stdin(source)
            .assert()
            .success()
            .stdout(predicate::str::contains("@$$oobmsg"));

        alpha()
            .arg("--no-bound-check")
            .write_stdin(source)
            .assert()
            .success()
            .stdout(predicate::str::contains("@$$oobmsg").not());
    }

    #[test]
    fn thirty_two_bit_target() {
        alpha()
            .args(["--bits", "32"])
            .write_stdin("size len (u8[] s) { return s.length; }")
            .assert()
            .success()
            .stdout(predicate::str::contains("load i32, i32*"));

        alpha()
            .args(["--bits", "16"])
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported pointer width 16"));
    }

    #[test]
    fn demangles_symbols() {
        alpha()
            .args(["--emit", "demangle"])
            .write_stdin("$F4main4pairCt$\nputs\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("(i32, bool) main.pair ()"))
            .stdout(predicate::str::contains("puts"));
    }

    #[test]
    fn prints_the_syntax_tree() {
        alpha()
            .args(["--emit", "ast"])
            .write_stdin("void f () { }")
            .assert()
            .success()
            .stdout(predicate::str::contains("Function"));
    }

    #[test]
    fn warnings_are_printed_unless_quiet() {
        let source = "void f () { let a = 1, b = 2; a, b := 3; }";
        alpha()
            .write_stdin(source)
            .assert()
            .success()
            .stderr(predicate::str::contains("warning: <stdin>:1:"));

        alpha()
            .arg("--quiet")
            .write_stdin(source)
            .assert()
            .success()
            .stderr(predicate::str::contains("warning").not());
    }
}
