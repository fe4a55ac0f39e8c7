//! End-to-end pipeline: source text in, a `LinkedModule` or a fully run
//! program out. Mirrors the teacher's own split between compiling and
//! executing a module, minus the resumable-generator machinery its
//! `Runner` needs for `async`/external-call suspension points — this
//! language has neither (see spec.md's Non-goals).

use crate::bootstrap;
use crate::bytecode::LinkedModule;
use crate::check::Checker;
use crate::codegen::CodeGen;
use crate::error::VenomResult;
use crate::io::PrintWriter;
use crate::lexer;
use crate::parser;
use crate::symbol::SymbolTable;
use crate::types::TypeRegistry;
use crate::value::Cell;
use crate::vm::Vm;

/// The five CLI trace/print flags of spec.md §6, threaded explicitly through
/// the pipeline rather than read from process-global state — the Open
/// Question resolution recorded in `DESIGN.md`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub trace_lex: bool,
    pub trace_parse: bool,
    pub semantic_check_only: bool,
    pub print_ast: bool,
    pub print_bytecode: bool,
}

/// Lexes, parses, checks, and lowers `src` into a `LinkedModule`, ready to
/// be handed to `Vm::new`/`Vm::run`.
pub fn compile(src: &str) -> VenomResult<LinkedModule> {
    compile_with_options(src, &CompileOptions::default())
}

/// Same as [`compile`], honoring `opts`'s trace/dump flags. `opts.trace_lex`
/// dumps the full token stream up front rather than interleaving with the
/// scan itself (the lexer has no trace hook of its own, unlike the parser's
/// `trace` flag); `opts.trace_parse` is forwarded straight to
/// `parser::parse`.
pub fn compile_with_options(src: &str, opts: &CompileOptions) -> VenomResult<LinkedModule> {
    let tokens = lexer::lex(src)?;
    if opts.trace_lex {
        for tok in &tokens {
            eprintln!("lex: {tok:?}");
        }
    }
    let mut parsed = parser::parse(&tokens, opts.trace_parse)?;
    if opts.print_ast {
        for &id in &parsed.stmts {
            eprintln!("{:#?}", parsed.ast.stmt(id));
        }
    }

    let mut registry = TypeRegistry::new();
    let mut symtab = SymbolTable::new();
    let root = bootstrap::bootstrap(&mut registry, &mut symtab);

    {
        let mut checker = Checker::new(&mut registry, &mut symtab, &mut parsed.ast);
        checker.check_module(&parsed.stmts)?;
    }

    let codegen = CodeGen::new(&mut registry, &mut symtab, &mut parsed.ast);
    let module = codegen.compile_module(root, &parsed.stmts)?;
    if opts.print_bytecode {
        eprintln!("{module:#?}");
    }
    Ok(module)
}

/// Compiles and runs `src` to completion, writing any `print` output
/// through `writer`. The `Option<Cell>` is whatever the VM finds on the
/// stack once entry code falls off its end (`vm.rs`'s `Vm::run`); Venom
/// programs communicate through `print`, not a script result, so this is
/// `None` unless the module's last top-level statement is a bare expression
/// whose value was never popped.
pub fn run(src: &str, writer: &mut dyn PrintWriter) -> VenomResult<Option<Cell>> {
    let module = compile(src)?;
    let mut vm = Vm::new(&module);
    vm.run(writer)
}

/// Lexes and parses one line for the CLI's no-file REPL stub, returning each
/// top-level statement's debug-formatted AST node rather than the `Ast`
/// itself (the REPL crate has no access to the `ast` module, matching
/// `examples/original_source/src/venom.cc`'s own `pctx.stmts->print(cout)`
/// call, just rendered as `Debug` instead of the original's own printer).
pub fn parse_for_repl(src: &str) -> VenomResult<Vec<String>> {
    let tokens = lexer::lex(src)?;
    let parsed = parser::parse(&tokens, false)?;
    Ok(parsed.stmts.iter().map(|&id| format!("{:#?}", parsed.ast.stmt(id))).collect())
}

/// Same as [`run`], honoring `opts`. When `opts.semantic_check_only` is set,
/// compilation stops after type checking and codegen (spec.md §6: "stop
/// after semantic/type checking; do not execute") and the VM is never
/// constructed; the caller sees `Ok(None)`.
pub fn run_with_options(src: &str, writer: &mut dyn PrintWriter, opts: &CompileOptions) -> VenomResult<Option<Cell>> {
    let module = compile_with_options(src, opts)?;
    if opts.semantic_check_only {
        return Ok(None);
    }
    let mut vm = Vm::new(&module);
    vm.run(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectPrint;

    #[test]
    fn prints_the_stringified_result() {
        let mut out = CollectPrint::default();
        run("print(1 + 2)", &mut out).unwrap();
        assert_eq!(out.joined(), "3");
    }

    #[test]
    fn undefined_function_call_is_a_checked_error() {
        let mut out = CollectPrint::default();
        assert!(run("missing(1)", &mut out).is_err());
    }

    #[test]
    fn prints_a_string_literal() {
        let mut out = CollectPrint::default();
        run(r#"print("hello")"#, &mut out).unwrap();
        assert_eq!(out.joined(), "hello");
    }

    #[test]
    fn semantic_check_only_does_not_execute() {
        let mut out = CollectPrint::default();
        let opts = CompileOptions {
            semantic_check_only: true,
            ..CompileOptions::default()
        };
        let result = run_with_options("print(1)", &mut out, &opts).unwrap();
        assert_eq!(result, None);
        assert_eq!(out.joined(), "");
    }
}
