//! CLI driver: `venom [flags] [file]`. Grounded directly on
//! `ouros-cli/src/main.rs`'s own shape (plain `env::args()`, no
//! argument-parsing crate, `ExitCode` SUCCESS/FAILURE, `eprintln!`
//! diagnostics) and, for the flag table and the no-file REPL stub, on
//! `examples/original_source/src/venom.cc`'s own `main()`.

use std::{
    env, fs,
    io::{self, BufRead, Write},
    process::ExitCode,
};

use venom::{run_with_options, CompileOptions, StdPrint};

fn main() -> ExitCode {
    let mut opts = CompileOptions::default();
    let mut path: Option<String> = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-p" => opts.trace_parse = true,
            "-s" => opts.trace_lex = true,
            "-c" => opts.semantic_check_only = true,
            "--print-ast" => opts.print_ast = true,
            "--print-bytecode" => opts.print_bytecode = true,
            other => path = Some(other.to_string()),
        }
    }

    let Some(path) = path else {
        return repl();
    };

    let src = match fs::read_to_string(&path) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("error: could not read '{path}': {err}");
            return ExitCode::FAILURE;
        }
    };

    match run_with_options(&src, &mut StdPrint, &opts) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", err.kind, err.message);
            ExitCode::FAILURE
        }
    }
}

/// With no file name, spec.md §6 calls for a REPL stub: read lines, print
/// parsed ASTs. Stops on an empty line or EOF, matching
/// `examples/original_source/src/venom.cc`'s own `main()`.
fn repl() -> ExitCode {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("input: ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        if line.is_empty() {
            break;
        }
        match venom::parse_for_repl(&line) {
            Ok(stmts) => {
                for s in stmts {
                    println!("{s:#?}");
                }
            }
            Err(err) => eprintln!("{}: {}", err.kind, err.message),
        }
    }
    ExitCode::SUCCESS
}
