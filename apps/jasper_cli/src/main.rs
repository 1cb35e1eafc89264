//! jasperc - the jasper compiler driver.
//!
//! `jasperc [options] <file>` compiles a module (and everything it
//! imports) to an executable via LLVM bitcode and `clang`. The first
//! error of any stage is rendered with its source line and caret
//! underline, and the process exits non-zero.

use clap::Parser;
use jasper_base::CompileError;
use jasper_front::{print, Workspace};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "jasperc")]
#[command(about = "The jasper compiler", version)]
struct Cli {
    /// Run the built-in scenario suite
    #[arg(short = 'u', long = "run-unit-tests")]
    run_unit_tests: bool,

    /// Dump each module's AST after compilation
    #[arg(short = 's', long = "print-syntax")]
    print_syntax: bool,

    /// Dump each module's AST with resolved types
    #[arg(short = 't', long = "print-types")]
    print_types: bool,

    /// Write textual LLVM IR next to the input
    #[arg(short = 'b', long = "write-bitcode")]
    write_bitcode: bool,

    /// Source file to compile
    input: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.run_unit_tests {
        if let Err(err) = jasper_compile::selftest::run() {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
        println!("all scenarios passed");
        if cli.input.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    let Some(input) = cli.input else {
        eprintln!("no input file passed; see jasperc --help");
        return ExitCode::FAILURE;
    };

    let mut ws = Workspace::new();
    ws.add_module_file(&input);

    if let Err(err) = jasper_compile::compile::front(&mut ws) {
        report(&ws, &err);
        return ExitCode::FAILURE;
    }

    match jasper_compile::compile::build(&ws, cli.write_bitcode) {
        Ok(artifacts) => {
            println!("compiled {}", artifacts.executable.display());
            if let Some(ir) = artifacts.ir {
                println!("wrote {}", ir.display());
            }
        }
        Err(err) => {
            report(&ws, &err);
            return ExitCode::FAILURE;
        }
    }

    if cli.print_syntax {
        println!("tracing AST for all modules");
        for index in 0..ws.modules.len() {
            println!("\nmodule {}", ws.modules[index].path);
            println!("{}", print::dump_module(&ws, index, false));
        }
    }

    if cli.print_types {
        println!("tracing typed AST for all modules");
        for index in 0..ws.modules.len() {
            println!("\nmodule {}", ws.modules[index].path);
            println!("{}", print::dump_module(&ws, index, true));
        }
    }

    ExitCode::SUCCESS
}

fn report(ws: &Workspace, err: &CompileError) {
    eprint!("{}", ws.render_error(err));
}
