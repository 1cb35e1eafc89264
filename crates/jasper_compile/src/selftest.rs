//! The built-in scenario suite behind `-u`/`--run-unit-tests`.
//!
//! Each scenario compiles a snippet through the full pipeline - parse,
//! type check, LLVM emission and verification - then renders one named
//! declaration through the s-expression printer, in syntax and in type
//! mode, and compares against the expected text. The integration tests
//! under `tests/` run the same table through `cargo test`.

use crate::codegen::Generator;
use inkwell::context::Context;
use jasper_base::{CompileError, Loc, Result};
use jasper_front::{check, parser, print, Workspace};

struct Scenario {
    name: &'static str,
    decl: &'static str,
    source: &'static str,
    syntax: &'static str,
    types: &'static str,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "out_of_order",
        decl: "a",
        source: "a := b; b : int : 5;",
        syntax: "(DeclareSingle var a infer-type 'b)",
        types: "(DeclareSingle s32 infer-type s32)",
    },
    Scenario {
        name: "proc-simple",
        decl: "a",
        source: "a :: (b : int) { }",
        syntax: "(DeclareSingle const a infer-type (Procedure (args (DeclareSingle var b 'int)) (Block)))",
        types: "(DeclareSingle (Proc s32) infer-type (Procedure (Proc s32) (args (DeclareSingle s32 (Type s32))) (Block void)))",
    },
    Scenario {
        name: "operator-lit",
        decl: "a",
        source: "a := 5 + 1028;",
        syntax: "(DeclareSingle var a infer-type (+ 0x5 0x404))",
        types: "(DeclareSingle s16 infer-type (+ s16 IntLit IntLit))",
    },
    Scenario {
        name: "operator-intflt",
        decl: "a",
        source: "a := 6 + 5.0;",
        syntax: "(DeclareSingle var a infer-type (+ 6 5))",
        types: "(DeclareSingle f32 infer-type (+ f32 FloatLit FloatLit))",
    },
    Scenario {
        name: "operator-intfltvar",
        decl: "a",
        source: "b :: 5.0;a := 6 + b;",
        syntax: "(DeclareSingle var a infer-type (+ 6 'b))",
        types: "(DeclareSingle f32 infer-type (+ f32 FloatLit f32))",
    },
    Scenario {
        name: "operator-fltdbl",
        decl: "a",
        source: "b :: 5.0;c : double : 5.0;a := b + c;",
        syntax: "(DeclareSingle var a infer-type (+ (Cast implicit 'b) 'c))",
        types: "(DeclareSingle f64 infer-type (+ f64 (Cast f64 implicit f32) f64))",
    },
    Scenario {
        name: "operator-bool",
        decl: "a",
        source: "b :: true;c :: false;a := b != c;",
        syntax: "(DeclareSingle var a infer-type (!= 'b 'c))",
        types: "(DeclareSingle bool infer-type (!= bool bool bool))",
    },
    Scenario {
        name: "operator-compare",
        decl: "a",
        source: "a := 5 < 6.5;",
        syntax: "(DeclareSingle var a infer-type (< 5 6.5))",
        types: "(DeclareSingle bool infer-type (< bool FloatLit FloatLit))",
    },
    Scenario {
        name: "operator-struct",
        decl: "a",
        source: "S :: struct { a :: \"6.0\"; }a :: S.a;",
        syntax: "(DeclareSingle const a infer-type (. 'S 'a))",
        types: "(DeclareSingle string infer-type (. string (Type S) string))",
    },
    Scenario {
        name: "operator-pluseq",
        decl: "Add",
        source: "Add :: (n : int) -> int { n += 5; return n; } ",
        syntax: "(DeclareSingle const Add infer-type (Procedure (args (DeclareSingle var n 'int)) (returns 'int) \
                 (Block (+= 'n 0x5) (Return 'n))))",
        types: "(DeclareSingle (Proc s32 -> s32) infer-type (Procedure (Proc s32 -> s32) (args (DeclareSingle s32 (Type s32))) \
                (returns (Type s32)) (Block void (+= void s32 IntLit) (Return s32 s32))))",
    },
    Scenario {
        name: "operator-logand-precedence",
        decl: "a",
        source: "a := 5 != 10 && true;",
        syntax: "(DeclareSingle var a infer-type (and (!= 0x5 0xa) true))",
        types: "(DeclareSingle bool infer-type (and bool (!= bool IntLit IntLit) BoolLit))",
    },
    Scenario {
        name: "extern-printf",
        decl: "printf",
        source: "printf :: (format : * char, ..) -> int #foreign;",
        syntax: "(DeclareSingle const printf infer-type (Procedure (#foreign) (args (DeclareSingle var format (TypePointer 'char)) \
                 (DeclareSingle var <no-name> ..)) (returns 'int)))",
        types: "(DeclareSingle (Proc (* u8) -> s32) infer-type (Procedure (Proc (* u8) -> s32) \
                (args (DeclareSingle (* u8) (TypePointer (Type (* u8)) (Type u8))) (DeclareSingle .. (Type ..))) (returns (Type s32))))",
    },
    Scenario {
        name: "global-string",
        decl: "str",
        source: "str := \"hello string\";",
        syntax: "(DeclareSingle var str infer-type \"hello string\")",
        types: "(DeclareSingle string infer-type StringLit)",
    },
];

/// Compiles one snippet and checks a declaration's dump in both modes.
pub fn check_declaration(
    name: &str,
    decl: &str,
    source: &str,
    expected_syntax: &str,
    expected_types: &str,
) -> Result<()> {
    let mut ws = Workspace::new();
    ws.add_module_source(name, source);
    parser::parse_all(&mut ws)?;
    check::type_check_all(&mut ws)?;

    let context = Context::create();
    let mut generator = Generator::new(&ws, &context, name);
    generator.generate_all()?;

    let sym = ws
        .interner
        .lookup(decl)
        .ok_or_else(|| CompileError::raw(format!("{name}: no symbol named {decl}")))?;
    let rd = ws
        .lookup_resdecl(ws.root_scope, sym, false, Loc::builtin())?
        .ok_or_else(|| CompileError::raw(format!("{name}: can't find declaration {decl}")))?;
    let node = ws.decl(ws.resdecl(rd).decl).node;

    let syntax = print::dump_node(&ws, node, false);
    if syntax != expected_syntax {
        return Err(CompileError::raw(format!(
            "{name}: declaration {decl} syntax dump doesn't match:\n expected \"{expected_syntax}\"\n found    \"{syntax}\""
        )));
    }

    let types = print::dump_node(&ws, node, true);
    if types != expected_types {
        return Err(CompileError::raw(format!(
            "{name}: declaration {decl} type dump doesn't match:\n expected \"{expected_types}\"\n found    \"{types}\""
        )));
    }

    Ok(())
}

/// Runs the whole table, stopping at the first failure.
pub fn run() -> Result<()> {
    for scenario in SCENARIOS {
        check_declaration(
            scenario.name,
            scenario.decl,
            scenario.source,
            scenario.syntax,
            scenario.types,
        )?;
    }
    Ok(())
}

/// Runs a single scenario by name.
pub fn run_one(name: &str) -> Result<()> {
    let scenario = SCENARIOS
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| CompileError::raw(format!("no scenario named {name}")))?;
    check_declaration(
        scenario.name,
        scenario.decl,
        scenario.source,
        scenario.syntax,
        scenario.types,
    )
}
