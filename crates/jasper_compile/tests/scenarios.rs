//! Full-pipeline scenarios: the `-u` suite plus IR-level checks that the
//! emitter produces the shapes the front end promises.

use inkwell::context::Context;
use jasper_compile::codegen::Generator;
use jasper_compile::selftest;
use jasper_front::Workspace;

#[test]
fn builtin_scenario_suite_passes() {
    if let Err(err) = selftest::run() {
        panic!("{err}");
    }
}

#[test]
fn out_of_order_scenario_runs_standalone() {
    if let Err(err) = selftest::run_one("out_of_order") {
        panic!("{err}");
    }
}

#[test]
fn foreign_printf_scenario_runs_standalone() {
    if let Err(err) = selftest::run_one("extern-printf") {
        panic!("{err}");
    }
}

fn emit(source: &str) -> String {
    let mut ws = Workspace::new();
    ws.add_module_source("test.jai", source);
    jasper_compile::compile::front(&mut ws).expect("front end");
    let context = Context::create();
    let mut generator = Generator::new(&ws, &context, "test");
    generator.generate_all().expect("emission");
    generator.module.print_to_string().to_string()
}

#[test]
fn compound_assignment_emits_add_and_store() {
    let ir = emit("Add :: (n : int) -> int { n += 5; return n; }");
    assert!(ir.contains("add"), "no add in:\n{ir}");
    assert!(ir.contains("store"), "no store in:\n{ir}");
}

#[test]
fn global_initializers_fold_to_constants() {
    let ir = emit("g := 6 * 7;");
    assert!(ir.contains("42"), "initializer not folded in:\n{ir}");
}

#[test]
fn string_globals_reference_private_data() {
    let ir = emit("str := \"hello jasper\";");
    assert!(ir.contains("hello jasper"), "missing string data in:\n{ir}");
    assert!(ir.contains("private"), "string data not private in:\n{ir}");
}

#[test]
fn defers_emit_in_reverse_order() {
    let ir = emit(
        "first :: () #foreign; second :: () #foreign; \
         run :: () { defer first(); defer second(); }",
    );
    let second_at = ir.find("call void @second").expect("second called");
    let first_at = ir.find("call void @first").expect("first called");
    assert!(second_at < first_at, "defers not reversed in:\n{ir}");
}

#[test]
fn foreign_varargs_declare_variadic_functions() {
    let ir = emit(
        "printf :: (format : * char, ..) -> int #foreign; \
         run :: () { printf(\"%d\", 5); }",
    );
    assert!(ir.contains("declare i32 @printf(ptr, ...)"), "bad printf decl in:\n{ir}");
}

#[test]
fn short_circuit_uses_phi_nodes() {
    let ir = emit("test :: (a : bool, b : bool) -> bool { return a and b; }");
    assert!(ir.contains("phi"), "no phi in:\n{ir}");
}

#[test]
fn while_loops_branch_through_a_test_block() {
    let ir = emit("spin :: (n : int) -> int { while n > 0 { n -= 1; } return n; }");
    assert!(ir.contains("whiletest"), "no loop test block in:\n{ir}");
    assert!(ir.contains("whileexit"), "no loop exit block in:\n{ir}");
}

#[test]
fn polymorphic_specializations_generate_bodies() {
    let ir = emit(
        "identity :: (x : $T) -> T { return x; } \
         v : int; w : float; \
         drive :: () -> int { x := identity(v); y := identity(w); return x; }",
    );
    // The driver plus one body per bound type.
    assert_eq!(ir.matches("define").count(), 3, "missing specializations in:\n{ir}");
}
