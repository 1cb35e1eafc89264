//! End-to-end front-end scenarios: source text through parsing and the
//! out-of-order type checker, verified through declaration type dumps and
//! workspace state.

use jasper_base::{CompileError, Loc};
use jasper_front::types::TypeId;
use jasper_front::{check, eval, parser, print, Workspace};

fn check_source(source: &str) -> Workspace {
    let mut ws = Workspace::new();
    ws.add_module_source("test.jai", source);
    parser::parse_all(&mut ws).expect("parse");
    if let Err(err) = check::type_check_all(&mut ws) {
        panic!("type check failed: {}", ws.render_error(&err));
    }
    ws
}

fn check_source_err(source: &str) -> CompileError {
    let mut ws = Workspace::new();
    ws.add_module_source("test.jai", source);
    parser::parse_all(&mut ws).expect("parse");
    check::type_check_all(&mut ws).expect_err("expected a type error")
}

fn decl_node(ws: &Workspace, name: &str) -> jasper_front::ast::NodeId {
    let sym = ws.interner.lookup(name).expect("symbol interned");
    let rd = ws
        .lookup_resdecl(ws.root_scope, sym, false, Loc::builtin())
        .expect("lookup")
        .expect("declaration exists");
    ws.decl(ws.resdecl(rd).decl).node
}

fn decl_tid(ws: &Workspace, name: &str) -> TypeId {
    ws.ast[decl_node(ws, name)].tid.expect("declaration typed")
}

fn decl_type_name(ws: &Workspace, name: &str) -> String {
    let tid = decl_tid(ws, name);
    ws.types.display(tid, &ws.interner)
}

fn typed_dump(ws: &Workspace, name: &str) -> String {
    print::dump_node(ws, decl_node(ws, name), true)
}

// ---------------------------------------------------------------------
// Out-of-order resolution

#[test]
fn forward_reference_resolves_out_of_order() {
    let ws = check_source("a := b; b : int : 5;");
    assert_eq!(typed_dump(&ws, "a"), "(DeclareSingle s32 infer-type s32)");
    assert_eq!(decl_type_name(&ws, "b"), "s32");
}

#[test]
fn constants_resolve_forward_at_any_scope() {
    let ws = check_source("f :: () -> int { return N; } N :: 41;");
    assert_eq!(decl_type_name(&ws, "f"), "() -> s32");
}

#[test]
fn dependency_cycle_is_reported_with_chain() {
    let err = check_source_err("a :: b; b :: a;");
    assert!(err.message.contains("cycle"), "got: {}", err.message);
    assert!(!err.notes.is_empty());
}

#[test]
fn self_reference_is_a_cycle() {
    let err = check_source_err("a :: a + 1;");
    assert!(err.message.contains("cycle"), "got: {}", err.message);
}

#[test]
fn unknown_identifier_is_reported() {
    let err = check_source_err("a := missing;");
    assert!(err.message.contains("couldn't find declaration"), "got: {}", err.message);
}

#[test]
fn duplicate_symbol_reports_both_locations() {
    let err = check_source_err("x := 5; x := 6;");
    assert!(err.message.contains("duplicate symbol x"), "got: {}", err.message);
    assert_eq!(err.notes.len(), 1);
}

// ---------------------------------------------------------------------
// Literal inference and coercion

#[test]
fn int_literals_infer_smallest_signed_type() {
    let ws = check_source("a := 5; b := 200; c := 70000; d := 5000000000;");
    assert_eq!(decl_type_name(&ws, "a"), "s8");
    // 200 does not fit s8; the default must fit, so it widens to s16.
    assert_eq!(decl_type_name(&ws, "b"), "s16");
    assert_eq!(decl_type_name(&ws, "c"), "s32");
    assert_eq!(decl_type_name(&ws, "d"), "s64");
}

#[test]
fn mixed_literal_addition_takes_common_type() {
    let ws = check_source("a := 5 + 1028;");
    assert_eq!(typed_dump(&ws, "a"), "(DeclareSingle s16 infer-type (+ s16 IntLit IntLit))");
}

#[test]
fn float_widening_wraps_in_implicit_cast() {
    let ws = check_source("b :: 5.0; c : double : 5.0; a := b + c;");
    assert_eq!(
        typed_dump(&ws, "a"),
        "(DeclareSingle f64 infer-type (+ f64 (Cast f64 implicit f32) f64))"
    );
}

#[test]
fn comparisons_return_bool() {
    let ws = check_source("a := 5 < 6.5;");
    assert_eq!(decl_type_name(&ws, "a"), "bool");
}

#[test]
fn string_literal_coerces_to_c_string_only_for_u8_pointer() {
    let ws = check_source("f :: (s : * char) { } g :: () { f(\"hi\"); }");
    assert_eq!(decl_type_name(&ws, "f"), "(* u8)");

    let err = check_source_err("f :: (s : * int) { } g :: () { f(\"hi\"); }");
    assert!(err.message.contains("overload"), "got: {}", err.message);
}

#[test]
fn incompatible_assignment_is_reported() {
    let err = check_source_err("f :: () { x : s8 = 5; x = 1000; }");
    assert!(err.message.contains("invalid operator ="), "got: {}", err.message);
}

// ---------------------------------------------------------------------
// Casts

#[test]
fn explicit_casts_between_numeric_types() {
    let ws = check_source("a := cast(s64) 5; b := cast(float) 2; c := cast(u8) 3.5;");
    assert_eq!(decl_type_name(&ws, "a"), "s64");
    assert_eq!(decl_type_name(&ws, "b"), "float");
    assert_eq!(decl_type_name(&ws, "c"), "u8");
}

#[test]
fn auto_cast_takes_type_from_context() {
    let ws = check_source("f :: (x : float) -> float { return x; } a := f(xx 5);");
    assert_eq!(decl_type_name(&ws, "a"), "float");
}

#[test]
fn invalid_cast_pair_is_reported() {
    let err = check_source_err("S :: struct { x : int; } f :: (s : S) { y := cast(int) s; }");
    assert!(err.message.contains("cannot convert"), "got: {}", err.message);
}

// ---------------------------------------------------------------------
// Structs, members, using

#[test]
fn struct_member_constant_through_type_name() {
    let ws = check_source("S :: struct { a :: \"6.0\"; } a :: S.a;");
    assert_eq!(typed_dump(&ws, "a"), "(DeclareSingle string infer-type (. string (Type S) string))");
}

#[test]
fn member_access_auto_derefs_one_pointer_level() {
    let ws = check_source("V :: struct { x : int; } f :: (p : * V) -> int { return p.x; }");
    assert_eq!(decl_type_name(&ws, "f"), "(* V) -> s32");
}

#[test]
fn variable_member_through_type_name_is_rejected() {
    let err = check_source_err("V :: struct { x : int; } a := V.x;");
    assert!(err.message.contains("only constants"), "got: {}", err.message);
}

#[test]
fn self_referential_struct_through_pointer() {
    let ws = check_source("Node :: struct { next : * Node; value : int; }");
    let node_tid = ws
        .types
        .unwrap_typeof(decl_tid(&ws, "Node"))
        .expect("struct declaration names a type");
    let layout = ws.layout(node_tid).unwrap();
    assert_eq!(layout.offsets, vec![0, 8]);
    assert_eq!(layout.size, 16);
}

#[test]
fn using_injects_struct_members() {
    let ws = check_source(
        "V :: struct { x : int; y : int; } f :: () -> int { using v : V; return x; }",
    );
    assert_eq!(decl_type_name(&ws, "f"), "() -> s32");
}

#[test]
fn using_a_non_struct_is_rejected() {
    let err = check_source_err("f :: () { using v : int; x := y; }");
    assert!(err.message.contains("non-struct"), "got: {}", err.message);
}

#[test]
fn mutual_using_is_detected_as_a_loop() {
    let err = check_source_err(
        "A :: struct { using b : B; } B :: struct { using a : A; } \
         f :: () { using q : A; x := missing; }",
    );
    assert!(err.message.contains("loop in using"), "got: {}", err.message);
}

#[test]
fn using_reexpansion_is_idempotent() {
    // Two lookups through the same table must not re-inject members; the
    // second injection would be a duplicate-symbol error.
    let ws = check_source(
        "V :: struct { x : int; } f :: () -> int { using v : V; a := x; b := x; return a + b; }",
    );
    assert_eq!(decl_type_name(&ws, "f"), "() -> s32");
}

// ---------------------------------------------------------------------
// Arrays and layout

#[test]
fn array_sizes_evaluate_at_compile_time() {
    let ws = check_source("N :: #run 2 + 3; arr : [N * 2] int;");
    assert_eq!(decl_type_name(&ws, "arr"), "[10] s32");
}

#[test]
fn array_members_have_view_types() {
    let ws = check_source("f :: (xs : [] int) -> u32 { return xs.c; }");
    assert_eq!(decl_type_name(&ws, "f"), "([] s32) -> u32");
}

#[test]
fn fixed_array_count_is_a_constant_member() {
    let ws = check_source("arr : [4] int; n :: arr.c;");
    assert_eq!(decl_type_name(&ws, "n"), "u32");
}

#[test]
fn struct_layout_pads_to_member_alignment() {
    let ws = check_source("V :: struct { a : s8; b : s32; c : s16; }");
    let tid = ws.types.unwrap_typeof(decl_tid(&ws, "V")).unwrap();
    let layout = ws.layout(tid).unwrap();
    assert_eq!(layout.offsets, vec![0, 4, 8]);
    assert_eq!(layout.align, 4);
    assert_eq!(layout.size, 12);
    assert_eq!(layout.size % layout.align, 0);
}

#[test]
fn structurally_identical_types_share_type_ids() {
    let ws = check_source("a : * int; b : * int; c : [] float; d : [] float;");
    assert_eq!(decl_tid(&ws, "a"), decl_tid(&ws, "b"));
    assert_eq!(decl_tid(&ws, "c"), decl_tid(&ws, "d"));
}

#[test]
fn distinct_struct_bodies_are_distinct_types() {
    let ws = check_source("A :: struct { x : int; } B :: struct { x : int; }");
    assert_ne!(decl_tid(&ws, "A"), decl_tid(&ws, "B"));
}

// ---------------------------------------------------------------------
// Procedures, overloads, polymorphism

#[test]
fn compound_assignment_types_void() {
    let ws = check_source("Add :: (n : int) -> int { n += 5; return n; }");
    assert_eq!(
        typed_dump(&ws, "Add"),
        "(DeclareSingle (Proc s32 -> s32) infer-type (Procedure (Proc s32 -> s32) \
         (args (DeclareSingle s32 (Type s32))) (returns (Type s32)) \
         (Block void (+= void s32 IntLit) (Return s32 s32))))"
    );
}

#[test]
fn foreign_c_vararg_signature() {
    let ws = check_source("printf :: (format : * char, ..) -> int #foreign;");
    assert_eq!(decl_type_name(&ws, "printf"), "(* u8) -> s32");
}

#[test]
fn overload_picks_the_matching_candidate() {
    let ws = check_source(
        "f :: (x : int) -> int { return 1; } f :: (x : float) -> float { return 2.0; } \
         b := f(5.5);",
    );
    assert_eq!(decl_type_name(&ws, "b"), "float");
}

#[test]
fn ambiguous_overload_is_reported_with_candidates() {
    let err = check_source_err(
        "f :: (x : int) -> int { return x; } f :: (x : s16) -> int { return 1; } a := f(5);",
    );
    assert!(err.message.contains("overload"), "got: {}", err.message);
    assert_eq!(err.notes.len(), 2);
}

#[test]
fn return_arity_mismatch_is_reported() {
    let err = check_source_err("f :: () -> int { return; }");
    assert!(err.message.contains("return values"), "got: {}", err.message);
}

#[test]
fn polymorphic_procedure_specializes_on_argument_type() {
    let ws = check_source("identity :: (x : $T) -> T { return x; } v : int; a := identity(v);");
    assert_eq!(decl_type_name(&ws, "a"), "s32");
}

#[test]
fn polymorphic_specializations_memoize_per_type_tuple() {
    let ws = check_source(
        "identity :: (x : $T) -> T { return x; } \
         p : * int; q : float; \
         a := identity(p); b := identity(p); c := identity(q);",
    );
    assert_eq!(decl_type_name(&ws, "a"), "* s32");
    assert_eq!(decl_type_name(&ws, "c"), "float");
    // Two distinct argument tuples mean exactly two generated bodies
    // (plus none for the unspecialized original).
    assert_eq!(ws.modules[0].gen_procs.len(), 2);
}

#[test]
fn repeated_polymorphic_variables_must_agree() {
    let ws = check_source(
        "pick :: (x : $T, y : T) -> T { return x; } a : s64; b : s64; c := pick(a, b);",
    );
    assert_eq!(decl_type_name(&ws, "c"), "s64");

    let err = check_source_err(
        "pick :: (x : $T, y : T) -> T { return x; } a : s64; b : bool; c := pick(a, b);",
    );
    assert!(err.message.contains("overload"), "got: {}", err.message);
}

#[test]
fn polymorphic_pointer_parameters_bind_the_pointee() {
    let ws = check_source("deref :: (p : * $T) -> T { return << p; } v : * double; a := deref(v);");
    assert_eq!(decl_type_name(&ws, "a"), "double");
}

// ---------------------------------------------------------------------
// Compile-time evaluation

#[test]
fn constant_expressions_fold_through_identifiers() {
    let ws = check_source("G :: 6; x := G * 7;");
    let value = data_of(&ws, "x");
    assert_eq!(value, vec![42]);
}

#[test]
fn run_directive_takes_expression_type() {
    let ws = check_source("v :: #run 256 + 1;");
    assert_eq!(decl_type_name(&ws, "v"), "s16");
}

#[test]
fn short_circuit_folds_in_constants() {
    let ws = check_source("a :: false; b :: a and (1 / 0 == 1);");
    // `and` short-circuits before the division can fault.
    assert_eq!(data_of(&ws, "b"), vec![0]);
}

fn data_of(ws: &Workspace, name: &str) -> Vec<u8> {
    let node = decl_node(ws, name);
    let value = match &ws.ast[node].kind {
        jasper_front::ast::NodeKind::Declare(data) => data.value.expect("value"),
        _ => panic!("not a declaration"),
    };
    eval::eval_const(ws, value).expect("constant evaluation")
}

// ---------------------------------------------------------------------
// Builtins

#[test]
fn sizeof_and_alignof_are_u64() {
    let ws = check_source("a := sizeof(s64); b := alignof(s16);");
    assert_eq!(decl_type_name(&ws, "a"), "u64");
    assert_eq!(decl_type_name(&ws, "b"), "u64");
}

#[test]
fn int_and_char_alias_their_fixed_widths() {
    let ws = check_source("a : int; b : char; c : f64;");
    assert_eq!(decl_type_name(&ws, "a"), "s32");
    assert_eq!(decl_type_name(&ws, "b"), "u8");
    assert_eq!(decl_type_name(&ws, "c"), "double");
}

#[test]
fn enum_constants_live_in_the_enum_namespace() {
    let ws = check_source("E :: enum { A; B; C; } x := E.B;");
    assert_eq!(data_of_value(&ws, "x"), vec![1]);
}

fn data_of_value(ws: &Workspace, name: &str) -> Vec<u8> {
    data_of(ws, name)
}

// ---------------------------------------------------------------------
// Statements the checker deliberately rejects

#[test]
fn for_loops_are_rejected_for_now() {
    let err = check_source_err("f :: () { for x : 5 { } }");
    assert!(err.message.contains("for loops"), "got: {}", err.message);
}

#[test]
fn multi_declarations_are_rejected_for_now() {
    let err = check_source_err("f :: () { a, b := 5; }");
    assert!(err.message.contains("multi-value"), "got: {}", err.message);
}
