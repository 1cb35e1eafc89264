//! `#import` discovery against real files.

use jasper_front::{check, parser, Workspace};
use std::fs;

#[test]
fn imports_discover_and_dedup_modules() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("lib.jai"), "LIB_VALUE :: 7;\n").expect("write lib");

    let lib_import = dir.path().join("lib.jai").display().to_string();
    let main_path = dir.path().join("main.jai");
    fs::write(
        &main_path,
        format!("#import \"{lib_import}\"\n#import \"{lib_import}\"\na := LIB_VALUE;\n"),
    )
    .expect("write main");

    let mut ws = Workspace::new();
    ws.add_module_file(main_path.to_str().expect("utf-8 path"));
    parser::parse_all(&mut ws).expect("parse");
    check::type_check_all(&mut ws).expect("check");

    // The doubled import dedups; declarations resolve across modules.
    assert_eq!(ws.modules.len(), 2);
    let sym = ws.interner.lookup("a").expect("a interned");
    let rd = ws
        .lookup_resdecl(ws.root_scope, sym, false, jasper_base::Loc::builtin())
        .expect("lookup")
        .expect("a declared");
    let tid = ws.decl_tid(ws.resdecl(rd).decl).expect("a typed");
    assert_eq!(ws.types.display(tid, &ws.interner), "s8");
}

#[test]
fn missing_files_report_a_driver_error() {
    let mut ws = Workspace::new();
    ws.add_module_file("definitely-does-not-exist.jai");
    let err = parser::parse_all(&mut ws).expect_err("missing file");
    assert!(err.message.contains("could not read file"), "got: {}", err.message);
}
