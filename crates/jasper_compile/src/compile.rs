//! The compilation pipeline.
//!
//! `compile_file` runs discovery, parsing and type checking and hands the
//! typed workspace back; `build` emits LLVM IR, writes bitcode, and
//! drives the external link. The split exists so the CLI can dump the
//! (typed) AST without touching LLVM, and so tests can stop at any stage.

use crate::codegen::Generator;
use crate::link;
use inkwell::context::Context;
use jasper_base::Result;
use jasper_front::{check, parser, Workspace};
use log::debug;
use std::path::PathBuf;

/// Artifacts produced by a successful build.
pub struct BuildArtifacts {
    pub bitcode: PathBuf,
    pub executable: PathBuf,
    /// Textual IR, when requested.
    pub ir: Option<PathBuf>,
}

/// Parses and type checks the module rooted at `path`, following
/// `#import`s.
pub fn compile_file(path: &str) -> Result<Workspace> {
    let mut ws = Workspace::new();
    ws.add_module_file(path);
    front(&mut ws)?;
    Ok(ws)
}

/// The front half of the pipeline, for workspaces with sources injected.
pub fn front(ws: &mut Workspace) -> Result<()> {
    parser::parse_all(ws)?;
    check::type_check_all(ws)
}

/// Emits, writes bitcode, and links. `write_ir` additionally writes the
/// textual `.ll` next to the input.
pub fn build(ws: &Workspace, write_ir: bool) -> Result<BuildArtifacts> {
    let module_name = ws.modules.first().map(|m| m.path.clone()).unwrap_or_default();

    let context = Context::create();
    let mut generator = Generator::new(ws, &context, &module_name);
    generator.generate_all()?;

    let ir = if write_ir {
        let path = link::artifact_path(ws, "ll");
        generator
            .module
            .print_to_file(&path)
            .map_err(|e| jasper_base::CompileError::raw(e.to_string_lossy().into_owned()))?;
        Some(path)
    } else {
        None
    };

    let bitcode = link::write_bitcode(&generator.module, ws)?;
    debug!("wrote bitcode {}", bitcode.display());
    let executable = link::link_executable(&bitcode)?;

    Ok(BuildArtifacts { bitcode, executable, ir })
}
