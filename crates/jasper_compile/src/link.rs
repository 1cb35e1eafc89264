//! Bitcode output and the external link step.
//!
//! Artifacts are named after the first module and written to the working
//! directory: `<base>.bc` from LLVM's bitcode writer, then
//! `clang -o <base> <base>.bc` with clang's stdout streamed through.

use jasper_base::{CompileError, Result};
use jasper_front::Workspace;
use std::path::{Path, PathBuf};
use std::process::Command;

/// `<base>.<ext>` for the compilation's first module.
pub fn artifact_path(ws: &Workspace, ext: &str) -> PathBuf {
    let base = ws.modules.first().map(|m| m.path.as_str()).unwrap_or("out");
    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    PathBuf::from(stem).with_extension(ext)
}

/// Writes the module as bitcode next to the input, returning the path.
pub fn write_bitcode(module: &inkwell::module::Module, ws: &Workspace) -> Result<PathBuf> {
    let path = artifact_path(ws, "bc");
    if !module.write_bitcode_to_path(&path) {
        return Err(CompileError::raw(format!(
            "failed to write bitcode file {}",
            path.display()
        )));
    }
    Ok(path)
}

/// Links the bitcode into an executable with `clang`.
pub fn link_executable(bitcode: &Path) -> Result<PathBuf> {
    let executable = bitcode.with_extension("");

    let output = Command::new("clang")
        .arg("-o")
        .arg(&executable)
        .arg(bitcode)
        .output()
        .map_err(|e| CompileError::raw(format!("could not run clang: {e}")))?;

    print!("{}", String::from_utf8_lossy(&output.stdout));

    if !output.status.success() {
        return Err(CompileError::raw(format!(
            "clang failed to link {}:\n{}",
            bitcode.display(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(executable)
}
