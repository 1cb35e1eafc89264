//! The compiler's error type.
//!
//! Every stage returns `Result<T, CompileError>` and propagates with `?`;
//! the driver renders the first error and exits non-zero. There is no
//! per-stage recovery.
//!
//! A [`CompileError`] carries an optional primary location and any number
//! of follow-up [`Note`]s; notes are how multi-location diagnostics
//! (duplicate symbol, overload candidates, dependency cycles) print each
//! of their locations.

use crate::loc::Loc;
use std::fmt;

/// A secondary message attached to a [`CompileError`].
#[derive(Debug, Clone)]
pub struct Note {
    pub message: String,
    pub loc: Loc,
}

/// A fatal compilation error.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    /// Primary location. `None` for driver errors with no source position
    /// (file open failure, linker failure, internal emission errors).
    pub loc: Option<Loc>,
    pub notes: Vec<Note>,
}

impl CompileError {
    /// An error at a source location.
    pub fn new(message: impl Into<String>, loc: Loc) -> Self {
        Self { message: message.into(), loc: Some(loc), notes: Vec::new() }
    }

    /// An error with no source location.
    pub fn raw(message: impl Into<String>) -> Self {
        Self { message: message.into(), loc: None, notes: Vec::new() }
    }

    /// Appends a follow-up note at another location.
    pub fn with_note(mut self, message: impl Into<String>, loc: Loc) -> Self {
        self.notes.push(Note { message: message.into(), loc });
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) if !loc.module.is_builtin() => {
                write!(f, "{} at {}:{}", self.message, loc.line, loc.col)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Alias used throughout the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::ModuleId;

    #[test]
    fn display_includes_location() {
        let err = CompileError::new("unexpected token", Loc::new(ModuleId(0), 3, 7, 20, 21));
        let text = format!("{err}");
        assert!(text.contains("unexpected token"));
        assert!(text.contains("3:7"));
    }

    #[test]
    fn raw_error_has_no_position() {
        let err = CompileError::raw("could not read file");
        assert_eq!(format!("{err}"), "could not read file");
    }

    #[test]
    fn notes_accumulate() {
        let err = CompileError::new("duplicate symbol", Loc::builtin())
            .with_note("original symbol", Loc::builtin());
        assert_eq!(err.notes.len(), 1);
    }
}
