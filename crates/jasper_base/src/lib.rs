//! Structural atoms shared by every jasper crate.
//!
//! This crate holds the pieces with no opinion about the language being
//! compiled: a bump arena, a string interner, source locations, and the
//! error type every stage threads through `?`.

pub mod arena;
pub mod error;
pub mod intern;
pub mod loc;

pub use arena::Arena;
pub use error::{CompileError, Note, Result};
pub use intern::{Interner, Symbol};
pub use loc::{Loc, ModuleId};
