//! Symbol tables and declarations.
//!
//! A symbol table is a flat list of resolvable declarations plus a parent
//! pointer. Lookup scans the table then walks parents; the builtin table is
//! the root of every chain. `using` injection appends new entries to a
//! table lazily (see `check::usings`), each carrying the path of `using`
//! declarations the code generator must walk to reach the member.
//!
//! Declarations double as the scheduler's unit of work: each one owns the
//! flattened list of type-check steps for its subtree and a cursor into
//! it. A declaration is fully typed exactly when the cursor has passed the
//! last step.

use crate::ast::NodeId;
use crate::types::TypeId;
use jasper_base::{Loc, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub(crate) u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResdeclId(pub(crate) u32);

impl ResdeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a symbol table belongs to. Ordering matters: `TopLevel` and
/// `Struct` scopes register *all* their declarations for out-of-order
/// resolution, not just constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeKind {
    Scope,
    Procedure,
    TopLevel,
    Struct,
}

impl ScopeKind {
    /// True for scopes whose declarations resolve out of order.
    pub fn registers_all(self) -> bool {
        self >= ScopeKind::TopLevel
    }
}

/// One flattened type-check step: check the node against the symbol table
/// it appears under.
#[derive(Debug, Clone, Copy)]
pub struct TypeRecurse {
    pub node: NodeId,
    pub scope: ScopeId,
}

/// A declaration known to the scheduler.
#[derive(Debug)]
pub struct Declaration {
    pub name: Symbol,
    /// The `Declare` AST node.
    pub node: NodeId,
    /// Cursor into `steps`; the declaration is typed when it reaches the end.
    pub next_step: usize,
    pub steps: Vec<TypeRecurse>,
}

impl Declaration {
    pub fn is_checked(&self) -> bool {
        self.next_step >= self.steps.len()
    }
}

/// A declaration as visible from some symbol table, with the `using` path
/// (outermost first) codegen walks to address the member through nested
/// injected fields.
#[derive(Debug, Clone)]
pub struct ResolveDecl {
    pub decl: DeclId,
    pub using_path: Vec<DeclId>,
}

/// A bound polymorphic type variable.
#[derive(Debug, Clone)]
pub struct PolyArg {
    pub name: Symbol,
    pub tid: TypeId,
    pub loc: Loc,
}

/// One memoized specialization of a polymorphic procedure.
#[derive(Debug)]
pub struct Specialization {
    pub args: Vec<PolyArg>,
    pub resdecl: ResdeclId,
}

/// A polymorphic procedure parked on the scope it was declared in. It does
/// not take part in type checking until a call site binds its variables.
#[derive(Debug)]
pub struct PolyProc {
    /// The constant `Declare` node holding the procedure.
    pub decl_node: NodeId,
    pub specs: Vec<Specialization>,
}

#[derive(Debug)]
pub struct SymbolTable {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub resdecls: Vec<ResdeclId>,
    /// How many of `resdecls` have been examined for `using` expansion.
    pub using_progress: usize,
    pub polyprocs: Vec<PolyProc>,
    /// The `Procedure` AST node, for procedure scopes.
    pub proc: Option<NodeId>,
}

impl SymbolTable {
    pub fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            resdecls: Vec::new(),
            using_progress: 0,
            polyprocs: Vec::new(),
            proc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_top_level_and_struct_scopes_register_all() {
        assert!(ScopeKind::TopLevel.registers_all());
        assert!(ScopeKind::Struct.registers_all());
        assert!(!ScopeKind::Scope.registers_all());
        assert!(!ScopeKind::Procedure.registers_all());
    }

    #[test]
    fn declaration_with_no_steps_counts_as_checked() {
        let decl = Declaration {
            name: Symbol::EMPTY,
            node: crate::ast::AstPool::new().alloc(crate::ast::NodeKind::Empty, Loc::builtin()),
            next_step: 0,
            steps: Vec::new(),
        };
        assert!(decl.is_checked());
    }
}
