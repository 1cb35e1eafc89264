//! The workspace: the single owning aggregate for one compilation.
//!
//! Everything the pipeline builds lives here - interned strings, the AST
//! pool, the type table, symbol tables, declarations, the resolved-symbol
//! map, struct member scopes - and everything is keyed by a `Copy` id, so
//! no stage holds long borrows across another stage's mutations.
//!
//! Layout (size/align/offsets) is memoized per type and computed only on
//! demand, so a struct whose body is still being type checked never gets
//! laid out.

use crate::ast::{AstPool, NodeId, NodeKind};
use crate::scope::{
    DeclId, Declaration, ResdeclId, ResolveDecl, ScopeId, ScopeKind, SymbolTable,
};
use crate::types::{Layout, Type, TypeId, TypeTable};
use jasper_base::{CompileError, Interner, Loc, ModuleId, Result, Symbol};
use std::cell::RefCell;
use std::collections::HashMap;

/// One source file.
#[derive(Debug)]
pub struct Module {
    pub path: String,
    /// Loaded lazily by the driver; tests inject sources directly.
    pub source: Option<String>,
    /// Root block, set after parsing.
    pub root: Option<NodeId>,
    /// Non-foreign procedures to generate code for, in type-check order.
    pub gen_procs: Vec<NodeId>,
}

/// Frequently used builtin type ids.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub void_: TypeId,
    pub bool_: TypeId,
    pub s8: TypeId,
    pub s16: TypeId,
    pub s32: TypeId,
    pub s64: TypeId,
    pub u8_: TypeId,
    pub u16_: TypeId,
    pub u32_: TypeId,
    pub u64_: TypeId,
    pub float: TypeId,
    pub double: TypeId,
    pub string: TypeId,
}

pub struct Workspace {
    pub interner: Interner,
    pub ast: AstPool,
    pub types: TypeTable,
    pub modules: Vec<Module>,

    pub scopes: Vec<SymbolTable>,
    pub decls: Vec<Declaration>,
    pub resdecls: Vec<ResolveDecl>,

    /// Identifier (and member) nodes to their resolution, for codegen.
    pub resolved: HashMap<NodeId, ResdeclId>,
    /// Struct-shaped type to the symbol table its members resolve under.
    pub member_scopes: HashMap<TypeId, ScopeId>,
    /// Member declarations, in layout order, of struct-*viewed* types
    /// (string, slices, dynamic arrays). Plain structs keep members in
    /// their `Type`.
    pub struct_views: HashMap<TypeId, Vec<NodeId>>,
    /// Types that become named LLVM structs, in registration order.
    pub named_structs: Vec<TypeId>,

    pub builtin_scope: ScopeId,
    pub root_scope: ScopeId,
    pub tids: BuiltinTypes,

    layouts: RefCell<HashMap<TypeId, Layout>>,
}

impl Workspace {
    pub fn new() -> Self {
        let interner = Interner::new();
        let ast = AstPool::new();
        let mut types = TypeTable::new();

        let tids = BuiltinTypes {
            void_: types.ensure(Type::Void),
            bool_: types.ensure(Type::Bool),
            s8: types.ensure(Type::S8),
            s16: types.ensure(Type::S16),
            s32: types.ensure(Type::S32),
            s64: types.ensure(Type::S64),
            u8_: types.ensure(Type::U8),
            u16_: types.ensure(Type::U16),
            u32_: types.ensure(Type::U32),
            u64_: types.ensure(Type::U64),
            float: types.ensure(Type::Float),
            double: types.ensure(Type::Double),
            string: types.ensure(Type::String),
        };

        let mut ws = Workspace {
            interner,
            ast,
            types,
            modules: Vec::new(),
            scopes: Vec::new(),
            decls: Vec::new(),
            resdecls: Vec::new(),
            resolved: HashMap::new(),
            member_scopes: HashMap::new(),
            struct_views: HashMap::new(),
            named_structs: Vec::new(),
            builtin_scope: ScopeId(0),
            root_scope: ScopeId(0),
            tids,
            layouts: RefCell::new(HashMap::new()),
        };

        ws.builtin_scope = ws.create_scope(ScopeKind::Scope, None);
        ws.root_scope = ws.create_scope(ScopeKind::TopLevel, Some(ws.builtin_scope));
        ws.install_builtins();
        ws
    }

    fn install_builtins(&mut self) {
        let tids = self.tids;
        self.add_builtin_type("void", tids.void_);
        self.add_builtin_type("bool", tids.bool_);
        self.add_builtin_type("s64", tids.s64);
        self.add_builtin_type("u64", tids.u64_);
        self.add_builtin_type("s32", tids.s32);
        self.add_builtin_type("u32", tids.u32_);
        self.add_builtin_type("s16", tids.s16);
        self.add_builtin_type("u16", tids.u16_);
        self.add_builtin_type("s8", tids.s8);
        self.add_builtin_type("u8", tids.u8_);
        self.add_builtin_type("int", tids.s32);
        self.add_builtin_type("char", tids.u8_);
        self.add_builtin_type("float", tids.float);
        self.add_builtin_type("double", tids.double);
        self.add_builtin_type("f32", tids.float);
        self.add_builtin_type("f64", tids.double);
        self.install_string_type();
    }

    fn add_builtin_type(&mut self, name: &str, tid: TypeId) {
        let wrapped = self.types.wrap_typeof(tid);
        let sym = self.interner.intern(name);
        let node = self.synthesize_typed_decl(sym, wrapped);
        self.add_declaration(self.builtin_scope, sym, node, Vec::new())
            .expect("builtin names are unique");
    }

    fn install_string_type(&mut self) {
        let string = self.tids.string;
        let u8_ptr = self.types.pointer_to(self.tids.u8_);
        let scope = self.create_scope(ScopeKind::Struct, None);

        let data_sym = self.interner.intern("data");
        let data = self.synthesize_typed_decl(data_sym, u8_ptr);
        self.add_declaration(scope, data_sym, data, Vec::new())
            .expect("fresh scope");

        let count_sym = self.interner.intern("count");
        let count = self.synthesize_typed_decl(count_sym, self.tids.u32_);
        self.add_declaration(scope, count_sym, count, Vec::new())
            .expect("fresh scope");

        let string_sym = self.interner.intern("string");
        let wrapped = self.types.wrap_typeof(string);
        let node = self.synthesize_typed_decl(string_sym, wrapped);
        self.add_declaration(self.builtin_scope, string_sym, node, Vec::new())
            .expect("builtin names are unique");

        self.member_scopes.insert(string, scope);
        self.struct_views.insert(string, vec![data, count]);
        self.named_structs.push(string);
    }

    /// Allocates a `Declare` node that is already typed, used for builtins
    /// and the synthetic members of string/array struct views.
    pub fn synthesize_typed_decl(&mut self, name: Symbol, tid: TypeId) -> NodeId {
        let node = self.ast.alloc(
            NodeKind::Declare(crate::ast::DeclareData {
                name: Some(name),
                ty: None,
                value: None,
                constant: false,
                using: false,
            }),
            Loc::builtin(),
        );
        self.ast[node].tid = Some(tid);
        node
    }

    // ------------------------------------------------------------------
    // Modules

    /// Queues a module for compilation. `name.jai` is appended when the
    /// final path segment (last ten bytes, like the original toolchain)
    /// carries no extension; duplicates are ignored.
    pub fn add_module_file(&mut self, path: &str) -> ModuleId {
        let mut path = path.to_string();
        let has_extension = path.bytes().rev().take(10).any(|b| b == b'.');
        if !has_extension {
            path.push_str(".jai");
        }

        for (i, module) in self.modules.iter().enumerate() {
            if module.path == path {
                return ModuleId(i as u32);
            }
        }

        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module { path, source: None, root: None, gen_procs: Vec::new() });
        id
    }

    /// Queues a module with its source already in memory (tests, `-u`).
    pub fn add_module_source(&mut self, path: &str, source: &str) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            path: path.to_string(),
            source: Some(source.to_string()),
            root: None,
            gen_procs: Vec::new(),
        });
        id
    }

    // ------------------------------------------------------------------
    // Nodes

    /// Moves a node's content to a fresh id, migrating side-table entries
    /// keyed by the old id. The old slot is left untouched for the caller
    /// to overwrite (implicit-cast insertion).
    pub fn move_node(&mut self, id: NodeId) -> NodeId {
        let new_id = self.ast.dup(id);
        if let Some(resolution) = self.resolved.remove(&id) {
            self.resolved.insert(new_id, resolution);
        }
        new_id
    }

    // ------------------------------------------------------------------
    // Scopes and declarations

    pub fn create_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(SymbolTable::new(kind, parent));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &SymbolTable {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut SymbolTable {
        &mut self.scopes[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index()]
    }

    pub fn resdecl(&self, id: ResdeclId) -> &ResolveDecl {
        &self.resdecls[id.index()]
    }

    /// True once the declaration's flattened steps have all run.
    pub fn decl_is_checked(&self, id: DeclId) -> bool {
        self.decls[id.index()].is_checked()
    }

    /// The type of the declaration's AST node, if checked that far.
    pub fn decl_tid(&self, id: DeclId) -> Option<TypeId> {
        self.ast[self.decls[id.index()].node].tid
    }

    /// Is this declaration a constant procedure? Overload resolution lets
    /// several of those share a name.
    pub(crate) fn decl_is_procedure(&self, node: NodeId) -> bool {
        match &self.ast[node].kind {
            NodeKind::Declare(d) => match d.value {
                Some(value) => matches!(self.ast[value].kind, NodeKind::Procedure(_)),
                None => false,
            },
            _ => false,
        }
    }

    /// Scans `scope` then its parents for `name`. Procedure declarations
    /// are skipped when `ignore_procs` is set, so overloads never collide
    /// with plain symbols. Two non-procedure hits in one table is an
    /// ambiguity error.
    pub fn lookup_resdecl(
        &self,
        scope: ScopeId,
        name: Symbol,
        ignore_procs: bool,
        loc: Loc,
    ) -> Result<Option<ResdeclId>> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            let table = self.scope(scope_id);
            let mut found = None;
            for &rd in &table.resdecls {
                let decl = self.decl(self.resdecl(rd).decl);
                if decl.name != name {
                    continue;
                }
                if ignore_procs && self.decl_is_procedure(decl.node) {
                    continue;
                }
                if let Some(prev) = found {
                    let prev_loc = self.ast[self.decl(self.resdecl(prev).decl).node].loc;
                    let this_loc = self.ast[decl.node].loc;
                    return Err(CompileError::new(
                        format!("ambiguous lookup of {}", self.interner.resolve(name)),
                        loc,
                    )
                    .with_note("first candidate", prev_loc)
                    .with_note("second candidate", this_loc));
                }
                found = Some(rd);
            }
            if found.is_some() {
                return Ok(found);
            }
            current = table.parent;
        }
        Ok(None)
    }

    /// Registers `node` (a `Declare`) under `scope`. A name already
    /// visible from `scope` - including from parent scopes - is a
    /// duplicate, except that procedures may share a name for overloading.
    pub fn add_declaration(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        node: NodeId,
        using_path: Vec<DeclId>,
    ) -> Result<DeclId> {
        let ignore_procs = self.decl_is_procedure(node);
        let loc = self.ast[node].loc;
        self.check_duplicate(scope, name, ignore_procs, loc)?;

        let decl = DeclId(self.decls.len() as u32);
        self.decls.push(Declaration { name, node, next_step: 0, steps: Vec::new() });
        self.add_resolve_decl(scope, decl, using_path);
        Ok(decl)
    }

    pub(crate) fn check_duplicate(
        &self,
        scope: ScopeId,
        name: Symbol,
        ignore_procs: bool,
        loc: Loc,
    ) -> Result<()> {
        if let Some(original) = self.lookup_first(scope, name, ignore_procs) {
            let original_loc = self.ast[self.decl(self.resdecl(original).decl).node].loc;
            return Err(CompileError::new(
                format!("duplicate symbol {}", self.interner.resolve(name)),
                loc,
            )
            .with_note("original symbol", original_loc));
        }
        Ok(())
    }

    /// First match walking the parent chain, without the ambiguity check.
    pub(crate) fn lookup_first(
        &self,
        scope: ScopeId,
        name: Symbol,
        ignore_procs: bool,
    ) -> Option<ResdeclId> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            for &rd in &self.scope(scope_id).resdecls {
                let decl = self.decl(self.resdecl(rd).decl);
                if decl.name != name {
                    continue;
                }
                if ignore_procs && self.decl_is_procedure(decl.node) {
                    continue;
                }
                return Some(rd);
            }
            current = self.scope(scope_id).parent;
        }
        None
    }

    pub fn add_resolve_decl(&mut self, scope: ScopeId, decl: DeclId, using_path: Vec<DeclId>) -> ResdeclId {
        let rd = ResdeclId(self.resdecls.len() as u32);
        self.resdecls.push(ResolveDecl { decl, using_path });
        self.scope_mut(scope).resdecls.push(rd);
        rd
    }

    /// Allocates a resolve-decl without attaching it to any scope
    /// (polymorphic specializations resolve through their memo table).
    pub fn add_detached_resolve_decl(&mut self, decl: DeclId) -> ResdeclId {
        let rd = ResdeclId(self.resdecls.len() as u32);
        self.resdecls.push(ResolveDecl { decl, using_path: Vec::new() });
        rd
    }

    pub fn register_resolved(&mut self, node: NodeId, rd: ResdeclId) {
        debug_assert!(!self.resolved.contains_key(&node));
        self.resolved.insert(node, rd);
    }

    pub fn resolution(&self, node: NodeId) -> Option<ResdeclId> {
        self.resolved.get(&node).copied()
    }

    /// Does this type AST mention a `$T` placeholder anywhere?
    pub fn has_polymorphic_type(&self, node: NodeId) -> bool {
        match &self.ast[node].kind {
            NodeKind::TypePolymorphic { .. } => true,
            NodeKind::TypeArray { inner, .. } | NodeKind::TypePointer { inner, .. } => {
                self.has_polymorphic_type(*inner)
            }
            NodeKind::TypeProcedure { args, rets } => {
                args.iter().chain(rets).any(|&decl| match &self.ast[decl].kind {
                    NodeKind::Declare(data) => {
                        data.ty.is_some_and(|ty| self.has_polymorphic_type(ty))
                    }
                    _ => false,
                })
            }
            _ => false,
        }
    }

    /// Registers the member symbol table of a struct/enum/string/array
    /// type. Struct types (not views) also join the named-struct list for
    /// the emitter.
    pub fn register_member_scope(&mut self, tid: TypeId, scope: ScopeId) {
        debug_assert!(!self.member_scopes.contains_key(&tid));
        self.member_scopes.insert(tid, scope);
        if matches!(self.types[tid], Type::Struct { .. }) {
            self.named_structs.push(tid);
        }
    }

    pub fn member_scope(&self, tid: TypeId) -> Option<ScopeId> {
        self.member_scopes.get(&tid).copied()
    }

    /// Member declarations in layout order for any struct-shaped type.
    pub fn members_of(&self, tid: TypeId) -> Option<&[NodeId]> {
        if let Type::Struct { members, .. } = &self.types[tid] {
            return Some(members);
        }
        self.struct_views.get(&tid).map(|v| v.as_slice())
    }

    // ------------------------------------------------------------------
    // Layout

    pub fn size_of(&self, tid: TypeId) -> Result<u32> {
        Ok(self.layout(tid)?.size)
    }

    pub fn align_of(&self, tid: TypeId) -> Result<u32> {
        Ok(self.layout(tid)?.align)
    }

    /// Size, alignment, and member offsets, memoized per type.
    pub fn layout(&self, tid: TypeId) -> Result<Layout> {
        if let Some(layout) = self.layouts.borrow().get(&tid) {
            return Ok(layout.clone());
        }
        let layout = self.compute_layout(tid)?;
        self.layouts.borrow_mut().insert(tid, layout.clone());
        Ok(layout)
    }

    fn compute_layout(&self, tid: TypeId) -> Result<Layout> {
        let ty = &self.types[tid];
        if let Some(size) = ty.basic_size() {
            return Ok(Layout { size, align: size, offsets: Vec::new() });
        }

        match ty {
            Type::String | Type::Struct { .. } => {
                let members = self
                    .members_of(tid)
                    .ok_or_else(|| CompileError::raw("struct type has no member list"))?;
                self.struct_layout(members.to_vec())
            }
            Type::Array { element, fixed: Some(count), soa, .. } => {
                if *soa {
                    return Err(CompileError::raw("SOA arrays are not supported"));
                }
                let element = self.layout(*element)?;
                Ok(Layout {
                    size: element.size * (*count as u32),
                    align: element.align,
                    offsets: Vec::new(),
                })
            }
            Type::Array { .. } => {
                let members = self
                    .members_of(tid)
                    .ok_or_else(|| CompileError::raw("array type has no struct view"))?;
                self.struct_layout(members.to_vec())
            }
            Type::Enum { backing, .. } => self.layout(*backing),
            _ => Err(CompileError::raw(format!(
                "cannot compute size of type {}",
                self.types.display(tid, &self.interner)
            ))),
        }
    }

    /// Declaration-order layout with per-field alignment padding and final
    /// alignment to the largest member.
    fn struct_layout(&self, members: Vec<NodeId>) -> Result<Layout> {
        let mut size = 0u32;
        let mut max_align = 1u32;
        let mut offsets = Vec::with_capacity(members.len());
        for member in members {
            let member_tid = self.ast[member]
                .tid
                .ok_or_else(|| CompileError::raw("struct member has no type during layout"))?;
            let member_layout = self.layout(member_tid)?;
            max_align = max_align.max(member_layout.align);
            size = align_to(size, member_layout.align);
            offsets.push(size);
            size += member_layout.size;
        }
        size = align_to(size, max_align);
        Ok(Layout { size, align: max_align, offsets })
    }

    // ------------------------------------------------------------------
    // Diagnostics

    pub fn type_name(&self, tid: TypeId) -> String {
        self.types.display(tid, &self.interner)
    }

    /// Renders an error as `file:line:col: error: message` followed by the
    /// source line and a `~` underline of the offending range; notes
    /// render the same way with a `note:` tag.
    pub fn render_error(&self, err: &CompileError) -> String {
        let mut out = String::new();
        self.render_message(&mut out, "error", &err.message, err.loc);
        for note in &err.notes {
            self.render_message(&mut out, "note", &note.message, Some(note.loc));
        }
        out
    }

    fn render_message(&self, out: &mut String, tag: &str, message: &str, loc: Option<Loc>) {
        use std::fmt::Write;
        let Some(loc) = loc.filter(|l| !l.module.is_builtin()) else {
            let _ = writeln!(out, "{tag}: {message}");
            return;
        };

        let module = &self.modules[loc.module.index()];
        let _ = writeln!(out, "{}:{}:{}: {tag}: {message}", module.path, loc.line, loc.col);

        let Some(source) = module.source.as_deref() else { return };
        let lo = (loc.lo as usize).min(source.len());
        let hi = (loc.hi as usize).min(source.len());
        let line_start = source[..lo].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[lo..].find(['\n', '\r']).map_or(source.len(), |i| lo + i);
        let line = &source[line_start..line_end];
        let _ = writeln!(out, "{line}");

        let mut underline = String::new();
        for (i, ch) in line.char_indices() {
            let at = line_start + i;
            if at >= hi.max(lo + 1) {
                break;
            }
            if at >= lo {
                underline.push('~');
            } else if ch == '\t' {
                underline.push('\t');
            } else {
                underline.push(' ');
            }
        }
        if underline.chars().all(|c| c != '~') {
            underline.push('~');
        }
        let _ = writeln!(out, "{underline}");
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_resolve_to_wrapped_types() {
        let mut ws = Workspace::new();
        let int = ws.interner.intern("int");
        let rd = ws
            .lookup_resdecl(ws.root_scope, int, false, Loc::builtin())
            .unwrap()
            .expect("int is builtin");
        let tid = ws.decl_tid(ws.resdecl(rd).decl).unwrap();
        assert_eq!(ws.types.unwrap_typeof(tid), Some(ws.tids.s32));
    }

    #[test]
    fn import_paths_gain_extension_and_dedup() {
        let mut ws = Workspace::new();
        let a = ws.add_module_file("basic");
        let b = ws.add_module_file("basic.jai");
        let c = ws.add_module_file("other.jai");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ws.modules[a.index()].path, "basic.jai");
    }

    #[test]
    fn string_layout_is_pointer_plus_count() {
        let ws = Workspace::new();
        let layout = ws.layout(ws.tids.string).unwrap();
        assert_eq!(layout.align, 8);
        assert_eq!(layout.offsets, vec![0, 8]);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn fixed_array_layout_multiplies_element_size() {
        let mut ws = Workspace::new();
        let arr = ws.types.ensure(Type::Array {
            element: ws.tids.s16,
            fixed: Some(5),
            dynamic: false,
            soa: false,
        });
        let layout = ws.layout(arr).unwrap();
        assert_eq!(layout.size, 10);
        assert_eq!(layout.align, 2);
    }

    #[test]
    fn duplicate_symbols_error_with_both_locations() {
        let mut ws = Workspace::new();
        let name = ws.interner.intern("twice");
        let first = ws.synthesize_typed_decl(name, ws.tids.s32);
        let second = ws.synthesize_typed_decl(name, ws.tids.s64);
        ws.add_declaration(ws.root_scope, name, first, Vec::new()).unwrap();
        let err = ws
            .add_declaration(ws.root_scope, name, second, Vec::new())
            .unwrap_err();
        assert!(err.message.contains("duplicate symbol twice"));
        assert_eq!(err.notes.len(), 1);
    }

    #[test]
    fn shadowing_visible_names_is_rejected() {
        let mut ws = Workspace::new();
        let name = ws.interner.intern("shadow");
        let outer = ws.synthesize_typed_decl(name, ws.tids.s32);
        ws.add_declaration(ws.root_scope, name, outer, Vec::new()).unwrap();

        // Duplicate detection walks the parent chain: a nested scope may
        // not reuse a name that is already visible.
        let inner_scope = ws.create_scope(ScopeKind::Scope, Some(ws.root_scope));
        let inner = ws.synthesize_typed_decl(name, ws.tids.s64);
        assert!(ws.add_declaration(inner_scope, name, inner, Vec::new()).is_err());
    }

    #[test]
    fn error_rendering_underlines_the_range() {
        let mut ws = Workspace::new();
        let module = ws.add_module_source("test.jai", "a := flub;\n");
        let loc = Loc::new(module, 1, 6, 5, 9);
        let err = CompileError::new("couldn't find declaration for identifier", loc);
        let rendered = ws.render_error(&err);
        assert!(rendered.contains("test.jai:1:6: error:"));
        assert!(rendered.contains("a := flub;"));
        assert!(rendered.contains("     ~~~~"));
    }
}
