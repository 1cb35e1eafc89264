//! Lazy `using` expansion.
//!
//! A declaration flagged `using` injects the members of its struct type
//! into the enclosing symbol table. Expansion is lazy and iterative: each
//! lookup first walks to the root of the scope chain and, per table,
//! examines declarations not yet visited. Members are imported as new
//! resolve-decls carrying the path of `using` declarations from the outer
//! table down to the member, which codegen later walks as nested member
//! accesses. Imported entries with their own `using` flag expand in turn,
//! extending the path.
//!
//! Expansion suspends when a used declaration's type is not resolved yet,
//! and errors on non-struct types and on cycles (a struct reachable from
//! its own injected members).

use super::{Checker, Pending};
use crate::ast::NodeKind;
use crate::scope::ScopeId;
use crate::types::Type;
use jasper_base::{CompileError, Loc, Result, Symbol};

impl Checker<'_> {
    /// Brings `scope` (and its parents) up to date on `using` injection.
    pub(crate) fn resolve_usings(&mut self, scope: ScopeId) -> Result<Pending<()>> {
        if let Some(parent) = self.ws.scope(scope).parent {
            if let Pending::Waiting(decl) = self.resolve_usings(parent)? {
                return Ok(Pending::Waiting(decl));
            }
        }

        loop {
            let progress = self.ws.scope(scope).using_progress;
            if progress >= self.ws.scope(scope).resdecls.len() {
                return Ok(Pending::Ready(()));
            }

            let rd = self.ws.scope(scope).resdecls[progress];
            let decl = self.ws.resdecl(rd).decl;
            let node = self.ws.decl(decl).node;

            let is_using = matches!(&self.ws.ast[node].kind, NodeKind::Declare(d) if d.using);
            if !is_using {
                self.ws.scope_mut(scope).using_progress += 1;
                continue;
            }

            // The used declaration's type must be known before its members
            // can be injected.
            let Some(tid) = self.ws.ast[node].tid else {
                return Ok(Pending::Waiting(decl));
            };

            let loc = self.ws.ast[node].loc;
            if !matches!(self.ws.types[tid], Type::Struct { .. }) {
                return Err(CompileError::new(
                    format!("cannot apply using to non-struct type {}", self.ws.type_name(tid)),
                    loc,
                ));
            }

            let struct_scope = self.ws.member_scope(tid).ok_or_else(|| {
                CompileError::new("struct type has no member table", loc)
            })?;
            if struct_scope == scope {
                return Err(CompileError::new("loop in using members", loc));
            }

            // A `using` whose path already passes through a field of this
            // same struct type would re-inject forever.
            let path = self.ws.resdecl(rd).using_path.clone();
            for &link in &path {
                let link_node = self.ws.decl(link).node;
                if self.ws.ast[link_node].tid == Some(tid) {
                    return Err(CompileError::new("loop in using members", loc));
                }
            }

            let mut imported_path = path;
            imported_path.push(decl);

            // Direct members only; entries the struct itself gained via
            // `using` are reached through their own expansion here.
            let member_rds = self.ws.scope(struct_scope).resdecls.clone();
            for member_rd in member_rds {
                if !self.ws.resdecl(member_rd).using_path.is_empty() {
                    continue;
                }
                let member_decl = self.ws.resdecl(member_rd).decl;
                let member = self.ws.decl(member_decl);
                let (name, member_node) = (member.name, member.node);
                let ignore_procs = self.ws.decl_is_procedure(member_node);
                self.ws.check_duplicate(scope, name, ignore_procs, self.ws.ast[member_node].loc)?;
                self.ws.add_resolve_decl(scope, member_decl, imported_path.clone());
            }

            self.ws.scope_mut(scope).using_progress += 1;
        }
    }

    /// Full symbol lookup: expand `using`s up the chain, then scan scopes
    /// outward. Suspends until the found declaration's type is known.
    pub(crate) fn resolve_symbol_with_using(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        loc: Loc,
    ) -> Result<Pending<Option<crate::scope::ResdeclId>>> {
        if let Pending::Waiting(decl) = self.resolve_usings(scope)? {
            return Ok(Pending::Waiting(decl));
        }

        let rd = self.ws.lookup_resdecl(scope, name, false, loc)?;
        if let Some(rd) = rd {
            let decl = self.ws.resdecl(rd).decl;
            if self.ws.decl_tid(decl).is_none() {
                return Ok(Pending::Waiting(decl));
            }
        }
        Ok(Pending::Ready(rd))
    }
}
