//! Overload resolution and polymorphic specialization.
//!
//! A call through an identifier scans the scope chain outward. In each
//! table, every same-named candidate is graded: `Exact` when all arguments
//! already have the parameter types, `Coerce` when any needs an implicit
//! conversion, `None` when one cannot convert. Non-constant candidates
//! (procedure pointers) grade `Exact` outright, and C-vararg candidates
//! admit extra arguments. The best grade wins; two candidates left at the
//! same grade is an ambiguity.
//!
//! Only when no ordinary candidate has matched are the scope's parked
//! polymorphic procedures tried: each parameter's type AST is structurally
//! matched against the argument's type, first extracting `$T` bindings,
//! then confirming that repeated variables agree. A successful binding
//! tuple is memoized - the procedure subtree is cloned, the placeholders
//! become ordinary typed declarations, and the clone is flattened and
//! scheduled like any other declaration.

use super::{Checker, Pending};
use crate::ast::{NodeId, NodeKind};
use crate::scope::{PolyArg, ResdeclId, ScopeId, Specialization};
use crate::types::Type;
use jasper_base::{CompileError, Result};
use log::debug;

/// Candidate grade; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Matchk {
    None,
    Coerce,
    Exact,
}

/// Most candidates listed in an ambiguity diagnostic.
const MAX_REPORTED_CANDIDATES: usize = 8;

impl Checker<'_> {
    /// Resolves the callee of `call` (an identifier) against the scope
    /// chain, specializing polymorphic procedures as needed.
    pub(crate) fn resolve_overload(
        &mut self,
        start_scope: ScopeId,
        call: NodeId,
    ) -> Result<Pending<ResdeclId>> {
        let (callee, args) = match self.ws.ast[call].kind.clone() {
            NodeKind::Call { callee, args } => (callee, args),
            _ => unreachable!("resolve_overload takes a call node"),
        };
        let name = match self.ws.ast[callee].kind {
            NodeKind::Identifier { name } => name,
            _ => unreachable!("resolve_overload takes an identifier callee"),
        };
        let call_loc = self.ws.ast[call].loc;

        if let Pending::Waiting(decl) = self.resolve_usings(start_scope)? {
            return Ok(Pending::Waiting(decl));
        }

        let mut best = Matchk::None;
        let mut matches: Vec<ResdeclId> = Vec::new();

        let mut scope_iter = Some(start_scope);
        while let Some(scope) = scope_iter {
            let rds = self.ws.scope(scope).resdecls.clone();
            for rd in rds {
                let decl = self.ws.resdecl(rd).decl;
                if self.ws.decl(decl).name != name {
                    continue;
                }

                let decl_node = self.ws.decl(decl).node;
                let Some(proc_tid) = self.ws.ast[decl_node].tid else {
                    return Ok(Pending::Waiting(decl));
                };

                let Type::Procedure { args: params, c_vararg, .. } = self.ws.types[proc_tid].clone()
                else {
                    return Err(CompileError::new("cannot call a non-procedure", call_loc));
                };

                let constant = match &self.ws.ast[decl_node].kind {
                    NodeKind::Declare(data) => data.constant,
                    _ => false,
                };

                let matchk = if !constant {
                    // A procedure pointer: no signature to pick between.
                    Matchk::Exact
                } else {
                    if params.len() != args.len() && (!c_vararg || params.len() > args.len()) {
                        continue;
                    }
                    let mut grade = Matchk::Exact;
                    for (i, &param) in params.iter().enumerate() {
                        let arg = args[i];
                        if self.ws.ast[arg].tid == Some(param) {
                            continue;
                        }
                        if !self.can_coerce(arg, param) {
                            grade = Matchk::None;
                            break;
                        }
                        grade = Matchk::Coerce;
                    }
                    grade
                };

                if matchk < best {
                    continue;
                }
                if matchk > best {
                    matches.clear();
                }
                if matches.len() < MAX_REPORTED_CANDIDATES {
                    matches.push(rd);
                }
                best = matchk;
            }

            if best == Matchk::None {
                match self.try_polymorphic_candidates(scope, name, &args, &mut matches)? {
                    Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                    Pending::Ready(true) => best = Matchk::Exact,
                    Pending::Ready(false) => {}
                }
            }

            scope_iter = self.ws.scope(scope).parent;
        }

        if best == Matchk::None || matches.len() != 1 {
            let mut err = CompileError::new(
                format!(
                    "couldn't find a matching overload for call to {}",
                    self.ws.interner.resolve(name)
                ),
                call_loc,
            );
            for &rd in &matches {
                let node = self.ws.decl(self.ws.resdecl(rd).decl).node;
                err = err.with_note("candidate procedure", self.ws.ast[node].loc);
            }
            return Err(err);
        }

        Ok(Pending::Ready(matches[0]))
    }

    /// Tries every polymorphic procedure parked on `scope`. Returns
    /// `Ready(true)` when at least one specialized exactly.
    fn try_polymorphic_candidates(
        &mut self,
        scope: ScopeId,
        name: jasper_base::Symbol,
        args: &[NodeId],
        matches: &mut Vec<ResdeclId>,
    ) -> Result<Pending<bool>> {
        let mut any = false;

        let candidates = self.ws.scope(scope).polyprocs.len();
        for index in 0..candidates {
            let decl_node = self.ws.scope(scope).polyprocs[index].decl_node;
            let decl_name = match &self.ws.ast[decl_node].kind {
                NodeKind::Declare(data) => data.name,
                _ => None,
            };
            if decl_name != Some(name) {
                continue;
            }

            let proc_node = match &self.ws.ast[decl_node].kind {
                NodeKind::Declare(data) => data.value.unwrap_or(decl_node),
                _ => decl_node,
            };
            let param_decls = match &self.ws.ast[proc_node].kind {
                NodeKind::Procedure(proc) => proc.args.clone(),
                _ => continue,
            };
            if param_decls.len() != args.len() {
                continue;
            }

            // First pass extracts the `$T` bindings, the second confirms
            // that every occurrence resolves to the same types.
            let mut bindings: Vec<PolyArg> = Vec::new();
            let mut ok = true;
            for pass in [true, false] {
                for (i, &param_decl) in param_decls.iter().enumerate() {
                    let ty = match &self.ws.ast[param_decl].kind {
                        NodeKind::Declare(data) => data.ty,
                        _ => None,
                    };
                    let Some(ty) = ty else {
                        ok = false;
                        break;
                    };
                    match self.match_polymorph_arg(scope, ty, args[i], pass, &mut bindings)? {
                        Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                        Pending::Ready(Matchk::Exact) => {}
                        Pending::Ready(_) => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    break;
                }
            }
            if !ok {
                continue;
            }

            // Identical bindings reuse the memoized specialization.
            let existing = self.ws.scope(scope).polyprocs[index].specs.iter().find_map(|spec| {
                let same = spec.args.len() == bindings.len()
                    && spec.args.iter().zip(&bindings).all(|(a, b)| a.tid == b.tid);
                same.then_some(spec.resdecl)
            });

            let rd = match existing {
                Some(rd) => rd,
                None => {
                    debug!(
                        "specializing {} over {} type variables",
                        self.ws.interner.resolve(name),
                        bindings.len()
                    );
                    let spec_decl = self.flatten_specialization(decl_node, scope, &bindings)?;
                    let rd = self.ws.add_detached_resolve_decl(spec_decl);
                    self.ws.scope_mut(scope).polyprocs[index]
                        .specs
                        .push(Specialization { args: bindings.clone(), resdecl: rd });
                    rd
                }
            };

            let spec_decl = self.ws.resdecl(rd).decl;
            if self.ws.decl_tid(spec_decl).is_none() {
                return Ok(Pending::Waiting(spec_decl));
            }

            if matches.len() < MAX_REPORTED_CANDIDATES {
                matches.push(rd);
            }
            any = true;
        }

        Ok(Pending::Ready(any))
    }

    /// Structural match of a parameter's type AST against a typed
    /// argument. `extract` collects `$T` bindings; the confirm pass then
    /// checks repeated names against the collected types.
    fn match_polymorph_type(
        &mut self,
        scope: ScopeId,
        type_ast: NodeId,
        arg_tid: crate::types::TypeId,
        extract: bool,
        bindings: &mut Vec<PolyArg>,
    ) -> Result<Pending<Matchk>> {
        let loc = self.ws.ast[type_ast].loc;

        if let Some(tid) = self.ws.ast[type_ast].tid {
            let value = self.unwrap_type(tid, loc)?;
            return Ok(Pending::Ready(exact_if(arg_tid == value)));
        }

        match self.ws.ast[type_ast].kind.clone() {
            NodeKind::TypePolymorphic { name } => {
                if !extract {
                    return Ok(Pending::Ready(Matchk::Exact));
                }
                if bindings.iter().any(|b| b.name == name) {
                    return Err(CompileError::new("duplicate polymorphic parameter", loc));
                }
                bindings.push(PolyArg { name, tid: arg_tid, loc });
                Ok(Pending::Ready(Matchk::Exact))
            }

            NodeKind::Identifier { name } => {
                // Settled only once all bindings are extracted.
                if extract {
                    return Ok(Pending::Ready(Matchk::Exact));
                }
                if let Some(binding) = bindings.iter().find(|b| b.name == name) {
                    return Ok(Pending::Ready(exact_if(arg_tid == binding.tid)));
                }
                let rd = match self.resolve_symbol_with_using(scope, name, loc)? {
                    Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                    Pending::Ready(rd) => rd,
                };
                let Some(rd) = rd else {
                    return Err(CompileError::new(
                        format!(
                            "couldn't find declaration for identifier {}",
                            self.ws.interner.resolve(name)
                        ),
                        loc,
                    ));
                };
                let tid = self
                    .ws
                    .decl_tid(self.ws.resdecl(rd).decl)
                    .expect("resolution suspends until typed");
                self.ws.ast[type_ast].tid = Some(tid);
                let value = self.unwrap_type(tid, loc)?;
                Ok(Pending::Ready(exact_if(arg_tid == value)))
            }

            NodeKind::TypeArray { soa, dynamic, size, inner } => {
                let Type::Array {
                    element,
                    fixed: arg_fixed,
                    dynamic: arg_dynamic,
                    soa: arg_soa,
                } = self.ws.types[arg_tid].clone()
                else {
                    return Ok(Pending::Ready(Matchk::None));
                };
                if soa != arg_soa {
                    return Ok(Pending::Ready(Matchk::None));
                }

                // A plain slice parameter takes any array argument, by
                // view conversion when the argument is fixed or dynamic.
                if !dynamic && size.is_none() {
                    match self.match_polymorph_type(scope, inner, element, extract, bindings)? {
                        Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                        Pending::Ready(Matchk::Exact) => {}
                        Pending::Ready(other) => return Ok(Pending::Ready(other)),
                    }
                    let exact = !arg_dynamic && arg_fixed.is_none();
                    return Ok(Pending::Ready(if exact { Matchk::Exact } else { Matchk::Coerce }));
                }

                // Sized parameters would need value matching.
                if size.is_some() {
                    return Ok(Pending::Ready(Matchk::None));
                }

                if dynamic != arg_dynamic {
                    return Ok(Pending::Ready(Matchk::None));
                }
                self.match_polymorph_type(scope, inner, element, extract, bindings)
            }

            NodeKind::TypePointer { soa, inner } => {
                let Type::Pointer { inner: pointee, soa: arg_soa } = self.ws.types[arg_tid].clone()
                else {
                    return Ok(Pending::Ready(Matchk::None));
                };
                if soa != arg_soa {
                    return Ok(Pending::Ready(Matchk::None));
                }
                self.match_polymorph_type(scope, inner, pointee, extract, bindings)
            }

            NodeKind::TypeProcedure { args, rets } => {
                let Type::Procedure { args: arg_params, rets: arg_rets, .. } =
                    self.ws.types[arg_tid].clone()
                else {
                    return Ok(Pending::Ready(Matchk::None));
                };
                if args.len() != arg_params.len() || rets.len() != arg_rets.len() {
                    return Ok(Pending::Ready(Matchk::None));
                }
                for (decl, tid) in args.iter().zip(arg_params).chain(rets.iter().zip(arg_rets)) {
                    let ty = match &self.ws.ast[*decl].kind {
                        NodeKind::Declare(data) => data.ty,
                        _ => None,
                    };
                    let Some(ty) = ty else { return Ok(Pending::Ready(Matchk::None)) };
                    match self.match_polymorph_type(scope, ty, tid, extract, bindings)? {
                        Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                        Pending::Ready(Matchk::Exact) => {}
                        Pending::Ready(_) => return Ok(Pending::Ready(Matchk::None)),
                    }
                }
                Ok(Pending::Ready(Matchk::Exact))
            }

            NodeKind::TypeVararg => {
                Ok(Pending::Ready(exact_if(matches!(self.ws.types[arg_tid], Type::Vararg))))
            }

            _ => Ok(Pending::Ready(Matchk::None)),
        }
    }

    /// Entry point taking the argument node, so untyped literals can be
    /// matched by coercion heuristics.
    fn match_polymorph_arg(
        &mut self,
        scope: ScopeId,
        type_ast: NodeId,
        arg: NodeId,
        extract: bool,
        bindings: &mut Vec<PolyArg>,
    ) -> Result<Pending<Matchk>> {
        if let Some(arg_tid) = self.ws.ast[arg].tid {
            return self.match_polymorph_type(scope, type_ast, arg_tid, extract, bindings);
        }

        let loc = self.ws.ast[type_ast].loc;
        match self.ws.ast[type_ast].kind.clone() {
            NodeKind::TypePointer { inner, .. } => {
                // A literal can never become a pointer; a polymorphic
                // pointee still counts as a graded (failing) candidate.
                if self.ws.has_polymorphic_type(inner) {
                    Ok(Pending::Ready(Matchk::Coerce))
                } else {
                    Ok(Pending::Ready(Matchk::None))
                }
            }
            NodeKind::Identifier { name } => {
                if let Some(tid) = self.ws.ast[type_ast].tid {
                    let value = self.unwrap_type(tid, loc)?;
                    return Ok(Pending::Ready(exact_if(self.can_coerce(arg, value))));
                }
                if extract {
                    return Ok(Pending::Ready(Matchk::Exact));
                }
                if let Some(binding) = bindings.iter().find(|b| b.name == name) {
                    return Ok(Pending::Ready(exact_if(self.can_coerce(arg, binding.tid))));
                }
                let rd = match self.resolve_symbol_with_using(scope, name, loc)? {
                    Pending::Waiting(decl) => return Ok(Pending::Waiting(decl)),
                    Pending::Ready(rd) => rd,
                };
                let Some(rd) = rd else {
                    return Err(CompileError::new(
                        format!(
                            "couldn't find declaration for identifier {}",
                            self.ws.interner.resolve(name)
                        ),
                        loc,
                    ));
                };
                let tid = self
                    .ws
                    .decl_tid(self.ws.resdecl(rd).decl)
                    .expect("resolution suspends until typed");
                self.ws.ast[type_ast].tid = Some(tid);
                let value = self.unwrap_type(tid, loc)?;
                Ok(Pending::Ready(exact_if(self.can_coerce(arg, value))))
            }
            _ => Ok(Pending::Ready(Matchk::None)),
        }
    }
}

fn exact_if(condition: bool) -> Matchk {
    if condition {
        Matchk::Exact
    } else {
        Matchk::None
    }
}
