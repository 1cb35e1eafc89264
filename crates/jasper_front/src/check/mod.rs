//! The out-of-order type checker.
//!
//! Constants at every scope, and every declaration at file or struct
//! scope, may be referenced before they are declared. The checker handles
//! this without recursing through the call stack:
//!
//! 1. [`flatten`] turns each declaration's subtree into a linear list of
//!    steps (`TypeRecurse`), innermost first, and registers out-of-order
//!    declarations in their symbol tables.
//! 2. The scheduler below advances one declaration step by step. When a
//!    step needs the type of a declaration that is not finished, it
//!    reports a *switch*: the current declaration is pushed on an explicit
//!    wait stack and the scheduler runs the target to completion first.
//!    Switching to a declaration already on the stack is a dependency
//!    cycle and is reported with the whole chain.
//! 3. [`rules`] implements the per-node typing rules, [`coerce`] the
//!    literal/implicit-conversion machinery, [`overload`] call resolution
//!    and polymorphic specialization, and [`usings`] the lazy `using`
//!    expansion.
//!
//! Polymorphic procedures skip step 1: they are parked on their scope and
//!    only specializations (cloned, substituted copies) ever get steps.

mod coerce;
mod flatten;
mod overload;
mod rules;
mod usings;

use crate::ast::NodeKind;
use crate::scope::{DeclId, ScopeKind, TypeRecurse};
use crate::workspace::Workspace;
use jasper_base::{CompileError, Result};
use log::debug;

/// Outcome of an operation that may need another declaration finished
/// first.
pub(crate) enum Pending<T> {
    Ready(T),
    /// Suspend: finish this declaration, then retry the current step.
    Waiting(DeclId),
}

pub(crate) struct Checker<'ws> {
    pub(crate) ws: &'ws mut Workspace,
}

/// Type checks every module in the workspace.
pub fn type_check_all(ws: &mut Workspace) -> Result<()> {
    let mut checker = Checker { ws };
    checker.flatten_modules()?;
    checker.run()
}

impl Checker<'_> {
    fn flatten_modules(&mut self) -> Result<()> {
        for index in 0..self.ws.modules.len() {
            let Some(root) = self.ws.modules[index].root else { continue };
            let stmts = match &self.ws.ast[root].kind {
                NodeKind::Block { stmts } => stmts.clone(),
                _ => Vec::new(),
            };
            let ctx = flatten::FlattenCtx {
                scope: self.ws.root_scope,
                target: None,
                dup: false,
            };
            for stmt in stmts {
                self.flatten_decl(stmt, ctx)?;
            }
        }
        Ok(())
    }

    /// Runs every registered declaration to completion. The scope list
    /// grows while this runs (polymorphic specialization creates scopes),
    /// so the outer bound is re-read each iteration; the per-scope
    /// declaration count is captured at entry, since later additions are
    /// `using` imports of declarations owned elsewhere.
    fn run(&mut self) -> Result<()> {
        let mut waiting: Vec<DeclId> = Vec::new();

        let mut scope_index = 0;
        while scope_index < self.ws.scopes.len() {
            let count = self.ws.scopes[scope_index].resdecls.len();
            for rd_index in 0..count {
                let rd = self.ws.scopes[scope_index].resdecls[rd_index];
                let mut current = self.ws.resdecl(rd).decl;

                loop {
                    if self.ws.decl_is_checked(current) {
                        match waiting.pop() {
                            Some(resumed) => {
                                debug!(
                                    "resuming {} after {}",
                                    self.decl_name(resumed),
                                    self.decl_name(current)
                                );
                                current = resumed;
                                continue;
                            }
                            None => break,
                        }
                    }

                    let decl = self.ws.decl(current);
                    let step = decl.steps[decl.next_step];
                    match self.check_step(step)? {
                        None => self.ws.decl_mut(current).next_step += 1,
                        Some(target) => {
                            self.check_cycle(&waiting, current, target)?;
                            debug!(
                                "suspending {} for {}",
                                self.decl_name(current),
                                self.decl_name(target)
                            );
                            waiting.push(current);
                            current = target;
                        }
                    }
                }
            }
            scope_index += 1;
        }

        Ok(())
    }

    fn check_cycle(&self, waiting: &[DeclId], current: DeclId, target: DeclId) -> Result<()> {
        if !waiting.contains(&target) {
            return Ok(());
        }

        let target_node = self.ws.decl(target).node;
        let mut err = CompileError::new(
            format!(
                "cycle while resolving {}",
                self.ws.interner.resolve(self.ws.decl(target).name)
            ),
            self.ws.ast[target_node].loc,
        );
        let chain_start = waiting.iter().position(|&d| d == target).unwrap_or(0);
        for &link in waiting[chain_start..].iter().chain(std::iter::once(&current)) {
            let node = self.ws.decl(link).node;
            err = err.with_note(
                format!("required by {}", self.ws.interner.resolve(self.ws.decl(link).name)),
                self.ws.ast[node].loc,
            );
        }
        Err(err)
    }

    fn decl_name(&self, decl: DeclId) -> &str {
        self.ws.interner.resolve(self.ws.decl(decl).name)
    }

    /// Finds the enclosing procedure's symbol table, for `return`.
    pub(crate) fn enclosing_procedure_scope(&self, step: &TypeRecurse) -> Option<crate::scope::ScopeId> {
        let mut current = Some(step.scope);
        while let Some(scope) = current {
            if self.ws.scope(scope).kind != ScopeKind::Scope {
                return (self.ws.scope(scope).kind == ScopeKind::Procedure).then_some(scope);
            }
            current = self.ws.scope(scope).parent;
        }
        None
    }
}
