//! Flattening: AST subtrees to per-declaration step lists.
//!
//! Recursion order is evaluation order - children before parents - so by
//! the time a node's rule runs, everything it reads is already typed or
//! the rule suspends. New symbol tables open at blocks, `if`/`while`/`for`
//! bodies, procedure argument lists (plus the body's own block), struct
//! bodies and enum bodies. Declarations that resolve out of order
//! (constants anywhere, anything at file or struct scope) are registered
//! here; everything else registers when its own rule runs.
//!
//! The same walk, run in `dup` mode, clones a polymorphic procedure's
//! subtree for a specialization: every visited node is copied to a fresh
//! id, and `$T` placeholders are replaced by identifiers that resolve to
//! the bound type variables injected into the procedure scope.

use super::Checker;
use crate::ast::{DeclareData, NodeId, NodeKind};
use crate::scope::{DeclId, PolyArg, PolyProc, ScopeId, ScopeKind, TypeRecurse};
use jasper_base::{CompileError, Result};

#[derive(Clone, Copy)]
pub(crate) struct FlattenCtx {
    pub scope: ScopeId,
    /// Declaration whose step list is being built.
    pub target: Option<DeclId>,
    /// Clone every visited node (polymorphic specialization).
    pub dup: bool,
}

impl Checker<'_> {
    fn prep(&mut self, id: NodeId, ctx: FlattenCtx) -> NodeId {
        if ctx.dup {
            self.ws.ast.dup(id)
        } else {
            id
        }
    }

    fn append_step(&mut self, node: NodeId, ctx: FlattenCtx) -> Result<()> {
        let Some(target) = ctx.target else {
            return Err(CompileError::new(
                "statement is not part of any declaration",
                self.ws.ast[node].loc,
            ));
        };
        self.ws.decl_mut(target).steps.push(TypeRecurse { node, scope: ctx.scope });
        Ok(())
    }

    fn child_scope(&mut self, ctx: FlattenCtx) -> FlattenCtx {
        let scope = self.ws.create_scope(ScopeKind::Scope, Some(ctx.scope));
        FlattenCtx { scope, ..ctx }
    }

    fn set_declare(&mut self, id: NodeId, ty: Option<NodeId>, value: Option<NodeId>) {
        if let NodeKind::Declare(data) = &mut self.ws.ast[id].kind {
            data.ty = ty;
            data.value = value;
        }
    }

    /// Flattens a declaration-position statement (file scope, struct
    /// bodies, and `Declare` nodes anywhere). Returns the node's final id.
    pub(crate) fn flatten_decl(&mut self, id: NodeId, ctx: FlattenCtx) -> Result<NodeId> {
        let loc = self.ws.ast[id].loc;
        match self.ws.ast[id].kind.clone() {
            NodeKind::Declare(data) => self.flatten_declare(id, data, ctx),
            NodeKind::Empty => Ok(self.prep(id, ctx)),
            NodeKind::Import { .. } | NodeKind::ForeignLibrary { .. }
                if self.ws.scope(ctx.scope).kind == ScopeKind::TopLevel =>
            {
                Ok(id)
            }
            _ => Err(CompileError::new(
                "a non-declaration cannot be handled in this scope",
                loc,
            )),
        }
    }

    fn flatten_declare(&mut self, id: NodeId, data: DeclareData, ctx: FlattenCtx) -> Result<NodeId> {
        let loc = self.ws.ast[id].loc;

        // Polymorphic procedures wait for a call site to bind their type
        // variables; park them on the enclosing scope.
        if data.constant {
            if let Some(value) = data.value {
                if let NodeKind::Procedure(proc) = &self.ws.ast[value].kind {
                    if proc.is_polymorphic {
                        debug_assert!(!ctx.dup);
                        self.ws
                            .scope_mut(ctx.scope)
                            .polyprocs
                            .push(PolyProc { decl_node: id, specs: Vec::new() });
                        return Ok(id);
                    }
                }
            }
        }

        let id = self.prep(id, ctx);
        let mut ctx = ctx;

        if let Some(name) = data.name {
            if data.constant || self.ws.scope(ctx.scope).kind.registers_all() {
                let decl = self.ws.add_declaration(ctx.scope, name, id, Vec::new())?;
                if self.ws.scope(ctx.scope).kind != ScopeKind::Procedure {
                    ctx.target = Some(decl);
                }
            }
        }

        let ty = match data.ty {
            Some(ty) => Some(self.flatten(ty, ctx)?),
            None => None,
        };

        if let Some(value) = data.value {
            if matches!(self.ws.ast[value].kind, NodeKind::Procedure(_)) {
                if !data.constant {
                    return Err(CompileError::new(
                        "a procedure must be declared constant",
                        loc,
                    ));
                }

                // Procedures recurse specially so a body can call its own
                // procedure: argument and return types first, then the
                // procedure node and the declaration, then the body.
                let value = self.prep(value, ctx);
                self.set_declare(id, ty, Some(value));

                let mut proc_ctx = ctx;
                self.flatten_proc_args(&mut proc_ctx, value, None)?;
                self.append_step(value, ctx)?;
                self.append_step(id, ctx)?;

                let body = match &self.ws.ast[value].kind {
                    NodeKind::Procedure(proc) => proc.body,
                    _ => None,
                };
                if let Some(body) = body {
                    let new_body = self.flatten(body, proc_ctx)?;
                    if let NodeKind::Procedure(proc) = &mut self.ws.ast[value].kind {
                        proc.body = Some(new_body);
                    }
                }
                return Ok(id);
            }

            let new_value = self.flatten(value, ctx)?;
            self.set_declare(id, ty, Some(new_value));
        } else {
            self.set_declare(id, ty, None);
        }

        self.append_step(id, ctx)?;
        Ok(id)
    }

    /// Opens the procedure scope, injects bound type variables when
    /// specializing, and flattens argument and return types.
    fn flatten_proc_args(
        &mut self,
        ctx: &mut FlattenCtx,
        proc_id: NodeId,
        poly: Option<&[PolyArg]>,
    ) -> Result<()> {
        let scope = self.ws.create_scope(ScopeKind::Procedure, Some(ctx.scope));
        self.ws.scope_mut(scope).proc = Some(proc_id);
        ctx.scope = scope;

        if let Some(args) = poly {
            for arg in args {
                let wrapped = self.ws.types.wrap_typeof(arg.tid);
                let ident = self.ws.ast.alloc(NodeKind::Identifier { name: arg.name }, arg.loc);
                self.ws.ast[ident].tid = Some(wrapped);
                let decl_node = self.ws.ast.alloc(
                    NodeKind::Declare(DeclareData {
                        name: Some(arg.name),
                        ty: None,
                        value: Some(ident),
                        constant: true,
                        using: false,
                    }),
                    arg.loc,
                );
                self.ws.ast[decl_node].tid = Some(wrapped);
                self.ws.add_declaration(scope, arg.name, decl_node, Vec::new())?;
            }
        }

        let (args, rets) = match &self.ws.ast[proc_id].kind {
            NodeKind::Procedure(proc) => (proc.args.clone(), proc.rets.clone()),
            _ => {
                return Err(CompileError::new(
                    "expected a procedure value",
                    self.ws.ast[proc_id].loc,
                ))
            }
        };

        let mut new_args = Vec::with_capacity(args.len());
        for arg in args {
            new_args.push(self.flatten(arg, *ctx)?);
        }

        // Return declarations contribute their type only; the declaration
        // node itself is never stepped or registered.
        let mut new_rets = Vec::with_capacity(rets.len());
        for ret in rets {
            let ret = self.prep(ret, *ctx);
            let ty = match &self.ws.ast[ret].kind {
                NodeKind::Declare(data) => data.ty,
                _ => None,
            };
            let ty = ty.ok_or_else(|| {
                CompileError::new("return declaration carries no type", self.ws.ast[ret].loc)
            })?;
            let new_ty = self.flatten(ty, *ctx)?;
            self.set_declare(ret, Some(new_ty), None);
            new_rets.push(ret);
        }

        if let NodeKind::Procedure(proc) = &mut self.ws.ast[proc_id].kind {
            proc.args = new_args;
            proc.rets = new_rets;
        }
        Ok(())
    }

    /// Flattens one expression/statement subtree. Returns the node's final
    /// id, which differs from `id` in `dup` mode; the caller stores it
    /// back into the parent.
    pub(crate) fn flatten(&mut self, id: NodeId, ctx: FlattenCtx) -> Result<NodeId> {
        let loc = self.ws.ast[id].loc;
        match self.ws.ast[id].kind.clone() {
            NodeKind::Literal(_) | NodeKind::Null => {
                let id = self.prep(id, ctx);
                self.append_step(id, ctx)?;
                Ok(id)
            }

            // Stays untyped; use sites give it meaning.
            NodeKind::Uninitialized => Ok(self.prep(id, ctx)),

            NodeKind::Block { stmts } => {
                let inner = self.child_scope(ctx);
                let id = self.prep(id, ctx);
                let mut new_stmts = Vec::with_capacity(stmts.len());
                for stmt in stmts {
                    new_stmts.push(self.flatten(stmt, inner)?);
                }
                if let NodeKind::Block { stmts } = &mut self.ws.ast[id].kind {
                    *stmts = new_stmts;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Empty | NodeKind::Identifier { .. } | NodeKind::LoopControl(_) => {
                let id = self.prep(id, ctx);
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Operator { op, left, right } => {
                let id = self.prep(id, ctx);
                let new_left = match left {
                    Some(left) => Some(self.flatten(left, ctx)?),
                    None => None,
                };
                // `.` resolves its right-hand identifier itself.
                let new_right = if self.ws.interner.resolve(op) == "." {
                    self.prep(right, ctx)
                } else {
                    self.flatten(right, ctx)?
                };
                if let NodeKind::Operator { left, right, .. } = &mut self.ws.ast[id].kind {
                    *left = new_left;
                    *right = new_right;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::If { cond, pass, else_ } => {
                let id = self.prep(id, ctx);
                let new_cond = self.flatten(cond, ctx)?;
                let pass_ctx = self.child_scope(ctx);
                let new_pass = self.flatten(pass, pass_ctx)?;
                let new_else = match else_ {
                    Some(else_) => {
                        let else_ctx = self.child_scope(ctx);
                        Some(self.flatten(else_, else_ctx)?)
                    }
                    None => None,
                };
                if let NodeKind::If { cond, pass, else_ } = &mut self.ws.ast[id].kind {
                    *cond = new_cond;
                    *pass = new_pass;
                    *else_ = new_else;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::While { cond, body } => {
                let id = self.prep(id, ctx);
                let new_cond = self.flatten(cond, ctx)?;
                let body_ctx = self.child_scope(ctx);
                let new_body = self.flatten(body, body_ctx)?;
                if let NodeKind::While { cond, body } = &mut self.ws.ast[id].kind {
                    *cond = new_cond;
                    *body = new_body;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::For { range, body, .. } => {
                let for_ctx = self.child_scope(ctx);
                let id = self.prep(id, for_ctx);
                let new_range = self.flatten(range, ctx)?;
                self.append_step(id, for_ctx)?;
                let body_ctx = self.child_scope(for_ctx);
                let new_body = self.flatten(body, body_ctx)?;
                if let NodeKind::For { range, body, .. } = &mut self.ws.ast[id].kind {
                    *range = new_range;
                    *body = new_body;
                }
                Ok(id)
            }

            NodeKind::Using { .. } => Err(CompileError::new(
                "using statements are not supported; apply using to a declaration",
                loc,
            )),

            NodeKind::Cast { ty, expr, .. } => {
                let id = self.prep(id, ctx);
                let new_ty = match ty {
                    Some(ty) => Some(self.flatten(ty, ctx)?),
                    None => None,
                };
                let new_expr = self.flatten(expr, ctx)?;
                if let NodeKind::Cast { ty, expr, .. } = &mut self.ws.ast[id].kind {
                    *ty = new_ty;
                    *expr = new_expr;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::New { ty } => {
                let id = self.prep(id, ctx);
                let new_ty = self.flatten(ty, ctx)?;
                if let NodeKind::New { ty } = &mut self.ws.ast[id].kind {
                    *ty = new_ty;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Delete { expr } => {
                let id = self.prep(id, ctx);
                let new_expr = self.flatten(expr, ctx)?;
                if let NodeKind::Delete { expr } = &mut self.ws.ast[id].kind {
                    *expr = new_expr;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Remove { expr } => {
                let id = self.prep(id, ctx);
                let new_expr = self.flatten(expr, ctx)?;
                if let NodeKind::Remove { expr } = &mut self.ws.ast[id].kind {
                    *expr = new_expr;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Defer { stmt } => {
                let id = self.prep(id, ctx);
                let new_stmt = self.flatten(stmt, ctx)?;
                if let NodeKind::Defer { stmt } = &mut self.ws.ast[id].kind {
                    *stmt = new_stmt;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Inline { expr } => {
                let id = self.prep(id, ctx);
                let new_expr = self.flatten(expr, ctx)?;
                if let NodeKind::Inline { expr } = &mut self.ws.ast[id].kind {
                    *expr = new_expr;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::PushContext { body, .. } => {
                let id = self.prep(id, ctx);
                let new_body = self.flatten(body, ctx)?;
                if let NodeKind::PushContext { body, .. } = &mut self.ws.ast[id].kind {
                    *body = new_body;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::ArrayIndex { base, index } => {
                let id = self.prep(id, ctx);
                let new_base = self.flatten(base, ctx)?;
                let new_index = self.flatten(index, ctx)?;
                if let NodeKind::ArrayIndex { base, index } = &mut self.ws.ast[id].kind {
                    *base = new_base;
                    *index = new_index;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Call { callee, args } => {
                let id = self.prep(id, ctx);
                // Identifier callees resolve during overload matching, not
                // as plain identifiers.
                let new_callee = if matches!(self.ws.ast[callee].kind, NodeKind::Identifier { .. }) {
                    self.prep(callee, ctx)
                } else {
                    self.flatten(callee, ctx)?
                };
                let mut new_args = Vec::with_capacity(args.len());
                for arg in args {
                    new_args.push(self.flatten(arg, ctx)?);
                }
                if let NodeKind::Call { callee, args } = &mut self.ws.ast[id].kind {
                    *callee = new_callee;
                    *args = new_args;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Return { values } => {
                let id = self.prep(id, ctx);
                let mut new_values = Vec::with_capacity(values.len());
                for value in values {
                    new_values.push(self.flatten(value, ctx)?);
                }
                if let NodeKind::Return { values } = &mut self.ws.ast[id].kind {
                    *values = new_values;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Declare(_) => self.flatten_decl(id, ctx),

            NodeKind::Struct { decls, .. } => {
                let members = self.ws.create_scope(ScopeKind::Struct, Some(ctx.scope));
                let member_ctx = FlattenCtx { scope: members, ..ctx };
                let id = self.prep(id, ctx);
                // The struct node steps before its members: the rule
                // creates and registers the type with the body unfinished,
                // so member pointers back to it resolve. Its step carries
                // the member scope for that registration.
                self.append_step(id, member_ctx)?;
                let mut new_decls = Vec::with_capacity(decls.len());
                for decl in decls {
                    new_decls.push(self.flatten(decl, member_ctx)?);
                }
                if let NodeKind::Struct { decls, .. } = &mut self.ws.ast[id].kind {
                    *decls = new_decls;
                }
                Ok(id)
            }

            NodeKind::Enum { backing, decls, .. } => {
                let id = self.prep(id, ctx);
                let new_backing = match backing {
                    Some(backing) => Some(self.flatten(backing, ctx)?),
                    None => None,
                };
                let members = self.ws.create_scope(ScopeKind::Struct, Some(ctx.scope));
                let member_ctx = FlattenCtx { scope: members, ..ctx };
                self.append_step(id, member_ctx)?;
                let mut new_decls = Vec::with_capacity(decls.len());
                for decl in decls {
                    new_decls.push(self.flatten(decl, member_ctx)?);
                }
                if let NodeKind::Enum { backing, decls, .. } = &mut self.ws.ast[id].kind {
                    *backing = new_backing;
                    *decls = new_decls;
                }
                Ok(id)
            }

            NodeKind::Procedure(_) => Err(CompileError::new(
                "a procedure literal is only allowed as the value of a constant declaration",
                loc,
            )),

            NodeKind::TypePointer { inner, .. } => {
                let id = self.prep(id, ctx);
                let new_inner = self.flatten(inner, ctx)?;
                if let NodeKind::TypePointer { inner, .. } = &mut self.ws.ast[id].kind {
                    *inner = new_inner;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::TypeArray { size, inner, .. } => {
                let id = self.prep(id, ctx);
                let new_inner = self.flatten(inner, ctx)?;
                let new_size = match size {
                    Some(size) => Some(self.flatten(size, ctx)?),
                    None => None,
                };
                if let NodeKind::TypeArray { size, inner, .. } = &mut self.ws.ast[id].kind {
                    *inner = new_inner;
                    *size = new_size;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::TypeProcedure { args, rets } => {
                let id = self.prep(id, ctx);
                let mut new_args = Vec::with_capacity(args.len());
                for arg in args {
                    new_args.push(self.flatten_type_only_decl(arg, ctx)?);
                }
                let mut new_rets = Vec::with_capacity(rets.len());
                for ret in rets {
                    new_rets.push(self.flatten_type_only_decl(ret, ctx)?);
                }
                if let NodeKind::TypeProcedure { args, rets } = &mut self.ws.ast[id].kind {
                    *args = new_args;
                    *rets = new_rets;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::TypePolymorphic { name } => {
                // Only reachable while specializing: becomes an identifier
                // that resolves to the injected type-variable declaration.
                debug_assert!(ctx.dup);
                let ident = self.ws.ast.alloc(NodeKind::Identifier { name }, loc);
                self.append_step(ident, ctx)?;
                Ok(ident)
            }

            NodeKind::TypeVararg => {
                let id = self.prep(id, ctx);
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::Import { .. } => Ok(self.prep(id, ctx)),

            NodeKind::Run { expr } => {
                let id = self.prep(id, ctx);
                let new_expr = self.flatten(expr, ctx)?;
                if let NodeKind::Run { expr } = &mut self.ws.ast[id].kind {
                    *expr = new_expr;
                }
                self.append_step(id, ctx)?;
                Ok(id)
            }

            NodeKind::DeclareMulti { .. } => Err(CompileError::new(
                "multi-value declarations are not supported yet",
                loc,
            )),
            NodeKind::AssignMulti { .. } => Err(CompileError::new(
                "multi-value assignments are not supported yet",
                loc,
            )),
            NodeKind::ForeignLibrary { .. } => Err(CompileError::new(
                "#foreign_library is only allowed at file scope",
                loc,
            )),
        }
    }

    /// Flattens the type of an argument/return declaration inside a
    /// procedure *type*; the declaration itself never registers.
    fn flatten_type_only_decl(&mut self, decl: NodeId, ctx: FlattenCtx) -> Result<NodeId> {
        let decl = self.prep(decl, ctx);
        let (ty, value) = match &self.ws.ast[decl].kind {
            NodeKind::Declare(data) => (data.ty, data.value),
            _ => (None, None),
        };
        if value.is_some() {
            return Err(CompileError::new(
                "procedure types cannot carry default values",
                self.ws.ast[decl].loc,
            ));
        }
        let ty = ty.ok_or_else(|| {
            CompileError::new("procedure type argument carries no type", self.ws.ast[decl].loc)
        })?;
        let new_ty = self.flatten(ty, ctx)?;
        self.set_declare(decl, Some(new_ty), None);
        Ok(decl)
    }

    /// Clones and flattens a polymorphic procedure for one tuple of bound
    /// type variables, returning the specialization's declaration.
    pub(crate) fn flatten_specialization(
        &mut self,
        orig_decl_node: NodeId,
        scope: ScopeId,
        args: &[PolyArg],
    ) -> Result<DeclId> {
        let data = match self.ws.ast[orig_decl_node].kind.clone() {
            NodeKind::Declare(data) => data,
            _ => {
                return Err(CompileError::new(
                    "polymorphic candidate is not a declaration",
                    self.ws.ast[orig_decl_node].loc,
                ))
            }
        };
        let name = data.name.ok_or_else(|| {
            CompileError::new("polymorphic procedure has no name", self.ws.ast[orig_decl_node].loc)
        })?;
        let value = data.value.ok_or_else(|| {
            CompileError::new(
                "polymorphic procedure declaration has no value",
                self.ws.ast[orig_decl_node].loc,
            )
        })?;

        let ctx = FlattenCtx { scope, target: None, dup: true };

        let decl_node = self.ws.ast.dup(orig_decl_node);
        let decl = {
            let id = DeclId(self.ws.decls.len() as u32);
            self.ws.decls.push(crate::scope::Declaration {
                name,
                node: decl_node,
                next_step: 0,
                steps: Vec::new(),
            });
            id
        };
        let ctx = FlattenCtx { target: Some(decl), ..ctx };

        let proc_node = self.ws.ast.dup(value);
        if let NodeKind::Procedure(proc) = &mut self.ws.ast[proc_node].kind {
            proc.is_polymorphic = false;
        }
        self.set_declare(decl_node, None, Some(proc_node));

        let mut proc_ctx = ctx;
        self.flatten_proc_args(&mut proc_ctx, proc_node, Some(args))?;
        self.append_step(proc_node, ctx)?;
        self.append_step(decl_node, ctx)?;

        let body = match &self.ws.ast[proc_node].kind {
            NodeKind::Procedure(proc) => proc.body,
            _ => None,
        };
        let body = body.ok_or_else(|| {
            CompileError::new(
                "polymorphic procedure has no body",
                self.ws.ast[proc_node].loc,
            )
        })?;
        let new_body = self.flatten(body, proc_ctx)?;
        if let NodeKind::Procedure(proc) = &mut self.ws.ast[proc_node].kind {
            proc.body = Some(new_body);
        }

        Ok(decl)
    }
}
