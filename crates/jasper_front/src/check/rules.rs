//! Per-node typing rules.
//!
//! One rule per AST kind, run against the symbol table its flattened step
//! recorded. A rule returns `Ok(Some(decl))` to suspend the current
//! declaration until `decl` is typed; anything else either types the node
//! or fails the compilation.
//!
//! Children always run before parents (flattening order), so a rule may
//! read its children's types freely; only symbol lookups can suspend.

use super::coerce::{ASSIGN_OPERATORS, BINARY_OPERATORS, bopi};
use super::{Checker, Pending};
use crate::ast::{DeclareData, NodeId, NodeKind, ProcData};
use crate::eval;
use crate::scope::{DeclId, TypeRecurse};
use crate::token::Lit;
use crate::types::{Type, TypeId};
use jasper_base::{CompileError, Loc, Result};

impl Checker<'_> {
    /// Unwraps a "type used as value" to the type it names.
    pub(crate) fn unwrap_type(&self, tid: TypeId, loc: Loc) -> Result<TypeId> {
        self.ws.types.unwrap_typeof(tid).ok_or_else(|| {
            CompileError::new(
                format!("expected a type, found a value of type {}", self.ws.type_name(tid)),
                loc,
            )
        })
    }

    fn node_tid(&self, id: NodeId, loc: Loc) -> Result<TypeId> {
        self.ws.ast[id].tid.ok_or_else(|| {
            CompileError::new("expression has no type", loc)
        })
    }

    /// Runs the rule for one step. `Ok(Some(_))` suspends.
    pub(crate) fn check_step(&mut self, step: TypeRecurse) -> Result<Option<DeclId>> {
        let id = step.node;
        let loc = self.ws.ast[id].loc;

        let suspend = match self.ws.ast[id].kind.clone() {
            // Literals of every kind infer their type from the use site.
            NodeKind::Literal(_) | NodeKind::Null | NodeKind::Uninitialized => None,

            NodeKind::Block { .. } | NodeKind::Empty => {
                self.ws.ast[id].tid = Some(self.ws.tids.void_);
                None
            }

            NodeKind::Identifier { name } => self.check_identifier(id, name, &step)?,

            NodeKind::Operator { op, left, right } => {
                self.check_operator(id, op, left, right, &step)?
            }

            NodeKind::If { cond, .. } | NodeKind::While { cond, .. } => {
                if self.can_coerce(cond, self.ws.tids.bool_) {
                    self.coerce(cond, self.ws.tids.bool_)?;
                }
                self.ws.ast[id].tid = Some(self.ws.tids.void_);
                None
            }

            NodeKind::For { .. } => {
                return Err(CompileError::new("for loops are not supported yet", loc))
            }

            NodeKind::LoopControl(_) | NodeKind::Using { .. } => {
                self.ws.ast[id].tid = Some(self.ws.tids.void_);
                None
            }

            NodeKind::Cast { is_auto, ty, expr } => {
                self.check_cast(id, is_auto, ty, expr, loc)?;
                None
            }

            NodeKind::New { ty } => {
                let named = self.unwrap_type(self.node_tid(ty, loc)?, loc)?;
                let tid = self.ws.types.pointer_to(named);
                self.ws.ast[id].tid = Some(tid);
                None
            }

            NodeKind::Delete { .. }
            | NodeKind::Remove { .. }
            | NodeKind::Defer { .. }
            | NodeKind::PushContext { .. } => {
                self.ws.ast[id].tid = Some(self.ws.tids.void_);
                None
            }

            NodeKind::Inline { expr } => {
                self.ws.ast[id].tid = self.ws.ast[expr].tid;
                None
            }

            NodeKind::ArrayIndex { base, index } => {
                self.coerce(index, self.ws.tids.s64)?;
                let base_tid = self.node_tid(base, loc)?;
                let element = match self.ws.types[base_tid] {
                    Type::Array { element, .. } => element,
                    Type::Pointer { inner, .. } => inner,
                    _ => {
                        return Err(CompileError::new(
                            format!(
                                "expected an array or pointer type, found {}",
                                self.ws.type_name(base_tid)
                            ),
                            loc,
                        ))
                    }
                };
                self.ws.ast[id].tid = Some(element);
                None
            }

            NodeKind::Call { callee, args } => self.check_call(id, callee, args, &step)?,

            NodeKind::Return { values } => {
                self.check_return(id, values, &step)?;
                None
            }

            NodeKind::Declare(data) => {
                self.check_declare(id, data, &step)?;
                None
            }

            NodeKind::Struct { name, decls } => {
                let members: Vec<NodeId> = decls
                    .iter()
                    .copied()
                    .filter(|&decl| {
                        matches!(&self.ws.ast[decl].kind, NodeKind::Declare(d) if !d.constant)
                    })
                    .collect();
                // Each struct body in source is its own type: identity
                // folds in the declaring node.
                let tid = self.ws.types.ensure(Type::Struct { name, decl: id, members });
                self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(tid));
                // The step's scope is the member table the flattener made.
                self.ws.register_member_scope(tid, step.scope);
                None
            }

            NodeKind::Enum { name, backing, .. } => {
                let backing = match backing {
                    Some(backing) => self.unwrap_type(self.node_tid(backing, loc)?, loc)?,
                    None => self.ws.tids.s64,
                };
                let tid = self.ws.types.ensure(Type::Enum { name, decl: id, backing });
                self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(tid));
                self.ws.register_member_scope(tid, step.scope);
                None
            }

            NodeKind::Procedure(proc) => {
                self.check_procedure(id, &proc)?;
                None
            }

            NodeKind::TypePointer { inner, .. } => {
                let pointee = self.unwrap_type(self.node_tid(inner, loc)?, loc)?;
                let ptr = self.ws.types.pointer_to(pointee);
                self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(ptr));
                None
            }

            NodeKind::TypeArray { soa, dynamic, size, inner } => {
                self.check_type_array(id, soa, dynamic, size, inner, loc)?;
                None
            }

            NodeKind::TypeProcedure { args, rets } => {
                let mut params = Vec::with_capacity(args.len());
                for arg in args {
                    let ty = self.type_only_decl_type(arg)?;
                    params.push(self.unwrap_type(self.node_tid(ty, loc)?, loc)?);
                }
                let mut ret_tids = Vec::with_capacity(rets.len());
                for ret in rets {
                    let ty = self.type_only_decl_type(ret)?;
                    ret_tids.push(self.unwrap_type(self.node_tid(ty, loc)?, loc)?);
                }
                let tid = self.ws.types.ensure(Type::Procedure {
                    args: params,
                    rets: ret_tids,
                    c_vararg: false,
                });
                self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(tid));
                None
            }

            NodeKind::TypePolymorphic { .. } => {
                return Err(CompileError::new(
                    "polymorphic placeholder outside a polymorphic procedure",
                    loc,
                ))
            }

            NodeKind::TypeVararg => {
                let vararg = self.ws.types.ensure(Type::Vararg);
                self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(vararg));
                None
            }

            NodeKind::Run { expr } => {
                match self.ws.ast[expr].tid {
                    Some(tid) => self.ws.ast[id].tid = Some(tid),
                    None => {
                        self.try_coerce_lit(expr)?;
                        self.ws.ast[id].tid = self.ws.ast[expr].tid;
                    }
                }
                None
            }

            NodeKind::Import { .. } | NodeKind::ForeignLibrary { .. } => None,

            NodeKind::DeclareMulti { .. } | NodeKind::AssignMulti { .. } => {
                return Err(CompileError::new(
                    "multi-value declarations are not supported yet",
                    loc,
                ))
            }
        };

        if suspend.is_some() {
            return Ok(suspend);
        }

        // Every checked node has a type, except literals awaiting their
        // use site and auto-casts awaiting their target.
        let exempt = matches!(
            self.ws.ast[id].kind,
            NodeKind::Literal(_)
                | NodeKind::Null
                | NodeKind::Uninitialized
                | NodeKind::Cast { is_auto: true, ty: None, .. }
                | NodeKind::Import { .. }
                | NodeKind::ForeignLibrary { .. }
        );
        if !exempt && self.ws.ast[id].tid.is_none() {
            return Err(CompileError::new("could not compute a type", loc));
        }

        Ok(None)
    }

    fn type_only_decl_type(&self, decl: NodeId) -> Result<NodeId> {
        match &self.ws.ast[decl].kind {
            NodeKind::Declare(data) => data.ty.ok_or_else(|| {
                CompileError::new("declaration carries no type", self.ws.ast[decl].loc)
            }),
            _ => Err(CompileError::new("expected a declaration", self.ws.ast[decl].loc)),
        }
    }

    fn check_identifier(
        &mut self,
        id: NodeId,
        name: jasper_base::Symbol,
        step: &TypeRecurse,
    ) -> Result<Option<DeclId>> {
        let loc = self.ws.ast[id].loc;

        // Struct and file scopes resolve without `using` expansion; their
        // members were all registered up front.
        let rd = if self.ws.scope(step.scope).kind.registers_all() {
            self.ws.lookup_resdecl(step.scope, name, false, loc)?
        } else {
            match self.resolve_symbol_with_using(step.scope, name, loc)? {
                Pending::Waiting(decl) => return Ok(Some(decl)),
                Pending::Ready(rd) => rd,
            }
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

        let decl = self.ws.resdecl(rd).decl;
        let Some(tid) = self.ws.decl_tid(decl) else {
            return Ok(Some(decl));
        };

        self.ws.ast[id].tid = Some(tid);
        self.ws.register_resolved(id, rd);
        Ok(None)
    }

    fn check_operator(
        &mut self,
        id: NodeId,
        op: jasper_base::Symbol,
        left: Option<NodeId>,
        right: NodeId,
        step: &TypeRecurse,
    ) -> Result<Option<DeclId>> {
        let loc = self.ws.ast[id].loc;
        let op = self.ws.interner.resolve(op).to_string();

        match left {
            None => match op.as_str() {
                "-" => {
                    self.try_coerce_lit(right)?;
                    let tid = self.node_tid(right, loc)?;
                    let ty = &self.ws.types[tid];
                    if ty.is_signed() || ty.is_float() {
                        self.ws.ast[id].tid = Some(tid);
                    }
                }
                "!" => {
                    self.try_coerce_lit(right)?;
                    let tid = self.node_tid(right, loc)?;
                    if matches!(self.ws.types[tid], Type::Bool) {
                        self.ws.ast[id].tid = Some(tid);
                    }
                }
                "++" | "--" => {
                    if !self.can_get_address(right) {
                        return Err(CompileError::new(
                            format!("operator {op} expects a variable or struct member"),
                            loc,
                        ));
                    }
                    let tid = self.node_tid(right, loc)?;
                    if !self.ws.types[tid].is_int() {
                        return Err(CompileError::new(
                            format!("cannot apply {op} to type {}", self.ws.type_name(tid)),
                            loc,
                        ));
                    }
                    self.ws.ast[id].tid = Some(tid);
                }
                "*" => {
                    if !self.can_get_address(right) {
                        return Err(CompileError::new(
                            "cannot take the address of this expression",
                            loc,
                        ));
                    }
                    let tid = self.node_tid(right, loc)?;
                    self.ws.ast[id].tid = Some(self.ws.types.pointer_to(tid));
                }
                "<<" => {
                    let tid = self.node_tid(right, loc)?;
                    let Type::Pointer { inner, .. } = self.ws.types[tid] else {
                        return Err(CompileError::new(
                            format!("cannot dereference non-pointer type {}", self.ws.type_name(tid)),
                            loc,
                        ));
                    };
                    self.ws.ast[id].tid = Some(inner);
                }
                _ => {}
            },

            Some(left) => {
                if op == "." {
                    return self.check_member_access(id, left, right, step);
                }

                if let Some(&(_, flags)) = ASSIGN_OPERATORS.iter().find(|(text, _)| *text == op) {
                    if !self.can_get_address(left) {
                        return Err(CompileError::new(
                            format!("cannot use assigning operator {op} on a non-memory location"),
                            self.ws.ast[left].loc,
                        ));
                    }
                    if self.try_coerce_operator_assign(left, right, flags)? {
                        self.ws.ast[id].tid = Some(self.ws.tids.void_);
                    }
                } else if let Some(&(_, flags)) =
                    BINARY_OPERATORS.iter().find(|(text, _)| *text == op)
                {
                    if let Some(tid) = self.try_coerce_operator_args(left, right, flags)? {
                        self.ws.ast[id].tid = Some(if flags & bopi::RETURN_BOOL != 0 {
                            self.ws.tids.bool_
                        } else {
                            tid
                        });
                    }
                }
            }
        }

        if self.ws.ast[id].tid.is_none() {
            // Give literals their default types so the message names them.
            self.try_default_type(right);
            match left {
                None => {
                    let right_name = self.type_name_or_unknown(right);
                    return Err(CompileError::new(
                        format!("invalid prefix operator {op} for type {right_name}"),
                        loc,
                    ));
                }
                Some(left) => {
                    self.try_default_type(left);
                    let left_name = self.type_name_or_unknown(left);
                    let right_name = self.type_name_or_unknown(right);
                    return Err(CompileError::new(
                        format!("invalid operator {op} for types {left_name} and {right_name}"),
                        loc,
                    ));
                }
            }
        }

        Ok(None)
    }

    fn type_name_or_unknown(&self, id: NodeId) -> String {
        match self.ws.ast[id].tid {
            Some(tid) => self.ws.type_name(tid),
            None => "<unknown>".to_string(),
        }
    }

    /// `expr.member`: auto-deref one pointer level, look the member up in
    /// the struct's table, restrict to constants when going through a type
    /// rather than an instance.
    fn check_member_access(
        &mut self,
        id: NodeId,
        left: NodeId,
        right: NodeId,
        _step: &TypeRecurse,
    ) -> Result<Option<DeclId>> {
        let loc = self.ws.ast[id].loc;

        let NodeKind::Identifier { name } = self.ws.ast[right].kind else {
            return Err(CompileError::new(
                "expected an identifier to the right of .",
                self.ws.ast[right].loc,
            ));
        };

        if let Some(mut target) = self.ws.ast[left].tid {
            if let Type::Pointer { inner, .. } = self.ws.types[target] {
                target = inner;
            }

            let mut constant_only = false;
            if let Some(inner) = self.ws.types.unwrap_typeof(target) {
                target = inner;
                constant_only = true;
            } else if matches!(self.ws.types[target], Type::Enum { .. }) {
                return Err(CompileError::new(
                    "cannot take a member of an enum value; use the enum's name",
                    loc,
                ));
            }

            if let Some(member_scope) = self.ws.member_scope(target) {
                let rd = match self.resolve_symbol_with_using(member_scope, name, loc)? {
                    Pending::Waiting(decl) => return Ok(Some(decl)),
                    Pending::Ready(rd) => rd,
                };
                let Some(rd) = rd else {
                    return Err(CompileError::new(
                        format!(
                            "couldn't find member {} of {}",
                            self.ws.interner.resolve(name),
                            self.ws.type_name(target)
                        ),
                        self.ws.ast[right].loc,
                    ));
                };

                let decl = self.ws.resdecl(rd).decl;
                let decl_node = self.ws.decl(decl).node;
                let is_constant =
                    matches!(&self.ws.ast[decl_node].kind, NodeKind::Declare(d) if d.constant);
                if constant_only && !is_constant {
                    return Err(CompileError::new(
                        "only constants can be referenced through a type name",
                        loc,
                    ));
                }

                let tid = self.ws.decl_tid(decl).ok_or_else(|| {
                    CompileError::new("member is not yet typed", self.ws.ast[right].loc)
                })?;
                self.ws.ast[right].tid = Some(tid);
                self.ws.ast[id].tid = Some(tid);
                self.ws.register_resolved(right, rd);
            }
        }

        if self.ws.ast[id].tid.is_none() {
            let left_name = self.type_name_or_unknown(left);
            return Err(CompileError::new(
                format!("expected a struct or pointer to struct on the left, got {left_name}"),
                loc,
            ));
        }
        Ok(None)
    }

    fn check_cast(
        &mut self,
        id: NodeId,
        is_auto: bool,
        ty: Option<NodeId>,
        expr: NodeId,
        loc: Loc,
    ) -> Result<()> {
        let Some(ty) = ty else {
            // Auto-cast: the target comes from the enclosing coercion, so
            // the node stays untyped for now. A literal source still works
            // because the coercion finalizes it.
            debug_assert!(is_auto);
            return Ok(());
        };

        let wrapped = self.node_tid(ty, loc)?;
        let dst = self.unwrap_type(wrapped, loc)?;

        self.try_coerce_lit(expr)?;
        let src = self.node_tid(expr, loc)?;

        if src != dst && !self.castable(src, dst) {
            return Err(CompileError::new(
                format!(
                    "cannot convert from {} to {}",
                    self.ws.type_name(src),
                    self.ws.type_name(dst)
                ),
                loc,
            ));
        }

        self.ws.ast[id].tid = Some(dst);
        Ok(())
    }

    fn check_call(
        &mut self,
        id: NodeId,
        callee: NodeId,
        args: Vec<NodeId>,
        step: &TypeRecurse,
    ) -> Result<Option<DeclId>> {
        let loc = self.ws.ast[id].loc;

        if let NodeKind::Identifier { name } = self.ws.ast[callee].kind {
            let name_str = self.ws.interner.resolve(name);
            if name_str == "sizeof" || name_str == "alignof" {
                if args.len() != 1 {
                    return Err(CompileError::new(
                        format!("{name_str} expects exactly one argument"),
                        loc,
                    ));
                }
                self.try_coerce_lit(args[0])?;
                self.ws.ast[id].tid = Some(self.ws.tids.u64_);
                return Ok(None);
            }

            let rd = match self.resolve_overload(step.scope, id)? {
                Pending::Waiting(decl) => return Ok(Some(decl)),
                Pending::Ready(rd) => rd,
            };
            let decl = self.ws.resdecl(rd).decl;
            self.ws.ast[callee].tid = self.ws.decl_tid(decl);
            self.ws.register_resolved(callee, rd);
        }

        let callee_tid = self.node_tid(callee, loc)?;
        let Type::Procedure { args: params, rets, c_vararg } = self.ws.types[callee_tid].clone()
        else {
            return Err(CompileError::new("cannot call a non-procedure", loc));
        };

        let native_vararg = params
            .last()
            .is_some_and(|&last| matches!(self.ws.types[last], Type::Vararg));
        let required = if native_vararg { params.len() - 1 } else { params.len() };
        let allows_extra = c_vararg || native_vararg;

        if args.len() < required {
            return Err(CompileError::new("too few arguments passed to procedure", loc));
        }
        if args.len() > required && !allows_extra {
            return Err(CompileError::new("too many arguments passed to procedure", loc));
        }

        for i in 0..required {
            self.coerce(args[i], params[i])?;
        }
        // Arguments past a trailing vararg keep their default types, or
        // take C promotion for foreign calls.
        for &arg in &args[required..] {
            if c_vararg {
                self.try_coerce_c_vararg(arg)?;
            } else {
                self.try_coerce_lit(arg)?;
            }
        }

        self.ws.ast[id].tid = Some(match rets.first() {
            Some(&ret) => ret,
            None => self.ws.tids.void_,
        });
        Ok(None)
    }

    fn check_return(&mut self, id: NodeId, values: Vec<NodeId>, step: &TypeRecurse) -> Result<()> {
        let loc = self.ws.ast[id].loc;

        let proc_scope = self.enclosing_procedure_scope(step).ok_or_else(|| {
            CompileError::new("cannot return outside of a procedure", loc)
        })?;
        let proc_node = self.ws.scope(proc_scope).proc.ok_or_else(|| {
            CompileError::new("procedure scope carries no procedure", loc)
        })?;

        let proc_tid = self.node_tid(proc_node, loc)?;
        let Type::Procedure { rets, .. } = self.ws.types[proc_tid].clone() else {
            return Err(CompileError::new("enclosing procedure has no procedure type", loc));
        };

        if values.len() != rets.len() {
            return Err(CompileError::new(
                format!("expected {} return values, found {}", rets.len(), values.len()),
                loc,
            ));
        }

        if let Some(&value) = values.first() {
            self.coerce(value, rets[0])?;
            self.ws.ast[id].tid = Some(rets[0]);
        } else {
            self.ws.ast[id].tid = Some(self.ws.tids.void_);
        }
        Ok(())
    }

    fn check_declare(&mut self, id: NodeId, data: DeclareData, step: &TypeRecurse) -> Result<()> {
        let loc = self.ws.ast[id].loc;

        // Plain variables register here, in order; out-of-order
        // declarations registered during flattening.
        if let Some(name) = data.name {
            if !data.constant && !self.ws.scope(step.scope).kind.registers_all() {
                self.ws.add_declaration(step.scope, name, id, Vec::new())?;
            }
        }

        let tid = match data.ty {
            Some(ty) => self.unwrap_type(self.node_tid(ty, loc)?, self.ws.ast[ty].loc)?,
            None => {
                let value = data.value.ok_or_else(|| {
                    CompileError::new("declaration has neither type nor value", loc)
                })?;
                match self.ws.ast[value].tid {
                    Some(tid) => tid,
                    None => {
                        let NodeKind::Literal(lit) = self.ws.ast[value].kind else {
                            return Err(CompileError::new(
                                "cannot infer the declaration's type from its value",
                                loc,
                            ));
                        };
                        let tid = self.literal_default_tid(lit);
                        self.ws.ast[value].tid = Some(tid);
                        tid
                    }
                }
            }
        };
        self.ws.ast[id].tid = Some(tid);

        if let Some(value) = data.value {
            self.coerce(value, tid)?;
        }
        Ok(())
    }

    fn check_procedure(&mut self, id: NodeId, proc: &ProcData) -> Result<()> {
        let loc = self.ws.ast[id].loc;

        if !proc.is_foreign {
            self.ws.modules[proc.module.index()].gen_procs.push(id);
        }

        // A trailing `..` on a foreign procedure is C varargs and leaves
        // the parameter list; anywhere else `..` is a real parameter type.
        let mut arg_decls: &[NodeId] = &proc.args;
        let mut c_vararg = false;
        if proc.is_foreign {
            if let Some((&last, rest)) = arg_decls.split_last() {
                let last_ty = match &self.ws.ast[last].kind {
                    NodeKind::Declare(data) => data.ty,
                    _ => None,
                };
                if last_ty.is_some_and(|ty| matches!(self.ws.ast[ty].kind, NodeKind::TypeVararg)) {
                    c_vararg = true;
                    arg_decls = rest;
                }
            }
        }

        let mut params = Vec::with_capacity(arg_decls.len());
        for (i, &arg) in arg_decls.iter().enumerate() {
            let tid = self.node_tid(arg, self.ws.ast[arg].loc)?;
            if i + 1 < arg_decls.len() && matches!(self.ws.types[tid], Type::Vararg) {
                return Err(CompileError::new(
                    "varargs must be the last argument of a procedure",
                    self.ws.ast[arg].loc,
                ));
            }
            params.push(tid);
        }

        let mut rets = Vec::with_capacity(proc.rets.len());
        for &ret in &proc.rets {
            let ty = self.type_only_decl_type(ret)?;
            rets.push(self.unwrap_type(self.node_tid(ty, loc)?, self.ws.ast[ty].loc)?);
        }

        let tid = self.ws.types.ensure(Type::Procedure { args: params, rets, c_vararg });
        self.ws.ast[id].tid = Some(tid);
        Ok(())
    }

    fn check_type_array(
        &mut self,
        id: NodeId,
        soa: bool,
        dynamic: bool,
        size: Option<NodeId>,
        inner: NodeId,
        loc: Loc,
    ) -> Result<()> {
        let element = self.unwrap_type(self.node_tid(inner, loc)?, loc)?;

        let mut fixed = None;
        if let Some(size) = size {
            self.coerce(size, self.ws.tids.s64)?;
            let bytes = eval::eval_const(self.ws, size)?;
            let count = i64::from_le_bytes(bytes[..8].try_into().unwrap_or_default());
            if count < 0 {
                return Err(CompileError::new("array size must not be negative", loc));
            }
            fixed = Some(count);
        }

        let tid = self.ws.types.ensure(Type::Array { element, fixed, dynamic, soa });
        self.ws.ast[id].tid = Some(self.ws.types.wrap_typeof(tid));

        // Arrays answer member lookups (`a`, `c`, `cMax`) through a
        // lazily built view; the scope registers once per array type.
        if self.ws.member_scope(tid).is_none() {
            let scope = self.ws.create_scope(crate::scope::ScopeKind::Struct, None);

            let a_sym = self.ws.interner.intern("a");
            let element_ptr = self.ws.types.pointer_to(element);
            let a_decl = self.ws.synthesize_typed_decl(a_sym, element_ptr);
            self.ws.add_declaration(scope, a_sym, a_decl, Vec::new())?;

            let c_sym = self.ws.interner.intern("c");
            let c_decl = if let Some(count) = fixed {
                let value = self.ws.ast.alloc(NodeKind::Literal(Lit::Int(count)), Loc::builtin());
                self.ws.ast[value].tid = Some(self.ws.tids.u32_);
                let decl = self.ws.ast.alloc(
                    NodeKind::Declare(DeclareData {
                        name: Some(c_sym),
                        ty: None,
                        value: Some(value),
                        constant: true,
                        using: false,
                    }),
                    Loc::builtin(),
                );
                self.ws.ast[decl].tid = Some(self.ws.tids.u32_);
                decl
            } else {
                self.ws.synthesize_typed_decl(c_sym, self.ws.tids.u32_)
            };
            self.ws.add_declaration(scope, c_sym, c_decl, Vec::new())?;

            let mut view = vec![a_decl, c_decl];
            if dynamic {
                let cmax_sym = self.ws.interner.intern("cMax");
                let cmax_decl = self.ws.synthesize_typed_decl(cmax_sym, self.ws.tids.u32_);
                self.ws.add_declaration(scope, cmax_sym, cmax_decl, Vec::new())?;
                view.push(cmax_decl);
            }

            self.ws.register_member_scope(tid, scope);
            // Fixed arrays lay out as element runs, not as the view.
            if fixed.is_none() {
                self.ws.struct_views.insert(tid, view);
            }
        }
        Ok(())
    }
}
