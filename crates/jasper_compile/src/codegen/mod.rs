//! LLVM emission.
//!
//! One context, one module, two builders: every `alloca` goes through a
//! dedicated builder positioned in the function's entry block (LLVM wants
//! allocas together), instructions through the main builder. Emission
//! walks the typed AST in source order per module; named struct types are
//! created first and filled second so mutually recursive bodies resolve.
//!
//! Scopes track a watermark into one deferred-statement list. A normal
//! scope exit emits its defers in reverse; `return` unwinds everything,
//! `break`/`continue` unwind to the innermost loop scope. A terminated
//! scope (after an early exit) drops its defer entries instead of
//! emitting them twice, and suppresses the next fall-through branch.

mod consts;
mod expr;
mod place;
mod types;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::TargetMachine;
use inkwell::types::StructType;
use inkwell::values::FunctionValue;
use jasper_base::{CompileError, Result};
use jasper_front::ast::{NodeId, NodeKind};
use jasper_front::types::{Type, TypeId};
use jasper_front::Workspace;
use log::debug;
use std::collections::HashMap;

/// Converts builder failures into compiler errors; these indicate an
/// emitter bug rather than a user error.
pub(crate) trait IrResult<T> {
    fn ir(self) -> Result<T>;
}

impl<T> IrResult<T> for std::result::Result<T, BuilderError> {
    fn ir(self) -> Result<T> {
        self.map_err(|e| CompileError::raw(format!("LLVM builder error: {e}")))
    }
}

pub(crate) struct GenScope<'ctx> {
    defer_mark: usize,
    loop_continue: Option<BasicBlock<'ctx>>,
    loop_break: Option<BasicBlock<'ctx>>,
}

pub struct Generator<'ctx, 'ws> {
    pub(crate) ws: &'ws Workspace,
    pub(crate) context: &'ctx Context,
    pub module: Module<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) alloc_builder: Builder<'ctx>,

    pub(crate) struct_types: HashMap<TypeId, StructType<'ctx>>,
    /// Storage address per declaration node (alloca or global).
    pub(crate) storage: HashMap<NodeId, inkwell::values::PointerValue<'ctx>>,
    pub(crate) procs: HashMap<NodeId, FunctionValue<'ctx>>,

    pub(crate) defers: Vec<NodeId>,
    pub(crate) scopes: Vec<GenScope<'ctx>>,
    pub(crate) terminated: bool,
}

impl<'ctx, 'ws> Generator<'ctx, 'ws> {
    pub fn new(ws: &'ws Workspace, context: &'ctx Context, name: &str) -> Self {
        let module = context.create_module(name);
        module.set_triple(&TargetMachine::get_default_triple());
        Self {
            ws,
            context,
            module,
            builder: context.create_builder(),
            alloc_builder: context.create_builder(),
            struct_types: HashMap::new(),
            storage: HashMap::new(),
            procs: HashMap::new(),
            defers: Vec::new(),
            scopes: Vec::new(),
            terminated: false,
        }
    }

    /// Emits every struct type, global, and procedure, then verifies the
    /// module. On verification failure the textual IR is written next to
    /// the input for inspection.
    pub fn generate_all(&mut self) -> Result<()> {
        // Create all named struct types first, fill bodies second, so
        // pointer members to later structs already have their type.
        for &tid in &self.ws.named_structs {
            let name = match &self.ws.types[tid] {
                Type::Struct { name, .. } => self.ws.interner.resolve(*name),
                Type::String => "_string",
                _ => continue,
            };
            let opaque = self.context.opaque_struct_type(name);
            self.struct_types.insert(tid, opaque);
        }

        for &tid in &self.ws.named_structs {
            let members = self
                .ws
                .members_of(tid)
                .ok_or_else(|| CompileError::raw("named struct has no member list"))?;
            let mut field_types = Vec::with_capacity(members.len());
            for &member in members {
                let member_tid = self.ws.ast[member].tid.ok_or_else(|| {
                    CompileError::new("struct member has no type", self.ws.ast[member].loc)
                })?;
                field_types.push(self.llvm_type(member_tid)?);
            }
            self.struct_types[&tid].set_body(&field_types, false);
        }

        // Globals: every non-constant declaration at file scope, with its
        // initializer folded by the constant evaluator.
        for module_index in 0..self.ws.modules.len() {
            let Some(root) = self.ws.modules[module_index].root else { continue };
            let stmts = match &self.ws.ast[root].kind {
                NodeKind::Block { stmts } => stmts.clone(),
                _ => Vec::new(),
            };
            for stmt in stmts {
                let NodeKind::Declare(data) = &self.ws.ast[stmt].kind else { continue };
                if data.constant {
                    continue;
                }
                let (name, value) = (data.name, data.value);
                self.generate_global(stmt, name, value)?;
            }
        }

        for module_index in 0..self.ws.modules.len() {
            for proc_index in 0..self.ws.modules[module_index].gen_procs.len() {
                let proc = self.ws.modules[module_index].gen_procs[proc_index];
                self.generate_procedure(proc)?;
                self.reset();
            }
        }

        if let Err(message) = self.module.verify() {
            let path = crate::link::artifact_path(self.ws, "ll");
            let _ = self.module.print_to_file(&path);
            return Err(CompileError::raw(format!(
                "LLVM module verification failed (IR dumped to {}):\n{}",
                path.display(),
                message.to_string_lossy()
            )));
        }
        Ok(())
    }

    fn generate_global(
        &mut self,
        decl: NodeId,
        name: Option<jasper_base::Symbol>,
        value: Option<NodeId>,
    ) -> Result<()> {
        let tid = self.ws.ast[decl].tid.ok_or_else(|| {
            CompileError::new("global declaration has no type", self.ws.ast[decl].loc)
        })?;
        let llvm_ty = self.llvm_type(tid)?;
        let name = name.map(|n| self.ws.interner.resolve(n)).unwrap_or("_anon");
        debug!("emitting global {name}");

        let global = self.module.add_global(llvm_ty, None, name);
        self.storage.insert(decl, global.as_pointer_value());

        let bytes = match value {
            Some(value) => jasper_front::eval::eval_const(self.ws, value)?,
            None => {
                let mut bytes = vec![0u8; self.ws.size_of(tid)? as usize];
                jasper_front::eval::eval_default(self.ws, tid, &mut bytes)?;
                bytes
            }
        };
        global.set_initializer(&self.const_value(tid, &bytes)?);
        Ok(())
    }

    fn generate_procedure(&mut self, proc_node: NodeId) -> Result<()> {
        let proc = match &self.ws.ast[proc_node].kind {
            NodeKind::Procedure(proc) => proc.clone(),
            _ => {
                return Err(CompileError::new(
                    "expected a procedure",
                    self.ws.ast[proc_node].loc,
                ))
            }
        };
        debug!("emitting procedure {}", self.ws.interner.resolve(proc.name));

        let function = self.ensure_procedure(proc_node)?;
        let alloca_block = self.context.append_basic_block(function, "entry");
        let body_block = self.context.append_basic_block(function, "entry");
        self.alloc_builder.position_at_end(alloca_block);
        self.builder.position_at_end(body_block);

        // Arguments live in allocas so they are addressable like locals.
        for (i, &arg_decl) in proc.args.iter().enumerate() {
            let arg_tid = self.ws.ast[arg_decl].tid.ok_or_else(|| {
                CompileError::new("argument has no type", self.ws.ast[arg_decl].loc)
            })?;
            let arg_name = match &self.ws.ast[arg_decl].kind {
                NodeKind::Declare(data) => data.name.map(|n| self.ws.interner.resolve(n)),
                _ => None,
            };
            let llvm_ty = self.llvm_type(arg_tid)?;
            let slot = self
                .alloc_builder
                .build_alloca(llvm_ty, arg_name.unwrap_or("arg"))
                .ir()?;
            let param = function.get_nth_param(i as u32).ok_or_else(|| {
                CompileError::raw("procedure parameter count mismatch")
            })?;
            self.builder.build_store(slot, param).ir()?;
            self.storage.insert(arg_decl, slot);
        }

        if let Some(body) = proc.body {
            self.push_scope(None, None);

            self.gen(body)?;

            let stmts = match &self.ws.ast[body].kind {
                NodeKind::Block { stmts } => stmts.clone(),
                _ => Vec::new(),
            };
            let ends_with_return =
                stmts.last().is_some_and(|&s| matches!(self.ws.ast[s].kind, NodeKind::Return { .. }));

            if !ends_with_return {
                if !proc.rets.is_empty() {
                    return Err(CompileError::new(
                        "procedure does not return a value",
                        self.ws.ast[proc_node].loc,
                    ));
                }
                self.pop_scope()?;
                self.builder.build_return(None).ir()?;
            } else {
                // The return already unwound the defer stack.
                self.scopes.clear();
                self.defers.clear();
            }
        }

        self.alloc_builder.build_unconditional_branch(body_block).ir()?;
        Ok(())
    }

    /// Declares (or returns) the LLVM function for a procedure node;
    /// foreign procedures become external declarations.
    pub(crate) fn ensure_procedure(&mut self, proc_node: NodeId) -> Result<FunctionValue<'ctx>> {
        if let Some(&function) = self.procs.get(&proc_node) {
            return Ok(function);
        }

        let proc = match &self.ws.ast[proc_node].kind {
            NodeKind::Procedure(proc) => proc,
            _ => {
                return Err(CompileError::new(
                    "expected a procedure",
                    self.ws.ast[proc_node].loc,
                ))
            }
        };
        let tid = self.ws.ast[proc_node].tid.ok_or_else(|| {
            CompileError::new("procedure has no type", self.ws.ast[proc_node].loc)
        })?;

        let link_name = proc.foreign_name.unwrap_or(proc.name);
        let link_name = self.ws.interner.resolve(link_name);
        let is_foreign = proc.is_foreign;

        let fn_type = self.fn_type(tid)?;
        let linkage = is_foreign.then_some(inkwell::module::Linkage::External);
        let function = self.module.add_function(link_name, fn_type, linkage);
        self.procs.insert(proc_node, function);
        Ok(function)
    }

    // ------------------------------------------------------------------
    // Scopes and defers

    pub(crate) fn push_scope(
        &mut self,
        loop_continue: Option<BasicBlock<'ctx>>,
        loop_break: Option<BasicBlock<'ctx>>,
    ) {
        self.scopes.push(GenScope { defer_mark: self.defers.len(), loop_continue, loop_break });
    }

    /// Ends the innermost scope. Its defers run in reverse unless an early
    /// exit already ran them (the scope is terminated).
    pub(crate) fn pop_scope(&mut self) -> Result<()> {
        let scope = self.scopes.pop().expect("scope stack underflow");
        let entries = self.defers.split_off(scope.defer_mark);
        if !self.terminated {
            for &stmt in entries.iter().rev() {
                self.gen(stmt)?;
            }
        }
        Ok(())
    }

    /// Runs the defers of every scope from the innermost down to (and
    /// including) `down_to`, without unwinding the stack; the scopes still
    /// pop normally on the dead path.
    pub(crate) fn emit_defers_down_to(&mut self, down_to: usize) -> Result<()> {
        let mark = self.scopes.get(down_to).map_or(0, |s| s.defer_mark);
        for index in (mark..self.defers.len()).rev() {
            let stmt = self.defers[index];
            self.gen(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn emit_all_defers(&mut self) -> Result<()> {
        for index in (0..self.defers.len()).rev() {
            let stmt = self.defers[index];
            self.gen(stmt)?;
        }
        Ok(())
    }

    /// Branches to `block` unless the current scope already terminated;
    /// a consumed termination re-arms fall-through emission.
    pub(crate) fn branch(&mut self, block: BasicBlock<'ctx>) -> Result<()> {
        if self.terminated {
            self.terminated = false;
            return Ok(());
        }
        self.builder.build_unconditional_branch(block).ir()?;
        Ok(())
    }

    pub(crate) fn innermost_loop(&self) -> Option<(usize, BasicBlock<'ctx>, BasicBlock<'ctx>)> {
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if let (Some(cont), Some(brk)) = (scope.loop_continue, scope.loop_break) {
                return Some((index, cont, brk));
            }
        }
        None
    }

    fn reset(&mut self) {
        debug_assert!(self.defers.is_empty());
        self.terminated = false;
    }

    pub(crate) fn err(&self, message: impl Into<String>, node: NodeId) -> CompileError {
        CompileError::new(message, self.ws.ast[node].loc)
    }
}
