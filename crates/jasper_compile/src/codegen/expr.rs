//! Expression and statement emission.
//!
//! `gen` returns `Ok(None)` for statements and void calls, a value
//! otherwise. Constants short-circuit into the evaluator; `and`/`or`
//! emit a right-operand block joined by a phi; `defer` only records its
//! statement - the scope machinery in `mod.rs` replays it on exits.

use super::place::Place;
use super::{Generator, IrResult};
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum};
use inkwell::{FloatPredicate, IntPredicate};
use jasper_base::Result;
use jasper_front::ast::{LoopControlKind, NodeId, NodeKind};
use jasper_front::types::Type;

impl<'ctx> Generator<'ctx, '_> {
    pub(crate) fn gen(&mut self, node: NodeId) -> Result<Option<BasicValueEnum<'ctx>>> {
        match self.ws.ast[node].kind.clone() {
            NodeKind::Literal(_) | NodeKind::Null => Ok(Some(self.gen_constant(node)?)),

            NodeKind::Uninitialized => {
                let tid = self.ws.ast[node].tid.unwrap();
                Ok(Some(undef_of(self.llvm_type(tid)?)))
            }

            NodeKind::Block { stmts } => {
                self.push_scope(None, None);
                for stmt in stmts {
                    self.gen(stmt)?;
                }
                self.pop_scope()?;
                Ok(None)
            }

            NodeKind::Empty => Ok(None),

            NodeKind::Identifier { .. } => {
                let rd = self
                    .ws
                    .resolution(node)
                    .ok_or_else(|| self.err("identifier was never resolved", node))?;
                let decl_node = self.ws.decl(self.ws.resdecl(rd).decl).node;
                let (constant, value) = match &self.ws.ast[decl_node].kind {
                    NodeKind::Declare(data) => (data.constant, data.value),
                    _ => (false, None),
                };
                if constant {
                    let value =
                        value.ok_or_else(|| self.err("constant has no value", node))?;
                    return Ok(Some(self.gen_constant(value)?));
                }
                let place = self.place_of(node)?;
                Ok(Some(self.load(place)?))
            }

            NodeKind::Operator { op, left, right } => {
                let op = self.ws.interner.resolve(op).to_string();
                self.gen_operator(node, &op, left, right)
            }

            NodeKind::If { cond, pass, else_ } => {
                let test = self.gen_condition(cond)?;

                let function = self.current_function();
                let pass_block = self.context.append_basic_block(function, "ifpass");
                let exit_block = self.context.append_basic_block(function, "ifexit");
                let else_block = match else_ {
                    Some(_) => self.context.append_basic_block(function, "ifelse"),
                    None => exit_block,
                };

                self.builder.build_conditional_branch(test, pass_block, else_block).ir()?;
                self.builder.position_at_end(pass_block);
                self.gen(pass)?;
                self.branch(exit_block)?;

                if let Some(else_) = else_ {
                    self.builder.position_at_end(else_block);
                    self.gen(else_)?;
                    self.branch(exit_block)?;
                }
                self.builder.position_at_end(exit_block);
                Ok(None)
            }

            NodeKind::While { cond, body } => {
                let function = self.current_function();
                let test_block = self.context.append_basic_block(function, "whiletest");
                let body_block = self.context.append_basic_block(function, "whilebody");
                let exit_block = self.context.append_basic_block(function, "whileexit");

                self.branch(test_block)?;
                self.builder.position_at_end(test_block);
                let test = self.gen_condition(cond)?;
                self.builder.build_conditional_branch(test, body_block, exit_block).ir()?;

                self.builder.position_at_end(body_block);
                self.push_scope(Some(test_block), Some(exit_block));
                self.gen(body)?;
                self.pop_scope()?;
                self.branch(test_block)?;

                self.builder.position_at_end(exit_block);
                Ok(None)
            }

            NodeKind::LoopControl(kind) => {
                let Some((scope_index, continue_block, break_block)) = self.innermost_loop() else {
                    return Err(self.err("break or continue outside of a loop", node));
                };
                self.emit_defers_down_to(scope_index)?;
                let target = match kind {
                    LoopControlKind::Continue => continue_block,
                    LoopControlKind::Break => break_block,
                };
                self.builder.build_unconditional_branch(target).ir()?;
                self.terminated = true;
                Ok(None)
            }

            NodeKind::Cast { expr, .. } => self.gen_cast(node, expr),

            NodeKind::Defer { stmt } => {
                self.defers.push(stmt);
                Ok(None)
            }

            NodeKind::Inline { expr } => self.gen(expr),

            NodeKind::PushContext { body, .. } => {
                self.push_scope(None, None);
                self.gen(body)?;
                self.pop_scope()?;
                Ok(None)
            }

            NodeKind::ArrayIndex { .. } => {
                let place = self.place_of(node)?;
                Ok(Some(self.load(place)?))
            }

            NodeKind::Call { callee, args } => self.gen_call(node, callee, args),

            NodeKind::Return { values } => {
                let tid = self.ws.ast[node].tid.unwrap();
                let value = if matches!(self.ws.types[tid], Type::Void) {
                    None
                } else {
                    let value = values.first().copied().ok_or_else(|| {
                        self.err("non-void return carries no value", node)
                    })?;
                    Some(
                        self.gen(value)?
                            .ok_or_else(|| self.err("return value has no value", node))?,
                    )
                };

                self.emit_all_defers()?;
                match value {
                    Some(value) => self.builder.build_return(Some(&value)).ir()?,
                    None => self.builder.build_return(None).ir()?,
                };
                self.terminated = true;
                Ok(None)
            }

            NodeKind::Declare(data) => {
                if data.constant {
                    return Ok(None);
                }
                let tid = self.ws.ast[node].tid.unwrap();
                let llvm_ty = self.llvm_type(tid)?;
                let name = data
                    .name
                    .map(|n| self.ws.interner.resolve(n).to_string())
                    .unwrap_or_default();
                let slot = self.alloc_builder.build_alloca(llvm_ty, &name).ir()?;

                let initial = match data.value {
                    Some(value) => self
                        .gen(value)?
                        .ok_or_else(|| self.err("initializer has no value", node))?,
                    None => self.default_value(tid)?,
                };
                self.builder.build_store(slot, initial).ir()?;
                self.storage.insert(node, slot);
                Ok(None)
            }

            NodeKind::Run { .. } => Ok(Some(self.gen_constant(node)?)),

            NodeKind::New { .. } | NodeKind::Delete { .. } | NodeKind::Remove { .. } => {
                Err(self.err("allocation expressions are not supported in code generation yet", node))
            }

            kind => Err(self.err(
                format!("cannot generate code for {}", kind.name()),
                node,
            )),
        }
    }

    /// A branch condition; the checker only coerces conditions to bool
    /// when it can, so reject anything else here.
    fn gen_condition(&mut self, cond: NodeId) -> Result<inkwell::values::IntValue<'ctx>> {
        match self.gen(cond)? {
            Some(BasicValueEnum::IntValue(value)) => Ok(value),
            _ => Err(self.err("condition does not evaluate to a bool", cond)),
        }
    }

    fn current_function(&self) -> inkwell::values::FunctionValue<'ctx> {
        self.builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("builder is positioned inside a function")
    }

    pub(crate) fn load(&mut self, place: Place<'ctx>) -> Result<BasicValueEnum<'ctx>> {
        let llvm_ty = self.llvm_type(place.tid)?;
        self.builder.build_load(llvm_ty, place.ptr, "").ir()
    }

    // ------------------------------------------------------------------
    // Operators

    fn gen_operator(
        &mut self,
        node: NodeId,
        op: &str,
        left: Option<NodeId>,
        right: NodeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let Some(left) = left else {
            return self.gen_prefix_operator(node, op, right);
        };

        match op {
            "=" => {
                let place = self.place_of(left)?;
                let value = self
                    .gen(right)?
                    .ok_or_else(|| self.err("assignment source has no value", right))?;
                self.builder.build_store(place.ptr, value).ir()?;
                return Ok(None);
            }
            "+=" | "-=" | "*=" | "/=" | "%=" => {
                let place = self.place_of(left)?;
                let rhs = self
                    .gen(right)?
                    .ok_or_else(|| self.err("operand has no value", right))?;
                let lhs = self.load(place)?;
                let value = self.binary_value(&op[..1], left, lhs, right, rhs)?;
                self.builder.build_store(place.ptr, value).ir()?;
                return Ok(None);
            }
            "and" | "or" => return Ok(Some(self.gen_short_circuit(op == "or", left, right)?)),
            "." => return self.gen_member(node, left, right),
            _ => {}
        }

        let lhs = self
            .gen(left)?
            .ok_or_else(|| self.err("operand has no value", left))?;
        let rhs = self
            .gen(right)?
            .ok_or_else(|| self.err("operand has no value", right))?;
        Ok(Some(self.binary_value(op, left, lhs, right, rhs)?))
    }

    fn gen_prefix_operator(
        &mut self,
        node: NodeId,
        op: &str,
        right: NodeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let right_tid = self.ws.ast[right].tid.unwrap();
        match op {
            "-" => {
                let value = self
                    .gen(right)?
                    .ok_or_else(|| self.err("operand has no value", right))?;
                let ty = &self.ws.types[right_tid];
                if ty.is_int() {
                    Ok(Some(self.builder.build_int_neg(value.into_int_value(), "").ir()?.into()))
                } else {
                    Ok(Some(
                        self.builder.build_float_neg(value.into_float_value(), "").ir()?.into(),
                    ))
                }
            }
            "!" => {
                let value = self
                    .gen(right)?
                    .ok_or_else(|| self.err("operand has no value", right))?;
                Ok(Some(self.builder.build_not(value.into_int_value(), "").ir()?.into()))
            }
            "++" | "--" => {
                let place = self.place_of(right)?;
                let original = self.load(place)?.into_int_value();
                let one = original.get_type().const_int(1, false);
                let updated = if op == "++" {
                    self.builder.build_int_add(original, one, "").ir()?
                } else {
                    self.builder.build_int_sub(original, one, "").ir()?
                };
                self.builder.build_store(place.ptr, updated).ir()?;
                Ok(Some(updated.into()))
            }
            "*" => {
                let place = self.place_of(right)?;
                Ok(Some(place.ptr.as_basic_value_enum()))
            }
            "<<" => {
                let ptr = self
                    .gen(right)?
                    .ok_or_else(|| self.err("operand has no value", right))?
                    .into_pointer_value();
                let Type::Pointer { inner, .. } = self.ws.types[right_tid] else {
                    return Err(self.err("dereference of a non-pointer", node));
                };
                let llvm_ty = self.llvm_type(inner)?;
                Ok(Some(self.builder.build_load(llvm_ty, ptr, "").ir()?))
            }
            _ => Err(self.err(format!("cannot generate prefix operator {op}"), node)),
        }
    }

    /// Arithmetic/comparison on already-generated operand values,
    /// dispatched on the operands' types. Shared by the plain and the
    /// compound-assignment forms.
    fn binary_value(
        &mut self,
        op: &str,
        left: NodeId,
        lhs: BasicValueEnum<'ctx>,
        right: NodeId,
        rhs: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let left_tid = self.ws.ast[left].tid.unwrap();
        let right_tid = self.ws.ast[right].tid.unwrap();
        let left_ty = self.ws.types[left_tid].clone();
        let right_ty = self.ws.types[right_tid].clone();

        // Pointer arithmetic: `ptr + int`, `ptr - int` are GEPs.
        if matches!(op, "+" | "-") {
            let (ptr_tid, ptr, int) = if matches!(left_ty, Type::Pointer { .. }) {
                (Some(left_tid), lhs, rhs)
            } else if matches!(right_ty, Type::Pointer { .. }) {
                (Some(right_tid), rhs, lhs)
            } else {
                (None, lhs, rhs)
            };
            if let Some(ptr_tid) = ptr_tid {
                let Type::Pointer { inner, .. } = self.ws.types[ptr_tid] else { unreachable!() };
                let mut offset = int.into_int_value();
                if op == "-" {
                    offset = self.builder.build_int_neg(offset, "").ir()?;
                }
                let element_ty = self.llvm_type(inner)?;
                // SAFETY: pointer arithmetic is as unchecked as in C.
                let value = unsafe {
                    self.builder.build_gep(element_ty, ptr.into_pointer_value(), &[offset], "").ir()?
                };
                return Ok(value.into());
            }
        }

        if let Some(predicate) = int_predicate(op, left_ty.is_signed()) {
            if matches!(left_ty, Type::Pointer { .. }) {
                let value = self
                    .builder
                    .build_int_compare(predicate, lhs.into_pointer_value(), rhs.into_pointer_value(), "")
                    .ir()?;
                return Ok(value.into());
            }
            if left_ty.is_int() || matches!(left_ty, Type::Bool) {
                let value = self
                    .builder
                    .build_int_compare(predicate, lhs.into_int_value(), rhs.into_int_value(), "")
                    .ir()?;
                return Ok(value.into());
            }
            if left_ty.is_float() {
                let value = self
                    .builder
                    .build_float_compare(
                        float_predicate(op),
                        lhs.into_float_value(),
                        rhs.into_float_value(),
                        "",
                    )
                    .ir()?;
                return Ok(value.into());
            }
        }

        if left_ty.is_int() {
            let (a, b) = (lhs.into_int_value(), rhs.into_int_value());
            let value = match (op, left_ty.is_signed()) {
                ("+", _) => self.builder.build_int_add(a, b, "").ir()?,
                ("-", _) => self.builder.build_int_sub(a, b, "").ir()?,
                ("*", _) => self.builder.build_int_mul(a, b, "").ir()?,
                ("/", true) => self.builder.build_int_signed_div(a, b, "").ir()?,
                ("/", false) => self.builder.build_int_unsigned_div(a, b, "").ir()?,
                ("%", true) => self.builder.build_int_signed_rem(a, b, "").ir()?,
                ("%", false) => self.builder.build_int_unsigned_rem(a, b, "").ir()?,
                _ => return Err(self.err(format!("cannot generate operator {op}"), left)),
            };
            return Ok(value.into());
        }

        if left_ty.is_float() {
            let (a, b) = (lhs.into_float_value(), rhs.into_float_value());
            let value = match op {
                "+" => self.builder.build_float_add(a, b, "").ir()?,
                "-" => self.builder.build_float_sub(a, b, "").ir()?,
                "*" => self.builder.build_float_mul(a, b, "").ir()?,
                "/" => self.builder.build_float_div(a, b, "").ir()?,
                _ => return Err(self.err(format!("cannot generate operator {op}"), left)),
            };
            return Ok(value.into());
        }

        Err(self.err(
            format!(
                "cannot generate operator {op} for types {} and {}",
                self.ws.type_name(left_tid),
                self.ws.type_name(right_tid)
            ),
            left,
        ))
    }

    /// `and`/`or` evaluate the right side in its own block and join with a
    /// phi whose short-circuit arm is the constant outcome.
    fn gen_short_circuit(
        &mut self,
        is_or: bool,
        left: NodeId,
        right: NodeId,
    ) -> Result<BasicValueEnum<'ctx>> {
        let test = self
            .gen(left)?
            .ok_or_else(|| self.err("operand has no value", left))?
            .into_int_value();

        let start_block = self.builder.get_insert_block().expect("positioned");
        let function = self.current_function();
        let right_block = self
            .context
            .append_basic_block(function, if is_or { "orright" } else { "andright" });
        let done_block = self
            .context
            .append_basic_block(function, if is_or { "ordone" } else { "anddone" });

        if is_or {
            self.builder.build_conditional_branch(test, done_block, right_block).ir()?;
        } else {
            self.builder.build_conditional_branch(test, right_block, done_block).ir()?;
        }

        self.builder.position_at_end(right_block);
        let rhs = self
            .gen(right)?
            .ok_or_else(|| self.err("operand has no value", right))?
            .into_int_value();
        let last_block = self.builder.get_insert_block().expect("positioned");
        self.branch(done_block)?;

        self.builder.position_at_end(done_block);
        let bool_ty = self.context.bool_type();
        let short_value = bool_ty.const_int(is_or as u64, false);
        let phi = self.builder.build_phi(bool_ty, "").ir()?;
        phi.add_incoming(&[(&short_value, start_block), (&rhs, last_block)]);
        Ok(phi.as_basic_value())
    }

    fn gen_member(
        &mut self,
        node: NodeId,
        left: NodeId,
        right: NodeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let rd = self
            .ws
            .resolution(right)
            .ok_or_else(|| self.err("member was never resolved", node))?;
        let decl_node = self.ws.decl(self.ws.resdecl(rd).decl).node;
        let (constant, value) = match &self.ws.ast[decl_node].kind {
            NodeKind::Declare(data) => (data.constant, data.value),
            _ => (false, None),
        };

        if constant {
            // Accessing a constant through an instance still computes the
            // instance's address for its side effects.
            if self.ws.types.unwrap_typeof(self.ws.ast[left].tid.unwrap()).is_none() {
                let _ = self.place_of(left)?;
            }
            let value = value.ok_or_else(|| self.err("member constant has no value", node))?;
            return Ok(Some(self.gen_constant(value)?));
        }

        let left_tid = self.ws.ast[left].tid.unwrap();
        if let Type::Array { fixed: Some(_), .. } = self.ws.types[left_tid] {
            // `array.a` decays to the first element's address.
            let place = self.place_of(left)?;
            let array_ty = self.llvm_type(left_tid)?;
            let zero = self.context.i32_type().const_zero();
            // SAFETY: index 0 of an in-bounds array address.
            let ptr =
                unsafe { self.builder.build_gep(array_ty, place.ptr, &[zero, zero], "").ir()? };
            return Ok(Some(ptr.as_basic_value_enum()));
        }

        let place = self.place_of(node)?;
        Ok(Some(self.load(place)?))
    }

    // ------------------------------------------------------------------
    // Casts and calls

    fn gen_cast(&mut self, node: NodeId, expr: NodeId) -> Result<Option<BasicValueEnum<'ctx>>> {
        let dst_tid = self.ws.ast[node].tid.unwrap();
        let src_tid = self.ws.ast[expr].tid.unwrap();

        if src_tid == dst_tid {
            return self.gen(expr);
        }

        let src = self.ws.types[src_tid].clone();
        let dst = self.ws.types[dst_tid].clone();

        // Fixed array to slice: build the {ptr, count} view.
        if let (
            Type::Array { fixed: Some(count), .. },
            Type::Array { fixed: None, dynamic: false, .. },
        ) = (&src, &dst)
        {
            let count = *count;
            let place = self.place_of(expr)?;
            let array_ty = self.llvm_type(src_tid)?;
            let zero = self.context.i32_type().const_zero();
            // SAFETY: index 0 of an in-bounds array address.
            let data =
                unsafe { self.builder.build_gep(array_ty, place.ptr, &[zero, zero], "").ir()? };
            let count = self.context.i32_type().const_int(count as u64, false);
            let view_ty = self.llvm_type(dst_tid)?.into_struct_type();
            let value =
                self.build_struct_value(view_ty, &[data.as_basic_value_enum(), count.into()])?;
            return Ok(Some(value));
        }

        let value = self
            .gen(expr)?
            .ok_or_else(|| self.err("cast source has no value", node))?;
        let dst_llvm = self.llvm_type(dst_tid)?;

        if src.is_int() && dst.is_int() {
            let (src_bits, dst_bits) = (src.bit_width().unwrap(), dst.bit_width().unwrap());
            let value = value.into_int_value();
            let dst_llvm = dst_llvm.into_int_type();
            let value = if src_bits > dst_bits {
                self.builder.build_int_truncate(value, dst_llvm, "").ir()?
            } else if src.is_signed() {
                self.builder.build_int_s_extend(value, dst_llvm, "").ir()?
            } else {
                self.builder.build_int_z_extend(value, dst_llvm, "").ir()?
            };
            return Ok(Some(value.into()));
        }
        if src.is_int() && dst.is_float() {
            let value = value.into_int_value();
            let dst_llvm = dst_llvm.into_float_type();
            let value = if src.is_signed() {
                self.builder.build_signed_int_to_float(value, dst_llvm, "").ir()?
            } else {
                self.builder.build_unsigned_int_to_float(value, dst_llvm, "").ir()?
            };
            return Ok(Some(value.into()));
        }
        if src.is_float() && dst.is_float() {
            let value = value.into_float_value();
            let dst_llvm = dst_llvm.into_float_type();
            let value = if src.bit_width() > dst.bit_width() {
                self.builder.build_float_trunc(value, dst_llvm, "").ir()?
            } else {
                self.builder.build_float_ext(value, dst_llvm, "").ir()?
            };
            return Ok(Some(value.into()));
        }
        if src.is_float() && dst.is_int() {
            let value = value.into_float_value();
            let dst_llvm = dst_llvm.into_int_type();
            let value = if dst.is_signed() {
                self.builder.build_float_to_signed_int(value, dst_llvm, "").ir()?
            } else {
                self.builder.build_float_to_unsigned_int(value, dst_llvm, "").ir()?
            };
            return Ok(Some(value.into()));
        }
        if matches!(src, Type::Pointer { .. }) && matches!(dst, Type::Pointer { .. }) {
            // Opaque pointers: every pointer is already `ptr`.
            return Ok(Some(value));
        }

        Err(self.err(
            format!(
                "cannot generate cast from {} to {}",
                self.ws.type_name(src_tid),
                self.ws.type_name(dst_tid)
            ),
            node,
        ))
    }

    fn gen_call(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: Vec<NodeId>,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        // sizeof/alignof collapse to layout constants.
        if let NodeKind::Identifier { name } = self.ws.ast[callee].kind {
            let name = self.ws.interner.resolve(name);
            if name == "sizeof" || name == "alignof" {
                let mut tid = self.ws.ast[args[0]].tid.unwrap();
                if let Some(inner) = self.ws.types.unwrap_typeof(tid) {
                    tid = inner;
                }
                let value = if name == "sizeof" {
                    self.ws.size_of(tid)?
                } else {
                    self.ws.align_of(tid)?
                };
                return Ok(Some(
                    self.context.i64_type().const_int(value as u64, false).into(),
                ));
            }
        }

        let mut arg_values: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        for arg in &args {
            let value = self
                .gen(*arg)?
                .ok_or_else(|| self.err("argument has no value", *arg))?;
            arg_values.push(value.into());
        }

        // Constant procedures call directly; anything else goes through a
        // function pointer.
        let direct = self.ws.resolution(callee).and_then(|rd| {
            let decl_node = self.ws.decl(self.ws.resdecl(rd).decl).node;
            match &self.ws.ast[decl_node].kind {
                NodeKind::Declare(data) if data.constant => data.value.filter(|&value| {
                    matches!(self.ws.ast[value].kind, NodeKind::Procedure(_))
                }),
                _ => None,
            }
        });

        let call_site = match direct {
            Some(proc_node) => {
                let function = self.ensure_procedure(proc_node)?;
                self.builder.build_call(function, &arg_values, "").ir()?
            }
            None => {
                let callee_tid = self.ws.ast[callee].tid.unwrap();
                let fn_ty = self.fn_type(callee_tid)?;
                let ptr = self
                    .gen(callee)?
                    .ok_or_else(|| self.err("callee has no value", node))?
                    .into_pointer_value();
                self.builder.build_indirect_call(fn_ty, ptr, &arg_values, "").ir()?
            }
        };

        let node_tid = self.ws.ast[node].tid.unwrap();
        if matches!(self.ws.types[node_tid], Type::Void) {
            return Ok(None);
        }
        Ok(call_site.try_as_basic_value().left())
    }
}

fn int_predicate(op: &str, signed: bool) -> Option<IntPredicate> {
    Some(match (op, signed) {
        ("==", _) => IntPredicate::EQ,
        ("!=", _) => IntPredicate::NE,
        ("<", true) => IntPredicate::SLT,
        ("<", false) => IntPredicate::ULT,
        (">", true) => IntPredicate::SGT,
        (">", false) => IntPredicate::UGT,
        ("<=", true) => IntPredicate::SLE,
        ("<=", false) => IntPredicate::ULE,
        (">=", true) => IntPredicate::SGE,
        (">=", false) => IntPredicate::UGE,
        _ => return None,
    })
}

fn float_predicate(op: &str) -> FloatPredicate {
    match op {
        "==" => FloatPredicate::OEQ,
        "!=" => FloatPredicate::ONE,
        "<" => FloatPredicate::OLT,
        ">" => FloatPredicate::OGT,
        "<=" => FloatPredicate::OLE,
        _ => FloatPredicate::OGE,
    }
}

fn undef_of(ty: inkwell::types::BasicTypeEnum<'_>) -> BasicValueEnum<'_> {
    match ty {
        inkwell::types::BasicTypeEnum::IntType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::StructType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        _ => unreachable!("vector types are never generated"),
    }
}
