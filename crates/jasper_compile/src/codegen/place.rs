//! Load/store addresses.
//!
//! A [`Place`] is a pointer plus the type it points at - the pair has to
//! travel together under opaque pointers, since every load and GEP needs
//! the pointee type spelled out. Member access walks the resolved `using`
//! path first, turning each injected field into a nested member step, and
//! auto-derefs one pointer level per step like the checker did.

use super::{Generator, IrResult};
use inkwell::values::PointerValue;
use jasper_base::{Result, Symbol};
use jasper_front::ast::{NodeId, NodeKind};
use jasper_front::types::{Type, TypeId};

#[derive(Clone, Copy)]
pub(crate) struct Place<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub tid: TypeId,
}

impl<'ctx> Generator<'ctx, '_> {
    /// The address to load from / store to for an expression. Expressions
    /// without storage get a temporary alloca holding their value.
    pub(crate) fn place_of(&mut self, node: NodeId) -> Result<Place<'ctx>> {
        match self.ws.ast[node].kind.clone() {
            NodeKind::Operator { op, left, right } => {
                let op = self.ws.interner.resolve(op).to_string();
                match (left, op.as_str()) {
                    (None, "<<") => {
                        // The address of a dereference is the pointer value.
                        let ptr = self
                            .gen(right)?
                            .ok_or_else(|| self.err("dereference of a void value", node))?
                            .into_pointer_value();
                        let right_tid = self.ws.ast[right].tid.unwrap();
                        let Type::Pointer { inner, .. } = self.ws.types[right_tid] else {
                            return Err(self.err("dereference of a non-pointer", node));
                        };
                        return Ok(Place { ptr, tid: inner });
                    }
                    (Some(left), ".") => {
                        let left_tid = self.ws.ast[left].tid.unwrap();
                        let mut place = if let Type::Pointer { inner, .. } = self.ws.types[left_tid]
                        {
                            let ptr = self
                                .gen(left)?
                                .ok_or_else(|| self.err("member base has no value", node))?
                                .into_pointer_value();
                            Place { ptr, tid: inner }
                        } else {
                            self.place_of(left)?
                        };

                        let rd = self
                            .ws
                            .resolution(right)
                            .ok_or_else(|| self.err("member was never resolved", node))?;
                        let path = self.ws.resdecl(rd).using_path.clone();
                        let final_decl = self.ws.resdecl(rd).decl;
                        for decl in path.into_iter().chain(std::iter::once(final_decl)) {
                            let name = self.ws.decl(decl).name;
                            place = self.member_place(place, name, node)?;
                        }
                        return Ok(place);
                    }
                    _ => {}
                }
            }

            NodeKind::Identifier { .. } => {
                let rd = self
                    .ws
                    .resolution(node)
                    .ok_or_else(|| self.err("identifier was never resolved", node))?;
                let path = self.ws.resdecl(rd).using_path.clone();
                let final_decl = self.ws.resdecl(rd).decl;

                if let Some((&first, rest)) = path.split_first() {
                    // A name injected by `using`: start at the outermost
                    // field's storage and walk inward.
                    let first_node = self.ws.decl(first).node;
                    let ptr = *self
                        .storage
                        .get(&first_node)
                        .ok_or_else(|| self.err("using base has no storage", node))?;
                    let tid = self.ws.ast[first_node].tid.unwrap();
                    let mut place = Place { ptr, tid };
                    for &decl in rest.iter().chain(std::iter::once(&final_decl)) {
                        let name = self.ws.decl(decl).name;
                        place = self.member_place(place, name, node)?;
                    }
                    return Ok(place);
                }

                let decl_node = self.ws.decl(final_decl).node;
                let ptr = *self
                    .storage
                    .get(&decl_node)
                    .ok_or_else(|| self.err("variable has no storage", node))?;
                return Ok(Place { ptr, tid: self.ws.ast[decl_node].tid.unwrap() });
            }

            NodeKind::ArrayIndex { base, index } => {
                let base_tid = self.ws.ast[base].tid.unwrap();
                match self.ws.types[base_tid].clone() {
                    Type::Pointer { inner, .. } => {
                        let ptr = self
                            .gen(base)?
                            .ok_or_else(|| self.err("index base has no value", node))?
                            .into_pointer_value();
                        let idx = self
                            .gen(index)?
                            .ok_or_else(|| self.err("index has no value", node))?
                            .into_int_value();
                        let element_ty = self.llvm_type(inner)?;
                        // SAFETY: the index was type checked against the
                        // pointee; out-of-range access is the program's
                        // concern, as in C.
                        let ptr = unsafe {
                            self.builder.build_gep(element_ty, ptr, &[idx], "").ir()?
                        };
                        return Ok(Place { ptr, tid: inner });
                    }
                    Type::Array { element, fixed: Some(_), .. } => {
                        let base_place = self.place_of(base)?;
                        let idx = self
                            .gen(index)?
                            .ok_or_else(|| self.err("index has no value", node))?
                            .into_int_value();
                        let array_ty = self.llvm_type(base_tid)?;
                        let zero = self.context.i32_type().const_zero();
                        // SAFETY: as above.
                        let ptr = unsafe {
                            self.builder.build_gep(array_ty, base_place.ptr, &[zero, idx], "").ir()?
                        };
                        return Ok(Place { ptr, tid: element });
                    }
                    Type::Array { element, .. } => {
                        // Slice / dynamic array: load the data pointer.
                        let base_place = self.place_of(base)?;
                        let view_ty = self.llvm_type(base_tid)?.into_struct_type();
                        let data_slot = self
                            .builder
                            .build_struct_gep(view_ty, base_place.ptr, 0, "")
                            .ir()?;
                        let ptr_ty = self.context.ptr_type(inkwell::AddressSpace::default());
                        let data = self
                            .builder
                            .build_load(ptr_ty, data_slot, "")
                            .ir()?
                            .into_pointer_value();
                        let idx = self
                            .gen(index)?
                            .ok_or_else(|| self.err("index has no value", node))?
                            .into_int_value();
                        let element_ty = self.llvm_type(element)?;
                        // SAFETY: as above.
                        let ptr = unsafe {
                            self.builder.build_gep(element_ty, data, &[idx], "").ir()?
                        };
                        return Ok(Place { ptr, tid: element });
                    }
                    _ => return Err(self.err("cannot index this type", node)),
                }
            }

            _ => {}
        }

        // No storage behind the expression: spill its value.
        let tid = self
            .ws
            .ast[node]
            .tid
            .ok_or_else(|| self.err("expression has no type", node))?;
        let llvm_ty = self.llvm_type(tid)?;
        let slot = self.alloc_builder.build_alloca(llvm_ty, "_tempAddr").ir()?;
        let value = self
            .gen(node)?
            .ok_or_else(|| self.err("expression has no value to take an address of", node))?;
        self.builder.build_store(slot, value).ir()?;
        Ok(Place { ptr: slot, tid })
    }

    /// One member step: auto-deref a pointer, special-case the `a` view of
    /// fixed arrays, otherwise GEP by the member's field index.
    pub(crate) fn member_place(
        &mut self,
        mut place: Place<'ctx>,
        member: Symbol,
        err_node: NodeId,
    ) -> Result<Place<'ctx>> {
        if let Type::Pointer { inner, .. } = self.ws.types[place.tid] {
            let ptr_ty = self.context.ptr_type(inkwell::AddressSpace::default());
            place.ptr = self.builder.build_load(ptr_ty, place.ptr, "").ir()?.into_pointer_value();
            place.tid = inner;
        }

        if let Type::Array { element, fixed: Some(_), .. } = self.ws.types[place.tid] {
            // Fixed arrays have no struct body; `a` is the first element's
            // address.
            debug_assert_eq!(self.ws.interner.resolve(member), "a");
            let array_ty = self.llvm_type(place.tid)?;
            let zero = self.context.i32_type().const_zero();
            // SAFETY: index 0 of an in-bounds array address.
            let ptr =
                unsafe { self.builder.build_gep(array_ty, place.ptr, &[zero, zero], "").ir()? };
            return Ok(Place { ptr, tid: element });
        }

        let members = self
            .ws
            .members_of(place.tid)
            .ok_or_else(|| self.err("member base is not struct-shaped", err_node))?;

        for (index, &member_decl) in members.iter().enumerate() {
            let decl_name = match &self.ws.ast[member_decl].kind {
                NodeKind::Declare(data) => data.name,
                _ => None,
            };
            if decl_name != Some(member) {
                continue;
            }

            let struct_ty = self.llvm_type(place.tid)?.into_struct_type();
            let ptr = self
                .builder
                .build_struct_gep(struct_ty, place.ptr, index as u32, "")
                .ir()?;
            let tid = self.ws.ast[member_decl].tid.unwrap();
            return Ok(Place { ptr, tid });
        }

        Err(self.err(
            format!(
                "couldn't find member {} of {}",
                self.ws.interner.resolve(member),
                self.ws.type_name(place.tid)
            ),
            err_node,
        ))
    }
}
