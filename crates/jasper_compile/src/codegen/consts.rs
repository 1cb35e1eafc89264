//! Constant materialization.
//!
//! Compile-time values arrive as raw bytes from the constant evaluator
//! and are rebuilt here as LLVM constants, recursing through struct views
//! and fixed arrays. String data pointers travel as interner handles (see
//! `jasper_front::eval`); each distinct handle becomes a private
//! null-terminated global.

use super::{Generator, IrResult};
use inkwell::module::Linkage;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum, GlobalValue, PointerValue, UnnamedAddress};
use jasper_base::{CompileError, Result, Symbol};
use jasper_front::ast::{NodeId, NodeKind};
use jasper_front::eval;
use jasper_front::token::Lit;
use jasper_front::types::{Type, TypeId};

impl<'ctx> Generator<'ctx, '_> {
    /// Emits a constant-expression node: evaluate to bytes, materialize.
    /// String literals in pointer position become C-string globals
    /// directly.
    pub(crate) fn gen_constant(&mut self, node: NodeId) -> Result<BasicValueEnum<'ctx>> {
        match &self.ws.ast[node].kind {
            NodeKind::Literal(Lit::Str(text)) => {
                if let Some(tid) = self.ws.ast[node].tid {
                    if matches!(self.ws.types[tid], Type::Pointer { .. }) {
                        return Ok(self.const_string_ptr(*text).as_basic_value_enum());
                    }
                }
            }
            NodeKind::Procedure(_) => {
                let function = self.ensure_procedure(node)?;
                return Ok(function.as_global_value().as_pointer_value().as_basic_value_enum());
            }
            _ => {}
        }

        let tid = self
            .ws
            .ast[node]
            .tid
            .ok_or_else(|| self.err("constant expression has no type", node))?;
        let bytes = eval::eval_const(self.ws, node)?;
        self.const_value(tid, &bytes)
    }

    /// A type's default value as an LLVM constant.
    pub(crate) fn default_value(&mut self, tid: TypeId) -> Result<BasicValueEnum<'ctx>> {
        let mut bytes = vec![0u8; self.ws.size_of(tid)? as usize];
        eval::eval_default(self.ws, tid, &mut bytes)?;
        self.const_value(tid, &bytes)
    }

    /// Rebuilds raw constant bytes as a typed LLVM constant.
    pub(crate) fn const_value(&mut self, tid: TypeId, bytes: &[u8]) -> Result<BasicValueEnum<'ctx>> {
        let read_u64 = |bytes: &[u8]| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(buf)
        };

        Ok(match self.ws.types[tid].clone() {
            Type::Bool => self.context.bool_type().const_int(bytes[0] as u64, false).into(),
            Type::S8 => {
                self.context.i8_type().const_int(bytes[0] as i8 as i64 as u64, true).into()
            }
            Type::S16 => {
                let n = i16::from_le_bytes(bytes[..2].try_into().unwrap());
                self.context.i16_type().const_int(n as i64 as u64, true).into()
            }
            Type::S32 => {
                let n = i32::from_le_bytes(bytes[..4].try_into().unwrap());
                self.context.i32_type().const_int(n as i64 as u64, true).into()
            }
            Type::S64 => self.context.i64_type().const_int(read_u64(bytes), true).into(),
            Type::U8 => self.context.i8_type().const_int(bytes[0] as u64, false).into(),
            Type::U16 => {
                let n = u16::from_le_bytes(bytes[..2].try_into().unwrap());
                self.context.i16_type().const_int(n as u64, false).into()
            }
            Type::U32 => {
                let n = u32::from_le_bytes(bytes[..4].try_into().unwrap());
                self.context.i32_type().const_int(n as u64, false).into()
            }
            Type::U64 => self.context.i64_type().const_int(read_u64(bytes), false).into(),
            Type::Float => {
                let g = f32::from_le_bytes(bytes[..4].try_into().unwrap());
                self.context.f32_type().const_float(g as f64).into()
            }
            Type::Double => {
                let g = f64::from_le_bytes(bytes[..8].try_into().unwrap());
                self.context.f64_type().const_float(g).into()
            }

            Type::Pointer { inner, .. } => {
                let handle = read_u64(bytes);
                if handle == 0 {
                    return Ok(self
                        .context
                        .ptr_type(inkwell::AddressSpace::default())
                        .const_null()
                        .into());
                }
                // Only string data can be a non-null compile-time pointer.
                if !matches!(self.ws.types[inner], Type::U8) {
                    return Err(CompileError::raw(
                        "cannot materialize a non-string pointer constant",
                    ));
                }
                let sym = eval::string_from_handle(self.ws, handle).ok_or_else(|| {
                    CompileError::raw("dangling compile-time string handle")
                })?;
                self.const_string_ptr(sym).as_basic_value_enum()
            }

            Type::Array { element, fixed: Some(count), .. } => {
                let element_size = self.ws.size_of(element)? as usize;
                let mut values = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    values.push(
                        self.const_value(element, &bytes[i * element_size..(i + 1) * element_size])?,
                    );
                }
                let element_ty = self.llvm_type(element)?;
                const_array(element_ty, &values)
            }

            Type::String | Type::Struct { .. } | Type::Array { .. } => {
                let members = self
                    .ws
                    .members_of(tid)
                    .ok_or_else(|| CompileError::raw("struct constant has no member list"))?
                    .to_vec();
                let layout = self.ws.layout(tid)?;
                let mut values = Vec::with_capacity(members.len());
                for (member, offset) in members.iter().zip(layout.offsets) {
                    let member_tid = self.ws.ast[*member].tid.ok_or_else(|| {
                        CompileError::raw("struct member has no type")
                    })?;
                    let size = self.ws.size_of(member_tid)? as usize;
                    let slice = &bytes[offset as usize..offset as usize + size];
                    values.push(self.const_value(member_tid, slice)?);
                }
                match self.struct_types.get(&tid) {
                    Some(named) => named.const_named_struct(&values).into(),
                    None => self.context.const_struct(&values, false).into(),
                }
            }

            Type::Enum { backing, .. } => self.const_value(backing, bytes)?,

            _ => {
                return Err(CompileError::raw(format!(
                    "cannot build a constant of type {}",
                    self.ws.type_name(tid)
                )))
            }
        })
    }

    /// A private constant global holding the string's bytes plus a NUL,
    /// usable directly as `*u8` under opaque pointers.
    pub(crate) fn const_string_ptr(&mut self, text: Symbol) -> PointerValue<'ctx> {
        let text = self.ws.interner.resolve(text);
        let data = self.context.const_string(text.as_bytes(), true);
        let global: GlobalValue<'ctx> = self.module.add_global(data.get_type(), None, ".str");
        global.set_initializer(&data);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_unnamed_address(UnnamedAddress::Global);
        global.as_pointer_value()
    }

    /// Builds a first-class struct value from field values.
    pub(crate) fn build_struct_value(
        &mut self,
        ty: inkwell::types::StructType<'ctx>,
        fields: &[BasicValueEnum<'ctx>],
    ) -> Result<BasicValueEnum<'ctx>> {
        let mut value = ty.get_undef();
        for (index, field) in fields.iter().enumerate() {
            value = self
                .builder
                .build_insert_value(value, *field, index as u32, "")
                .ir()?
                .into_struct_value();
        }
        Ok(value.as_basic_value_enum())
    }
}

/// Typed constant-array construction over dynamically typed elements.
/// Vector element types never occur; nothing in the language produces
/// them.
fn const_array<'ctx>(
    element_ty: BasicTypeEnum<'ctx>,
    values: &[BasicValueEnum<'ctx>],
) -> BasicValueEnum<'ctx> {
    match element_ty {
        BasicTypeEnum::IntType(ty) => {
            let values: Vec<_> = values.iter().map(|v| v.into_int_value()).collect();
            ty.const_array(&values).into()
        }
        BasicTypeEnum::FloatType(ty) => {
            let values: Vec<_> = values.iter().map(|v| v.into_float_value()).collect();
            ty.const_array(&values).into()
        }
        BasicTypeEnum::PointerType(ty) => {
            let values: Vec<_> = values.iter().map(|v| v.into_pointer_value()).collect();
            ty.const_array(&values).into()
        }
        BasicTypeEnum::StructType(ty) => {
            let values: Vec<_> = values.iter().map(|v| v.into_struct_value()).collect();
            ty.const_array(&values).into()
        }
        BasicTypeEnum::ArrayType(ty) => {
            let values: Vec<_> = values.iter().map(|v| v.into_array_value()).collect();
            ty.const_array(&values).into()
        }
        _ => unreachable!("vector element types are never generated"),
    }
}
