//! Type lowering to LLVM.
//!
//! Unsigned integers lower to the same LLVM widths as signed (LLVM has no
//! signedness; extensions pick sext/zext at the cast site). Pointers are
//! opaque. Slices lower to `{ptr, i32}` and dynamic arrays to
//! `{ptr, i32, i32}`; both are anonymous struct types, which LLVM uniques
//! structurally. Strings and user structs use the named types created by
//! `generate_all`.

use super::Generator;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::AddressSpace;
use jasper_base::{CompileError, Result};
use jasper_front::types::{Type, TypeId};

impl<'ctx> Generator<'ctx, '_> {
    pub(crate) fn llvm_type(&self, tid: TypeId) -> Result<BasicTypeEnum<'ctx>> {
        Ok(match &self.ws.types[tid] {
            Type::Bool => self.context.bool_type().into(),
            Type::S8 | Type::U8 => self.context.i8_type().into(),
            Type::S16 | Type::U16 => self.context.i16_type().into(),
            Type::S32 | Type::U32 => self.context.i32_type().into(),
            Type::S64 | Type::U64 => self.context.i64_type().into(),
            Type::Float => self.context.f32_type().into(),
            Type::Double => self.context.f64_type().into(),

            Type::Pointer { soa, .. } => {
                if *soa {
                    return Err(CompileError::raw("SOA pointers are not supported"));
                }
                self.context.ptr_type(AddressSpace::default()).into()
            }

            Type::String | Type::Struct { .. } => {
                let ty = self.struct_types.get(&tid).ok_or_else(|| {
                    CompileError::raw(format!(
                        "no LLVM struct registered for {}",
                        self.ws.type_name(tid)
                    ))
                })?;
                (*ty).into()
            }

            Type::Array { element, fixed, dynamic, soa } => {
                if *soa {
                    return Err(CompileError::raw("SOA arrays are not supported"));
                }
                if let Some(count) = fixed {
                    let element = self.llvm_type(*element)?;
                    element.array_type(*count as u32).into()
                } else {
                    let ptr = self.context.ptr_type(AddressSpace::default()).into();
                    let count = self.context.i32_type().into();
                    if *dynamic {
                        self.context.struct_type(&[ptr, count, count], false).into()
                    } else {
                        self.context.struct_type(&[ptr, count], false).into()
                    }
                }
            }

            Type::Procedure { .. } => self.context.ptr_type(AddressSpace::default()).into(),

            Type::Enum { backing, .. } => self.llvm_type(*backing)?,

            Type::Void | Type::Any | Type::TypeOf(_) | Type::Vararg => {
                return Err(CompileError::raw(format!(
                    "type {} has no value representation",
                    self.ws.type_name(tid)
                )))
            }
        })
    }

    /// Function signature for a procedure type. C varargs pass through the
    /// LLVM variadic flag; a native `..` parameter has no lowering.
    pub(crate) fn fn_type(&self, tid: TypeId) -> Result<FunctionType<'ctx>> {
        let Type::Procedure { args, rets, c_vararg } = &self.ws.types[tid] else {
            return Err(CompileError::raw(format!(
                "expected a procedure type, found {}",
                self.ws.type_name(tid)
            )));
        };

        if rets.len() > 1 {
            return Err(CompileError::raw(
                "procedures with multiple return values are not supported yet",
            ));
        }

        let mut params: Vec<BasicMetadataTypeEnum> = Vec::with_capacity(args.len());
        for &arg in args {
            if matches!(self.ws.types[arg], Type::Vararg) {
                return Err(CompileError::raw(
                    "vararg procedures can only be generated as foreign declarations",
                ));
            }
            params.push(self.llvm_type(arg)?.into());
        }

        Ok(match rets.first() {
            Some(&ret) => self.llvm_type(ret)?.fn_type(&params, *c_vararg),
            None => self.context.void_type().fn_type(&params, *c_vararg),
        })
    }
}
