//! Interned types.
//!
//! Every distinct structural type exists exactly once: [`TypeTable::ensure`]
//! hashes the candidate and returns the existing [`TypeId`] on a hit, so
//! `==` on ids is type equality. Struct and enum types fold their declaring
//! AST node into the hash, which keeps two textually identical `struct {…}`
//! bodies distinct, and lets a struct type be registered before its body is
//! finished (self-referential pointers resolve against the already-interned
//! id).
//!
//! Sizes, alignments and field offsets are *not* stored here; the workspace
//! computes them lazily per type the first time something asks (see
//! `Workspace::layout`), after bodies are fully typed.

use crate::ast::NodeId;
use jasper_base::{Interner, Symbol};
use std::collections::HashMap;
use std::ops::Index;

/// Opaque handle to an interned type. Equality is identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    Float,
    Double,
    Pointer { inner: TypeId, soa: bool },
    Procedure { args: Vec<TypeId>, rets: Vec<TypeId>, c_vararg: bool },
    /// `decl` is the `Struct` AST node; `members` are the non-constant
    /// member declarations in layout order.
    Struct { name: Symbol, decl: NodeId, members: Vec<NodeId> },
    String,
    /// `fixed: Some(n)` for `[N]T`, `dynamic` for `[..]T`, neither for `[]T`.
    Array { element: TypeId, fixed: Option<i64>, dynamic: bool, soa: bool },
    Any,
    Enum { name: Symbol, decl: NodeId, backing: TypeId },
    /// A type used as a value (the right-hand side of `X :: struct {…}`).
    TypeOf(TypeId),
    Vararg,
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(
            self,
            Type::S8 | Type::S16 | Type::S32 | Type::S64 | Type::U8 | Type::U16 | Type::U32 | Type::U64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::S8 | Type::S16 | Type::S32 | Type::S64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    /// Bit width of integer and float types.
    pub fn bit_width(&self) -> Option<u32> {
        Some(match self {
            Type::S8 | Type::U8 => 8,
            Type::S16 | Type::U16 => 16,
            Type::S32 | Type::U32 => 32,
            Type::S64 | Type::U64 => 64,
            Type::Float => 32,
            Type::Double => 64,
            _ => return None,
        })
    }

    /// Size of types whose layout needs no recursion. Pointers are 8 bytes.
    pub fn basic_size(&self) -> Option<u32> {
        Some(match self {
            Type::Bool => 1,
            Type::S8 | Type::U8 => 1,
            Type::S16 | Type::U16 => 2,
            Type::S32 | Type::U32 => 4,
            Type::S64 | Type::U64 => 8,
            Type::Float => 4,
            Type::Double => 8,
            Type::Pointer { .. } => 8,
            _ => return None,
        })
    }
}

/// Memoized layout of one type.
#[derive(Debug, Clone)]
pub struct Layout {
    pub size: u32,
    pub align: u32,
    /// Byte offset per member, for struct-shaped types.
    pub offsets: Vec<u32>,
}

/// The type interner.
#[derive(Default)]
pub struct TypeTable {
    types: Vec<Type>,
    dedup: HashMap<Type, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a type, returning the id of the single canonical instance.
    pub fn ensure(&mut self, ty: Type) -> TypeId {
        if let Some(&tid) = self.dedup.get(&ty) {
            return tid;
        }
        let tid = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.dedup.insert(ty, tid);
        tid
    }

    /// `*T`.
    pub fn pointer_to(&mut self, inner: TypeId) -> TypeId {
        self.ensure(Type::Pointer { inner, soa: false })
    }

    /// `TypeOf(T)`; idempotent on types that are already wrappers.
    pub fn wrap_typeof(&mut self, tid: TypeId) -> TypeId {
        if matches!(self[tid], Type::TypeOf(_)) {
            return tid;
        }
        self.ensure(Type::TypeOf(tid))
    }

    /// Unwraps `TypeOf(T)` to `T`, or `None` when the type is not a wrapper.
    pub fn unwrap_typeof(&self, tid: TypeId) -> Option<TypeId> {
        match self[tid] {
            Type::TypeOf(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Human-readable form for diagnostics: `* SOA T`, `[8] T`,
    /// `(s32, f32) -> bool`, struct/enum names, `#type T`.
    pub fn display(&self, tid: TypeId, interner: &Interner) -> String {
        let mut out = String::new();
        self.display_into(tid, interner, &mut out);
        out
    }

    fn display_into(&self, tid: TypeId, interner: &Interner, out: &mut String) {
        use std::fmt::Write;
        match &self[tid] {
            Type::Void => out.push_str("void"),
            Type::Bool => out.push_str("bool"),
            Type::S8 => out.push_str("s8"),
            Type::S16 => out.push_str("s16"),
            Type::S32 => out.push_str("s32"),
            Type::S64 => out.push_str("s64"),
            Type::U8 => out.push_str("u8"),
            Type::U16 => out.push_str("u16"),
            Type::U32 => out.push_str("u32"),
            Type::U64 => out.push_str("u64"),
            Type::Float => out.push_str("float"),
            Type::Double => out.push_str("double"),
            Type::String => out.push_str("string"),
            Type::Any => out.push_str("any"),
            Type::Vararg => out.push_str(".."),
            Type::Pointer { inner, soa } => {
                out.push_str(if *soa { "* SOA " } else { "* " });
                self.display_into(*inner, interner, out);
            }
            Type::Array { element, fixed, dynamic, soa } => {
                if *dynamic {
                    out.push_str("[..] ");
                } else if let Some(n) = fixed {
                    let _ = write!(out, "[{n}] ");
                } else {
                    out.push_str("[] ");
                }
                if *soa {
                    out.push_str("SOA ");
                }
                self.display_into(*element, interner, out);
            }
            Type::Procedure { args, rets, .. } => {
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.display_into(*arg, interner, out);
                }
                out.push(')');
                if !rets.is_empty() {
                    out.push_str(" -> ");
                    for (i, ret) in rets.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.display_into(*ret, interner, out);
                    }
                }
            }
            Type::Struct { name, .. } | Type::Enum { name, .. } => {
                out.push_str(interner.resolve(*name));
            }
            Type::TypeOf(inner) => {
                out.push_str("#type ");
                self.display_into(*inner, interner, out);
            }
        }
    }
}

impl Index<TypeId> for TypeTable {
    type Output = Type;

    fn index(&self, tid: TypeId) -> &Type {
        &self.types[tid.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_types_intern_to_one_id() {
        let mut table = TypeTable::new();
        let s32 = table.ensure(Type::S32);
        let p1 = table.pointer_to(s32);
        let p2 = table.pointer_to(s32);
        assert_eq!(p1, p2);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        let mut table = TypeTable::new();
        let s32 = table.ensure(Type::S32);
        let u32_ = table.ensure(Type::U32);
        assert_ne!(s32, u32_);
        assert_ne!(table.pointer_to(s32), table.pointer_to(u32_));
    }

    #[test]
    fn wrap_typeof_is_idempotent() {
        let mut table = TypeTable::new();
        let s32 = table.ensure(Type::S32);
        let wrapped = table.wrap_typeof(s32);
        assert_eq!(table.wrap_typeof(wrapped), wrapped);
        assert_eq!(table.unwrap_typeof(wrapped), Some(s32));
        assert_eq!(table.unwrap_typeof(s32), None);
    }

    #[test]
    fn procedure_types_compare_by_signature() {
        let mut table = TypeTable::new();
        let s32 = table.ensure(Type::S32);
        let f = table.ensure(Type::Procedure { args: vec![s32], rets: vec![s32], c_vararg: false });
        let g = table.ensure(Type::Procedure { args: vec![s32], rets: vec![s32], c_vararg: false });
        let h = table.ensure(Type::Procedure { args: vec![s32], rets: vec![s32], c_vararg: true });
        assert_eq!(f, g);
        assert_ne!(f, h);
    }

    #[test]
    fn display_renders_nested_types() {
        let mut table = TypeTable::new();
        let interner = Interner::new();
        let s32 = table.ensure(Type::S32);
        let ptr = table.pointer_to(s32);
        let arr = table.ensure(Type::Array { element: ptr, fixed: Some(4), dynamic: false, soa: false });
        assert_eq!(table.display(arr, &interner), "[4] * s32");
    }

    #[test]
    fn int_classification() {
        assert!(Type::U64.is_int());
        assert!(!Type::U64.is_signed());
        assert!(Type::S8.is_signed());
        assert!(Type::Float.is_float());
        assert_eq!(Type::Pointer { inner: TypeId(0), soa: false }.basic_size(), Some(8));
    }
}
