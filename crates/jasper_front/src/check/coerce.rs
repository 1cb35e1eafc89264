//! Literal typing and implicit coercion.
//!
//! Literals carry no type until a use site demands one; `try_coerce_lit`
//! finalizes a literal to its default type (smallest signed integer that
//! holds the value, `f32` for floats, `string`, `bool`). Coercion between
//! typed expressions inserts an implicit `Cast` node in place, moving the
//! original expression to a fresh id.
//!
//! The three-valued [`Tfn`] mirrors the fact that some conversions cannot
//! be judged from the target's kind alone (string literal to `*u8`,
//! `null` to a concrete pointer); those are settled by the full
//! type-to-type check.

use super::Checker;
use crate::ast::{AstNode, NodeId, NodeKind};
use crate::token::Lit;
use crate::types::{Type, TypeId};
use jasper_base::{CompileError, Result};

/// True / false / "depends on the concrete target type".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tfn {
    True,
    False,
    Nil,
}

/// Binary-operator class flags, shared by the value and assignment tables.
pub(crate) mod bopi {
    pub const ALL_INTEGERS: u32 = 0x01;
    pub const BOOLS: u32 = 0x02;
    pub const ALL_FLOATS: u32 = 0x04;
    pub const POINTERS: u32 = 0x08;
    pub const POINTER_AND_INT: u32 = 0x10;
    pub const ANY_SAME: u32 = 0x100;
    pub const RETURN_BOOL: u32 = 0x1000;
}

/// `{op, allowed kinds}` rows for plain binary operators.
pub(crate) const BINARY_OPERATORS: &[(&str, u32)] = &[
    ("<", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    (">", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    ("<=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    (">=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    ("==", bopi::ALL_INTEGERS | bopi::BOOLS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    ("!=", bopi::ALL_INTEGERS | bopi::BOOLS | bopi::ALL_FLOATS | bopi::POINTERS | bopi::RETURN_BOOL),
    ("and", bopi::BOOLS),
    ("or", bopi::BOOLS),
    ("+", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTER_AND_INT),
    ("-", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTER_AND_INT),
    ("*", bopi::ALL_INTEGERS | bopi::ALL_FLOATS),
    ("/", bopi::ALL_INTEGERS | bopi::ALL_FLOATS),
    ("%", bopi::ALL_INTEGERS),
];

/// `{op, allowed kinds}` rows for assigning operators.
pub(crate) const ASSIGN_OPERATORS: &[(&str, u32)] = &[
    ("=", bopi::ANY_SAME),
    ("+=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTER_AND_INT),
    ("-=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS | bopi::POINTER_AND_INT),
    ("*=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS),
    ("/=", bopi::ALL_INTEGERS | bopi::ALL_FLOATS),
    ("%=", bopi::ALL_INTEGERS),
];

impl Checker<'_> {
    /// Smallest signed type the literal fits in, falling back to `s64`.
    pub(crate) fn int_literal_default(&self, n: i64) -> TypeId {
        if (i8::MIN as i64..=i8::MAX as i64).contains(&n) {
            self.ws.tids.s8
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&n) {
            self.ws.tids.s16
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&n) {
            self.ws.tids.s32
        } else {
            self.ws.tids.s64
        }
    }

    pub(crate) fn literal_default_tid(&self, lit: Lit) -> TypeId {
        match lit {
            Lit::Str(_) => self.ws.tids.string,
            Lit::Int(n) => self.int_literal_default(n),
            Lit::Float(_) => self.ws.tids.float,
            Lit::Bool(_) => self.ws.tids.bool_,
        }
    }

    /// Finalizes an untyped node to its literal default type; errors for
    /// non-literals.
    pub(crate) fn try_coerce_lit(&mut self, id: NodeId) -> Result<()> {
        if self.ws.ast[id].tid.is_some() {
            return Ok(());
        }
        match self.ws.ast[id].kind {
            NodeKind::Literal(lit) => {
                self.ws.ast[id].tid = Some(self.literal_default_tid(lit));
                Ok(())
            }
            _ => Err(CompileError::new(
                "cannot infer a type for a non-literal",
                self.ws.ast[id].loc,
            )),
        }
    }

    /// Like [`Self::try_coerce_lit`] but silent for non-literals.
    pub(crate) fn try_default_type(&mut self, id: NodeId) {
        if self.ws.ast[id].tid.is_none() {
            if let NodeKind::Literal(lit) = self.ws.ast[id].kind {
                self.ws.ast[id].tid = Some(self.literal_default_tid(lit));
            }
        }
    }

    /// The source type an auto-cast would convert from, if determinable.
    fn auto_cast_source(&self, id: NodeId) -> Option<TypeId> {
        let NodeKind::Cast { is_auto: true, ty: None, expr } = self.ws.ast[id].kind else {
            return None;
        };
        match self.ws.ast[expr].tid {
            Some(tid) => Some(tid),
            None => match self.ws.ast[expr].kind {
                NodeKind::Literal(lit) => Some(self.literal_default_tid(lit)),
                _ => None,
            },
        }
    }

    fn is_auto_cast(&self, id: NodeId) -> bool {
        matches!(self.ws.ast[id].kind, NodeKind::Cast { is_auto: true, ty: None, .. })
    }

    /// Explicit-cast compatibility: int<->int, int<->float, float<->float,
    /// pointer<->pointer.
    pub(crate) fn castable(&self, src: TypeId, dst: TypeId) -> bool {
        let src = &self.ws.types[src];
        let dst = &self.ws.types[dst];
        if src.is_int() || src.is_float() {
            return dst.is_int() || dst.is_float();
        }
        matches!(src, Type::Pointer { .. }) && matches!(dst, Type::Pointer { .. })
    }

    /// Can `id` coerce to a type of `target`'s kind? `Nil` defers to the
    /// full type-to-type check.
    fn tfn_can_coerce(&self, id: NodeId, target: &Type) -> Tfn {
        match &self.ws.ast[id].kind {
            NodeKind::Literal(lit) => {
                return match lit {
                    Lit::Str(_) => match target {
                        Type::String => Tfn::True,
                        // Allowed only for *u8; needs the concrete type.
                        Type::Pointer { .. } => Tfn::Nil,
                        _ => Tfn::False,
                    },
                    Lit::Int(n) => {
                        if target.is_float() {
                            return Tfn::True;
                        }
                        if !target.is_int() {
                            return Tfn::False;
                        }
                        let bits = target.bit_width().unwrap_or(64);
                        let fits = if target.is_signed() {
                            let (min, max) = if bits == 64 {
                                (i64::MIN, i64::MAX)
                            } else {
                                (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
                            };
                            *n >= min && *n <= max
                        } else {
                            let max = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
                            *n >= 0 && (*n as u64) <= max
                        };
                        if fits {
                            Tfn::True
                        } else {
                            Tfn::False
                        }
                    }
                    Lit::Float(_) => {
                        if target.is_float() {
                            Tfn::True
                        } else {
                            Tfn::False
                        }
                    }
                    Lit::Bool(_) => {
                        if matches!(target, Type::Bool) {
                            Tfn::True
                        } else {
                            Tfn::False
                        }
                    }
                };
            }
            NodeKind::Null => {
                return if matches!(target, Type::Pointer { .. }) { Tfn::True } else { Tfn::False };
            }
            // Anything may stay uninitialized.
            NodeKind::Uninitialized => return Tfn::True,
            NodeKind::Cast { is_auto: true, ty: None, .. } => return Tfn::Nil,
            _ => {}
        }

        let Some(src_tid) = self.ws.ast[id].tid else { return Tfn::Nil };
        let src = &self.ws.types[src_tid];

        if src.is_int() && target.is_int() {
            let (src_bits, dst_bits) = (src.bit_width().unwrap(), target.bit_width().unwrap());
            // Signed widens into signed; unsigned widens into unsigned of
            // at least its width, or signed of strictly greater width.
            let ok = if src.is_signed() {
                target.is_signed() && dst_bits >= src_bits
            } else if !target.is_signed() {
                dst_bits >= src_bits
            } else {
                dst_bits > src_bits
            };
            return if ok { Tfn::True } else { Tfn::False };
        }

        if matches!(src, Type::Float) && matches!(target, Type::Double) {
            return Tfn::True;
        }

        Tfn::Nil
    }

    /// Coercion check against one of the builtin scalar types, used by the
    /// operator tables.
    pub(crate) fn can_coerce_basic(&self, id: NodeId, tid: TypeId) -> bool {
        match self.tfn_can_coerce(id, &self.ws.types[tid].clone()) {
            Tfn::True => true,
            Tfn::False => false,
            Tfn::Nil => {
                if self.is_auto_cast(id) {
                    return self.auto_cast_source(id).is_some_and(|src| self.castable(src, tid));
                }
                self.ws.ast[id].tid == Some(tid)
            }
        }
    }

    /// Full coercion check against a concrete target type.
    pub(crate) fn can_coerce(&self, id: NodeId, target: TypeId) -> bool {
        if self.ws.ast[id].tid == Some(target) {
            return true;
        }

        match self.tfn_can_coerce(id, &self.ws.types[target].clone()) {
            Tfn::True => return true,
            Tfn::False => return false,
            Tfn::Nil => {}
        }

        if self.is_auto_cast(id) {
            return self.auto_cast_source(id).is_some_and(|src| self.castable(src, target));
        }

        // String literals may become C strings.
        if let NodeKind::Literal(Lit::Str(_)) = self.ws.ast[id].kind {
            if let Type::Pointer { inner, soa: false } = self.ws.types[target] {
                return matches!(self.ws.types[inner], Type::U8);
            }
        }

        let Some(src_tid) = self.ws.ast[id].tid else { return false };

        // Fixed and dynamic arrays view as slices of the same element.
        if let (
            Type::Array { element: dst_elem, fixed: None, dynamic: false, .. },
            Type::Array { element: src_elem, fixed, dynamic, .. },
        ) = (&self.ws.types[target], &self.ws.types[src_tid])
        {
            if (fixed.is_some() || *dynamic) && src_elem == dst_elem {
                return true;
            }
        }

        // Any pointer coerces to *void.
        if let Type::Pointer { inner, .. } = self.ws.types[target] {
            if matches!(self.ws.types[inner], Type::Void)
                && matches!(self.ws.types[src_tid], Type::Pointer { .. })
            {
                return true;
            }
        }

        false
    }

    /// Coerces `id` to `target`, finalizing literals in place and wrapping
    /// typed expressions in an implicit cast node.
    pub(crate) fn coerce(&mut self, id: NodeId, target: TypeId) -> Result<()> {
        if !self.can_coerce(id, target) {
            return Err(CompileError::new(
                format!("cannot convert to type {}", self.ws.type_name(target)),
                self.ws.ast[id].loc,
            ));
        }

        match self.ws.ast[id].kind {
            NodeKind::Literal(Lit::Int(n)) if self.ws.types[target].is_float() => {
                self.ws.ast[id].kind = NodeKind::Literal(Lit::Float(n as f64));
                self.ws.ast[id].tid = Some(target);
                return Ok(());
            }
            NodeKind::Literal(_) | NodeKind::Null | NodeKind::Uninitialized => {
                self.ws.ast[id].tid = Some(target);
                return Ok(());
            }
            NodeKind::Cast { is_auto: true, ty: None, expr } => {
                self.try_default_type(expr);
                self.ws.ast[id].tid = Some(target);
                return Ok(());
            }
            _ => {}
        }

        if self.ws.ast[id].tid == Some(target) {
            return Ok(());
        }

        // Insert an implicit cast: the expression moves to a fresh id and
        // the original slot becomes the cast, so every parent sees it.
        let inner = self.ws.move_node(id);
        let loc = self.ws.ast[id].loc;
        self.ws.ast[id] = AstNode {
            kind: NodeKind::Cast { is_auto: false, ty: None, expr: inner },
            loc,
            tid: Some(target),
        };
        Ok(())
    }

    /// Promotes an argument passed through C varargs: floats widen to
    /// `double`, integers narrower than 32 bits widen by signedness.
    pub(crate) fn try_coerce_c_vararg(&mut self, id: NodeId) -> Result<()> {
        let src_tid = match self.ws.ast[id].tid {
            Some(tid) => tid,
            None => match self.ws.ast[id].kind {
                NodeKind::Literal(lit) => self.literal_default_tid(lit),
                _ => {
                    return Err(CompileError::new(
                        "cannot infer a type for a non-literal",
                        self.ws.ast[id].loc,
                    ))
                }
            },
        };

        let src = self.ws.types[src_tid].clone();
        if src.is_float() {
            self.coerce(id, self.ws.tids.double)?;
        } else if src.is_int() && src.bit_width().unwrap_or(64) < 32 {
            let target = if src.is_signed() { self.ws.tids.s32 } else { self.ws.tids.u32_ };
            self.coerce(id, target)?;
        }

        // Wide-enough literals keep their default type.
        if self.ws.ast[id].tid.is_none() {
            self.ws.ast[id].tid = Some(src_tid);
        }
        Ok(())
    }

    /// Is the expression addressable (assignable, incrementable,
    /// address-of-able)?
    pub(crate) fn can_get_address(&self, id: NodeId) -> bool {
        match &self.ws.ast[id].kind {
            NodeKind::Operator { op, left, .. } => {
                let op = self.ws.interner.resolve(*op);
                (left.is_some() && op == ".") || (left.is_none() && op == "<<")
            }
            NodeKind::Identifier { .. } | NodeKind::ArrayIndex { .. } => true,
            _ => false,
        }
    }

    /// Finds a common type for a binary operator's operands per the class
    /// flags, coercing both sides. Returns the operand type on success.
    pub(crate) fn try_coerce_operator_args(
        &mut self,
        left: NodeId,
        right: NodeId,
        flags: u32,
    ) -> Result<Option<TypeId>> {
        if flags & bopi::ALL_INTEGERS != 0 {
            let ladder = [
                self.ws.tids.s8,
                self.ws.tids.u8_,
                self.ws.tids.s16,
                self.ws.tids.u16_,
                self.ws.tids.s32,
                self.ws.tids.u32_,
                self.ws.tids.s64,
                self.ws.tids.u64_,
            ];
            for tid in ladder {
                if self.can_coerce_basic(left, tid) && self.can_coerce_basic(right, tid) {
                    self.coerce(left, tid)?;
                    self.coerce(right, tid)?;
                    return Ok(Some(tid));
                }
            }
        }

        if flags & bopi::BOOLS != 0 {
            let tid = self.ws.tids.bool_;
            if self.can_coerce_basic(left, tid) && self.can_coerce_basic(right, tid) {
                self.coerce(left, tid)?;
                self.coerce(right, tid)?;
                return Ok(Some(tid));
            }
        }

        if flags & bopi::ALL_FLOATS != 0 {
            for tid in [self.ws.tids.float, self.ws.tids.double] {
                if self.can_coerce_basic(left, tid) && self.can_coerce_basic(right, tid) {
                    self.coerce(left, tid)?;
                    self.coerce(right, tid)?;
                    return Ok(Some(tid));
                }
            }
        }

        if flags & bopi::POINTERS != 0 {
            let left_tid = self.ws.ast[left].tid;
            let right_tid = self.ws.ast[right].tid;
            let left_is_ptr =
                left_tid.is_some_and(|t| matches!(self.ws.types[t], Type::Pointer { .. }));
            let right_is_ptr =
                right_tid.is_some_and(|t| matches!(self.ws.types[t], Type::Pointer { .. }));

            if left_is_ptr && right_is_ptr && left_tid == right_tid {
                return Ok(left_tid);
            }
            if matches!(self.ws.ast[left].kind, NodeKind::Null) && right_is_ptr {
                self.coerce(left, right_tid.unwrap())?;
                return Ok(right_tid);
            }
            if matches!(self.ws.ast[right].kind, NodeKind::Null) && left_is_ptr {
                self.coerce(right, left_tid.unwrap())?;
                return Ok(left_tid);
            }
        }

        if flags & bopi::POINTER_AND_INT != 0 {
            let s64 = self.ws.tids.s64;
            let left_tid = self.ws.ast[left].tid;
            let right_tid = self.ws.ast[right].tid;
            let left_is_ptr =
                left_tid.is_some_and(|t| matches!(self.ws.types[t], Type::Pointer { .. }));
            let right_is_ptr =
                right_tid.is_some_and(|t| matches!(self.ws.types[t], Type::Pointer { .. }));

            if left_is_ptr && self.can_coerce_basic(right, s64) {
                self.coerce(right, s64)?;
                return Ok(left_tid);
            }
            if right_is_ptr && self.can_coerce_basic(left, s64) {
                self.coerce(left, s64)?;
                return Ok(right_tid);
            }
        }

        Ok(None)
    }

    /// Coerces the right side of a compound assignment to the storage
    /// type, when the storage type belongs to the operator's class.
    pub(crate) fn try_coerce_operator_assign(
        &mut self,
        left: NodeId,
        right: NodeId,
        flags: u32,
    ) -> Result<bool> {
        let store_tid = self.ws.ast[left].tid.ok_or_else(|| {
            CompileError::new("assignment target has no type", self.ws.ast[left].loc)
        })?;
        let store = self.ws.types[store_tid].clone();

        let class_matches = flags & bopi::ANY_SAME != 0
            || (flags & bopi::ALL_INTEGERS != 0 && store.is_int())
            || (flags & bopi::ALL_FLOATS != 0 && store.is_float())
            || (flags & bopi::BOOLS != 0 && matches!(store, Type::Bool));

        if class_matches {
            if self.can_coerce(right, store_tid) {
                self.coerce(right, store_tid)?;
                return Ok(true);
            }
            return Ok(false);
        }

        if flags & bopi::POINTER_AND_INT != 0 && matches!(store, Type::Pointer { .. }) {
            let s64 = self.ws.tids.s64;
            if self.can_coerce_basic(right, s64) {
                self.coerce(right, s64)?;
                return Ok(true);
            }
            return Ok(false);
        }

        Ok(false)
    }
}
