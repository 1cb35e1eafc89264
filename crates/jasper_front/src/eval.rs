//! The compile-time constant evaluator.
//!
//! Produces the raw bytes of a value into a destination buffer sized by
//! the value's type. This is deliberately not a general interpreter: it
//! supports exactly what array sizes, global initializers and `#run`
//! expressions reach - literals, constant identifiers, unary `-`/`!`, the
//! arithmetic and comparison operators, short-circuit `and`/`or`,
//! constant member access through a type name, numeric and pointer casts,
//! and nested `#run`.
//!
//! Pointer-shaped constants cannot hold real addresses at compile time;
//! a string's data pointer is stored as an interner handle (symbol index
//! plus one, zero meaning null) that the emitter turns back into a global.

use crate::ast::{NodeId, NodeKind};
use crate::token::Lit;
use crate::types::{Type, TypeId};
use crate::workspace::Workspace;
use jasper_base::{CompileError, Loc, Result, Symbol};
use std::collections::HashMap;

/// Encodes a string's compile-time data pointer.
pub fn string_handle(sym: Symbol) -> u64 {
    sym.index() as u64 + 1
}

/// Decodes a compile-time data pointer back to its string.
pub fn string_from_handle(ws: &Workspace, handle: u64) -> Option<Symbol> {
    if handle == 0 {
        return None;
    }
    ws.interner.symbol_at((handle - 1) as usize)
}

/// Evaluates a typed node to its raw bytes.
pub fn eval_const(ws: &Workspace, node: NodeId) -> Result<Vec<u8>> {
    let tid = ws.ast[node]
        .tid
        .ok_or_else(|| CompileError::new("cannot evaluate an untyped expression", ws.ast[node].loc))?;
    let size = ws.size_of(tid)? as usize;
    let mut out = vec![0u8; size];
    EvalCtx { ws, vars: HashMap::new() }.eval(node, &mut out)?;
    Ok(out)
}

/// Writes a type's default value: zeros for scalars, pointers, slices,
/// dynamic arrays and enums; element-wise defaults for fixed arrays;
/// member initializers (or their defaults) for structs.
pub fn eval_default(ws: &Workspace, tid: TypeId, out: &mut [u8]) -> Result<()> {
    match &ws.types[tid] {
        Type::Bool
        | Type::S8
        | Type::S16
        | Type::S32
        | Type::S64
        | Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::Float
        | Type::Double
        | Type::String
        | Type::Pointer { .. }
        | Type::Procedure { .. }
        | Type::Enum { .. } => {
            out.fill(0);
            Ok(())
        }

        Type::Array { element, fixed: Some(count), .. } => {
            let (element, count) = (*element, *count);
            let element_size = ws.size_of(element)? as usize;
            for i in 0..count as usize {
                eval_default(ws, element, &mut out[i * element_size..(i + 1) * element_size])?;
            }
            Ok(())
        }
        Type::Array { .. } => {
            out.fill(0);
            Ok(())
        }

        Type::Struct { members, .. } => {
            let members = members.clone();
            let layout = ws.layout(tid)?;
            for (member, offset) in members.iter().zip(layout.offsets) {
                let member_tid = ws.ast[*member].tid.ok_or_else(|| {
                    CompileError::new("struct member has no type", ws.ast[*member].loc)
                })?;
                let size = ws.size_of(member_tid)? as usize;
                let slot = &mut out[offset as usize..offset as usize + size];
                let value = match &ws.ast[*member].kind {
                    NodeKind::Declare(data) => data.value,
                    _ => None,
                };
                match value {
                    Some(value) => {
                        let bytes = eval_const(ws, value)?;
                        slot.copy_from_slice(&bytes);
                    }
                    None => eval_default(ws, member_tid, slot)?,
                }
            }
            Ok(())
        }

        _ => Err(CompileError::raw(format!(
            "cannot build a default value for type {}",
            ws.type_name(tid)
        ))),
    }
}

/// One evaluation, with storage for any variables the evaluated code
/// binds. Constants are re-evaluated from their declarations instead.
struct EvalCtx<'ws> {
    ws: &'ws Workspace,
    vars: HashMap<NodeId, Vec<u8>>,
}

/// A decoded scalar; arithmetic happens at full width and results are
/// truncated back to the target's width (two's-complement wrap).
#[derive(Debug, Clone, Copy)]
enum Scalar {
    Bool(bool),
    I(i64),
    U(u64),
    F32(f32),
    F64(f64),
}

impl EvalCtx<'_> {
    fn eval(&mut self, node: NodeId, out: &mut [u8]) -> Result<()> {
        let loc = self.ws.ast[node].loc;
        let tid = self.ws.ast[node]
            .tid
            .ok_or_else(|| CompileError::new("cannot evaluate an untyped expression", loc))?;

        match self.ws.ast[node].kind.clone() {
            NodeKind::Literal(lit) => self.eval_literal(lit, tid, out, loc),

            NodeKind::Null => {
                out.fill(0);
                Ok(())
            }

            NodeKind::Identifier { .. } => {
                let rd = self.ws.resolution(node).ok_or_else(|| {
                    CompileError::new("identifier was never resolved", loc)
                })?;
                let decl_node = self.ws.decl(self.ws.resdecl(rd).decl).node;
                let (constant, value) = match &self.ws.ast[decl_node].kind {
                    NodeKind::Declare(data) => (data.constant, data.value),
                    _ => (false, None),
                };
                if constant {
                    let value = value.ok_or_else(|| {
                        CompileError::new("constant has no value to evaluate", loc)
                    })?;
                    return self.eval(value, out);
                }
                match self.vars.get(&decl_node) {
                    Some(bytes) => {
                        out.copy_from_slice(bytes);
                        Ok(())
                    }
                    None => Err(CompileError::new(
                        "expected a constant or a variable bound during evaluation",
                        loc,
                    )),
                }
            }

            NodeKind::Operator { op, left, right } => {
                let op = self.ws.interner.resolve(op).to_string();
                self.eval_operator(node, &op, left, right, tid, out, loc)
            }

            NodeKind::Cast { expr, .. } => {
                let src_tid = self.ws.ast[expr].tid.ok_or_else(|| {
                    CompileError::new("cast source has no type", loc)
                })?;
                if src_tid == tid {
                    return self.eval(expr, out);
                }

                let src = self.eval_to_vec(expr)?;
                if matches!(self.ws.types[src_tid], Type::Pointer { .. })
                    && matches!(self.ws.types[tid], Type::Pointer { .. })
                {
                    out.copy_from_slice(&src);
                    return Ok(());
                }

                let value = decode(self.ws, src_tid, &src, loc)?;
                encode_converted(self.ws, tid, value, out, loc)
            }

            NodeKind::Run { expr } => self.eval(expr, out),

            _ => Err(CompileError::new("cannot evaluate this expression at compile time", loc)),
        }
    }

    fn eval_literal(&self, lit: Lit, tid: TypeId, out: &mut [u8], loc: Loc) -> Result<()> {
        match lit {
            Lit::Bool(b) => encode(self.ws, tid, Scalar::Bool(b), out, loc),
            Lit::Int(n) => encode(self.ws, tid, Scalar::I(n), out, loc),
            Lit::Float(g) => encode(self.ws, tid, Scalar::F64(g), out, loc),
            Lit::Str(sym) => match &self.ws.types[tid] {
                Type::Pointer { .. } => {
                    out[..8].copy_from_slice(&string_handle(sym).to_le_bytes());
                    Ok(())
                }
                Type::String => {
                    let count = self.ws.interner.resolve(sym).len() as u32;
                    out[..8].copy_from_slice(&string_handle(sym).to_le_bytes());
                    out[8..12].copy_from_slice(&count.to_le_bytes());
                    Ok(())
                }
                _ => Err(CompileError::new("string literal with non-string type", loc)),
            },
        }
    }

    fn eval_to_vec(&mut self, node: NodeId) -> Result<Vec<u8>> {
        let loc = self.ws.ast[node].loc;
        let tid = self.ws.ast[node]
            .tid
            .ok_or_else(|| CompileError::new("cannot evaluate an untyped expression", loc))?;
        let mut out = vec![0u8; self.ws.size_of(tid)? as usize];
        self.eval(node, &mut out)?;
        Ok(out)
    }

    fn eval_operator(
        &mut self,
        node: NodeId,
        op: &str,
        left: Option<NodeId>,
        right: NodeId,
        tid: TypeId,
        out: &mut [u8],
        loc: Loc,
    ) -> Result<()> {
        let Some(left) = left else {
            let right_tid = self.ws.ast[right].tid.ok_or_else(|| {
                CompileError::new("operand has no type", loc)
            })?;
            let bytes = self.eval_to_vec(right)?;
            let value = decode(self.ws, right_tid, &bytes, loc)?;
            let value = match (op, value) {
                ("-", Scalar::I(n)) => Scalar::I(n.wrapping_neg()),
                ("-", Scalar::U(n)) => Scalar::U(n.wrapping_neg()),
                ("-", Scalar::F32(g)) => Scalar::F32(-g),
                ("-", Scalar::F64(g)) => Scalar::F64(-g),
                ("!", Scalar::Bool(b)) => Scalar::Bool(!b),
                _ => {
                    return Err(CompileError::new(
                        format!("cannot evaluate unary {op} at compile time"),
                        loc,
                    ))
                }
            };
            return encode(self.ws, tid, value, out, loc);
        };

        match op {
            "and" | "or" => {
                let first = self.eval_to_vec(left)?;
                let lhs = first.first().copied().unwrap_or(0) != 0;
                let short = if op == "and" { !lhs } else { lhs };
                if short {
                    out[0] = lhs as u8;
                    return Ok(());
                }
                self.eval(right, out)
            }

            "." => {
                // Constant member access through a type name.
                let left_tid = self.ws.ast[left].tid.ok_or_else(|| {
                    CompileError::new("member base has no type", loc)
                })?;
                if self.ws.types.unwrap_typeof(left_tid).is_none() {
                    return Err(CompileError::new(
                        "cannot evaluate this member access at compile time",
                        loc,
                    ));
                }
                let rd = self.ws.resolution(right).ok_or_else(|| {
                    CompileError::new("member was never resolved", loc)
                })?;
                let decl_node = self.ws.decl(self.ws.resdecl(rd).decl).node;
                let value = match &self.ws.ast[decl_node].kind {
                    NodeKind::Declare(data) => data.value,
                    _ => None,
                };
                let value = value.ok_or_else(|| {
                    CompileError::new("member constant has no value", loc)
                })?;
                self.eval(value, out)
            }

            "<" | ">" | "<=" | ">=" | "==" | "!=" | "+" | "-" | "*" | "/" | "%" => {
                let left_tid = self.ws.ast[left].tid.ok_or_else(|| {
                    CompileError::new("operand has no type", loc)
                })?;
                let right_tid = self.ws.ast[right].tid.ok_or_else(|| {
                    CompileError::new("operand has no type", loc)
                })?;

                let lhs_bytes = self.eval_to_vec(left)?;
                let rhs_bytes = self.eval_to_vec(right)?;
                let lhs = decode(self.ws, left_tid, &lhs_bytes, loc)?;
                let rhs = decode(self.ws, right_tid, &rhs_bytes, loc)?;

                let value = scalar_binop(op, lhs, rhs).ok_or_else(|| {
                    CompileError::new(
                        format!(
                            "cannot evaluate operator {op} for types {} and {}",
                            self.ws.type_name(left_tid),
                            self.ws.type_name(right_tid)
                        ),
                        loc,
                    )
                })??;
                encode(self.ws, tid, value, out, loc)
            }

            _ => {
                let _ = node;
                Err(CompileError::new(
                    format!("cannot evaluate operator {op} at compile time"),
                    loc,
                ))
            }
        }
    }
}

/// Shared dispatch for the arithmetic/comparison table. The outer `Option`
/// is "operator/type pair unsupported"; the inner result carries division
/// errors.
fn scalar_binop(op: &str, lhs: Scalar, rhs: Scalar) -> Option<Result<Scalar>> {
    use Scalar::*;

    macro_rules! cmp {
        ($a:expr, $b:expr) => {
            Some(Ok(Bool(match op {
                "<" => $a < $b,
                ">" => $a > $b,
                "<=" => $a <= $b,
                ">=" => $a >= $b,
                "==" => $a == $b,
                "!=" => $a != $b,
                _ => return None,
            })))
        };
    }

    match (lhs, rhs) {
        (Bool(a), Bool(b)) => match op {
            "==" => Some(Ok(Bool(a == b))),
            "!=" => Some(Ok(Bool(a != b))),
            _ => None,
        },
        (I(a), I(b)) => match op {
            "+" => Some(Ok(I(a.wrapping_add(b)))),
            "-" => Some(Ok(I(a.wrapping_sub(b)))),
            "*" => Some(Ok(I(a.wrapping_mul(b)))),
            "/" => Some(match a.checked_div(b) {
                Some(n) => Ok(I(n)),
                None => Err(CompileError::raw("division by zero in constant expression")),
            }),
            "%" => Some(match a.checked_rem(b) {
                Some(n) => Ok(I(n)),
                None => Err(CompileError::raw("division by zero in constant expression")),
            }),
            _ => cmp!(a, b),
        },
        (U(a), U(b)) => match op {
            "+" => Some(Ok(U(a.wrapping_add(b)))),
            "-" => Some(Ok(U(a.wrapping_sub(b)))),
            "*" => Some(Ok(U(a.wrapping_mul(b)))),
            "/" => Some(match a.checked_div(b) {
                Some(n) => Ok(U(n)),
                None => Err(CompileError::raw("division by zero in constant expression")),
            }),
            "%" => Some(match a.checked_rem(b) {
                Some(n) => Ok(U(n)),
                None => Err(CompileError::raw("division by zero in constant expression")),
            }),
            _ => cmp!(a, b),
        },
        (F32(a), F32(b)) => match op {
            "+" => Some(Ok(F32(a + b))),
            "-" => Some(Ok(F32(a - b))),
            "*" => Some(Ok(F32(a * b))),
            "/" => Some(Ok(F32(a / b))),
            _ => cmp!(a, b),
        },
        (F64(a), F64(b)) => match op {
            "+" => Some(Ok(F64(a + b))),
            "-" => Some(Ok(F64(a - b))),
            "*" => Some(Ok(F64(a * b))),
            "/" => Some(Ok(F64(a / b))),
            _ => cmp!(a, b),
        },
        _ => None,
    }
}

fn decode(ws: &Workspace, tid: TypeId, bytes: &[u8], loc: Loc) -> Result<Scalar> {
    let take = |n: usize| -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    };

    Ok(match &ws.types[tid] {
        Type::Bool => Scalar::Bool(bytes[0] != 0),
        Type::S8 => Scalar::I(bytes[0] as i8 as i64),
        Type::S16 => Scalar::I(i16::from_le_bytes(bytes[..2].try_into().unwrap()) as i64),
        Type::S32 => Scalar::I(i32::from_le_bytes(bytes[..4].try_into().unwrap()) as i64),
        Type::S64 => Scalar::I(i64::from_le_bytes(take(8))),
        Type::U8 => Scalar::U(bytes[0] as u64),
        Type::U16 => Scalar::U(u16::from_le_bytes(bytes[..2].try_into().unwrap()) as u64),
        Type::U32 => Scalar::U(u32::from_le_bytes(bytes[..4].try_into().unwrap()) as u64),
        Type::U64 => Scalar::U(u64::from_le_bytes(take(8))),
        Type::Float => Scalar::F32(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
        Type::Double => Scalar::F64(f64::from_le_bytes(take(8))),
        Type::Pointer { .. } => Scalar::U(u64::from_le_bytes(take(8))),
        _ => {
            return Err(CompileError::new(
                format!("cannot evaluate values of type {}", ws.type_name(tid)),
                loc,
            ))
        }
    })
}

fn encode(ws: &Workspace, tid: TypeId, value: Scalar, out: &mut [u8], loc: Loc) -> Result<()> {
    // A `Bool` result may land in a bool slot only; numeric results
    // truncate to the target's width.
    match (&ws.types[tid], value) {
        (Type::Bool, Scalar::Bool(b)) => out[0] = b as u8,
        (Type::Bool, Scalar::I(n)) => out[0] = (n != 0) as u8,
        (ty, Scalar::I(n)) if ty.is_int() => {
            let width = ty.bit_width().unwrap_or(64) as usize / 8;
            out[..width].copy_from_slice(&n.to_le_bytes()[..width]);
        }
        (ty, Scalar::U(n)) if ty.is_int() => {
            let width = ty.bit_width().unwrap_or(64) as usize / 8;
            out[..width].copy_from_slice(&n.to_le_bytes()[..width]);
        }
        (Type::Float, Scalar::F64(g)) => out[..4].copy_from_slice(&(g as f32).to_le_bytes()),
        (Type::Float, Scalar::F32(g)) => out[..4].copy_from_slice(&g.to_le_bytes()),
        (Type::Double, Scalar::F64(g)) => out[..8].copy_from_slice(&g.to_le_bytes()),
        (Type::Double, Scalar::F32(g)) => out[..8].copy_from_slice(&(g as f64).to_le_bytes()),
        (Type::Float, Scalar::I(n)) => out[..4].copy_from_slice(&(n as f32).to_le_bytes()),
        (Type::Double, Scalar::I(n)) => out[..8].copy_from_slice(&(n as f64).to_le_bytes()),
        (Type::Pointer { .. }, Scalar::U(n)) => out[..8].copy_from_slice(&n.to_le_bytes()),
        _ => {
            return Err(CompileError::new(
                format!("cannot store this constant into type {}", ws.type_name(tid)),
                loc,
            ))
        }
    }
    Ok(())
}

/// Numeric conversion for casts: decode at the source type, re-encode at
/// the destination with C conversion semantics.
fn encode_converted(ws: &Workspace, dst: TypeId, value: Scalar, out: &mut [u8], loc: Loc) -> Result<()> {
    let dst_ty = &ws.types[dst];
    let converted = match value {
        Scalar::I(n) => {
            if dst_ty.is_float() {
                Scalar::F64(n as f64)
            } else {
                Scalar::I(n)
            }
        }
        Scalar::U(n) => {
            if dst_ty.is_float() {
                Scalar::F64(n as f64)
            } else {
                Scalar::U(n)
            }
        }
        Scalar::F32(g) => {
            if dst_ty.is_int() {
                if dst_ty.is_signed() {
                    Scalar::I(g as i64)
                } else {
                    Scalar::U(g as u64)
                }
            } else {
                Scalar::F64(g as f64)
            }
        }
        Scalar::F64(g) => {
            if dst_ty.is_int() {
                if dst_ty.is_signed() {
                    Scalar::I(g as i64)
                } else {
                    Scalar::U(g as u64)
                }
            } else {
                Scalar::F64(g)
            }
        }
        Scalar::Bool(_) => {
            return Err(CompileError::new("cannot cast a bool constant", loc));
        }
    };
    encode(ws, dst, converted, out, loc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_arithmetic_wraps_at_width() {
        let Scalar::I(sum) = scalar_binop("+", Scalar::I(200), Scalar::I(100)).unwrap().unwrap()
        else {
            panic!()
        };
        assert_eq!(sum, 300);

        let ws = Workspace::new();
        let mut out = [0u8; 1];
        encode(&ws, ws.tids.s8, Scalar::I(300), &mut out, Loc::builtin()).unwrap();
        assert_eq!(out[0] as i8, 44); // 300 truncates to 8 bits
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(scalar_binop("/", Scalar::I(1), Scalar::I(0)).unwrap().is_err());
        assert!(scalar_binop("%", Scalar::U(1), Scalar::U(0)).unwrap().is_err());
    }

    #[test]
    fn comparisons_yield_bools() {
        let Scalar::Bool(b) = scalar_binop("<", Scalar::F64(1.0), Scalar::F64(2.0)).unwrap().unwrap()
        else {
            panic!()
        };
        assert!(b);
    }

    #[test]
    fn string_handles_round_trip() {
        let mut ws = Workspace::new();
        let sym = ws.interner.intern("hello");
        let handle = string_handle(sym);
        assert_ne!(handle, 0);
        assert_eq!(string_from_handle(&ws, handle), Some(sym));
        assert_eq!(string_from_handle(&ws, 0), None);
    }

    #[test]
    fn default_value_of_fixed_array_recurses() {
        let mut ws = Workspace::new();
        let arr = ws.types.ensure(Type::Array {
            element: ws.tids.s32,
            fixed: Some(3),
            dynamic: false,
            soa: false,
        });
        let mut out = vec![0xffu8; 12];
        eval_default(&ws, arr, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }
}
