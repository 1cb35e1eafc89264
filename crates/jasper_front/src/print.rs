//! S-expression dump of the AST, with and without types.
//!
//! This is the output of `-s`/`--print-syntax` and `-t`/`--print-types`,
//! and the comparison format of the built-in scenario suite. Two modes
//! share one walker: syntax mode prints names and literal values
//! (`(DeclareSingle var a infer-type 'b)`), type mode substitutes each
//! node's resolved type (`(DeclareSingle s32 infer-type s32)`), with
//! literals reduced to their class (`IntLit`, `FloatLit`, ...).

use crate::ast::{LoopControlKind, NodeId, NodeKind};
use crate::token::Lit;
use crate::types::{Type, TypeId};
use crate::workspace::Workspace;
use std::fmt::Write;

/// Renders one node (and its subtree) as an s-expression.
pub fn dump_node(ws: &Workspace, node: NodeId, with_types: bool) -> String {
    let mut printer = Printer { ws, out: String::new(), printed: false, with_types };
    printer.node(node);
    printer.out
}

/// Renders a module's root block.
pub fn dump_module(ws: &Workspace, module: usize, with_types: bool) -> String {
    match ws.modules[module].root {
        Some(root) => dump_node(ws, root, with_types),
        None => String::new(),
    }
}

struct Printer<'ws> {
    ws: &'ws Workspace,
    out: String,
    printed: bool,
    with_types: bool,
}

impl Printer<'_> {
    fn sep(&mut self) {
        if self.printed {
            self.out.push(' ');
        } else {
            self.printed = true;
        }
    }

    fn node(&mut self, id: NodeId) {
        self.sep();

        let kind = &self.ws.ast[id].kind;
        let tid = self.ws.ast[id].tid;

        // Leaf forms first; everything else parenthesizes below.
        if !self.with_types {
            match kind {
                NodeKind::Literal(lit) => return self.literal(*lit),
                NodeKind::Null => return self.out.push_str("#null"),
                NodeKind::Uninitialized => return self.out.push_str("---"),
                NodeKind::Identifier { name } => {
                    self.out.push('\'');
                    self.out.push_str(self.ws.interner.resolve(*name));
                    return;
                }
                NodeKind::LoopControl(ctrl) => {
                    self.out.push_str(match ctrl {
                        LoopControlKind::Continue => "(continue)",
                        LoopControlKind::Break => "(break)",
                    });
                    return;
                }
                NodeKind::TypePolymorphic { name } => {
                    self.out.push('$');
                    self.out.push_str(self.ws.interner.resolve(*name));
                    return;
                }
                NodeKind::TypeVararg => return self.out.push_str(".."),
                NodeKind::ForeignLibrary { .. } => return self.out.push_str("#foreignlibrary"),
                NodeKind::Operator { op, left, right } => {
                    self.out.push('(');
                    self.out.push_str(self.ws.interner.resolve(*op));
                    if let Some(left) = left {
                        self.node(*left);
                    }
                    self.node(*right);
                    self.out.push(')');
                    return;
                }
                _ => {}
            }
        } else {
            match kind {
                NodeKind::Literal(lit) => {
                    self.out.push_str(match lit {
                        Lit::Str(_) => "StringLit",
                        Lit::Int(_) => "IntLit",
                        Lit::Float(_) => "FloatLit",
                        Lit::Bool(_) => "BoolLit",
                    });
                    return;
                }
                NodeKind::Null
                | NodeKind::Uninitialized
                | NodeKind::Identifier { .. }
                | NodeKind::LoopControl(_)
                | NodeKind::TypePolymorphic { .. }
                | NodeKind::TypeVararg
                | NodeKind::ForeignLibrary { .. } => return self.type_of(tid),
                NodeKind::Operator { op, left, right } => {
                    self.out.push('(');
                    self.out.push_str(self.ws.interner.resolve(*op));
                    self.out.push(' ');
                    self.type_of(tid);
                    if let Some(left) = left {
                        self.node(*left);
                    }
                    self.node(*right);
                    self.out.push(')');
                    return;
                }
                _ => {}
            }
        }

        self.out.push('(');
        self.out.push_str(kind.name());
        if self.with_types {
            self.out.push(' ');
            self.type_of(tid);
        }

        match kind.clone() {
            NodeKind::Block { stmts } => {
                for stmt in stmts {
                    self.node(stmt);
                }
            }
            NodeKind::Empty => {}
            NodeKind::If { cond, pass, else_ } => {
                self.node(cond);
                self.node(pass);
                if let Some(else_) = else_ {
                    self.node(else_);
                }
            }
            NodeKind::While { cond, body } => {
                self.node(cond);
                self.node(body);
            }
            NodeKind::For { iter, range, body, .. } => {
                if let Some(iter) = iter {
                    self.node(iter);
                }
                self.node(range);
                self.node(body);
            }
            NodeKind::Using { expr } => self.node(expr),
            NodeKind::Cast { is_auto, ty, expr } => {
                if is_auto {
                    self.out.push_str(" auto");
                } else if let Some(ty) = ty {
                    self.node(ty);
                } else {
                    self.out.push_str(" implicit");
                }
                self.node(expr);
            }
            NodeKind::New { ty } => self.node(ty),
            NodeKind::Delete { expr } | NodeKind::Remove { expr } => self.node(expr),
            NodeKind::Defer { stmt } => self.node(stmt),
            NodeKind::Inline { expr } => self.node(expr),
            NodeKind::PushContext { context, body } => {
                if !self.with_types {
                    self.out.push(' ');
                    self.out.push_str(self.ws.interner.resolve(context));
                }
                self.node(body);
            }
            NodeKind::ArrayIndex { base, index } => {
                self.node(base);
                self.node(index);
            }
            NodeKind::Call { callee, args } => {
                self.node(callee);
                for arg in args {
                    self.node(arg);
                }
            }
            NodeKind::Return { values } => {
                for value in values {
                    self.node(value);
                }
            }
            NodeKind::Declare(data) => {
                if !self.with_types {
                    self.out.push_str(if data.constant { " const" } else { " var" });
                    if data.using {
                        self.out.push_str(" using");
                    }
                    self.out.push(' ');
                    match data.name {
                        Some(name) => self.out.push_str(self.ws.interner.resolve(name)),
                        None => self.out.push_str("<no-name>"),
                    }
                }
                match data.ty {
                    Some(ty) => self.node(ty),
                    None => self.out.push_str(" infer-type"),
                }
                if let Some(value) = data.value {
                    self.node(value);
                }
            }
            NodeKind::DeclareMulti { names, ty, value, constant } => {
                if !self.with_types {
                    if constant {
                        self.out.push_str(" constant");
                    }
                    self.out.push_str(" (names");
                    for (name, _) in &names {
                        self.out.push(' ');
                        self.out.push_str(self.ws.interner.resolve(*name));
                    }
                    self.out.push(')');
                }
                match ty {
                    Some(ty) => self.node(ty),
                    None => self.out.push_str(" infer-type"),
                }
                if let Some(value) = value {
                    self.node(value);
                }
            }
            NodeKind::AssignMulti { names, value } => {
                if !self.with_types {
                    self.out.push_str(" (names");
                    for name in &names {
                        self.out.push(' ');
                        self.out.push_str(self.ws.interner.resolve(*name));
                    }
                    self.out.push(')');
                }
                self.node(value);
            }
            NodeKind::Struct { name, decls } => {
                if !self.with_types {
                    self.out.push(' ');
                    self.out.push_str(self.ws.interner.resolve(name));
                }
                for decl in decls {
                    self.node(decl);
                }
            }
            NodeKind::Enum { name, backing, decls } => {
                if !self.with_types {
                    self.out.push(' ');
                    self.out.push_str(self.ws.interner.resolve(name));
                }
                if let Some(backing) = backing {
                    self.node(backing);
                }
                for decl in decls {
                    self.node(decl);
                }
            }
            NodeKind::Procedure(proc) => {
                if proc.is_foreign && !self.with_types {
                    self.out.push_str(" (#foreign");
                    if let Some(foreign_name) = proc.foreign_name {
                        self.out.push(' ');
                        self.out.push_str(self.ws.interner.resolve(foreign_name));
                    }
                    self.out.push(')');
                }
                if !proc.args.is_empty() {
                    self.out.push_str(" (args");
                    for arg in &proc.args {
                        self.node(*arg);
                    }
                    self.out.push(')');
                }
                if !proc.rets.is_empty() {
                    self.out.push_str(" (returns");
                    for ret in &proc.rets {
                        self.ret_type(*ret);
                    }
                    self.out.push(')');
                }
                if let Some(body) = proc.body {
                    self.node(body);
                }
            }
            NodeKind::TypeProcedure { args, rets } => {
                if !args.is_empty() {
                    self.out.push_str(" (args");
                    for arg in args {
                        self.node(arg);
                    }
                    self.out.push(')');
                }
                if !rets.is_empty() {
                    self.out.push_str(" (returns");
                    for ret in rets {
                        self.ret_type(ret);
                    }
                    self.out.push(')');
                }
            }
            NodeKind::TypePointer { inner, .. } => self.node(inner),
            NodeKind::TypeArray { dynamic, size, inner, .. } => {
                if dynamic {
                    self.out.push_str(" dynamic");
                } else if let Some(size) = size {
                    self.out.push_str(" (size");
                    self.node(size);
                    self.out.push(')');
                }
                self.node(inner);
            }
            NodeKind::Import { path } => {
                if !self.with_types {
                    self.out.push_str(" \"");
                    self.out.push_str(self.ws.interner.resolve(path));
                    self.out.push('"');
                }
            }
            NodeKind::Run { expr } => self.node(expr),
            kind => {
                // Leaf forms returned above; anything else here is a walker bug.
                debug_assert!(false, "unhandled dump for {}", kind.name());
            }
        }
        self.out.push(')');
    }

    /// Return declarations print their type AST only.
    fn ret_type(&mut self, decl: NodeId) {
        if let NodeKind::Declare(data) = &self.ws.ast[decl].kind {
            if let Some(ty) = data.ty {
                self.node(ty);
                return;
            }
        }
        self.node(decl);
    }

    fn literal(&mut self, lit: Lit) {
        match lit {
            Lit::Str(text) => {
                self.out.push('"');
                let text = self.ws.interner.resolve(text).to_string();
                for ch in text.chars() {
                    match ch {
                        '\n' => self.out.push_str("\\n"),
                        '\t' => self.out.push_str("\\t"),
                        '\x0b' => self.out.push_str("\\v"),
                        '\r' => self.out.push_str("\\r"),
                        '\x0c' => self.out.push_str("\\f"),
                        '\x07' => self.out.push_str("\\a"),
                        '\\' => self.out.push_str("\\\\"),
                        '"' => self.out.push_str("\\\""),
                        ch => self.out.push(ch),
                    }
                }
                self.out.push('"');
            }
            Lit::Int(n) => {
                let _ = write!(self.out, "0x{n:x}");
            }
            Lit::Float(g) => {
                let _ = write!(self.out, "{g}");
            }
            Lit::Bool(b) => self.out.push_str(if b { "true" } else { "false" }),
        }
    }

    fn type_of(&mut self, tid: Option<TypeId>) {
        match tid {
            Some(tid) => self.type_id(tid),
            None => self.out.push_str("<no-type>"),
        }
    }

    fn type_id(&mut self, tid: TypeId) {
        match &self.ws.types[tid] {
            Type::Void => self.out.push_str("void"),
            Type::Bool => self.out.push_str("bool"),
            Type::String => self.out.push_str("string"),
            Type::S8 => self.out.push_str("s8"),
            Type::S16 => self.out.push_str("s16"),
            Type::S32 => self.out.push_str("s32"),
            Type::S64 => self.out.push_str("s64"),
            Type::U8 => self.out.push_str("u8"),
            Type::U16 => self.out.push_str("u16"),
            Type::U32 => self.out.push_str("u32"),
            Type::U64 => self.out.push_str("u64"),
            Type::Float => self.out.push_str("f32"),
            Type::Double => self.out.push_str("f64"),
            Type::Any => self.out.push_str("Any"),
            Type::Vararg => self.out.push_str(".."),
            Type::Struct { name, .. } | Type::Enum { name, .. } => {
                self.out.push_str(self.ws.interner.resolve(*name));
            }
            Type::Pointer { inner, soa } => {
                self.out.push_str(if *soa { "(* SOA " } else { "(* " });
                self.type_id(*inner);
                self.out.push(')');
            }
            Type::Array { element, fixed, dynamic, soa } => {
                self.out.push('(');
                if *dynamic {
                    self.out.push_str("[..]");
                } else if let Some(n) = fixed {
                    let _ = write!(self.out, "[{n}]");
                } else {
                    self.out.push_str("[]");
                }
                if *soa {
                    self.out.push_str(" SOA");
                }
                self.out.push(' ');
                self.type_id(*element);
                self.out.push(')');
            }
            Type::Procedure { args, rets, .. } => {
                let (args, rets) = (args.clone(), rets.clone());
                self.out.push_str("(Proc");
                for arg in args {
                    self.out.push(' ');
                    self.type_id(arg);
                }
                if !rets.is_empty() {
                    self.out.push_str(" ->");
                    for ret in rets {
                        self.out.push(' ');
                        self.type_id(ret);
                    }
                }
                self.out.push(')');
            }
            Type::TypeOf(inner) => {
                let inner = *inner;
                self.out.push_str("(Type ");
                self.type_id(inner);
                self.out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jasper_base::Loc;

    #[test]
    fn type_rendering_matches_dump_format() {
        let mut ws = Workspace::new();
        let u8_ptr = ws.types.pointer_to(ws.tids.u8_);
        let proc = ws.types.ensure(Type::Procedure {
            args: vec![u8_ptr],
            rets: vec![ws.tids.s32],
            c_vararg: true,
        });
        let node = ws.ast.alloc(NodeKind::Null, Loc::builtin());
        ws.ast[node].tid = Some(proc);
        assert_eq!(dump_node(&ws, node, true), "(Proc (* u8) -> s32)");
    }

    #[test]
    fn untyped_nodes_print_no_type() {
        let mut ws = Workspace::new();
        let node = ws.ast.alloc(NodeKind::Null, Loc::builtin());
        assert_eq!(dump_node(&ws, node, true), "<no-type>");
        assert_eq!(dump_node(&ws, node, false), "#null");
    }

    #[test]
    fn negative_ints_print_twos_complement_hex() {
        let mut ws = Workspace::new();
        let node = ws.ast.alloc(NodeKind::Literal(Lit::Int(-1)), Loc::builtin());
        assert_eq!(dump_node(&ws, node, false), "0xffffffffffffffff");
    }

    #[test]
    fn floats_print_shortest_form() {
        let mut ws = Workspace::new();
        let node = ws.ast.alloc(NodeKind::Literal(Lit::Float(6.0)), Loc::builtin());
        assert_eq!(dump_node(&ws, node, false), "6");
        let node = ws.ast.alloc(NodeKind::Literal(Lit::Float(6.5)), Loc::builtin());
        assert_eq!(dump_node(&ws, node, false), "6.5");
    }

    #[test]
    fn string_literals_escape() {
        let mut ws = Workspace::new();
        let text = ws.interner.intern("a\nb\"c");
        let node = ws.ast.alloc(NodeKind::Literal(Lit::Str(text)), Loc::builtin());
        assert_eq!(dump_node(&ws, node, false), "\"a\\nb\\\"c\"");
    }
}
