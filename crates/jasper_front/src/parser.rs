//! Tokens to AST.
//!
//! Recursive descent for statements and declarations, an explicit-stack
//! precedence climber for binary operators. Statement terminators are `;`
//! or end-of-line; newlines are consumed inside expressions only where an
//! operand is still expected, so an expression continues across lines only
//! after an operator or an open delimiter.
//!
//! Declarations are recognized by two-token lookahead (`name :`,
//! `name ::`, `name :=`, `name, name…`), and `Name :: struct/enum/(…)`
//! forms get their own path so a procedure can carry `#foreign` and a
//! struct body can nest further declarations. Enum bodies desugar each row
//! into constant declarations, cloning the row's value expression with
//! `iota` replaced by the row index.

use crate::ast::{DeclareData, LoopControlKind, NodeId, NodeKind, ProcData};
use crate::lexer::Lexer;
use crate::token::{Keyword, Lit, Token, TokenKind};
use crate::workspace::Workspace;
use jasper_base::{CompileError, Loc, ModuleId, Result, Symbol};

/// Parses and loads every queued module, following `#import` directives as
/// they are discovered. Modules parse in discovery order.
pub fn parse_all(ws: &mut Workspace) -> Result<()> {
    let mut index = 0;
    while index < ws.modules.len() {
        let module = ModuleId(index as u32);
        if ws.modules[index].source.is_none() {
            let path = ws.modules[index].path.clone();
            let source = std::fs::read_to_string(&path)
                .map_err(|e| CompileError::raw(format!("could not read file {path}: {e}")))?;
            ws.modules[index].source = Some(source);
        }

        let source = ws.modules[index].source.clone().unwrap_or_default();
        let root = Parser::new(ws, module, &source).parse_root_block()?;
        ws.modules[index].root = Some(root);

        // Queue any imported files behind the ones we already know.
        let stmts = match &ws.ast[root].kind {
            NodeKind::Block { stmts } => stmts.clone(),
            _ => Vec::new(),
        };
        for stmt in stmts {
            if let NodeKind::Import { path } = ws.ast[stmt].kind {
                let path = ws.interner.resolve(path).to_string();
                ws.add_module_file(&path);
            }
        }

        index += 1;
    }
    Ok(())
}

/// Operator-stack depth; expressions nesting deeper are rejected.
const MAX_OPERATOR_DEPTH: usize = 32;

pub struct Parser<'ws> {
    ws: &'ws mut Workspace,
    lexer: Lexer,
    module: ModuleId,
}

impl<'ws> Parser<'ws> {
    pub fn new(ws: &'ws mut Workspace, module: ModuleId, source: &str) -> Self {
        let lexer = Lexer::new(module, source);
        Self { ws, lexer, module }
    }

    // ------------------------------------------------------------------
    // Token helpers

    fn peek(&mut self, ahead: usize) -> Result<Token> {
        self.lexer.peek(&mut self.ws.interner, ahead)
    }

    fn consume(&mut self, count: usize) -> Result<()> {
        self.lexer.consume(&mut self.ws.interner, count)
    }

    fn op_text(&self, sym: Symbol) -> &str {
        self.ws.interner.resolve(sym)
    }

    fn token_is_op(&self, tok: &Token, text: &str) -> bool {
        matches!(tok.kind, TokenKind::Operator { text: sym, .. } if self.op_text(sym) == text)
    }

    fn try_simple(&mut self, kind: TokenKind) -> Result<Option<Token>> {
        let tok = self.peek(0)?;
        if tok.kind == kind {
            self.consume(1)?;
            return Ok(Some(tok));
        }
        Ok(None)
    }

    fn expect_simple(&mut self, kind: TokenKind) -> Result<Token> {
        let tok = self.peek(0)?;
        if tok.kind == kind {
            self.consume(1)?;
            return Ok(tok);
        }
        Err(CompileError::new(
            format!("expected {}, found {}", kind.name(), tok.kind.name()),
            tok.loc,
        ))
    }

    fn try_keyword(&mut self, keyword: Keyword) -> Result<Option<Token>> {
        let tok = self.peek(0)?;
        if tok.kind == TokenKind::Keyword(keyword) {
            self.consume(1)?;
            return Ok(Some(tok));
        }
        Ok(None)
    }

    fn try_operator(&mut self, text: &str) -> Result<Option<Token>> {
        let tok = self.peek(0)?;
        if self.token_is_op(&tok, text) {
            self.consume(1)?;
            return Ok(Some(tok));
        }
        Ok(None)
    }

    fn expect_identifier(&mut self) -> Result<(Symbol, Loc)> {
        let tok = self.peek(0)?;
        if let TokenKind::Identifier(name) = tok.kind {
            self.consume(1)?;
            return Ok((name, tok.loc));
        }
        Err(CompileError::new(
            format!("expected identifier, found {}", tok.kind.name()),
            tok.loc,
        ))
    }

    fn expect_string_literal(&mut self) -> Result<(Symbol, Loc)> {
        let tok = self.peek(0)?;
        if let TokenKind::Literal(Lit::Str(text)) = tok.kind {
            self.consume(1)?;
            return Ok((text, tok.loc));
        }
        Err(CompileError::new(
            format!("expected string literal, found {}", tok.kind.name()),
            tok.loc,
        ))
    }

    /// Consumes a `;` or newline if one is next; `}` and EOF also end a
    /// statement without one.
    fn try_terminator(&mut self) -> Result<()> {
        let tok = self.peek(0)?;
        if tok.kind == TokenKind::Semicolon || tok.kind == TokenKind::NewLine {
            self.consume(1)?;
        }
        Ok(())
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while self.try_simple(TokenKind::NewLine)?.is_some() {}
        Ok(())
    }

    fn alloc(&mut self, kind: NodeKind, loc: Loc) -> NodeId {
        self.ws.ast.alloc(kind, loc)
    }

    // ------------------------------------------------------------------
    // Expressions

    fn parse_expression(&mut self) -> Result<NodeId> {
        let tok = self.peek(0)?;
        match self.try_parse_expression()? {
            Some(expr) => Ok(expr),
            None => Err(CompileError::new("expected expression", tok.loc)),
        }
    }

    fn try_parse_expression(&mut self) -> Result<Option<NodeId>> {
        if let Some(tok) = self.try_keyword(Keyword::RunDirective)? {
            let next = self.peek(0)?;
            let expr = if next.kind == TokenKind::OpenBrace {
                self.parse_block()?
            } else {
                self.parse_expression()?
            };
            return Ok(Some(self.alloc(NodeKind::Run { expr }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Inline)? {
            let expr = self.parse_expression()?;
            return Ok(Some(self.alloc(NodeKind::Inline { expr }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Continue)? {
            return Ok(Some(self.alloc(NodeKind::LoopControl(LoopControlKind::Continue), tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Break)? {
            return Ok(Some(self.alloc(NodeKind::LoopControl(LoopControlKind::Break), tok.loc)));
        }
        if let Some(tok) = self.try_operator("---")? {
            return Ok(Some(self.alloc(NodeKind::Uninitialized, tok.loc)));
        }

        self.try_parse_binary_operator()
    }

    /// Precedence climbing with an explicit operand/operator stack.
    /// Newlines are consumed only when another operand is expected, so
    /// line continuation works after an operator but not before one.
    fn try_parse_binary_operator(&mut self) -> Result<Option<NodeId>> {
        let mut operands: Vec<NodeId> = Vec::new();
        let mut operators: Vec<Token> = Vec::new();

        loop {
            if !operators.is_empty() {
                self.skip_newlines()?;
            }

            if operands.len() >= MAX_OPERATOR_DEPTH {
                let tok = self.peek(0)?;
                return Err(CompileError::new("expression nests too deeply", tok.loc));
            }

            match self.try_parse_primary()? {
                Some(expr) => operands.push(expr),
                None => {
                    if let Some(op) = operators.last() {
                        return Err(CompileError::new("operator has no right side", op.loc));
                    }
                    break;
                }
            }

            loop {
                let tok = self.peek(0)?;
                let current_level = match operators.last() {
                    Some(op) => match op.kind {
                        TokenKind::Operator { level, .. } => level,
                        _ => unreachable!("operator stack holds operator tokens"),
                    },
                    None => -1,
                };
                match tok.kind {
                    TokenKind::Operator { level, .. } if level > current_level => {
                        self.consume(1)?;
                        operators.push(tok);
                        break;
                    }
                    _ => {
                        // Reduce, or finish when nothing is pending.
                        let Some(op) = operators.pop() else {
                            return Ok(operands.pop());
                        };
                        let right = operands.pop().expect("reduce needs two operands");
                        let left = operands.pop().expect("reduce needs two operands");
                        let TokenKind::Operator { text, .. } = op.kind else { unreachable!() };
                        let node = self.alloc(
                            NodeKind::Operator { op: text, left: Some(left), right },
                            op.loc,
                        );
                        operands.push(node);
                    }
                }
            }
        }

        debug_assert!(operands.len() <= 1);
        Ok(operands.pop())
    }

    fn parse_primary(&mut self) -> Result<NodeId> {
        let tok = self.peek(0)?;
        match self.try_parse_primary()? {
            Some(expr) => Ok(expr),
            None => Err(CompileError::new("expected non-operator expression", tok.loc)),
        }
    }

    /// Any number of prefix operators, a simple primary, then call /
    /// index / member suffixes. Suffixes bind tighter than the prefixes.
    fn try_parse_primary(&mut self) -> Result<Option<NodeId>> {
        let mut prefixes: Vec<Token> = Vec::new();
        loop {
            let tok = self.peek(0)?;
            if matches!(tok.kind, TokenKind::Operator { .. }) {
                self.consume(1)?;
                prefixes.push(tok);
            } else {
                break;
            }
        }

        let mut inner = match self.try_parse_simple_primary()? {
            Some(expr) => expr,
            None => {
                if let Some(op) = prefixes.last() {
                    return Err(CompileError::new("operator has no right side", op.loc));
                }
                return Ok(None);
            }
        };

        loop {
            if let Some(tok) = self.try_simple(TokenKind::OpenParen)? {
                let mut args = Vec::new();
                self.skip_newlines()?;
                if self.peek(0)?.kind != TokenKind::CloseParen {
                    loop {
                        args.push(self.parse_expression()?);
                        self.skip_newlines()?;
                        if self.try_simple(TokenKind::Comma)?.is_none() {
                            break;
                        }
                        self.skip_newlines()?;
                    }
                }
                self.expect_simple(TokenKind::CloseParen)?;
                inner = self.alloc(NodeKind::Call { callee: inner, args }, tok.loc);
            } else if let Some(tok) = self.try_simple(TokenKind::OpenBracket)? {
                let index = self.parse_expression()?;
                self.expect_simple(TokenKind::CloseBracket)?;
                inner = self.alloc(NodeKind::ArrayIndex { base: inner, index }, tok.loc);
            } else if let Some(tok) = self.try_operator(".")? {
                let (name, name_loc) = self.expect_identifier()?;
                let member = self.alloc(NodeKind::Identifier { name }, name_loc);
                let dot = self.ws.interner.intern(".");
                inner = self.alloc(
                    NodeKind::Operator { op: dot, left: Some(inner), right: member },
                    tok.loc,
                );
            } else {
                break;
            }
        }

        for op in prefixes.into_iter().rev() {
            let TokenKind::Operator { text, .. } = op.kind else { unreachable!() };
            inner = self.alloc(NodeKind::Operator { op: text, left: None, right: inner }, op.loc);
        }

        Ok(Some(inner))
    }

    fn try_parse_simple_primary(&mut self) -> Result<Option<NodeId>> {
        if self.try_simple(TokenKind::OpenParen)?.is_some() {
            let expr = self.parse_expression()?;
            self.expect_simple(TokenKind::CloseParen)?;
            return Ok(Some(expr));
        }
        if let Some(tok) = self.try_keyword(Keyword::Null)? {
            return Ok(Some(self.alloc(NodeKind::Null, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Cast)? {
            self.expect_simple(TokenKind::OpenParen)?;
            let ty = self.parse_type()?;
            self.expect_simple(TokenKind::CloseParen)?;
            let expr = self.parse_primary()?;
            return Ok(Some(self.alloc(
                NodeKind::Cast { is_auto: false, ty: Some(ty), expr },
                tok.loc,
            )));
        }
        if let Some(tok) = self.try_keyword(Keyword::AutoCast)? {
            let expr = self.parse_primary()?;
            return Ok(Some(self.alloc(NodeKind::Cast { is_auto: true, ty: None, expr }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::New)? {
            let ty = self.parse_type()?;
            return Ok(Some(self.alloc(NodeKind::New { ty }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Delete)? {
            let expr = self.parse_primary()?;
            return Ok(Some(self.alloc(NodeKind::Delete { expr }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Remove)? {
            let expr = self.parse_primary()?;
            return Ok(Some(self.alloc(NodeKind::Remove { expr }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::CharDirective)? {
            let (text, _) = self.expect_string_literal()?;
            let byte = self.ws.interner.resolve(text).bytes().next().unwrap_or(0);
            return Ok(Some(self.alloc(NodeKind::Literal(Lit::Int(byte as i64)), tok.loc)));
        }

        // Atoms.
        let tok = self.peek(0)?;
        match tok.kind {
            TokenKind::Identifier(name) => {
                self.consume(1)?;
                Ok(Some(self.alloc(NodeKind::Identifier { name }, tok.loc)))
            }
            TokenKind::Literal(lit) => {
                self.consume(1)?;
                Ok(Some(self.alloc(NodeKind::Literal(lit), tok.loc)))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Types

    fn parse_type(&mut self) -> Result<NodeId> {
        if let Some(tok) = self.try_operator("..")? {
            return Ok(self.alloc(NodeKind::TypeVararg, tok.loc));
        }
        if self.try_operator("$")?.is_some() {
            let (name, loc) = self.expect_identifier()?;
            return Ok(self.alloc(NodeKind::TypePolymorphic { name }, loc));
        }
        if let Some(tok) = self.try_operator("*")? {
            let soa = self.try_consume_soa_marker()?;
            let inner = self.parse_type()?;
            return Ok(self.alloc(NodeKind::TypePointer { soa, inner }, tok.loc));
        }
        if let Some(tok) = self.try_simple(TokenKind::OpenBracket)? {
            let mut dynamic = false;
            let mut size = None;
            if self.peek(0)?.kind != TokenKind::CloseBracket {
                if self.try_operator("..")?.is_some() {
                    dynamic = true;
                } else {
                    size = Some(self.parse_expression()?);
                }
            }
            self.expect_simple(TokenKind::CloseBracket)?;
            let soa = self.try_consume_soa_marker()?;
            let inner = self.parse_type()?;
            return Ok(self.alloc(NodeKind::TypeArray { soa, dynamic, size, inner }, tok.loc));
        }
        if let Some(tok) = self.try_simple(TokenKind::OpenParen)? {
            let mut args = Vec::new();
            loop {
                args.push(self.parse_decl_optional_name()?);
                if self.try_simple(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
            self.expect_simple(TokenKind::CloseParen)?;
            let mut rets = Vec::new();
            if self.try_operator("->")?.is_some() {
                self.parse_return_values(&mut rets)?;
            }
            return Ok(self.alloc(NodeKind::TypeProcedure { args, rets }, tok.loc));
        }

        let tok = self.peek(0)?;
        if let TokenKind::Identifier(name) = tok.kind {
            self.consume(1)?;
            // `a.b.c` becomes (. (. a b) c) so member constants name types.
            let mut ty = self.alloc(NodeKind::Identifier { name }, tok.loc);
            while let Some(dot_tok) = self.try_operator(".")? {
                let (name, name_loc) = self.expect_identifier()?;
                let right = self.alloc(NodeKind::Identifier { name }, name_loc);
                let dot = self.ws.interner.intern(".");
                ty = self.alloc(NodeKind::Operator { op: dot, left: Some(ty), right }, dot_tok.loc);
            }
            return Ok(ty);
        }

        Err(CompileError::new("unexpected token for type declaration", tok.loc))
    }

    fn try_consume_soa_marker(&mut self) -> Result<bool> {
        let tok = self.peek(0)?;
        if let TokenKind::Identifier(name) = tok.kind {
            if self.ws.interner.resolve(name) == "SOA" {
                self.consume(1)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Return values are type-only declarations; `void` means none.
    fn parse_return_values(&mut self, rets: &mut Vec<NodeId>) -> Result<()> {
        let tok = self.peek(0)?;
        if let TokenKind::Identifier(name) = tok.kind {
            if self.ws.interner.resolve(name) == "void" {
                self.consume(1)?;
                return Ok(());
            }
        }

        loop {
            let decl = self.parse_decl_optional_name()?;
            if let NodeKind::Declare(data) = &self.ws.ast[decl].kind {
                if data.name.is_some() {
                    return Err(CompileError::new(
                        "return values should be type only",
                        self.ws.ast[decl].loc,
                    ));
                }
            }
            rets.push(decl);
            if self.try_simple(TokenKind::Comma)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations

    /// `[using] name : T [= v]` / `name : T : v` / `name := v` / `name :: v`.
    fn parse_decl_simple(&mut self) -> Result<NodeId> {
        let mut using = false;
        let mut tok = self.peek(0)?;
        if tok.kind == TokenKind::Keyword(Keyword::Using) {
            self.consume(1)?;
            using = true;
            tok = self.peek(0)?;
        }

        let TokenKind::Identifier(name) = tok.kind else {
            return Err(CompileError::new(
                "expected identifier at beginning of definition",
                tok.loc,
            ));
        };
        let define = self.peek(1)?;
        let TokenKind::Operator { text: define_op, .. } = define.kind else {
            return Err(CompileError::new(
                "expected : definition of some sort following identifier",
                tok.loc,
            ));
        };
        self.consume(2)?;

        let mut data = DeclareData { name: Some(name), ty: None, value: None, constant: false, using };

        match self.op_text(define_op).to_string().as_str() {
            ":" => {
                data.ty = Some(self.parse_type()?);
                if self.try_operator("=")?.is_some() {
                    data.value = Some(self.parse_expression()?);
                } else if self.try_operator(":")?.is_some() {
                    data.constant = true;
                    data.value = Some(self.parse_expression()?);
                }
            }
            spelled @ (":=" | "::") => {
                data.constant = spelled == "::";
                if data.constant && self.try_keyword(Keyword::TypeDirective)?.is_some() {
                    data.value = Some(self.parse_type()?);
                } else {
                    data.value = Some(self.parse_expression()?);
                }
            }
            _ => return Err(CompileError::new("unknown define operator", define.loc)),
        }

        Ok(self.alloc(NodeKind::Declare(data), tok.loc))
    }

    /// Argument/return position: `name : T` or a bare type.
    fn parse_decl_optional_name(&mut self) -> Result<NodeId> {
        let ident = self.peek(0)?;
        let define = self.peek(1)?;
        let is_named = matches!(ident.kind, TokenKind::Identifier(_))
            && matches!(define.kind, TokenKind::Operator { .. });
        if !is_named {
            let ty = self.parse_type()?;
            let data = DeclareData { name: None, ty: Some(ty), value: None, constant: false, using: false };
            return Ok(self.alloc(NodeKind::Declare(data), ident.loc));
        }
        self.parse_decl_simple()
    }

    /// `a, b := v`, `a, b : T [= v]`, `a, b :: v`, or `a, b = v`.
    fn parse_multi_declaration_or_assign(&mut self) -> Result<NodeId> {
        let mut names = Vec::new();
        loop {
            let (name, loc) = self.expect_identifier()?;
            names.push((name, loc));
            if self.try_simple(TokenKind::Comma)?.is_none() {
                break;
            }
        }

        for spelled in [":", "::", ":="] {
            if let Some(tok) = self.try_operator(spelled)? {
                let mut ty = None;
                if spelled == ":" {
                    ty = Some(self.parse_type()?);
                }
                let constant = spelled == "::";
                let value = if ty.is_none() || self.try_operator("=")?.is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                return Ok(self.alloc(NodeKind::DeclareMulti { names, ty, value, constant }, tok.loc));
            }
        }

        if let Some(tok) = self.try_operator("=")? {
            let value = self.parse_expression()?;
            let names = names.into_iter().map(|(name, _)| name).collect();
            return Ok(self.alloc(NodeKind::AssignMulti { names, value }, tok.loc));
        }

        let tok = self.peek(0)?;
        Err(CompileError::new(
            "expected :: or := to declare or assign multiple values",
            tok.loc,
        ))
    }

    fn try_parse_declaration(&mut self) -> Result<Option<NodeId>> {
        let mut at = 0;
        let mut ident = self.peek(0)?;
        if ident.kind == TokenKind::Keyword(Keyword::Using) {
            at = 1;
            ident = self.peek(1)?;
        }

        if !matches!(ident.kind, TokenKind::Identifier(_)) {
            return Ok(None);
        }

        let define = self.peek(at + 1)?;
        if define.kind == TokenKind::Comma {
            return Ok(Some(self.parse_multi_declaration_or_assign()?));
        }
        if let TokenKind::Operator { text, .. } = define.kind {
            if self.op_text(text).starts_with(':') {
                return Ok(Some(self.parse_decl_simple()?));
            }
        }
        Ok(None)
    }

    /// `Name :: struct {…}`, `Name :: enum […] {…}`, or
    /// `Name :: [inline] (args) [-> rets] ({body} | #foreign ["lib"])`.
    fn try_parse_struct_proc_enum(&mut self) -> Result<Option<NodeId>> {
        let ident = self.peek(0)?;
        let define = self.peek(1)?;
        let TokenKind::Identifier(name) = ident.kind else { return Ok(None) };
        if !matches!(define.kind, TokenKind::Operator { .. }) || !self.token_is_op(&define, "::") {
            return Ok(None);
        }

        // Look past newlines for the defining token.
        let mut at = 2;
        while self.peek(at)?.kind == TokenKind::NewLine {
            at += 1;
        }
        let value_tok = self.peek(at)?;

        let is_inline = value_tok.kind == TokenKind::Keyword(Keyword::Inline);
        let is_proc = value_tok.kind == TokenKind::OpenParen
            || (is_inline && self.peek(at + 1)?.kind == TokenKind::OpenParen);

        if is_proc {
            self.consume(at + 1)?;
            if is_inline {
                self.expect_simple(TokenKind::OpenParen)?;
            }
            return Ok(Some(self.parse_procedure_declaration(name, ident.loc, is_inline)?));
        }

        match value_tok.kind {
            TokenKind::Keyword(Keyword::Struct) => {
                self.consume(at + 1)?;
                Ok(Some(self.parse_struct_declaration(name, ident.loc)?))
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.consume(at + 1)?;
                Ok(Some(self.parse_enum_declaration(name, ident.loc)?))
            }
            _ => Ok(None),
        }
    }

    /// Called with everything up to and including the `(` consumed.
    fn parse_procedure_declaration(&mut self, name: Symbol, loc: Loc, is_inline: bool) -> Result<NodeId> {
        let mut proc = ProcData {
            name,
            args: Vec::new(),
            rets: Vec::new(),
            is_inline,
            is_foreign: false,
            is_polymorphic: false,
            module: self.module,
            foreign_name: None,
            body: None,
        };

        if self.peek(0)?.kind != TokenKind::CloseParen {
            loop {
                proc.args.push(self.parse_decl_optional_name()?);
                if self.try_simple(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }
        self.expect_simple(TokenKind::CloseParen)?;

        if self.try_operator("->")?.is_some() {
            let mut rets = Vec::new();
            self.parse_return_values(&mut rets)?;
            proc.rets = rets;
        }

        for &arg in &proc.args {
            let ty = match &self.ws.ast[arg].kind {
                NodeKind::Declare(data) => data.ty,
                _ => None,
            };
            if let Some(ty) = ty {
                if self.ws.has_polymorphic_type(ty) {
                    proc.is_polymorphic = true;
                    break;
                }
            }
        }

        if self.try_keyword(Keyword::ForeignDirective)?.is_some() {
            proc.is_foreign = true;
            let tok = self.peek(0)?;
            if let TokenKind::Literal(Lit::Str(foreign_name)) = tok.kind {
                self.consume(1)?;
                proc.foreign_name = Some(foreign_name);
            }

            let tok = self.peek(0)?;
            if tok.kind == TokenKind::Semicolon || tok.kind == TokenKind::NewLine {
                self.consume(1)?;
            } else {
                return Err(CompileError::new(
                    format!("expected newline or ; after #foreign, found {}", tok.kind.name()),
                    tok.loc,
                ));
            }
        } else {
            proc.body = Some(self.parse_block()?);
            for &arg in &proc.args {
                if let NodeKind::Declare(data) = &self.ws.ast[arg].kind {
                    if data.name.is_none() {
                        return Err(CompileError::new(
                            "no name given to procedure argument",
                            self.ws.ast[arg].loc,
                        ));
                    }
                }
            }
        }

        let value = self.alloc(NodeKind::Procedure(Box::new(proc)), loc);
        let data = DeclareData { name: Some(name), ty: None, value: Some(value), constant: true, using: false };
        Ok(self.alloc(NodeKind::Declare(data), loc))
    }

    fn parse_struct_declaration(&mut self, name: Symbol, loc: Loc) -> Result<NodeId> {
        self.expect_simple(TokenKind::OpenBrace)?;
        self.skip_newlines()?;

        let mut decls = Vec::new();
        while self.try_simple(TokenKind::CloseBrace)?.is_none() {
            let decl = match self.try_parse_struct_proc_enum()? {
                Some(decl) => decl,
                None => match self.try_parse_declaration()? {
                    Some(decl) => {
                        self.try_terminator()?;
                        decl
                    }
                    None => {
                        let tok = self.peek(0)?;
                        return Err(CompileError::new("expected declaration", tok.loc));
                    }
                },
            };
            decls.push(decl);
            self.skip_newlines()?;
        }

        let value = self.alloc(NodeKind::Struct { name, decls }, loc);
        let data = DeclareData { name: Some(name), ty: None, value: Some(value), constant: true, using: false };
        Ok(self.alloc(NodeKind::Declare(data), loc))
    }

    fn parse_enum_declaration(&mut self, name: Symbol, loc: Loc) -> Result<NodeId> {
        let _ = self.try_simple(TokenKind::NewLine)?;

        let mut backing = None;
        if self.peek(0)?.kind != TokenKind::OpenBrace {
            backing = Some(self.parse_type()?);
        }
        self.expect_simple(TokenKind::OpenBrace)?;

        let mut decls = Vec::new();
        let mut row = 0i64;
        while self.peek(0)?.kind != TokenKind::CloseBrace {
            self.skip_newlines()?;
            if self.peek(0)?.kind == TokenKind::CloseBrace {
                break;
            }

            // Row syntax: ident(, ident)* (= expr(, expr)*)? terminator
            let mut idents = Vec::new();
            idents.push(self.expect_identifier()?);
            while self.try_simple(TokenKind::Comma)?.is_some() {
                idents.push(self.expect_identifier()?);
            }

            let mut values = Vec::new();
            if self.try_operator("=")?.is_some() {
                for i in 0..idents.len() {
                    if i != 0 {
                        self.expect_simple(TokenKind::Comma)?;
                    }
                    values.push(self.parse_expression()?);
                }
            }

            for (i, (ident, ident_loc)) in idents.iter().enumerate() {
                if self.ws.interner.resolve(*ident) == "_" {
                    continue;
                }
                let value = if values.is_empty() {
                    self.alloc(NodeKind::Literal(Lit::Int(row)), *ident_loc)
                } else {
                    self.dup_for_enum_value(values[i], Some(row))?
                };
                let data = DeclareData {
                    name: Some(*ident),
                    ty: None,
                    value: Some(value),
                    constant: true,
                    using: false,
                };
                decls.push(self.alloc(NodeKind::Declare(data), *ident_loc));
            }

            self.try_terminator()?;
            row += 1;
        }
        self.expect_simple(TokenKind::CloseBrace)?;

        let value = self.alloc(NodeKind::Enum { name, backing, decls }, loc);
        let data = DeclareData { name: Some(name), ty: None, value: Some(value), constant: true, using: false };
        Ok(self.alloc(NodeKind::Declare(data), loc))
    }

    /// Clones an enum-value expression, substituting `iota` with the row
    /// index. No substitution happens to the right of a `.` so member
    /// references to other enums stay intact.
    fn dup_for_enum_value(&mut self, node: NodeId, row: Option<i64>) -> Result<NodeId> {
        let loc = self.ws.ast[node].loc;
        match self.ws.ast[node].kind.clone() {
            NodeKind::Literal(lit) => Ok(self.alloc(NodeKind::Literal(lit), loc)),
            NodeKind::Identifier { name } => {
                if let Some(row) = row {
                    if self.ws.interner.resolve(name) == "iota" {
                        return Ok(self.alloc(NodeKind::Literal(Lit::Int(row)), loc));
                    }
                }
                Ok(self.alloc(NodeKind::Identifier { name }, loc))
            }
            NodeKind::Operator { op, left, right } => {
                let child_row = if self.op_text(op) == "." { None } else { row };
                let left = match left {
                    Some(left) => Some(self.dup_for_enum_value(left, child_row)?),
                    None => None,
                };
                let right = self.dup_for_enum_value(right, child_row)?;
                Ok(self.alloc(NodeKind::Operator { op, left, right }, loc))
            }
            _ => Err(CompileError::new("enum values only support operators and literals", loc)),
        }
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_statement(&mut self) -> Result<NodeId> {
        self.skip_newlines()?;
        let tok = self.peek(0)?;
        match self.try_parse_statement()? {
            Some(stmt) => Ok(stmt),
            None => Err(CompileError::new("expected statement", tok.loc)),
        }
    }

    fn try_parse_statement(&mut self) -> Result<Option<NodeId>> {
        let tok = self.peek(0)?;
        if tok.kind == TokenKind::OpenBrace {
            return Ok(Some(self.parse_block()?));
        }

        if let Some(tok) = self.try_keyword(Keyword::If)? {
            let cond = self.parse_expression()?;
            let _ = self.try_keyword(Keyword::Then)?;
            let pass = self.parse_statement()?;
            self.skip_newlines()?;
            let else_ = if self.try_keyword(Keyword::Else)?.is_some() {
                Some(self.parse_statement()?)
            } else {
                None
            };
            return Ok(Some(self.alloc(NodeKind::If { cond, pass, else_ }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::While)? {
            let cond = self.parse_expression()?;
            let body = self.parse_statement()?;
            return Ok(Some(self.alloc(NodeKind::While { cond, body }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::For)? {
            let ident = self.peek(0)?;
            let colon = self.peek(1)?;
            let mut iter = None;
            if let TokenKind::Identifier(name) = ident.kind {
                if self.token_is_op(&colon, ":") {
                    self.consume(2)?;
                    iter = Some(self.alloc(NodeKind::Identifier { name }, ident.loc));
                }
            }
            let range = self.parse_expression()?;
            let body = self.parse_statement()?;
            return Ok(Some(self.alloc(
                NodeKind::For { takes_pointer: false, iter, range, body },
                tok.loc,
            )));
        }
        if let Some(tok) = self.try_keyword(Keyword::Return)? {
            let mut values = Vec::new();
            if let Some(first) = self.try_parse_expression()? {
                values.push(first);
                while self.try_simple(TokenKind::Comma)?.is_some() {
                    values.push(self.parse_expression()?);
                }
            }
            self.try_terminator()?;
            return Ok(Some(self.alloc(NodeKind::Return { values }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::Defer)? {
            let stmt = self.parse_statement()?;
            return Ok(Some(self.alloc(NodeKind::Defer { stmt }, tok.loc)));
        }
        if let Some(tok) = self.try_keyword(Keyword::PushContext)? {
            let (context, _) = self.expect_identifier()?;
            let body = self.parse_block()?;
            return Ok(Some(self.alloc(NodeKind::PushContext { context, body }, tok.loc)));
        }

        if let Some(decl) = self.try_parse_struct_proc_enum()? {
            return Ok(Some(decl));
        }

        let mut stmt = self.try_parse_declaration()?;

        if stmt.is_none() {
            if let Some(tok) = self.try_keyword(Keyword::Using)? {
                let expr = self.parse_expression()?;
                stmt = Some(self.alloc(NodeKind::Using { expr }, tok.loc));
            }
        }

        if stmt.is_none() {
            stmt = self.try_parse_expression()?;
        }

        if let Some(stmt) = stmt {
            self.try_terminator()?;
            return Ok(Some(stmt));
        }

        let tok = self.peek(0)?;
        if tok.kind == TokenKind::Semicolon || tok.kind == TokenKind::NewLine {
            self.consume(1)?;
            return Ok(Some(self.alloc(NodeKind::Empty, tok.loc)));
        }

        Ok(None)
    }

    fn parse_block(&mut self) -> Result<NodeId> {
        self.skip_newlines()?;
        let open = self.expect_simple(TokenKind::OpenBrace)?;

        let mut stmts = Vec::new();
        loop {
            self.skip_newlines()?;
            if self.peek(0)?.kind == TokenKind::CloseBrace {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect_simple(TokenKind::CloseBrace)?;
        Ok(self.alloc(NodeKind::Block { stmts }, open.loc))
    }

    /// File scope: `#import` / `#foreign_library` directives plus
    /// statements until end of file.
    pub fn parse_root_block(&mut self) -> Result<NodeId> {
        let first = self.peek(0)?;
        let mut stmts = Vec::new();

        loop {
            if self.try_keyword(Keyword::ImportDirective)?.is_some() {
                let (path, loc) = self.expect_string_literal()?;
                self.try_terminator()?;
                stmts.push(self.alloc(NodeKind::Import { path }, loc));
                continue;
            }
            if self.try_keyword(Keyword::ForeignLibraryDirective)?.is_some() {
                let (path, loc) = self.expect_string_literal()?;
                stmts.push(self.alloc(NodeKind::ForeignLibrary { path }, loc));
                continue;
            }
            if self.peek(0)?.kind == TokenKind::EndOfFile {
                break;
            }

            match self.try_parse_statement()? {
                Some(stmt) => stmts.push(stmt),
                None => break,
            }
        }

        let tok = self.peek(0)?;
        if tok.kind != TokenKind::EndOfFile {
            return Err(CompileError::new(
                format!("unexpected token {}", tok.kind.name()),
                tok.loc,
            ));
        }
        self.consume(1)?;

        Ok(self.alloc(NodeKind::Block { stmts }, first.loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::dump_node;

    fn parse(source: &str) -> (Workspace, NodeId) {
        let mut ws = Workspace::new();
        let module = ws.add_module_source("test.jai", source);
        let root = Parser::new(&mut ws, module, source).parse_root_block().unwrap();
        (ws, root)
    }

    fn parse_err(source: &str) -> CompileError {
        let mut ws = Workspace::new();
        let module = ws.add_module_source("test.jai", source);
        Parser::new(&mut ws, module, source)
            .parse_root_block()
            .unwrap_err()
    }

    fn dump(source: &str) -> String {
        let (ws, root) = parse(source);
        dump_node(&ws, root, false)
    }

    #[test]
    fn precedence_orders_mul_before_add() {
        assert_eq!(dump("a := 1 + 2 * 3;"), "(Block (DeclareSingle var a infer-type (+ 0x1 (* 0x2 0x3))))");
    }

    #[test]
    fn equal_levels_reduce_left_to_right() {
        assert_eq!(dump("a := 1 - 2 - 3;"), "(Block (DeclareSingle var a infer-type (- (- 0x1 0x2) 0x3)))");
    }

    #[test]
    fn logical_and_binds_looser_than_compare() {
        assert_eq!(
            dump("a := 5 != 10 && true;"),
            "(Block (DeclareSingle var a infer-type (and (!= 0x5 0xa) true)))"
        );
    }

    #[test]
    fn member_chain_nests_left() {
        assert_eq!(dump("v := a.b.c;"), "(Block (DeclareSingle var v infer-type (. (. 'a 'b) 'c)))");
    }

    #[test]
    fn call_and_index_suffixes() {
        assert_eq!(
            dump("v := f(x)[3];"),
            "(Block (DeclareSingle var v infer-type (ArrayIndex (Call 'f 'x) 0x3)))"
        );
    }

    #[test]
    fn prefix_operators_wrap_suffixed_primary() {
        assert_eq!(dump("v := -a[0];"), "(Block (DeclareSingle var v infer-type (- (ArrayIndex 'a 0x0))))");
    }

    #[test]
    fn constant_and_typed_declarations() {
        assert_eq!(dump("a : int = 5;"), "(Block (DeclareSingle var a 'int 0x5))");
        assert_eq!(dump("a : int : 5;"), "(Block (DeclareSingle const a 'int 0x5))");
        assert_eq!(dump("a :: 5;"), "(Block (DeclareSingle const a infer-type 0x5))");
    }

    #[test]
    fn procedure_declaration_shapes() {
        assert_eq!(
            dump("a :: (b : int) { }"),
            "(Block (DeclareSingle const a infer-type (Procedure (args (DeclareSingle var b 'int)) (Block))))"
        );
    }

    #[test]
    fn foreign_procedure_with_varargs() {
        assert_eq!(
            dump("printf :: (format : * char, ..) -> int #foreign;"),
            "(Block (DeclareSingle const printf infer-type (Procedure (#foreign) \
             (args (DeclareSingle var format (TypePointer 'char)) (DeclareSingle var <no-name> ..)) \
             (returns 'int))))"
        );
    }

    #[test]
    fn struct_with_member_constants() {
        assert_eq!(
            dump("S :: struct { a :: \"6.0\"; b : int; }"),
            "(Block (DeclareSingle const S infer-type (Struct S \
             (DeclareSingle const a infer-type \"6.0\") (DeclareSingle var b 'int))))"
        );
    }

    #[test]
    fn enum_rows_without_values_count_up() {
        assert_eq!(
            dump("E :: enum { A; B; C; }"),
            "(Block (DeclareSingle const E infer-type (Enum E \
             (DeclareSingle const A infer-type 0x0) \
             (DeclareSingle const B infer-type 0x1) \
             (DeclareSingle const C infer-type 0x2))))"
        );
    }

    #[test]
    fn enum_iota_substitutes_row_index() {
        assert_eq!(
            dump("E :: enum { A = 1 + iota; B = 1 + iota; }"),
            "(Block (DeclareSingle const E infer-type (Enum E \
             (DeclareSingle const A infer-type (+ 0x1 0x0)) \
             (DeclareSingle const B infer-type (+ 0x1 0x1)))))"
        );
    }

    #[test]
    fn if_then_else_and_loops() {
        assert_eq!(
            dump("f :: () { if a then b; else c; while d e; }"),
            "(Block (DeclareSingle const f infer-type (Procedure (Block \
             (If 'a 'b 'c) (While 'd 'e)))))"
        );
    }

    #[test]
    fn defer_and_loop_control() {
        assert_eq!(
            dump("f :: () { while x { defer g(); break; } }"),
            "(Block (DeclareSingle const f infer-type (Procedure (Block \
             (While 'x (Block (Defer (Call 'g)) (break)))))))"
        );
    }

    #[test]
    fn pointer_array_and_proc_types() {
        assert_eq!(
            dump("v : [4] * int;"),
            "(Block (DeclareSingle var v (TypeArray (size 0x4) (TypePointer 'int))))"
        );
        assert_eq!(dump("v : [..] u8;"), "(Block (DeclareSingle var v (TypeArray dynamic 'u8)))");
        assert_eq!(
            dump("v : (int) -> int;"),
            "(Block (DeclareSingle var v (TypeProcedure (args (DeclareSingle var <no-name> 'int)) (returns 'int))))"
        );
    }

    #[test]
    fn cast_and_autocast() {
        assert_eq!(
            dump("v := cast(float) x;"),
            "(Block (DeclareSingle var v infer-type (Cast 'float 'x)))"
        );
        assert_eq!(dump("v := xx x;"), "(Block (DeclareSingle var v infer-type (Cast auto 'x)))");
    }

    #[test]
    fn char_directive_yields_int_literal() {
        assert_eq!(dump("c := #char \"A\";"), "(Block (DeclareSingle var c infer-type 0x41))");
    }

    #[test]
    fn run_directive_wraps_expression() {
        assert_eq!(
            dump("v :: #run 1 + 2;"),
            "(Block (DeclareSingle const v infer-type (RunDirective (+ 0x1 0x2))))"
        );
    }

    #[test]
    fn imports_are_collected_at_file_scope() {
        assert_eq!(dump("#import \"basic\"\na := 5;"), "(Block (ImportDirective \"basic\") (DeclareSingle var a infer-type 0x5))");
    }

    #[test]
    fn line_continuation_after_operator() {
        assert_eq!(dump("a := 1 +\n2;"), "(Block (DeclareSingle var a infer-type (+ 0x1 0x2)))");
    }

    #[test]
    fn multi_declaration_and_assignment() {
        assert_eq!(
            dump("a, b := f();"),
            "(Block (DeclareMulti (names a b) infer-type (Call 'f)))"
        );
        assert_eq!(dump("f :: () { a, b = g(); }"),
            "(Block (DeclareSingle const f infer-type (Procedure (Block (AssignMulti (names a b) (Call 'g))))))");
    }

    #[test]
    fn polymorphic_arguments_flag_the_procedure() {
        let (ws, root) = parse("id :: (x : $T) -> int { return 0; }");
        let NodeKind::Block { stmts } = &ws.ast[root].kind else { panic!() };
        let NodeKind::Declare(data) = &ws.ast[stmts[0]].kind else { panic!() };
        let NodeKind::Procedure(proc) = &ws.ast[data.value.unwrap()].kind else { panic!() };
        assert!(proc.is_polymorphic);
    }

    #[test]
    fn named_return_values_are_rejected() {
        let err = parse_err("f :: () -> r : int { }");
        assert!(err.message.contains("type only"));
    }

    #[test]
    fn dangling_operator_is_an_error() {
        let err = parse_err("a := 1 + ;");
        assert!(err.message.contains("operator has no right side"));
    }

    #[test]
    fn unknown_define_operator_is_an_error() {
        let err = parse_err("f :: () { a :- 5; }");
        assert!(err.message.contains("unknown define operator") || err.message.contains("operator"));
    }

    #[test]
    fn uninitialized_value_marker() {
        assert_eq!(dump("a : int = ---;"), "(Block (DeclareSingle var a 'int ---))");
    }
}
