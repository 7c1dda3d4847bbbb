//! AST traverser
//!
//! A one-pass symbolic interpreter over a parsed script. Every expression
//! yields a [`Wrapped`] value, declarations and assignments update the
//! [`ScopeStack`], and reads that reach the knowledge base are checked for
//! dangerous or read-only globals. Nothing is executed.
//!
//! Nesting depth is bounded. Exceeding the bound aborts the current file
//! with [`AnalysisError::NestingTooDeep`].

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use swc_common::{DUMMY_SP, Span, Spanned};
use swc_ecma_ast::{
    ArrayLit, ArrayPat, ArrowExpr, AssignExpr, AssignOp, AssignTarget, AssignTargetPat, BinExpr,
    BinaryOp, BlockStmtOrExpr, Class, ClassMember, CondExpr, Decl, Expr, ForHead, Function, Ident,
    Lit, MemberExpr, MemberProp, ObjectLit, ObjectPat, ObjectPatProp, OptChainBase, OptChainExpr,
    ParamOrTsParamProp, Pat, Prop, PropName, PropOrSpread, SimpleAssignTarget, Stmt, SuperProp, Tpl,
    UnaryExpr, UnaryOp, UpdateExpr, UpdateOp, VarDecl, VarDeclKind, VarDeclOrExpr,
};

use super::AnalysisError;
use super::dispatch::Environment;
use super::entities::{Danger, Entity, EntityValue, KnowledgeBase, Readonly, XpcomMap};
use super::operators;
use super::scope::{BindingKind, FrameKind, ScopeStack};
use super::value::{
    Context, GlobalRef, GlobalTarget, Heap, Instance, JsObject, Literal, MAX_STRING_LEN, ValueKind,
    Wrapped,
};
use crate::context::RunContext;
use crate::diagnostic::{Diagnostic, RuleId, Severity};
use crate::parser::ParsedFile;

pub const DEFAULT_MAX_DEPTH: usize = 256;

pub const DANGEROUS_GLOBAL: RuleId = RuleId::new("javascript", "dangerous_global");
pub const GLOBAL_OVERWRITE: RuleId = RuleId::new("javascript", "global_overwrite");
pub const BANNED_IDENTIFIER: RuleId = RuleId::new("javascript", "banned_identifier");

const MAX_ALIAS_HOPS: usize = 16;
/// Writes past the end of an array grow it by at most this many holes.
const MAX_ARRAY_GROWTH: usize = 1024;

#[derive(Debug, Clone, Copy)]
enum PatternMode {
    Declare(BindingKind),
    Assign,
}

/// Target of a write.
enum Place<'a> {
    Identifier(&'a str),
    Member { object: Wrapped, key: Option<String> },
    Nowhere,
}

pub struct Traverser<'a> {
    kb: &'static KnowledgeBase,
    file: &'a ParsedFile,
    run: &'a RunContext,
    heap: Heap,
    scopes: ScopeStack,
    /// Writes to members of shared knowledge base nodes, keyed by node.
    overlay: HashMap<(usize, String), Wrapped>,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
    max_depth: usize,
    span: Span,
    muted: usize,
}

impl<'a> Traverser<'a> {
    pub fn new(file: &'a ParsedFile, run: &'a RunContext) -> Self {
        Self {
            kb: KnowledgeBase::global(),
            file,
            run,
            heap: Heap::new(),
            scopes: ScopeStack::new(),
            overlay: HashMap::new(),
            diagnostics: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            span: DUMMY_SP,
            muted: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Traverses the whole script and returns its diagnostics.
    pub fn run(mut self) -> Result<Vec<Diagnostic>, AnalysisError> {
        self.traverse()?;
        Ok(self.diagnostics)
    }

    pub fn traverse(&mut self) -> Result<(), AnalysisError> {
        let file = self.file;
        let script = file.script().ok_or_else(|| AnalysisError::Unparsed {
            filename: file.filename().to_string(),
        })?;

        tracing::trace!(
            file = file.filename(),
            statements = script.body.len(),
            "traversing script"
        );
        self.traverse_stmts(&script.body)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Current value of a binding visible from the innermost frame.
    pub fn binding(&self, name: &str) -> Option<&Wrapped> {
        self.scopes.lookup(name).map(|binding| &binding.value)
    }

    pub fn filename(&self) -> &'a str {
        self.file.filename()
    }

    pub fn knowledge_base(&self) -> &'static KnowledgeBase {
        self.kb
    }

    pub fn environment(&self) -> Environment<'a> {
        Environment {
            filename: self.file.filename(),
            run: self.run,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// A diagnostic positioned at the node being traversed.
    pub fn diagnostic(
        &self,
        rule_id: RuleId,
        severity: Severity,
        message: impl Into<String>,
    ) -> Diagnostic {
        let (line, column) = self.file.location(self.span);
        Diagnostic::new(rule_id, severity, message, self.file.filename(), line, column)
            .with_context(self.file.context_snippet(line))
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if self.muted > 0 {
            return;
        }
        tracing::debug!(
            rule = %diagnostic.rule_id,
            line = diagnostic.line,
            "recorded diagnostic"
        );
        self.diagnostics.push(diagnostic);
    }

    pub(super) fn set_span(&mut self, span: Span) {
        if !span.is_dummy() {
            self.span = span;
        }
    }

    fn enter(&mut self, span: Span) -> Result<Span, AnalysisError> {
        let previous = self.span;
        self.set_span(span);
        self.depth += 1;

        if self.depth > self.max_depth {
            let (line, _) = self.file.location(span);
            self.depth -= 1;
            self.span = previous;
            return Err(AnalysisError::NestingTooDeep {
                limit: self.max_depth,
                line,
            });
        }
        Ok(previous)
    }

    fn leave(&mut self, previous: Span) {
        self.depth -= 1;
        self.span = previous;
    }

    fn in_frame<T>(
        &mut self,
        kind: FrameKind,
        body: impl FnOnce(&mut Self) -> Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        self.scopes.push(kind);
        let result = body(self);
        self.scopes.pop();
        result
    }

    // Statements

    fn traverse_stmts(&mut self, stmts: &'a [Stmt]) -> Result<(), AnalysisError> {
        self.hoist_declarations(stmts);
        for stmt in stmts {
            self.traverse_stmt(stmt)?;
        }
        Ok(())
    }

    fn traverse_block(&mut self, stmts: &'a [Stmt]) -> Result<(), AnalysisError> {
        self.in_frame(FrameKind::Block, |this| this.traverse_stmts(stmts))
    }

    fn hoist_declarations(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Decl(Decl::Fn(function)) => self.declare_binding(
                    function.ident.sym.as_str(),
                    BindingKind::Function,
                    Wrapped::function(),
                ),
                // Top-level vars stay unbound until declared so that reads
                // before the declaration still see the global.
                Stmt::Decl(Decl::Var(var))
                    if var.kind == VarDeclKind::Var && !self.scopes.at_top_level() =>
                {
                    for declarator in &var.decls {
                        if let Pat::Ident(binding) = &declarator.name {
                            self.scopes.hoist(binding.id.sym.as_str());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn traverse_stmt(&mut self, stmt: &'a Stmt) -> Result<(), AnalysisError> {
        let previous = self.enter(stmt.span())?;
        let result = self.visit_stmt(stmt);
        self.leave(previous);
        result
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) -> Result<(), AnalysisError> {
        match stmt {
            Stmt::Block(block) => self.traverse_block(&block.stmts),
            Stmt::Empty(_) | Stmt::Debugger(_) | Stmt::Break(_) | Stmt::Continue(_) => Ok(()),
            Stmt::With(with) => {
                self.traverse_expr(&with.obj)?;
                self.traverse_stmt(&with.body)
            }
            Stmt::Return(ret) => {
                if let Some(arg) = &ret.arg {
                    self.traverse_expr(arg)?;
                }
                Ok(())
            }
            Stmt::Labeled(labeled) => self.traverse_stmt(&labeled.body),
            Stmt::If(if_stmt) => {
                self.traverse_expr(&if_stmt.test)?;
                self.traverse_stmt(&if_stmt.cons)?;
                if let Some(alt) = &if_stmt.alt {
                    self.traverse_stmt(alt)?;
                }
                Ok(())
            }
            Stmt::Switch(switch) => {
                self.traverse_expr(&switch.discriminant)?;
                self.in_frame(FrameKind::Block, |this| {
                    for case in &switch.cases {
                        if let Some(test) = &case.test {
                            this.traverse_expr(test)?;
                        }
                        this.traverse_stmts(&case.cons)?;
                    }
                    Ok(())
                })
            }
            Stmt::Throw(throw) => self.traverse_expr(&throw.arg).map(drop),
            Stmt::Try(try_stmt) => {
                self.traverse_block(&try_stmt.block.stmts)?;
                if let Some(handler) = &try_stmt.handler {
                    self.in_frame(FrameKind::Block, |this| {
                        if let Some(param) = &handler.param {
                            this.bind_pattern(
                                param,
                                Wrapped::unknown(),
                                PatternMode::Declare(BindingKind::Let),
                            )?;
                        }
                        this.traverse_stmts(&handler.body.stmts)
                    })?;
                }
                if let Some(finalizer) = &try_stmt.finalizer {
                    self.traverse_block(&finalizer.stmts)?;
                }
                Ok(())
            }
            Stmt::While(while_stmt) => {
                self.traverse_expr(&while_stmt.test)?;
                self.traverse_stmt(&while_stmt.body)
            }
            Stmt::DoWhile(do_while) => {
                self.traverse_stmt(&do_while.body)?;
                self.traverse_expr(&do_while.test).map(drop)
            }
            Stmt::For(for_stmt) => self.in_frame(FrameKind::Block, |this| {
                match &for_stmt.init {
                    Some(VarDeclOrExpr::VarDecl(var)) => this.traverse_var_decl(var)?,
                    Some(VarDeclOrExpr::Expr(expr)) => {
                        this.traverse_expr(expr)?;
                    }
                    None => {}
                }
                if let Some(test) = &for_stmt.test {
                    this.traverse_expr(test)?;
                }
                this.traverse_stmt(&for_stmt.body)?;
                if let Some(update) = &for_stmt.update {
                    this.traverse_expr(update)?;
                }
                Ok(())
            }),
            Stmt::ForIn(for_in) => self.in_frame(FrameKind::Block, |this| {
                this.traverse_expr(&for_in.right)?;
                this.bind_for_head(&for_in.left)?;
                this.traverse_stmt(&for_in.body)
            }),
            Stmt::ForOf(for_of) => self.in_frame(FrameKind::Block, |this| {
                this.traverse_expr(&for_of.right)?;
                this.bind_for_head(&for_of.left)?;
                this.traverse_stmt(&for_of.body)
            }),
            Stmt::Decl(decl) => self.traverse_decl(decl),
            Stmt::Expr(expr) => self.traverse_expr(&expr.expr).map(drop),
        }
    }

    fn traverse_decl(&mut self, decl: &'a Decl) -> Result<(), AnalysisError> {
        match decl {
            Decl::Var(var) => self.traverse_var_decl(var),
            // Already bound by hoisting.
            Decl::Fn(function) => self
                .eval_function(Some(&function.ident), &function.function)
                .map(drop),
            Decl::Class(class) => {
                self.declare_binding(class.ident.sym.as_str(), BindingKind::Let, Wrapped::function());
                self.traverse_class(&class.class)
            }
            Decl::Using(using) => {
                for declarator in &using.decls {
                    let value = match &declarator.init {
                        Some(init) => self.traverse_expr(init)?,
                        None => Wrapped::undefined(),
                    };
                    self.bind_pattern(
                        &declarator.name,
                        value,
                        PatternMode::Declare(BindingKind::Const),
                    )?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn traverse_var_decl(&mut self, var: &'a VarDecl) -> Result<(), AnalysisError> {
        let kind = binding_kind(var.kind);

        for declarator in &var.decls {
            match &declarator.init {
                Some(init) => {
                    let value = self.traverse_expr(init)?;
                    self.bind_pattern(&declarator.name, value, PatternMode::Declare(kind))?;
                }
                None => match (&declarator.name, kind) {
                    (Pat::Ident(binding), BindingKind::Var) => {
                        self.scopes.hoist(binding.id.sym.as_str());
                    }
                    (name, _) => {
                        self.bind_pattern(name, Wrapped::undefined(), PatternMode::Declare(kind))?;
                    }
                },
            }
        }
        Ok(())
    }

    fn bind_for_head(&mut self, head: &'a ForHead) -> Result<(), AnalysisError> {
        match head {
            ForHead::VarDecl(var) => {
                let mode = PatternMode::Declare(binding_kind(var.kind));
                for declarator in &var.decls {
                    self.bind_pattern(&declarator.name, Wrapped::unknown(), mode)?;
                }
                Ok(())
            }
            ForHead::UsingDecl(using) => {
                let mode = PatternMode::Declare(BindingKind::Const);
                for declarator in &using.decls {
                    self.bind_pattern(&declarator.name, Wrapped::unknown(), mode)?;
                }
                Ok(())
            }
            ForHead::Pat(pat) => self.bind_pattern(pat, Wrapped::unknown(), PatternMode::Assign),
        }
    }

    // Bindings

    fn bind_pattern(
        &mut self,
        pat: &'a Pat,
        value: Wrapped,
        mode: PatternMode,
    ) -> Result<(), AnalysisError> {
        match pat {
            Pat::Ident(binding) => {
                self.bind_name(binding.id.sym.as_str(), value, mode);
                Ok(())
            }
            Pat::Array(array) => self.bind_array_pattern(array, value, mode),
            Pat::Object(object) => self.bind_object_pattern(object, value, mode),
            Pat::Rest(rest) => self.bind_pattern(&rest.arg, Wrapped::unknown(), mode),
            Pat::Assign(assign) => {
                let fallback = self.traverse_expr(&assign.right)?;
                let value = if is_undefined(&value) { fallback } else { value };
                self.bind_pattern(&assign.left, value, mode)
            }
            Pat::Expr(expr) => {
                if let PatternMode::Assign = mode {
                    let place = self.resolve_place(expr)?;
                    self.write_place(place, value);
                }
                Ok(())
            }
            Pat::Invalid(_) => Ok(()),
        }
    }

    fn bind_array_pattern(
        &mut self,
        array: &'a ArrayPat,
        value: Wrapped,
        mode: PatternMode,
    ) -> Result<(), AnalysisError> {
        for (index, element) in array.elems.iter().enumerate() {
            let Some(element) = element else {
                continue;
            };
            let item = match element {
                Pat::Rest(_) => Wrapped::unknown(),
                _ => self.member_of(&value, Some(&index.to_string())),
            };
            self.bind_pattern(element, item, mode)?;
        }
        Ok(())
    }

    fn bind_object_pattern(
        &mut self,
        object: &'a ObjectPat,
        value: Wrapped,
        mode: PatternMode,
    ) -> Result<(), AnalysisError> {
        for prop in &object.props {
            match prop {
                ObjectPatProp::KeyValue(key_value) => {
                    let key = self.prop_name_key(&key_value.key)?;
                    let item = self.member_of(&value, key.as_deref());
                    self.bind_pattern(&key_value.value, item, mode)?;
                }
                ObjectPatProp::Assign(assign) => {
                    let name = assign.key.id.sym.as_str();
                    let mut item = self.member_of(&value, Some(name));
                    if let Some(default) = &assign.value {
                        let fallback = self.traverse_expr(default)?;
                        if is_undefined(&item) {
                            item = fallback;
                        }
                    }
                    self.bind_name(name, item, mode);
                }
                ObjectPatProp::Rest(rest) => {
                    self.bind_pattern(&rest.arg, Wrapped::unknown(), mode)?;
                }
            }
        }
        Ok(())
    }

    fn bind_name(&mut self, name: &str, value: Wrapped, mode: PatternMode) {
        match mode {
            PatternMode::Declare(kind) => self.declare_binding(name, kind, value),
            PatternMode::Assign => self.assign_identifier(name, value),
        }
    }

    /// Declares `name`. A declaration landing in the global frame shadows a
    /// global, so it is checked like a write to that global.
    fn declare_binding(&mut self, name: &str, kind: BindingKind, value: Wrapped) {
        let lands_in_global_frame = match kind {
            BindingKind::Let | BindingKind::Const => self.scopes.depth() == 1,
            _ => self.scopes.at_top_level(),
        };

        if lands_in_global_frame && self.scopes.global_binding(name).is_none() {
            let root = self.kb.root().clone();
            if !self.global_write_allowed(&root, name, name) {
                return;
            }
        }
        self.scopes.declare(name, kind, value);
    }

    fn assign_identifier(&mut self, name: &str, value: Wrapped) {
        if !self.scopes.resolves_to_global(name) {
            self.scopes.assign(name, value);
            return;
        }
        self.write_global(name, value);
    }

    fn write_global(&mut self, name: &str, value: Wrapped) {
        if let Some(binding) = self.scopes.global_binding(name) {
            match binding.kind {
                BindingKind::Const => return,
                BindingKind::Implicit => {}
                _ => {
                    self.scopes.assign_global(name, value);
                    return;
                }
            }
        }

        let root = self.kb.root().clone();
        if self.global_write_allowed(&root, name, name) {
            self.scopes.assign_global(name, value);
        }
    }

    /// Decides whether member `key` of a knowledge base node may be written,
    /// reporting the attempt when it may not.
    fn global_write_allowed(&mut self, parent: &Arc<Entity>, path: &str, key: &str) -> bool {
        let kb = self.kb;
        let Some(member) = kb.member(parent, key) else {
            return true;
        };
        if member.overwritable {
            return true;
        }

        let readonly = match &member.readonly {
            Some(Readonly::Flag(flag)) => *flag,
            Some(Readonly::Predicate(predicate)) => predicate(self),
            None => kb.is_root(parent),
        };
        if !readonly {
            return true;
        }

        let diagnostic = self
            .diagnostic(GLOBAL_OVERWRITE, Severity::Warning, "Global overwrite")
            .with_description(format!(
                "An attempt was made to overwrite the `{path}` global. Globals \
                 provided by the platform are read-only."
            ));
        self.emit(diagnostic);
        false
    }

    fn assign_member(&mut self, object: &Wrapped, key: &str, value: Wrapped) {
        match &object.kind {
            ValueKind::Object(id) => {
                self.heap
                    .object_mut(*id)
                    .members
                    .insert(key.to_string(), value);
            }
            ValueKind::Array(id) => {
                let Ok(index) = key.parse::<usize>() else {
                    return;
                };
                let elements = &mut self.heap.array_mut(*id).elements;
                if index < elements.len() {
                    elements[index] = value;
                } else if index - elements.len() <= MAX_ARRAY_GROWTH {
                    elements.resize(index, Wrapped::undefined());
                    elements.push(value);
                }
            }
            ValueKind::Global(GlobalRef { name, target }) => match target {
                GlobalTarget::Entity(entity) if self.kb.is_root(entity) => {
                    self.write_global(key, value);
                }
                GlobalTarget::Entity(entity) => {
                    let path = format!("{name}.{key}");
                    if self.global_write_allowed(entity, &path, key) {
                        self.overlay
                            .insert((overlay_key(entity), key.to_string()), value);
                    }
                }
                GlobalTarget::Instance(id) => {
                    self.heap
                        .instance_mut(*id)
                        .assigned
                        .insert(key.to_string(), value);
                }
            },
            ValueKind::Literal(_) | ValueKind::Function | ValueKind::Unknown => {}
        }
    }

    /// Rebinds a reference expression without reporting anything. Targets
    /// that are not plain references are left alone.
    pub(super) fn rebind(&mut self, target: &'a Expr, value: Wrapped) {
        if !is_reference(target) {
            return;
        }

        self.muted += 1;
        match self.resolve_place(target) {
            Ok(Place::Identifier(name)) => {
                if self.scopes.resolves_to_global(name) {
                    self.scopes.assign_global(name, value);
                } else {
                    self.scopes.assign(name, value);
                }
            }
            Ok(place) => self.write_place(place, value),
            Err(error) => tracing::debug!(%error, "could not rebind call target"),
        }
        self.muted -= 1;
    }

    fn resolve_place(&mut self, expr: &'a Expr) -> Result<Place<'a>, AnalysisError> {
        match expr {
            Expr::Paren(paren) => self.resolve_place(&paren.expr),
            Expr::Ident(ident) => Ok(Place::Identifier(ident.sym.as_str())),
            Expr::Member(member) => self.resolve_member_place(member),
            other => {
                self.traverse_expr(other)?;
                Ok(Place::Nowhere)
            }
        }
    }

    fn resolve_member_place(&mut self, member: &'a MemberExpr) -> Result<Place<'a>, AnalysisError> {
        let object = self.traverse_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        self.set_span(member.span);
        Ok(Place::Member { object, key })
    }

    fn resolve_simple_target(
        &mut self,
        target: &'a SimpleAssignTarget,
    ) -> Result<Place<'a>, AnalysisError> {
        match target {
            SimpleAssignTarget::Ident(binding) => Ok(Place::Identifier(binding.id.sym.as_str())),
            SimpleAssignTarget::Member(member) => self.resolve_member_place(member),
            SimpleAssignTarget::Paren(paren) => self.resolve_place(&paren.expr),
            _ => Ok(Place::Nowhere),
        }
    }

    fn read_place(&mut self, place: &Place<'a>) -> Wrapped {
        match place {
            Place::Identifier(name) => self.read_identifier(name),
            Place::Member { object, key } => self.member_of(object, key.as_deref()),
            Place::Nowhere => Wrapped::unknown(),
        }
    }

    fn write_place(&mut self, place: Place<'a>, value: Wrapped) {
        match place {
            Place::Identifier(name) => self.assign_identifier(name, value),
            Place::Member {
                object,
                key: Some(key),
            } => self.assign_member(&object, &key, value),
            Place::Member { key: None, .. } | Place::Nowhere => {}
        }
    }

    // Expressions

    pub(super) fn traverse_expr(&mut self, expr: &'a Expr) -> Result<Wrapped, AnalysisError> {
        let previous = self.enter(expr.span())?;
        let result = self.visit_expr(expr);
        self.leave(previous);
        result
    }

    fn visit_expr(&mut self, expr: &'a Expr) -> Result<Wrapped, AnalysisError> {
        match expr {
            Expr::Paren(paren) => self.traverse_expr(&paren.expr),
            Expr::Lit(lit) => Ok(self.eval_lit(lit)),
            Expr::Tpl(tpl) => self.eval_template(tpl),
            Expr::TaggedTpl(tagged) => {
                self.traverse_expr(&tagged.tag)?;
                self.eval_template(&tagged.tpl)?;
                Ok(Wrapped::unknown())
            }
            Expr::Ident(ident) => Ok(self.read_identifier(ident.sym.as_str())),
            Expr::This(_) => Ok(self.this_value()),
            Expr::Array(array) => self.eval_array(array),
            Expr::Object(object) => self.eval_object(object),
            Expr::Fn(function) => self.eval_function(function.ident.as_ref(), &function.function),
            Expr::Arrow(arrow) => self.eval_arrow(arrow),
            Expr::Class(class) => {
                self.traverse_class(&class.class)?;
                Ok(Wrapped::function())
            }
            Expr::Unary(unary) => self.eval_unary(unary),
            Expr::Update(update) => self.eval_update(update),
            Expr::Bin(bin) => self.eval_binary(bin),
            Expr::Assign(assign) => self.eval_assign(assign),
            Expr::Member(member) => self.eval_member(member),
            Expr::SuperProp(super_prop) => {
                if let SuperProp::Computed(computed) = &super_prop.prop {
                    self.traverse_expr(&computed.expr)?;
                }
                Ok(Wrapped::unknown())
            }
            Expr::Cond(cond) => self.eval_conditional(cond),
            Expr::Call(call) => self.eval_call(call.span, &call.callee, &call.args),
            Expr::New(new) => self.eval_new(new),
            Expr::Seq(seq) => {
                let mut last = Wrapped::undefined();
                for expr in &seq.exprs {
                    last = self.traverse_expr(expr)?;
                }
                Ok(last)
            }
            Expr::Yield(yield_expr) => {
                if let Some(arg) = &yield_expr.arg {
                    self.traverse_expr(arg)?;
                }
                Ok(Wrapped::unknown())
            }
            Expr::Await(await_expr) => {
                self.traverse_expr(&await_expr.arg)?;
                Ok(Wrapped::unknown())
            }
            Expr::OptChain(chain) => self.eval_opt_chain(chain),
            _ => Ok(Wrapped::unknown()),
        }
    }

    fn eval_lit(&mut self, lit: &Lit) -> Wrapped {
        match lit {
            Lit::Str(s) => Wrapped::string(s.value.to_string()),
            Lit::Num(n) => Wrapped::number(n.value),
            Lit::Bool(b) => Wrapped::boolean(b.value),
            Lit::Null(_) => Wrapped::literal(Literal::Null),
            Lit::Regex(_) => self.heap.alloc_object(JsObject::default()),
            _ => Wrapped::unknown(),
        }
    }

    fn eval_template(&mut self, tpl: &'a Tpl) -> Result<Wrapped, AnalysisError> {
        let mut text = Some(String::new());

        for (index, quasi) in tpl.quasis.iter().enumerate() {
            if let Some(text) = text.as_mut() {
                text.push_str(&quasi.raw.to_string());
            }
            let Some(expr) = tpl.exprs.get(index) else {
                continue;
            };
            let value = self.traverse_expr(expr)?;
            let part = is_modeled(&value)
                .then(|| value.bounded_literal_value(&self.heap))
                .flatten();
            text = text
                .zip(part)
                .map(|(text, part)| text + part.to_js_string().as_str())
                .filter(|t| t.len() <= MAX_STRING_LEN);
        }

        Ok(text
            .filter(|t| t.len() <= MAX_STRING_LEN)
            .map_or_else(Wrapped::unknown, Wrapped::string))
    }

    fn eval_array(&mut self, array: &'a ArrayLit) -> Result<Wrapped, AnalysisError> {
        let mut elements = Vec::with_capacity(array.elems.len());
        for element in &array.elems {
            match element {
                Some(element) => {
                    let value = self.traverse_expr(&element.expr)?;
                    if element.spread.is_some() {
                        elements.push(Wrapped::unknown());
                    } else {
                        elements.push(value);
                    }
                }
                None => elements.push(Wrapped::undefined()),
            }
        }
        Ok(self.heap.alloc_array(elements))
    }

    fn eval_object(&mut self, object: &'a ObjectLit) -> Result<Wrapped, AnalysisError> {
        let mut members = IndexMap::new();

        for prop in &object.props {
            let prop = match prop {
                PropOrSpread::Spread(spread) => {
                    let value = self.traverse_expr(&spread.expr)?;
                    if let ValueKind::Object(id) = value.kind {
                        members.extend(self.heap.object(id).members.clone());
                    }
                    continue;
                }
                PropOrSpread::Prop(prop) => prop.as_ref(),
            };

            match prop {
                Prop::Shorthand(ident) => {
                    let value = self.read_identifier(ident.sym.as_str());
                    members.insert(ident.sym.to_string(), value);
                }
                Prop::KeyValue(key_value) => {
                    let key = self.prop_name_key(&key_value.key)?;
                    let value = self.traverse_expr(&key_value.value)?;
                    if let Some(key) = key {
                        members.insert(key, value);
                    }
                }
                Prop::Assign(assign) => {
                    self.traverse_expr(&assign.value)?;
                }
                Prop::Getter(getter) => {
                    let key = self.prop_name_key(&getter.key)?;
                    if let Some(body) = &getter.body {
                        self.in_frame(FrameKind::Function, |this| this.traverse_stmts(&body.stmts))?;
                    }
                    if let Some(key) = key {
                        members.insert(key, Wrapped::unknown());
                    }
                }
                Prop::Setter(setter) => {
                    self.prop_name_key(&setter.key)?;
                    self.in_frame(FrameKind::Function, |this| {
                        this.bind_pattern(
                            &setter.param,
                            Wrapped::unknown(),
                            PatternMode::Declare(BindingKind::Param),
                        )?;
                        match &setter.body {
                            Some(body) => this.traverse_stmts(&body.stmts),
                            None => Ok(()),
                        }
                    })?;
                }
                Prop::Method(method) => {
                    let key = self.prop_name_key(&method.key)?;
                    let value = self.eval_function(None, &method.function)?;
                    if let Some(key) = key {
                        members.insert(key, value);
                    }
                }
            }
        }

        Ok(self.heap.alloc_object(JsObject { members }))
    }

    fn eval_function(
        &mut self,
        ident: Option<&'a Ident>,
        function: &'a Function,
    ) -> Result<Wrapped, AnalysisError> {
        self.in_frame(FrameKind::Function, |this| {
            if let Some(ident) = ident {
                this.scopes
                    .declare(ident.sym.as_str(), BindingKind::Function, Wrapped::function());
            }
            for param in &function.params {
                this.bind_pattern(
                    &param.pat,
                    Wrapped::unknown(),
                    PatternMode::Declare(BindingKind::Param),
                )?;
            }
            match &function.body {
                Some(body) => this.traverse_stmts(&body.stmts),
                None => Ok(()),
            }
        })?;
        Ok(Wrapped::function())
    }

    fn eval_arrow(&mut self, arrow: &'a ArrowExpr) -> Result<Wrapped, AnalysisError> {
        self.in_frame(FrameKind::Function, |this| {
            for param in &arrow.params {
                this.bind_pattern(
                    param,
                    Wrapped::unknown(),
                    PatternMode::Declare(BindingKind::Param),
                )?;
            }
            match arrow.body.as_ref() {
                BlockStmtOrExpr::BlockStmt(block) => this.traverse_stmts(&block.stmts),
                BlockStmtOrExpr::Expr(expr) => this.traverse_expr(expr).map(drop),
            }
        })?;
        Ok(Wrapped::function())
    }

    fn traverse_class(&mut self, class: &'a Class) -> Result<(), AnalysisError> {
        if let Some(super_class) = &class.super_class {
            self.traverse_expr(super_class)?;
        }

        for member in &class.body {
            match member {
                ClassMember::Constructor(constructor) => {
                    self.in_frame(FrameKind::Function, |this| {
                        for param in &constructor.params {
                            if let ParamOrTsParamProp::Param(param) = param {
                                this.bind_pattern(
                                    &param.pat,
                                    Wrapped::unknown(),
                                    PatternMode::Declare(BindingKind::Param),
                                )?;
                            }
                        }
                        match &constructor.body {
                            Some(body) => this.traverse_stmts(&body.stmts),
                            None => Ok(()),
                        }
                    })?;
                }
                ClassMember::Method(method) => {
                    self.prop_name_key(&method.key)?;
                    self.eval_function(None, &method.function)?;
                }
                ClassMember::PrivateMethod(method) => {
                    self.eval_function(None, &method.function)?;
                }
                ClassMember::ClassProp(prop) => {
                    self.prop_name_key(&prop.key)?;
                    if let Some(value) = &prop.value {
                        self.in_frame(FrameKind::Function, |this| this.traverse_expr(value))?;
                    }
                }
                ClassMember::PrivateProp(prop) => {
                    if let Some(value) = &prop.value {
                        self.in_frame(FrameKind::Function, |this| this.traverse_expr(value))?;
                    }
                }
                ClassMember::StaticBlock(block) => {
                    self.in_frame(FrameKind::Function, |this| {
                        this.traverse_stmts(&block.body.stmts)
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn eval_unary(&mut self, unary: &'a UnaryExpr) -> Result<Wrapped, AnalysisError> {
        if unary.op == UnaryOp::Delete {
            match unparen(&unary.arg) {
                Expr::Member(member) => {
                    if let Place::Member {
                        object,
                        key: Some(key),
                    } = self.resolve_member_place(member)?
                    {
                        if let ValueKind::Object(id) = object.kind {
                            self.heap.object_mut(id).members.shift_remove(&key);
                        }
                    }
                }
                other => {
                    self.traverse_expr(other)?;
                }
            }
            return Ok(Wrapped::boolean(true));
        }

        let operand = self.traverse_expr(&unary.arg)?;
        let value = match unary.op {
            UnaryOp::Void => Wrapped::undefined(),
            UnaryOp::TypeOf => operand
                .type_of()
                .map_or_else(Wrapped::unknown, Wrapped::string),
            UnaryOp::Bang => operand
                .known_truthiness()
                .map_or_else(Wrapped::unknown, |truthy| Wrapped::boolean(!truthy)),
            _ if !is_modeled(&operand) => Wrapped::unknown(),
            UnaryOp::Minus => Wrapped::number(-self.to_number(&operand)),
            UnaryOp::Plus => Wrapped::number(self.to_number(&operand)),
            UnaryOp::Tilde => {
                Wrapped::number(f64::from(!operators::to_int32(self.to_number(&operand))))
            }
            UnaryOp::Delete => Wrapped::boolean(true),
        };
        Ok(value)
    }

    fn eval_update(&mut self, update: &'a UpdateExpr) -> Result<Wrapped, AnalysisError> {
        let place = self.resolve_place(&update.arg)?;
        let current = self.read_place(&place);

        if !is_modeled(&current) {
            self.write_place(place, Wrapped::unknown());
            return Ok(Wrapped::unknown());
        }

        let old = self.to_number(&current);
        let new = match update.op {
            UpdateOp::PlusPlus => old + 1.0,
            UpdateOp::MinusMinus => old - 1.0,
        };
        self.write_place(place, Wrapped::number(new));
        Ok(Wrapped::number(if update.prefix { new } else { old }))
    }

    fn eval_binary(&mut self, bin: &'a BinExpr) -> Result<Wrapped, AnalysisError> {
        let left = self.traverse_expr(&bin.left)?;
        let right = self.traverse_expr(&bin.right)?;
        Ok(self.combine(bin.op, left, right))
    }

    fn combine(&self, op: BinaryOp, left: Wrapped, right: Wrapped) -> Wrapped {
        match op {
            BinaryOp::LogicalOr => match left.known_truthiness() {
                Some(true) => left,
                Some(false) => right,
                None => Wrapped::unknown(),
            },
            BinaryOp::LogicalAnd => match left.known_truthiness() {
                Some(true) => right,
                Some(false) => left,
                None => Wrapped::unknown(),
            },
            BinaryOp::NullishCoalescing => match &left.kind {
                ValueKind::Literal(Literal::Null | Literal::Undefined) => right,
                ValueKind::Unknown => Wrapped::unknown(),
                _ => left,
            },
            BinaryOp::EqEq | BinaryOp::NotEq | BinaryOp::EqEqEq | BinaryOp::NotEqEq
                if left.as_literal().is_none() || right.as_literal().is_none() =>
            {
                Wrapped::unknown()
            }
            _ if !is_modeled(&left) || !is_modeled(&right) => Wrapped::unknown(),
            _ => left
                .bounded_literal_value(&self.heap)
                .zip(right.bounded_literal_value(&self.heap))
                .and_then(|(left, right)| operators::binary(op, &left, &right))
                .map_or_else(Wrapped::unknown, Wrapped::literal),
        }
    }

    fn eval_assign(&mut self, assign: &'a AssignExpr) -> Result<Wrapped, AnalysisError> {
        match &assign.left {
            AssignTarget::Simple(target) => {
                let place = self.resolve_simple_target(target)?;
                let value = match compound_operator(assign.op) {
                    None => self.traverse_expr(&assign.right)?,
                    Some(op) => {
                        let current = self.read_place(&place);
                        let right = self.traverse_expr(&assign.right)?;
                        self.combine(op, current, right)
                    }
                };
                self.set_span(assign.span);
                self.write_place(place, value.clone());
                Ok(value)
            }
            AssignTarget::Pat(pat) => {
                let value = self.traverse_expr(&assign.right)?;
                match pat {
                    AssignTargetPat::Array(array) => {
                        self.bind_array_pattern(array, value.clone(), PatternMode::Assign)?;
                    }
                    AssignTargetPat::Object(object) => {
                        self.bind_object_pattern(object, value.clone(), PatternMode::Assign)?;
                    }
                    AssignTargetPat::Invalid(_) => {}
                }
                Ok(value)
            }
        }
    }

    fn eval_member(&mut self, member: &'a MemberExpr) -> Result<Wrapped, AnalysisError> {
        let object = self.traverse_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        self.set_span(member.span);
        Ok(self.member_of(&object, key.as_deref()))
    }

    fn eval_conditional(&mut self, cond: &'a CondExpr) -> Result<Wrapped, AnalysisError> {
        let test = self.traverse_expr(&cond.test)?;
        let cons = self.traverse_expr(&cond.cons)?;
        let alt = self.traverse_expr(&cond.alt)?;

        Ok(match test.known_truthiness() {
            Some(true) => cons,
            Some(false) => alt,
            None => Wrapped::unknown(),
        })
    }

    fn eval_opt_chain(&mut self, chain: &'a OptChainExpr) -> Result<Wrapped, AnalysisError> {
        match chain.base.as_ref() {
            OptChainBase::Member(member) => self.eval_member(member),
            OptChainBase::Call(call) => self.eval_call_expr(call.span, &call.callee, &call.args),
        }
    }

    pub(super) fn member_key(&mut self, prop: &'a MemberProp) -> Result<Option<String>, AnalysisError> {
        match prop {
            MemberProp::Ident(ident) => Ok(Some(ident.sym.to_string())),
            MemberProp::PrivateName(_) => Ok(None),
            MemberProp::Computed(computed) => {
                let key = self.traverse_expr(&computed.expr)?;
                Ok(key.as_literal().map(Literal::to_js_string))
            }
        }
    }

    fn prop_name_key(&mut self, name: &'a PropName) -> Result<Option<String>, AnalysisError> {
        match name {
            PropName::Ident(ident) => Ok(Some(ident.sym.to_string())),
            PropName::Str(s) => Ok(Some(s.value.to_string())),
            PropName::Num(n) => Ok(Some(Literal::Number(n.value).to_js_string())),
            PropName::Computed(computed) => {
                let key = self.traverse_expr(&computed.expr)?;
                Ok(key.as_literal().map(Literal::to_js_string))
            }
            PropName::BigInt(_) => Ok(None),
        }
    }

    fn to_number(&self, value: &Wrapped) -> f64 {
        value.literal_value(&self.heap).to_number()
    }

    // Reads

    fn this_value(&self) -> Wrapped {
        if self.scopes.at_top_level() {
            Wrapped::global("window", GlobalTarget::Entity(self.kb.root().clone()))
        } else {
            Wrapped::unknown()
        }
    }

    /// Resolves an identifier: scope frames first, then the global table.
    pub fn read_identifier(&mut self, name: &str) -> Wrapped {
        self.check_banned(name);

        if let Some(binding) = self.scopes.lookup(name) {
            return binding.value.clone();
        }
        self.read_knowledge_base_global(name)
    }

    fn read_global(&mut self, name: &str) -> Wrapped {
        if let Some(binding) = self.scopes.global_binding(name) {
            return binding.value.clone();
        }
        self.read_knowledge_base_global(name)
    }

    fn read_knowledge_base_global(&mut self, name: &str) -> Wrapped {
        match self.kb.lookup_global(name) {
            Some(entity) => self.wrap_entity(name.to_string(), entity, Context::Chrome),
            None => Wrapped::unknown(),
        }
    }

    fn check_banned(&mut self, name: &str) {
        let Some(reason) = self.kb.banned_identifier(name) else {
            return;
        };
        let diagnostic = self
            .diagnostic(
                BANNED_IDENTIFIER,
                Severity::Warning,
                format!("Use of banned identifier `{name}`"),
            )
            .with_description(reason);
        self.emit(diagnostic);
    }

    /// Reads member `key` of `object`. A `None` key stands for a computed
    /// property that could not be resolved.
    pub fn member_of(&mut self, object: &Wrapped, key: Option<&str>) -> Wrapped {
        let Some(key) = key else {
            return Wrapped::unknown();
        };
        self.check_banned(key);

        match &object.kind {
            ValueKind::Literal(Literal::String(s)) if key == "length" => {
                Wrapped::number(s.encode_utf16().count() as f64)
            }
            ValueKind::Object(id) => {
                let member = self.heap.object(*id).members.get(key).cloned();
                match member {
                    Some(member) => member,
                    None => self.universal_member(key, object.context),
                }
            }
            ValueKind::Array(id) => {
                let elements = &self.heap.array(*id).elements;
                if key == "length" {
                    return Wrapped::number(elements.len() as f64);
                }
                match key.parse::<usize>() {
                    Ok(index) => elements.get(index).cloned().unwrap_or_else(Wrapped::undefined),
                    Err(_) => self.universal_member(key, object.context),
                }
            }
            ValueKind::Global(global) => self.global_member(global, key, object.context),
            ValueKind::Literal(_) | ValueKind::Function | ValueKind::Unknown => {
                self.universal_member(key, object.context)
            }
        }
    }

    fn global_member(&mut self, global: &GlobalRef, key: &str, context: Context) -> Wrapped {
        let kb = self.kb;
        let path = format!("{}.{key}", global.name);

        let member = match &global.target {
            GlobalTarget::Entity(entity) => {
                if kb.is_root(entity) {
                    return self.read_global(key);
                }
                if let Some(value) = self.overlay.get(&(overlay_key(entity), key.to_string())) {
                    return value.clone();
                }
                kb.member(entity, key)
            }
            GlobalTarget::Instance(id) => {
                let instance = self.heap.instance(*id);
                if let Some(value) = instance.assigned.get(key) {
                    return value.clone();
                }
                kb.member(&instance.entity, key)
            }
        };

        match member {
            Some(member) => self.wrap_entity(path, member, context),
            None => self.universal_member(key, context),
        }
    }

    fn universal_member(&mut self, key: &str, context: Context) -> Wrapped {
        match self.kb.universal(key) {
            Some(entity) => self.wrap_entity(key.to_string(), entity, context),
            None => Wrapped::unknown(),
        }
    }

    /// Materializes a knowledge base node as a value, reporting access to
    /// statically dangerous nodes.
    fn wrap_entity(&mut self, name: String, entity: Arc<Entity>, context: Context) -> Wrapped {
        self.wrap_entity_hops(name, entity, context, 0)
    }

    fn wrap_entity_hops(
        &mut self,
        name: String,
        entity: Arc<Entity>,
        context: Context,
        hops: usize,
    ) -> Wrapped {
        self.report_static_danger(&name, &entity);
        let context = entity.context.unwrap_or(context);

        let mut value = match &entity.value {
            EntityValue::Constant(literal) => Wrapped::literal(literal.clone()),
            EntityValue::Alias(path) => {
                let target = if hops < MAX_ALIAS_HOPS {
                    self.kb.resolve(path)
                } else {
                    None
                };
                match target {
                    Some(target) => self.wrap_entity_hops(name, target, context, hops + 1),
                    None => {
                        tracing::debug!(global = %name, "alias does not resolve");
                        Wrapped::unknown()
                    }
                }
            }
            EntityValue::Service { method, interface } => {
                match self.kb.instantiate(&XpcomMap::Interface(*interface)) {
                    Some(instance) => {
                        tracing::trace!(method, interface, "building service instance");
                        self.wrap_instance(name, instance)
                    }
                    None => Wrapped::unknown(),
                }
            }
            EntityValue::None | EntityValue::Members(_) => {
                Wrapped::global(name, GlobalTarget::Entity(entity.clone()))
            }
        };

        value.context = context;
        value.readonly = matches!(entity.readonly, Some(Readonly::Flag(true)));
        value.overwritable = value.overwritable || entity.overwritable;
        value
    }

    /// Moves an independently owned entity into the heap as an XPCOM
    /// instance.
    pub fn wrap_instance(&mut self, name: String, entity: Entity) -> Wrapped {
        self.report_static_danger(&name, &entity);

        let id = self.heap.alloc_instance(Instance {
            name: name.clone(),
            entity,
            assigned: IndexMap::new(),
        });
        let mut value = Wrapped::global(name, GlobalTarget::Instance(id));
        value.overwritable = true;
        value
    }

    /// The interface descriptor a value maps to, freshly cloned.
    pub fn xpcom_source(&self, value: &Wrapped) -> Option<Entity> {
        let ValueKind::Global(GlobalRef {
            target: GlobalTarget::Entity(entity),
            ..
        }) = &value.kind
        else {
            return None;
        };
        entity
            .xpcom_map
            .as_ref()
            .and_then(|map| self.kb.instantiate(map))
    }

    fn report_static_danger(&mut self, name: &str, entity: &Entity) {
        let diagnostic = match &entity.dangerous {
            Some(Danger::Always) => self
                .diagnostic(
                    DANGEROUS_GLOBAL,
                    Severity::Warning,
                    format!("Access to the `{name}` global"),
                )
                .with_description(format!(
                    "Access to the `{name}` property is deprecated for security or \
                     other reasons."
                )),
            Some(Danger::Message(message)) => {
                self.diagnostic(DANGEROUS_GLOBAL, Severity::Warning, *message)
            }
            Some(Danger::Predicate(_)) | None => return,
        };
        self.emit(diagnostic);
    }
}

pub(crate) fn unparen(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => unparen(&paren.expr),
        other => other,
    }
}

/// Plain references: identifiers and member chains rooted at one.
fn is_reference(expr: &Expr) -> bool {
    match unparen(expr) {
        Expr::Ident(_) => true,
        Expr::Member(member) => {
            matches!(unparen(&member.obj), Expr::This(_)) || is_reference(&member.obj)
        }
        _ => false,
    }
}

fn is_modeled(value: &Wrapped) -> bool {
    matches!(
        value.kind,
        ValueKind::Literal(_) | ValueKind::Object(_) | ValueKind::Array(_)
    )
}

fn is_undefined(value: &Wrapped) -> bool {
    matches!(value.kind, ValueKind::Literal(Literal::Undefined))
}

fn overlay_key(entity: &Arc<Entity>) -> usize {
    Arc::as_ptr(entity) as usize
}

fn binding_kind(kind: VarDeclKind) -> BindingKind {
    match kind {
        VarDeclKind::Var => BindingKind::Var,
        VarDeclKind::Let => BindingKind::Let,
        VarDeclKind::Const => BindingKind::Const,
    }
}

fn compound_operator(op: AssignOp) -> Option<BinaryOp> {
    let op = match op {
        AssignOp::Assign => return None,
        AssignOp::AddAssign => BinaryOp::Add,
        AssignOp::SubAssign => BinaryOp::Sub,
        AssignOp::MulAssign => BinaryOp::Mul,
        AssignOp::DivAssign => BinaryOp::Div,
        AssignOp::ModAssign => BinaryOp::Mod,
        AssignOp::LShiftAssign => BinaryOp::LShift,
        AssignOp::RShiftAssign => BinaryOp::RShift,
        AssignOp::ZeroFillRShiftAssign => BinaryOp::ZeroFillRShift,
        AssignOp::BitOrAssign => BinaryOp::BitOr,
        AssignOp::BitXorAssign => BinaryOp::BitXor,
        AssignOp::BitAndAssign => BinaryOp::BitAnd,
        AssignOp::ExpAssign => BinaryOp::Exp,
        AssignOp::AndAssign => BinaryOp::LogicalAnd,
        AssignOp::OrAssign => BinaryOp::LogicalOr,
        AssignOp::NullishAssign => BinaryOp::NullishCoalescing,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traverse(code: &str) -> (ParsedFile, RunContext) {
        (ParsedFile::from_source("test.js", code), RunContext::new())
    }

    fn number_binding(code: &str, name: &str) -> Option<f64> {
        let (file, run) = traverse(code);
        let mut traverser = Traverser::new(&file, &run);
        traverser.traverse().unwrap();
        traverser.binding(name).and_then(Wrapped::as_number)
    }

    fn string_binding(code: &str, name: &str) -> Option<String> {
        let (file, run) = traverse(code);
        let mut traverser = Traverser::new(&file, &run);
        traverser.traverse().unwrap();
        traverser
            .binding(name)
            .and_then(|v| v.as_literal())
            .and_then(|l| l.as_str().map(str::to_string))
    }

    fn rules(code: &str) -> Vec<String> {
        let (file, run) = traverse(code);
        Traverser::new(&file, &run)
            .run()
            .unwrap()
            .iter()
            .map(|d| d.rule_id.to_string())
            .collect()
    }

    #[test]
    fn arithmetic_and_coercion() {
        assert_eq!(number_binding("var x = 1 + 2 * 3;", "x"), Some(7.0));
        assert_eq!(number_binding("var x = '6' / 2;", "x"), Some(3.0));
        assert_eq!(string_binding("var s = 'a' + 1 + 2;", "s").as_deref(), Some("a12"));
        assert_eq!(string_binding("var s = [1, 2] + '';", "s").as_deref(), Some("1,2"));
        assert_eq!(number_binding("var x = Math.PI > 3 ? 1 : 2;", "x"), Some(1.0));
    }

    #[test]
    fn compound_assignment_and_update() {
        assert_eq!(number_binding("var x = 1; x += 4; x *= 2;", "x"), Some(10.0));
        assert_eq!(number_binding("var x = 1; x++; ++x;", "x"), Some(3.0));
        assert_eq!(number_binding("var x = 5; var y = x--;", "y"), Some(5.0));
    }

    #[test]
    fn objects_alias_through_bindings() {
        let code = "var a = {}; var b = a; b.v = 'set'; var r = a.v;";
        assert_eq!(string_binding(code, "r").as_deref(), Some("set"));
    }

    #[test]
    fn destructuring_reads_members() {
        let code = "var o = {a: 1, b: {c: 2}}; var {a, b: {c}} = o; var [x, , y = 9] = [4, 5];";
        assert_eq!(number_binding(code, "a"), Some(1.0));
        assert_eq!(number_binding(code, "c"), Some(2.0));
        assert_eq!(number_binding(code, "x"), Some(4.0));
        assert_eq!(number_binding(code, "y"), Some(9.0));
    }

    #[test]
    fn templates_interpolate_known_values() {
        assert_eq!(
            string_binding("var n = 2; var s = `a${n}b`;", "s").as_deref(),
            Some("a2b")
        );
        assert_eq!(string_binding("var s = `a${unknownThing}`;", "s"), None);
    }

    #[test]
    fn doubling_strings_stop_at_the_length_limit() {
        let doubled = |times: usize| format!("var s = 'xxxxxxxx';{}", " s += s;".repeat(times));

        let at_limit = string_binding(&doubled(17), "s").map(|s| s.len());
        assert_eq!(at_limit, Some(MAX_STRING_LEN));
        assert_eq!(string_binding(&doubled(18), "s"), None);
        assert_eq!(string_binding(&doubled(40), "s"), None);
    }

    #[test]
    fn templates_stop_at_the_length_limit() {
        let code = format!("var s = 'xxxxxxxx';{} var one = `${{s}}`; var two = `${{s}}${{s}}`;", " s += s;".repeat(17));
        assert_eq!(string_binding(&code, "one").map(|s| s.len()), Some(MAX_STRING_LEN));
        assert_eq!(string_binding(&code, "two"), None);
    }

    #[test]
    fn self_referencing_call_arguments_are_cheap() {
        let assignments: String = (0..16).map(|i| format!(" a[{i}] = a;")).collect();
        let code = format!("var a = [];{assignments} foo(a); var r = a + '';");

        let start = std::time::Instant::now();
        assert_eq!(string_binding(&code, "r"), Some(",".repeat(15)));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn dangerous_globals_are_reported_on_access() {
        assert_eq!(rules("var e = eval;"), vec!["javascript::dangerous_global"]);
        assert_eq!(rules("window.eval('1');"), vec!["javascript::dangerous_global"]);
    }

    #[test]
    fn local_shadowing_hides_globals() {
        assert!(rules("function f(eval) { eval('x'); }").is_empty());
        assert!(rules("(function () { var eval = 1; return eval; })();").is_empty());
    }

    #[test]
    fn readonly_globals_reject_writes() {
        assert_eq!(rules("Components = null;"), vec!["javascript::global_overwrite"]);
        assert_eq!(rules("window.escape = null;"), vec!["javascript::global_overwrite"]);
        assert!(rules("Cc = Components.classes;").is_empty());
        assert!(rules("document.title = 'x';").is_empty());
        assert!(rules("myGlobal = 1; window.other = 2;").is_empty());
    }

    #[test]
    fn dropped_global_writes_keep_the_original() {
        let (file, run) = traverse("undefined = 5; var r = undefined;");
        let mut traverser = Traverser::new(&file, &run);
        traverser.traverse().unwrap();

        assert!(matches!(
            traverser.binding("r").and_then(Wrapped::as_literal),
            Some(Literal::Undefined)
        ));
    }

    #[test]
    fn banned_identifiers_are_reported() {
        assert_eq!(
            rules("var t = Services.tm.newThread(0);"),
            vec!["javascript::banned_identifier"]
        );
    }

    #[test]
    fn top_level_this_is_the_window() {
        assert_eq!(rules("this.eval('x');"), vec!["javascript::dangerous_global"]);
        assert!(rules("function f() { this.eval('x'); }").is_empty());
    }

    #[test]
    fn nesting_past_the_limit_fails_the_file() {
        let code = format!("var x = {}1{};", "(".repeat(100), ")".repeat(100));
        let (file, run) = traverse(&code);

        let result = Traverser::new(&file, &run).with_max_depth(32).run();
        assert!(matches!(
            result,
            Err(AnalysisError::NestingTooDeep { limit: 32, line: 1 })
        ));
    }

    #[test]
    fn unparsed_files_are_rejected() {
        let (file, run) = traverse("var = ;");
        if file.script().is_none() {
            assert!(matches!(
                Traverser::new(&file, &run).run(),
                Err(AnalysisError::Unparsed { .. })
            ));
        }
    }

    #[test]
    fn analysis_is_deterministic() {
        let code = "setTimeout('a'); var x = Components.classes['@x;1'].getService(Ci.nsIJSON); x.encode({});";
        assert_eq!(rules(code), rules(code));
    }
}
