//=====================================================
// File: analyzer/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript semantic analysis
// Objective: Resolve identifiers against the lexical scope tree, infer a
//            TypeExpr for every expression, and reject programs that can
//            never run (redeclarations, stray this/base, loop control
//            outside loops, assignment to undeclared names)
//=====================================================

pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::ast::{
    ArmBody, AssignTarget, Ast, BinaryOp, BindingKind, Block, Expr, ExprKind, FunctionBody,
    FunctionDef, MatchArm, MemberInit, NodeId, Pattern, Stmt, StmtKind, UnaryOp,
};
use crate::interpreter::builtins;
use crate::symbol::{
    Redeclared, ScopeId, ScopeKind, SymbolEntry, SymbolKind, SymbolRef, SymbolTable,
};
use crate::tokenizer::Position;

use self::types::{TypeExpr, unify, unify_all};

//=====================================================
//            Section 1: Results & Errors
//=====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticErrorKind {
    Redeclared { previous: Position },
    ThisOutsideEntity,
    BaseOutsideEntity,
    UndeclaredAssignment,
    Undeclared,
    LoopControlOutsideLoop,
    MisplacedModuleItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{module}:{position}: {message}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub message: String,
    pub module: String,
    pub position: Position,
}

/// A non-fatal finding, logged and kept on the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub position: Position,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, module: &str, message: String, position: Position) {
        warn!(target: "ohscript::analyzer", module, %position, "{}", message);
        self.warnings.push(Diagnostic { message, position });
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.warnings
    }
}

/// Names supplied from outside the module: forest bindings and options.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerContext {
    pub bindings: HashSet<String>,
    pub strict_identifiers: bool,
}

impl AnalyzerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_identifiers = strict;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub module_scope: ScopeId,
    pub types: HashMap<NodeId, TypeExpr>,
    pub resolutions: HashMap<NodeId, SymbolRef>,
    pub warnings: Vec<Diagnostic>,
}

impl Analysis {
    pub fn type_of(&self, id: NodeId) -> Option<&TypeExpr> {
        self.types.get(&id)
    }

    pub fn resolution_of(&self, id: NodeId) -> Option<&SymbolRef> {
        self.resolutions.get(&id)
    }

    /// Whether `name` is declared at the top level of the module.
    pub fn declares(&self, name: &str) -> bool {
        self.symbols
            .scope(self.module_scope)
            .and_then(|scope| scope.get(name))
            .is_some()
    }
}

//Function: analyze
//Purpose: Run scope resolution and type inference over one module
//Inputs: ast: &Ast, ctx: &AnalyzerContext
//Returns: Result<Analysis, SemanticError>
pub fn analyze(ast: &Ast, ctx: &AnalyzerContext) -> Result<Analysis, SemanticError> {
    let mut analyzer = Analyzer::new(&ast.module, ctx);
    analyzer.boundaries.push(Vec::new());
    analyzer.analyze_statements(&ast.program.body.statements)?;
    analyzer.boundaries.pop();
    Ok(Analysis {
        symbols: analyzer.symbols,
        module_scope: analyzer.module_scope,
        types: analyzer.types,
        resolutions: analyzer.resolutions,
        warnings: analyzer.diagnostics.into_warnings(),
    })
}

//=====================================================
//            Section 2: Analyzer State
//=====================================================

struct Analyzer<'a> {
    module: &'a str,
    ctx: &'a AnalyzerContext,
    symbols: SymbolTable,
    current: ScopeId,
    module_scope: ScopeId,
    types: HashMap<NodeId, TypeExpr>,
    resolutions: HashMap<NodeId, SymbolRef>,
    diagnostics: Diagnostics,
    namespaces: HashMap<String, ScopeId>,
    entity_depth: usize,
    loop_depth: usize,
    /// Values that may complete each enclosing value boundary.
    boundaries: Vec<Vec<TypeExpr>>,
}

impl<'a> Analyzer<'a> {
    fn new(module: &'a str, ctx: &'a AnalyzerContext) -> Self {
        let mut symbols = SymbolTable::new();
        let origin = Position::default();
        for name in builtins::BUILTIN_NAMES {
            symbols.define(
                SymbolTable::ROOT,
                SymbolEntry::new(*name, SymbolKind::Builtin, TypeExpr::Unknown, origin),
            );
        }
        for name in &ctx.bindings {
            symbols.define(
                SymbolTable::ROOT,
                SymbolEntry::new(name.as_str(), SymbolKind::External, TypeExpr::Unknown, origin),
            );
        }
        let module_scope = symbols.push_scope(SymbolTable::ROOT, ScopeKind::Module);
        symbols.define(
            module_scope,
            SymbolEntry::new(
                builtins::ARGS,
                SymbolKind::Variable,
                TypeExpr::Array(Box::new(TypeExpr::Unknown)),
                origin,
            ),
        );
        Self {
            module,
            ctx,
            symbols,
            current: module_scope,
            module_scope,
            types: HashMap::new(),
            resolutions: HashMap::new(),
            diagnostics: Diagnostics::new(),
            namespaces: HashMap::new(),
            entity_depth: 0,
            loop_depth: 0,
            boundaries: Vec::new(),
        }
    }

    fn error(&self, kind: SemanticErrorKind, message: String, position: Position) -> SemanticError {
        SemanticError {
            kind,
            message,
            module: self.module.to_string(),
            position,
        }
    }

    fn warn(&mut self, message: String, position: Position) {
        self.diagnostics.record(self.module, message, position);
    }

    fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        mutable: bool,
        ty: TypeExpr,
        position: Position,
    ) -> Result<(), SemanticError> {
        let mut entry = SymbolEntry::new(name, kind, ty, position);
        entry.mutable = mutable;
        self.symbols
            .declare(self.current, entry)
            .map_err(|Redeclared { name, previous }| {
                self.error(
                    SemanticErrorKind::Redeclared { previous },
                    format!("'{}' is already declared in this scope (at {})", name, previous),
                    position,
                )
            })
    }

    fn in_scope<T>(
        &mut self,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        let scope = self.symbols.push_scope(self.current, kind);
        let saved = std::mem::replace(&mut self.current, scope);
        let result = f(self);
        self.current = saved;
        result
    }

    //=====================================================
    //            Section 3: Blocks & Statements
    //=====================================================

    /// Function declarations are visible to every statement of their block.
    fn hoist_functions(&mut self, statements: &[Stmt]) -> Result<(), SemanticError> {
        for stmt in statements {
            if let StmtKind::Function(def) = &stmt.kind {
                if let Some(name) = &def.name {
                    let ty = TypeExpr::function(def.params.len(), TypeExpr::Unknown);
                    self.declare(name, SymbolKind::Function, false, ty, def.position)?;
                }
            }
        }
        Ok(())
    }

    fn analyze_statements(&mut self, statements: &[Stmt]) -> Result<TypeExpr, SemanticError> {
        self.hoist_functions(statements)?;
        let mut deferred: Vec<Arc<FunctionDef>> = Vec::new();
        let mut tail = TypeExpr::Unit;
        let last = statements.len().saturating_sub(1);
        for (index, stmt) in statements.iter().enumerate() {
            match &stmt.kind {
                StmtKind::Function(def) => deferred.push(Arc::clone(def)),
                StmtKind::Expression { expr, terminated } => {
                    let ty = self.infer(expr)?;
                    if index == last && !terminated && !expr.is_assignment_like() {
                        tail = ty;
                    }
                }
                _ => self.analyze_stmt(stmt)?,
            }
        }
        // Bodies see every sibling declared in the block, not just earlier ones.
        for def in deferred {
            let ty = self.analyze_function(&def)?;
            if let Some(name) = &def.name {
                if let Some(entry) = self.symbols.lookup_mut(self.current, name) {
                    entry.ty = ty;
                }
            }
        }
        Ok(tail)
    }

    fn analyze_block(&mut self, block: &Block, kind: ScopeKind) -> Result<TypeExpr, SemanticError> {
        self.in_scope(kind, |this| this.analyze_statements(&block.statements))
    }

    /// Control-flow body: its trailing value completes the enclosing boundary.
    fn analyze_transparent(&mut self, block: &Block) -> Result<(), SemanticError> {
        let ty = self.analyze_block(block, ScopeKind::Block)?;
        if block.tail().is_some_and(|tail| !tail.is_assignment_like()) {
            self.complete_boundary(ty);
        }
        Ok(())
    }

    fn analyze_boundary(&mut self, block: &Block, kind: ScopeKind) -> Result<TypeExpr, SemanticError> {
        self.boundaries.push(Vec::new());
        let result = self.analyze_block(block, kind);
        let mut completions = self.boundaries.pop().unwrap_or_default();
        let tail = result?;
        if completions.is_empty() {
            return Ok(tail);
        }
        if block.tail().is_some() {
            completions.push(tail);
        }
        Ok(unify_all(&completions))
    }

    fn complete_boundary(&mut self, ty: TypeExpr) {
        if let Some(current) = self.boundaries.last_mut() {
            current.push(ty);
        }
    }

    fn analyze_stmt(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match &stmt.kind {
            StmtKind::Declare { kind, declarators } => {
                let mutable = *kind == BindingKind::Var;
                for declarator in declarators {
                    if let (Pattern::Bind(name), Some(Expr { kind: ExprKind::Function(_), .. })) =
                        (&declarator.target, &declarator.value)
                    {
                        // Lambdas may refer to the name they are bound to.
                        let ty = TypeExpr::Unknown;
                        self.declare(name, SymbolKind::Variable, mutable, ty, declarator.position)?;
                        let value = declarator.value.as_ref().map(|v| self.infer(v)).transpose()?;
                        if let (Some(ty), Some(entry)) =
                            (value, self.symbols.lookup_mut(self.current, name))
                        {
                            entry.ty = ty;
                        }
                        continue;
                    }
                    let ty = match &declarator.value {
                        Some(value) => self.infer(value)?,
                        None => TypeExpr::Unknown,
                    };
                    self.declare_pattern(&declarator.target, &ty, mutable, declarator.position)?;
                }
                Ok(())
            }
            StmtKind::Function(def) => {
                // Only reached for a lone declaration outside statement lists.
                self.analyze_function(def).map(|_| ())
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.infer(condition)?;
                self.analyze_transparent(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.analyze_transparent(else_branch)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.infer(condition)?;
                self.in_loop(|this| this.analyze_transparent(body))
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.in_scope(ScopeKind::Block, |this| {
                if let Some(init) = init {
                    this.analyze_stmt(init)?;
                }
                if let Some(condition) = condition {
                    this.infer(condition)?;
                }
                if let Some(update) = update {
                    this.infer(update)?;
                }
                this.in_loop(|this| this.analyze_transparent(body))
            }),
            StmtKind::Each {
                item,
                index,
                iterable,
                body,
            } => {
                let iterable_ty = self.infer(iterable)?;
                let item_ty = match &iterable_ty {
                    TypeExpr::Array(inner) => (**inner).clone(),
                    _ => TypeExpr::Unknown,
                };
                self.in_scope(ScopeKind::Block, |this| {
                    this.declare(item, SymbolKind::Variable, true, item_ty, stmt.position)?;
                    if let Some(index) = index {
                        this.declare(index, SymbolKind::Variable, true, TypeExpr::Unknown, stmt.position)?;
                    }
                    this.in_loop(|this| this.analyze_transparent(body))
                })
            }
            StmtKind::Match { scrutinee, arms } => {
                let ty = self.infer(scrutinee)?;
                for arm in arms {
                    self.analyze_arm(arm, &ty, false)?;
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                let ty = match value {
                    Some(value) => self.infer(value)?,
                    None => TypeExpr::Unit,
                };
                self.complete_boundary(ty);
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let word = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    return Err(self.error(
                        SemanticErrorKind::LoopControlOutsideLoop,
                        format!("'{}' outside of a loop", word),
                        stmt.position,
                    ));
                }
                Ok(())
            }
            StmtKind::Import { items, .. } => {
                self.require_module_level("import", stmt.position)?;
                for item in items {
                    self.declare(
                        item.local_name(),
                        SymbolKind::Import,
                        true,
                        TypeExpr::Unknown,
                        stmt.position,
                    )?;
                }
                Ok(())
            }
            StmtKind::Export(_) => self.require_module_level("export", stmt.position),
            StmtKind::Namespace { name, body } => {
                self.declare(name, SymbolKind::Namespace, false, TypeExpr::Unknown, stmt.position)?;
                self.in_scope(ScopeKind::Namespace, |this| {
                    this.namespaces.insert(name.clone(), this.current);
                    this.analyze_statements(&body.statements).map(|_| ())
                })
            }
            StmtKind::Expression { expr, .. } => self.infer(expr).map(|_| ()),
        }
    }

    fn require_module_level(&self, what: &str, position: Position) -> Result<(), SemanticError> {
        if self.current == self.module_scope {
            return Ok(());
        }
        Err(self.error(
            SemanticErrorKind::MisplacedModuleItem,
            format!("'{}' is only allowed at module level", what),
            position,
        ))
    }

    fn in_loop<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        self.loop_depth += 1;
        let result = f(self);
        self.loop_depth -= 1;
        result
    }

    fn declare_pattern(
        &mut self,
        pattern: &Pattern,
        ty: &TypeExpr,
        mutable: bool,
        position: Position,
    ) -> Result<(), SemanticError> {
        match pattern {
            Pattern::Bind(name) => {
                let kind = if *ty == TypeExpr::Error {
                    SymbolKind::Error
                } else {
                    SymbolKind::Variable
                };
                self.declare(name, kind, mutable, ty.clone(), position)
            }
            Pattern::Tuple(items) | Pattern::Array(items) => {
                let positional = match ty {
                    TypeExpr::Tuple(types)
                        if types.len() == items.len()
                            && !items.iter().any(|p| matches!(p, Pattern::Rest)) =>
                    {
                        Some(types)
                    }
                    _ => None,
                };
                for (index, item) in items.iter().enumerate() {
                    let item_ty = positional
                        .and_then(|types| types.get(index).cloned())
                        .unwrap_or(TypeExpr::Unknown);
                    self.declare_pattern(item, &item_ty, mutable, position)?;
                }
                Ok(())
            }
            Pattern::Wildcard | Pattern::Rest | Pattern::Literal(_) => Ok(()),
        }
    }

    fn analyze_arm(&mut self, arm: &MatchArm, scrutinee: &TypeExpr, expression: bool) -> Result<TypeExpr, SemanticError> {
        self.in_scope(ScopeKind::Block, |this| {
            this.declare_pattern(&arm.pattern, scrutinee, true, arm.position)?;
            if let Some(guard) = &arm.guard {
                this.infer(guard)?;
            }
            match (&arm.body, expression) {
                (ArmBody::Block(block), true) => this.analyze_boundary(block, ScopeKind::Block),
                (ArmBody::Block(block), false) => {
                    this.analyze_transparent(block)?;
                    Ok(TypeExpr::Unit)
                }
                (ArmBody::Expr(expr), true) => this.infer(expr),
                (ArmBody::Expr(expr), false) => {
                    let ty = this.infer(expr)?;
                    if !expr.is_assignment_like() {
                        this.complete_boundary(ty);
                    }
                    Ok(TypeExpr::Unit)
                }
            }
        })
    }

    //=====================================================
    //            Section 4: Functions & Entities
    //=====================================================

    fn analyze_function(&mut self, def: &FunctionDef) -> Result<TypeExpr, SemanticError> {
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let result = self.in_scope(ScopeKind::Function, |this| {
            for param in &def.params {
                this.declare(param, SymbolKind::Parameter, true, TypeExpr::Unknown, def.position)?;
            }
            match &def.body {
                FunctionBody::Block(block) => this.analyze_boundary(block, ScopeKind::Block),
                FunctionBody::Expr(expr) => {
                    this.boundaries.push(Vec::new());
                    let ty = this.infer(expr);
                    this.boundaries.pop();
                    ty
                }
            }
        });
        self.loop_depth = saved_loops;
        Ok(TypeExpr::function(def.params.len(), result?))
    }

    fn analyze_members(&mut self, members: &[MemberInit]) -> Result<Vec<(String, TypeExpr)>, SemanticError> {
        self.entity_depth += 1;
        let result = self.in_scope(ScopeKind::Entity, |this| {
            let mut types = Vec::with_capacity(members.len());
            for member in members {
                let ty = this.infer(&member.value)?;
                this.declare(&member.name, SymbolKind::Member, true, ty.clone(), member.position)?;
                types.push((member.name.clone(), ty));
            }
            Ok(types)
        });
        self.entity_depth -= 1;
        result
    }

    //=====================================================
    //            Section 5: Expressions
    //=====================================================

    fn infer(&mut self, expr: &Expr) -> Result<TypeExpr, SemanticError> {
        let ty = self.infer_kind(expr)?;
        self.types.insert(expr.id, ty.clone());
        Ok(ty)
    }

    fn resolve_read(&mut self, expr: &Expr, name: &str) -> Result<TypeExpr, SemanticError> {
        if let Some((scope, entry)) = self.symbols.lookup(self.current, name) {
            let resolved = SymbolRef { scope, kind: entry.kind };
            let ty = entry.ty.clone();
            self.resolutions.insert(expr.id, resolved);
            return Ok(ty);
        }
        if self.entity_depth > 0 {
            let scope = self
                .symbols
                .enclosing(self.current, ScopeKind::Entity)
                .unwrap_or(self.current);
            self.resolutions.insert(
                expr.id,
                SymbolRef { scope, kind: SymbolKind::Member },
            );
            return Ok(TypeExpr::Unknown);
        }
        if self.ctx.strict_identifiers {
            return Err(self.error(
                SemanticErrorKind::Undeclared,
                format!("'{}' is not declared", name),
                expr.position,
            ));
        }
        self.warn(
            format!("'{}' is not declared here; it must be supplied at run time", name),
            expr.position,
        );
        // Later reads of the same name stay quiet.
        self.symbols.define(
            SymbolTable::ROOT,
            SymbolEntry::new(name, SymbolKind::Unknown, TypeExpr::Unknown, expr.position),
        );
        self.resolutions.insert(
            expr.id,
            SymbolRef { scope: SymbolTable::ROOT, kind: SymbolKind::Unknown },
        );
        Ok(TypeExpr::Unknown)
    }

    fn check_place(&mut self, place: &Expr, value: &TypeExpr) -> Result<(), SemanticError> {
        match &place.kind {
            ExprKind::Identifier(name) => {
                let found = self
                    .symbols
                    .lookup(self.current, name)
                    .map(|(scope, entry)| (scope, entry.kind));
                match found {
                    Some((scope, kind)) if kind != SymbolKind::Unknown => {
                        self.resolutions.insert(place.id, SymbolRef { scope, kind });
                        if let Some(entry) = self.symbols.lookup_mut(self.current, name) {
                            entry.ty = unify(&entry.ty, value).unwrap_or(TypeExpr::Unknown);
                        }
                        self.types.insert(place.id, value.clone());
                        Ok(())
                    }
                    _ if self.entity_depth > 0 => {
                        self.types.insert(place.id, TypeExpr::Unknown);
                        Ok(())
                    }
                    _ => Err(self.error(
                        SemanticErrorKind::UndeclaredAssignment,
                        format!("assignment to undeclared variable '{}'", name),
                        place.position,
                    )),
                }
            }
            _ => self.infer(place).map(|_| ()),
        }
    }

    fn check_pattern_assignment(&mut self, pattern: &Pattern, position: Position) -> Result<(), SemanticError> {
        for name in pattern.bindings() {
            let declared = self
                .symbols
                .lookup(self.current, name)
                .is_some_and(|(_, entry)| entry.kind != SymbolKind::Unknown);
            if !declared && self.entity_depth == 0 {
                return Err(self.error(
                    SemanticErrorKind::UndeclaredAssignment,
                    format!("assignment to undeclared variable '{}'", name),
                    position,
                ));
            }
        }
        Ok(())
    }

    fn binary_type(&mut self, op: BinaryOp, left: &TypeExpr, right: &TypeExpr, position: Position) -> TypeExpr {
        match op {
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::And
            | BinaryOp::Or => TypeExpr::Bool,
            BinaryOp::Add if *left == TypeExpr::String || *right == TypeExpr::String => {
                TypeExpr::String
            }
            _ if left == &TypeExpr::Error || right == &TypeExpr::Error => TypeExpr::Error,
            _ if left.is_numeric() && right.is_numeric() => {
                if left.is_indeterminate() || right.is_indeterminate() {
                    if op == BinaryOp::Add {
                        TypeExpr::Unknown
                    } else {
                        TypeExpr::Number
                    }
                } else {
                    TypeExpr::Number
                }
            }
            _ => {
                self.warn(
                    format!("operator '{}' cannot combine {} and {}", op.symbol(), left, right),
                    position,
                );
                TypeExpr::Error
            }
        }
    }

    fn infer_kind(&mut self, expr: &Expr) -> Result<TypeExpr, SemanticError> {
        Ok(match &expr.kind {
            ExprKind::Literal(literal) => TypeExpr::of_literal(literal),
            ExprKind::Identifier(name) => self.resolve_read(expr, name)?,
            ExprKind::This | ExprKind::Base => {
                if self.entity_depth == 0 {
                    let (kind, word) = match expr.kind {
                        ExprKind::This => (SemanticErrorKind::ThisOutsideEntity, "this"),
                        _ => (SemanticErrorKind::BaseOutsideEntity, "base"),
                    };
                    return Err(self.error(
                        kind,
                        format!("'{}' used outside of any entity body", word),
                        expr.position,
                    ));
                }
                TypeExpr::Unknown
            }
            ExprKind::External(_) => TypeExpr::Unknown,
            ExprKind::Scoped { namespace, name } => {
                self.infer(namespace)?;
                match &namespace.kind {
                    ExprKind::Identifier(ns) => self
                        .namespaces
                        .get(ns)
                        .and_then(|scope| self.symbols.scope(*scope))
                        .and_then(|scope| scope.get(name))
                        .map(|entry| entry.ty.clone())
                        .unwrap_or(TypeExpr::Unknown),
                    _ => TypeExpr::Unknown,
                }
            }
            ExprKind::Array(items) => {
                let types = items
                    .iter()
                    .map(|item| self.infer(item))
                    .collect::<Result<Vec<_>, _>>()?;
                TypeExpr::Array(Box::new(unify_all(&types)))
            }
            ExprKind::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    self.infer(key)?;
                    values.push(self.infer(value)?);
                }
                TypeExpr::Map(Box::new(unify_all(&values)))
            }
            ExprKind::Tuple(items) => TypeExpr::Tuple(
                items
                    .iter()
                    .map(|item| self.infer(item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ExprKind::Entity(members) => TypeExpr::Entity(self.analyze_members(members)?),
            ExprKind::Extend { base, members } => {
                let base_ty = self.infer(base)?;
                let own = TypeExpr::Entity(self.analyze_members(members)?);
                match base_ty {
                    TypeExpr::Entity(_) => unify(&base_ty, &own).unwrap_or(own),
                    _ => own,
                }
            }
            ExprKind::Construct { members, .. } => TypeExpr::Entity(self.analyze_members(members)?),
            ExprKind::Unary { op, operand } => {
                let ty = self.infer(operand)?;
                match op {
                    UnaryOp::Not => TypeExpr::Bool,
                    _ if ty.is_numeric() => TypeExpr::Number,
                    _ => {
                        self.warn(format!("unary operator expects a number, found {}", ty), expr.position);
                        TypeExpr::Error
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.infer(left)?;
                let r = self.infer(right)?;
                self.binary_type(*op, &l, &r, expr.position)
            }
            ExprKind::TypeTest { value, .. } => {
                self.infer(value)?;
                TypeExpr::Bool
            }
            ExprKind::Update { target, .. } => {
                self.check_place(target, &TypeExpr::Number)?;
                TypeExpr::Number
            }
            ExprKind::Assign { op, target, value } => {
                let value_ty = self.infer(value)?;
                match target {
                    AssignTarget::Place(place) => {
                        let stored = match op.binary() {
                            None => value_ty.clone(),
                            Some(binary) => {
                                let current = self.infer(place)?;
                                self.binary_type(binary, &current, &value_ty, expr.position)
                            }
                        };
                        self.check_place(place, &stored)?;
                        stored
                    }
                    AssignTarget::Pattern(pattern) => {
                        self.check_pattern_assignment(pattern, expr.position)?;
                        value_ty
                    }
                }
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.infer(condition)?;
                let a = self.infer(then_branch)?;
                let b = self.infer(else_branch)?;
                match unify(&a, &b) {
                    Ok(ty) => ty,
                    Err(mismatch) => {
                        self.warn(format!("conditional branches differ: {}", mismatch), expr.position);
                        TypeExpr::Unknown
                    }
                }
            }
            ExprKind::Pipe { value, function } => {
                self.infer(value)?;
                let callee = self.infer(function)?;
                self.call_type(&callee, 1, expr.position)
            }
            ExprKind::Call { callee, args } => {
                let callee_ty = self.infer(callee)?;
                for arg in args {
                    self.infer(arg)?;
                }
                self.call_type(&callee_ty, args.len(), expr.position)
            }
            ExprKind::Member { object, name } => {
                let object_ty = self.infer(object)?;
                object_ty.member(name).cloned().unwrap_or(TypeExpr::Unknown)
            }
            ExprKind::TupleIndex { object, index } => match self.infer(object)? {
                TypeExpr::Tuple(items) => items.get(*index).cloned().unwrap_or(TypeExpr::Unknown),
                _ => TypeExpr::Unknown,
            },
            ExprKind::Index { object, index } => {
                let object_ty = self.infer(object)?;
                self.infer(index)?;
                match object_ty {
                    TypeExpr::Array(inner) | TypeExpr::Map(inner) => *inner,
                    _ => TypeExpr::Unknown,
                }
            }
            ExprKind::Function(def) => self.analyze_function(def)?,
            ExprKind::Block(block) => self.analyze_boundary(block, ScopeKind::Block)?,
            ExprKind::Async(block) => {
                let ty = self.in_async(|this| this.analyze_boundary(block, ScopeKind::Block))?;
                TypeExpr::Promise(Box::new(ty))
            }
            ExprKind::Safe(block) => {
                self.in_async(|this| this.analyze_boundary(block, ScopeKind::Block))?;
                TypeExpr::Unknown
            }
            ExprKind::Lock { key, body } => {
                if let Some(key) = key {
                    self.infer(key)?;
                }
                self.in_async(|this| this.analyze_boundary(body, ScopeKind::Block))?
            }
            ExprKind::Match { scrutinee, arms } => {
                let ty = self.infer(scrutinee)?;
                let mut arm_types = Vec::with_capacity(arms.len());
                for arm in arms {
                    arm_types.push(self.analyze_arm(arm, &ty, true)?);
                }
                unify_all(&arm_types)
            }
        })
    }

    /// Value boundaries stop loop control from crossing them.
    fn in_async<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        let saved = std::mem::replace(&mut self.loop_depth, 0);
        let result = f(self);
        self.loop_depth = saved;
        result
    }

    fn call_type(&mut self, callee: &TypeExpr, argc: usize, position: Position) -> TypeExpr {
        match callee.call_result(argc) {
            Some(ty) => ty,
            None => {
                self.warn(
                    format!("{} called with {} arguments", callee, argc),
                    position,
                );
                TypeExpr::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(source: &str) -> Result<Analysis, SemanticError> {
        let ast = parse("test", source).expect("parse");
        analyze(&ast, &AnalyzerContext::new())
    }

    fn tail_type(source: &str) -> TypeExpr {
        let ast = parse("test", source).expect("parse");
        let analysis = analyze(&ast, &AnalyzerContext::new()).expect("analyze");
        let tail = ast.program.body.tail().expect("tail expression");
        analysis.type_of(tail.id).cloned().expect("typed")
    }

    #[test]
    fn literals_and_arithmetic_are_typed() {
        assert_eq!(tail_type("1 + 2 * 3"), TypeExpr::Number);
        assert_eq!(tail_type("\"a\" + 1"), TypeExpr::String);
        assert_eq!(tail_type("1 < 2"), TypeExpr::Bool);
    }

    #[test]
    fn entity_literal_carries_member_types() {
        let ty = tail_type("{name: \"will\", age: 40}");
        assert_eq!(ty.member("name"), Some(&TypeExpr::String));
        assert_eq!(ty.member("age"), Some(&TypeExpr::Number));
    }

    #[test]
    fn partial_call_types_as_remaining_function() {
        let ty = tail_type("let add = (x, y) => x + y; add(1)");
        assert!(matches!(ty, TypeExpr::Function { ref params, .. } if params.len() == 1));
    }

    #[test]
    fn conditional_mismatch_widens_with_warning() {
        let ast = parse("test", "let b = true; b ? 1 : \"one\"").expect("parse");
        let analysis = analyze(&ast, &AnalyzerContext::new()).expect("analyze");
        let tail = ast.program.body.tail().expect("tail");
        assert_eq!(analysis.type_of(tail.id), Some(&TypeExpr::Unknown));
        assert!(analysis.warnings.iter().any(|w| w.message.contains("differ")));
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let err = run("let a = 1; let a = 2;").expect_err("redeclared");
        assert!(matches!(err.kind, SemanticErrorKind::Redeclared { .. }));
        assert!(run("let a = 1; { let a = 2; a }").is_ok());
    }

    #[test]
    fn this_outside_entity_fails() {
        let err = run("this.age").expect_err("no entity");
        assert_eq!(err.kind, SemanticErrorKind::ThisOutsideEntity);
        assert!(run("let e = {age: 1, older: () => this.age + 1}; e.older()").is_ok());
    }

    #[test]
    fn assignment_to_undeclared_fails() {
        let err = run("missing = 3;").expect_err("undeclared");
        assert_eq!(err.kind, SemanticErrorKind::UndeclaredAssignment);
        assert_eq!(err.position.line, 1);
    }

    #[test]
    fn loop_control_outside_loop_fails() {
        let err = run("break;").expect_err("stray break");
        assert_eq!(err.kind, SemanticErrorKind::LoopControlOutsideLoop);
        assert!(run("while (true) { break; }").is_ok());
        let err = run("while (true) { let f = () => { continue; }; }").expect_err("crosses function");
        assert_eq!(err.kind, SemanticErrorKind::LoopControlOutsideLoop);
    }

    #[test]
    fn unresolved_read_warns_unless_strict() {
        let analysis = run("safe { undeclaredRef() }").expect("lenient");
        assert!(analysis.warnings.iter().any(|w| w.message.contains("undeclaredRef")));

        let ast = parse("test", "undeclaredRef()").expect("parse");
        let err = analyze(&ast, &AnalyzerContext::new().strict(true)).expect_err("strict");
        assert_eq!(err.kind, SemanticErrorKind::Undeclared);
    }

    #[test]
    fn forest_bindings_and_builtins_resolve() {
        let ast = parse("test", "log(ctx.get(\"a\")); ctx").expect("parse");
        let ctx = AnalyzerContext::new().strict(true).with_bindings(["ctx"]);
        let analysis = analyze(&ast, &ctx).expect("bindings resolve");
        let tail = ast.program.body.tail().expect("tail");
        assert_eq!(
            analysis.resolution_of(tail.id).map(|r| r.kind),
            Some(SymbolKind::External)
        );
    }

    #[test]
    fn functions_resolve_siblings_declared_later() {
        let analysis = run("func a() { b() } func b() { 1 } a()").expect("forward reference");
        assert!(analysis.warnings.is_empty());
        assert!(analysis.declares("a"));
        assert!(analysis.declares("b"));
    }

    #[test]
    fn function_return_type_comes_from_tail() {
        let analysis = run("func f(x) { x * 2 }").expect("analyze");
        let scope = analysis.symbols.scope(analysis.module_scope).expect("module scope");
        let entry = scope.get("f").expect("declared");
        assert_eq!(entry.kind, SymbolKind::Function);
        assert_eq!(entry.ty, TypeExpr::function(1, TypeExpr::Number));
    }

    #[test]
    fn imports_must_be_top_level() {
        let err = run("{ import a from m; }").expect_err("nested import");
        assert_eq!(err.kind, SemanticErrorKind::MisplacedModuleItem);
    }
}

//=====================================================
// End of file
//=====================================================
