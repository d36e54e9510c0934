//=====================================================
// File: symbol/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Symbol names and lexical scope tree
// Objective: Provide the Symbol newtype and an arena of scopes the analyzer
//            declares into and resolves against
//=====================================================

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::analyzer::types::TypeExpr;
use crate::tokenizer::Position;

//=====================================================
//            Section 1: Symbol Names
//=====================================================

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// `_`-prefixed entity members are private to their entity.
    pub fn is_private(&self) -> bool {
        self.0.starts_with('_')
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol(value)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=====================================================
//            Section 2: Scope Tree
//=====================================================

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Root,
    Module,
    Block,
    Function,
    Entity,
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
    Member,
    Import,
    Namespace,
    /// Host object, class, or remote alias bound on the forest.
    External,
    Builtin,
    /// Placeholder for a name nothing declared; resolved at run time.
    Unknown,
    /// Declared, but its initializer failed to type.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: Symbol,
    pub kind: SymbolKind,
    pub mutable: bool,
    pub ty: TypeExpr,
    pub declared_at: Position,
}

impl SymbolEntry {
    pub fn new(name: impl Into<Symbol>, kind: SymbolKind, ty: TypeExpr, declared_at: Position) -> Self {
        Self {
            name: name.into(),
            kind,
            mutable: true,
            ty,
            declared_at,
        }
    }
}

/// Where an identifier resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    pub scope: ScopeId,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    entries: HashMap<Symbol, SymbolEntry>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Existing declaration that a new one collided with.
#[derive(Debug, Clone, PartialEq)]
pub struct Redeclared {
    pub name: Symbol,
    pub previous: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub const ROOT: ScopeId = 0;

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Root,
                entries: HashMap::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            entries: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id)
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes.get(id).and_then(|scope| scope.parent)
    }

    //Function: declare
    //Purpose: Add an entry to one scope, rejecting duplicates in that scope
    //Inputs: scope: ScopeId, entry: SymbolEntry
    //Returns: Result<(), Redeclared>
    pub fn declare(&mut self, scope: ScopeId, entry: SymbolEntry) -> Result<(), Redeclared> {
        let Some(target) = self.scopes.get_mut(scope) else {
            return Ok(());
        };
        if let Some(existing) = target.entries.get(entry.name.as_str()) {
            return Err(Redeclared {
                name: entry.name,
                previous: existing.declared_at,
            });
        }
        target.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Insert or replace without the duplicate check.
    pub fn define(&mut self, scope: ScopeId, entry: SymbolEntry) {
        if let Some(target) = self.scopes.get_mut(scope) {
            target.entries.insert(entry.name.clone(), entry);
        }
    }

    /// Walk from `scope` outward to the root; the innermost match wins.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &SymbolEntry)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id)?;
            if let Some(entry) = scope.entries.get(name) {
                return Some((id, entry));
            }
            current = scope.parent;
        }
        None
    }

    pub fn lookup_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut SymbolEntry> {
        let (found, _) = self.lookup(scope, name)?;
        self.scopes.get_mut(found)?.entries.get_mut(name)
    }

    /// Nearest enclosing scope of `kind`, including `scope` itself.
    pub fn enclosing(&self, scope: ScopeId, kind: ScopeKind) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id)?;
            if scope.kind == kind {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, line: usize) -> SymbolEntry {
        SymbolEntry::new(
            name,
            SymbolKind::Variable,
            TypeExpr::Number,
            Position::new(line, 1, 0),
        )
    }

    #[test]
    fn innermost_declaration_wins() {
        let mut table = SymbolTable::new();
        let module = table.push_scope(SymbolTable::ROOT, ScopeKind::Module);
        let block = table.push_scope(module, ScopeKind::Block);
        table.declare(module, entry("a", 1)).expect("outer");
        table.declare(block, entry("a", 2)).expect("shadow");

        let (scope, found) = table.lookup(block, "a").expect("resolves");
        assert_eq!(scope, block);
        assert_eq!(found.declared_at.line, 2);
        assert_eq!(table.lookup(module, "a").map(|(s, _)| s), Some(module));
    }

    #[test]
    fn redeclaration_reports_previous_position() {
        let mut table = SymbolTable::new();
        let module = table.push_scope(SymbolTable::ROOT, ScopeKind::Module);
        table.declare(module, entry("x", 3)).expect("first");
        let err = table.declare(module, entry("x", 7)).expect_err("duplicate");
        assert_eq!(err.name.as_str(), "x");
        assert_eq!(err.previous.line, 3);
    }

    #[test]
    fn enclosing_finds_entity_scope() {
        let mut table = SymbolTable::new();
        let module = table.push_scope(SymbolTable::ROOT, ScopeKind::Module);
        let entity = table.push_scope(module, ScopeKind::Entity);
        let func = table.push_scope(entity, ScopeKind::Function);
        assert_eq!(table.enclosing(func, ScopeKind::Entity), Some(entity));
        assert_eq!(table.enclosing(module, ScopeKind::Entity), None);
    }

    #[test]
    fn private_names_start_with_underscore() {
        assert!(Symbol::from("_secret").is_private());
        assert!(!Symbol::from("open").is_private());
    }
}

//=====================================================
// End of file
//=====================================================
