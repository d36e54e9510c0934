//=====================================================
// File: forest/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Abstract syntax forest
// Objective: Register analysed modules under unique names, link their
//            imports and exports, hold forest-wide host bindings, and
//            serialise the whole forest with bincode
//=====================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::analyzer::{analyze, Analysis, AnalyzerContext, Diagnostic};
use crate::ast::Ast;
use crate::interop::{Bindings, RemoteSpec};
use crate::interpreter::ScriptError;
use crate::parser::parse;
use crate::symbol::{SymbolEntry, SymbolKind, SymbolTable};
use crate::analyzer::types::TypeExpr;
use crate::tokenizer::Position;

//=====================================================
//            Section 1: Link Errors
//=====================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("module '{0}' is registered twice")]
    DuplicateModule(String),
    #[error("{importer}:{position}: no module named '{module}'")]
    UnknownModule {
        importer: String,
        module: String,
        position: Position,
    },
    #[error("{importer}:{position}: '{name}' is not exported by '{module}'")]
    NotExported {
        importer: String,
        module: String,
        name: String,
        position: Position,
    },
    #[error("{module}:{position}: export of undeclared '{name}'")]
    UndeclaredExport {
        module: String,
        name: String,
        position: Position,
    },
    #[error("import cycle: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),
}

//=====================================================
//            Section 2: Forest
//=====================================================

/// One registered module: its tree and the analysis made when it was added.
#[derive(Debug, Clone)]
pub struct Module {
    pub ast: Arc<Ast>,
    pub analysis: Analysis,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.ast.module
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.analysis.warnings
    }

    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.ast.program.exports().map(|(name, _)| name)
    }
}

/// Linked set of modules sharing one binding table.
#[derive(Debug)]
pub struct Forest {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
    bindings: Bindings,
    root: SymbolTable,
}

#[derive(Serialize, Deserialize)]
struct ForestImage {
    modules: Vec<Ast>,
    remotes: Vec<(String, RemoteSpec)>,
}

impl Forest {
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.index.get(name).map(|at| &self.modules[*at])
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Root scope naming every forest binding.
    pub fn root_scope(&self) -> &SymbolTable {
        &self.root
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &Diagnostic)> {
        self.modules
            .iter()
            .flat_map(|module| module.warnings().iter().map(move |w| (module.name(), w)))
    }

    //Function: to_bytes
    //Purpose: Serialise the module trees and remote aliases
    //Inputs: &self
    //Returns: Result<Vec<u8>, ScriptError> (host objects and classes are left out)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScriptError> {
        let image = ForestImage {
            modules: self.modules.iter().map(|module| (*module.ast).clone()).collect(),
            remotes: self.bindings.remotes(),
        };
        Ok(bincode::serialize(&image)?)
    }

    /// Rebuild a forest from `to_bytes` output; modules are analysed and linked again.
    pub fn from_bytes(bytes: &[u8], strict: bool) -> Result<Forest, ScriptError> {
        let image: ForestImage = bincode::deserialize(bytes)?;
        let mut bindings = Bindings::new();
        bindings.restore_remotes(image.remotes);
        let mut builder = ForestBuilder::begin().with_bindings(bindings).strict(strict);
        for ast in image.modules {
            builder.add_ast(ast)?;
        }
        builder.done()
    }

    //Function: link
    //Purpose: Check every import against the exporter and reject cycles
    //Inputs: &self
    //Returns: Result<(), LinkError>
    pub fn link(&self) -> Result<(), LinkError> {
        for module in &self.modules {
            for (name, position) in module.ast.program.exports() {
                if !module.analysis.declares(name) {
                    return Err(LinkError::UndeclaredExport {
                        module: module.name().to_string(),
                        name: name.to_string(),
                        position,
                    });
                }
            }
        }
        for module in &self.modules {
            for (items, from, position) in module.ast.program.imports() {
                let exporter = self.module(from).ok_or_else(|| LinkError::UnknownModule {
                    importer: module.name().to_string(),
                    module: from.to_string(),
                    position,
                })?;
                for item in items {
                    if !exporter.exports().any(|name| name == item.name) {
                        return Err(LinkError::NotExported {
                            importer: module.name().to_string(),
                            module: from.to_string(),
                            name: item.name.clone(),
                            position,
                        });
                    }
                }
            }
        }
        let mut state = vec![Visit::Fresh; self.modules.len()];
        for at in 0..self.modules.len() {
            self.visit(at, &mut state, &mut Vec::new())?;
        }
        debug!(target: "ohscript::forest", modules = self.modules.len(), "forest linked");
        Ok(())
    }

    fn visit(&self, at: usize, state: &mut [Visit], path: &mut Vec<String>) -> Result<(), LinkError> {
        let module = &self.modules[at];
        match state[at] {
            Visit::Done => return Ok(()),
            Visit::Active => {
                let start = path.iter().position(|name| name == module.name()).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(module.name().to_string());
                return Err(LinkError::ImportCycle(cycle));
            }
            Visit::Fresh => {}
        }
        state[at] = Visit::Active;
        path.push(module.name().to_string());
        for (_, from, _) in module.ast.program.imports() {
            if let Some(next) = self.index.get(from) {
                self.visit(*next, state, path)?;
            }
        }
        path.pop();
        state[at] = Visit::Done;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Visit {
    Fresh,
    Active,
    Done,
}

//=====================================================
//            Section 3: Forest Builder
//=====================================================

/// Collects modules, then links them into a `Forest`.
#[derive(Default)]
pub struct ForestBuilder {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
    bindings: Bindings,
    strict: bool,
}

impl ForestBuilder {
    pub fn begin() -> Self {
        Self::default()
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn context(&self) -> AnalyzerContext {
        AnalyzerContext::new()
            .with_bindings(self.bindings.names())
            .strict(self.strict)
    }

    /// Parse and analyse `source` as module `name`. Nothing is registered on failure.
    pub fn parse(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        if self.index.contains_key(name) {
            return Err(LinkError::DuplicateModule(name.to_string()).into());
        }
        let ast = parse(name, source)?;
        self.add_ast(ast)
    }

    pub fn parse_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(name, &source)
    }

    pub fn add_ast(&mut self, ast: Ast) -> Result<(), ScriptError> {
        if self.index.contains_key(&ast.module) {
            return Err(LinkError::DuplicateModule(ast.module).into());
        }
        let analysis = analyze(&ast, &self.context())?;
        debug!(target: "ohscript::forest", module = %ast.module, warnings = analysis.warnings.len(), "module registered");
        self.index.insert(ast.module.clone(), self.modules.len());
        self.modules.push(Module {
            ast: Arc::new(ast),
            analysis,
        });
        Ok(())
    }

    pub fn done(self) -> Result<Forest, ScriptError> {
        let mut root = SymbolTable::new();
        for name in self.bindings.names() {
            root.define(
                SymbolTable::ROOT,
                SymbolEntry::new(name, SymbolKind::External, TypeExpr::Unknown, Position::default()),
            );
        }
        let forest = Forest {
            modules: self.modules,
            index: self.index,
            bindings: self.bindings,
            root,
        };
        forest.link()?;
        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::HttpMethod;

    fn forest(modules: &[(&str, &str)]) -> Result<Forest, ScriptError> {
        let mut builder = ForestBuilder::begin();
        for (name, source) in modules {
            builder.parse(name, source)?;
        }
        builder.done()
    }

    #[test]
    fn links_exported_names() {
        let forest = forest(&[
            ("m", "var a = 100; func f(){a} export a, f;"),
            ("main", "import a as b, f from m; b + f()"),
        ])
        .expect("links");
        assert_eq!(forest.modules().len(), 2);
        assert!(forest.module("m").is_some_and(|m| m.exports().count() == 2));
    }

    #[test]
    fn missing_export_is_a_link_error() {
        let err = forest(&[("m", "var a = 1; export a;"), ("main", "import z from m; z")]).expect_err("unexported");
        assert!(matches!(err, ScriptError::Link(LinkError::NotExported { .. })));
        let err = forest(&[("main", "import z from nowhere; z")]).expect_err("unknown");
        assert!(matches!(err, ScriptError::Link(LinkError::UnknownModule { .. })));
    }

    #[test]
    fn exporting_undeclared_names_fails() {
        let err = forest(&[("m", "export ghost;")]).expect_err("undeclared");
        assert!(matches!(err, ScriptError::Link(LinkError::UndeclaredExport { .. })));
    }

    #[test]
    fn cycles_are_rejected() {
        let err = forest(&[
            ("a", "import y from b; var x = 1; export x;"),
            ("b", "import x from a; var y = 2; export y;"),
        ])
        .expect_err("cycle");
        let ScriptError::Link(LinkError::ImportCycle(path)) = err else {
            panic!("expected a cycle");
        };
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn failed_parse_registers_nothing() {
        let mut builder = ForestBuilder::begin();
        assert!(builder.parse("m", "let = ;").is_err());
        builder.parse("m", "let a = 1;").expect("retry with the same name");
        assert!(matches!(
            builder.parse("m", "let b = 2;"),
            Err(ScriptError::Link(LinkError::DuplicateModule(_)))
        ));
    }

    #[test]
    fn bytes_keep_modules_and_remotes() {
        let mut bindings = Bindings::new();
        bindings.bind_http("fetch", "http://localhost/api", HttpMethod::Get);
        let mut builder = ForestBuilder::begin().with_bindings(bindings);
        builder.parse("main", "let a = 1; a").expect("parse");
        let bytes = builder.done().expect("link").to_bytes().expect("encode");
        let restored = Forest::from_bytes(&bytes, false).expect("decode");
        assert!(restored.module("main").is_some());
        assert!(restored.bindings().contains("fetch"));
        assert!(restored.root_scope().scope(SymbolTable::ROOT).and_then(|s| s.get("fetch")).is_some());
    }
}

//=====================================================
// End of file
//=====================================================
