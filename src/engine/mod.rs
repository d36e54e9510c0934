//=====================================================
// File: engine/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Host embedding API
// Objective: Own the worker pool and forest bindings, load scripts into
//            environments, and expose script entities as host objects
//=====================================================

pub mod env;
pub mod proxy;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineOptions;
use crate::forest::{Forest, ForestBuilder};
use crate::interop::{BindingError, Bindings, FitBroker, HostClass, HostObject, HostValue, HttpMethod};
use crate::interpreter::{OhPanic, PanicCode, ScriptError, TaskPool, Value};

pub use env::Environment;
pub use proxy::{InterfaceShape, ScriptProxy};

/// Module name used for single-source loads.
pub const DEFAULT_MODULE: &str = "main";

//=====================================================
//            Section 1: Engine
//=====================================================

/// Entry point for hosts: grants bindings, builds forests, creates environments.
pub struct Engine {
    pool: Arc<TaskPool>,
    options: EngineOptions,
    bindings: Bindings,
    broker: Option<Arc<dyn FitBroker>>,
}

impl Engine {
    pub fn new() -> Result<Self, ScriptError> {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Result<Self, ScriptError> {
        let pool = TaskPool::new(&options)?;
        Ok(Self {
            pool: Arc::new(pool),
            options,
            bindings: Bindings::new(),
            broker: None,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn grant_object(&mut self, alias: impl Into<String>, value: impl Into<HostValue>) {
        self.bindings.bind_object(alias, value);
    }

    pub fn grant_class(&mut self, alias: impl Into<String>, class: Arc<dyn HostClass>) -> Result<(), BindingError> {
        self.bindings.bind_class(alias, class)
    }

    pub fn grant_remote(&mut self, alias: impl Into<String>, genericable_id: impl Into<String>, arity: usize) {
        self.bindings.bind_fit(alias, genericable_id, arity);
    }

    pub fn grant_http(&mut self, alias: impl Into<String>, url: impl Into<String>, method: HttpMethod) {
        self.bindings.bind_http(alias, url, method);
    }

    pub fn set_broker(&mut self, broker: Arc<dyn FitBroker>) {
        self.broker = Some(broker);
    }

    fn forest_builder(&self) -> ForestBuilder {
        ForestBuilder::begin()
            .with_bindings(self.bindings.clone())
            .strict(self.options.strict_identifiers)
    }

    //Function: load
    //Purpose: Build a single-module environment from `source`
    //Inputs: source: &str
    //Returns: Result<Environment, ScriptError>
    pub fn load(&self, source: &str) -> Result<Environment, ScriptError> {
        let mut builder = self.forest_builder();
        builder.parse(DEFAULT_MODULE, source)?;
        let forest = Arc::new(builder.done()?);
        Ok(self.environment(forest, Some(DEFAULT_MODULE.to_string())))
    }

    /// One-shot `load` plus `execute`.
    pub fn execute(&self, source: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        Ok(self.load(source)?.execute(args)?)
    }

    pub fn begin(&self) -> ScriptBuilder<'_> {
        ScriptBuilder {
            engine: self,
            builder: Some(self.forest_builder()),
            forest: None,
            last: None,
        }
    }

    /// Fresh environment over a linked forest.
    pub fn environment(&self, forest: Arc<Forest>, entry: Option<String>) -> Environment {
        Environment::new(
            Arc::clone(&self.pool),
            forest,
            self.options.clone(),
            self.broker.clone(),
            entry,
        )
    }

    //Function: implement
    //Purpose: Run `source` to an entity and wrap it behind `shape`
    //Inputs: shape, source
    //Returns: Result<ScriptProxy, ScriptError>
    pub fn implement(&self, shape: InterfaceShape, source: &str) -> Result<ScriptProxy, ScriptError> {
        self.proxy(shape, source, None)
    }

    /// Like `implement`, with `default` answering methods the script leaves out.
    pub fn extend(
        &self,
        shape: InterfaceShape,
        default: Arc<dyn HostObject>,
        source: &str,
    ) -> Result<ScriptProxy, ScriptError> {
        self.proxy(shape, source, Some(default))
    }

    fn proxy(
        &self,
        shape: InterfaceShape,
        source: &str,
        fallback: Option<Arc<dyn HostObject>>,
    ) -> Result<ScriptProxy, ScriptError> {
        let env = self.load(source)?;
        let entity = match env.execute(Vec::new())? {
            Value::Entity(entity) => entity,
            other => {
                return Err(OhPanic::new(
                    PanicCode::TYPE_MISMATCH,
                    format!("{} must be implemented by an entity, found {}", shape.name(), other.type_name()),
                )
                .into())
            }
        };
        debug!(target: "ohscript::engine", interface = shape.name(), "script proxy created");
        Ok(ScriptProxy::new(shape, entity, env, fallback))
    }
}

//=====================================================
//            Section 2: Script Builder
//=====================================================

/// Multi-module loading: `load` each module, `done` to link, then `new_env`.
pub struct ScriptBuilder<'e> {
    engine: &'e Engine,
    builder: Option<ForestBuilder>,
    forest: Option<Arc<Forest>>,
    last: Option<String>,
}

impl ScriptBuilder<'_> {
    fn pending(&mut self) -> Result<&mut ForestBuilder, ScriptError> {
        self.builder.as_mut().ok_or_else(|| {
            OhPanic::new(PanicCode::INVALID_OPERATION, "forest is already linked").into()
        })
    }

    pub fn load(&mut self, name: &str, source: &str) -> Result<&mut Self, ScriptError> {
        self.pending()?.parse(name, source)?;
        self.last = Some(name.to_string());
        Ok(self)
    }

    pub fn load_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<&mut Self, ScriptError> {
        self.pending()?.parse_file(name, path)?;
        self.last = Some(name.to_string());
        Ok(self)
    }

    pub fn done(&mut self) -> Result<Arc<Forest>, ScriptError> {
        if let Some(forest) = &self.forest {
            return Ok(Arc::clone(forest));
        }
        let builder = self.builder.take().ok_or_else(|| {
            OhPanic::new(PanicCode::INVALID_OPERATION, "forest failed to link earlier")
        })?;
        let forest = Arc::new(builder.done()?);
        self.forest = Some(Arc::clone(&forest));
        Ok(forest)
    }

    /// Environment over the linked forest; `execute` runs the last loaded module.
    pub fn new_env(&mut self) -> Result<Environment, ScriptError> {
        let forest = self.done()?;
        Ok(self.engine.environment(forest, self.last.clone()))
    }
}

//=====================================================
// End of file
//=====================================================
