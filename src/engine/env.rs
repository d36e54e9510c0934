//=====================================================
// File: engine/env.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Execution environments
// Objective: Pair a linked forest with per-environment grants and run its
//            modules on the engine's worker pool
//=====================================================

use std::sync::Arc;

use tracing::debug;

use crate::config::EngineOptions;
use crate::forest::Forest;
use crate::interop::{BindingError, FitBroker, HostClass, HostValue, HttpMethod};
use crate::interpreter::{OhPanic, PanicCode, Runtime, TaskPool, Value};

/// One execution context over a forest. Grants made here shadow the
/// forest's bindings without changing them.
pub struct Environment {
    runtime: Arc<Runtime>,
    entry: Option<String>,
    _pool: Arc<TaskPool>,
}

impl Environment {
    pub(crate) fn new(
        pool: Arc<TaskPool>,
        forest: Arc<Forest>,
        options: EngineOptions,
        broker: Option<Arc<dyn FitBroker>>,
        entry: Option<String>,
    ) -> Self {
        let runtime = Runtime::new(forest, options, pool.handle());
        runtime.set_broker(broker);
        Self {
            runtime,
            entry,
            _pool: pool,
        }
    }

    pub fn forest(&self) -> &Arc<Forest> {
        self.runtime.forest()
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn grant_object(&self, alias: impl Into<String>, value: impl Into<HostValue>) {
        self.runtime.grants().write().bind_object(alias, value);
    }

    pub fn grant_class(&self, alias: impl Into<String>, class: Arc<dyn HostClass>) -> Result<(), BindingError> {
        self.runtime.grants().write().bind_class(alias, class)
    }

    pub fn grant_remote(&self, alias: impl Into<String>, genericable_id: impl Into<String>, arity: usize) {
        self.runtime.grants().write().bind_fit(alias, genericable_id, arity);
    }

    pub fn grant_http(&self, alias: impl Into<String>, url: impl Into<String>, method: HttpMethod) {
        self.runtime.grants().write().bind_http(alias, url, method);
    }

    pub fn set_broker(&self, broker: Arc<dyn FitBroker>) {
        self.runtime.set_broker(Some(broker));
    }

    //Function: execute
    //Purpose: Run the entry module with `args`
    //Inputs: args: Vec<Value>
    //Returns: Result<Value, OhPanic>
    pub fn execute(&self, args: Vec<Value>) -> Result<Value, OhPanic> {
        let entry = self
            .entry
            .clone()
            .or_else(|| self.forest().modules().last().map(|module| module.name().to_string()))
            .ok_or_else(|| OhPanic::new(PanicCode::INVALID_OPERATION, "environment has no modules"))?;
        self.execute_module(&entry, args)
    }

    /// Run module `name`; the modules it imports are initialised once per environment.
    pub fn execute_module(&self, name: &str, args: Vec<Value>) -> Result<Value, OhPanic> {
        let result = self.runtime.execute_module(name, args);
        debug!(target: "ohscript::engine", module = name, ok = result.is_ok(), "execution finished");
        result
    }
}

//=====================================================
// End of file
//=====================================================
