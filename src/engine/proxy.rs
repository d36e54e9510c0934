//=====================================================
// File: engine/proxy.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Script-backed host objects
// Objective: Let host code call methods declared by an interface shape and
//            route each call to the script entity, its host instance, or a
//            default object
//=====================================================

use std::fmt;
use std::sync::Arc;

use super::env::Environment;
use crate::interop::{HostError, HostObject, HostValue};
use crate::interpreter::{EntityRef, Value};

/// Method names a proxy is allowed to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceShape {
    name: String,
    methods: Vec<String>,
}

impl InterfaceShape {
    pub fn new<I, S>(name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }
}

/// Host-side facade over a script entity.
pub struct ScriptProxy {
    shape: InterfaceShape,
    entity: EntityRef,
    env: Environment,
    fallback: Option<Arc<dyn HostObject>>,
}

impl ScriptProxy {
    pub(crate) fn new(
        shape: InterfaceShape,
        entity: EntityRef,
        env: Environment,
        fallback: Option<Arc<dyn HostObject>>,
    ) -> Self {
        Self {
            shape,
            entity,
            env,
            fallback,
        }
    }

    pub fn shape(&self) -> &InterfaceShape {
        &self.shape
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    fn call_script(&self, method: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let args = args.into_iter().map(Value::from_host).collect();
        self.env
            .runtime()
            .invoke_method(self.entity.clone(), method, args)
            .and_then(|value| value.to_host())
            .map_err(|panic| HostError::Failed(panic.to_string()))
    }
}

impl HostObject for ScriptProxy {
    fn type_name(&self) -> &str {
        self.shape.name()
    }

    //Function: call_method
    //Purpose: Route a host call through script members, then the host
    //         instance, then the default object
    //Inputs: method, args
    //Returns: Result<HostValue, HostError>
    fn call_method(&self, method: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        if !self.shape.declares(method) {
            return Err(HostError::no_such_method(self.shape.name(), method));
        }
        if self.entity.method(method).is_some() {
            return self.call_script(method, args);
        }
        if let Some(host) = self.entity.host() {
            return host.call_method(method, args);
        }
        match &self.fallback {
            Some(fallback) => fallback.call_method(method, args),
            None => Err(HostError::NotImplemented(format!("{}.{}", self.shape.name(), method))),
        }
    }

    fn has_method(&self, name: &str) -> bool {
        self.shape.declares(name)
    }

    fn get_property(&self, name: &str) -> Option<HostValue> {
        match self.entity.get(name)? {
            Value::Function(_) => None,
            value => value.to_host().ok(),
        }
    }
}

impl fmt::Debug for ScriptProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProxy")
            .field("shape", &self.shape)
            .field("entity", &self.entity)
            .finish()
    }
}

//=====================================================
// End of file
//=====================================================
