//=====================================================
// File: interop/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Host interop surface
// Objective: Define the values, object/class traits, and named bindings
//            through which a host hands objects, classes, and remote
//            endpoints to scripts
//=====================================================

pub mod collections;
pub mod remote;
pub mod util;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::grammar::is_class_name;

pub use collections::{HostList, HostMap};
pub use remote::{FitBroker, HttpMethod};

//=====================================================
//            Section 1: Host Values
//=====================================================

/// Data crossing the script boundary in either direction.
#[derive(Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<HostValue>),
    /// Insertion ordered.
    Map(Vec<(String, HostValue)>),
    Object(Arc<dyn HostObject>),
}

impl HostValue {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        HostValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn object(object: impl HostObject + 'static) -> Self {
        HostValue::Object(Arc::new(object))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn type_name(&self) -> &str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::List(_) => "list",
            HostValue::Map(_) => "map",
            HostValue::Object(object) => object.type_name(),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Number(n) => write!(f, "Number({})", n),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::List(items) => f.debug_tuple("List").field(items).finish(),
            HostValue::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            HostValue::Object(object) => write!(f, "Object(<{}>)", object.type_name()),
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(f64::from(value))
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(value: Vec<T>) -> Self {
        HostValue::List(value.into_iter().map(Into::into).collect())
    }
}

//=====================================================
//            Section 2: Host Objects & Classes
//=====================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{type_name} has no method '{method}'")]
    NoSuchMethod { type_name: String, method: String },
    #[error("{type_name} has no property '{property}'")]
    NoSuchProperty { type_name: String, property: String },
    #[error("'{method}' expects {expected} arguments, got {found}")]
    ArgumentMismatch {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("'{0}' is not implemented")]
    NotImplemented(String),
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn no_such_method(type_name: &str, method: &str) -> Self {
        HostError::NoSuchMethod {
            type_name: type_name.to_string(),
            method: method.to_string(),
        }
    }

    pub fn check_arity(method: &str, expected: usize, args: &[HostValue]) -> Result<(), HostError> {
        if args.len() == expected {
            return Ok(());
        }
        Err(HostError::ArgumentMismatch {
            method: method.to_string(),
            expected,
            found: args.len(),
        })
    }
}

/// An object owned by the host and driven by scripts.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &str;

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError>;

    /// Declared parameter count; calls with fewer arguments curry.
    fn method_arity(&self, _name: &str) -> Option<usize> {
        None
    }

    fn has_method(&self, name: &str) -> bool {
        self.method_arity(name).is_some()
    }

    fn get_property(&self, _name: &str) -> Option<HostValue> {
        None
    }

    fn set_property(&self, name: &str, _value: HostValue) -> Result<(), HostError> {
        Err(HostError::NoSuchProperty {
            type_name: self.type_name().to_string(),
            property: name.to_string(),
        })
    }
}

/// A host type scripts may instantiate with `Name{...}` or call statically.
pub trait HostClass: Send + Sync {
    fn name(&self) -> &str;

    /// Build an instance from the non-function fields of the literal.
    fn construct(&self, fields: Vec<(String, HostValue)>) -> Result<Arc<dyn HostObject>, HostError>;

    fn call_static(&self, method: &str, _args: Vec<HostValue>) -> Result<HostValue, HostError> {
        Err(HostError::no_such_method(self.name(), method))
    }
}

//=====================================================
//            Section 3: Bindings
//=====================================================

/// Serializable description of a remote endpoint alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteSpec {
    Fit {
        genericable_id: String,
        arity: usize,
    },
    Http {
        url: String,
        method: HttpMethod,
    },
}

#[derive(Clone)]
pub enum Binding {
    Object(HostValue),
    Class(Arc<dyn HostClass>),
    Remote(RemoteSpec),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Object(value) => f.debug_tuple("Object").field(value).finish(),
            Binding::Class(class) => write!(f, "Class({})", class.name()),
            Binding::Remote(spec) => f.debug_tuple("Remote").field(spec).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("class alias '{0}' must start with an uppercase letter")]
    ClassAlias(String),
}

/// Alias table for external names visible to scripts.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: HashMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_object(&mut self, alias: impl Into<String>, value: impl Into<HostValue>) {
        self.entries.insert(alias.into(), Binding::Object(value.into()));
    }

    pub fn bind_class(
        &mut self,
        alias: impl Into<String>,
        class: Arc<dyn HostClass>,
    ) -> Result<(), BindingError> {
        let alias = alias.into();
        if !is_class_name(&alias) {
            return Err(BindingError::ClassAlias(alias));
        }
        self.entries.insert(alias, Binding::Class(class));
        Ok(())
    }

    pub fn bind_fit(&mut self, alias: impl Into<String>, genericable_id: impl Into<String>, arity: usize) {
        self.entries.insert(
            alias.into(),
            Binding::Remote(RemoteSpec::Fit {
                genericable_id: genericable_id.into(),
                arity,
            }),
        );
    }

    pub fn bind_http(&mut self, alias: impl Into<String>, url: impl Into<String>, method: HttpMethod) {
        self.entries.insert(
            alias.into(),
            Binding::Remote(RemoteSpec::Http {
                url: url.into(),
                method,
            }),
        );
    }

    pub fn resolve(&self, alias: &str) -> Option<&Binding> {
        self.entries.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remote aliases, the only bindings that survive serialization.
    pub fn remotes(&self) -> Vec<(String, RemoteSpec)> {
        let mut remotes: Vec<(String, RemoteSpec)> = self
            .entries
            .iter()
            .filter_map(|(alias, binding)| match binding {
                Binding::Remote(spec) => Some((alias.clone(), spec.clone())),
                _ => None,
            })
            .collect();
        remotes.sort_by(|a, b| a.0.cmp(&b.0));
        remotes
    }

    pub fn restore_remotes(&mut self, remotes: Vec<(String, RemoteSpec)>) {
        for (alias, spec) in remotes {
            self.entries.insert(alias, Binding::Remote(spec));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point;

    impl HostClass for Point {
        fn name(&self) -> &str {
            "Point"
        }

        fn construct(&self, fields: Vec<(String, HostValue)>) -> Result<Arc<dyn HostObject>, HostError> {
            Ok(Arc::new(HostMap::from_entries(fields)))
        }
    }

    #[test]
    fn class_aliases_must_be_capitalised() {
        let mut bindings = Bindings::new();
        assert!(bindings.bind_class("Point", Arc::new(Point)).is_ok());
        assert_eq!(
            bindings.bind_class("point", Arc::new(Point)),
            Err(BindingError::ClassAlias("point".into()))
        );
    }

    #[test]
    fn only_remotes_are_exported_for_serialization() {
        let mut bindings = Bindings::new();
        bindings.bind_object("context", HostValue::map([("a", HostValue::from(1))]));
        bindings.bind_fit("add", "math.add", 2);
        bindings.bind_http("ping", "http://localhost/ping", HttpMethod::Get);
        let remotes = bindings.remotes();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].0, "add");

        let mut restored = Bindings::new();
        restored.restore_remotes(remotes);
        assert!(restored.contains("ping"));
        assert!(!restored.contains("context"));
    }

    #[test]
    fn host_values_compare_objects_by_identity() {
        let shared = HostValue::object(HostList::new());
        assert_eq!(shared, shared.clone());
        assert_ne!(shared, HostValue::object(HostList::new()));
        assert_eq!(HostValue::from(vec![1, 2]), HostValue::List(vec![1.into(), 2.into()]));
    }
}

//=====================================================
// End of file
//=====================================================
