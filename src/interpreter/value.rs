//=====================================================
// File: interpreter/value.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime value model
// Objective: Define script values, callables, ordered maps, equality,
//            truthiness, display, and marshalling to and from host values
//=====================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::async_control::Promise;
use super::entity::EntityRef;
use super::errors::{EvalResult, OhPanic};
use super::frame::Frame;
use super::Interpreter;
use crate::ast::{FunctionDef, TypeName};
use crate::interop::{HostClass, HostObject, HostValue, RemoteSpec};

const DISPLAY_DEPTH: usize = 8;

//=====================================================
//            Section 1: Values
//=====================================================

#[derive(Clone)]
pub enum Value {
    Null,
    Unit,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<RwLock<Vec<Value>>>),
    Tuple(Arc<[Value]>),
    Map(Arc<RwLock<OhMap>>),
    Entity(EntityRef),
    Function(Arc<Callable>),
    External(Arc<dyn HostObject>),
    Class(Arc<dyn HostClass>),
    Promise(Arc<Promise>),
    Safe(Arc<Result<Value, OhPanic>>),
    Namespace(Arc<Frame>),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Arc::from(text.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::from(items))
    }

    pub fn map(map: OhMap) -> Self {
        Value::Map(Arc::new(RwLock::new(map)))
    }

    pub fn function(callable: Callable) -> Self {
        Value::Function(Arc::new(callable))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Entity(_) => "object",
            Value::Function(_) => "function",
            Value::External(_) => "external",
            Value::Class(_) => "class",
            Value::Promise(_) => "promise",
            Value::Safe(_) => "safe",
            Value::Namespace(_) => "namespace",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null | Value::Unit => false,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    //Function: equals
    //Purpose: Script `==`; structural for aggregates, identity for entities
    //Inputs: other: &Value
    //Returns: bool
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read().clone(), b.read().clone());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read().clone(), b.read().clone());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| b.get(key).is_some_and(|other| value.equals(other)))
            }
            (Value::Entity(a), Value::Entity(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::External(a), Value::External(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Arc::ptr_eq(a, b),
            (Value::Safe(a), Value::Safe(b)) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `value <: type`
    pub fn satisfies(&self, type_name: TypeName) -> bool {
        matches!(
            (type_name, self),
            (TypeName::Number, Value::Number(_))
                | (TypeName::String, Value::String(_))
                | (TypeName::Bool, Value::Bool(_))
                | (TypeName::Unit, Value::Unit)
                | (TypeName::Null, Value::Null)
                | (TypeName::Array, Value::Array(_))
                | (TypeName::Tuple, Value::Tuple(_))
                | (TypeName::Map, Value::Map(_))
                | (TypeName::Object, Value::Entity(_))
                | (TypeName::Function, Value::Function(_))
                | (TypeName::Promise, Value::Promise(_))
                | (TypeName::External, Value::External(_))
        )
    }

    /// Elements a positional pattern or `each` walks over.
    pub fn positional(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(items) => Some(items.to_vec()),
            Value::Array(items) => Some(items.read().clone()),
            Value::Entity(entity) => Some(entity.members().into_iter().map(|(_, v)| v).collect()),
            _ => None,
        }
    }

    /// Key used when a value indexes a map.
    pub fn key_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

//=====================================================
//            Section 2: Ordered Maps
//=====================================================

/// String-keyed map that iterates in insertion order.
#[derive(Clone, Default)]
pub struct OhMap {
    entries: Vec<(String, Value)>,
}

impl OhMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let at = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(at).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for OhMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = OhMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

//=====================================================
//            Section 3: Callables
//=====================================================

pub type NativeBody = fn(&mut Interpreter, Vec<Value>) -> EvalResult;

#[derive(Clone, Copy)]
pub struct NativeFn {
    pub name: &'static str,
    /// `None` accepts any number of arguments.
    pub arity: Option<usize>,
    pub body: NativeBody,
}

pub enum Callable {
    Closure {
        def: Arc<FunctionDef>,
        frame: Arc<Frame>,
    },
    /// Curried call: `target` with leading arguments already supplied.
    Partial {
        target: Arc<Callable>,
        bound: Vec<Value>,
        this: Option<EntityRef>,
    },
    Native(NativeFn),
    /// A method looked up on a receiver but not yet called.
    Method {
        receiver: Value,
        name: String,
    },
    Remote {
        alias: String,
        spec: RemoteSpec,
    },
}

impl Callable {
    pub fn name(&self) -> Option<&str> {
        match self {
            Callable::Closure { def, .. } => def.name.as_deref(),
            Callable::Partial { target, .. } => target.name(),
            Callable::Native(native) => Some(native.name),
            Callable::Method { name, .. } => Some(name),
            Callable::Remote { alias, .. } => Some(alias),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "<function {}>", name),
            None => f.write_str("<function>"),
        }
    }
}

//=====================================================
//            Section 4: Display
//=====================================================

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize, nested: bool) -> fmt::Result {
    if depth > DISPLAY_DEPTH {
        return f.write_str("...");
    }
    match value {
        Value::Null => f.write_str("null"),
        Value::Unit => f.write_str("()"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => f.write_str(&format_number(*n)),
        Value::String(s) if nested => write!(f, "{:?}", s),
        Value::String(s) => f.write_str(s),
        Value::Array(items) => {
            let items = items.read().clone();
            f.write_str("[")?;
            write_list(f, &items, depth)?;
            f.write_str("]")
        }
        Value::Tuple(items) => {
            f.write_str("(")?;
            write_list(f, items, depth)?;
            f.write_str(")")
        }
        Value::Map(map) => {
            let map = map.read().clone();
            if map.is_empty() {
                return f.write_str("[:]");
            }
            f.write_str("[")?;
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{:?}: ", key)?;
                write_value(f, value, depth + 1, true)?;
            }
            f.write_str("]")
        }
        Value::Entity(entity) => {
            f.write_str("{")?;
            for (i, (key, value)) in entity.members().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: ", key)?;
                write_value(f, value, depth + 1, true)?;
            }
            f.write_str("}")
        }
        Value::Function(callable) => write!(f, "{:?}", callable),
        Value::External(object) => write!(f, "<{}>", object.type_name()),
        Value::Class(class) => write!(f, "<class {}>", class.name()),
        Value::Promise(_) => f.write_str("<promise>"),
        Value::Safe(result) => match result.as_ref() {
            Ok(value) => {
                f.write_str("safe(")?;
                write_value(f, value, depth + 1, true)?;
                f.write_str(")")
            }
            Err(panic) => write!(f, "safe({})", panic.code),
        },
        Value::Namespace(_) => f.write_str("<namespace>"),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Value], depth: usize) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_value(f, item, depth + 1, true)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0, false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.type_name())?;
        write_value(f, self, 0, true)?;
        f.write_str(")")
    }
}

//=====================================================
//            Section 5: Host Marshalling
//=====================================================

impl Value {
    //Function: to_host
    //Purpose: Convert a script value for a host call
    //Inputs: &self
    //Returns: Result<HostValue, OhPanic> (closures cannot cross)
    pub fn to_host(&self) -> Result<HostValue, OhPanic> {
        Ok(match self {
            Value::Null | Value::Unit => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Number(n) => HostValue::Number(*n),
            Value::String(s) => HostValue::String(s.to_string()),
            Value::Array(items) => {
                let items = items.read().clone();
                HostValue::List(items.iter().map(Value::to_host).collect::<Result<_, _>>()?)
            }
            Value::Tuple(items) => {
                HostValue::List(items.iter().map(Value::to_host).collect::<Result<_, _>>()?)
            }
            Value::Map(map) => {
                let map = map.read().clone();
                HostValue::Map(
                    map.iter()
                        .map(|(key, value)| Ok((key.to_string(), value.to_host()?)))
                        .collect::<Result<_, OhPanic>>()?,
                )
            }
            Value::Entity(entity) => match entity.host() {
                Some(host) => HostValue::Object(host),
                None => HostValue::Map(
                    entity
                        .data_members()
                        .into_iter()
                        .map(|(key, value)| Ok((key, value.to_host()?)))
                        .collect::<Result<_, OhPanic>>()?,
                ),
            },
            Value::External(object) => HostValue::Object(Arc::clone(object)),
            Value::Safe(result) => match result.as_ref() {
                Ok(value) => value.to_host()?,
                Err(_) => HostValue::Null,
            },
            other => {
                return Err(OhPanic::external(format!(
                    "a {} cannot be passed to the host",
                    other.type_name()
                )))
            }
        })
    }

    pub fn from_host(value: HostValue) -> Value {
        match value {
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(b),
            HostValue::Number(n) => Value::Number(n),
            HostValue::String(s) => Value::from(s),
            HostValue::List(items) => Value::array(items.into_iter().map(Value::from_host).collect()),
            HostValue::Map(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_host(value)))
                    .collect(),
            ),
            HostValue::Object(object) => Value::External(object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(6.0).to_string(), "6");
        assert_eq!(Value::Number(460.5).to_string(), "460.5");
        assert_eq!(Value::Number(-2.0).to_string(), "-2");
    }

    #[test]
    fn aggregates_compare_structurally() {
        let a = Value::array(vec![1.into(), "x".into()]);
        let b = Value::array(vec![1.into(), "x".into()]);
        assert_eq!(a, b);
        assert_ne!(Value::tuple(vec![1.into()]), Value::tuple(vec![2.into()]));
        assert_ne!(Value::Number(1.0), Value::from("1"));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn truthiness_follows_kind() {
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(106.0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn nested_strings_are_quoted() {
        let value = Value::array(vec!["a".into(), Value::tuple(vec![1.into(), Value::Null])]);
        assert_eq!(value.to_string(), r#"["a", (1, null)]"#);
        assert_eq!(Value::map(OhMap::new()).to_string(), "[:]");
    }

    #[test]
    fn host_round_trip_keeps_shape() {
        let host = HostValue::map([("list", HostValue::from(vec![1, 2]))]);
        let value = Value::from_host(host.clone());
        assert!(value.satisfies(TypeName::Map));
        assert_eq!(value.to_host().expect("marshal"), host);
    }
}

//=====================================================
// End of file
//=====================================================
