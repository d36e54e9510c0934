#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::RwLock;

use ohscript::{Engine, HostClass, HostError, HostObject, HostValue, OhPanic, Value};

pub fn engine() -> Engine {
    Engine::new().expect("engine")
}

/// Run `source` as a single module and return its value.
pub fn run(source: &str) -> Value {
    run_with(&engine(), source)
}

pub fn run_with(engine: &Engine, source: &str) -> Value {
    match engine.execute(source, Vec::new()) {
        Ok(value) => value,
        Err(err) => panic!("script failed: {err}\nsource: {source}"),
    }
}

/// Run `source` expecting a panic.
pub fn run_panic(source: &str) -> OhPanic {
    let env = engine().load(source).expect("load");
    match env.execute(Vec::new()) {
        Ok(value) => panic!("expected a panic, got {value}\nsource: {source}"),
        Err(panic) => panic,
    }
}

pub fn num(value: impl Into<f64>) -> Value {
    Value::Number(value.into())
}

pub fn text(value: &str) -> Value {
    Value::from(value)
}

/// Member of an entity result.
pub fn member(value: &Value, name: &str) -> Value {
    value
        .as_entity()
        .and_then(|entity| entity.get(name))
        .unwrap_or_else(|| panic!("{value} has no member '{name}'"))
}

/// Host object with two fields and a pair of getters.
pub struct Woman {
    name: RwLock<String>,
    age: RwLock<f64>,
}

impl Woman {
    pub fn new(name: &str, age: f64) -> Self {
        Self {
            name: RwLock::new(name.to_string()),
            age: RwLock::new(age),
        }
    }
}

impl HostObject for Woman {
    fn type_name(&self) -> &str {
        "Woman"
    }

    fn method_arity(&self, name: &str) -> Option<usize> {
        match name {
            "getName" => Some(1),
            "getAge" => Some(0),
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        match name {
            "getName" => {
                HostError::check_arity(name, 1, &args)?;
                let last = args[0].as_str().unwrap_or_default();
                Ok(HostValue::String(format!("{} {}", self.name.read(), last)))
            }
            "getAge" => Ok(HostValue::Number(*self.age.read())),
            _ => Err(HostError::no_such_method(self.type_name(), name)),
        }
    }

    fn get_property(&self, name: &str) -> Option<HostValue> {
        match name {
            "name" => Some(HostValue::String(self.name.read().clone())),
            "age" => Some(HostValue::Number(*self.age.read())),
            _ => None,
        }
    }

    fn set_property(&self, name: &str, value: HostValue) -> Result<(), HostError> {
        match (name, value) {
            ("name", HostValue::String(text)) => *self.name.write() = text,
            ("age", HostValue::Number(n)) => *self.age.write() = n,
            (name, _) => {
                return Err(HostError::NoSuchProperty {
                    type_name: self.type_name().to_string(),
                    property: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

pub struct WomanClass;

impl HostClass for WomanClass {
    fn name(&self) -> &str {
        "Woman"
    }

    fn construct(&self, fields: Vec<(String, HostValue)>) -> Result<Arc<dyn HostObject>, HostError> {
        let woman = Woman::new("", 0.0);
        for (name, value) in fields {
            woman.set_property(&name, value)?;
        }
        Ok(Arc::new(woman))
    }
}

/// Class with a static factory and no literal construction.
pub struct Ticket {
    pub fix: f64,
    pub label: String,
}

impl HostObject for Ticket {
    fn type_name(&self) -> &str {
        "Ticket"
    }

    fn call_method(&self, name: &str, _args: Vec<HostValue>) -> Result<HostValue, HostError> {
        match name {
            "label" => Ok(HostValue::String(self.label.clone())),
            _ => Err(HostError::no_such_method(self.type_name(), name)),
        }
    }

    fn get_property(&self, name: &str) -> Option<HostValue> {
        match name {
            "fix" => Some(HostValue::Number(self.fix)),
            "label" => Some(HostValue::String(self.label.clone())),
            _ => None,
        }
    }
}

pub struct TicketClass;

impl HostClass for TicketClass {
    fn name(&self) -> &str {
        "Ticket"
    }

    fn construct(&self, _fields: Vec<(String, HostValue)>) -> Result<Arc<dyn HostObject>, HostError> {
        Err(HostError::Failed("tickets come from Ticket.create".into()))
    }

    fn call_static(&self, method: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        match method {
            "create" => {
                HostError::check_arity(method, 2, &args)?;
                Ok(HostValue::object(Ticket {
                    fix: args[0].as_f64().unwrap_or_default(),
                    label: args[1].as_str().unwrap_or_default().to_string(),
                }))
            }
            _ => Err(HostError::no_such_method(self.name(), method)),
        }
    }
}
