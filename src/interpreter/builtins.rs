//=====================================================
// File: interpreter/builtins.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Global builtin functions and the util object
// Objective: Register the native functions every script can call and build
//            the `util` entity with its collection and JSON helpers
//=====================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tracing::{error, info, warn};

use super::entity::{EntityArena, EntityRef};
use super::errors::{EvalResult, OhPanic, PanicCode};
use super::value::{Callable, NativeFn, Value};
use super::{Interpreter, Runtime};
use crate::interop::util::{json_to_host, parse_lenient};
use crate::interop::{HostList, HostMap, HostValue};

/// Name of the array holding the entry arguments.
pub const ARGS: &str = "args";
pub const UTIL: &str = "util";

/// Names the analyzer treats as always bound.
pub const BUILTIN_NAMES: &[&str] = &[
    "log", "warning", "error", "print", "panic", "sleep", "now", "len", "to_str", "to_num", UTIL,
];

//=====================================================
//            Section 1: Registry
//=====================================================

static BUILTINS: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    let table = [
        native("log", None, log),
        native("warning", None, warning),
        native("error", None, error_log),
        native("print", None, print),
        native("panic", None, panic),
        native("sleep", Some(1), sleep),
        native("now", Some(0), now),
        native("len", Some(1), len),
        native("to_str", Some(1), to_str),
        native("to_num", Some(1), to_num),
    ];
    table.into_iter().map(|f| (f.name, f)).collect()
});

fn native(name: &'static str, arity: Option<usize>, body: super::value::NativeBody) -> NativeFn {
    NativeFn { name, arity, body }
}

/// Builtin function or object bound to `name`.
pub fn lookup(runtime: &Arc<Runtime>, name: &str) -> Option<Value> {
    if name == UTIL {
        return Some(runtime.util());
    }
    BUILTINS
        .get(name)
        .map(|native| Value::function(Callable::Native(*native)))
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

//=====================================================
//            Section 2: Global Functions
//=====================================================

fn joined(args: &[Value]) -> String {
    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn log(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    info!(target: "ohscript::script", "{}", joined(&args));
    Ok(Value::Unit)
}

fn warning(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    warn!(target: "ohscript::script", "{}", joined(&args));
    Ok(Value::Unit)
}

fn error_log(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    error!(target: "ohscript::script", "{}", joined(&args));
    Ok(Value::Unit)
}

fn print(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    println!("{}", joined(&args));
    Ok(Value::Unit)
}

//Function: panic
//Purpose: Raise a script panic
//Inputs: (), (msg), (code), or (code, msg)
//Returns: EvalResult (always Err)
fn panic(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let panic = match args.as_slice() {
        [] => OhPanic::new(PanicCode::EXPLICIT_PANIC, "explicit panic"),
        [Value::Number(code)] => OhPanic::new(PanicCode(*code as i64), "explicit panic"),
        [message] => OhPanic::new(PanicCode::EXPLICIT_PANIC, message.to_string()),
        [Value::Number(code), message] => OhPanic::new(PanicCode(*code as i64), message.to_string()),
        _ => return Err(OhPanic::argument_mismatch("panic takes an optional code and message").into()),
    };
    Err(panic.into())
}

fn sleep(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let millis = args
        .first()
        .and_then(Value::as_f64)
        .filter(|ms| *ms >= 0.0)
        .ok_or_else(|| OhPanic::argument_mismatch("sleep takes a non-negative number of milliseconds"))?;
    thread::sleep(Duration::from_millis(millis as u64));
    Ok(Value::Unit)
}

fn now(_: &mut Interpreter, _: Vec<Value>) -> EvalResult {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as f64)
        .unwrap_or_default();
    Ok(Value::Number(millis))
}

pub(crate) fn length_of(value: &Value) -> Result<usize, OhPanic> {
    Ok(match value {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.read().len(),
        Value::Tuple(items) => items.len(),
        Value::Map(map) => map.read().len(),
        Value::Entity(entity) => entity.members().len(),
        other => return Err(OhPanic::type_mismatch(format!("a {} has no length", other.type_name()))),
    })
}

fn len(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let value = args.into_iter().next().unwrap_or(Value::Null);
    Ok(Value::from(length_of(&value)?))
}

fn to_str(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let value = args.into_iter().next().unwrap_or(Value::Null);
    Ok(Value::from(value.to_string()))
}

pub(crate) fn parse_number(value: &Value) -> Result<f64, OhPanic> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| OhPanic::type_mismatch(format!("'{}' is not a number", text))),
        other => Err(OhPanic::type_mismatch(format!("a {} is not a number", other.type_name()))),
    }
}

fn to_num(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let value = args.into_iter().next().unwrap_or(Value::Null);
    Ok(Value::Number(parse_number(&value)?))
}

//=====================================================
//            Section 3: util
//=====================================================

//Function: util_entity
//Purpose: Build the `util` object
//Inputs: arena: &Arc<EntityArena>
//Returns: EntityRef
pub fn util_entity(arena: &Arc<EntityArena>) -> EntityRef {
    let util = arena.alloc(None, None);
    for member in [
        native("newMap", Some(0), new_map),
        native("newList", Some(0), new_list),
        native("stringToJson", Some(1), string_to_json),
        native("jsonToEntity", Some(1), json_to_entity),
    ] {
        util.define(member.name, Value::function(Callable::Native(member)));
    }
    util
}

fn new_map(_: &mut Interpreter, _: Vec<Value>) -> EvalResult {
    Ok(Value::from_host(HostValue::object(HostMap::new())))
}

fn new_list(_: &mut Interpreter, _: Vec<Value>) -> EvalResult {
    Ok(Value::from_host(HostValue::object(HostList::new())))
}

fn parse_json_arg(args: &[Value]) -> Result<Value, OhPanic> {
    let text = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| OhPanic::argument_mismatch("expected a JSON string"))?;
    let json = parse_lenient(text).map_err(|err| OhPanic::external(format!("invalid JSON: {}", err)))?;
    Ok(Value::from_host(json_to_host(&json)))
}

fn string_to_json(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    Ok(parse_json_arg(&args)?)
}

fn json_to_entity(interpreter: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let source = match args.first() {
        Some(Value::String(_)) => parse_json_arg(&args)?,
        Some(other) => other.clone(),
        None => Value::Null,
    };
    Ok(entity_from(interpreter.runtime().arena(), source))
}

/// Maps become entities, recursively through arrays.
fn entity_from(arena: &Arc<EntityArena>, value: Value) -> Value {
    match value {
        Value::Map(map) => {
            let entries: Vec<(String, Value)> = map
                .read()
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect();
            let entity = arena.alloc(None, None);
            for (key, value) in entries {
                entity.define(key, entity_from(arena, value));
            }
            Value::Entity(entity)
        }
        Value::Array(items) => {
            let items = items.read().clone();
            Value::array(items.into_iter().map(|item| entity_from(arena, item)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_global_names() {
        for name in BUILTIN_NAMES.iter().filter(|name| **name != UTIL) {
            assert!(BUILTINS.contains_key(name), "{} missing", name);
        }
        assert!(is_builtin("util"));
        assert!(!is_builtin("ext"));
    }

    #[test]
    fn json_maps_become_entities() {
        let arena = EntityArena::new();
        let source = parse_json_arg(&[Value::from("{'name':'will','kids':[{'age':1}]}")]).expect("json");
        let Value::Entity(entity) = entity_from(&arena, source) else {
            panic!("expected an entity");
        };
        assert_eq!(entity.get("name"), Some(Value::from("will")));
        let Some(Value::Array(kids)) = entity.get("kids") else {
            panic!("expected kids");
        };
        let kid = kids.read()[0].clone();
        assert_eq!(kid.as_entity().and_then(|kid| kid.get("age")), Some(Value::from(1)));
    }

    #[test]
    fn lengths_by_kind() {
        assert_eq!(length_of(&Value::from("abc")), Ok(3));
        assert_eq!(length_of(&Value::array(vec![1.into(), 2.into()])), Ok(2));
        assert!(length_of(&Value::from(3)).is_err());
        assert_eq!(parse_number(&Value::from(" 4.5 ")), Ok(4.5));
    }
}

//=====================================================
// End of file
//=====================================================
