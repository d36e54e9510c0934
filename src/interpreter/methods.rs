//=====================================================
// File: interpreter/methods.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Builtin methods on script values
// Objective: Dispatch `value.method(args)` for strings, numbers, arrays,
//            maps, tuples, promises, safe results, and entities
//=====================================================

use std::sync::Arc;

use super::builtins::{length_of, parse_number};
use super::errors::{EvalResult, OhPanic};
use super::value::Value;
use super::{out_of_bounds, position, Interpreter};

const STRING_METHODS: &[&str] = &[
    "len", "size", "trim", "upper", "lower", "split", "starts_with", "ends_with", "contains",
    "replace", "index_of", "substring", "to_num",
];
const NUMBER_METHODS: &[&str] = &["ceil", "floor", "round", "abs"];
const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "insert", "remove", "get", "set", "size", "len", "isEmpty", "contains",
    "forEach", "map", "filter", "reduce", "join", "parallel",
];
const MAP_METHODS: &[&str] = &[
    "put", "get", "remove", "contains_key", "containsKey", "keys", "values", "size", "isEmpty",
];
const TUPLE_METHODS: &[&str] = &["size", "len", "get"];
const PROMISE_METHODS: &[&str] = &["await", "then"];
const SAFE_METHODS: &[&str] = &["panic_code", "get", "panic_message"];
const ENTITY_METHODS: &[&str] = &["keys"];

pub fn has_method(receiver: &Value, name: &str) -> bool {
    if name == "to_str" {
        return true;
    }
    let table = match receiver {
        Value::String(_) => STRING_METHODS,
        Value::Number(_) => NUMBER_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Map(_) => MAP_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Promise(_) => PROMISE_METHODS,
        Value::Safe(_) => SAFE_METHODS,
        Value::Entity(_) => ENTITY_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

fn bad_args(receiver: &Value, name: &str) -> OhPanic {
    OhPanic::argument_mismatch(format!("bad arguments for {}.{}", receiver.type_name(), name))
}

fn arg(args: &[Value], at: usize) -> Value {
    args.get(at).cloned().unwrap_or(Value::Null)
}

fn text_arg(receiver: &Value, name: &str, args: &[Value], at: usize) -> Result<String, OhPanic> {
    match args.get(at) {
        Some(Value::String(text)) => Ok(text.to_string()),
        _ => Err(bad_args(receiver, name)),
    }
}

fn number_arg(receiver: &Value, name: &str, args: &[Value], at: usize) -> Result<f64, OhPanic> {
    args.get(at).and_then(Value::as_f64).ok_or_else(|| bad_args(receiver, name))
}

//Function: call_builtin
//Purpose: Run a builtin method
//Inputs: interpreter, receiver, method name, evaluated arguments
//Returns: EvalResult (104 when the receiver has no such method)
pub fn call_builtin(interpreter: &mut Interpreter, receiver: Value, name: &str, args: Vec<Value>) -> EvalResult {
    if name == "to_str" {
        return Ok(Value::from(receiver.to_string()));
    }
    if !has_method(&receiver, name) {
        return Err(OhPanic::member_not_found(receiver.type_name(), name).into());
    }
    match &receiver {
        Value::String(text) => string_method(&receiver, text, name, &args),
        Value::Number(n) => Ok(Value::Number(match name {
            "ceil" => n.ceil(),
            "floor" => n.floor(),
            "round" => n.round(),
            _ => n.abs(),
        })),
        Value::Array(_) => array_method(interpreter, &receiver, name, args),
        Value::Map(map) => {
            let key = |at: usize| arg(&args, at).key_string();
            Ok(match name {
                "put" => map.write().insert(key(0), arg(&args, 1)).unwrap_or(Value::Null),
                "get" => map.read().get(&key(0)).cloned().unwrap_or(Value::Null),
                "remove" => map.write().remove(&key(0)).unwrap_or(Value::Null),
                "contains_key" | "containsKey" => Value::Bool(map.read().contains_key(&key(0))),
                "keys" => Value::array(map.read().keys().map(Value::string).collect()),
                "values" => Value::array(map.read().values().cloned().collect()),
                "size" => Value::from(map.read().len()),
                _ => Value::Bool(map.read().is_empty()),
            })
        }
        Value::Tuple(items) => match name {
            "get" => {
                let at = number_arg(&receiver, name, &args, 0)?;
                Ok(items[position(at, items.len())?].clone())
            }
            _ => Ok(Value::from(items.len())),
        },
        Value::Promise(promise) => match name {
            "await" => Ok(promise.wait()?),
            _ => {
                let callback = arg(&args, 0);
                if !matches!(callback, Value::Function(_)) {
                    return Err(bad_args(&receiver, name).into());
                }
                let runtime = Arc::clone(interpreter.runtime());
                let chained = super::Promise::new(format!("{}.then", promise.label()));
                let settler = Arc::clone(&chained);
                promise.on_settle(move |settled| {
                    let result = match settled {
                        Ok(value) => Interpreter::new(runtime)
                            .call_value(&callback, vec![value.clone()], None)
                            .map_err(super::RuntimeError::into_panic),
                        Err(panic) => Err(panic.clone()),
                    };
                    settler.settle(result);
                });
                Ok(Value::Promise(chained))
            }
        },
        Value::Safe(result) => Ok(match (name, result.as_ref()) {
            ("panic_code", Ok(_)) => Value::from(0),
            ("panic_code", Err(panic)) => Value::Number(panic.code() as f64),
            ("get", Ok(value)) => value.clone(),
            ("get", Err(_)) => Value::Null,
            (_, Ok(_)) => Value::Null,
            (_, Err(panic)) => Value::from(panic.message.clone()),
        }),
        Value::Entity(entity) => Ok(Value::array(
            entity.members().into_iter().map(|(key, _)| Value::from(key)).collect(),
        )),
        other => Err(OhPanic::member_not_found(other.type_name(), name).into()),
    }
}

//=====================================================
//            Section 1: Strings
//=====================================================

fn string_method(receiver: &Value, text: &str, name: &str, args: &[Value]) -> EvalResult {
    Ok(match name {
        "len" | "size" => Value::from(text.chars().count()),
        "trim" => Value::from(text.trim()),
        "upper" => Value::from(text.to_uppercase()),
        "lower" => Value::from(text.to_lowercase()),
        "split" => {
            let separator = text_arg(receiver, name, args, 0)?;
            Value::array(text.split(separator.as_str()).map(Value::string).collect())
        }
        "starts_with" => Value::Bool(text.starts_with(text_arg(receiver, name, args, 0)?.as_str())),
        "ends_with" => Value::Bool(text.ends_with(text_arg(receiver, name, args, 0)?.as_str())),
        "contains" => Value::Bool(text.contains(text_arg(receiver, name, args, 0)?.as_str())),
        "replace" => {
            let from = text_arg(receiver, name, args, 0)?;
            let to = text_arg(receiver, name, args, 1)?;
            Value::from(text.replace(from.as_str(), &to))
        }
        "index_of" => {
            let needle = text_arg(receiver, name, args, 0)?;
            match text.find(needle.as_str()) {
                Some(byte) => Value::from(text[..byte].chars().count()),
                None => Value::from(-1),
            }
        }
        "substring" => {
            let chars: Vec<char> = text.chars().collect();
            let start = number_arg(receiver, name, args, 0)?;
            let end = match args.get(1) {
                Some(_) => number_arg(receiver, name, args, 1)?,
                None => chars.len() as f64,
            };
            if start < 0.0 || end < start || end > chars.len() as f64 {
                return Err(bad_args(receiver, name).into());
            }
            Value::from(chars[start as usize..end as usize].iter().collect::<String>())
        }
        _ => Value::Number(parse_number(receiver)?),
    })
}

//=====================================================
//            Section 2: Arrays
//=====================================================

fn array_method(interpreter: &mut Interpreter, receiver: &Value, name: &str, args: Vec<Value>) -> EvalResult {
    let Value::Array(items) = receiver else {
        return Err(bad_args(receiver, name).into());
    };
    match name {
        "push" => {
            items.write().extend(args);
            Ok(Value::Unit)
        }
        "pop" => Ok(items.write().pop().unwrap_or(Value::Null)),
        "insert" => {
            let at = number_arg(receiver, name, &args, 0)?;
            let mut items = items.write();
            let len = items.len();
            if at < 0.0 || at.fract() != 0.0 || at as usize > len {
                return Err(out_of_bounds(at, len).into());
            }
            items.insert(at as usize, arg(&args, 1));
            Ok(Value::Unit)
        }
        "remove" => {
            let at = number_arg(receiver, name, &args, 0)?;
            let mut items = items.write();
            let at = position(at, items.len())?;
            Ok(items.remove(at))
        }
        "get" => {
            let at = number_arg(receiver, name, &args, 0)?;
            let items = items.read();
            Ok(items[position(at, items.len())?].clone())
        }
        "set" => {
            let at = number_arg(receiver, name, &args, 0)?;
            let mut items = items.write();
            let at = position(at, items.len())?;
            items[at] = arg(&args, 1);
            Ok(Value::Unit)
        }
        "size" | "len" => Ok(Value::from(length_of(receiver)?)),
        "isEmpty" => Ok(Value::Bool(items.read().is_empty())),
        "contains" => {
            let needle = arg(&args, 0);
            Ok(Value::Bool(items.read().iter().any(|item| item.equals(&needle))))
        }
        "join" => {
            let separator = match args.first() {
                Some(_) => text_arg(receiver, name, &args, 0)?,
                None => String::new(),
            };
            let parts: Vec<String> = items.read().iter().map(ToString::to_string).collect();
            Ok(Value::from(parts.join(&separator)))
        }
        "forEach" | "map" | "filter" | "reduce" | "parallel" => {
            let snapshot = items.read().clone();
            iterate(interpreter, receiver, name, snapshot, args)
        }
        _ => Err(OhPanic::member_not_found("array", name).into()),
    }
}

/// Higher-order array methods; the callback runs over a snapshot.
fn iterate(
    interpreter: &mut Interpreter,
    receiver: &Value,
    name: &str,
    snapshot: Vec<Value>,
    args: Vec<Value>,
) -> EvalResult {
    let callback = match (name, args.as_slice()) {
        ("reduce", [_, f @ Value::Function(_)]) | (_, [f @ Value::Function(_)]) => f.clone(),
        _ => return Err(bad_args(receiver, name).into()),
    };
    match name {
        "forEach" => {
            for item in snapshot {
                interpreter.call_value(&callback, vec![item], None)?;
            }
            Ok(Value::Unit)
        }
        "map" => {
            let mut mapped = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                mapped.push(interpreter.call_value(&callback, vec![item], None)?);
            }
            Ok(Value::array(mapped))
        }
        "filter" => {
            let mut kept = Vec::new();
            for item in snapshot {
                if interpreter.call_value(&callback, vec![item.clone()], None)?.is_truthy() {
                    kept.push(item);
                }
            }
            Ok(Value::array(kept))
        }
        "reduce" => {
            let mut items = snapshot.into_iter();
            let mut acc = match args.len() {
                2 => arg(&args, 0),
                _ => match items.next() {
                    Some(first) => first,
                    None => return Ok(Value::Null),
                },
            };
            for item in items {
                acc = interpreter.call_value(&callback, vec![acc, item], None)?;
            }
            Ok(acc)
        }
        _ => {
            let promises: Vec<_> = snapshot
                .into_iter()
                .map(|item| {
                    let callback = callback.clone();
                    interpreter
                        .runtime()
                        .spawn("parallel", move |worker| worker.call_value(&callback, vec![item], None))
                })
                .collect();
            let mut joined = Vec::with_capacity(promises.len());
            for promise in promises {
                joined.push(promise.wait()?);
            }
            Ok(Value::array(joined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tables_by_kind() {
        assert!(has_method(&Value::from("a"), "ends_with"));
        assert!(has_method(&Value::from(1), "ceil"));
        assert!(!has_method(&Value::from(1), "trim"));
        assert!(has_method(&Value::Null, "to_str"));
        assert!(has_method(&Value::array(vec![]), "parallel"));
        assert!(!has_method(&Value::Null, "size"));
    }
}

//=====================================================
// End of file
//=====================================================
