//=====================================================
// File: interop/collections.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Shared host aggregates
// Objective: Provide map and list objects that scripts mutate in place and
//            the host observes through cloned handles
//=====================================================

use std::sync::Arc;

use parking_lot::RwLock;

use super::{HostError, HostObject, HostValue};

fn key_of(value: &HostValue) -> String {
    match value {
        HostValue::String(s) => s.clone(),
        HostValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        HostValue::Number(n) => n.to_string(),
        HostValue::Bool(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}

fn index_of(value: &HostValue, len: usize, method: &str) -> Result<usize, HostError> {
    match value {
        HostValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && (*n as usize) < len => Ok(*n as usize),
        other => Err(HostError::Failed(format!(
            "{}: index {:?} out of bounds for length {}",
            method, other, len
        ))),
    }
}

//=====================================================
//            Section 1: HostMap
//=====================================================

/// Insertion-ordered string map; clones share storage.
#[derive(Clone, Default)]
pub struct HostMap {
    entries: Arc<RwLock<Vec<(String, HostValue)>>>,
}

impl HostMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, HostValue)>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn put(&self, key: impl Into<String>, value: HostValue) -> Option<HostValue> {
        let key = key.into();
        let mut entries = self.entries.write();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        entries.push((key, value));
        None
    }

    pub fn remove(&self, key: &str) -> Option<HostValue> {
        let mut entries = self.entries.write();
        let at = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(at).1)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(String, HostValue)> {
        self.entries.read().clone()
    }
}

impl HostObject for HostMap {
    fn type_name(&self) -> &str {
        "HostMap"
    }

    fn method_arity(&self, name: &str) -> Option<usize> {
        Some(match name {
            "put" => 2,
            "get" | "remove" | "containsKey" | "contains_key" => 1,
            "keys" | "values" | "size" | "isEmpty" => 0,
            _ => return None,
        })
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let expected = self
            .method_arity(name)
            .ok_or_else(|| HostError::no_such_method(self.type_name(), name))?;
        HostError::check_arity(name, expected, &args)?;
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or(HostValue::Null);
        Ok(match name {
            "put" => {
                let key = key_of(&next());
                self.put(key, next()).unwrap_or(HostValue::Null)
            }
            "get" => self.get(&key_of(&next())).unwrap_or(HostValue::Null),
            "remove" => self.remove(&key_of(&next())).unwrap_or(HostValue::Null),
            "containsKey" | "contains_key" => HostValue::Bool(self.get(&key_of(&next())).is_some()),
            "keys" => HostValue::List(self.keys().into_iter().map(HostValue::String).collect()),
            "values" => HostValue::List(self.entries.read().iter().map(|(_, v)| v.clone()).collect()),
            "size" => HostValue::Number(self.len() as f64),
            _ => HostValue::Bool(self.is_empty()),
        })
    }

    fn get_property(&self, name: &str) -> Option<HostValue> {
        self.get(name)
    }

    fn set_property(&self, name: &str, value: HostValue) -> Result<(), HostError> {
        self.put(name, value);
        Ok(())
    }
}

//=====================================================
//            Section 2: HostList
//=====================================================

/// Growable list; clones share storage.
#[derive(Clone, Default)]
pub struct HostList {
    items: Arc<RwLock<Vec<HostValue>>>,
}

impl HostList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<HostValue>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn push(&self, value: HostValue) {
        self.items.write().push(value);
    }

    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.items.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<HostValue> {
        self.items.read().clone()
    }
}

impl HostObject for HostList {
    fn type_name(&self) -> &str {
        "HostList"
    }

    fn method_arity(&self, name: &str) -> Option<usize> {
        Some(match name {
            "set" => 2,
            "add" | "push" | "get" | "remove" | "contains" => 1,
            "size" | "isEmpty" => 0,
            _ => return None,
        })
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let expected = self
            .method_arity(name)
            .ok_or_else(|| HostError::no_such_method(self.type_name(), name))?;
        HostError::check_arity(name, expected, &args)?;
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or(HostValue::Null);
        Ok(match name {
            "add" | "push" => {
                self.push(next());
                HostValue::Bool(true)
            }
            "get" => {
                let items = self.items.read();
                let at = index_of(&next(), items.len(), name)?;
                items[at].clone()
            }
            "set" => {
                let mut items = self.items.write();
                let at = index_of(&next(), items.len(), name)?;
                std::mem::replace(&mut items[at], next())
            }
            "remove" => {
                let mut items = self.items.write();
                let at = index_of(&next(), items.len(), name)?;
                items.remove(at)
            }
            "contains" => {
                let needle = next();
                HostValue::Bool(self.items.read().iter().any(|item| *item == needle))
            }
            "size" => HostValue::Number(self.len() as f64),
            _ => HostValue::Bool(self.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_mutation_is_visible_through_clones() {
        let map = HostMap::new();
        let handle = map.clone();
        map.call_method("put", vec!["a".into(), 150.into()]).expect("put");
        assert_eq!(handle.get("a"), Some(HostValue::Number(150.0)));
        assert_eq!(
            handle.call_method("containsKey", vec!["a".into()]).expect("contains"),
            HostValue::Bool(true)
        );
    }

    #[test]
    fn map_put_replaces_in_place() {
        let map = HostMap::new();
        map.put("x", 1.into());
        map.put("y", 2.into());
        assert_eq!(map.put("x", 3.into()), Some(HostValue::Number(1.0)));
        assert_eq!(map.keys(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn list_checks_arity_and_bounds() {
        let list = HostList::new();
        list.call_method("add", vec![7.into()]).expect("add");
        assert_eq!(list.call_method("size", vec![]).expect("size"), HostValue::Number(1.0));
        assert!(matches!(
            list.call_method("add", vec![]),
            Err(HostError::ArgumentMismatch { .. })
        ));
        assert!(list.call_method("get", vec![3.into()]).is_err());
        assert!(matches!(
            list.call_method("sort", vec![]),
            Err(HostError::NoSuchMethod { .. })
        ));
    }
}

//=====================================================
// End of file
//=====================================================
