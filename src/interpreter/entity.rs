//=====================================================
// File: interpreter/entity.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Prototype entity storage
// Objective: Keep entity records in an arena addressed by index so that
//            `base` links never own their prototype
//=====================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::value::{Callable, Value};
use crate::interop::HostObject;

pub type EntityId = usize;

struct EntityRecord {
    /// Insertion ordered.
    members: Vec<(String, Value)>,
    base: Option<EntityId>,
    host: Option<Arc<dyn HostObject>>,
}

/// Owner of every entity created during one execution environment.
#[derive(Default)]
pub struct EntityArena {
    records: RwLock<Vec<EntityRecord>>,
}

impl EntityArena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    //Function: alloc
    //Purpose: Append a fresh, empty record
    //Inputs: arena, base prototype, optional host instance
    //Returns: EntityRef
    pub fn alloc(
        self: &Arc<Self>,
        base: Option<&EntityRef>,
        host: Option<Arc<dyn HostObject>>,
    ) -> EntityRef {
        let mut records = self.records.write();
        records.push(EntityRecord {
            members: Vec::new(),
            base: base.map(|entity| entity.id),
            host,
        });
        EntityRef {
            arena: Arc::clone(self),
            id: records.len() - 1,
        }
    }

    fn handle(self: &Arc<Self>, id: EntityId) -> EntityRef {
        EntityRef {
            arena: Arc::clone(self),
            id,
        }
    }

    /// Member lookup through the base chain; the owner comes back with it.
    fn find(&self, id: EntityId, name: &str) -> Option<(EntityId, Value)> {
        let records = self.records.read();
        let mut current = Some(id);
        while let Some(at) = current {
            let record = records.get(at)?;
            if let Some((_, value)) = record.members.iter().find(|(k, _)| k == name) {
                return Some((at, value.clone()));
            }
            current = record.base;
        }
        None
    }
}

/// Shared handle to one entity.
#[derive(Clone)]
pub struct EntityRef {
    arena: Arc<EntityArena>,
    id: EntityId,
}

impl EntityRef {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.arena, &other.arena)
    }

    pub fn arena(&self) -> &Arc<EntityArena> {
        &self.arena
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.arena.find(self.id, name).map(|(_, value)| value)
    }

    pub fn own(&self, name: &str) -> Option<Value> {
        let records = self.arena.records.read();
        records
            .get(self.id)?
            .members
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace a member on this record only.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut records = self.arena.records.write();
        if let Some(record) = records.get_mut(self.id) {
            match record.members.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => record.members.push((name, value)),
            }
        }
    }

    //Function: set
    //Purpose: Assign a member; a member inherited from a prototype is
    //         updated on that prototype
    //Inputs: name, value
    //Returns: ()
    pub fn set(&self, name: &str, value: Value) {
        let target = self.arena.find(self.id, name).map(|(owner, _)| owner).unwrap_or(self.id);
        self.arena.handle(target).define(name, value);
    }

    /// Back this record with a host instance after construction.
    pub fn attach_host(&self, host: Arc<dyn HostObject>) {
        if let Some(record) = self.arena.records.write().get_mut(self.id) {
            record.host = Some(host);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arena.find(self.id, name).is_some()
    }

    pub fn base(&self) -> Option<EntityRef> {
        let base = self.arena.records.read().get(self.id)?.base?;
        Some(self.arena.handle(base))
    }

    pub fn host(&self) -> Option<Arc<dyn HostObject>> {
        let records = self.arena.records.read();
        let mut current = Some(self.id);
        while let Some(at) = current {
            let record = records.get(at)?;
            if let Some(host) = &record.host {
                return Some(Arc::clone(host));
            }
            current = record.base;
        }
        None
    }

    /// Own members, in insertion order.
    pub fn members(&self) -> Vec<(String, Value)> {
        self.arena
            .records
            .read()
            .get(self.id)
            .map(|record| record.members.clone())
            .unwrap_or_default()
    }

    /// Non-function members visible through the base chain; own values win.
    pub fn data_members(&self) -> Vec<(String, Value)> {
        let mut chain = vec![self.clone()];
        while let Some(base) = chain.last().and_then(EntityRef::base) {
            if chain.iter().any(|seen| seen.ptr_eq(&base)) {
                break;
            }
            chain.push(base);
        }
        let mut data: Vec<(String, Value)> = Vec::new();
        for entity in chain.iter().rev() {
            for (name, value) in entity.members() {
                if matches!(value, Value::Function(_)) {
                    continue;
                }
                match data.iter_mut().find(|(k, _)| *k == name) {
                    Some(slot) => slot.1 = value,
                    None => data.push((name, value)),
                }
            }
        }
        data
    }

    /// Script-defined function member named `name`, searched through the chain.
    pub fn method(&self, name: &str) -> Option<Arc<Callable>> {
        match self.get(name)? {
            Value::Function(callable) => Some(callable),
            _ => None,
        }
    }

    /// Same entity, or one is a prototype of the other.
    pub fn is_related(&self, other: &EntityRef) -> bool {
        self.in_chain_of(other) || other.in_chain_of(self)
    }

    fn in_chain_of(&self, other: &EntityRef) -> bool {
        if !Arc::ptr_eq(&self.arena, &other.arena) {
            return false;
        }
        let records = self.arena.records.read();
        let mut current = Some(other.id);
        while let Some(at) = current {
            if at == self.id {
                return true;
            }
            current = records.get(at).and_then(|record| record.base);
        }
        false
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherited_assignment_updates_prototype() {
        let arena = EntityArena::new();
        let will = arena.alloc(None, None);
        will.define("age", Value::from(48));
        let son = arena.alloc(Some(&will), None);

        son.set("age", Value::from(50));
        assert_eq!(will.get("age"), Some(Value::from(50)));
        assert!(son.own("age").is_none());

        son.set("name", Value::from("son"));
        assert!(will.get("name").is_none());
        assert_eq!(son.own("name"), Some(Value::from("son")));
    }

    #[test]
    fn members_keep_insertion_order() {
        let arena = EntityArena::new();
        let entity = arena.alloc(None, None);
        entity.define("age", Value::from(47));
        entity.define("height", Value::from(168));
        entity.define("age", Value::from(48));
        let names: Vec<String> = entity.members().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["age", "height"]);
    }

    #[test]
    fn relation_follows_base_chain() {
        let arena = EntityArena::new();
        let will = arena.alloc(None, None);
        let son = arena.alloc(Some(&will), None);
        let other = arena.alloc(None, None);
        assert!(son.is_related(&will));
        assert!(will.is_related(&son));
        assert!(!other.is_related(&son));
        assert!(son.base().is_some_and(|base| base.ptr_eq(&will)));
    }
}

//=====================================================
// End of file
//=====================================================
