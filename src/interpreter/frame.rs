//=====================================================
// File: interpreter/frame.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Activation frames
// Objective: Hold variable slots in reference-counted frames that closures
//            keep alive and imports link into
//=====================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::entity::EntityRef;
use super::value::Value;

/// A single variable cell; imports share the exporter's cell.
pub type Slot = Arc<RwLock<Value>>;

pub struct Frame {
    slots: RwLock<HashMap<String, Slot>>,
    parent: Option<Arc<Frame>>,
    this: Option<EntityRef>,
}

impl Frame {
    pub fn root() -> Arc<Frame> {
        Arc::new(Frame {
            slots: RwLock::new(HashMap::new()),
            parent: None,
            this: None,
        })
    }

    /// Nested scope that keeps the parent's `this`.
    pub fn child(parent: &Arc<Frame>) -> Arc<Frame> {
        Self::with_this(parent, parent.this.clone())
    }

    pub fn with_this(parent: &Arc<Frame>, this: Option<EntityRef>) -> Arc<Frame> {
        Arc::new(Frame {
            slots: RwLock::new(HashMap::new()),
            parent: Some(Arc::clone(parent)),
            this,
        })
    }

    pub fn this(&self) -> Option<&EntityRef> {
        self.this.as_ref()
    }

    /// Bind `name` in this frame, replacing any binding it already holds.
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.slots
            .write()
            .insert(name.into(), Arc::new(RwLock::new(value)));
    }

    pub fn link(&self, name: impl Into<String>, slot: Slot) {
        self.slots.write().insert(name.into(), slot);
    }

    pub fn local_slot(&self, name: &str) -> Option<Slot> {
        self.slots.read().get(name).cloned()
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.local_slot(name).map(|slot| slot.read().clone())
    }

    /// Innermost slot named `name`, walking out through parents.
    pub fn slot(&self, name: &str) -> Option<Slot> {
        if let Some(slot) = self.local_slot(name) {
            return Some(slot);
        }
        let mut current = self.parent.as_ref();
        while let Some(frame) = current {
            if let Some(slot) = frame.local_slot(name) {
                return Some(slot);
            }
            current = frame.parent.as_ref();
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.slot(name).map(|slot| slot.read().clone())
    }

    /// Overwrite an existing binding; false when nothing is bound.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.slot(name) {
            Some(slot) => {
                *slot.write() = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_sees_and_updates_parent() {
        let root = Frame::root();
        root.declare("a", Value::from(1));
        let child = Frame::child(&root);
        assert_eq!(child.get("a"), Some(Value::from(1)));
        assert!(child.assign("a", Value::from(2)));
        assert_eq!(root.get("a"), Some(Value::from(2)));
        assert!(!child.assign("missing", Value::Null));
    }

    #[test]
    fn shadowing_stays_local() {
        let root = Frame::root();
        root.declare("b", Value::from("will"));
        let inner = Frame::child(&root);
        inner.declare("b", Value::from(10));
        assert_eq!(root.get("b"), Some(Value::from("will")));
        assert_eq!(inner.get("b"), Some(Value::from(10)));
    }

    #[test]
    fn linked_slots_observe_later_writes() {
        let exporter = Frame::root();
        exporter.declare("a", Value::from(100));
        let importer = Frame::root();
        importer.link("b", exporter.local_slot("a").expect("exported"));
        exporter.assign("a", Value::from(200));
        assert_eq!(importer.get("b"), Some(Value::from(200)));
    }
}

//=====================================================
// End of file
//=====================================================
