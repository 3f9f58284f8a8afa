//! String-keyed containers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::observer::{Observer, ReactiveCell};

use super::Value;

/// Storage for one property.
#[derive(Clone)]
pub(crate) enum Slot {
    /// A value that is read and written without tracking.
    Plain(Value),
    /// A property brought under observation.
    Reactive(ReactiveCell),
}

struct ObjectData {
    props: RefCell<IndexMap<String, Slot>>,
    observer: RefCell<Option<Observer>>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
    instance: Cell<bool>,
}

/// An insertion-ordered mapping from property names to values.
///
/// Cloning an `Object` creates a new handle to the same mapping.
#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
    pub fn new() -> Self {
        Self(Rc::new(ObjectData {
            props: RefCell::new(IndexMap::new()),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            raw: Cell::new(false),
            instance: Cell::new(false),
        }))
    }

    /// Read a property.
    ///
    /// Reading an observed property while a subscriber is evaluating records
    /// the property as one of its dependencies.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.slot(key)? {
            Slot::Plain(value) => Some(value),
            Slot::Reactive(cell) => Some(cell.get()),
        }
    }

    /// Read a property without registering a dependency.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        match self.slot(key)? {
            Slot::Plain(value) => Some(value),
            Slot::Reactive(cell) => Some(cell.get_untracked()),
        }
    }

    /// Assign a property the way a plain assignment would.
    ///
    /// Existing observed properties notify their subscribers. A new key is
    /// added as a plain, non-reactive property; use [`crate::observer::set`]
    /// to add a reactive one. New keys are ignored on non-extensible objects.
    pub fn assign(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let existing = self.slot(&key);
        match existing {
            Some(Slot::Reactive(cell)) => cell.set(value),
            Some(Slot::Plain(_)) => {
                self.0.props.borrow_mut().insert(key, Slot::Plain(value));
            }
            None if self.is_extensible() => {
                self.0.props.borrow_mut().insert(key, Slot::Plain(value));
            }
            None => {}
        }
    }

    /// Whether `key` is an own property.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Whether `key` is an observed property.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.slot(key), Some(Slot::Reactive(_)))
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.props.borrow().is_empty()
    }

    /// Snapshot of every property without registering dependencies.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Plain(value) => value.clone(),
                    Slot::Reactive(cell) => cell.get_untracked(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// The observer attached to this object, if it is under observation.
    pub fn observer(&self) -> Option<Observer> {
        self.0.observer.borrow().clone()
    }

    /// Forbid adding new properties. Non-extensible objects are never
    /// brought under observation.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Exclude this object from observation, e.g. for rendered tree
    /// descriptions.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// Flag this object as the root of a reactive instance. Instance roots
    /// are never observed, and `set`/`delete` refuse to add or remove their
    /// reactive properties.
    pub fn mark_instance(&self) {
        self.0.instance.set(true);
    }

    pub fn is_instance(&self) -> bool {
        self.0.instance.get()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow().get(key).cloned()
    }

    pub(crate) fn install_cell(&self, key: String, cell: ReactiveCell) {
        self.0.props.borrow_mut().insert(key, Slot::Reactive(cell));
    }

    pub(crate) fn remove_raw(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow_mut().shift_remove(key)
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        *self.0.observer.borrow_mut() = Some(observer);
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut props = object.0.props.borrow_mut();
            for (key, value) in iter {
                props.insert(key.into(), Slot::Plain(value));
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_adds_plain_properties() {
        let object = Object::new();
        object.assign("a", 1);
        object.assign("b", "two");

        assert_eq!(object.keys(), vec!["a", "b"]);
        assert_eq!(object.get("a").and_then(|v| v.as_f64()), Some(1.0));
        assert!(!object.is_reactive("a"));
    }

    #[test]
    fn non_extensible_objects_ignore_new_keys() {
        let object: Object = [("a", Value::from(1))].into_iter().collect();
        object.prevent_extensions();

        object.assign("b", 2);
        object.assign("a", 3);

        assert!(!object.contains_key("b"));
        assert_eq!(object.get("a").and_then(|v| v.as_f64()), Some(3.0));
    }

    #[test]
    fn clones_share_storage() {
        let object = Object::new();
        let other = object.clone();
        other.assign("shared", true);

        assert!(object.ptr_eq(&other));
        assert_eq!(object.get("shared").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn remove_preserves_order() {
        let object: Object = [("a", Value::Null), ("b", Value::Null), ("c", Value::Null)]
            .into_iter()
            .collect();
        object.remove_raw("b");
        assert_eq!(object.keys(), vec!["a", "c"]);
    }
}
