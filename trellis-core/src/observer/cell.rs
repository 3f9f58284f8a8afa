//! Reactive Cells
//!
//! A cell is the storage behind one observed property: the current value
//! plus the channel that subscribers reading the property join.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::{Channel, ReactiveContext};
use crate::value::Value;

use super::{depend_array, observe, Observer};

struct CellData {
    value: RefCell<Value>,
    channel: Channel,
    /// Observer of the current value, when it is an observed container.
    child: RefCell<Option<Observer>>,
    deep: bool,
}

/// An observed property.
#[derive(Clone)]
pub struct ReactiveCell(Rc<CellData>);

impl ReactiveCell {
    /// Create a cell. With `deep`, containers stored in the cell are brought
    /// under observation as well.
    pub(crate) fn new(value: Value, deep: bool) -> Self {
        let child = if deep { observe(&value) } else { None };
        Self(Rc::new(CellData {
            value: RefCell::new(value),
            channel: Channel::new(),
            child: RefCell::new(child),
            deep,
        }))
    }

    /// Read the value, registering the active subscriber (if any) on this
    /// property. When the value is an observed container the subscriber also
    /// depends on the container itself, and for sequences on every observed
    /// element, so in-place mutations reach it.
    pub fn get(&self) -> Value {
        let value = self.0.value.borrow().clone();
        if ReactiveContext::is_active() {
            self.0.channel.depend();
            let child = self.0.child.borrow().clone();
            if let Some(child) = child {
                child.channel().depend();
                if let Value::Array(array) = &value {
                    depend_array(array);
                }
            }
        }
        value
    }

    pub fn get_untracked(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Replace the value and notify subscribers.
    ///
    /// Writing an identical value (or `NaN` over `NaN`) is a no-op.
    pub fn set(&self, value: Value) {
        if self.0.value.borrow().is_unchanged_by(&value) {
            return;
        }
        let child = if self.0.deep { observe(&value) } else { None };
        *self.0.value.borrow_mut() = value;
        *self.0.child.borrow_mut() = child;
        self.0.channel.notify();
    }

    /// The channel subscribers join when reading this property.
    pub fn channel(&self) -> &Channel {
        &self.0.channel
    }
}

impl fmt::Debug for ReactiveCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.0.value.borrow())
            .field("channel", &self.0.channel.id())
            .field("deep", &self.0.deep)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn deep_cell_observes_container_values() {
        let object = Object::new();
        let cell = ReactiveCell::new(Value::Object(object.clone()), true);
        assert!(object.observer().is_some());

        let replacement = Object::new();
        cell.set(Value::Object(replacement.clone()));
        assert!(replacement.observer().is_some());
    }

    #[test]
    fn shallow_cell_leaves_values_alone() {
        let object = Object::new();
        let cell = ReactiveCell::new(Value::Object(object.clone()), false);
        assert!(object.observer().is_none());
        assert!(cell.get_untracked().is_identical(&Value::Object(object)));
    }

    #[test]
    fn reads_outside_a_subscriber_do_not_subscribe() {
        let cell = ReactiveCell::new(Value::from(1), true);
        assert_eq!(cell.get().as_f64(), Some(1.0));
        assert_eq!(cell.channel().subscriber_count(), 0);
    }
}
