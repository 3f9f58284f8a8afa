//! Reactive Value Store
//!
//! Observation turns plain data into data whose reads and writes can be
//! tracked:
//!
//! - Every property of an observed [`Object`] is converted into a
//!   [`ReactiveCell`]. Reading the cell while a subscriber evaluates records a
//!   dependency; writing it notifies the subscribers.
//! - Every observed container gets an [`Observer`] whose channel stands for
//!   the container as a whole. It notifies when properties are added or
//!   removed through [`set`]/[`delete`], or when an [`Array`] is mutated.
//! - Observation is recursive: nested containers are observed as well, and
//!   containers stored later are observed when they are written.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{observe, Value};
//! use serde_json::json;
//!
//! let data = Value::from(json!({ "user": { "name": "ada" } }));
//! let observer = observe(&data).unwrap();
//!
//! // Observing again returns the same observer.
//! assert!(observe(&data).unwrap().ptr_eq(&observer));
//! ```

mod cell;
mod traverse;

pub use cell::ReactiveCell;
pub use traverse::traverse;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::error::{warn, Error};
use crate::reactive::Channel;
use crate::value::{Array, Key, Object, Slot, Value};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable the creation of new observers.
///
/// Containers that are already observed keep their observer either way.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

struct ObserverData {
    channel: Channel,
    root_count: Cell<u32>,
}

/// The wrapper attached to an observed container.
///
/// Cloning an `Observer` creates a new handle to the same wrapper.
#[derive(Clone)]
pub struct Observer(Rc<ObserverData>);

impl Observer {
    fn new() -> Self {
        Self(Rc::new(ObserverData {
            channel: Channel::new(),
            root_count: Cell::new(0),
        }))
    }

    /// Channel notified when the container itself changes.
    pub fn channel(&self) -> &Channel {
        &self.0.channel
    }

    /// How many instances use the container as root data.
    pub fn root_count(&self) -> u32 {
        self.0.root_count.get()
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn release_root(&self) {
        self.0.root_count.set(self.0.root_count.get().saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("channel", &self.0.channel.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Bring a value under observation.
///
/// Returns `None` for primitives, raw or instance-root containers,
/// non-extensible containers, and whenever observation is disabled (see
/// [`toggle_observing`] and `Config::server_rendering`). Observing an already
/// observed container returns its existing observer.
pub fn observe(value: &Value) -> Option<Observer> {
    attach(value, false)
}

/// Like [`observe`], and additionally count the container as root data.
pub fn observe_as_root(value: &Value) -> Option<Observer> {
    attach(value, true)
}

/// Observe a value and hand it back.
pub fn observable(value: Value) -> Value {
    observe(&value);
    value
}

fn attach(value: &Value, as_root: bool) -> Option<Observer> {
    let observer = match value {
        Value::Object(object) => observe_object(object),
        Value::Array(array) => observe_array(array),
        _ => None,
    }?;
    if as_root {
        observer.0.root_count.set(observer.0.root_count.get() + 1);
    }
    Some(observer)
}

fn can_observe() -> bool {
    should_observe() && !config::with(|c| c.server_rendering)
}

fn observe_object(object: &Object) -> Option<Observer> {
    if object.is_raw() {
        return None;
    }
    if let Some(observer) = object.observer() {
        return Some(observer);
    }
    if !can_observe() || !object.is_extensible() || object.is_instance() {
        return None;
    }

    let observer = Observer::new();
    object.set_observer(observer.clone());
    for key in object.keys() {
        define_reactive(object, &key, None, true);
    }
    Some(observer)
}

fn observe_array(array: &Array) -> Option<Observer> {
    if array.is_raw() {
        return None;
    }
    if let Some(observer) = array.observer() {
        return Some(observer);
    }
    if !can_observe() || !array.is_extensible() {
        return None;
    }

    let observer = Observer::new();
    array.set_observer(observer.clone());
    for item in array.to_vec() {
        observe(&item);
    }
    Some(observer)
}

/// Install a reactive property on `object`.
///
/// With `value` of `None` the property keeps its current value. If `key` is
/// already reactive the existing cell is kept (and written when a value is
/// given). With `deep`, container values are observed recursively.
pub fn define_reactive(object: &Object, key: &str, value: Option<Value>, deep: bool) {
    let initial = match object.slot(key) {
        Some(Slot::Reactive(cell)) => {
            if let Some(value) = value {
                cell.set(value);
            }
            return;
        }
        Some(Slot::Plain(current)) => value.unwrap_or(current),
        None if object.is_extensible() => value.unwrap_or_default(),
        None => return,
    };
    object.install_cell(key.to_string(), ReactiveCell::new(initial, deep));
}

/// Make every observed element of `array` (recursively) a dependency of the
/// active subscriber.
pub(crate) fn depend_array(array: &Array) {
    for item in array.to_vec() {
        match &item {
            Value::Object(object) => {
                if let Some(observer) = object.observer() {
                    observer.channel().depend();
                }
            }
            Value::Array(nested) => {
                if let Some(observer) = nested.observer() {
                    observer.channel().depend();
                }
                depend_array(nested);
            }
            _ => {}
        }
    }
}

/// Set a property, adding it as a reactive property when it is new.
///
/// - On a sequence with a valid index the sequence grows as needed and the
///   write goes through [`Array::splice`], so it always notifies. Keys that
///   are not indices below [`MAX_INDEX`](crate::value::MAX_INDEX) are
///   refused with a diagnostic.
/// - An existing own property is assigned directly.
/// - A new property on an instance root or root data object is refused with
///   a diagnostic and stored as a plain property.
/// - A new property on an unobserved object is stored as a plain property.
/// - Otherwise the property becomes reactive and the object's channel
///   notifies.
///
/// Returns the value that was set.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();
    match target {
        Value::Array(array) => {
            let Some(index) = key.as_index().filter(|&index| array.extend_to(index)) else {
                warn(&Error::InvalidKey {
                    operation: "set",
                    key: key.to_string(),
                });
                return value;
            };
            array.splice(index, 1, vec![value.clone()]);
            value
        }
        Value::Object(object) => {
            let name = key.to_name();
            if object.contains_key(&name) {
                object.assign(name, value.clone());
                return value;
            }
            let observer = object.observer();
            if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(&Error::RootMutation {
                    operation: "adding",
                    key: name.clone(),
                });
                object.assign(name, value.clone());
                return value;
            }
            let Some(observer) = observer else {
                object.assign(name, value.clone());
                return value;
            };
            define_reactive(object, &name, Some(value.clone()), true);
            observer.channel().notify();
            value
        }
        other => {
            warn(&Error::InvalidTarget {
                operation: "set",
                target: other.describe(),
            });
            value
        }
    }
}

/// Delete a property, notifying the container when it is observed.
///
/// Sequence elements are removed through [`Array::splice`]. Deleting from an
/// instance root or root data object reports a diagnostic and removes the
/// property without notifying.
pub fn delete(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(array) => match key.as_index() {
            Some(index) => {
                array.splice(index, 1, Vec::new());
            }
            None => warn(&Error::InvalidKey {
                operation: "delete",
                key: key.to_string(),
            }),
        },
        Value::Object(object) => {
            let name = key.to_name();
            if !object.contains_key(&name) {
                return;
            }
            let observer = object.observer();
            if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(&Error::RootMutation {
                    operation: "deleting",
                    key: name.clone(),
                });
                object.remove_raw(&name);
                return;
            }
            object.remove_raw(&name);
            if let Some(observer) = observer {
                observer.channel().notify();
            }
        }
        other => warn(&Error::InvalidTarget {
            operation: "delete",
            target: other.describe(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn capture_warnings() -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        config::configure(|c| {
            c.warn_handler = Some(Rc::new(move |err: &Error| {
                seen_clone.borrow_mut().push(err.to_string());
            }));
        });
        seen
    }

    #[test]
    fn observe_is_idempotent() {
        let data = Value::from(json!({ "a": 1 }));
        let first = observe(&data).unwrap();
        let second = observe(&data).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn observe_converts_nested_properties() {
        let data = Value::from(json!({ "a": { "b": [ { "c": 1 } ] } }));
        observe(&data);

        let root = data.as_object().unwrap();
        assert!(root.is_reactive("a"));

        let a = root.get_untracked("a").unwrap();
        let a = a.as_object().unwrap();
        assert!(a.observer().is_some());
        assert!(a.is_reactive("b"));

        let b = a.get_untracked("b").unwrap();
        let item = b.as_array().unwrap().get(0).unwrap();
        assert!(item.as_object().unwrap().is_reactive("c"));
    }

    #[test]
    fn ineligible_values_are_not_observed() {
        assert!(observe(&Value::from(1)).is_none());
        assert!(observe(&Value::Null).is_none());

        let raw = Object::new();
        raw.mark_raw();
        assert!(observe(&Value::Object(raw)).is_none());

        let frozen = Object::new();
        frozen.prevent_extensions();
        assert!(observe(&Value::Object(frozen)).is_none());

        let instance = Object::new();
        instance.mark_instance();
        assert!(observe(&Value::Object(instance)).is_none());
    }

    #[test]
    fn server_rendering_disables_observation() {
        config::configure(|c| c.server_rendering = true);
        assert!(observe(&Value::Object(Object::new())).is_none());
    }

    #[test]
    fn toggle_observing_only_blocks_new_observers() {
        let seen = Value::Object(Object::new());
        let existing = observe(&seen).unwrap();

        toggle_observing(false);
        assert!(observe(&Value::Object(Object::new())).is_none());
        assert!(observe(&seen).unwrap().ptr_eq(&existing));
        toggle_observing(true);
    }

    #[test]
    fn observe_as_root_counts_roots() {
        let data = Value::Object(Object::new());
        observe_as_root(&data);
        let observer = observe_as_root(&data).unwrap();
        assert_eq!(observer.root_count(), 2);
        observer.release_root();
        assert_eq!(observer.root_count(), 1);
    }

    #[test]
    fn define_reactive_keeps_existing_cell() {
        let object = Object::new();
        define_reactive(&object, "a", Some(Value::from(1)), true);
        let Some(Slot::Reactive(first)) = object.slot("a") else {
            panic!("expected a reactive slot");
        };

        define_reactive(&object, "a", Some(Value::from(2)), true);
        let Some(Slot::Reactive(second)) = object.slot("a") else {
            panic!("expected a reactive slot");
        };
        assert_eq!(first.channel().id(), second.channel().id());
        assert_eq!(object.get_untracked("a").and_then(|v| v.as_f64()), Some(2.0));
    }

    #[test]
    fn set_on_existing_key_assigns_through_the_cell() {
        let data = Value::from(json!({ "a": 1 }));
        observe(&data);
        set(&data, "a", 5);

        let object = data.as_object().unwrap();
        assert_eq!(object.keys(), vec!["a"]);
        assert_eq!(object.get_untracked("a").and_then(|v| v.as_f64()), Some(5.0));
    }

    #[test]
    fn set_on_unobserved_object_is_plain() {
        let data = Value::Object(Object::new());
        set(&data, "a", 1);
        let object = data.as_object().unwrap();
        assert!(object.contains_key("a"));
        assert!(!object.is_reactive("a"));
    }

    #[test]
    fn set_on_observed_object_adds_reactive_property() {
        let data = Value::Object(Object::new());
        observe(&data);
        set(&data, "fresh", json!({ "x": 1 }));

        let object = data.as_object().unwrap();
        assert!(object.is_reactive("fresh"));
        let fresh = object.get_untracked("fresh").unwrap();
        assert!(fresh.as_object().unwrap().observer().is_some());
    }

    #[test]
    fn set_on_root_data_warns_and_stays_plain() {
        let warnings = capture_warnings();
        let data = Value::Object(Object::new());
        observe_as_root(&data);

        set(&data, "late", 1);

        let object = data.as_object().unwrap();
        assert!(object.contains_key("late"));
        assert!(!object.is_reactive("late"));
        assert_eq!(warnings.borrow().len(), 1);
        assert!(warnings.borrow()[0].contains("\"late\""));
    }

    #[test]
    fn set_and_delete_on_primitives_warn() {
        let warnings = capture_warnings();
        let result = set(&Value::from(3), "a", 1);
        assert_eq!(result.as_f64(), Some(1.0));
        delete(&Value::Null, "a");
        assert_eq!(warnings.borrow().len(), 2);
    }

    #[test]
    fn set_extends_sequences() {
        let data = Value::from(json!([1]));
        observe(&data);
        set(&data, 3usize, 4);

        let array = data.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert!(array.get(1).unwrap().is_null());
        assert_eq!(array.get(3).and_then(|v| v.as_f64()), Some(4.0));
    }

    #[test]
    fn set_refuses_out_of_range_indices() {
        let warnings = capture_warnings();
        let data = Value::from(json!([1, 2]));
        observe(&data);

        set(&data, "100000000000000000", 3);
        set(&data, crate::value::MAX_INDEX, 3);

        assert_eq!(data.as_array().unwrap().len(), 2);
        assert_eq!(warnings.borrow().len(), 2);
        assert!(warnings.borrow()[0].contains("invalid key"));
    }

    #[test]
    fn delete_removes_keys_and_elements() {
        let data = Value::from(json!({ "a": 1, "b": 2, "list": [1, 2, 3] }));
        observe(&data);

        delete(&data, "a");
        delete(&data, "missing");
        let object = data.as_object().unwrap();
        assert_eq!(object.keys(), vec!["b", "list"]);

        let list = object.get_untracked("list").unwrap();
        delete(&list, 1usize);
        let values: Vec<f64> = list.as_array().unwrap().to_vec().iter().filter_map(Value::as_f64).collect();
        assert_eq!(values, vec![1.0, 3.0]);
    }

    #[test]
    fn delete_on_root_data_warns_and_removes() {
        let warnings = capture_warnings();
        let data = Value::from(json!({ "a": 1 }));
        observe_as_root(&data);

        delete(&data, "a");

        assert!(!data.as_object().unwrap().contains_key("a"));
        assert_eq!(warnings.borrow().len(), 1);
    }
}
