//! Sequences with intercepted mutation.
//!
//! Element access on a sequence cannot be intercepted per index, so an
//! [`Array`] tracks changes as a whole: every mutating method performs the
//! mutation, brings newly inserted elements under observation and notifies
//! the array's own channel. Subscribers depend on that channel through the
//! property that holds the array.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::observer::{self, Observer};

use super::Value;

struct ArrayData {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Observer>>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
}

/// A sequence of values.
///
/// Cloning an `Array` creates a new handle to the same sequence.
#[derive(Clone)]
pub struct Array(Rc<ArrayData>);

impl Array {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            items: RefCell::new(items),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            raw: Cell::new(false),
        }))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Append an element, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.push(value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.0.items.borrow_mut().pop();
        self.mutated(&[]);
        popped
    }

    /// Remove the first element.
    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            (!items.is_empty()).then(|| items.remove(0))
        };
        self.mutated(&[]);
        shifted
    }

    /// Prepend an element, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.insert(0, value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert `insert`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            items.splice(start..end, insert.iter().cloned()).collect()
        };
        self.mutated(&insert);
        removed
    }

    /// Sort in place with a comparator.
    ///
    /// The array reads as empty from inside the comparator.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut items = std::mem::take(&mut *self.0.items.borrow_mut());
        items.sort_by(compare);
        *self.0.items.borrow_mut() = items;
        self.mutated(&[]);
    }

    pub fn reverse(&self) {
        self.0.items.borrow_mut().reverse();
        self.mutated(&[]);
    }

    /// The observer attached to this array, if it is under observation.
    pub fn observer(&self) -> Option<Observer> {
        self.0.observer.borrow().clone()
    }

    /// Non-extensible arrays are never brought under observation.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Exclude this array from observation.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Grow to at least `len` elements, padding with `Null`. Does not notify.
    ///
    /// Returns false, leaving the array untouched, if the memory cannot be
    /// reserved.
    pub(crate) fn extend_to(&self, len: usize) -> bool {
        let mut items = self.0.items.borrow_mut();
        let missing = len.saturating_sub(items.len());
        if missing == 0 {
            return true;
        }
        if items.try_reserve_exact(missing).is_err() {
            return false;
        }
        items.resize(len, Value::Null);
        true
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    fn mutated(&self, inserted: &[Value]) {
        let Some(observer) = self.observer() else {
            return;
        };
        for value in inserted {
            observer::observe(value);
        }
        observer.channel().notify();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self::from_vec(items)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(array: &Array) -> Vec<f64> {
        array.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn push_pop_shift_unshift() {
        let array = Array::new();
        assert_eq!(array.push(1), 1);
        assert_eq!(array.push(2), 2);
        assert_eq!(array.unshift(0), 3);
        assert_eq!(numbers(&array), vec![0.0, 1.0, 2.0]);

        assert_eq!(array.shift().and_then(|v| v.as_f64()), Some(0.0));
        assert_eq!(array.pop().and_then(|v| v.as_f64()), Some(2.0));
        assert_eq!(numbers(&array), vec![1.0]);

        array.pop();
        assert!(array.shift().is_none());
    }

    #[test]
    fn splice_clamps_arguments() {
        let array: Array = (0..5).map(Value::from).collect();

        let removed = array.splice(1, 2, vec![Value::from(9)]);
        assert_eq!(removed.len(), 2);
        assert_eq!(numbers(&array), vec![0.0, 9.0, 3.0, 4.0]);

        let removed = array.splice(10, 3, vec![Value::from(7)]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&array), vec![0.0, 9.0, 3.0, 4.0, 7.0]);

        let removed = array.splice(3, 100, Vec::new());
        assert_eq!(removed.len(), 2);
        assert_eq!(array.len(), 3);
    }

    #[test]
    fn sort_and_reverse() {
        let array: Array = [3, 1, 2].into_iter().map(Value::from).collect();
        array.sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal));
        assert_eq!(numbers(&array), vec![1.0, 2.0, 3.0]);

        array.reverse();
        assert_eq!(numbers(&array), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn extend_to_pads_with_null() {
        let array = Array::new();
        assert!(array.extend_to(2));
        assert_eq!(array.len(), 2);
        assert!(array.get(1).is_some_and(|v| v.is_null()));

        assert!(array.extend_to(1));
        assert_eq!(array.len(), 2);
    }
}
