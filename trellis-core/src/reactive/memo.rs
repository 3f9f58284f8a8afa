//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. A memo is backed by a lazy [`Subscriber`]. Nothing runs on creation.
//!
//! 2. On access, a stale memo re-runs its computation and caches the result.
//!
//! 3. When a dependency changes, the memo is only marked stale. It does not
//!    recompute until someone reads it again.
//!
//! 4. Reading a memo from inside another computation hands the memo's own
//!    dependencies to the reader, so the reader is invalidated by the same
//!    writes that invalidate the memo.
//!
//! Memos that are never read stay stale and cost nothing.

use std::fmt;

use crate::error::{BoxError, Error};
use crate::value::Value;

use super::context::ReactiveContext;
use super::subscriber::Subscriber;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{observe, Memo, Value};
///
/// let data = Value::from(json!({ "price": 3, "qty": 2 }));
/// observe(&data);
/// let obj = data.as_object().unwrap().clone();
///
/// let source = obj.clone();
/// let total = Memo::new("total", move || {
///     let price = source.get("price").and_then(|v| v.as_f64()).unwrap_or(0.0);
///     let qty = source.get("qty").and_then(|v| v.as_f64()).unwrap_or(0.0);
///     Ok(Value::from(price * qty))
/// });
///
/// assert_eq!(total.get().unwrap().as_f64(), Some(6.0));
/// obj.assign("qty", 5);
/// assert_eq!(total.get().unwrap().as_f64(), Some(15.0));
/// ```
#[derive(Clone)]
pub struct Memo {
    subscriber: Subscriber,
}

impl Memo {
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Self {
            subscriber: Subscriber::new_lazy(name, compute),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a running computation the memo's dependencies are added to the
    /// caller's.
    pub fn get(&self) -> Result<Value, Error> {
        if self.subscriber.is_dirty() {
            self.subscriber.evaluate()?;
        }
        if ReactiveContext::is_active() {
            self.subscriber.depend();
        }
        Ok(self.subscriber.value())
    }

    /// Whether the cached value is out of date.
    pub fn is_stale(&self) -> bool {
        self.subscriber.is_dirty()
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Stop tracking. The last cached value stays readable.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("name", &self.subscriber.expression())
            .field("stale", &self.is_stale())
            .field("value", &self.subscriber.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::value::Object;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counted_double(data: &Object, calls: &Rc<Cell<u32>>) -> Memo {
        let source = data.clone();
        let calls = calls.clone();
        Memo::new("double", move || {
            calls.set(calls.get() + 1);
            let n = source.get("n").and_then(|v| v.as_f64()).unwrap_or_default();
            Ok(Value::from(n * 2.0))
        })
    }

    fn observed(json: serde_json::Value) -> Object {
        let data = Value::from(json);
        observe(&data);
        data.as_object().unwrap().clone()
    }

    #[test]
    fn memo_computes_on_first_access() {
        let data = observed(json!({ "n": 2 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);

        assert_eq!(calls.get(), 0);
        assert!(memo.is_stale());
        assert_eq!(memo.get().unwrap().as_f64(), Some(4.0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let data = observed(json!({ "n": 2 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);

        memo.get().unwrap();
        memo.get().unwrap();
        memo.get().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn memo_recomputes_lazily_after_a_write() {
        let data = observed(json!({ "n": 2 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);
        memo.get().unwrap();

        data.assign("n", 5);
        data.assign("n", 6);
        assert!(memo.is_stale());
        assert_eq!(calls.get(), 1);

        assert_eq!(memo.get().unwrap().as_f64(), Some(12.0));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn memo_clone_shares_state() {
        let data = observed(json!({ "n": 1 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);
        let other = memo.clone();

        memo.get().unwrap();
        assert!(!other.is_stale());
        assert_eq!(other.get().unwrap().as_f64(), Some(2.0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reader_inherits_memo_dependencies() {
        let data = observed(json!({ "n": 1 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);

        let inner = memo.clone();
        let reader = Subscriber::new_lazy("reader", move || Ok(inner.get()?));
        reader.evaluate().unwrap();
        assert_eq!(reader.dependency_count(), 1);

        data.assign("n", 3);
        assert!(reader.is_dirty());
        assert_eq!(reader.evaluate().unwrap().as_f64(), Some(6.0));
    }

    #[test]
    fn disposed_memo_keeps_last_value() {
        let data = observed(json!({ "n": 1 }));
        let calls = Rc::new(Cell::new(0));
        let memo = counted_double(&data, &calls);
        memo.get().unwrap();

        memo.dispose();
        data.assign("n", 9);
        assert!(!memo.is_stale());
        assert_eq!(memo.get().unwrap().as_f64(), Some(2.0));
    }
}
