//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Render functions are effects: they re-derive a tree
//! description from observed data and apply it.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the scheduler and
//!    re-runs once per flush, however many of its dependencies changed.
//!
//! 3. Each run rebuilds the dependency set from what was actually read.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BoxError, Error};
use crate::value::Value;

use super::subscriber::{Subscriber, SubscriberOptions};

/// A side-effecting computation that runs when dependencies change.
///
/// Clones share one effect. It stops running once [`dispose`](Self::dispose)
/// is called or the last clone is dropped, even with a re-run already queued.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{observe, run_ticks, Effect, Value};
///
/// let data = Value::from(json!({ "count": 0 }));
/// observe(&data);
/// let obj = data.as_object().unwrap().clone();
///
/// let source = obj.clone();
/// let effect = Effect::new("log", move || {
///     let _ = source.get("count");
///     Ok(())
/// })
/// .unwrap();
///
/// obj.assign("count", 5);
/// run_ticks();
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    subscriber: Subscriber,

    /// Number of times the effect has run.
    run_count: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish dependencies. An error from
    /// that first run is returned.
    pub fn new<F>(name: impl Into<String>, run: F) -> Result<Self, Error>
    where
        F: Fn() -> Result<(), BoxError> + 'static,
    {
        Self::with_options(name, run, SubscriberOptions::default())
    }

    /// Create an effect with explicit subscriber options, e.g. to install
    /// before/updated hooks. `lazy` is ignored.
    pub fn with_options<F>(
        name: impl Into<String>,
        run: F,
        options: SubscriberOptions,
    ) -> Result<Self, Error>
    where
        F: Fn() -> Result<(), BoxError> + 'static,
    {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();
        let subscriber = Subscriber::new(
            name,
            move || {
                counter.set(counter.get() + 1);
                run()?;
                Ok(Value::Null)
            },
            None,
            options.lazy(false),
        )?;
        Ok(Self {
            subscriber,
            run_count,
        })
    }

    /// Queue a re-run as if a dependency had changed.
    pub fn schedule(&self) {
        self.subscriber.update();
    }

    /// Re-run right now, outside the scheduler.
    pub fn execute(&self) -> Result<(), Error> {
        self.subscriber.run()
    }

    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    pub fn is_disposed(&self) -> bool {
        !self.subscriber.is_active()
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.subscriber.expression())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::scheduler::run_ticks;
    use crate::value::Object;
    use serde_json::json;
    use std::cell::RefCell;

    fn observed(json: serde_json::Value) -> Object {
        let data = Value::from(json);
        observe(&data);
        data.as_object().unwrap().clone()
    }

    #[test]
    fn effect_runs_immediately() {
        let data = observed(json!({ "n": 1 }));
        let source = data.clone();
        let effect = Effect::new("read", move || {
            let _ = source.get("n");
            Ok(())
        })
        .unwrap();

        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.subscriber().dependency_count(), 1);
    }

    #[test]
    fn effect_reruns_once_per_flush() {
        let data = observed(json!({ "a": 1, "b": 2 }));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let source = data.clone();
        let seen_clone = seen.clone();
        let effect = Effect::new("sum", move || {
            let a = source.get("a").and_then(|v| v.as_f64()).unwrap_or_default();
            let b = source.get("b").and_then(|v| v.as_f64()).unwrap_or_default();
            seen_clone.borrow_mut().push(a + b);
            Ok(())
        })
        .unwrap();

        data.assign("a", 10);
        data.assign("b", 20);
        assert_eq!(effect.run_count(), 1);

        run_ticks();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(*seen.borrow(), vec![3.0, 30.0]);
    }

    #[test]
    fn disposed_effect_stops_running() {
        let data = observed(json!({ "n": 1 }));
        let source = data.clone();
        let effect = Effect::new("read", move || {
            let _ = source.get("n");
            Ok(())
        })
        .unwrap();

        effect.dispose();
        assert!(effect.is_disposed());
        data.assign("n", 2);
        run_ticks();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dropped_effect_skips_the_pending_run() {
        let data = observed(json!({ "n": 1 }));
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = data.clone();
        let effect = Effect::new("read", move || {
            counter.set(counter.get() + 1);
            let _ = source.get("n");
            Ok(())
        })
        .unwrap();

        data.assign("n", 2);
        drop(effect);
        run_ticks();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn schedule_forces_a_rerun() {
        let effect = Effect::new("constant", || Ok(())).unwrap();
        effect.schedule();
        run_ticks();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn first_run_failure_is_returned() {
        let result = Effect::new("broken", || Err("render failed".into()));
        assert!(matches!(result, Err(Error::Evaluation { .. })));
    }
}
