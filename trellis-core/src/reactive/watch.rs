//! User watches.
//!
//! A watch pairs a source (a getter or a dot path into some data) with a
//! callback receiving `(new, old)` whenever the source's value changes.
//! Watches are recoverable: failures of the source or the callback are
//! reported to the error sink and never interrupt other work.

use std::fmt;
use std::rc::Rc;

use crate::error::{handle_error, warn, BoxError, Error};
use crate::value::Value;

use super::context::untracked;
use super::path::PathGetter;
use super::subscriber::{Callback, Getter, Subscriber, SubscriberOptions};

/// What a watch reads.
#[derive(Clone)]
pub enum WatchSource {
    /// A dot-delimited path resolved against `root`.
    Path { root: Value, path: String },
    /// An arbitrary computation.
    Getter { expression: String, getter: Getter },
}

impl WatchSource {
    pub fn path(root: &Value, path: impl Into<String>) -> Self {
        WatchSource::Path {
            root: root.clone(),
            path: path.into(),
        }
    }

    pub fn getter<F>(expression: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        WatchSource::Getter {
            expression: expression.into(),
            getter: Rc::new(getter),
        }
    }

    fn into_getter(self) -> (String, Getter) {
        match self {
            WatchSource::Getter { expression, getter } => (expression, getter),
            WatchSource::Path { root, path } => match PathGetter::parse(&path) {
                Ok(parsed) => (path, Rc::new(move || Ok(parsed.resolve(&root)))),
                Err(error) => {
                    warn(&error);
                    (path, Rc::new(|| Ok(Value::Null)))
                }
            },
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Path { path, .. } => f.debug_tuple("Path").field(path).finish(),
            WatchSource::Getter { expression, .. } => {
                f.debug_tuple("Getter").field(expression).finish()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire on mutations anywhere inside the watched value.
    pub deep: bool,
    /// Fire inline on every change instead of once per flush.
    pub sync: bool,
    /// Fire once right away with the initial value.
    pub immediate: bool,
}

/// A live watch. The watch stops when [`unwatch`](Self::unwatch) is called
/// or the handle is dropped.
#[must_use = "dropping a WatchHandle stops the watch"]
pub struct WatchHandle {
    subscriber: Subscriber,
}

impl WatchHandle {
    pub fn unwatch(&self) {
        self.subscriber.teardown();
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.is_active()
    }

    /// The watched value as of the last evaluation.
    pub fn value(&self) -> Value {
        self.subscriber.value()
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.subscriber.teardown();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("expression", &self.subscriber.expression())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Watch `source` and call `callback(new, old)` when it changes.
///
/// An invalid path is reported as a diagnostic and the watch never fires.
pub fn watch<C>(source: WatchSource, callback: C, options: WatchOptions) -> Result<WatchHandle, Error>
where
    C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
{
    let (expression, getter) = source.into_getter();
    let callback: Callback = Rc::new(callback);
    let subscriber = Subscriber::new(
        expression,
        move || getter(),
        Some(callback.clone()),
        SubscriberOptions::default()
            .user(true)
            .deep(options.deep)
            .sync(options.sync),
    )?;

    if options.immediate {
        let value = subscriber.value();
        if let Err(source) = untracked(|| callback(&value, &Value::Null)) {
            let error = Error::Callback {
                subscriber: subscriber.id(),
                expression: subscriber.expression().to_string(),
                source,
            };
            handle_error(
                &error,
                &format!("callback for immediate watcher \"{}\"", subscriber.expression()),
            );
        }
    }

    tracing::trace!(subscriber = subscriber.id().raw(), expression = subscriber.expression(), "watch");
    Ok(WatchHandle { subscriber })
}

/// Shorthand for watching a dot path into `root`.
pub fn watch_path<C>(
    root: &Value,
    path: &str,
    callback: C,
    options: WatchOptions,
) -> Result<WatchHandle, Error>
where
    C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
{
    watch(WatchSource::path(root, path), callback, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::observer::observe;
    use crate::scheduler::run_ticks;
    use serde_json::json;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Log, impl Fn(&Value, &Value) -> Result<(), BoxError>) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        })
    }

    fn root(json: serde_json::Value) -> Value {
        let data = Value::from(json);
        observe(&data);
        data
    }

    #[test]
    fn path_watch_fires_after_flush() {
        let data = root(json!({ "user": { "name": "ada" } }));
        let (log, callback) = recorder();
        let handle = watch_path(&data, "user.name", callback, WatchOptions::default()).unwrap();
        assert_eq!(handle.value().as_str(), Some("ada"));

        let user = data.as_object().unwrap().get_untracked("user").unwrap();
        user.as_object().unwrap().assign("name", "grace");
        assert!(log.borrow().is_empty());

        run_ticks();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0.as_str(), Some("grace"));
        assert_eq!(log[0].1.as_str(), Some("ada"));
    }

    #[test]
    fn immediate_fires_with_initial_value() {
        let data = root(json!({ "n": 1 }));
        let (log, callback) = recorder();
        let options = WatchOptions {
            immediate: true,
            ..Default::default()
        };
        let _handle = watch_path(&data, "n", callback, options).unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0.as_f64(), Some(1.0));
        assert!(log[0].1.is_null());
    }

    #[test]
    fn deep_watch_sees_nested_mutation() {
        let data = root(json!({ "config": { "inner": { "x": 1 } } }));
        let (log, callback) = recorder();
        let options = WatchOptions {
            deep: true,
            sync: true,
            ..Default::default()
        };
        let _handle = watch_path(&data, "config", callback, options).unwrap();

        let inner = crate::reactive::PathGetter::parse("config.inner")
            .unwrap()
            .resolve(&data);
        inner.as_object().unwrap().assign("x", 2);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let data = root(json!({ "n": 1 }));
        let (log, callback) = recorder();
        let options = WatchOptions {
            sync: true,
            ..Default::default()
        };
        let handle = watch_path(&data, "n", callback, options).unwrap();

        handle.unwatch();
        assert!(!handle.is_active());
        data.as_object().unwrap().assign("n", 2);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dropped_handle_skips_the_pending_callback() {
        let data = root(json!({ "a": 1 }));
        let (log, callback) = recorder();
        let handle = watch_path(&data, "a", callback, WatchOptions::default()).unwrap();
        let subscriber = handle.subscriber().clone();

        data.as_object().unwrap().assign("a", 2);
        drop(handle);
        run_ticks();

        assert!(log.borrow().is_empty());
        assert!(!subscriber.is_active());
        assert_eq!(subscriber.dependency_count(), 0);
    }

    #[test]
    fn invalid_path_warns_and_never_fires() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::configure(|c| {
            c.warn_handler = Some(Rc::new(move |e: &Error| sink.borrow_mut().push(e.to_string())));
        });

        let data = root(json!({ "a": 1 }));
        let (log, callback) = recorder();
        let handle = watch_path(&data, "a + 1", callback, WatchOptions::default()).unwrap();

        assert_eq!(warnings.borrow().len(), 1);
        assert!(handle.value().is_null());
        data.as_object().unwrap().assign("a", 2);
        run_ticks();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn getter_failure_is_reported_not_propagated() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        config::configure(|c| {
            c.error_handler = Some(Rc::new(move |_: &Error, info: &str| {
                sink.borrow_mut().push(info.to_string())
            }));
        });

        let (_log, callback) = recorder();
        let handle = watch(
            WatchSource::getter("broken", || Err("nope".into())),
            callback,
            WatchOptions::default(),
        )
        .unwrap();

        assert!(handle.is_active());
        assert_eq!(*reports.borrow(), vec!["getter for watcher \"broken\"".to_string()]);
    }
}
