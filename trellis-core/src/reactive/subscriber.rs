//! Subscriber types for the reactive system.
//!
//! A Subscriber represents one computation that depends on observed data:
//! a render function, a derived value, or a user watch. Each evaluation
//! rebuilds its dependency set from the channels it actually read.
//!
//! # Lifecycle
//!
//! ```text
//! constructing -> evaluated -> (stale <-> evaluated) -> torn down
//! ```
//!
//! Eager subscribers evaluate on construction. Lazy subscribers start stale
//! and evaluate on demand through [`Subscriber::evaluate`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::{handle_error, BoxError, Error};
use crate::observer::traverse;
use crate::scheduler;
use crate::value::Value;

use super::channel::{Channel, ChannelId};
use super::context::{untracked, ReactiveContext};

/// Unique identifier for a subscriber.
///
/// Ids increase monotonically in creation order. The scheduler relies on
/// this to run parents (created earlier) before their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The computation a subscriber evaluates.
pub type Getter = Rc<dyn Fn() -> Result<Value, BoxError>>;

/// Invoked with `(new, old)` after a re-run produced a changed value.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<(), BoxError>>;

/// A lifecycle hook run around re-runs.
pub type Hook = Rc<dyn Fn()>;

/// Mode flags and hooks for a [`Subscriber`].
#[derive(Clone, Default)]
pub struct SubscriberOptions {
    /// Compute on demand and cache until invalidated.
    pub lazy: bool,
    /// Re-run inline on notification instead of through the scheduler.
    pub sync: bool,
    /// Depend on every nested value of the result.
    pub deep: bool,
    /// Report evaluation failures instead of propagating them.
    pub user: bool,
    /// Called by the scheduler right before a re-run.
    pub before: Option<Hook>,
    /// Called once a flush that re-ran this subscriber has completed.
    pub updated: Option<Hook>,
}

impl SubscriberOptions {
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn updated(mut self, hook: impl Fn() + 'static) -> Self {
        self.updated = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for SubscriberOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberOptions")
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("before", &self.before.is_some())
            .field("updated", &self.updated.is_some())
            .finish()
    }
}

struct SubscriberData {
    id: SubscriberId,
    /// Human-readable description used in error reports.
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    lazy: bool,
    sync: bool,
    deep: bool,
    user: bool,
    before: Option<Hook>,
    updated: Option<Hook>,
    value: RefCell<Value>,
    /// Set when a lazy subscriber's cached value is out of date.
    dirty: Cell<bool>,
    active: Cell<bool>,
    /// Channels read during the last completed evaluation.
    deps: RefCell<IndexMap<ChannelId, Channel>>,
    /// Channels read so far during the evaluation in progress.
    new_deps: RefCell<IndexMap<ChannelId, Channel>>,
}

impl Drop for SubscriberData {
    fn drop(&mut self) {
        for channel in self.deps.get_mut().values() {
            channel.unsubscribe(self.id);
        }
    }
}

/// A computation with a dynamically rebuilt dependency set.
///
/// Cloning a `Subscriber` creates a new handle to the same computation.
/// Channels only hold weak references, so a subscriber lives as long as its
/// owner keeps a handle (or the scheduler has it queued).
#[derive(Clone)]
pub struct Subscriber(Rc<SubscriberData>);

impl Subscriber {
    /// Create a subscriber.
    ///
    /// Unless `options.lazy` is set the getter is evaluated immediately, and
    /// a failure of a non-user subscriber is returned as an error.
    pub fn new<F>(
        expression: impl Into<String>,
        getter: F,
        callback: Option<Callback>,
        options: SubscriberOptions,
    ) -> Result<Self, Error>
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        let subscriber = Self::build(expression.into(), Rc::new(getter), callback, options);
        if !subscriber.0.lazy {
            if let Some(value) = subscriber.collect()? {
                *subscriber.0.value.borrow_mut() = value;
            }
        }
        Ok(subscriber)
    }

    /// Create a lazy subscriber with no callback.
    pub fn new_lazy<F>(expression: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Self::build(
            expression.into(),
            Rc::new(getter),
            None,
            SubscriberOptions::default().lazy(true),
        )
    }

    fn build(
        expression: String,
        getter: Getter,
        callback: Option<Callback>,
        options: SubscriberOptions,
    ) -> Self {
        Self(Rc::new(SubscriberData {
            id: SubscriberId::new(),
            expression,
            getter,
            callback,
            lazy: options.lazy,
            sync: options.sync,
            deep: options.deep,
            user: options.user,
            before: options.before,
            updated: options.updated,
            value: RefCell::new(Value::Null),
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            deps: RefCell::new(IndexMap::new()),
            new_deps: RefCell::new(IndexMap::new()),
        }))
    }

    /// Evaluate the getter and collect dependencies.
    ///
    /// Returns the fresh value. If a user subscriber's getter fails, the
    /// failure is reported and the previous cached value is returned.
    pub fn get(&self) -> Result<Value, Error> {
        Ok(self.collect()?.unwrap_or_else(|| self.value()))
    }

    /// One evaluation. `Ok(None)` means a user getter failed and the failure
    /// was reported.
    fn collect(&self) -> Result<Option<Value>, Error> {
        let result = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));
            let result = (self.0.getter)();
            if self.0.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        match result {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                let error = Error::Evaluation {
                    subscriber: self.0.id,
                    expression: self.0.expression.clone(),
                    source,
                };
                if self.0.user {
                    handle_error(
                        &error,
                        &format!("getter for watcher \"{}\"", self.0.expression),
                    );
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Record `channel` as a dependency of the evaluation in progress.
    pub(crate) fn add_dep(&self, channel: &Channel) {
        if !self.0.active.get() {
            return;
        }
        let id = channel.id();
        if self.0.new_deps.borrow().contains_key(&id) {
            return;
        }
        self.0.new_deps.borrow_mut().insert(id, channel.clone());
        if !self.0.deps.borrow().contains_key(&id) {
            channel.subscribe(self);
        }
    }

    /// Drop channels that the last evaluation no longer read and promote the
    /// pending set to the current one.
    ///
    /// A subscriber torn down during the evaluation keeps no dependencies.
    fn cleanup_deps(&self) {
        let fresh = std::mem::take(&mut *self.0.new_deps.borrow_mut());
        let stale = std::mem::replace(&mut *self.0.deps.borrow_mut(), fresh);
        for (id, channel) in &stale {
            if !self.0.deps.borrow().contains_key(id) {
                channel.unsubscribe(self.0.id);
            }
        }
        if !self.0.active.get() {
            let kept = std::mem::take(&mut *self.0.deps.borrow_mut());
            for channel in kept.values() {
                channel.unsubscribe(self.0.id);
            }
        }
    }

    /// React to a change in one of the dependencies.
    pub fn update(&self) {
        if !self.0.active.get() {
            return;
        }
        if self.0.lazy {
            self.0.dirty.set(true);
        } else if self.0.sync {
            if let Err(error) = self.run() {
                handle_error(&error, "sync watcher");
            }
        } else {
            scheduler::queue_subscriber(self.clone());
        }
    }

    /// Re-evaluate and invoke the callback when the value changed.
    ///
    /// Containers and deep subscribers always count as changed, since their
    /// contents may have been mutated in place. Callback failures are
    /// reported, never returned.
    pub fn run(&self) -> Result<(), Error> {
        if !self.0.active.get() {
            return Ok(());
        }
        let Some(value) = self.collect()? else {
            return Ok(());
        };
        let changed = {
            let current = self.0.value.borrow();
            !value.is_identical(&current) || value.is_container() || self.0.deep
        };
        if !changed {
            return Ok(());
        }
        let old = self.0.value.replace(value.clone());
        if let Some(callback) = &self.0.callback {
            if let Err(source) = untracked(|| callback(&value, &old)) {
                let error = Error::Callback {
                    subscriber: self.0.id,
                    expression: self.0.expression.clone(),
                    source,
                };
                handle_error(
                    &error,
                    &format!("callback for watcher \"{}\"", self.0.expression),
                );
            }
        }
        Ok(())
    }

    /// Bring a lazy subscriber's cached value up to date and return it.
    pub fn evaluate(&self) -> Result<Value, Error> {
        if let Some(value) = self.collect()? {
            *self.0.value.borrow_mut() = value;
        }
        self.0.dirty.set(false);
        Ok(self.value())
    }

    /// Make the enclosing subscriber depend on everything this one depends on.
    pub fn depend(&self) {
        let channels: Vec<Channel> = self.0.deps.borrow().values().cloned().collect();
        for channel in &channels {
            channel.depend();
        }
    }

    /// Unsubscribe from every dependency. Later notifications are ignored.
    ///
    /// Calling this more than once has no further effect.
    pub fn teardown(&self) {
        if !self.0.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.0.deps.borrow_mut());
        for channel in deps.values() {
            channel.unsubscribe(self.0.id);
        }
        tracing::trace!(subscriber = self.0.id.raw(), expression = %self.0.expression, "teardown");
    }

    pub(crate) fn call_before_hook(&self) {
        if let Some(hook) = &self.0.before {
            if self.0.active.get() {
                untracked(|| hook());
            }
        }
    }

    pub(crate) fn call_updated_hook(&self) {
        if let Some(hook) = &self.0.updated {
            if self.0.active.get() {
                untracked(|| hook());
            }
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    /// The cached value of the last evaluation.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    pub fn is_sync(&self) -> bool {
        self.0.sync
    }

    pub fn is_deep(&self) -> bool {
        self.0.deep
    }

    pub fn is_user(&self) -> bool {
        self.0.user
    }

    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    pub fn depends_on(&self, channel: &Channel) -> bool {
        self.0.deps.borrow().contains_key(&channel.id())
    }

    /// Dependency channel ids in the order they were first read.
    pub fn dependency_ids(&self) -> Vec<ChannelId> {
        self.0.deps.borrow().keys().copied().collect()
    }

    pub fn downgrade(&self) -> WeakSubscriber {
        WeakSubscriber(Rc::downgrade(&self.0))
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.0.id)
            .field("expression", &self.0.expression)
            .field("lazy", &self.0.lazy)
            .field("dirty", &self.0.dirty.get())
            .field("active", &self.0.active.get())
            .field("deps", &self.dependency_ids())
            .finish()
    }
}

/// A non-owning handle to a [`Subscriber`], as held by channels.
#[derive(Clone)]
pub struct WeakSubscriber(Weak<SubscriberData>);

impl WeakSubscriber {
    pub fn upgrade(&self) -> Option<Subscriber> {
        self.0.upgrade().map(Subscriber)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(subscriber) => write!(f, "WeakSubscriber({:?})", subscriber.id()),
            None => f.write_str("WeakSubscriber(dropped)"),
        }
    }
}
