//! Instances
//!
//! An [`Instance`] owns one set of root data and the subscribers built on
//! it: derived values, watches and a render effect. Destroying the instance
//! (or dropping it) tears all of them down.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{BoxError, Error};
use crate::observer::{observe_as_root, Observer};
use crate::reactive::{
    watch, Effect, Hook, Memo, SubscriberId, SubscriberOptions, WatchHandle, WatchOptions,
    WatchSource,
};
use crate::value::{Object, Value};

type Hooks = Rc<RefCell<Vec<Hook>>>;

/// Root data plus the computations that depend on it.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{run_ticks, Instance, Value};
///
/// let vm = Instance::new(Value::from(json!({ "count": 1 }))).unwrap();
/// let renders = std::rc::Rc::new(std::cell::Cell::new(0));
///
/// let data = vm.data().clone();
/// let counter = renders.clone();
/// vm.mount(move || {
///     let _ = data.as_object().unwrap().get("count");
///     counter.set(counter.get() + 1);
///     Ok(())
/// })
/// .unwrap();
///
/// vm.assign("count", 2);
/// run_ticks();
/// assert_eq!(renders.get(), 2);
/// ```
pub struct Instance {
    /// The instance root: marked as an instance and holding `$data`.
    vm: Object,
    data: Value,
    observer: Option<Observer>,
    memos: RefCell<IndexMap<String, Memo>>,
    watches: RefCell<Vec<WatchHandle>>,
    render: RefCell<Option<Effect>>,
    before_update: Hooks,
    updated: Hooks,
    destroyed: Cell<bool>,
}

impl Instance {
    /// Create an instance over `data`, which must be an object. The data is
    /// observed as root data, so adding or removing its properties later is
    /// refused with a diagnostic.
    pub fn new(data: Value) -> Result<Self, Error> {
        if data.as_object().is_none() {
            return Err(Error::InvalidData(data.describe()));
        }
        let observer = observe_as_root(&data);

        let vm = Object::new();
        vm.assign("$data", data.clone());
        vm.mark_instance();

        Ok(Self {
            vm,
            data,
            observer,
            memos: RefCell::new(IndexMap::new()),
            watches: RefCell::new(Vec::new()),
            render: RefCell::new(None),
            before_update: Rc::default(),
            updated: Rc::default(),
            destroyed: Cell::new(false),
        })
    }

    /// The root data.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The instance itself as a value, e.g. as a target for
    /// [`set`](crate::observer::set).
    pub fn as_value(&self) -> Value {
        Value::Object(self.vm.clone())
    }

    /// Read a root data property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.as_object().and_then(|data| data.get(key))
    }

    /// Assign a root data property.
    pub fn assign(&self, key: &str, value: impl Into<Value>) {
        if let Some(data) = self.data.as_object() {
            data.assign(key, value);
        }
    }

    /// Define a derived value and return it.
    ///
    /// Redefining a name replaces (and disposes) the previous memo.
    pub fn define_memo<F>(&self, name: &str, compute: F) -> Memo
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        let memo = Memo::new(name, compute);
        if let Some(previous) = self.memos.borrow_mut().insert(name.to_string(), memo.clone()) {
            previous.dispose();
        }
        memo
    }

    pub fn memo(&self, name: &str) -> Option<Memo> {
        self.memos.borrow().get(name).cloned()
    }

    /// Watch `source` for the lifetime of the instance.
    pub fn watch<C>(
        &self,
        source: WatchSource,
        callback: C,
        options: WatchOptions,
    ) -> Result<SubscriberId, Error>
    where
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let handle = watch(source, callback, options)?;
        let id = handle.subscriber().id();
        self.watches.borrow_mut().push(handle);
        Ok(id)
    }

    /// Watch a dot path into the root data.
    pub fn watch_path<C>(
        &self,
        path: &str,
        callback: C,
        options: WatchOptions,
    ) -> Result<SubscriberId, Error>
    where
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        self.watch(WatchSource::path(&self.data, path), callback, options)
    }

    /// Stop one watch created through this instance.
    pub fn unwatch(&self, id: SubscriberId) {
        let mut watches = self.watches.borrow_mut();
        if let Some(position) = watches.iter().position(|w| w.subscriber().id() == id) {
            watches.remove(position).unwatch();
        }
    }

    /// Install the render function and run it once.
    ///
    /// A previously mounted render effect is disposed.
    pub fn mount<F>(&self, render: F) -> Result<(), Error>
    where
        F: Fn() -> Result<(), BoxError> + 'static,
    {
        let before = self.before_update.clone();
        let updated = self.updated.clone();
        let options = SubscriberOptions::default()
            .before(move || run_hooks(&before))
            .updated(move || run_hooks(&updated));
        let effect = Effect::with_options("render", render, options)?;
        if let Some(previous) = self.render.replace(Some(effect)) {
            previous.dispose();
        }
        Ok(())
    }

    /// Register a hook run before each scheduled re-render.
    pub fn on_before_update(&self, hook: impl Fn() + 'static) {
        self.before_update.borrow_mut().push(Rc::new(hook));
    }

    /// Register a hook run after a flush that re-rendered this instance.
    pub fn on_updated(&self, hook: impl Fn() + 'static) {
        self.updated.borrow_mut().push(Rc::new(hook));
    }

    /// Queue a re-render even though no dependency changed.
    pub fn force_update(&self) {
        if let Some(render) = self.render.borrow().as_ref() {
            render.schedule();
        }
    }

    pub fn render_count(&self) -> usize {
        self.render.borrow().as_ref().map_or(0, Effect::run_count)
    }

    /// Tear down every owned subscriber and release the root data.
    ///
    /// Calling this more than once has no further effect.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        if let Some(render) = self.render.borrow_mut().take() {
            render.dispose();
        }
        for handle in self.watches.borrow_mut().drain(..) {
            handle.unwatch();
        }
        for (_, memo) in self.memos.borrow_mut().drain(..) {
            memo.dispose();
        }
        if let Some(observer) = &self.observer {
            observer.release_root();
        }
        tracing::trace!("instance destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

fn run_hooks(hooks: &Hooks) {
    let hooks: Vec<Hook> = hooks.borrow().clone();
    for hook in &hooks {
        hook();
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("data", &self.data)
            .field("memos", &self.memos.borrow().keys().collect::<Vec<_>>())
            .field("watches", &self.watches.borrow().len())
            .field("mounted", &self.render.borrow().is_some())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}
