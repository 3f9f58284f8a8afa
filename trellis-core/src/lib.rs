//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive engine.
//! It implements:
//!
//! - Observation of plain data (objects and sequences)
//! - Automatic dependency tracking through channels and subscribers
//! - Derived values, effects and user watches
//! - A batching update scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the plain data model the engine observes
//! - `observer`: bringing data under observation, `set` and `delete`
//! - `reactive`: channels, subscribers and the layers built on them
//! - `scheduler`: the update queue and the tick queue that flushes it
//! - `instance`: a minimal owner for root data and its subscribers
//!
//! The engine is single-threaded. Configuration, the scheduler queue and the
//! active-subscriber stack are per thread.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use serde_json::json;
//! use trellis_core::{observe, run_ticks, watch_path, Value, WatchOptions};
//!
//! let state = Value::from(json!({ "count": 0 }));
//! observe(&state);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let _handle = watch_path(
//!     &state,
//!     "count",
//!     move |new, _old| {
//!         sink.borrow_mut().push(new.as_f64());
//!         Ok(())
//!     },
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! let obj = state.as_object().unwrap();
//! obj.assign("count", 1);
//! obj.assign("count", 2);
//! run_ticks();
//!
//! // Both writes were coalesced into one flush.
//! assert_eq!(*seen.borrow(), vec![Some(2.0)]);
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use config::Config;
pub use error::{handle_error, warn, BoxError, Error};
pub use instance::Instance;
pub use observer::{
    define_reactive, delete, observable, observe, observe_as_root, set, should_observe,
    toggle_observing, traverse, Observer,
};
pub use reactive::{
    untracked, watch, watch_path, Channel, Effect, Memo, PathGetter, Subscriber, SubscriberId,
    SubscriberOptions, WatchHandle, WatchOptions, WatchSource,
};
pub use scheduler::{batch, has_pending_ticks, next_tick, run_ticks};
pub use value::{Array, Key, Object, Value};
