//! Deferred callbacks.
//!
//! The tick queue stands in for the host's microtask queue. Callbacks
//! registered with [`next_tick`] run, in registration order, the next time
//! the queue is drained with [`run_ticks`]. Callbacks registered while
//! draining run in the same drain.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::{handle_error, Error};

type Tick = Box<dyn FnOnce() -> Result<(), Error>>;

thread_local! {
    static TICKS: RefCell<VecDeque<Tick>> = RefCell::new(VecDeque::new());
}

/// Defer `callback` until the end of the current burst.
pub fn next_tick(callback: impl FnOnce() -> Result<(), Error> + 'static) {
    TICKS.with(|ticks| ticks.borrow_mut().push_back(Box::new(callback)));
}

/// Drain the tick queue. Returns how many callbacks ran.
///
/// Errors are reported to the error sink and do not stop the drain.
pub fn run_ticks() -> usize {
    let mut ran = 0;
    while let Some(tick) = TICKS.with(|ticks| ticks.borrow_mut().pop_front()) {
        ran += 1;
        if let Err(error) = tick() {
            handle_error(&error, "nextTick");
        }
    }
    ran
}

pub fn has_pending_ticks() -> bool {
    TICKS.with(|ticks| !ticks.borrow().is_empty())
}

/// Run `f` as one burst: mutations inside are flushed together once it
/// returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let result = f();
    run_ticks();
    result
}
