//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! When an observed property is read, its channel asks the context for the
//! active subscriber and registers itself as one of that subscriber's
//! dependencies.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes an entry and the
//! returned guard pops it on drop, so nested evaluations (a memo read inside
//! an effect) restore the outer subscriber when they finish.
//!
//! An entry may be empty. Pushing an empty entry suspends tracking for the
//! duration of a closure, which is how [`untracked`] is implemented.

use std::cell::RefCell;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Subscriber>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
///
/// This ensures the stack is properly maintained even if the evaluation
/// returns early with an error.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Make `target` the active subscriber until the guard is dropped.
    ///
    /// `None` suspends dependency collection.
    pub fn enter(target: Option<Subscriber>) -> Self {
        let subscriber_id = target.as_ref().map(Subscriber::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { subscriber_id }
    }

    /// The subscriber currently collecting dependencies, if any.
    pub fn current() -> Option<Subscriber> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Check if a subscriber is currently collecting dependencies.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    pub fn current_id() -> Option<SubscriberId> {
        TARGET_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.as_ref().map(Subscriber::id))
        })
    }

    /// Number of entries on the stack, empty ones included.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.as_ref().map(Subscriber::id),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
        // The subscriber handle is released after the stack borrow ends, so
        // a last-handle drop can safely touch its channels.
        drop(popped);
    }
}

/// Run `f` with dependency collection suspended.
///
/// Reads inside `f` do not subscribe the enclosing subscriber.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ReactiveContext::enter(None);
    f()
}
