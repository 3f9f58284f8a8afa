//! Error Types
//!
//! Every failure the engine can observe is described by [`Error`]. Errors fall
//! into two delivery channels:
//!
//! - **Reported errors** go to the error sink ([`handle_error`]). Failing user
//!   watchers and callbacks, failed tick callbacks and aborted flushes end up
//!   here so that one failure cannot take down unrelated computations.
//! - **Diagnostics** go to the warning sink ([`warn`]). They describe misuse
//!   that the engine recovers from, such as calling `set` on a primitive.
//!
//! Both sinks can be replaced through [`Config`](crate::config::Config). By
//! default they log through `tracing`.

use thiserror::Error;

use crate::config;
use crate::reactive::SubscriberId;

/// Error type returned by user computations and callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors produced by the reactive engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A subscriber's computation returned an error.
    #[error("getter for watcher \"{expression}\" failed: {source}")]
    Evaluation {
        subscriber: SubscriberId,
        expression: String,
        #[source]
        source: BoxError,
    },

    /// A subscriber's change callback returned an error.
    #[error("callback for watcher \"{expression}\" failed: {source}")]
    Callback {
        subscriber: SubscriberId,
        expression: String,
        #[source]
        source: BoxError,
    },

    /// A subscriber kept re-queuing itself within a single flush.
    #[error(
        "you may have an infinite update loop in watcher \"{expression}\" \
         (re-run more than {limit} times in one flush)"
    )]
    CircularUpdate {
        subscriber: SubscriberId,
        expression: String,
        limit: u32,
    },

    /// `set` or `delete` was called on a value that is not a container.
    #[error("cannot {operation} reactive property on undefined, null, or primitive value: {target}")]
    InvalidTarget {
        operation: &'static str,
        target: String,
    },

    /// A key that does not address anything on the target container.
    #[error("invalid key {key:?} for {operation} on a sequence")]
    InvalidKey { operation: &'static str, key: String },

    /// Attempt to add or remove a property on a root instance or root data object.
    #[error(
        "avoid {operation} reactive property {key:?} on an instance or its root data \
         at runtime; declare it upfront instead"
    )]
    RootMutation { operation: &'static str, key: String },

    /// Root data that is not an object.
    #[error("root data must be an object, got {0}")]
    InvalidData(String),

    /// A watch expression that is not a simple dot-delimited path.
    #[error(
        "failed watching path \"{0}\": only simple dot-delimited paths are accepted, \
         use a function instead"
    )]
    InvalidPath(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// The subscriber this error originated from, if any.
    pub fn subscriber(&self) -> Option<SubscriberId> {
        match self {
            Error::Evaluation { subscriber, .. }
            | Error::Callback { subscriber, .. }
            | Error::CircularUpdate { subscriber, .. } => Some(*subscriber),
            _ => None,
        }
    }
}

/// Route an error to the configured error sink.
///
/// `info` describes where the error surfaced, e.g. `getter for watcher "a.b"`.
pub fn handle_error(error: &Error, info: &str) {
    match config::with(|c| c.error_handler.clone()) {
        Some(handler) => handler(error, info),
        None => tracing::error!(%error, info, "error in reactive engine"),
    }
}

/// Report a non-fatal diagnostic.
pub fn warn(error: &Error) {
    let (handler, silent) = config::with(|c| (c.warn_handler.clone(), c.silent));
    match handler {
        Some(handler) => handler(error),
        None if !silent => tracing::warn!(%error, "reactive diagnostic"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn handle_error_uses_installed_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        config::configure(|c| {
            c.error_handler = Some(Rc::new(move |err: &Error, info: &str| {
                seen_clone.borrow_mut().push(format!("{info}: {err}"));
            }));
        });

        handle_error(&Error::InvalidPath("a-b".into()), "watch");

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("watch: failed watching path \"a-b\""));
    }

    #[test]
    fn warn_calls_handler_even_when_silent() {
        let count = Rc::new(RefCell::new(0));
        let count_clone = count.clone();
        config::configure(|c| {
            c.silent = true;
            c.warn_handler = Some(Rc::new(move |_: &Error| *count_clone.borrow_mut() += 1));
        });

        warn(&Error::InvalidPath("x y".into()));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn subscriber_is_exposed_for_subscriber_errors() {
        let id = SubscriberId::new();
        let err = Error::CircularUpdate {
            subscriber: id,
            expression: "render".into(),
            limit: 100,
        };
        assert_eq!(err.subscriber(), Some(id));
        assert!(Error::InvalidPath("?".into()).subscriber().is_none());
    }
}
