//! Reactive Primitives
//!
//! This module implements dependency tracking: channels, subscribers, and the
//! consumer layers built on top of them.
//!
//! # Concepts
//!
//! ## Channels
//!
//! A [`Channel`] exists for every observed property and for every observed
//! container as a whole. Reading the property while a subscriber evaluates
//! subscribes it to the channel; writing the property notifies the channel.
//!
//! ## Subscribers
//!
//! A [`Subscriber`] is one computation. Every evaluation rebuilds its
//! dependency set from the channels it actually read, so conditional reads
//! only subscribe to the branch that was taken.
//!
//! ## Memos, Effects and Watches
//!
//! - A [`Memo`] is a derived value: a lazy subscriber recomputed on demand.
//! - An [`Effect`] is a side-effecting computation such as a render function.
//! - A watch ([`watch`]) pairs a source with a change callback.
//!
//! # Implementation Notes
//!
//! The currently evaluating subscriber lives on a thread-local stack (see
//! [`ReactiveContext`]), so nested evaluations attribute reads to the
//! innermost subscriber and restore the outer one when they finish.

mod channel;
mod context;
mod effect;
mod memo;
mod path;
mod subscriber;
mod watch;

pub use channel::{Channel, ChannelId};
pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use memo::Memo;
pub use path::PathGetter;
pub use subscriber::{
    Callback, Getter, Hook, Subscriber, SubscriberId, SubscriberOptions, WeakSubscriber,
};
pub use watch::{watch, watch_path, WatchHandle, WatchOptions, WatchSource};
