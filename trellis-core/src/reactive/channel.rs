//! Dependency Channels
//!
//! A channel is the publish/subscribe point for one observed slot: a
//! property, or a container as a whole. Subscribers join a channel when they
//! read the slot during evaluation and leave it when a later evaluation no
//! longer reads it.
//!
//! Channels hold their subscribers weakly. A subscriber whose last handle is
//! dropped silently disappears from every channel it was on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::config;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId, WeakSubscriber};

/// Unique identifier for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct ChannelData {
    id: ChannelId,
    /// Insertion-ordered; a subscriber appears at most once.
    subscribers: RefCell<IndexMap<SubscriberId, WeakSubscriber>>,
}

/// A publish/subscribe primitive bound to one observed slot.
///
/// Cloning a `Channel` creates a new handle to the same channel.
#[derive(Clone)]
pub struct Channel(Rc<ChannelData>);

impl Channel {
    pub fn new() -> Self {
        Self(Rc::new(ChannelData {
            id: ChannelId::next(),
            subscribers: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> ChannelId {
        self.0.id
    }

    /// Add a subscriber. Subscribing twice has no effect.
    pub fn subscribe(&self, subscriber: &Subscriber) {
        self.0
            .subscribers
            .borrow_mut()
            .entry(subscriber.id())
            .or_insert_with(|| subscriber.downgrade());
    }

    /// Remove a subscriber if present.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.0.subscribers.borrow_mut().shift_remove(&id);
    }

    /// Record this channel as a dependency of the subscriber currently
    /// evaluating, if any.
    pub fn depend(&self) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Signal every subscriber that the slot changed.
    ///
    /// Works on a snapshot, so subscribers joining or leaving while the
    /// notification is delivered do not affect who is notified. In
    /// synchronous mode the snapshot is ordered by subscriber creation.
    pub fn notify(&self) {
        let mut subscribers: SmallVec<[Subscriber; 8]> = {
            let mut live = self.0.subscribers.borrow_mut();
            live.retain(|_, subscriber| subscriber.is_alive());
            live.values().filter_map(WeakSubscriber::upgrade).collect()
        };
        if !config::is_async() {
            subscribers.sort_by_key(Subscriber::id);
        }
        for subscriber in &subscribers {
            subscriber.update();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.0.subscribers.borrow().contains_key(&id)
    }

    /// Subscriber ids in subscription order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.0.subscribers.borrow().keys().copied().collect()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.0.id)
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}
