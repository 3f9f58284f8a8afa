//! Update Scheduler
//!
//! The scheduler batches subscriber re-runs so that, within one burst of
//! synchronous mutations, each subscriber re-runs at most once and in
//! creation order.
//!
//! # Algorithm
//!
//! 1. A notified subscriber is queued unless it is already pending.
//! 2. The first queued subscriber of a burst registers a flush through
//!    [`next_tick`](super::next_tick). In synchronous mode the flush runs
//!    right away instead.
//! 3. The flush sorts the queue by subscriber id and walks it by index, so
//!    subscribers queued by an earlier re-run are still processed in the
//!    same flush. They are spliced in by id rather than appended.
//! 4. A subscriber that keeps re-queuing itself is cut off after
//!    `max_update_count` re-runs and the flush is aborted.
//! 5. After the walk the state is reset and `updated` hooks run, most
//!    recently queued first.
//!
//! The queue holds weak handles. A subscriber whose owner was dropped
//! before its turn is skipped.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config;
use crate::error::{handle_error, Error};
use crate::reactive::{Subscriber, SubscriberId, WeakSubscriber};

use super::tick::next_tick;

thread_local! {
    static SCHEDULER: RefCell<UpdateScheduler> = RefCell::new(UpdateScheduler::new());
}

/// A queued re-run.
struct Pending {
    id: SubscriberId,
    subscriber: WeakSubscriber,
}

/// Per-burst scheduler state.
#[derive(Default)]
struct UpdateScheduler {
    queue: Vec<Pending>,
    /// Ids currently waiting in `queue`.
    has: HashSet<SubscriberId>,
    /// Re-runs per subscriber within the current flush.
    circular: HashMap<SubscriberId, u32>,
    /// A flush has been registered for this burst.
    waiting: bool,
    flushing: bool,
    /// Position of the flush cursor.
    index: usize,
}

impl UpdateScheduler {
    fn new() -> Self {
        Self::default()
    }

    /// Insert a subscriber that is not yet pending. Returns true if a flush
    /// has to be registered for it.
    fn enqueue(&mut self, subscriber: &Subscriber) -> bool {
        let pending = Pending {
            id: subscriber.id(),
            subscriber: subscriber.downgrade(),
        };
        if !self.flushing {
            self.queue.push(pending);
        } else {
            // Keep the unprocessed tail ordered by id. Never insert at or
            // before the cursor.
            let mut i = self.queue.len();
            while i > self.index + 1 && self.queue[i - 1].id > pending.id {
                i -= 1;
            }
            self.queue.insert(i, pending);
        }
        !std::mem::replace(&mut self.waiting, true)
    }

    /// Clear all per-burst state, handing back the queue.
    fn reset(&mut self) -> Vec<Pending> {
        self.has.clear();
        self.circular.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
        std::mem::take(&mut self.queue)
    }
}

/// Queue a subscriber for a batched re-run.
///
/// Queuing a subscriber that is already pending has no effect.
pub fn queue_subscriber(subscriber: Subscriber) {
    let id = subscriber.id();
    let schedule = SCHEDULER.with(|scheduler| {
        let mut scheduler = scheduler.borrow_mut();
        if !scheduler.has.insert(id) {
            return false;
        }
        tracing::trace!(subscriber = id.raw(), flushing = scheduler.flushing, "queue subscriber");
        scheduler.enqueue(&subscriber)
    });
    if !schedule {
        return;
    }
    if config::is_async() {
        next_tick(flush_scheduler_queue);
    } else if let Err(error) = flush_scheduler_queue() {
        handle_error(&error, "flush");
    }
}

/// Run every queued subscriber.
///
/// Fails when a non-recoverable subscriber fails or a subscriber re-queues
/// itself more than `max_update_count` times. Either way the remaining queue
/// is dropped and the scheduler is ready for the next burst.
pub(crate) fn flush_scheduler_queue() -> Result<(), Error> {
    let limit = config::with(|c| c.max_update_count);
    let len = SCHEDULER.with(|scheduler| {
        let mut scheduler = scheduler.borrow_mut();
        scheduler.flushing = true;
        scheduler.queue.sort_by_key(|pending| pending.id);
        scheduler.queue.len()
    });
    tracing::debug!(queued = len, "flush start");

    loop {
        let next = SCHEDULER.with(|scheduler| {
            let scheduler = scheduler.borrow();
            scheduler
                .queue
                .get(scheduler.index)
                .map(|pending| (pending.id, pending.subscriber.upgrade()))
        });
        let Some((id, subscriber)) = next else {
            break;
        };
        let Some(subscriber) = subscriber.filter(Subscriber::is_active) else {
            SCHEDULER.with(|scheduler| {
                let mut scheduler = scheduler.borrow_mut();
                scheduler.has.remove(&id);
                scheduler.index += 1;
            });
            tracing::trace!(subscriber = id.raw(), "skip released subscriber");
            continue;
        };

        subscriber.call_before_hook();
        SCHEDULER.with(|scheduler| scheduler.borrow_mut().has.remove(&id));

        if let Err(error) = subscriber.run() {
            abort();
            return Err(error);
        }

        let runaway = SCHEDULER.with(|scheduler| {
            let mut scheduler = scheduler.borrow_mut();
            scheduler.index += 1;
            if !scheduler.has.contains(&id) {
                return false;
            }
            let count = scheduler.circular.entry(id).or_insert(0);
            *count += 1;
            *count > limit
        });
        if runaway {
            abort();
            return Err(Error::CircularUpdate {
                subscriber: id,
                expression: subscriber.expression().to_string(),
                limit,
            });
        }
    }

    let flushed = SCHEDULER.with(|scheduler| scheduler.borrow_mut().reset());
    let mut seen = HashSet::new();
    for pending in flushed.iter().rev() {
        if !seen.insert(pending.id) {
            continue;
        }
        if let Some(subscriber) = pending.subscriber.upgrade() {
            subscriber.call_updated_hook();
        }
    }
    tracing::debug!(flushed = flushed.len(), "flush end");
    Ok(())
}

fn abort() {
    let dropped = SCHEDULER.with(|scheduler| scheduler.borrow_mut().reset());
    tracing::debug!(dropped = dropped.len(), "flush aborted");
}

/// Whether a flush is currently running.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|scheduler| scheduler.borrow().flushing)
}

/// Number of subscribers waiting to re-run.
pub fn pending_count() -> usize {
    SCHEDULER.with(|scheduler| scheduler.borrow().has.len())
}
