//! Update Scheduling
//!
//! Subscribers notified of a change are not re-run on the spot. They are
//! queued and re-run together in one flush at the end of the current burst
//! of mutations.
//!
//! # Overview
//!
//! - [`queue_subscriber`] adds a subscriber to the pending queue. A
//!   subscriber is pending at most once, so a burst that writes ten of its
//!   dependencies re-runs it once.
//! - The flush is registered on the tick queue ([`next_tick`]), which the
//!   embedder drains with [`run_ticks`] (or by wrapping work in [`batch`]).
//! - Subscribers re-run in ascending id order, which is creation order, so a
//!   parent re-runs before children it created.
//!
//! With `async_mode` disabled in the configuration the flush runs as soon as
//! the first subscriber is queued.

mod queue;
mod tick;

pub use queue::{is_flushing, pending_count, queue_subscriber};
pub use tick::{batch, has_pending_ticks, next_tick, run_ticks};
