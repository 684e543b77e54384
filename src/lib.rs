//! This crate provides the timer management core of an event-driven server:
//! it tracks pending one-shot timers and fires every timer whose expiry
//! has passed whenever the event loop calls `tick`.
//!
//! Three interchangeable stores implement the same [TimerStore](TimerStore) contract,
//! with different trade-offs between insertion, cancellation and firing.
//! A server instance picks exactly one of them.
//!
//! # 1 – Sorted List
//! The [SortedListStore](stores::SortedListStore) keeps all timers in an ascending
//! doubly-linked list. Insertion is `O(n)`, cancellation `O(1)` and a tick only
//! touches the timers that actually expire. Timers whose expiry was pushed back
//! can be [adjusted](stores::SortedListStore::adjust) in place.
//!
//! # 2 – Min Heap
//! The [MinHeapStore](stores::MinHeapStore) is an array-backed binary min-heap.
//! Insertion is `O(log n)`; cancellation is `O(1)` because it only marks the entry as inert,
//! leaving physical removal to the moment it reaches the root.
//! Since the root is always the nearest deadline, the event loop can use
//! [top](stores::MinHeapStore::top) as the length of its next wait instead of a fixed interval.
//!
//! # 3 – Timing Wheel
//! The [TimingWheelStore](stores::TimingWheelStore) hashes timers into a fixed number of slots
//! by their relative delay, with a rotation counter for delays beyond one revolution.
//! Insertion and cancellation are `O(1)` and each tick only scans a single slot.
//!
//! # Higher Level APIs
//! - [KeyedTimers](stores::KeyedTimers) maps caller keys (e.g. connection ids)
//!   to their outstanding timer, so timers can be replaced or cancelled by key.
//! - The [simulation](simulation) module drives any store in virtual time,
//!   skipping directly to the next deadline.
//! - The [clock](clock) module provides the time source an event loop passes to `tick`.
//!
//! All stores are single-threaded: the caller serialises every call.
//!
//! # Example
//! ```
//! # use std::{cell::RefCell, rc::Rc};
//! use tick_timers::*;
//! use tick_timers::stores::SortedListStore;
//!
//! let fired = Rc::new(RefCell::new(Vec::new()));
//! let mut timers = SortedListStore::new();
//! for expire in [5, 2, 8] {
//!     let fired = fired.clone();
//!     timers.add(expire, ClosureAction::new(expire, move |e| fired.borrow_mut().push(e)));
//! }
//! assert_eq!(timers.tick(6), 2);
//! assert_eq!(*fired.borrow(), vec![2, 5]);
//! assert_eq!(timers.next_expiry(), Some(8));
//! ```

#![deny(missing_docs)]

pub mod clock;
pub mod simulation;
pub mod stores;

mod timers;
pub use self::timers::*;

#[cfg(feature = "uuid-extras")]
mod uuid_extras;

/// Absolute times and delays, in the unit of the driving clock
///
/// With the [SystemClock](clock::SystemClock) this is seconds since the Unix epoch.
pub type Timestamp = i64;

/// Errors encountered by a timer store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// An argument was outside of the accepted domain
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Memory for the requested number of timers could not be obtained
    #[error("could not allocate room for {requested} timers")]
    AllocationFailure {
        /// The capacity that was requested
        requested: usize,
    },
    /// The timer with the given handle was not found
    ///
    /// The stores themselves never return this: their `cancel` reports
    /// unknown or stale handles as `false`. It is left for callers that
    /// want to turn such a `false` into an error.
    #[error("timer not found")]
    NotFound,
}
