//! The three timer store variants and the keyed wrapper around them.
//!
//! Every store owns its timers in a [SlotMap](slotmap::SlotMap) and links them
//! by [TimerHandle](crate::TimerHandle), so relinking never touches raw pointers
//! and a stale handle can always be detected.
use crate::{timers::fire, TimerAction, TimerError, TimerHandle, TimerState, TimerStore, Timestamp};
use slotmap::SlotMap;

pub mod keyed;
pub mod min_heap;
pub mod sorted_list;
pub mod timing_wheel;

pub use self::{
    keyed::KeyedTimers,
    min_heap::{MinHeapStore, DEFAULT_HEAP_CAPACITY},
    sorted_list::SortedListStore,
    timing_wheel::{TimingWheelStore, WheelConfig, DEFAULT_SLOTS, DEFAULT_SLOT_INTERVAL},
};
