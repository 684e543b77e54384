//! Time sources for driving the timer stores.
//!
//! Stores never read the time themselves; the event loop reads a [Clock]
//! and passes the value to `tick`.
use crate::Timestamp;
use std::{
    cell::Cell,
    time::{SystemTime, UNIX_EPOCH},
};

/// A source of the current time
pub trait Clock {
    /// The current time
    fn now(&self) -> Timestamp;
}

/// The wall clock, in whole seconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as Timestamp,
            Err(e) => -(e.duration().as_secs() as Timestamp),
        }
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    current: Cell<Timestamp>,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            current: Cell::new(start),
        }
    }

    /// Move the clock forward by `amount`
    pub fn advance(&self, amount: Timestamp) {
        self.current.set(self.current.get() + amount);
    }

    /// Set the clock to `time`
    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}
