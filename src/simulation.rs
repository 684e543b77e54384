//! This module provides a driver that runs a timer store in virtual time.
//!
//! Instead of waking up periodically, the driver jumps straight to the
//! deadline the store reports and ticks it there, which makes it a compact
//! model of the event loop that normally sits around a store.
//! It is mostly useful for discrete event simulations and tests.
//!
//! Progress is made by repeatedly calling [next](SimulationDriver::next)
//! until it returns [SimulationStep::Finished] indicating that the store is empty.
//!
//! # Example
//! ```
//! # use std::{cell::RefCell, rc::Rc};
//! use tick_timers::*;
//! use tick_timers::simulation::*;
//! use tick_timers::stores::MinHeapStore;
//!
//! let mut sim = SimulationDriver::new(MinHeapStore::<ClosureAction<()>>::default());
//!
//! let fired_at = Rc::new(RefCell::new(None));
//! let fired_at2 = fired_at.clone();
//! sim.schedule_after(150, ClosureAction::new((), move |_| {
//!     *fired_at2.borrow_mut() = Some(());
//! }))
//! .expect("Could not schedule timer!");
//! while let SimulationStep::Ok = sim.next() {
//!     println!("Next! t={}", sim.current_time());
//! }
//! assert_eq!(sim.current_time(), 150);
//! assert!(fired_at.borrow().is_some());
//! ```
use crate::{
    clock::{Clock, ManualClock},
    TimerError,
    TimerHandle,
    TimerStore,
    Timestamp,
};

/// Result of advancing virtual time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStep {
    /// No timers remain
    ///
    /// The simulation can be considered complete.
    Finished,
    /// At least one timer fired, but more timers may remain
    ///
    /// Continue calling [next](SimulationDriver::next) to advance virtual time.
    Ok,
}

/// A virtual-time event loop around a single timer store
pub struct SimulationDriver<S: TimerStore> {
    clock: ManualClock,
    store: S,
    fired: usize,
}

impl<S: TimerStore> SimulationDriver<S> {
    /// Create a driver whose virtual time starts at `0`
    pub fn new(store: S) -> Self {
        Self::at(store, 0)
    }

    /// Create a driver whose virtual time starts at `start`
    pub fn at(store: S, start: Timestamp) -> Self {
        SimulationDriver {
            clock: ManualClock::new(start),
            store,
            fired: 0,
        }
    }

    /// The current virtual time
    pub fn current_time(&self) -> Timestamp {
        self.clock.now()
    }

    /// Total number of actions triggered so far
    pub fn fired(&self) -> usize {
        self.fired
    }

    /// Schedule `action` relative to the current virtual time
    pub fn schedule_after(
        &mut self,
        delay: Timestamp,
        action: S::Action,
    ) -> Result<TimerHandle, TimerError> {
        let now = self.clock.now();
        self.store.schedule_after(now, delay, action)
    }

    /// Cancel a timer scheduled through this driver
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.store.cancel(handle)
    }

    /// Advance virtual time until at least one timer fired or the store ran empty
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> SimulationStep {
        loop {
            let now = self.clock.now();
            match self.store.next_deadline(now) {
                None => return SimulationStep::Finished,
                Some(deadline) => {
                    let t = deadline.max(now);
                    self.clock.set(t);
                    let fired = self.store.tick(t);
                    if fired > 0 {
                        self.fired += fired;
                        tracing::trace!(time = t, fired, "simulation step");
                        return SimulationStep::Ok;
                    }
                }
            }
        }
    }

    /// Run until no timers remain, returning the number of actions triggered
    pub fn run_to_completion(&mut self) -> usize {
        let before = self.fired;
        while let SimulationStep::Ok = self.next() {}
        self.fired - before
    }

    /// A reference to the driven store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap the driven store
    pub fn into_inner(self) -> S {
        self.store
    }
}
