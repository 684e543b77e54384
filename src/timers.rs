use crate::{TimerError, Timestamp};
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

slotmap::new_key_type! {
    /// A handle to a timer owned by one of the stores
    ///
    /// Handles are generational: once the timer fired or was cancelled
    /// the handle goes stale and every operation on it is a no-op.
    pub struct TimerHandle;
}

/// A trait for state that is triggered once when its timer expires
///
/// This is the pairing of a callback and the context it operates on.
/// Stores never look inside an action, they only hold on to it
/// until it is either triggered or dropped by a cancellation.
pub trait TimerAction {
    /// Trigger should be called by the store when the timeout has expired.
    ///
    /// It is strongly recommended to keep these quick,
    /// as long actions delay the execution of later timers in the same tick.
    fn trigger(self);
}

/// Whether a timer record is still live or has been marked inert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerState<A> {
    /// The timer is waiting for its expiry
    Scheduled(A),
    /// The timer was cancelled and only awaits physical removal
    Cancelled,
}

impl<A> TimerState<A> {
    /// Whether this record still carries a live action
    pub fn is_scheduled(&self) -> bool {
        matches!(self, TimerState::Scheduled(_))
    }

    /// Take the action out, leaving the record inert
    pub fn take(&mut self) -> Option<A> {
        match std::mem::replace(self, TimerState::Cancelled) {
            TimerState::Scheduled(a) => Some(a),
            TimerState::Cancelled => None,
        }
    }
}

/// A timer action using a closure and a caller-owned context
///
/// The context is handed to the closure by value when the timer fires.
/// Use a shared pointer (e.g. `Rc<RefCell<_>>`) as context if the caller
/// needs to keep accessing the same data.
pub struct ClosureAction<C> {
    context: C,
    action: Box<dyn FnOnce(C) + 'static>,
}

impl<C> ClosureAction<C> {
    /// Produces a new action from a context and the closure
    /// to run on it once the timer expires.
    pub fn new<F>(context: C, action: F) -> Self
    where
        F: FnOnce(C) + 'static,
    {
        ClosureAction {
            context,
            action: Box::new(action),
        }
    }

    /// A reference to the context this action will be called with
    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C> TimerAction for ClosureAction<C> {
    fn trigger(self) {
        (self.action)(self.context)
    }
}

impl<C> fmt::Debug for ClosureAction<C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClosureAction(context={:?}, action=<function>)",
            self.context
        )
    }
}

/// Run a single expired action in isolation
///
/// The action has already been detached from its store, so a panic
/// inside it cannot leave the store half-modified. It is logged and
/// swallowed so that the remaining due timers of the tick still fire.
/// `at` is only used for logging: the expiry, or the slot for the wheel.
/// Returns whether the action ran to completion.
pub(crate) fn fire<A: TimerAction>(handle: TimerHandle, at: Timestamp, action: A) -> bool {
    tracing::trace!(?handle, at, "firing timer");
    match panic::catch_unwind(AssertUnwindSafe(move || action.trigger())) {
        Ok(()) => true,
        Err(cause) => {
            let msg = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic>".to_string());
            tracing::error!(?handle, at, panic = %msg, "timer action panicked");
            false
        }
    }
}

/// The logical contract shared by every timer store
///
/// A server instance picks exactly one implementation and drives it
/// from its event loop by calling [tick](TimerStore::tick) and
/// sizing its wait with [next_deadline](TimerStore::next_deadline).
pub trait TimerStore {
    /// The action type triggered by this store
    type Action: TimerAction;

    /// Schedule `action` to be triggered `delay` time units after `now`
    ///
    /// It is only guaranteed that the action is not triggered *before*
    /// the delay expires; the lag depends on how the store is ticked.
    fn schedule_after(
        &mut self,
        now: Timestamp,
        delay: Timestamp,
        action: Self::Action,
    ) -> Result<TimerHandle, TimerError>;

    /// Cancel the timer behind `handle`
    ///
    /// Returns `false` if the handle was already fired or cancelled.
    /// Once this returns the action is guaranteed never to be triggered.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Whether `handle` still refers to a scheduled timer
    fn is_scheduled(&self, handle: TimerHandle) -> bool;

    /// Trigger all due timers
    ///
    /// Returns the number of actions that ran to completion.
    /// A panicking action is removed like any other due timer but not counted.
    fn tick(&mut self, now: Timestamp) -> usize;

    /// The time at which the driver should call [tick](TimerStore::tick) next
    ///
    /// `None` means the store is empty and the driver may block indefinitely.
    fn next_deadline(&self, now: Timestamp) -> Option<Timestamp>;

    /// Number of scheduled timers
    fn len(&self) -> usize;

    /// Whether no timers are scheduled
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// This trait is a convenience API for [stores](TimerStore) that use
/// the [ClosureAction](ClosureAction) type.
pub trait ClosureTimer<C>: TimerStore<Action = ClosureAction<C>> {
    /// Schedule `action` to run on `context` once `delay` has passed after `now`
    fn schedule_action_after<F>(
        &mut self,
        now: Timestamp,
        delay: Timestamp,
        context: C,
        action: F,
    ) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce(C) + 'static;
}

impl<C, T> ClosureTimer<C> for T
where
    T: TimerStore<Action = ClosureAction<C>>,
{
    fn schedule_action_after<F>(
        &mut self,
        now: Timestamp,
        delay: Timestamp,
        context: C,
        action: F,
    ) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce(C) + 'static,
    {
        self.schedule_after(now, delay, ClosureAction::new(context, action))
    }
}
