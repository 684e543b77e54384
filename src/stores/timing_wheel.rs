//! A single-level hashed timing wheel.
use super::*;

/// Default number of slots on the wheel
pub const DEFAULT_SLOTS: usize = 60;
/// Default time units covered by one slot
pub const DEFAULT_SLOT_INTERVAL: Timestamp = 1;

/// Construction-time parameters of a [TimingWheelStore]
///
/// One revolution spans `slots * slot_interval` time units;
/// longer delays are represented by the per-timer rotation count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelConfig {
    /// The number of slots `N`
    pub slots: usize,
    /// The time units `SI` between two ticks
    pub slot_interval: Timestamp,
}

impl WheelConfig {
    /// Produce a config from slot count and interval
    pub const fn new(slots: usize, slot_interval: Timestamp) -> Self {
        WheelConfig {
            slots,
            slot_interval,
        }
    }

    fn validate(&self) -> Result<(), TimerError> {
        if self.slots == 0 {
            return Err(TimerError::InvalidArgument("wheel needs at least one slot"));
        }
        if self.slot_interval <= 0 {
            return Err(TimerError::InvalidArgument("slot interval must be positive"));
        }
        Ok(())
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        WheelConfig::new(DEFAULT_SLOTS, DEFAULT_SLOT_INTERVAL)
    }
}

struct WheelNode<A> {
    rotation: u64,
    slot: usize,
    action: A,
    prev: Option<TimerHandle>,
    next: Option<TimerHandle>,
}

/// A single-level hashed timing wheel
///
/// Timers are hashed into `N` slots by their delay. Each slot holds an
/// unordered doubly-linked bucket, and every timer carries the number of
/// full revolutions it still has to wait through.
///
/// Every call to [tick](TimingWheelStore::tick) moves the wheel forward by one slot
/// and then handles the bucket of the slot it arrived at, so a timer that needs
/// `t` ticks fires on exactly the `t`-th call.
///
/// - [add](TimingWheelStore::add) and [cancel](TimingWheelStore::cancel) are `O(1)`
/// - [tick](TimingWheelStore::tick) is `O(m)` for the `m` timers in the current bucket
pub struct TimingWheelStore<A> {
    config: WheelConfig,
    slots: Vec<Option<TimerHandle>>,
    nodes: SlotMap<TimerHandle, WheelNode<A>>,
    current: usize,
}

impl<A> TimingWheelStore<A>
where
    A: TimerAction,
{
    /// Create a wheel with the [default](WheelConfig::default) configuration
    pub fn new() -> Self {
        TimingWheelStore {
            config: WheelConfig::default(),
            slots: vec![None; DEFAULT_SLOTS],
            nodes: SlotMap::with_key(),
            current: 0,
        }
    }

    /// Create a wheel with `config.slots` slots of `config.slot_interval` each
    pub fn with_config(config: WheelConfig) -> Result<Self, TimerError> {
        config.validate()?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(config.slots)
            .map_err(|_| TimerError::AllocationFailure {
                requested: config.slots,
            })?;
        slots.resize(config.slots, None);
        Ok(TimingWheelStore {
            config,
            slots,
            nodes: SlotMap::with_key(),
            current: 0,
        })
    }

    /// The configuration this wheel was built with
    pub fn config(&self) -> WheelConfig {
        self.config
    }

    /// Insert a timer that fires after `delay` time units
    ///
    /// The delay is rounded up to whole ticks, and even a zero delay takes one tick.
    /// Fails with [InvalidArgument](TimerError::InvalidArgument) for a negative delay.
    pub fn add(&mut self, delay: Timestamp, action: A) -> Result<TimerHandle, TimerError> {
        if delay < 0 {
            return Err(TimerError::InvalidArgument("delay must not be negative"));
        }
        let si = self.config.slot_interval;
        let n = self.config.slots as u64;
        let ticks = ((delay / si) + (delay % si != 0) as Timestamp).max(1) as u64;
        let rotation = (ticks - 1) / n;
        let slot = ((self.current as u64 + ticks % n) % n) as usize;

        let head = self.slots[slot];
        let handle = self.nodes.insert(WheelNode {
            rotation,
            slot,
            action,
            prev: None,
            next: head,
        });
        if let Some(head) = head {
            self.nodes[head].prev = Some(handle);
        }
        self.slots[slot] = Some(handle);
        tracing::trace!(
            ?handle,
            delay,
            rotation,
            slot,
            current = self.current,
            "adding timer to wheel"
        );
        Ok(handle)
    }

    /// Unlink and drop the timer behind `handle` without triggering it
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.unlink(handle) {
            Some(node) => {
                tracing::trace!(?handle, slot = node.slot, "cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Move the wheel forward by one slot and trigger the timers due there
    ///
    /// Timers in the bucket that still have rotations left
    /// lose one and stay in place.
    pub fn tick(&mut self) -> usize {
        self.current = (self.current + 1) % self.config.slots;
        let mut fired = 0usize;
        let mut cur = self.slots[self.current];
        while let Some(handle) = cur {
            let node = &mut self.nodes[handle];
            cur = node.next;
            if node.rotation > 0 {
                node.rotation -= 1;
            } else if let Some(node) = self.unlink(handle) {
                if fire(handle, node.slot as Timestamp, node.action) {
                    fired += 1;
                }
            }
        }
        if fired > 0 {
            tracing::debug!(
                slot = self.current,
                fired,
                remaining = self.nodes.len(),
                "wheel tick"
            );
        }
        fired
    }

    /// The slot the wheel points at
    ///
    /// This is `0` for a new wheel and the slot drained by the last tick after that.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// The `(rotation, slot)` encoding of a scheduled timer
    pub fn position(&self, handle: TimerHandle) -> Option<(u64, usize)> {
        self.nodes.get(handle).map(|n| (n.rotation, n.slot))
    }

    /// Number of timers hashed into `slot`
    pub fn bucket_len(&self, slot: usize) -> usize {
        let head = self.slots.get(slot).copied().flatten();
        std::iter::successors(head, |h| self.nodes[*h].next).count()
    }

    /// Whether `handle` refers to a scheduled timer
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Number of scheduled timers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the wheel is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn unlink(&mut self, handle: TimerHandle) -> Option<WheelNode<A>> {
        let node = self.nodes.remove(handle)?;
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.slots[node.slot] = node.next,
        }
        if let Some(next) = node.next {
            self.nodes[next].prev = node.prev;
        }
        Some(node)
    }
}

impl<A> Default for TimingWheelStore<A>
where
    A: TimerAction,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TimerStore for TimingWheelStore<A>
where
    A: TimerAction,
{
    type Action = A;

    /// The wheel only knows relative delays, so `now` is not consulted
    fn schedule_after(
        &mut self,
        _now: Timestamp,
        delay: Timestamp,
        action: A,
    ) -> Result<TimerHandle, TimerError> {
        self.add(delay, action)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        TimingWheelStore::cancel(self, handle)
    }

    fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.contains(handle)
    }

    /// Advances exactly one slot, whatever `now` is
    fn tick(&mut self, _now: Timestamp) -> usize {
        TimingWheelStore::tick(self)
    }

    fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        if self.is_empty() {
            None
        } else {
            Some(now.saturating_add(self.config.slot_interval))
        }
    }

    fn len(&self) -> usize {
        TimingWheelStore::len(self)
    }
}
