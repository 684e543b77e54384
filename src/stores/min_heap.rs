//! An array-backed binary min-heap of timers with lazy cancellation.
use super::*;

/// Capacity used by [MinHeapStore::default]
pub const DEFAULT_HEAP_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct HeapSlot {
    expire: Timestamp,
    handle: TimerHandle,
}

/// A binary min-heap of timers keyed by expiry
///
/// The heap is 0-indexed with children at `2i+1` and `2i+2`.
/// Cancellation is lazy: the entry is only marked [Cancelled](TimerState::Cancelled)
/// and stays in the array until it surfaces at the root, where
/// [tick](MinHeapStore::tick) or [pop](MinHeapStore::pop) discards it.
/// Under cancel-heavy workloads the array therefore holds more
/// slots than there are [scheduled](MinHeapStore::len) timers.
///
/// The array capacity doubles whenever an insertion finds it full.
pub struct MinHeapStore<A> {
    array: Vec<HeapSlot>,
    capacity: usize,
    records: SlotMap<TimerHandle, TimerState<A>>,
    live: usize,
}

impl<A> MinHeapStore<A>
where
    A: TimerAction,
{
    /// Create an empty heap with room for `capacity` timers
    pub fn with_capacity(capacity: usize) -> Result<Self, TimerError> {
        if capacity == 0 {
            return Err(TimerError::InvalidArgument("heap capacity must be positive"));
        }
        let mut array = Vec::new();
        array
            .try_reserve_exact(capacity)
            .map_err(|_| TimerError::AllocationFailure {
                requested: capacity,
            })?;
        Ok(MinHeapStore {
            array,
            capacity,
            records: SlotMap::with_capacity_and_key(capacity),
            live: 0,
        })
    }

    /// Build a heap from an unordered seed of `(expire, action)` pairs
    ///
    /// Fails with [InvalidArgument](TimerError::InvalidArgument) if the seed
    /// holds more timers than `capacity`.
    pub fn from_seed<I>(seed: I, capacity: usize) -> Result<(Self, Vec<TimerHandle>), TimerError>
    where
        I: IntoIterator<Item = (Timestamp, A)>,
    {
        let seed: Vec<(Timestamp, A)> = seed.into_iter().collect();
        if seed.len() > capacity {
            return Err(TimerError::InvalidArgument(
                "seed holds more timers than the heap capacity",
            ));
        }
        let mut heap = Self::with_capacity(capacity)?;
        let mut handles = Vec::with_capacity(seed.len());
        for (expire, action) in seed {
            let handle = heap.records.insert(TimerState::Scheduled(action));
            heap.array.push(HeapSlot { expire, handle });
            handles.push(handle);
        }
        heap.live = handles.len();
        if heap.array.len() > 1 {
            for hole in (0..=(heap.array.len() - 2) / 2).rev() {
                heap.percolate_down(hole);
            }
        }
        Ok((heap, handles))
    }

    /// Insert a timer that expires at the absolute time `expire`
    ///
    /// Fails only if the array needs to grow and memory cannot be obtained.
    pub fn add(&mut self, expire: Timestamp, action: A) -> Result<TimerHandle, TimerError> {
        if self.array.len() >= self.capacity {
            self.resize()?;
        }
        let handle = self.records.insert(TimerState::Scheduled(action));
        self.live += 1;
        tracing::trace!(?handle, expire, "adding timer to heap");
        self.array.push(HeapSlot { expire, handle });
        self.percolate_up(self.array.len() - 1);
        Ok(handle)
    }

    /// Mark the timer behind `handle` as inert
    ///
    /// Its action is dropped right away, but its slot is only reclaimed
    /// once it reaches the root.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.records.get_mut(handle).and_then(TimerState::take) {
            Some(_action) => {
                self.live -= 1;
                tracing::trace!(?handle, "marked heap timer inert");
                true
            }
            None => false,
        }
    }

    /// The expiry at the root, i.e. the nearest deadline
    ///
    /// The root may be an inert entry; the next tick simply discards it.
    pub fn top(&self) -> Option<Timestamp> {
        self.array.first().map(|slot| slot.expire)
    }

    /// Remove the root without triggering it
    pub fn pop(&mut self) -> Option<(Timestamp, TimerState<A>)> {
        if self.array.is_empty() {
            return None;
        }
        let root = self.array.swap_remove(0);
        if !self.array.is_empty() {
            self.percolate_down(0);
        }
        let state = self
            .records
            .remove(root.handle)
            .unwrap_or(TimerState::Cancelled);
        if state.is_scheduled() {
            self.live -= 1;
        }
        Some((root.expire, state))
    }

    /// Trigger every scheduled timer with an expiry at or before `now`
    ///
    /// Inert entries met at the root are discarded on the way,
    /// even if they are not due yet.
    pub fn tick(&mut self, now: Timestamp) -> usize {
        let mut fired = 0usize;
        let mut discarded = 0usize;
        while let Some(root) = self.array.first().copied() {
            let due = root.expire <= now;
            let scheduled = self
                .records
                .get(root.handle)
                .map_or(false, TimerState::is_scheduled);
            if scheduled && !due {
                break;
            }
            if let Some((expire, TimerState::Scheduled(action))) = self.pop() {
                if fire(root.handle, expire, action) {
                    fired += 1;
                }
            } else {
                discarded += 1;
            }
        }
        if fired > 0 || discarded > 0 {
            tracing::debug!(now, fired, discarded, remaining = self.live, "heap tick");
        }
        fired
    }

    /// Whether `handle` refers to a scheduled (not inert) timer
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.records
            .get(handle)
            .map_or(false, TimerState::is_scheduled)
    }

    /// Number of scheduled timers
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no timers are scheduled
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of occupied array slots, including inert entries
    pub fn heap_len(&self) -> usize {
        self.array.len()
    }

    /// The current array capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn resize(&mut self) -> Result<(), TimerError> {
        let requested = self
            .capacity
            .checked_mul(2)
            .ok_or(TimerError::AllocationFailure {
                requested: usize::MAX,
            })?;
        self.array
            .try_reserve_exact(requested - self.array.len())
            .map_err(|_| TimerError::AllocationFailure { requested })?;
        tracing::debug!(from = self.capacity, to = requested, "growing timer heap");
        self.capacity = requested;
        Ok(())
    }

    // Equal expiries stop the climb, so a new timer never overtakes an equal parent.
    fn percolate_up(&mut self, mut hole: usize) {
        let slot = self.array[hole];
        while hole > 0 {
            let parent = (hole - 1) / 2;
            if self.array[parent].expire <= slot.expire {
                break;
            }
            self.array[hole] = self.array[parent];
            hole = parent;
        }
        self.array[hole] = slot;
    }

    fn percolate_down(&mut self, mut hole: usize) {
        let len = self.array.len();
        let slot = self.array[hole];
        loop {
            let mut child = hole * 2 + 1;
            if child >= len {
                break;
            }
            if child + 1 < len && self.array[child + 1].expire < self.array[child].expire {
                child += 1;
            }
            if self.array[child].expire < slot.expire {
                self.array[hole] = self.array[child];
                hole = child;
            } else {
                break;
            }
        }
        self.array[hole] = slot;
    }
}

impl<A> Default for MinHeapStore<A>
where
    A: TimerAction,
{
    fn default() -> Self {
        MinHeapStore {
            array: Vec::with_capacity(DEFAULT_HEAP_CAPACITY),
            capacity: DEFAULT_HEAP_CAPACITY,
            records: SlotMap::with_capacity_and_key(DEFAULT_HEAP_CAPACITY),
            live: 0,
        }
    }
}

impl<A> TimerStore for MinHeapStore<A>
where
    A: TimerAction,
{
    type Action = A;

    fn schedule_after(
        &mut self,
        now: Timestamp,
        delay: Timestamp,
        action: A,
    ) -> Result<TimerHandle, TimerError> {
        if delay < 0 {
            return Err(TimerError::InvalidArgument("delay must not be negative"));
        }
        let expire = now
            .checked_add(delay)
            .ok_or(TimerError::InvalidArgument("expiry overflows the timestamp range"))?;
        self.add(expire, action)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        MinHeapStore::cancel(self, handle)
    }

    fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.contains(handle)
    }

    fn tick(&mut self, now: Timestamp) -> usize {
        MinHeapStore::tick(self, now)
    }

    fn next_deadline(&self, _now: Timestamp) -> Option<Timestamp> {
        // only inert entries left: nothing worth waking up for
        if self.live == 0 {
            None
        } else {
            self.top()
        }
    }

    fn len(&self) -> usize {
        MinHeapStore::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use rand::prelude::*;
    use std::rc::Rc;

    fn assert_heap_property<A: TimerAction>(heap: &MinHeapStore<A>) {
        let a = &heap.array;
        for i in 0..a.len() {
            for child in [2 * i + 1, 2 * i + 2] {
                if child < a.len() {
                    assert!(
                        a[i].expire <= a[child].expire,
                        "heap property violated at {} -> {}",
                        i,
                        child
                    );
                }
            }
        }
        assert!(a.len() <= heap.capacity());
    }

    #[test]
    fn rejects_zero_capacity() {
        let res = MinHeapStore::<Recording>::with_capacity(0);
        assert!(matches!(res, Err(TimerError::InvalidArgument(_))));
    }

    #[test]
    fn grows_by_doubling() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(2).unwrap();
        heap.add(10, recording(&log, 10)).unwrap();
        heap.add(3, recording(&log, 3)).unwrap();
        assert_eq!(heap.capacity(), 2);
        heap.add(7, recording(&log, 7)).unwrap();
        assert_eq!(heap.capacity(), 4);
        assert_eq!(heap.top(), Some(3));
        for e in 0..2 {
            heap.add(e, recording(&log, e)).unwrap();
        }
        assert_eq!(heap.capacity(), 8);
        assert_heap_property(&heap);
    }

    #[test]
    fn tick_fires_due_in_order() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        for e in [9, 4, 6, 1, 12, 4] {
            heap.add(e, recording(&log, e)).unwrap();
        }
        assert_eq!(heap.tick(6), 4);
        assert_eq!(*log.borrow(), vec![1, 4, 4, 6]);
        assert_eq!(heap.top(), Some(9));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn cancel_is_lazy() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        let h1 = heap.add(1, recording(&log, 1)).unwrap();
        let h5 = heap.add(5, recording(&log, 5)).unwrap();
        heap.add(3, recording(&log, 3)).unwrap();

        assert!(heap.cancel(h1));
        assert!(!heap.cancel(h1));
        assert!(!heap.contains(h1));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.heap_len(), 3);
        // the inert root is still visible until a tick discards it
        assert_eq!(heap.top(), Some(1));

        assert!(heap.cancel(h5));
        assert_eq!(heap.tick(10), 1);
        assert_eq!(*log.borrow(), vec![3]);
        assert_eq!(heap.heap_len(), 0);
        assert!(heap.is_empty());
    }

    #[test]
    fn tick_discards_inert_root_before_deadline() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        let h = heap.add(100, recording(&log, 100)).unwrap();
        heap.add(200, recording(&log, 200)).unwrap();
        heap.cancel(h);
        assert_eq!(heap.tick(0), 0);
        assert_eq!(heap.top(), Some(200));
        assert_eq!(heap.heap_len(), 1);
    }

    #[test]
    fn cancel_heavy_workload_keeps_slots() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(1).unwrap();
        heap.add(0, recording(&log, 0)).unwrap();
        for e in 1..=100 {
            let h = heap.add(e, recording(&log, e)).unwrap();
            heap.cancel(h);
        }
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.heap_len(), 101);
        assert_eq!(heap.capacity(), 128);
    }

    #[test]
    fn pop_returns_state_without_firing() {
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        let h = heap.add(2, recording(&log, 2)).unwrap();
        heap.add(4, recording(&log, 4)).unwrap();
        heap.cancel(h);
        assert!(matches!(heap.pop(), Some((2, TimerState::Cancelled))));
        assert!(matches!(heap.pop(), Some((4, TimerState::Scheduled(_)))));
        assert!(heap.pop().is_none());
        assert!(log.borrow().is_empty());
        assert!(heap.is_empty());
    }

    #[test]
    fn seeded_heap() {
        let log = fire_log();
        let seed: Vec<_> = [8, 3, 5, 1, 9, 2]
            .iter()
            .map(|e| (*e, recording(&log, *e)))
            .collect();
        let (mut heap, handles) = MinHeapStore::from_seed(seed, 8).unwrap();
        assert_eq!(handles.len(), 6);
        assert_eq!(heap.top(), Some(1));
        assert_heap_property(&heap);
        heap.cancel(handles[1]);
        heap.tick(100);
        assert_eq!(*log.borrow(), vec![1, 2, 5, 8, 9]);
    }

    #[test]
    fn seed_larger_than_capacity() {
        let log = fire_log();
        let seed = vec![(1, recording(&log, 1)), (2, recording(&log, 2))];
        let res = MinHeapStore::from_seed(seed, 1);
        assert!(matches!(res, Err(TimerError::InvalidArgument(_))));
    }

    #[test]
    fn panicking_action_does_not_stop_tick() {
        init_logging();
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        heap.add(11, recording(&log, 11)).unwrap();
        heap.add(12, panicking(&log, 12)).unwrap();
        heap.add(13, recording(&log, 13)).unwrap();
        heap.add(20, recording(&log, 20)).unwrap();
        assert_eq!(heap.tick(13), 2);
        assert_eq!(*log.borrow(), vec![11, 13]);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.heap_len(), 1);
        assert_eq!(heap.top(), Some(20));
    }

    #[test]
    fn dropping_store_fires_nothing() {
        let log = fire_log();
        let mut heap = MinHeapStore::default();
        let h = heap.add(5, recording(&log, 5)).unwrap();
        heap.add(1, recording(&log, 1)).unwrap();
        heap.add(9, recording(&log, 9)).unwrap();
        heap.cancel(h);
        drop(heap);
        assert!(log.borrow().is_empty());
        assert_eq!(Rc::strong_count(&log), 1);
    }

    #[test]
    fn random_operations_keep_heap_property() {
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(42);
        let log = fire_log();
        let mut heap = MinHeapStore::with_capacity(4).unwrap();
        let mut handles = Vec::new();
        let mut cancelled = Vec::new();
        let mut now = 0;
        for _ in 0..3000 {
            match rng.gen_range(0..5) {
                0..=2 => {
                    let e = now + rng.gen_range(0..200);
                    handles.push(heap.add(e, recording(&log, e)).unwrap());
                }
                3 if !handles.is_empty() => {
                    let h = handles.swap_remove(rng.gen_range(0..handles.len()));
                    if heap.cancel(h) {
                        cancelled.push(h);
                    }
                }
                _ => {
                    now += rng.gen_range(0..30);
                    log.borrow_mut().clear();
                    heap.tick(now);
                    let fired = log.borrow();
                    assert!(fired.iter().all(|e| *e <= now));
                    assert!(fired.windows(2).all(|w| w[0] <= w[1]));
                }
            }
            assert_heap_property(&heap);
        }
        assert!(cancelled.iter().all(|h| !heap.contains(*h)));
    }
}
