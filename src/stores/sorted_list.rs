//! An ascending doubly-linked list of timers.
use super::*;

struct ListNode<A> {
    expire: Timestamp,
    action: A,
    prev: Option<TimerHandle>,
    next: Option<TimerHandle>,
}

/// An ascending, doubly-linked list of timers
///
/// The list is ordered by expiry from head to tail, with equal expiries
/// kept in arrival order. Nodes live in an arena and are linked by handle.
///
/// - [add](SortedListStore::add) is `O(n)` (`O(1)` for a new earliest timer)
/// - [cancel](SortedListStore::cancel) is `O(1)`
/// - [tick](SortedListStore::tick) is `O(k)` for `k` expired timers
pub struct SortedListStore<A> {
    nodes: SlotMap<TimerHandle, ListNode<A>>,
    head: Option<TimerHandle>,
    tail: Option<TimerHandle>,
}

impl<A> SortedListStore<A>
where
    A: TimerAction,
{
    /// Create an empty list
    pub fn new() -> Self {
        SortedListStore {
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    /// Insert a timer that expires at the absolute time `expire`
    pub fn add(&mut self, expire: Timestamp, action: A) -> TimerHandle {
        let handle = self.nodes.insert(ListNode {
            expire,
            action,
            prev: None,
            next: None,
        });
        tracing::trace!(?handle, expire, "adding timer to list");
        match self.head {
            None => {
                self.head = Some(handle);
                self.tail = Some(handle);
            }
            Some(head) if expire < self.nodes[head].expire => {
                self.nodes[handle].next = Some(head);
                self.nodes[head].prev = Some(handle);
                self.head = Some(handle);
            }
            Some(head) => self.insert_after(handle, head),
        }
        handle
    }

    /// Move a timer whose expiry was pushed back to `new_expire`
    ///
    /// Only increases are supported; a decrease is ignored and reported as `false`,
    /// as is a stale handle. The node is only moved toward the tail,
    /// scanning from its old position rather than from the head.
    pub fn adjust(&mut self, handle: TimerHandle, new_expire: Timestamp) -> bool {
        let Some(node) = self.nodes.get_mut(handle) else {
            return false;
        };
        if new_expire < node.expire {
            tracing::warn!(
                ?handle,
                old = node.expire,
                new = new_expire,
                "ignoring adjust that would move a timer earlier"
            );
            return false;
        }
        node.expire = new_expire;
        let (prev, next) = (node.prev, node.next);
        let next = match next {
            // still before its successor (or the tail), nothing to move
            Some(next) if new_expire >= self.nodes[next].expire => next,
            _ => return true,
        };
        match prev {
            None => {
                self.head = Some(next);
                self.nodes[next].prev = None;
            }
            Some(prev) => {
                self.nodes[prev].next = Some(next);
                self.nodes[next].prev = Some(prev);
            }
        }
        let node = &mut self.nodes[handle];
        node.prev = None;
        node.next = None;
        self.insert_after(handle, next);
        true
    }

    /// Unlink and drop the timer behind `handle` without triggering it
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.unlink(handle) {
            Some(node) => {
                tracing::trace!(?handle, expire = node.expire, "cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Trigger every timer with an expiry at or before `now`, in ascending order
    pub fn tick(&mut self, now: Timestamp) -> usize {
        let mut fired = 0usize;
        while let Some(head) = self.head {
            if now < self.nodes[head].expire {
                break;
            }
            if let Some(node) = self.unlink(head) {
                if fire(head, node.expire, node.action) {
                    fired += 1;
                }
            }
        }
        if fired > 0 {
            tracing::debug!(now, fired, remaining = self.nodes.len(), "list tick");
        }
        fired
    }

    /// The expiry of the head, i.e. the nearest deadline
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.head.map(|h| self.nodes[h].expire)
    }

    /// The expiry of the timer behind `handle`, if it is still scheduled
    pub fn expire_of(&self, handle: TimerHandle) -> Option<Timestamp> {
        self.nodes.get(handle).map(|n| n.expire)
    }

    /// Whether `handle` refers to a scheduled timer
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Iterate over the scheduled expiries from head to tail
    pub fn iter_expiries(&self) -> impl Iterator<Item = Timestamp> + '_ {
        std::iter::successors(self.head, move |h| self.nodes[*h].next)
            .map(move |h| self.nodes[h].expire)
    }

    /// Number of scheduled timers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Splice `handle` into the part of the list after `start`,
    // just before the first node with a strictly greater expiry.
    fn insert_after(&mut self, handle: TimerHandle, start: TimerHandle) {
        let expire = self.nodes[handle].expire;
        let mut prev = start;
        let mut cur = self.nodes[start].next;
        while let Some(c) = cur {
            if expire < self.nodes[c].expire {
                self.nodes[prev].next = Some(handle);
                self.nodes[c].prev = Some(handle);
                let node = &mut self.nodes[handle];
                node.prev = Some(prev);
                node.next = Some(c);
                return;
            }
            prev = c;
            cur = self.nodes[c].next;
        }
        self.nodes[prev].next = Some(handle);
        let node = &mut self.nodes[handle];
        node.prev = Some(prev);
        node.next = None;
        self.tail = Some(handle);
    }

    fn unlink(&mut self, handle: TimerHandle) -> Option<ListNode<A>> {
        let node = self.nodes.remove(handle)?;
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node)
    }
}

impl<A> Default for SortedListStore<A>
where
    A: TimerAction,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TimerStore for SortedListStore<A>
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
        Ok(self.add(expire, action))
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        SortedListStore::cancel(self, handle)
    }

    fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.contains(handle)
    }

    fn tick(&mut self, now: Timestamp) -> usize {
        SortedListStore::tick(self, now)
    }

    fn next_deadline(&self, _now: Timestamp) -> Option<Timestamp> {
        self.next_expiry()
    }

    fn len(&self) -> usize {
        SortedListStore::len(self)
    }
}
