//! Per-key timer bookkeeping on top of any [TimerStore].
use super::*;
use std::{fmt::Debug, hash::Hash};

#[cfg(feature = "fnv-hash")]
type KeyMap<K, V> = fnv::FnvHashMap<K, V>;
#[cfg(all(feature = "fx-hash", not(feature = "fnv-hash")))]
type KeyMap<K, V> = rustc_hash::FxHashMap<K, V>;
#[cfg(not(any(feature = "fx-hash", feature = "fnv-hash")))]
type KeyMap<K, V> = std::collections::HashMap<K, V>;

/// A timer store that tracks at most one outstanding timer per caller key
///
/// This is the usual shape of per-connection timeouts: each connection
/// has a single inactivity timer which is replaced on every activity
/// and cancelled when the connection closes. The key takes the place of a
/// back-reference from the connection data to its timer.
pub struct KeyedTimers<K, S>
where
    K: Hash + Eq + Clone + Debug,
    S: TimerStore,
{
    store: S,
    handles: KeyMap<K, TimerHandle>,
}

impl<K, S> KeyedTimers<K, S>
where
    K: Hash + Eq + Clone + Debug,
    S: TimerStore,
{
    /// Wrap an (empty) timer store
    pub fn new(store: S) -> Self {
        KeyedTimers {
            store,
            handles: KeyMap::default(),
        }
    }

    /// Schedule `action` for `key`, `delay` time units after `now`
    ///
    /// Any timer still outstanding for `key` is cancelled first.
    pub fn insert(
        &mut self,
        key: K,
        now: Timestamp,
        delay: Timestamp,
        action: S::Action,
    ) -> Result<TimerHandle, TimerError> {
        let handle = self.store.schedule_after(now, delay, action)?;
        if let Some(old) = self.handles.insert(key.clone(), handle) {
            if self.store.cancel(old) {
                tracing::trace!(?key, ?old, new = ?handle, "replaced timer for key");
            }
        }
        Ok(handle)
    }

    /// Cancel the outstanding timer for `key`
    ///
    /// Returns `false` if there was none.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.handles.remove(key) {
            Some(handle) => self.store.cancel(handle),
            None => false,
        }
    }

    /// Whether `key` has an outstanding timer
    pub fn contains_key(&self, key: &K) -> bool {
        self.handle(key).is_some()
    }

    /// The handle of the outstanding timer for `key`
    pub fn handle(&self, key: &K) -> Option<TimerHandle> {
        self.handles
            .get(key)
            .copied()
            .filter(|h| self.store.is_scheduled(*h))
    }

    /// Trigger all due timers and forget the keys they belonged to
    pub fn tick(&mut self, now: Timestamp) -> usize {
        let fired = self.store.tick(now);
        // panicked actions are gone too, without showing up in `fired`
        if fired > 0 || self.handles.len() > self.store.len() {
            let store = &self.store;
            self.handles.retain(|_, h| store.is_scheduled(*h));
        }
        fired
    }

    /// The time at which the driver should tick next
    pub fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        self.store.next_deadline(now)
    }

    /// Number of keys with an outstanding timer
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no key has an outstanding timer
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// A reference to the wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap the store, dropping the key index
    pub fn into_inner(self) -> S {
        self.store
    }
}
