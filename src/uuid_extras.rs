use crate::{stores::KeyedTimers, TimerError, TimerStore, Timestamp};
use uuid::Uuid;

impl<S> KeyedTimers<Uuid, S>
where
    S: TimerStore,
{
    /// Schedule `action` under a fresh random key
    ///
    /// Uses `Uuid::new_v4()` internally and returns the key,
    /// which can later be used to [cancel](KeyedTimers::cancel) the timer.
    pub fn insert_with_random_key(
        &mut self,
        now: Timestamp,
        delay: Timestamp,
        action: S::Action,
    ) -> Result<Uuid, TimerError> {
        let key = Uuid::new_v4();
        self.insert(key, now, delay, action)?;
        Ok(key)
    }
}
