//! Channel state cache
//!
//! Client-side view of the board's outputs. Entries written after silent
//! commands are predictions, not readings: nothing reconciles them against a
//! later status read, so a dropped frame leaves the cache out of step with
//! the hardware until the caller overwrites it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::trace;

use super::{ChannelSet, MAX_BRANCHES};
use crate::protocol::{RelayError, Result};

/// Shared channel states behind one lock.
///
/// Clones share the same states, which lets pulse timers update the cache
/// from their own threads.
#[derive(Debug, Clone)]
pub struct ChannelStateCache {
    states: Arc<Mutex<ChannelSet>>,
}

impl ChannelStateCache {
    /// `len` channels, all off
    pub fn new(len: u8) -> Self {
        Self {
            states: Arc::new(Mutex::new(ChannelSet::new(len))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelSet> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn out_of_range(&self, index: usize) -> RelayError {
        RelayError::ChannelOutOfRange {
            channel: index as u32,
            max: self.len().min(MAX_BRANCHES as usize) as u8,
        }
    }

    /// Number of tracked channels
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite the state at a 0-based index
    pub fn set(&self, index: usize, value: bool) -> Result<()> {
        if self.lock().set(index, value) {
            Ok(())
        } else {
            Err(self.out_of_range(index))
        }
    }

    /// Invert the state at a 0-based index, returning the new value
    pub fn toggle(&self, index: usize) -> Result<bool> {
        let mut states = self.lock();
        let value = match states.get(index) {
            Some(value) => !value,
            None => {
                drop(states);
                return Err(self.out_of_range(index));
            }
        };
        states.set(index, value);
        Ok(value)
    }

    /// State at a 0-based index
    pub fn get(&self, index: usize) -> Option<bool> {
        self.lock().get(index)
    }

    /// Set every channel to `value`
    pub fn fill(&self, value: bool) {
        let mut states = self.lock();
        let len = states.len() as u8;
        *states = ChannelSet::filled(len, value);
    }

    /// Overwrite from a full set; extra entries in `set` are ignored
    pub fn replace(&self, set: &ChannelSet) {
        let mut states = self.lock();
        for index in 0..states.len() {
            states.set(index, set.get(index).unwrap_or(false));
        }
    }

    /// Copy of all states
    pub fn get_all(&self) -> ChannelSet {
        self.lock().clone()
    }

    /// Set `index` to `value_after` once `delay` has elapsed.
    ///
    /// Each call arms its own timer; two timers on the same channel both fire
    /// and whichever fires last decides the state.
    pub fn schedule_pulse(
        &self,
        index: usize,
        value_after: bool,
        delay: Duration,
    ) -> Result<JoinHandle<()>> {
        if index >= self.len() {
            return Err(self.out_of_range(index));
        }

        let cache = self.clone();
        trace!(
            "channel {} reverts to {} in {}ms",
            index + 1,
            value_after,
            delay.as_millis()
        );
        Ok(thread::spawn(move || {
            thread::sleep(delay);
            cache.lock().set(index, value_after);
            trace!("channel {} reverted to {}", index + 1, value_after);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zeroed() {
        let cache = ChannelStateCache::new(8);
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.get_all(), ChannelSet::new(8));
    }

    #[test]
    fn test_set_and_toggle() {
        let cache = ChannelStateCache::new(8);
        cache.set(2, true).expect("set");
        assert_eq!(cache.get(2), Some(true));
        assert!(!cache.toggle(2).expect("toggle"));
        assert!(cache.toggle(7).expect("toggle"));
        assert!(cache.set(8, true).is_err());
        assert!(cache.toggle(8).is_err());
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let cache = ChannelStateCache::new(4);
        let snapshot = cache.get_all();
        cache.fill(true);
        assert_eq!(snapshot, ChannelSet::new(4));
        assert_eq!(cache.get_all(), ChannelSet::filled(4, true));
    }

    #[test]
    fn test_replace_truncates() {
        let cache = ChannelStateCache::new(4);
        cache.replace(&ChannelSet::filled(32, true));
        assert_eq!(cache.get_all(), ChannelSet::filled(4, true));
    }

    #[test]
    fn test_scheduled_pulse_fires() {
        let cache = ChannelStateCache::new(8);
        cache.set(3, true).expect("set");
        let handle = cache
            .schedule_pulse(3, false, Duration::from_millis(20))
            .expect("schedule");
        assert_eq!(cache.get(3), Some(true));
        handle.join().expect("timer thread");
        assert_eq!(cache.get(3), Some(false));
    }

    #[test]
    fn test_independent_pulses() {
        let cache = ChannelStateCache::new(8);
        cache.fill(true);
        let a = cache
            .schedule_pulse(0, false, Duration::from_millis(10))
            .expect("schedule");
        let b = cache
            .schedule_pulse(5, false, Duration::from_millis(30))
            .expect("schedule");
        a.join().expect("timer thread");
        b.join().expect("timer thread");
        assert_eq!(cache.get_all().active(), vec![1, 2, 3, 4, 6, 7]);
    }

    #[test]
    fn test_pulse_out_of_range() {
        let cache = ChannelStateCache::new(8);
        assert!(cache
            .schedule_pulse(8, false, Duration::from_millis(1))
            .is_err());
    }
}
