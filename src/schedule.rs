use std::collections::{BTreeMap, HashMap, HashSet};

use ordered_float::OrderedFloat;

use crate::modifiers::ModifierId;
use crate::stat_addressing::StatId;

/// Points at one temporary modifier on one stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModifierHandle {
    pub stat: StatId,
    pub modifier: ModifierId,
}

/// All modifiers of one stat that expired during a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Expiration {
    pub stat: StatId,
    pub modifiers: Vec<ModifierId>,
}

/// Time-ordered index of temporary modifiers.
///
/// Entries are keyed by absolute expiry time, so a tick only touches the
/// modifiers that are actually due instead of scanning every stat.
#[derive(Debug, Default)]
pub struct TemporalScheduler {
    now: f64,
    queue: BTreeMap<OrderedFloat<f64>, Vec<ModifierHandle>>,
    entries: HashMap<ModifierId, (StatId, OrderedFloat<f64>)>,
    by_stat: HashMap<StatId, HashSet<ModifierId>>,
}

impl TemporalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scope time: the sum of every tick's delta.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_expiry(&self) -> Option<f64> {
        self.queue.keys().next().map(|key| key.0)
    }

    pub fn is_scheduled(&self, modifier: ModifierId) -> bool {
        self.entries.contains_key(&modifier)
    }

    pub fn scheduled_for(&self, stat: StatId) -> usize {
        self.by_stat.get(&stat).map_or(0, HashSet::len)
    }

    /// Schedules `handle` to expire `duration` from now and returns the absolute expiry.
    ///
    /// Negative or NaN durations expire on the next tick.
    pub fn register(&mut self, handle: ModifierHandle, duration: f64) -> f64 {
        let duration = if duration.is_nan() || duration < 0.0 { 0.0 } else { duration };
        let expires_at = self.now + duration;
        let key = OrderedFloat(expires_at);

        if self.entries.contains_key(&handle.modifier) {
            self.cancel(handle.modifier);
        }
        self.queue.entry(key).or_default().push(handle);
        self.entries.insert(handle.modifier, (handle.stat, key));
        self.by_stat.entry(handle.stat).or_default().insert(handle.modifier);
        expires_at
    }

    /// Removes a modifier before it expires. Returns `false` if it was not scheduled.
    pub fn cancel(&mut self, modifier: ModifierId) -> bool {
        let Some((stat, key)) = self.entries.remove(&modifier) else {
            return false;
        };
        if let Some(bucket) = self.queue.get_mut(&key) {
            bucket.retain(|h| h.modifier != modifier);
            if bucket.is_empty() {
                self.queue.remove(&key);
            }
        }
        if let Some(set) = self.by_stat.get_mut(&stat) {
            set.remove(&modifier);
            if set.is_empty() {
                self.by_stat.remove(&stat);
            }
        }
        true
    }

    /// Cancels everything scheduled for `stat`. Returns how many entries went away.
    pub fn cancel_stat(&mut self, stat: StatId) -> usize {
        let Some(modifiers) = self.by_stat.remove(&stat) else {
            return 0;
        };
        for modifier in &modifiers {
            if let Some((_, key)) = self.entries.remove(modifier) {
                if let Some(bucket) = self.queue.get_mut(&key) {
                    bucket.retain(|h| h.modifier != *modifier);
                    if bucket.is_empty() {
                        self.queue.remove(&key);
                    }
                }
            }
        }
        modifiers.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.entries.clear();
        self.by_stat.clear();
    }

    /// Advances time by `delta` and pops every entry due at the new time.
    ///
    /// Expirations come back in expiry order, with each stat listed once even
    /// if several of its modifiers expired together.
    pub fn tick(&mut self, delta: f64) -> Vec<Expiration> {
        if delta.is_finite() && delta > 0.0 {
            self.now += delta;
        } else if delta != 0.0 {
            log::warn!("ignoring invalid tick delta {}", delta);
        }

        let mut expired: Vec<Expiration> = Vec::new();
        let mut slot_of: HashMap<StatId, usize> = HashMap::new();

        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            for handle in entry.remove() {
                self.entries.remove(&handle.modifier);
                if let Some(set) = self.by_stat.get_mut(&handle.stat) {
                    set.remove(&handle.modifier);
                    if set.is_empty() {
                        self.by_stat.remove(&handle.stat);
                    }
                }
                let slot = *slot_of.entry(handle.stat).or_insert_with(|| {
                    expired.push(Expiration { stat: handle.stat, modifiers: Vec::new() });
                    expired.len() - 1
                });
                expired[slot].modifiers.push(handle.modifier);
            }
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat_addressing::StatArena;

    fn stats(count: usize) -> Vec<StatId> {
        let mut arena = StatArena::new();
        (0..count).map(|_| arena.insert_with(|_| ())).collect()
    }

    fn handle(stat: StatId, modifier: u64) -> ModifierHandle {
        ModifierHandle { stat, modifier: ModifierId(modifier) }
    }

    #[test]
    fn test_expires_in_time_order() {
        let ids = stats(2);
        let mut scheduler = TemporalScheduler::new();
        scheduler.register(handle(ids[0], 1), 3.0);
        scheduler.register(handle(ids[1], 2), 1.0);

        assert!(scheduler.tick(0.5).is_empty());
        let first = scheduler.tick(0.5);
        assert_eq!(first, vec![Expiration { stat: ids[1], modifiers: vec![ModifierId(2)] }]);
        let second = scheduler.tick(5.0);
        assert_eq!(second, vec![Expiration { stat: ids[0], modifiers: vec![ModifierId(1)] }]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_batches_by_stat() {
        let ids = stats(2);
        let mut scheduler = TemporalScheduler::new();
        scheduler.register(handle(ids[0], 1), 1.0);
        scheduler.register(handle(ids[1], 2), 1.5);
        scheduler.register(handle(ids[0], 3), 2.0);

        let expired = scheduler.tick(2.0);
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].stat, ids[0]);
        assert_eq!(expired[0].modifiers, vec![ModifierId(1), ModifierId(3)]);
        assert_eq!(expired[1].stat, ids[1]);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let ids = stats(1);
        let mut scheduler = TemporalScheduler::new();
        let at = scheduler.register(handle(ids[0], 1), 2.0);
        assert_eq!(at, 2.0);
        assert!(scheduler.tick(1.0).is_empty());
        assert_eq!(scheduler.tick(1.0).len(), 1);
    }

    #[test]
    fn test_cancel() {
        let ids = stats(1);
        let mut scheduler = TemporalScheduler::new();
        scheduler.register(handle(ids[0], 1), 1.0);
        scheduler.register(handle(ids[0], 2), 1.0);
        assert!(scheduler.cancel(ModifierId(1)));
        assert!(!scheduler.cancel(ModifierId(1)));
        assert_eq!(scheduler.scheduled_for(ids[0]), 1);
        let expired = scheduler.tick(1.0);
        assert_eq!(expired[0].modifiers, vec![ModifierId(2)]);
    }

    #[test]
    fn test_cancel_stat() {
        let ids = stats(2);
        let mut scheduler = TemporalScheduler::new();
        scheduler.register(handle(ids[0], 1), 1.0);
        scheduler.register(handle(ids[0], 2), 4.0);
        scheduler.register(handle(ids[1], 3), 1.0);
        assert_eq!(scheduler.cancel_stat(ids[0]), 2);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_expiry(), Some(1.0));
        let expired = scheduler.tick(10.0);
        assert_eq!(expired, vec![Expiration { stat: ids[1], modifiers: vec![ModifierId(3)] }]);
    }

    #[test]
    fn test_registration_is_relative_to_now() {
        let ids = stats(1);
        let mut scheduler = TemporalScheduler::new();
        scheduler.tick(10.0);
        assert_eq!(scheduler.register(handle(ids[0], 1), 2.5), 12.5);
        assert_eq!(scheduler.register(handle(ids[0], 2), -1.0), 10.0);
        assert_eq!(scheduler.tick(0.0).len(), 1);
    }
}
