use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

struct CacheSlot<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Small TTL map shared across requests. Reads after expiry miss and drop the stale slot.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<K, CacheSlot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock, slots: Mutex::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut slots = self.lock();
        match slots.get(key) {
            Some(slot) if slot.expires_at > now => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    /// A TTL that would run past the end of the calendar keeps the entry until `MAX_UTC`.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.lock().insert(key, CacheSlot { value, expires_at });
    }

    /// Returns whether an entry was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.expires_at > now);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheSlot<V>>> {
        match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
