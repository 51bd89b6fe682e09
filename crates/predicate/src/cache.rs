//! Process-wide memo tables with bounded lock waits.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use log::{trace, warn};
use parking_lot::RwLock;

/// Default time a writer waits for the table lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// An insert-if-absent cache shared across threads.
///
/// Lookups and inserts wait at most the configured timeout for the lock. A caller that cannot get
/// the lock in time still gets its freshly computed value; it just is not remembered.
pub struct TypeCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
    timeout: Duration,
}

impl<K, V> Default for TypeCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            timeout: LOCK_TIMEOUT,
        }
    }
}

impl<K, V> TypeCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    /// Creates an empty cache with the default lock timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache with a custom lock timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Returns the cached value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.try_read_for(self.timeout)?.get(key).cloned()
    }

    /// Returns the cached value for `key`, computing and inserting it when absent.
    ///
    /// When two callers race, the first insert wins and both get that value.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            trace!("cache hit for {key:?}");
            return value;
        }
        let value = compute();
        match self.entries.try_write_for(self.timeout) {
            Some(mut entries) => entries.entry(key).or_insert(value).clone(),
            None => {
                warn!(
                    "timed out after {:?} waiting to cache {key:?}, using uncached value",
                    self.timeout
                );
                value
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn first_insert_wins() {
        let cache: TypeCache<&str, u32> = TypeCache::new();
        assert_eq!(cache.get_or_insert_with("a", || 1), 1);
        assert_eq!(cache.get_or_insert_with("a", || 2), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lock_timeout_returns_uncached_value() {
        let cache = Arc::new(TypeCache::<&str, u32>::with_timeout(Duration::from_millis(
            20,
        )));
        let guard = cache.entries.write();
        let other = Arc::clone(&cache);
        let value = thread::spawn(move || other.get_or_insert_with("a", || 7))
            .join()
            .unwrap();
        drop(guard);
        assert_eq!(value, 7);
        assert!(cache.is_empty());
    }
}
