//! Sharded keyspace.
//!
//! The key space is split across a fixed, power-of-two number of shards, each
//! guarded by its own reader-writer lock. Operations on keys that land in
//! different shards never contend. Multi-key critical sections go through
//! [`ShardedStore::lock`] / [`ShardedStore::rlock`], which acquire the shards
//! in one global order.

mod hash;
mod lock;

pub use hash::fnv1a32;
pub use lock::{LockSet, ReadLocks, WriteLocks};

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest shard count a store is built with
pub const MIN_SHARDS: usize = 16;

/// Shard count used when rounding a capacity hint would overflow
pub const MAX_SHARDS: usize = 1 << 30;

/// Round a capacity hint up to a power-of-two shard count.
///
/// Hints at or below [`MIN_SHARDS`] give `MIN_SHARDS`; anything that cannot be
/// rounded within [`MAX_SHARDS`] saturates there.
pub fn shard_count(capacity_hint: usize) -> usize {
    if capacity_hint <= MIN_SHARDS {
        return MIN_SHARDS;
    }

    match capacity_hint.checked_next_power_of_two() {
        Some(n) if n <= MAX_SHARDS => n,
        _ => MAX_SHARDS,
    }
}

pub(crate) type ShardMap<V> = HashMap<Bytes, V>;

struct Shard<V> {
    data: RwLock<ShardMap<V>>,
}

/// Key-value store partitioned into independently locked shards
pub struct ShardedStore<V> {
    shards: Box<[Shard<V>]>,
    len_hint: AtomicUsize,
}

impl<V> ShardedStore<V> {
    /// Create a store sized from `capacity_hint` (see [`shard_count`])
    pub fn new(capacity_hint: usize) -> Self {
        let shards = (0..shard_count(capacity_hint))
            .map(|_| Shard {
                data: RwLock::new(HashMap::new()),
            })
            .collect();

        Self {
            shards,
            len_hint: AtomicUsize::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard owning `key`
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        fnv1a32(key) as usize & (self.shards.len() - 1)
    }

    /// Number of distinct keys ever inserted.
    ///
    /// Only grows; nothing in the store removes keys.
    pub fn approx_len(&self) -> usize {
        self.len_hint.load(Ordering::Relaxed)
    }

    /// Insert or overwrite `key`, returning `true` if the key was not present.
    pub fn put(&self, key: impl Into<Bytes>, value: V) -> bool {
        let key = key.into();
        let mut data = self.shards[self.shard_index(&key)].data.write();
        self.insert_locked(&mut data, key, value)
    }

    /// Insert into an already locked shard map, counting first-time inserts.
    pub(crate) fn insert_locked(&self, data: &mut ShardMap<V>, key: Bytes, value: V) -> bool {
        let inserted = data.insert(key, value).is_none();
        if inserted {
            self.len_hint.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    pub(crate) fn shard_lock(&self, index: usize) -> &RwLock<ShardMap<V>> {
        &self.shards[index].data
    }
}

impl<V: Clone> ShardedStore<V> {
    /// Read `key` under its shard's shared lock
    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.shards[self.shard_index(key)].data.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_shard_count_rounding() {
        assert_eq!(shard_count(0), 16);
        assert_eq!(shard_count(16), 16);
        assert_eq!(shard_count(17), 32);
        assert_eq!(shard_count(1000), 1024);
        assert_eq!(shard_count(1024), 1024);
        assert_eq!(shard_count(MAX_SHARDS), MAX_SHARDS);
        assert_eq!(shard_count(MAX_SHARDS + 1), MAX_SHARDS);
        assert_eq!(shard_count(usize::MAX), MAX_SHARDS);
    }

    #[test]
    fn test_shard_count_is_power_of_two_and_covers_hint() {
        for hint in (0..5000).chain([65_535, 65_536, 65_537, 1 << 20]) {
            let n = shard_count(hint);
            assert!(n.is_power_of_two());
            assert!(n >= MIN_SHARDS);
            assert!(n >= hint);
        }
    }

    #[test]
    fn test_get_put() {
        let store = ShardedStore::new(0);
        assert_eq!(store.get(b"foo"), None);

        assert!(store.put("foo", 1));
        assert_eq!(store.get(b"foo"), Some(1));

        assert!(!store.put("foo", 2));
        assert_eq!(store.get(b"foo"), Some(2));
        assert_eq!(store.approx_len(), 1);
    }

    #[test]
    fn test_shard_index_is_stable() {
        let store: ShardedStore<()> = ShardedStore::new(100);
        assert_eq!(store.shard_count(), 128);
        for i in 0..1000 {
            let key = format!("key:{}", i);
            let idx = store.shard_index(key.as_bytes());
            assert!(idx < store.shard_count());
            assert_eq!(idx, store.shard_index(key.as_bytes()));
            assert_eq!(idx, fnv1a32(key.as_bytes()) as usize % 128);
        }
    }

    #[test]
    fn test_concurrent_first_insert_reported_once() {
        let store = Arc::new(ShardedStore::new(0));
        let mut handles = Vec::new();

        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut inserted = 0;
                for i in 0..500 {
                    if store.put(format!("key:{}", i), t) {
                        inserted += 1;
                    }
                }
                inserted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 500);
        assert_eq!(store.approx_len(), 500);
    }

    #[test]
    fn test_other_shards_do_not_block() {
        let store = Arc::new(ShardedStore::new(0));
        let held = b"held".as_slice();
        let other = (0..)
            .map(|i| format!("other:{}", i))
            .find(|k| store.shard_index(k.as_bytes()) != store.shard_index(held))
            .unwrap();

        let guard = store.lock(&[held]);

        let (tx, rx) = mpsc::channel();
        let worker = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.put(other.clone(), 1);
                tx.send(store.get(other.as_bytes())).unwrap();
            })
        };

        // Completes while the other shard is still exclusively held.
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, Some(1));

        guard.unlock();
        worker.join().unwrap();
    }
}
