//! Multi-key locking over the store's shard locks.
//!
//! Locking is per shard, not per key: two unrelated keys that hash to the same
//! shard serialize against each other. Every call normalizes its keys into a
//! [`LockSet`] and takes each distinct shard exactly once, in ascending shard
//! index order, so overlapping calls can never wait on each other in a cycle.

use super::{ShardMap, ShardedStore};
use bytes::Bytes;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

/// Deduplicated, sorted keys of one locking call and the shards they map to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSet<'k> {
    keys: Vec<&'k [u8]>,
    shards: Vec<usize>,
}

impl<'k> LockSet<'k> {
    pub fn new<V, K: AsRef<[u8]>>(store: &ShardedStore<V>, keys: &'k [K]) -> Self {
        let mut keys: Vec<&[u8]> = keys.iter().map(|k| k.as_ref()).collect();
        keys.sort_unstable();
        keys.dedup();

        let mut shards: Vec<usize> = keys.iter().map(|k| store.shard_index(k)).collect();
        shards.sort_unstable();
        shards.dedup();

        Self { keys, shards }
    }

    /// Keys in lexicographic order, without duplicates
    pub fn keys(&self) -> &[&'k [u8]] {
        &self.keys
    }

    /// Shards in acquisition order, one entry per distinct shard
    pub fn shards(&self) -> &[usize] {
        &self.shards
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<V> ShardedStore<V> {
    /// Normalize `keys` the way [`lock`](Self::lock) and [`rlock`](Self::rlock) do
    pub fn lock_set<'k, K: AsRef<[u8]>>(&self, keys: &'k [K]) -> LockSet<'k> {
        LockSet::new(self, keys)
    }

    /// Exclusively lock every shard owning one of `keys`.
    ///
    /// An empty key list locks nothing. The shards stay locked until the
    /// returned guard is unlocked or dropped.
    pub fn lock<K: AsRef<[u8]>>(&self, keys: &[K]) -> WriteLocks<'_, V> {
        let set = self.lock_set(keys);
        let guards = set
            .shards()
            .iter()
            .map(|&idx| (idx, self.shard_lock(idx).write()))
            .collect();

        WriteLocks {
            store: self,
            guards,
        }
    }

    /// Shared-lock every shard owning one of `keys`.
    pub fn rlock<K: AsRef<[u8]>>(&self, keys: &[K]) -> ReadLocks<'_, V> {
        let set = self.lock_set(keys);
        let guards = set
            .shards()
            .iter()
            .map(|&idx| (idx, self.shard_lock(idx).read()))
            .collect();

        ReadLocks { store: self, guards }
    }
}

/// Exclusive hold on a set of shards, returned by [`ShardedStore::lock`]
pub struct WriteLocks<'a, V> {
    store: &'a ShardedStore<V>,
    guards: Vec<(usize, RwLockWriteGuard<'a, ShardMap<V>>)>,
}

impl<'a, V> WriteLocks<'a, V> {
    /// Shards held, in the order they were acquired
    pub fn held_shards(&self) -> Vec<usize> {
        self.guards.iter().map(|(idx, _)| *idx).collect()
    }

    /// # Panics
    ///
    /// Panics if `key` is outside the locked set.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let slot = locate(self.store, &self.guards, key);
        self.guards[slot].1.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite `key`, returning `true` if it was absent.
    ///
    /// # Panics
    ///
    /// Panics if `key` is outside the locked set.
    pub fn put(&mut self, key: impl Into<Bytes>, value: V) -> bool {
        let key = key.into();
        let slot = locate(self.store, &self.guards, &key);
        self.store
            .insert_locked(&mut self.guards[slot].1, key, value)
    }

    /// Release every shard, in acquisition order.
    ///
    /// Dropping the guard does the same: `guards` is dropped front to back.
    pub fn unlock(self) {}
}

/// Shared hold on a set of shards, returned by [`ShardedStore::rlock`]
pub struct ReadLocks<'a, V> {
    store: &'a ShardedStore<V>,
    guards: Vec<(usize, RwLockReadGuard<'a, ShardMap<V>>)>,
}

impl<'a, V> ReadLocks<'a, V> {
    pub fn held_shards(&self) -> Vec<usize> {
        self.guards.iter().map(|(idx, _)| *idx).collect()
    }

    /// # Panics
    ///
    /// Panics if `key` is outside the locked set.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let slot = locate(self.store, &self.guards, key);
        self.guards[slot].1.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Release every shard, in acquisition order, as dropping does.
    pub fn runlock(self) {}
}

fn locate<V, G>(store: &ShardedStore<V>, guards: &[(usize, G)], key: &[u8]) -> usize {
    let idx = store.shard_index(key);
    match guards.binary_search_by_key(&idx, |(held, _)| *held) {
        Ok(slot) => slot,
        Err(_) => panic!("key maps to shard {} which is not in the locked set", idx),
    }
}
