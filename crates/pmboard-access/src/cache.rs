//! Per-process memoization of field permission lookups.
//!
//! The cache is injected into [`PermissionTable`](crate::PermissionTable)
//! as a trait object. Entries are dropped wholesale whenever permissions or
//! parameters change in this process. Writes made by another process are
//! not observed until the next local clear; that stale window is accepted.
//!
//! Every clear bumps a generation counter. A reader captures the generation
//! before it reads the store and hands it back to `put`; a value read before
//! a clear is never kept after it.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use pmboard_state::{ParameterId, Role};

use crate::policy::FieldAccess;

/// Memoization seam for `(role, parameter)` permission lookups.
pub trait PermissionCache: Send + Sync {
    fn get(&self, role: Role, parameter_id: &str) -> Option<FieldAccess>;

    /// Current generation; changes on every [`clear`](Self::clear).
    fn generation(&self) -> u64;

    /// Remember `access` unless the cache was cleared since `generation`
    /// was observed.
    fn put(&self, role: Role, parameter_id: &str, access: FieldAccess, generation: u64);

    fn clear(&self);
}

/// Concurrent in-memory cache.
#[derive(Default)]
pub struct MemoryPermissionCache {
    entries: DashMap<(Role, ParameterId), FieldAccess>,
    generation: AtomicU64,
}

impl MemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PermissionCache for MemoryPermissionCache {
    fn get(&self, role: Role, parameter_id: &str) -> Option<FieldAccess> {
        self.entries
            .get(&(role, parameter_id.to_string()))
            .map(|entry| *entry.value())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn put(&self, role: Role, parameter_id: &str, access: FieldAccess, generation: u64) {
        if self.generation() != generation {
            return;
        }
        let key = (role, parameter_id.to_string());
        self.entries.insert(key.clone(), access);
        // A clear may have landed between the check and the insert.
        if self.generation() != generation {
            self.entries.remove(&key);
        }
    }

    fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }
}

/// Cache that never remembers anything; every lookup hits the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPermissionCache;

impl PermissionCache for NoopPermissionCache {
    fn get(&self, _role: Role, _parameter_id: &str) -> Option<FieldAccess> {
        None
    }

    fn generation(&self) -> u64 {
        0
    }

    fn put(&self, _role: Role, _parameter_id: &str, _access: FieldAccess, _generation: u64) {}

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_round_trip_and_clear() {
        let cache = MemoryPermissionCache::new();
        assert!(cache.get(Role::Staff, "p1").is_none());

        cache.put(Role::Staff, "p1", FieldAccess::ALL, cache.generation());
        assert_eq!(cache.get(Role::Staff, "p1"), Some(FieldAccess::ALL));
        assert!(cache.get(Role::Manager, "p1").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn put_from_before_a_clear_is_dropped() {
        let cache = MemoryPermissionCache::new();
        let observed = cache.generation();
        cache.clear();
        cache.put(Role::Staff, "p1", FieldAccess::ALL, observed);
        assert!(cache.get(Role::Staff, "p1").is_none());
        assert!(cache.is_empty());

        cache.put(Role::Staff, "p1", FieldAccess::ALL, cache.generation());
        assert_eq!(cache.get(Role::Staff, "p1"), Some(FieldAccess::ALL));
    }

    #[test]
    fn noop_cache_forgets() {
        let cache = NoopPermissionCache;
        cache.put(Role::Staff, "p1", FieldAccess::ALL, cache.generation());
        assert!(cache.get(Role::Staff, "p1").is_none());
    }
}
