//! Per-principal cache of resolved permission sets
//!
//! Entries expire after a TTL and can be dropped explicitly. Every
//! invalidation bumps a generation counter; a loader records the generation
//! before it reads the directory and the insert is refused if it changed in
//! between, so a load that raced an invalidation never repopulates the cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::PrincipalGrant;
use crate::permission::PermissionMatcher;

/// Everything the engine needs to decide for one principal
#[derive(Debug, Clone)]
pub struct EffectivePermissions {
    pub principal: PrincipalGrant,
    /// The principal's role and its ancestors
    pub role_chain: Vec<String>,
    pub permissions: Vec<String>,
    pub matcher: PermissionMatcher,
}

struct CacheEntry {
    value: Arc<EffectivePermissions>,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Uuid, CacheEntry>,
    generation: u64,
}

pub struct PermissionCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Read before loading; pass to [`insert`](Self::insert)
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn get(&self, principal: Uuid) -> Option<Arc<EffectivePermissions>> {
        let state = self.state.read();
        state
            .entries
            .get(&principal)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Store a loaded set unless an invalidation happened since `observed_generation`
    pub fn insert(&self, principal: Uuid, value: Arc<EffectivePermissions>, observed_generation: u64) -> bool {
        let mut state = self.state.write();
        if state.generation != observed_generation {
            return false;
        }
        state.entries.insert(
            principal,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub fn invalidate(&self, principal: Uuid) {
        let mut state = self.state.write();
        state.entries.remove(&principal);
        state.generation = state.generation.wrapping_add(1);
    }

    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        let ttl = self.ttl;
        state.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid) -> Arc<EffectivePermissions> {
        Arc::new(EffectivePermissions {
            principal: PrincipalGrant::new(id, "member"),
            role_chain: vec!["member".into()],
            permissions: vec!["tasks.*".into()],
            matcher: PermissionMatcher::compile(["tasks.*"]),
        })
    }

    #[test]
    fn test_insert_refused_after_racing_invalidation() {
        let cache = PermissionCache::new(Duration::from_secs(60));
        let id = Uuid::new_v4();

        let observed = cache.generation();
        cache.invalidate(id);
        assert!(!cache.insert(id, entry(id), observed));
        assert!(cache.get(id).is_none());

        let observed = cache.generation();
        assert!(cache.insert(id, entry(id), observed));
        assert!(cache.get(id).is_some());
    }

    #[test]
    fn test_invalidate_all_clears_everything() {
        let cache = PermissionCache::new(Duration::from_secs(60));
        for _ in 0..3 {
            let id = Uuid::new_v4();
            cache.insert(id, entry(id), cache.generation());
        }
        assert_eq!(cache.len(), 3);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_hidden_then_swept() {
        let cache = PermissionCache::new(Duration::from_millis(50));
        let id = Uuid::new_v4();
        cache.insert(id, entry(id), cache.generation());
        assert!(cache.get(id).is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert!(cache.get(id).is_none());
        assert_eq!(cache.sweep_expired(), 1);
        assert!(cache.is_empty());
    }
}
