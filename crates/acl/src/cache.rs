//! Per-login permission cache with bounded time-to-live
//!
//! Expiry is a passive time check on read; there is no timer thread.
//! Safe for concurrent readers and invalidating writers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::grant::{EffectivePermissions, GroupId};

#[derive(Debug)]
struct CacheEntry {
    permissions: Arc<EffectivePermissions>,
    cached_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Bumped by every invalidation
    generation: u64,
}

/// Injectable cache of resolved permission sets keyed by login
///
/// A lookup that started before an invalidation must not repopulate the
/// cache: callers capture [`generation`](Self::generation) before reading
/// the store and hand it back to [`insert_if_current`](Self::insert_if_current).
#[derive(Debug)]
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

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for a login, if any
    pub fn get(&self, login: &str) -> Option<Arc<EffectivePermissions>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .get(login)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.permissions))
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Store a freshly resolved permission set unconditionally
    pub fn insert(&self, permissions: Arc<EffectivePermissions>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Self::put(&mut state, permissions);
    }

    /// Store a permission set resolved at `generation`
    ///
    /// Returns false (and stores nothing) when an invalidation happened
    /// since that generation was read.
    pub fn insert_if_current(&self, permissions: Arc<EffectivePermissions>, generation: u64) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.generation != generation {
            return false;
        }
        Self::put(&mut state, permissions);
        true
    }

    fn put(state: &mut CacheState, permissions: Arc<EffectivePermissions>) {
        state.entries.insert(
            permissions.login.clone(),
            CacheEntry {
                permissions,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop the entry of one login
    pub fn invalidate(&self, login: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.generation += 1;
        state.entries.remove(login);
    }

    /// Drop every entry resolved through a group
    pub fn invalidate_group(&self, group: &GroupId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.generation += 1;
        state
            .entries
            .retain(|_, entry| entry.permissions.group.as_ref() != Some(group));
    }

    pub fn invalidate_all(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.generation += 1;
        state.entries.clear();
    }

    /// Number of entries held (fresh or expired)
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
