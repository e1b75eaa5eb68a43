//! Tri-state caches for branch and worktree state
//!
//! Each cache is an explicit `Unloaded | Loading | Loaded` cell guarded
//! by a mutex. `Unloaded` is the "not yet loaded" sentinel; caches are
//! populated on first access and invalidated wholesale on refresh.

use std::sync::Mutex;

/// Cache states. `Loading` marks an in-flight population so concurrent
/// readers can tell "empty" from "being fetched".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cache<T> {
    #[default]
    Unloaded,
    Loading,
    Loaded(T),
}

/// A mutex-guarded tri-state cache cell.
#[derive(Debug, Default)]
pub struct CacheCell<T> {
    state: Mutex<Cache<T>>,
}

impl<T: Clone> CacheCell<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Cache::Unloaded),
        }
    }

    /// Current value if loaded, without triggering a load.
    pub fn peek(&self) -> Option<T> {
        match &*self.state.lock().expect("cache mutex poisoned") {
            Cache::Loaded(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Mark a population as in flight. Loaders call this before running
    /// the subprocess so the lock is not held across the await.
    pub fn begin_load(&self) {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        if matches!(*state, Cache::Unloaded) {
            *state = Cache::Loading;
        }
    }

    /// Atomically replace the cached value.
    pub fn store(&self, value: T) {
        *self.state.lock().expect("cache mutex poisoned") = Cache::Loaded(value);
    }

    /// Drop back to the unloaded sentinel; the next access reloads.
    pub fn invalidate(&self) {
        *self.state.lock().expect("cache mutex poisoned") = Cache::Unloaded;
    }

    /// Mutate the cached value in place. Returns false (and does
    /// nothing) when the cache is not loaded; the next access reloads
    /// the full truth instead.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        match &mut *state {
            Cache::Loaded(value) => {
                f(value);
                true
            }
            _ => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock().expect("cache mutex poisoned"), Cache::Loaded(_))
    }
}
