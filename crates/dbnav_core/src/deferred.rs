use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(1);

struct DeferredState<T> {
    id: u64,
    value: Mutex<Option<T>>,
    resolved: Notify,
}

/// A result that will be produced later by someone else.
///
/// Clones share the same slot: resolving through any clone wakes every task
/// waiting on any other clone, and they all observe the same value. Only the
/// first `resolve` takes effect.
pub struct Deferred<T> {
    state: Arc<DeferredState<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(DeferredState {
                id: NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed),
                value: Mutex::new(None),
                resolved: Notify::new(),
            }),
        }
    }

    /// Creates a handle that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Process-unique identifier shared by all clones of this handle.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Returns `true` if both handles refer to the same pending result.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Stores `value` and wakes all waiters.
    ///
    /// Returns `false` (and drops `value`) if the handle was already resolved.
    pub fn resolve(&self, value: T) -> bool {
        {
            let mut slot = lock(&self.state.value);
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }

        self.state.resolved.notify_waiters();
        true
    }

    pub fn is_resolved(&self) -> bool {
        lock(&self.state.value).is_some()
    }

    pub fn peek(&self) -> Option<T> {
        lock(&self.state.value).clone()
    }

    /// Suspends until the handle is resolved.
    pub async fn wait(&self) -> T {
        loop {
            // Registered before the check so a resolve in between still wakes us.
            let notified = self.state.resolved.notified();

            if let Some(value) = self.peek() {
                return value;
            }

            notified.await;
        }
    }

    /// Like [`Deferred::wait`], giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = lock(&self.state.value).is_some();
        f.debug_struct("Deferred")
            .field("id", &self.state.id)
            .field("resolved", &resolved)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
