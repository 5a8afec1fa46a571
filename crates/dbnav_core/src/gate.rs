use crate::NavError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Binary gate used to serialize conflicting operations on shared state.
///
/// Waiters are admitted strictly in the order they called [`Gate::acquire`].
/// The gate is held for as long as the returned [`GateGuard`] lives, so an
/// early return through `?` releases it just like the happy path does.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

/// Proof of holding a [`Gate`]. Dropping it admits the next waiter.
pub struct GateGuard {
    _permit: OwnedSemaphorePermit,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Suspends until the gate is free, then holds it.
    ///
    /// Fails only after [`Gate::close`].
    pub async fn acquire(&self) -> Result<GateGuard, NavError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NavError::GateClosed)?;

        Ok(GateGuard { _permit: permit })
    }

    /// Holds the gate if nobody else does. Never jumps the waiter queue.
    pub fn try_acquire(&self) -> Option<GateGuard> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GateGuard { _permit: permit })
    }

    pub fn is_held(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Rejects every current and future waiter with [`NavError::GateClosed`].
    pub fn close(&self) {
        self.permits.close();
    }

    /// Runs `operation` while holding the gate.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, NavError>
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire().await?;
        Ok(operation.await)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
