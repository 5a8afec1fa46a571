use async_trait::async_trait;
use dbnav_core::{
    CreateSessionRequest, ExpandRequest, MetadataService, NavError, SessionId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct FakeServiceStats {
    pub session_requests: Vec<CreateSessionRequest>,
    pub expand_requests: Vec<ExpandRequest>,
    pub disconnects: Vec<SessionId>,
    pub rejected_sends: usize,
}

#[derive(Default)]
struct FakeServiceState {
    session_requests: Mutex<Vec<CreateSessionRequest>>,
    expand_requests: Mutex<Vec<ExpandRequest>>,
    disconnects: Mutex<Vec<SessionId>>,
    create_error: RwLock<Option<String>>,
    expand_error: RwLock<Option<String>>,
    rejected_sends: AtomicUsize,
    received: Notify,
}

/// In-memory metadata service.
///
/// Records every request and never answers on its own: tests deliver the
/// notifications they want, in the order they want, through the coordinator.
#[derive(Clone, Default)]
pub struct FakeMetadataService {
    state: Arc<FakeServiceState>,
}

impl FakeMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_session` fail to send, as if the service were gone.
    pub fn with_create_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.create_error) = Some(message.into());
        self
    }

    /// Makes `expand` fail to send.
    pub fn with_expand_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.expand_error) = Some(message.into());
        self
    }

    pub fn clear_errors(&self) {
        *rwlock_write(&self.state.create_error) = None;
        *rwlock_write(&self.state.expand_error) = None;
    }

    pub fn stats(&self) -> FakeServiceStats {
        FakeServiceStats {
            session_requests: mutex_lock(&self.state.session_requests).clone(),
            expand_requests: mutex_lock(&self.state.expand_requests).clone(),
            disconnects: mutex_lock(&self.state.disconnects).clone(),
            rejected_sends: self.state.rejected_sends.load(Ordering::Relaxed),
        }
    }

    pub fn session_requests(&self) -> Vec<CreateSessionRequest> {
        mutex_lock(&self.state.session_requests).clone()
    }

    pub fn expand_requests(&self) -> Vec<ExpandRequest> {
        mutex_lock(&self.state.expand_requests).clone()
    }

    pub fn disconnects(&self) -> Vec<SessionId> {
        mutex_lock(&self.state.disconnects).clone()
    }

    /// Waits until at least `count` session requests have been received.
    pub async fn wait_for_session_requests(&self, count: usize) -> Vec<CreateSessionRequest> {
        loop {
            let received = self.state.received.notified();
            let requests = self.session_requests();
            if requests.len() >= count {
                return requests;
            }
            received.await;
        }
    }

    /// Waits until at least `count` expand requests have been received.
    pub async fn wait_for_expand_requests(&self, count: usize) -> Vec<ExpandRequest> {
        loop {
            let received = self.state.received.notified();
            let requests = self.expand_requests();
            if requests.len() >= count {
                return requests;
            }
            received.await;
        }
    }

    pub fn as_service_arc(self) -> Arc<dyn MetadataService> {
        Arc::new(self)
    }

    fn reject(&self, error: &RwLock<Option<String>>) -> Result<(), NavError> {
        if let Some(message) = rwlock_read(error).clone() {
            self.state.rejected_sends.fetch_add(1, Ordering::Relaxed);
            return Err(NavError::Transport(message));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataService for FakeMetadataService {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<(), NavError> {
        self.reject(&self.state.create_error)?;
        mutex_lock(&self.state.session_requests).push(request);
        self.state.received.notify_waiters();
        Ok(())
    }

    async fn expand(&self, request: ExpandRequest) -> Result<(), NavError> {
        self.reject(&self.state.expand_error)?;
        mutex_lock(&self.state.expand_requests).push(request);
        self.state.received.notify_waiters();
        Ok(())
    }

    async fn disconnect(&self, session_id: &str) -> Result<(), NavError> {
        mutex_lock(&self.state.disconnects).push(session_id.to_string());
        self.state.received.notify_waiters();
        Ok(())
    }
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
