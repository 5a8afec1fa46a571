use crate::{
    ConnectionProfile, CreateSessionRequest, Deferred, MetadataService, NodeInfo, SessionCreated,
    SessionId,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Result of a session creation as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The service opened the session. Carries the server root, if reported.
    Created(Option<NodeInfo>),
    Failed(String),
    /// Given up locally (disconnect, timeout, service gone) before an answer.
    Cancelled,
}

impl SessionOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outstanding session creations, keyed by the session id the caller chose.
#[derive(Default)]
pub struct SessionRegistry {
    pending: Mutex<HashMap<SessionId, Deferred<SessionOutcome>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Deferred<SessionOutcome>>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Asks the service for a new session and returns without waiting for it.
    ///
    /// The entry is registered before the request goes out, so a notification
    /// that overtakes the acknowledgement still finds it. If the request cannot
    /// be sent the handle is already resolved as `Failed`.
    pub async fn create_session(
        &self,
        service: &dyn MetadataService,
        profile: ConnectionProfile,
    ) -> (SessionId, Deferred<SessionOutcome>) {
        let session_id = Uuid::new_v4().to_string();
        let deferred = Deferred::new();

        self.lock().insert(session_id.clone(), deferred.clone());

        log::debug!("Requesting session {} for {}", session_id, profile.key());

        let request = CreateSessionRequest {
            session_id: session_id.clone(),
            connection: profile,
        };

        if let Err(e) = service.create_session(request).await {
            log::warn!("Failed to request session {}: {}", session_id, e);
            self.lock().remove(&session_id);
            deferred.resolve(SessionOutcome::Failed(e.to_string()));
        }

        (session_id, deferred)
    }

    /// Matches a `SessionCreated` notification to its request.
    ///
    /// Returns `false` for notifications nobody is waiting for; those are
    /// logged and dropped.
    pub fn on_session_created(&self, notification: SessionCreated) -> bool {
        let Some(deferred) = self.lock().remove(&notification.session_id) else {
            log::warn!(
                "Ignoring session notification for unknown session {}",
                notification.session_id
            );
            return false;
        };

        let outcome = if notification.success {
            log::info!("Session {} created", notification.session_id);
            SessionOutcome::Created(notification.root_node)
        } else {
            let message = notification
                .error_message
                .unwrap_or_else(|| "Session creation failed".to_string());
            log::warn!(
                "Session {} failed: {}",
                notification.session_id,
                message
            );
            SessionOutcome::Failed(message)
        };

        deferred.resolve(outcome);
        true
    }

    /// Stops waiting for `session_id`. A later notification becomes an orphan.
    pub fn cancel(&self, session_id: &str) -> bool {
        let Some(deferred) = self.lock().remove(session_id) else {
            return false;
        };

        log::debug!("Cancelled pending session {}", session_id);
        deferred.resolve(SessionOutcome::Cancelled);
        true
    }

    /// Cancels every pending session creation.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();

        for (session_id, deferred) in &drained {
            log::debug!("Cancelled pending session {}", session_id);
            deferred.resolve(SessionOutcome::Cancelled);
        }

        drained.len()
    }

    pub fn is_pending(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_service::RecordingService;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("db1", "sales", "sa")
    }

    #[tokio::test]
    async fn registers_before_sending() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();

        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        assert!(registry.is_pending(&session_id));
        assert!(!deferred.is_resolved());
        assert_eq!(service.session_ids(), vec![session_id]);
    }

    #[tokio::test]
    async fn session_ids_are_fresh() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();

        let (a, _) = registry.create_session(&service, profile()).await;
        let (b, _) = registry.create_session(&service, profile()).await;

        assert_ne!(a, b);
        assert_eq!(registry.pending_count(), 2);
    }

    #[tokio::test]
    async fn notification_resolves_and_removes_entry() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();
        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        let root = NodeInfo::new("db1", "Server", "db1");
        assert!(registry.on_session_created(SessionCreated::succeeded(&session_id, Some(root.clone()))));

        assert_eq!(deferred.wait().await, SessionOutcome::Created(Some(root)));
        assert!(!registry.is_pending(&session_id));
    }

    #[tokio::test]
    async fn remote_failure_is_a_value() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();
        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        registry.on_session_created(SessionCreated::failed(&session_id, "Login failed"));

        assert_eq!(
            deferred.wait().await,
            SessionOutcome::Failed("Login failed".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_session_is_ignored() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();
        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        assert!(!registry.on_session_created(SessionCreated::succeeded("restarted", None)));

        assert!(registry.is_pending(&session_id));
        assert!(!deferred.is_resolved());
    }

    #[tokio::test]
    async fn late_notification_after_cancel_is_orphaned() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();
        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        assert!(registry.cancel(&session_id));
        assert!(!registry.on_session_created(SessionCreated::succeeded(&session_id, None)));

        assert_eq!(deferred.peek(), Some(SessionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn send_failure_resolves_immediately() {
        let service = RecordingService::failing();
        let registry = SessionRegistry::new();

        let (session_id, deferred) = registry.create_session(&service, profile()).await;

        assert!(matches!(deferred.peek(), Some(SessionOutcome::Failed(_))));
        assert!(!registry.is_pending(&session_id));
    }

    #[tokio::test]
    async fn cancel_all_releases_every_waiter() {
        let service = RecordingService::default();
        let registry = SessionRegistry::new();
        let (_, first) = registry.create_session(&service, profile()).await;
        let (_, second) = registry.create_session(&service, profile()).await;

        assert_eq!(registry.cancel_all(), 2);

        assert_eq!(first.wait().await, SessionOutcome::Cancelled);
        assert_eq!(second.wait().await, SessionOutcome::Cancelled);
        assert_eq!(registry.pending_count(), 0);
    }
}
