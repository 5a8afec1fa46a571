use crate::{
    Deferred, ExpandComplete, ExpandRequest, MetadataService, NavError, NodeFilter, NodeInfo,
    SessionId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Correlation key of an expansion: at most one request per key is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandKey {
    pub session_id: SessionId,
    pub node_path: String,
}

impl ExpandKey {
    pub fn new(session_id: impl Into<SessionId>, node_path: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            node_path: node_path.into(),
        }
    }
}

impl fmt::Display for ExpandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session_id, self.node_path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    Expanded(Vec<NodeInfo>),
    Failed(String),
    Cancelled,
}

struct PendingExpansion {
    deferred: Deferred<ExpandOutcome>,
    filters: Vec<NodeFilter>,
}

/// Outstanding expansions, keyed by `(session, node path)`.
#[derive(Default)]
pub struct ExpansionCorrelator {
    pending: Mutex<HashMap<ExpandKey, PendingExpansion>>,
}

impl ExpansionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ExpandKey, PendingExpansion>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Requests the children of `node_path`, or joins the request already in
    /// flight for the same key and filters, in which case the very same handle
    /// is returned and nothing is sent.
    ///
    /// Notifications carry no filters, so a request with other filters cannot
    /// share the key: it waits for the one in flight to settle, then is sent.
    ///
    /// Without a session this fails with `NoActiveSession` and the service is
    /// not contacted.
    pub async fn expand(
        &self,
        service: &dyn MetadataService,
        session_id: Option<SessionId>,
        node_path: &str,
        filters: Vec<NodeFilter>,
    ) -> Result<Deferred<ExpandOutcome>, NavError> {
        let session_id = session_id.ok_or(NavError::NoActiveSession)?;

        if node_path.is_empty() {
            return Err(NavError::invalid_node("cannot expand an empty node path"));
        }

        let key = ExpandKey::new(session_id, node_path);

        let deferred = loop {
            let in_flight = {
                let mut pending = self.lock();

                match pending.get(&key) {
                    Some(existing) if existing.filters == filters => {
                        log::debug!("Joining in-flight expansion {}", key);
                        return Ok(existing.deferred.clone());
                    }
                    Some(existing) => existing.deferred.clone(),
                    None => {
                        let deferred = Deferred::new();
                        pending.insert(
                            key.clone(),
                            PendingExpansion {
                                deferred: deferred.clone(),
                                filters: filters.clone(),
                            },
                        );
                        break deferred;
                    }
                }
            };

            log::debug!("Expansion {} in flight with other filters, waiting", key);
            in_flight.wait().await;
        };

        let request = ExpandRequest {
            session_id: key.session_id.clone(),
            node_path: key.node_path.clone(),
            filters,
        };

        if let Err(e) = service.expand(request).await {
            log::warn!("Failed to request expansion {}: {}", key, e);
            self.forget(&key, &deferred);
            deferred.resolve(ExpandOutcome::Failed(e.to_string()));
        }

        Ok(deferred)
    }

    /// Matches an `ExpandComplete` notification to its request.
    ///
    /// Returns `false` for notifications nobody is waiting for; those are
    /// logged and dropped.
    pub fn on_expand_complete(&self, notification: ExpandComplete) -> bool {
        let key = ExpandKey::new(notification.session_id, notification.node_path);

        let Some(PendingExpansion { deferred, .. }) = self.lock().remove(&key) else {
            log::warn!("Ignoring expand notification with no pending request: {}", key);
            return false;
        };

        let outcome = if notification.success {
            ExpandOutcome::Expanded(notification.nodes.unwrap_or_default())
        } else {
            let message = notification
                .error_message
                .unwrap_or_else(|| "Expansion failed".to_string());
            log::warn!("Expansion {} failed: {}", key, message);
            ExpandOutcome::Failed(message)
        };

        deferred.resolve(outcome);
        true
    }

    /// Resolves every pending expansion of `session_id` as `Cancelled`.
    /// Other sessions are untouched.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let cancelled: Vec<(ExpandKey, Deferred<ExpandOutcome>)> = {
            let mut pending = self.lock();
            let keys: Vec<ExpandKey> = pending
                .keys()
                .filter(|k| k.session_id == session_id)
                .cloned()
                .collect();

            keys.into_iter()
                .filter_map(|k| pending.remove(&k).map(|p| (k, p.deferred)))
                .collect()
        };

        for (key, deferred) in &cancelled {
            log::debug!("Cancelled pending expansion {}", key);
            deferred.resolve(ExpandOutcome::Cancelled);
        }

        cancelled.len()
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self
            .lock()
            .drain()
            .map(|(key, pending)| (key, pending.deferred))
            .collect();

        for (key, deferred) in &drained {
            log::debug!("Cancelled pending expansion {}", key);
            deferred.resolve(ExpandOutcome::Cancelled);
        }

        drained.len()
    }

    /// Gives up on `deferred` after a local timeout. The entry is only removed
    /// if it still belongs to this handle, so a newer request with the same key
    /// keeps its slot.
    pub fn expire(&self, key: &ExpandKey, deferred: &Deferred<ExpandOutcome>) {
        if self.forget(key, deferred) {
            log::debug!("Expansion {} timed out", key);
        }
        deferred.resolve(ExpandOutcome::Cancelled);
    }

    pub fn is_pending(&self, key: &ExpandKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    pub fn pending_for_session(&self, session_id: &str) -> usize {
        self.lock()
            .keys()
            .filter(|k| k.session_id == session_id)
            .count()
    }

    fn forget(&self, key: &ExpandKey, deferred: &Deferred<ExpandOutcome>) -> bool {
        let mut pending = self.lock();
        if pending
            .get(key)
            .is_some_and(|p| p.deferred.ptr_eq(deferred))
        {
            pending.remove(key);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_service::RecordingService;

    fn session(id: &str) -> Option<SessionId> {
        Some(id.to_string())
    }

    #[tokio::test]
    async fn concurrent_expansions_share_one_request() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();

        let first = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();
        let second = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(service.expand_count(), 1);

        let users = NodeInfo::new("db1/Tables/users", "Table", "users");
        correlator.on_expand_complete(ExpandComplete::succeeded(
            "s1",
            "db1/Tables",
            vec![users.clone()],
        ));

        assert_eq!(first.wait().await, ExpandOutcome::Expanded(vec![users.clone()]));
        assert_eq!(second.wait().await, ExpandOutcome::Expanded(vec![users]));
    }

    #[tokio::test]
    async fn missing_session_fails_without_contacting_service() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();

        let result = correlator.expand(&service, None, "db1", Vec::new()).await;

        assert!(matches!(result, Err(NavError::NoActiveSession)));
        assert_eq!(service.expand_count(), 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn filters_are_forwarded() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let filter = NodeFilter::new("name", crate::FilterOperator::StartsWith, "dim_");

        correlator
            .expand(&service, session("s1"), "db1/Tables", vec![filter.clone()])
            .await
            .unwrap();

        let sent = service.expands.lock().unwrap();
        assert_eq!(sent[0].filters, vec![filter]);
    }

    #[tokio::test]
    async fn other_filters_wait_for_the_request_in_flight() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let filter = NodeFilter::new("name", crate::FilterOperator::StartsWith, "al");

        let plain = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();

        let filtered = correlator.expand(&service, session("s1"), "db1/Tables", vec![filter.clone()]);
        let answer = async {
            tokio::task::yield_now().await;
            assert_eq!(service.expand_count(), 1);
            correlator.on_expand_complete(ExpandComplete::succeeded("s1", "db1/Tables", Vec::new()));
        };
        let (filtered, ()) = tokio::join!(filtered, answer);
        let filtered = filtered.unwrap();

        assert!(!filtered.ptr_eq(&plain));
        assert_eq!(plain.peek(), Some(ExpandOutcome::Expanded(Vec::new())));
        assert!(!filtered.is_resolved());

        let sent = service.expands.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].filters, vec![filter]);
    }

    #[tokio::test]
    async fn out_of_order_completion_resolves_each_key() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let tables = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();
        let views = correlator
            .expand(&service, session("s1"), "db1/Views", Vec::new())
            .await
            .unwrap();

        correlator.on_expand_complete(ExpandComplete::failed("s1", "db1/Views", "denied"));
        assert!(!tables.is_resolved());

        correlator.on_expand_complete(ExpandComplete::succeeded("s1", "db1/Tables", Vec::new()));

        assert_eq!(views.wait().await, ExpandOutcome::Failed("denied".to_string()));
        assert_eq!(tables.wait().await, ExpandOutcome::Expanded(Vec::new()));
    }

    #[tokio::test]
    async fn orphan_notification_does_not_disturb_pending() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let pending = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();

        assert!(!correlator.on_expand_complete(ExpandComplete::succeeded("s1", "db1/Views", Vec::new())));
        assert!(!pending.is_resolved());

        assert!(correlator.on_expand_complete(ExpandComplete::succeeded("s1", "db1/Tables", Vec::new())));
        assert!(pending.is_resolved());
    }

    #[tokio::test]
    async fn cancel_session_is_scoped() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let a = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();
        let b = correlator
            .expand(&service, session("s1"), "db1/Views", Vec::new())
            .await
            .unwrap();
        let other = correlator
            .expand(&service, session("s2"), "db1/Tables", Vec::new())
            .await
            .unwrap();

        assert_eq!(correlator.cancel_session("s1"), 2);

        assert_eq!(a.peek(), Some(ExpandOutcome::Cancelled));
        assert_eq!(b.peek(), Some(ExpandOutcome::Cancelled));
        assert!(!other.is_resolved());
        assert_eq!(correlator.pending_for_session("s2"), 1);
    }

    #[tokio::test]
    async fn expire_keeps_newer_request() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();
        let key = ExpandKey::new("s1", "db1/Tables");

        let stale = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();
        correlator.expire(&key, &stale);
        assert_eq!(stale.peek(), Some(ExpandOutcome::Cancelled));

        let fresh = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();
        correlator.expire(&key, &stale);

        assert!(correlator.is_pending(&key));
        assert!(!fresh.is_resolved());
        assert_eq!(service.expand_count(), 2);
    }

    #[tokio::test]
    async fn send_failure_frees_the_key() {
        let service = RecordingService::failing();
        let correlator = ExpansionCorrelator::new();

        let deferred = correlator
            .expand(&service, session("s1"), "db1/Tables", Vec::new())
            .await
            .unwrap();

        assert!(matches!(deferred.peek(), Some(ExpandOutcome::Failed(_))));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let service = RecordingService::default();
        let correlator = ExpansionCorrelator::new();

        let result = correlator.expand(&service, session("s1"), "", Vec::new()).await;

        assert!(matches!(result, Err(NavError::InvalidNode(_))));
    }
}
