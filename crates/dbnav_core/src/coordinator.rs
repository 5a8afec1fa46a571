//! Orchestrates sessions, expansions and the connection groups into one tree.
//!
//! The coordinator is the only writer of the [`ObjectTree`]. Remote work is
//! issued through the [`SessionRegistry`] and [`ExpansionCorrelator`]; their
//! results come back through [`TreeSessionCoordinator::on_session_created`] and
//! [`TreeSessionCoordinator::on_expand_complete`], which any transport may call.
//!
//! The tree lock is a plain mutex that is never held across an await point.
//! Group mutations and root rebuilds are serialized by a [`Gate`] instead,
//! since they await the settings store.

use crate::{
    ConnectionGroup, ConnectionGroupStore, ConnectionProfile, ConnectionState, Deferred,
    ExpandComplete, ExpandKey, ExpandOutcome, ExpansionCorrelator, ExpansionState, Gate,
    MetadataService, NavConfig, NavError, NodeFilter, NodeId, ObjectTree, SessionCreated,
    SessionId, SessionOutcome, SessionRegistry, TreeChanged, TreeEvents, TreeNode, TreeNodeKind,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of [`TreeSessionCoordinator::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResult {
    pub node: NodeId,
    pub session_id: SessionId,
    pub outcome: SessionOutcome,
}

enum ExpandPlan {
    Cached(Vec<TreeNode>),
    Group,
    Remote {
        session_id: Option<SessionId>,
        node_path: String,
    },
}

pub struct TreeSessionCoordinator {
    tree: Mutex<ObjectTree>,
    groups: ConnectionGroupStore,
    group_gate: Gate,
    sessions: SessionRegistry,
    expansions: ExpansionCorrelator,
    service: Arc<dyn MetadataService>,
    events: TreeEvents,
    session_timeout: Option<Duration>,
    expand_timeout: Option<Duration>,
}

impl TreeSessionCoordinator {
    pub fn new(service: Arc<dyn MetadataService>, groups: ConnectionGroupStore) -> Self {
        Self::with_config(service, groups, &NavConfig::default())
    }

    pub fn with_config(
        service: Arc<dyn MetadataService>,
        groups: ConnectionGroupStore,
        config: &NavConfig,
    ) -> Self {
        Self {
            tree: Mutex::new(ObjectTree::new()),
            groups,
            group_gate: Gate::new(),
            sessions: SessionRegistry::new(),
            expansions: ExpansionCorrelator::new(),
            service,
            events: TreeEvents::new(config.event_capacity),
            session_timeout: config.session_timeout(),
            expand_timeout: config.expand_timeout(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.events.subscribe()
    }

    pub fn groups(&self) -> &ConnectionGroupStore {
        &self.groups
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn expansions(&self) -> &ExpansionCorrelator {
        &self.expansions
    }

    fn lock_tree(&self) -> MutexGuard<'_, ObjectTree> {
        self.tree.lock().unwrap_or_else(|p| p.into_inner())
    }

    // --- Queries ---

    pub fn node(&self, id: NodeId) -> Option<TreeNode> {
        self.lock_tree().get(id).cloned()
    }

    pub fn parent(&self, id: NodeId) -> Option<TreeNode> {
        let tree = self.lock_tree();
        tree.parent_of(id).and_then(|p| tree.get(p)).cloned()
    }

    pub fn expansion_state(&self, id: NodeId) -> Option<ExpansionState> {
        self.lock_tree().expansion_state(id)
    }

    pub fn find_connection_node(&self, profile: &ConnectionProfile) -> Option<NodeId> {
        self.lock_tree().find_connection(profile)
    }

    /// Root level as last built, without consulting the group store.
    pub fn roots(&self) -> Vec<TreeNode> {
        let tree = self.lock_tree();
        snapshot(&tree, tree.roots())
    }

    /// Profiles of every connection node, grouped or not.
    pub fn root_node_connections(&self) -> Vec<ConnectionProfile> {
        let tree = self.lock_tree();
        tree.connection_nodes()
            .into_iter()
            .filter_map(|id| tree.get(id).and_then(TreeNode::profile).cloned())
            .collect()
    }

    // --- Traversal ---

    /// Pull entry point of the rendering host; `None` asks for the roots.
    ///
    /// The root level and group nodes are rebuilt from the group store on
    /// every call. Other nodes are expanded, from cache when possible.
    pub async fn get_children(&self, node: Option<NodeId>) -> Result<Vec<TreeNode>, NavError> {
        match node {
            None => {
                self.refresh_roots().await?;
                Ok(self.roots())
            }
            Some(id) => self.expand(id).await,
        }
    }

    pub async fn expand(&self, id: NodeId) -> Result<Vec<TreeNode>, NavError> {
        self.expand_with_filters(id, Vec::new()).await
    }

    /// Returns the children of `id`, asking the service only when the node has
    /// no cached children or was marked for refresh.
    ///
    /// A filtered expansion always goes to the service. Its result replaces the
    /// cached children but leaves the node marked for refresh, so the next
    /// unfiltered expansion fetches the full set again.
    ///
    /// A remote failure is not an error: the node gets a single error child and
    /// that child is returned.
    pub async fn expand_with_filters(
        &self,
        id: NodeId,
        filters: Vec<NodeFilter>,
    ) -> Result<Vec<TreeNode>, NavError> {
        let plan = {
            let tree = self.lock_tree();
            let node = tree
                .get(id)
                .ok_or_else(|| NavError::not_found(id.to_string()))?;

            if node.is_group() {
                ExpandPlan::Group
            } else if let Some(children) = node.children.as_deref()
                && !node.needs_refresh
                && filters.is_empty()
            {
                ExpandPlan::Cached(snapshot(&tree, children))
            } else if node.is_leaf() {
                ExpandPlan::Cached(Vec::new())
            } else {
                ExpandPlan::Remote {
                    session_id: tree.find_ancestor_session(id),
                    node_path: node.node_path().unwrap_or_default().to_string(),
                }
            }
        };

        let (session_id, node_path) = match plan {
            ExpandPlan::Cached(children) => return Ok(children),
            ExpandPlan::Group => {
                self.refresh_roots().await?;
                return self.children_snapshot(id);
            }
            ExpandPlan::Remote {
                session_id,
                node_path,
            } => (session_id.ok_or(NavError::NoActiveSession)?, node_path),
        };

        let filtered = !filters.is_empty();
        let deferred = self
            .expansions
            .expand(
                self.service.as_ref(),
                Some(session_id.clone()),
                &node_path,
                filters,
            )
            .await?;

        let key = ExpandKey::new(session_id, node_path);
        let outcome = self.await_expansion(&key, &deferred).await;

        let children = self.apply_expansion(id, &key, &deferred, outcome, filtered)?;
        self.events.emit(Some(id));
        Ok(children)
    }

    /// Drops the cached children of `id` and expands it again.
    pub async fn refresh(&self, id: NodeId) -> Result<Vec<TreeNode>, NavError> {
        let is_group = {
            let mut tree = self.lock_tree();
            let is_group = tree
                .get(id)
                .ok_or_else(|| NavError::not_found(id.to_string()))?
                .is_group();
            tree.invalidate(id)?;
            is_group
        };

        if is_group {
            self.refresh_roots().await?;
            self.events.emit(Some(id));
            return self.children_snapshot(id);
        }

        self.expand(id).await
    }

    /// Retries the expansion that produced an error leaf.
    ///
    /// Accepts either the error leaf or the failed node itself. A connection
    /// without a session is connected again before it is expanded.
    pub async fn retry(&self, id: NodeId) -> Result<Vec<TreeNode>, NavError> {
        let (target, reconnect) = {
            let tree = self.lock_tree();
            let node = tree
                .get(id)
                .ok_or_else(|| NavError::not_found(id.to_string()))?;

            let target = match &node.kind {
                TreeNodeKind::Error { failed_node, .. } => *failed_node,
                _ => id,
            };

            let target_node = tree
                .get(target)
                .ok_or_else(|| NavError::not_found(target.to_string()))?;

            let reconnect = match target_node.profile() {
                Some(profile) if target_node.session_id.is_none() => Some(profile.clone()),
                _ => None,
            };

            (target, reconnect)
        };

        if let Some(profile) = reconnect {
            let result = self.connect(profile).await?;
            if !result.outcome.is_created() {
                return self.children_snapshot(result.node);
            }
            return self.expand(result.node).await;
        }

        self.refresh(target).await
    }

    /// Forgets the cached children of `id` without fetching them again.
    pub fn delete_children_cache(&self, id: NodeId) -> Result<(), NavError> {
        self.lock_tree().invalidate(id)
    }

    // --- Connections ---

    /// Adds a connection node for `profile` without opening a session.
    ///
    /// Returns the existing node if the profile already has one.
    pub async fn add_disconnected_node(&self, profile: ConnectionProfile) -> Result<NodeId, NavError> {
        let id = self.ensure_connection_node(profile).await?;
        self.events.emit(None);
        Ok(id)
    }

    /// Opens a session for `profile` and waits for the service to answer.
    ///
    /// The connection node is created if needed and any session it already had
    /// is released first. On success the node is connected and unexpanded; on
    /// remote failure it stays in the tree, marked failed, with one error child.
    pub async fn connect(&self, profile: ConnectionProfile) -> Result<ConnectResult, NavError> {
        let id = self.ensure_connection_node(profile.clone()).await?;

        if let Some(previous) = self.detach_session(id)? {
            self.release_session(&previous).await;
        }

        let (session_id, deferred) = self
            .sessions
            .create_session(self.service.as_ref(), profile)
            .await;

        let parent = {
            let mut tree = self.lock_tree();
            let node = tree.get_mut(id).ok_or(NavError::Cancelled)?;
            if let TreeNodeKind::Connection { state, .. } = &mut node.kind {
                *state = ConnectionState::Connecting(session_id.clone());
            }
            tree.parent_of(id)
        };
        self.events.emit(parent);

        let outcome = self.await_session(&session_id, &deferred).await;

        match self.apply_session(id, &session_id, &outcome)? {
            Some(parent) => {
                self.events.emit(parent);
                Ok(ConnectResult {
                    node: id,
                    session_id,
                    outcome,
                })
            }
            None => {
                log::debug!("Session {} outcome arrived for a stale node", session_id);
                if outcome.is_created() {
                    self.release_session(&session_id).await;
                }
                Ok(ConnectResult {
                    node: id,
                    session_id,
                    outcome: SessionOutcome::Cancelled,
                })
            }
        }
    }

    /// Releases the session of a connection node and collapses it.
    ///
    /// Pending expansions of that session resolve as cancelled; other sessions
    /// are untouched. A connection that is still connecting stops waiting.
    pub async fn disconnect(&self, id: NodeId) -> Result<(), NavError> {
        if let Some(session_id) = self.detach_session(id)? {
            self.release_session(&session_id).await;
        }

        self.events.emit(Some(id));
        Ok(())
    }

    /// Disconnects the node and removes it from the tree and from every group.
    ///
    /// A profile filed under several groups has one node per group; all of
    /// them go, so the profile does not come back at the root level.
    pub async fn remove(&self, id: NodeId) -> Result<(), NavError> {
        let (profile, targets) = {
            let tree = self.lock_tree();
            let node = tree
                .get(id)
                .ok_or_else(|| NavError::not_found(id.to_string()))?;
            let profile = node
                .profile()
                .cloned()
                .ok_or_else(|| NavError::invalid_node(format!("{id} is not a connection")))?;
            let targets = connection_nodes_for(&tree, std::slice::from_ref(&profile));
            (profile, targets)
        };

        let mut sessions = Vec::new();
        for target in &targets {
            if let Some(session_id) = self.detach_session(*target)? {
                sessions.push(session_id);
            }
        }
        join_all(sessions.iter().map(|s| self.release_session(s))).await;

        let parent = {
            let _guard = self.group_gate.acquire().await?;
            self.groups.ungroup_profile(&profile).await?;

            let mut tree = self.lock_tree();
            let parent = tree.parent_of(id);
            for target in &targets {
                if tree.contains(*target) {
                    tree.remove(*target)?;
                }
            }
            parent
        };

        log::info!("Removed connection {}", profile.key());
        self.events.emit(if targets.len() > 1 { None } else { parent });
        Ok(())
    }

    /// Removes every connection node matching one of `profiles`.
    ///
    /// Their sessions are released concurrently and one whole-tree change is
    /// emitted. Returns the number of nodes removed.
    pub async fn remove_connection_nodes(
        &self,
        profiles: &[ConnectionProfile],
    ) -> Result<usize, NavError> {
        let targets = connection_nodes_for(&self.lock_tree(), profiles);

        let mut sessions = Vec::new();
        for id in &targets {
            if let Some(session_id) = self.detach_session(*id)? {
                sessions.push(session_id);
            }
        }

        join_all(sessions.iter().map(|s| self.release_session(s))).await;

        {
            let _guard = self.group_gate.acquire().await?;
            for profile in profiles {
                self.groups.ungroup_profile(profile).await?;
            }

            let mut tree = self.lock_tree();
            for id in &targets {
                if tree.contains(*id) {
                    tree.remove(*id)?;
                }
            }
        }

        log::info!("Removed {} connection nodes", targets.len());
        self.events.emit(None);
        Ok(targets.len())
    }

    // --- Groups ---

    pub async fn save_group(&self, group: ConnectionGroup) -> Result<(), NavError> {
        {
            let _guard = self.group_gate.acquire().await?;
            self.groups.save_group(group).await?;
            self.rebuild_roots().await?;
        }

        self.events.emit(None);
        Ok(())
    }

    /// Deletes the group; its connections move to the root level.
    pub async fn delete_group(&self, group_id: &str) -> Result<(), NavError> {
        {
            let _guard = self.group_gate.acquire().await?;
            self.groups.delete_group(group_id).await?;
            self.rebuild_roots().await?;
        }

        self.events.emit(None);
        Ok(())
    }

    /// Moves `profile` into `group_id`, or out of every group when `None`.
    ///
    /// Both store writes happen under the group gate, so no reader sees the
    /// profile ungrouped halfway through a move.
    pub async fn move_connection_to_group(
        &self,
        profile: &ConnectionProfile,
        group_id: Option<&str>,
    ) -> Result<(), NavError> {
        {
            let _guard = self.group_gate.acquire().await?;

            if let Some(group_id) = group_id
                && self.groups.get_group(group_id).await?.is_none()
            {
                return Err(NavError::not_found(format!("connection group '{group_id}'")));
            }

            self.groups.ungroup_profile(profile).await?;
            if let Some(group_id) = group_id {
                self.groups
                    .add_connection_to_group(group_id, profile.clone())
                    .await?;
            }

            self.rebuild_roots().await?;
        }

        self.events.emit(None);
        Ok(())
    }

    // --- Notifications ---

    pub fn on_session_created(&self, notification: SessionCreated) -> bool {
        self.sessions.on_session_created(notification)
    }

    pub fn on_expand_complete(&self, notification: ExpandComplete) -> bool {
        self.expansions.on_expand_complete(notification)
    }

    /// The service went away: nothing pending will ever be answered and no
    /// session survives it. Every connection node ends up disconnected.
    pub fn on_service_closed(&self) {
        let sessions = self.sessions.cancel_all();
        let expansions = self.expansions.cancel_all();

        if sessions + expansions > 0 {
            log::warn!(
                "Metadata service closed with {} sessions and {} expansions pending",
                sessions,
                expansions
            );
        }

        let live: Vec<NodeId> = {
            let tree = self.lock_tree();
            tree.connection_nodes()
                .into_iter()
                .filter(|id| {
                    tree.get(*id).is_some_and(|node| {
                        node.session_id.is_some()
                            || matches!(
                                node.connection_state(),
                                Some(ConnectionState::Connecting(_))
                            )
                    })
                })
                .collect()
        };

        for id in &live {
            if let Err(e) = self.detach_session(*id) {
                log::debug!("Skipping {} on service close: {}", id, e);
            }
        }

        log::info!("Metadata service closed, {} connections dropped", live.len());
        self.events.emit(None);
    }

    // --- Internals ---

    async fn refresh_roots(&self) -> Result<(), NavError> {
        let _guard = self.group_gate.acquire().await?;
        self.rebuild_roots().await
    }

    /// Caller must hold the group gate.
    async fn rebuild_roots(&self) -> Result<(), NavError> {
        let groups = self.groups.list_groups().await?;
        let orphaned = {
            let mut tree = self.lock_tree();
            sync_group_nodes(&mut tree, &groups)?
        };

        for session_id in &orphaned {
            self.release_session(session_id).await;
        }
        Ok(())
    }

    async fn ensure_connection_node(&self, profile: ConnectionProfile) -> Result<NodeId, NavError> {
        self.refresh_roots().await?;

        let mut tree = self.lock_tree();
        match tree.find_connection(&profile) {
            Some(id) => Ok(id),
            None => tree.create_connection_node(profile, None),
        }
    }

    fn children_snapshot(&self, id: NodeId) -> Result<Vec<TreeNode>, NavError> {
        let tree = self.lock_tree();
        let children = tree
            .get(id)
            .ok_or_else(|| NavError::not_found(id.to_string()))?
            .children
            .as_deref()
            .unwrap_or_default();
        Ok(snapshot(&tree, children))
    }

    /// Marks the connection disconnected and drops its children, returning
    /// the session (live or still being created) that has to be released.
    fn detach_session(&self, id: NodeId) -> Result<Option<SessionId>, NavError> {
        let mut tree = self.lock_tree();
        let node = tree
            .get_mut(id)
            .ok_or_else(|| NavError::not_found(id.to_string()))?;

        let TreeNodeKind::Connection { state, .. } = &mut node.kind else {
            return Err(NavError::invalid_node(format!("{id} is not a connection")));
        };

        let connecting = match std::mem::replace(state, ConnectionState::Disconnected) {
            ConnectionState::Connecting(session_id) => Some(session_id),
            _ => None,
        };
        let session_id = node.session_id.take().or(connecting);

        tree.invalidate(id)?;
        Ok(session_id)
    }

    async fn release_session(&self, session_id: &str) {
        self.sessions.cancel(session_id);

        let cancelled = self.expansions.cancel_session(session_id);
        if cancelled > 0 {
            log::debug!(
                "Cancelled {} expansions of session {}",
                cancelled,
                session_id
            );
        }

        if let Err(e) = self.service.disconnect(session_id).await {
            log::warn!("Failed to disconnect session {}: {}", session_id, e);
        }

        log::info!("Released session {}", session_id);
    }

    async fn await_session(
        &self,
        session_id: &str,
        deferred: &Deferred<SessionOutcome>,
    ) -> SessionOutcome {
        let Some(timeout) = self.session_timeout else {
            return deferred.wait().await;
        };

        if let Some(outcome) = deferred.wait_timeout(timeout).await {
            return outcome;
        }

        log::warn!("Session {} timed out after {:?}", session_id, timeout);
        self.sessions.cancel(session_id);

        let outcome = deferred.wait().await;
        if outcome == SessionOutcome::Cancelled
            && let Err(e) = self.service.disconnect(session_id).await
        {
            log::warn!("Failed to disconnect session {}: {}", session_id, e);
        }
        outcome
    }

    async fn await_expansion(
        &self,
        key: &ExpandKey,
        deferred: &Deferred<ExpandOutcome>,
    ) -> ExpandOutcome {
        let Some(timeout) = self.expand_timeout else {
            return deferred.wait().await;
        };

        if let Some(outcome) = deferred.wait_timeout(timeout).await {
            return outcome;
        }

        log::warn!("Expansion {} timed out after {:?}", key, timeout);
        self.expansions.expire(key, deferred);
        deferred.wait().await
    }

    /// Applies a session outcome if the node is still waiting for this very
    /// session. Returns the parent to refresh, or `None` when the outcome is
    /// stale.
    fn apply_session(
        &self,
        id: NodeId,
        session_id: &str,
        outcome: &SessionOutcome,
    ) -> Result<Option<Option<NodeId>>, NavError> {
        let mut tree = self.lock_tree();

        let waiting = matches!(
            tree.get(id).and_then(TreeNode::connection_state),
            Some(ConnectionState::Connecting(pending)) if pending == session_id
        );
        if !waiting {
            return Ok(None);
        }

        let Some(node) = tree.get_mut(id) else {
            return Ok(None);
        };
        let TreeNodeKind::Connection {
            state,
            node_path,
            profile,
        } = &mut node.kind
        else {
            return Ok(None);
        };

        match outcome {
            SessionOutcome::Created(root) => {
                *state = ConnectionState::Connected;
                *node_path = Some(
                    root.as_ref()
                        .map(|r| r.node_path.clone())
                        .filter(|path| !path.is_empty())
                        .unwrap_or_else(|| profile.server.clone()),
                );
                node.session_id = Some(session_id.to_string());
                node.children = None;
                node.needs_refresh = false;
            }
            SessionOutcome::Failed(message) => {
                log::warn!("Connection to {} failed: {}", profile.key(), message);
                *state = ConnectionState::Failed(message.clone());
                node.session_id = None;

                let error = tree.create_error_node(id, message.clone())?;
                tree.set_children(id, vec![error])?;
            }
            SessionOutcome::Cancelled => {
                log::debug!("Connection attempt {} cancelled", session_id);
                *state = ConnectionState::Disconnected;
                node.session_id = None;
            }
        }

        Ok(Some(tree.parent_of(id)))
    }

    /// Writes an expansion outcome into the tree once.
    ///
    /// Callers that joined the same request find it already applied and get
    /// the resulting children. Outcomes for a node that was removed or whose
    /// session changed meanwhile are dropped as cancelled.
    fn apply_expansion(
        &self,
        id: NodeId,
        key: &ExpandKey,
        deferred: &Deferred<ExpandOutcome>,
        outcome: ExpandOutcome,
        filtered: bool,
    ) -> Result<Vec<TreeNode>, NavError> {
        let mut tree = self.lock_tree();

        let Some(node) = tree.get(id) else {
            return Err(NavError::Cancelled);
        };

        if node.applied_request() == Some(deferred.id()) {
            let children = node.children.as_deref().unwrap_or_default();
            return Ok(snapshot(&tree, children));
        }

        if tree.find_ancestor_session(id).as_deref() != Some(key.session_id.as_str()) {
            log::debug!("Dropping expansion {} for a node that lost its session", key);
            return Err(NavError::Cancelled);
        }

        let children = match outcome {
            ExpandOutcome::Expanded(infos) => {
                let mut children = Vec::with_capacity(infos.len());
                let mut malformed = None;

                for info in &infos {
                    match tree.create_object_node(info, id) {
                        Ok(child) => children.push(child),
                        Err(e) => {
                            malformed = Some(e);
                            break;
                        }
                    }
                }

                match malformed {
                    None => children,
                    Some(e) => {
                        log::error!("Malformed expansion result for {}: {}", key, e);
                        for child in children {
                            tree.remove(child)?;
                        }
                        vec![tree.create_error_node(id, e.to_string())?]
                    }
                }
            }
            ExpandOutcome::Failed(message) => vec![tree.create_error_node(id, message)?],
            ExpandOutcome::Cancelled => {
                log::debug!("Expansion {} cancelled", key);
                return Err(NavError::Cancelled);
            }
        };

        tree.set_children(id, children.clone())?;
        tree.mark_applied(id, deferred.id());
        if filtered && let Some(node) = tree.get_mut(id) {
            node.needs_refresh = true;
        }

        Ok(snapshot(&tree, &children))
    }
}

fn snapshot(tree: &ObjectTree, ids: &[NodeId]) -> Vec<TreeNode> {
    ids.iter().filter_map(|id| tree.get(*id).cloned()).collect()
}

fn connection_nodes_for(tree: &ObjectTree, profiles: &[ConnectionProfile]) -> Vec<NodeId> {
    tree.connection_nodes()
        .into_iter()
        .filter(|id| {
            tree.get(*id)
                .and_then(TreeNode::profile)
                .is_some_and(|p| profiles.iter().any(|candidate| candidate.matches(p)))
        })
        .collect()
}

/// Session held by a connection node, live or still being created.
fn held_session(node: &TreeNode) -> Option<SessionId> {
    match node.connection_state() {
        Some(ConnectionState::Connecting(session_id)) => Some(session_id.clone()),
        _ => node.session_id.clone(),
    }
}

/// Rebuilds the root level from the stored groups.
///
/// Group nodes appear first, in display order, followed by ungrouped
/// connections. Connection nodes keep their identity (and session) when they
/// move between a group and the root level. A grouped profile never also
/// shows at the root: surplus nodes are dropped and the sessions they held
/// are returned for release.
fn sync_group_nodes(
    tree: &mut ObjectTree,
    groups: &[ConnectionGroup],
) -> Result<Vec<SessionId>, NavError> {
    let wanted: HashSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();

    // Release members that left their group, and groups that no longer exist.
    for root in tree.roots().to_vec() {
        let Some(group_id) = tree.get(root).and_then(TreeNode::group_id) else {
            continue;
        };
        let group = groups.iter().find(|g| g.id == group_id);
        let stale_group = !wanted.contains(group_id);

        let members = tree.children_of(root).map(<[NodeId]>::to_vec).unwrap_or_default();
        for child in members {
            let keep = match (group, tree.get(child).and_then(TreeNode::profile)) {
                (Some(group), Some(profile)) => group.contains(profile),
                _ => false,
            };
            if !keep {
                tree.attach(child, None)?;
            }
        }

        if stale_group {
            tree.remove(root)?;
        }
    }

    let mut order = Vec::with_capacity(groups.len());
    let mut orphaned = Vec::new();

    for group in groups {
        let group_node = match tree.find_group_node(&group.id) {
            Some(id) => {
                tree.update_group_node(id, group)?;
                id
            }
            None => tree.create_group_node(group),
        };

        let current = tree
            .children_of(group_node)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        let mut members: Vec<NodeId> = Vec::with_capacity(group.connections.len());

        for profile in &group.connections {
            let candidates: Vec<NodeId> = current
                .iter()
                .chain(tree.roots().iter())
                .copied()
                .filter(|id| {
                    !members.contains(id)
                        && tree
                            .get(*id)
                            .and_then(TreeNode::profile)
                            .is_some_and(|p| p.matches(profile))
                })
                .collect();
            let existing = candidates
                .iter()
                .copied()
                .find(|id| tree.get(*id).and_then(held_session).is_some())
                .or_else(|| candidates.first().copied());

            let id = match existing {
                Some(id) => id,
                None => tree.create_connection_node(profile.clone(), Some(group_node))?,
            };

            if tree.parent_of(id) != Some(group_node) {
                tree.attach(id, Some(group_node))?;
            }
            members.push(id);
        }

        for surplus in current.iter().filter(|id| !members.contains(id)) {
            orphaned.extend(tree.get(*surplus).and_then(held_session));
        }

        tree.set_children(group_node, members)?;
        order.push(group_node);
    }

    let duplicates: Vec<NodeId> = tree
        .roots()
        .iter()
        .copied()
        .filter(|id| {
            tree.get(*id)
                .and_then(TreeNode::profile)
                .is_some_and(|p| groups.iter().any(|g| g.contains(p)))
        })
        .collect();

    for id in duplicates {
        for removed in tree.remove(id)? {
            orphaned.extend(held_session(&removed));
        }
    }

    tree.order_roots(&order);
    Ok(orphaned)
}
