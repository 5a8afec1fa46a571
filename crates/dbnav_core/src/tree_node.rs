use crate::{ConnectionGroup, ConnectionProfile, NavError, NodeInfo, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const GROUP_NODE_TYPE: &str = "connectionGroup";
pub const CONNECTION_NODE_TYPE: &str = "Server";
pub const ERROR_NODE_TYPE: &str = "expandError";

/// Label of the leaf that replaces the children of a node that failed to expand.
pub const EXPAND_ERROR_LABEL: &str = "Error loading; refresh to try again";

/// Handle to a node of an [`ObjectTree`]. Never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Waiting for the service to confirm the session.
    Connecting(SessionId),
    Connected,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNodeKind {
    Group {
        group_id: String,
        description: Option<String>,
        color: Option<String>,
    },
    Connection {
        profile: ConnectionProfile,
        state: ConnectionState,
        /// Service path of the server root, known once the session exists.
        node_path: Option<String>,
    },
    Object {
        node_path: String,
        node_type: String,
        sub_type: Option<String>,
        is_leaf: bool,
        metadata: BTreeMap<String, String>,
    },
    Error {
        /// Node whose expansion failed; retrying expands it again.
        failed_node: NodeId,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    Unexpanded,
    Expanded,
    Error,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub label: String,
    pub kind: TreeNodeKind,
    /// Back-reference only; the parent owns this node through `children`.
    pub parent: Option<NodeId>,
    /// `None` until expanded, `Some(vec![])` when expanded with no children.
    pub children: Option<Vec<NodeId>>,
    pub session_id: Option<SessionId>,
    pub needs_refresh: bool,
    applied_request: Option<u64>,
}

impl TreeNode {
    fn new(id: NodeId, label: String, kind: TreeNodeKind, parent: Option<NodeId>) -> Self {
        Self {
            id,
            label,
            kind,
            parent,
            children: None,
            session_id: None,
            needs_refresh: false,
            applied_request: None,
        }
    }

    pub fn node_type(&self) -> &str {
        match &self.kind {
            TreeNodeKind::Group { .. } => GROUP_NODE_TYPE,
            TreeNodeKind::Connection { .. } => CONNECTION_NODE_TYPE,
            TreeNodeKind::Object { node_type, .. } => node_type,
            TreeNodeKind::Error { .. } => ERROR_NODE_TYPE,
        }
    }

    /// Service path used to expand this node, if it has one.
    pub fn node_path(&self) -> Option<&str> {
        match &self.kind {
            TreeNodeKind::Connection { node_path, .. } => node_path.as_deref(),
            TreeNodeKind::Object { node_path, .. } => Some(node_path),
            TreeNodeKind::Group { .. } | TreeNodeKind::Error { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, TreeNodeKind::Group { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self.kind, TreeNodeKind::Connection { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TreeNodeKind::Error { .. })
    }

    pub fn is_leaf(&self) -> bool {
        match &self.kind {
            TreeNodeKind::Object { is_leaf, .. } => *is_leaf,
            TreeNodeKind::Error { .. } => true,
            _ => false,
        }
    }

    pub fn profile(&self) -> Option<&ConnectionProfile> {
        match &self.kind {
            TreeNodeKind::Connection { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn connection_state(&self) -> Option<&ConnectionState> {
        match &self.kind {
            TreeNodeKind::Connection { state, .. } => Some(state),
            _ => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match &self.kind {
            TreeNodeKind::Group { group_id, .. } => Some(group_id),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.kind {
            TreeNodeKind::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Id of the expansion result last applied to this node.
    pub(crate) fn applied_request(&self) -> Option<u64> {
        self.applied_request
    }
}

/// In-memory object tree.
///
/// Nodes are stored flat and linked by ids: each node names its parent and,
/// once expanded, its children. Removing a node removes its whole subtree.
#[derive(Debug, Default)]
pub struct ObjectTree {
    nodes: HashMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children_of(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(&id).and_then(|n| n.children.as_deref())
    }

    fn require(&self, id: NodeId) -> Result<&TreeNode, NavError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| NavError::not_found(id.to_string()))
    }

    fn insert(&mut self, label: String, kind: TreeNodeKind, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, TreeNode::new(id, label, kind, parent));
        id
    }

    /// Adds a root-level group node. Group nodes are always expanded.
    pub fn create_group_node(&mut self, group: &ConnectionGroup) -> NodeId {
        let id = self.insert(
            group.name.clone(),
            TreeNodeKind::Group {
                group_id: group.id.clone(),
                description: group.description.clone(),
                color: group.color.clone(),
            },
            None,
        );

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(Vec::new());
        }
        self.roots.push(id);
        id
    }

    /// Refreshes the display fields of an existing group node.
    pub fn update_group_node(&mut self, id: NodeId, group: &ConnectionGroup) -> Result<(), NavError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| NavError::not_found(id.to_string()))?;

        let TreeNodeKind::Group {
            description, color, ..
        } = &mut node.kind
        else {
            return Err(NavError::invalid_node(format!("{id} is not a group")));
        };

        description.clone_from(&group.description);
        color.clone_from(&group.color);
        node.label.clone_from(&group.name);
        Ok(())
    }

    /// Adds a disconnected connection node at the root or under a group.
    pub fn create_connection_node(
        &mut self,
        profile: ConnectionProfile,
        parent_group: Option<NodeId>,
    ) -> Result<NodeId, NavError> {
        if let Some(group) = parent_group
            && !self.require(group)?.is_group()
        {
            return Err(NavError::invalid_node(format!(
                "connection parent {group} is not a group"
            )));
        }

        let label = profile.display_label();
        let id = self.insert(
            label,
            TreeNodeKind::Connection {
                profile,
                state: ConnectionState::Disconnected,
                node_path: None,
            },
            None,
        );

        self.attach(id, parent_group)?;
        Ok(id)
    }

    /// Creates a node for a discovered object.
    ///
    /// The node points at `parent` but is not one of its children until it is
    /// passed to [`ObjectTree::set_children`].
    pub fn create_object_node(&mut self, info: &NodeInfo, parent: NodeId) -> Result<NodeId, NavError> {
        let parent_node = self.require(parent)?;
        if parent_node.is_group() || parent_node.is_error() {
            return Err(NavError::invalid_node(format!(
                "{parent} cannot hold discovered objects"
            )));
        }

        if info.node_path.is_empty() {
            return Err(NavError::invalid_node(format!(
                "object '{}' has an empty node path",
                info.label
            )));
        }

        let id = self.insert(
            info.label.clone(),
            TreeNodeKind::Object {
                node_path: info.node_path.clone(),
                node_type: info.node_type.clone(),
                sub_type: info.node_sub_type.clone(),
                is_leaf: info.is_leaf,
                metadata: info.metadata.clone(),
            },
            Some(parent),
        );

        if info.is_leaf
            && let Some(node) = self.nodes.get_mut(&id)
        {
            node.children = Some(Vec::new());
        }

        Ok(id)
    }

    /// Creates the retryable leaf shown when expanding `parent` failed.
    ///
    /// Like object nodes, it is attached by [`ObjectTree::set_children`].
    pub fn create_error_node(
        &mut self,
        parent: NodeId,
        message: impl Into<String>,
    ) -> Result<NodeId, NavError> {
        self.require(parent)?;

        let id = self.insert(
            EXPAND_ERROR_LABEL.to_string(),
            TreeNodeKind::Error {
                failed_node: parent,
                message: message.into(),
            },
            Some(parent),
        );

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(Vec::new());
        }
        Ok(id)
    }

    /// Replaces the children of `id` in one step and clears `needs_refresh`.
    ///
    /// Previous children that are not in `children` are dropped together with
    /// their subtrees. Every new child must already point at `id`.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<(), NavError> {
        self.require(id)?;

        for child in &children {
            let child_node = self.require(*child)?;
            if *child == id || child_node.parent != Some(id) {
                return Err(NavError::invalid_node(format!(
                    "{child} is not a child of {id}"
                )));
            }
        }

        let previous = self
            .nodes
            .get_mut(&id)
            .and_then(|node| node.children.take())
            .unwrap_or_default();

        for old in previous {
            if !children.contains(&old) {
                self.remove_subtree(old);
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(children);
            node.needs_refresh = false;
        }
        Ok(())
    }

    /// Forgets the cached children of `id` so the next expansion goes to the
    /// service. Group nodes are recomputed on every traversal and are left as is.
    pub fn invalidate(&mut self, id: NodeId) -> Result<(), NavError> {
        if self.require(id)?.is_group() {
            return Ok(());
        }

        self.drop_descendants(id);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = None;
            node.needs_refresh = true;
            node.applied_request = None;
        }
        Ok(())
    }

    /// Session of the nearest node on the path to the root that carries one.
    pub fn find_ancestor_session(&self, id: NodeId) -> Option<SessionId> {
        let mut current = Some(id);

        while let Some(node_id) = current {
            let node = self.nodes.get(&node_id)?;
            if let Some(session) = &node.session_id {
                return Some(session.clone());
            }
            current = node.parent;
        }

        None
    }

    pub fn expansion_state(&self, id: NodeId) -> Option<ExpansionState> {
        let node = self.nodes.get(&id)?;

        let state = match &node.children {
            None => ExpansionState::Unexpanded,
            Some(children) if children.len() == 1 => {
                let only = self.nodes.get(&children[0]);
                if only.is_some_and(TreeNode::is_error) {
                    ExpansionState::Error
                } else {
                    ExpansionState::Expanded
                }
            }
            Some(_) => ExpansionState::Expanded,
        };

        Some(state)
    }

    /// First connection node (by creation order) for `profile`.
    pub fn find_connection(&self, profile: &ConnectionProfile) -> Option<NodeId> {
        self.connection_nodes().into_iter().find(|id| {
            self.nodes
                .get(id)
                .and_then(TreeNode::profile)
                .is_some_and(|p| p.matches(profile))
        })
    }

    pub fn find_group_node(&self, group_id: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).and_then(TreeNode::group_id) == Some(group_id))
    }

    /// All connection nodes in creation order.
    pub fn connection_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.is_connection())
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }

    /// Moves `id` under `parent`, or to the root level when `parent` is `None`.
    ///
    /// The node is appended after its new siblings.
    pub fn attach(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), NavError> {
        self.require(id)?;
        if let Some(parent_id) = parent {
            self.require(parent_id)?;
            if self.is_ancestor_or_self(id, parent_id) {
                return Err(NavError::invalid_node(format!(
                    "attaching {id} under {parent_id} would create a cycle"
                )));
            }
        }

        self.detach(id);

        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                    parent_node.children.get_or_insert_with(Vec::new).push(id);
                }
            }
            None => self.roots.push(id),
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Removes `id` and its subtree, returning the removed nodes.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<TreeNode>, NavError> {
        self.require(id)?;
        self.detach(id);
        Ok(self.remove_subtree(id))
    }

    /// Reorders the root level. Roots missing from `order` keep their
    /// relative order after the listed ones; unknown ids are ignored.
    pub fn order_roots(&mut self, order: &[NodeId]) {
        let mut ordered: Vec<NodeId> = order
            .iter()
            .copied()
            .filter(|id| self.roots.contains(id))
            .collect();

        for id in &self.roots {
            if !ordered.contains(id) {
                ordered.push(*id);
            }
        }

        self.roots = ordered;
    }

    pub(crate) fn mark_applied(&mut self, id: NodeId, request: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.applied_request = Some(request);
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.parent_of(node_id);
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);

        match parent {
            Some(parent_id) => {
                if let Some(children) = self
                    .nodes
                    .get_mut(&parent_id)
                    .and_then(|p| p.children.as_mut())
                {
                    children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    fn drop_descendants(&mut self, id: NodeId) {
        let children = self
            .nodes
            .get_mut(&id)
            .and_then(|n| n.children.take())
            .unwrap_or_default();

        for child in children {
            self.remove_subtree(child);
        }
    }

    fn remove_subtree(&mut self, id: NodeId) -> Vec<TreeNode> {
        let mut removed = Vec::new();
        let mut to_remove = vec![id];

        while let Some(next) = to_remove.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                if let Some(children) = &node.children {
                    to_remove.extend(children.iter().copied());
                }
                removed.push(node);
            }
        }

        removed
    }
}
