//! Message shapes exchanged with the out-of-process metadata service.
//!
//! Requests are acknowledged as soon as they are accepted; the actual result
//! arrives later as a notification ([`SessionCreated`], [`ExpandComplete`])
//! that is matched back to its request by correlation key only.

use crate::{ConnectionProfile, NavError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque identifier of a live session with the metadata service.
pub type SessionId = String;

/// One object discovered by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Service-side path, unique within a session. Used to expand the node.
    pub node_path: String,

    /// Object kind, e.g. `"Database"`, `"Table"`, `"Folder"`.
    pub node_type: String,

    pub label: String,

    #[serde(default)]
    pub node_sub_type: Option<String>,

    /// Leaves never have children and are never expanded remotely.
    #[serde(default)]
    pub is_leaf: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NodeInfo {
    pub fn new(
        node_path: impl Into<String>,
        node_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            node_path: node_path.into(),
            node_type: node_type.into(),
            label: label.into(),
            node_sub_type: None,
            is_leaf: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn leaf(mut self) -> Self {
        self.is_leaf = true;
        self
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.node_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
}

/// Server-side filter applied to the children of an expanded node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub name: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl NodeFilter {
    pub fn new(name: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Asks the service to open a session. The id is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_id: SessionId,
    pub connection: ConnectionProfile,
}

/// Out-of-band answer to a [`CreateSessionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub root_node: Option<NodeInfo>,
}

impl SessionCreated {
    pub fn succeeded(session_id: impl Into<SessionId>, root_node: Option<NodeInfo>) -> Self {
        Self {
            session_id: session_id.into(),
            success: true,
            error_message: None,
            root_node,
        }
    }

    pub fn failed(session_id: impl Into<SessionId>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            success: false,
            error_message: Some(message.into()),
            root_node: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandRequest {
    pub session_id: SessionId,
    pub node_path: String,
    #[serde(default)]
    pub filters: Vec<NodeFilter>,
}

/// Out-of-band answer to an [`ExpandRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandComplete {
    pub session_id: SessionId,
    pub node_path: String,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub nodes: Option<Vec<NodeInfo>>,
}

impl ExpandComplete {
    pub fn succeeded(
        session_id: impl Into<SessionId>,
        node_path: impl Into<String>,
        nodes: Vec<NodeInfo>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            node_path: node_path.into(),
            success: true,
            error_message: None,
            nodes: Some(nodes),
        }
    }

    pub fn failed(
        session_id: impl Into<SessionId>,
        node_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            node_path: node_path.into(),
            success: false,
            error_message: Some(message.into()),
            nodes: None,
        }
    }
}

/// Outbound half of the metadata service.
///
/// Each call returns once the request has been handed to the service; it does
/// not wait for the matching notification. Implementations must not call back
/// into the coordinator from these methods.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<(), NavError>;

    async fn expand(&self, request: ExpandRequest) -> Result<(), NavError>;

    /// Fire-and-forget: no notification follows.
    async fn disconnect(&self, session_id: &str) -> Result<(), NavError>;
}
