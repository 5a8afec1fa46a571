mod config;
mod connection_group;
mod connection_group_store;
mod coordinator;
mod deferred;
mod discovery;
mod error;
mod events;
mod expansion;
mod gate;
mod profile;
mod session_registry;
mod settings;
mod tree_node;

#[cfg(test)]
mod test_service;

pub use config::{NavConfig, NavConfigStore, ServiceConfig};
pub use connection_group::ConnectionGroup;
pub use connection_group_store::{CONNECTION_GROUPS_KEY, ConnectionGroupStore};
pub use coordinator::{ConnectResult, TreeSessionCoordinator};
pub use deferred::Deferred;
pub use discovery::{
    CreateSessionRequest, ExpandComplete, ExpandRequest, FilterOperator, MetadataService,
    NodeFilter, NodeInfo, SessionCreated, SessionId,
};
pub use error::NavError;
pub use events::{DEFAULT_EVENT_CAPACITY, TreeChanged, TreeEvents};
pub use expansion::{ExpandKey, ExpandOutcome, ExpansionCorrelator};
pub use gate::{Gate, GateGuard};
pub use profile::{ConnectionProfile, ProfileKey};
pub use session_registry::{SessionOutcome, SessionRegistry};
pub use settings::{
    JsonFileSettingsStore, MemorySettingsStore, SettingsStore, get_typed, set_typed,
};
pub use tree_node::{
    CONNECTION_NODE_TYPE, ConnectionState, ERROR_NODE_TYPE, EXPAND_ERROR_LABEL, ExpansionState,
    GROUP_NODE_TYPE, NodeId, ObjectTree, TreeNode, TreeNodeKind,
};
