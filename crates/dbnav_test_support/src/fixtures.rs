use dbnav_core::{
    ConnectionGroup, ConnectionGroupStore, ConnectionProfile, MemorySettingsStore, NodeInfo,
    CONNECTION_GROUPS_KEY,
};
use std::sync::Arc;

pub fn profile(server: &str) -> ConnectionProfile {
    ConnectionProfile::new(server, "master", "sa")
}

pub fn group(id: &str, name: &str) -> ConnectionGroup {
    ConnectionGroup::new(id, name)
}

pub fn server_root(server: &str) -> NodeInfo {
    NodeInfo::new(server, "Server", server)
}

pub fn folder(path: &str, label: &str) -> NodeInfo {
    NodeInfo::new(path, "Folder", label)
}

pub fn table(path: &str, label: &str) -> NodeInfo {
    NodeInfo::new(path, "Table", label).with_sub_type("UserTable")
}

pub fn column(path: &str, label: &str) -> NodeInfo {
    NodeInfo::new(path, "Column", label).leaf()
}

/// Group store over a fresh in-memory settings capability.
pub fn memory_group_store() -> (ConnectionGroupStore, Arc<MemorySettingsStore>) {
    let settings = Arc::new(MemorySettingsStore::new());
    (ConnectionGroupStore::new(settings.clone()), settings)
}

/// Group store pre-seeded with `groups` stored verbatim, in that order.
pub fn seeded_group_store(groups: &[ConnectionGroup]) -> (ConnectionGroupStore, Arc<MemorySettingsStore>) {
    let value = serde_json::to_value(groups).unwrap_or_else(|_| serde_json::json!([]));
    let settings = Arc::new(MemorySettingsStore::new().with_value(CONNECTION_GROUPS_KEY, value));
    (ConnectionGroupStore::new(settings.clone()), settings)
}
