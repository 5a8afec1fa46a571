use crate::settings::{get_typed, set_typed};
use crate::{ConnectionGroup, ConnectionProfile, NavError, SettingsStore};
use log::info;
use std::sync::Arc;

/// Settings key holding the ordered list of connection groups.
pub const CONNECTION_GROUPS_KEY: &str = "dbnav.connectionGroups";

/// CRUD surface over the persisted connection groups.
///
/// Every operation is a read-modify-write of the whole collection with no
/// transaction around it: two concurrent writers race and the last write
/// wins. Callers that need several mutations to land together must serialize
/// themselves, e.g. with a [`crate::Gate`].
#[derive(Clone)]
pub struct ConnectionGroupStore {
    settings: Arc<dyn SettingsStore>,
    key: String,
}

impl ConnectionGroupStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self::with_key(settings, CONNECTION_GROUPS_KEY)
    }

    pub fn with_key(settings: Arc<dyn SettingsStore>, key: impl Into<String>) -> Self {
        Self {
            settings,
            key: key.into(),
        }
    }

    /// Returns all groups sorted by display order; ties keep storage order.
    ///
    /// Initializes the collection to an empty list the first time it is read.
    pub async fn list_groups(&self) -> Result<Vec<ConnectionGroup>, NavError> {
        let groups: Option<Vec<ConnectionGroup>> =
            get_typed(self.settings.as_ref(), &self.key).await?;

        let mut groups = match groups {
            Some(groups) => groups,
            None => {
                let empty: Vec<ConnectionGroup> = Vec::new();
                set_typed(self.settings.as_ref(), &self.key, &empty).await?;
                empty
            }
        };

        // Stable sort: equal orders stay in storage order.
        groups.sort_by_key(ConnectionGroup::sort_order);
        Ok(groups)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<ConnectionGroup>, NavError> {
        let groups = self.list_groups().await?;
        Ok(groups.into_iter().find(|g| g.id == group_id))
    }

    /// Inserts or replaces the group with the same id.
    ///
    /// A new group without a display order is placed after all existing ones.
    pub async fn save_group(&self, mut group: ConnectionGroup) -> Result<(), NavError> {
        group.validate()?;

        let mut groups = self.list_groups().await?;

        match groups.iter().position(|g| g.id == group.id) {
            Some(index) => groups[index] = group,
            None => {
                if group.display_order.is_none() {
                    group.display_order = Some(groups.len() as i64);
                }
                info!("Creating connection group '{}'", group.id);
                groups.push(group);
            }
        }

        self.write_groups(&groups).await
    }

    /// Removes the group record. Its connections are not touched.
    pub async fn delete_group(&self, group_id: &str) -> Result<(), NavError> {
        let mut groups = self.list_groups().await?;
        let before = groups.len();
        groups.retain(|g| g.id != group_id);

        if groups.len() != before {
            info!("Deleting connection group '{}'", group_id);
        }

        self.write_groups(&groups).await
    }

    /// Adds `profile` to the group, replacing a member with the same key.
    ///
    /// Silently does nothing if the group does not exist.
    pub async fn add_connection_to_group(
        &self,
        group_id: &str,
        profile: ConnectionProfile,
    ) -> Result<(), NavError> {
        let mut groups = self.list_groups().await?;

        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            log::debug!("Ignoring add to unknown connection group '{}'", group_id);
            return Ok(());
        };

        group.upsert_connection(profile);
        self.write_groups(&groups).await
    }

    /// Removes every member matching `profile` from the group.
    ///
    /// Silently does nothing if the group does not exist.
    pub async fn remove_connection_from_group(
        &self,
        group_id: &str,
        profile: &ConnectionProfile,
    ) -> Result<(), NavError> {
        let mut groups = self.list_groups().await?;

        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            log::debug!("Ignoring remove from unknown connection group '{}'", group_id);
            return Ok(());
        };

        group.remove_connection(profile);
        self.write_groups(&groups).await
    }

    /// First group (in display order) containing `profile`.
    pub async fn group_for_profile(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Option<ConnectionGroup>, NavError> {
        let groups = self.list_groups().await?;
        Ok(groups.into_iter().find(|g| g.contains(profile)))
    }

    /// Removes `profile` from every group in a single write.
    ///
    /// Returns the ids of the groups that lost a member.
    pub async fn ungroup_profile(&self, profile: &ConnectionProfile) -> Result<Vec<String>, NavError> {
        let mut groups = self.list_groups().await?;

        let touched: Vec<String> = groups
            .iter_mut()
            .filter_map(|g| g.remove_connection(profile).then(|| g.id.clone()))
            .collect();

        if !touched.is_empty() {
            self.write_groups(&groups).await?;
        }

        Ok(touched)
    }

    async fn write_groups(&self, groups: &[ConnectionGroup]) -> Result<(), NavError> {
        set_typed(self.settings.as_ref(), &self.key, groups).await?;
        info!("Saved {} connection groups", groups.len());
        Ok(())
    }
}
