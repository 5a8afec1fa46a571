use crate::{ConnectionProfile, NavError};
use serde::{Deserialize, Serialize};

/// A user-defined, persisted collection of connections.
///
/// Groups are rendered as top-level folders of the object tree. They only
/// reference profiles; deleting a group leaves its connections ungrouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionGroup {
    /// Unique across all groups.
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tint for the group icon, `#RRGGBB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Member connections, unique by `(server, database, user)`.
    #[serde(default)]
    pub connections: Vec<ConnectionProfile>,

    /// Ascending sort position among groups. Missing sorts as `0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
}

impl ConnectionGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            color: None,
            connections: Vec::new(),
            display_order: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_display_order(mut self, order: i64) -> Self {
        self.display_order = Some(order);
        self
    }

    pub fn with_connection(mut self, profile: ConnectionProfile) -> Self {
        self.upsert_connection(profile);
        self
    }

    pub fn sort_order(&self) -> i64 {
        self.display_order.unwrap_or(0)
    }

    pub fn contains(&self, profile: &ConnectionProfile) -> bool {
        self.connections.iter().any(|c| c.matches(profile))
    }

    /// Adds `profile`, replacing a member with the same key in place.
    ///
    /// Returns `true` if an existing member was replaced.
    pub fn upsert_connection(&mut self, profile: ConnectionProfile) -> bool {
        match self.connections.iter().position(|c| c.matches(&profile)) {
            Some(index) => {
                self.connections[index] = profile;
                true
            }
            None => {
                self.connections.push(profile);
                false
            }
        }
    }

    /// Removes every member with the same key as `profile`.
    ///
    /// Returns `true` if something was removed.
    pub fn remove_connection(&mut self, profile: &ConnectionProfile) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| !c.matches(profile));
        self.connections.len() != before
    }

    /// Checks the record before it is persisted.
    pub fn validate(&self) -> Result<(), NavError> {
        if self.id.trim().is_empty() {
            return Err(NavError::InvalidGroup("group id must not be empty".into()));
        }

        if let Some(color) = &self.color
            && !is_hex_color(color)
        {
            return Err(NavError::InvalidGroup(format!(
                "color '{}' of group '{}' is not #RRGGBB",
                color, self.id
            )));
        }

        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
