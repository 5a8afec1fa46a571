use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A saved connection definition.
///
/// Credentials are not part of the profile; the metadata service resolves
/// them on its own. For group membership a profile is identified only by its
/// [`ProfileKey`], so two profiles that differ in port or options but share
/// server, database and user count as the same connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub server: String,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    /// Friendly name shown instead of the server/database pair.
    #[serde(default)]
    pub profile_name: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Authentication scheme understood by the metadata service
    /// (e.g. `"SqlLogin"`, `"Integrated"`).
    #[serde(default)]
    pub auth_type: Option<String>,

    /// Free-form driver options forwarded verbatim.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ConnectionProfile {
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey {
            server: self.server.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
        }
    }

    /// Returns `true` if both profiles denote the same connection.
    pub fn matches(&self, other: &ConnectionProfile) -> bool {
        self.server == other.server && self.database == other.database && self.user == other.user
    }

    /// Label used for the connection node in the tree.
    pub fn display_label(&self) -> String {
        if let Some(name) = self.profile_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        let mut label = self.server.clone();
        if !self.database.is_empty() {
            label.push_str(", ");
            label.push_str(&self.database);
        }
        if !self.user.is_empty() {
            label.push_str(&format!(" ({})", self.user));
        }
        label
    }
}

/// The `(server, database, user)` triple that identifies a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileKey {
    pub server: String,
    pub database: String,
    pub user: String,
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.server, self.database, self.user)
    }
}
