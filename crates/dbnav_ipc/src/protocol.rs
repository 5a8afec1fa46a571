use dbnav_core::{CreateSessionRequest, ExpandComplete, ExpandRequest, SessionCreated, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version stamped on every frame. Peers agree when the major numbers match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub const fn is_compatible_with(self, other: Self) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub const DISCOVERY_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0);

/// Requests sent to the metadata service. Each is acknowledged by being
/// written; results arrive later as [`ServiceNotification`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceRequestBody {
    CreateSession(CreateSessionRequest),
    Expand(ExpandRequest),
    Disconnect { session_id: SessionId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub protocol_version: ProtocolVersion,
    pub request_id: u64,
    pub body: ServiceRequestBody,
}

impl ServiceRequest {
    pub fn new(request_id: u64, body: ServiceRequestBody) -> Self {
        Self {
            protocol_version: DISCOVERY_PROTOCOL_VERSION,
            request_id,
            body,
        }
    }
}

/// Out-of-band results, correlated by session id and node path only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceNotification {
    SessionCreated(SessionCreated),
    ExpandComplete(ExpandComplete),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNotificationEnvelope {
    pub protocol_version: ProtocolVersion,
    pub body: ServiceNotification,
}

impl ServiceNotificationEnvelope {
    pub fn new(body: ServiceNotification) -> Self {
        Self {
            protocol_version: DISCOVERY_PROTOCOL_VERSION,
            body,
        }
    }
}
