use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Gate closed")]
    GateClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NavError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_node(message: impl Into<String>) -> Self {
        Self::InvalidNode(message.into())
    }
}

impl From<serde_json::Error> for NavError {
    fn from(err: serde_json::Error) -> Self {
        NavError::Storage(err.to_string())
    }
}
