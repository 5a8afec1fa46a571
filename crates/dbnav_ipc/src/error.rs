use crate::ProtocolVersion;
use dbnav_core::NavError;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("incompatible protocol version {remote}, expected {expected}")]
    IncompatibleVersion {
        remote: ProtocolVersion,
        expected: ProtocolVersion,
    },

    #[error("service process error: {0}")]
    Process(String),
}

impl From<TransportError> for NavError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => NavError::Transport(e.to_string()),
            other => NavError::Transport(other.to_string()),
        }
    }
}
