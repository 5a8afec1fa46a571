use crate::{CreateSessionRequest, ExpandRequest, MetadataService, NavError};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records requests for unit tests; integration tests use `dbnav_test_support`.
#[derive(Default)]
pub(crate) struct RecordingService {
    pub sessions: Mutex<Vec<CreateSessionRequest>>,
    pub expands: Mutex<Vec<ExpandRequest>>,
    pub disconnects: Mutex<Vec<String>>,
    pub fail_sends: bool,
}

impl RecordingService {
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn expand_count(&self) -> usize {
        self.expands.lock().unwrap().len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.session_id.clone())
            .collect()
    }

    fn check(&self) -> Result<(), NavError> {
        if self.fail_sends {
            return Err(NavError::Transport("service unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataService for RecordingService {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<(), NavError> {
        self.check()?;
        self.sessions.lock().unwrap().push(request);
        Ok(())
    }

    async fn expand(&self, request: ExpandRequest) -> Result<(), NavError> {
        self.check()?;
        self.expands.lock().unwrap().push(request);
        Ok(())
    }

    async fn disconnect(&self, session_id: &str) -> Result<(), NavError> {
        self.disconnects.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}
