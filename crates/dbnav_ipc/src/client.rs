use crate::framing;
use crate::protocol::{ServiceRequest, ServiceRequestBody};
use async_trait::async_trait;
use dbnav_core::{CreateSessionRequest, ExpandRequest, MetadataService, NavError};
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// [`MetadataService`] that writes framed requests to any byte sink,
/// typically the stdin of the service process.
///
/// Writes are blocking and serialized; a request counts as accepted once its
/// frame has been flushed.
pub struct FramedMetadataService<W: Write + Send> {
    writer: Mutex<W>,
    next_request_id: AtomicU64,
}

impl<W: Write + Send> FramedMetadataService<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_request_id: AtomicU64::new(1),
        }
    }

    fn send(&self, body: ServiceRequestBody) -> Result<u64, NavError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = ServiceRequest::new(request_id, body);

        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        framing::send_msg(&mut *writer, &request).map_err(crate::TransportError::from)?;

        log::trace!("Sent request {}", request_id);
        Ok(request_id)
    }
}

#[async_trait]
impl<W: Write + Send> MetadataService for FramedMetadataService<W> {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<(), NavError> {
        self.send(ServiceRequestBody::CreateSession(request))?;
        Ok(())
    }

    async fn expand(&self, request: ExpandRequest) -> Result<(), NavError> {
        self.send(ServiceRequestBody::Expand(request))?;
        Ok(())
    }

    async fn disconnect(&self, session_id: &str) -> Result<(), NavError> {
        self.send(ServiceRequestBody::Disconnect {
            session_id: session_id.to_string(),
        })?;
        Ok(())
    }
}
