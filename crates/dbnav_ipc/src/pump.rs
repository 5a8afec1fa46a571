//! Inbound half of the transport: routes notifications to the coordinator.

use crate::framing::try_recv_msg;
use crate::protocol::{
    DISCOVERY_PROTOCOL_VERSION, ServiceNotification, ServiceNotificationEnvelope,
};
use crate::TransportError;
use dbnav_core::TreeSessionCoordinator;
use std::io::Read;

/// Hands one notification to the matching coordinator entry point.
///
/// Returns whether a pending request was waiting for it.
pub fn route(
    coordinator: &TreeSessionCoordinator,
    envelope: ServiceNotificationEnvelope,
) -> Result<bool, TransportError> {
    if !envelope
        .protocol_version
        .is_compatible_with(DISCOVERY_PROTOCOL_VERSION)
    {
        return Err(TransportError::IncompatibleVersion {
            remote: envelope.protocol_version,
            expected: DISCOVERY_PROTOCOL_VERSION,
        });
    }

    let matched = match envelope.body {
        ServiceNotification::SessionCreated(notification) => {
            coordinator.on_session_created(notification)
        }
        ServiceNotification::ExpandComplete(notification) => {
            coordinator.on_expand_complete(notification)
        }
    };

    Ok(matched)
}

/// Reads notifications until the stream ends, routing each one.
///
/// Blocking; run it on its own thread. When the stream ends, cleanly or not,
/// every pending request of the coordinator is cancelled. Returns the number
/// of notifications that matched a pending request.
pub fn run<R: Read>(mut reader: R, coordinator: &TreeSessionCoordinator) -> Result<usize, TransportError> {
    let mut matched = 0;

    loop {
        match try_recv_msg::<_, ServiceNotificationEnvelope>(&mut reader) {
            Ok(Some(envelope)) => match route(coordinator, envelope) {
                Ok(true) => matched += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Dropping notification: {}", e),
            },
            Ok(None) => {
                log::info!("Metadata service closed its output");
                coordinator.on_service_closed();
                return Ok(matched);
            }
            Err(e) => {
                log::error!("Metadata service stream failed: {}", e);
                coordinator.on_service_closed();
                return Err(e.into());
            }
        }
    }
}
