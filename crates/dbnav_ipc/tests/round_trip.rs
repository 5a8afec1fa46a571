use dbnav_core::{
    ConnectionState, ExpandComplete, NodeInfo, SessionCreated, SessionOutcome,
    TreeSessionCoordinator,
};
use dbnav_ipc::pump;
use dbnav_ipc::{
    FramedMetadataService, ProtocolVersion, ServiceNotification, ServiceNotificationEnvelope,
    ServiceRequest, ServiceRequestBody, TransportError, recv_msg, send_msg,
};
use dbnav_test_support::fixtures::{folder, memory_group_store, profile, server_root};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

/// Byte sink shared between the client under test and the test itself.
#[derive(Clone, Default)]
struct SharedWire(Arc<Mutex<Vec<u8>>>);

impl SharedWire {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

impl Write for SharedWire {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn next_request(wire: &SharedWire) -> ServiceRequest {
    while wire.is_empty() {
        tokio::task::yield_now().await;
    }
    recv_msg(Cursor::new(wire.take())).unwrap()
}

fn frames(notifications: Vec<ServiceNotification>) -> Vec<u8> {
    let mut wire = Vec::new();
    for notification in notifications {
        send_msg(&mut wire, &ServiceNotificationEnvelope::new(notification)).unwrap();
    }
    wire
}

fn coordinator(wire: &SharedWire) -> Arc<TreeSessionCoordinator> {
    let (groups, _) = memory_group_store();
    let service = Arc::new(FramedMetadataService::new(wire.clone()));
    Arc::new(TreeSessionCoordinator::new(service, groups))
}

#[tokio::test]
async fn connect_and_expand_over_the_wire() {
    let wire = SharedWire::default();
    let coordinator = coordinator(&wire);

    let connect = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.connect(profile("db1")).await }
    });
    let request = next_request(&wire).await;
    let ServiceRequestBody::CreateSession(create) = request.body else {
        panic!("expected a session request, got {:?}", request.body);
    };
    assert_eq!(create.connection, profile("db1"));

    let inbound = frames(vec![ServiceNotification::SessionCreated(
        SessionCreated::succeeded(&create.session_id, Some(server_root("db1"))),
    )]);
    assert_eq!(pump::run(Cursor::new(inbound), &coordinator).unwrap(), 1);

    let connected = connect.await.unwrap().unwrap();
    assert_eq!(connected.outcome, SessionOutcome::Created(Some(server_root("db1"))));

    let expand = tokio::spawn({
        let coordinator = coordinator.clone();
        let node = connected.node;
        async move { coordinator.expand(node).await }
    });
    let request = next_request(&wire).await;
    let ServiceRequestBody::Expand(expand_request) = request.body else {
        panic!("expected an expand request, got {:?}", request.body);
    };
    assert_eq!(expand_request.node_path, "db1");

    let tables = folder("db1/Tables", "Tables").with_metadata("schema", "dbo");
    let inbound = frames(vec![
        ServiceNotification::ExpandComplete(ExpandComplete::succeeded(
            "unknown-session",
            "db1",
            Vec::<NodeInfo>::new(),
        )),
        ServiceNotification::ExpandComplete(ExpandComplete::succeeded(
            &expand_request.session_id,
            "db1",
            vec![tables],
        )),
    ]);
    assert_eq!(pump::run(Cursor::new(inbound), &coordinator).unwrap(), 1);

    let children = expand.await.unwrap().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].label, "Tables");
}

#[tokio::test]
async fn closed_stream_cancels_pending_work() {
    let wire = SharedWire::default();
    let coordinator = coordinator(&wire);

    let connect = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.connect(profile("db1")).await }
    });
    next_request(&wire).await;

    assert_eq!(pump::run(Cursor::new(Vec::new()), &coordinator).unwrap(), 0);

    let result = connect.await.unwrap().unwrap();
    assert_eq!(result.outcome, SessionOutcome::Cancelled);
    assert_eq!(
        coordinator.node(result.node).unwrap().connection_state(),
        Some(&ConnectionState::Disconnected)
    );
}

#[test]
fn incompatible_versions_are_rejected() {
    let wire = SharedWire::default();
    let coordinator = coordinator(&wire);
    let envelope = ServiceNotificationEnvelope {
        protocol_version: ProtocolVersion::new(2, 0),
        body: ServiceNotification::SessionCreated(SessionCreated::succeeded("s1", None)),
    };

    let result = pump::route(&coordinator, envelope);

    assert!(matches!(
        result,
        Err(TransportError::IncompatibleVersion { .. })
    ));
}
