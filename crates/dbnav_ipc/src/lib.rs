pub mod client;
pub mod error;
pub mod framing;
pub mod process;
pub mod protocol;
pub mod pump;

pub use client::FramedMetadataService;
pub use error::TransportError;
pub use framing::{recv_msg, send_msg, try_recv_msg};
pub use process::ServiceProcess;
pub use protocol::{
    DISCOVERY_PROTOCOL_VERSION, ProtocolVersion, ServiceNotification, ServiceNotificationEnvelope,
    ServiceRequest, ServiceRequestBody,
};
