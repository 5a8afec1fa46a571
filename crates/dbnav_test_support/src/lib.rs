pub mod fake_service;
pub mod fixtures;

pub use fake_service::{FakeMetadataService, FakeServiceStats};
