//! Communication and field-transfer algorithms.

pub mod communicator;
pub mod field_transfer;

pub use communicator::Communicator;
pub use field_transfer::{geometry_payload, mesh_from_geometry, read_and_attach_fields};
