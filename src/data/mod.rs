//! Data module: fields and field streams
#![warn(missing_docs)]

pub mod field;
pub mod stream;

pub use field::{Association, Field};
pub use stream::{FieldStream, StreamKind, StreamPayload, StreamState};
