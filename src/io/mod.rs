//! Checkpoint and mesh file I/O.
//!
//! Meshes are stored as JSON through `serde`; the per-rank layout of
//! sequence snapshots follows [`checkpoint::CheckpointWriter`].

pub mod checkpoint;

pub use checkpoint::{read_mesh_file, write_mesh_file, CheckpointWriter};
