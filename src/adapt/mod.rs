//! Adaptation decision and invocation.
//!
//! [`quality_gate`] decides collectively whether the current mesh is good
//! enough to skip adaptation; [`invoker`] hands the mesh and size field to
//! the adaptation engine and checks what comes back.

pub mod invoker;
pub mod quality_gate;

pub use invoker::{run_mesh_adapter, AdaptSummary};
pub use quality_gate::{is_mesh_quality_good, local_min_quality};
