#![cfg_attr(docsrs, feature(doc_cfg))]
//! # remesh-loop
//!
//! remesh-loop drives a transient solver and a mesh-adaptation engine in
//! alternation on every worker of an SPMD group. Solver and mesh exchange
//! data through in-memory field streams instead of restart files, a
//! collective quality gate decides whether the mesh needs adapting, and
//! each adaptation is bracketed by checkpoints.
//!
//! ## Features
//! - Checked single-use field streams for the solver hand-off
//! - Collective mesh quality gate (min reduction plus barrier)
//! - Sequence and phase checkpoints with atomic overwrite
//! - Pluggable solver, adapter, estimators and preprocessing behind traits
//! - Serial, in-process threaded and MPI communicators
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! remesh-loop = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! The `remesh-loop` binary runs the loop with the reference collaborators:
//!
//! ```text
//! remesh-loop <maxTimeStep> <motion case id> [--workdir DIR] [--log-level LEVEL]
//! ```

#[macro_use]
mod macros;

pub mod adapt;
pub mod algs;
pub mod app;
pub mod config;
pub mod context;
pub mod data;
pub mod debug_invariants;
pub mod driver;
pub mod engines;
pub mod io;
pub mod loop_error;
pub mod mesh;
pub mod mesh_generation;
pub mod reference;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::{is_mesh_quality_good, run_mesh_adapter, AdaptSummary};
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::config::{AdaptConfig, AdaptStrategy, AdaptTrigger, SolverInput};
    pub use crate::context::{Engine, EngineContext};
    pub use crate::data::field::{Association, Field, MESH_QUALITY_FIELD};
    pub use crate::data::stream::{FieldStream, StreamKind, StreamPayload, StreamState};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::driver::{LoopDriver, LoopParams, LoopReport, LoopState, StepCounters};
    pub use crate::engines::{
        Collaborators, CoordinateUpdate, MeshAdapter, MeshSource, Preprocessor,
        QualityEstimator, SizeEstimator, Solver,
    };
    pub use crate::io::checkpoint::{CheckpointWriter, PhaseRecord, PieceMetadata};
    pub use crate::loop_error::{ErrorClass, LoopError};
    pub use crate::mesh::Mesh;
}
