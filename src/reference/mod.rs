//! Reference collaborators.
//!
//! Small, self-contained implementations of every [`crate::engines`] trait
//! so the loop runs end to end without external engines. They are simple on
//! purpose: the solver diffuses one vertex scalar, the adapter smooths
//! vertices toward the size field without changing topology.

pub mod adapter;
pub mod journal;
pub mod motion;
pub mod preprocess;
pub mod quality;
pub mod size;
pub mod solver;
pub mod source;

pub use adapter::SmoothingAdapter;
pub use journal::RunJournal;
pub use motion::MotionCase;
pub use preprocess::StreamPreprocessor;
pub use quality::EdgeRatioQuality;
pub use size::IsoSize;
pub use solver::DiffusionSolver;
pub use source::{FileMeshSource, GivenMesh, GridMeshSource};

use crate::algs::communicator::Communicator;
use crate::engines::{Collaborators, MeshSource};

/// Wire the reference collaborators around `source`.
pub fn collaborators<C: Communicator>(
    source: Box<dyn MeshSource<C>>,
    preprocessor: StreamPreprocessor,
) -> Collaborators<C> {
    Collaborators {
        source,
        solver: Box::new(DiffusionSolver::default()),
        adapter: Box::new(SmoothingAdapter::default()),
        size: Box::new(IsoSize),
        quality: Box::new(EdgeRatioQuality),
        preprocessor: Box::new(preprocessor),
        motion: Box::new(MotionCase::default()),
    }
}
