//! Collaborator interfaces consumed by the control loop.
//!
//! The loop treats the solver, the adaptation engine, the size and quality
//! estimators and the preprocessing step as black boxes behind these
//! traits. Calls taking a communicator are collective: every worker must
//! make them in the same order.
//!
//! Reference implementations live in [`crate::reference`].

use crate::algs::communicator::Communicator;
use crate::config::{AdaptConfig, SolverInput};
use crate::data::field::Field;
use crate::data::stream::FieldStream;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Produces the initial mesh partition of this worker.
pub trait MeshSource<C: Communicator> {
    fn load(&mut self, config: &AdaptConfig, comm: &C) -> Result<Mesh, LoopError>;
}

/// Physics solver advancing the simulation.
pub trait Solver<C: Communicator> {
    /// Run from the state in `geom` and write the solution to `restart`.
    ///
    /// Consumes the geometric restart stream and leaves one payload in the
    /// restart stream. Returns the physics step reached.
    fn solve(
        &mut self,
        input: &SolverInput,
        geom: &mut FieldStream,
        restart: &mut FieldStream,
        comm: &C,
    ) -> Result<u32, LoopError>;
}

/// Mesh-adaptation engine; rewrites the partition in place.
pub trait MeshAdapter<C: Communicator> {
    fn adapt(
        &mut self,
        config: &AdaptConfig,
        mesh: &mut Mesh,
        size_field: &Field,
        step: u32,
        comm: &C,
    ) -> Result<(), LoopError>;
}

/// Target element size per vertex.
pub trait SizeEstimator {
    fn estimate_size(&self, mesh: &Mesh) -> Result<Field, LoopError>;
}

/// Per-element quality, written as the `meshQ` field.
pub trait QualityEstimator {
    fn compute_quality(&self, mesh: &Mesh) -> Result<Field, LoopError>;
}

/// Prepares the geometric restart stream for the next solve.
pub trait Preprocessor<C: Communicator> {
    fn preprocess(
        &mut self,
        mesh: &Mesh,
        config: &AdaptConfig,
        geom: &mut FieldStream,
        comm: &C,
    ) -> Result<(), LoopError>;
}

/// Case-specific coordinate update applied after each solve.
pub trait CoordinateUpdate {
    fn update_coordinates(
        &mut self,
        config: &AdaptConfig,
        mesh: &mut Mesh,
        step: u32,
        case_id: i32,
    ) -> Result<(), LoopError>;
}

/// Everything the driver calls out to.
pub struct Collaborators<C: Communicator> {
    pub source: Box<dyn MeshSource<C>>,
    pub solver: Box<dyn Solver<C>>,
    pub adapter: Box<dyn MeshAdapter<C>>,
    pub size: Box<dyn SizeEstimator>,
    pub quality: Box<dyn QualityEstimator>,
    pub preprocessor: Box<dyn Preprocessor<C>>,
    pub motion: Box<dyn CoordinateUpdate>,
}
