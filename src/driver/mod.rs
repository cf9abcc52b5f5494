//! Solve–adapt control loop.
//!
//! Every worker runs the same [`LoopDriver`] in lockstep. The driver walks
//! the states of [`LoopState`]; each transition that needs agreement between
//! workers goes through a collective on the [`Communicator`].
//!
//! ```text
//! Load -> Solve -> EvaluateTermination -+-> Finalize
//!           ^                           |
//!           |                           v
//!         Resume <- Adapt <- DecideAdapt <- PrepareAdapt
//!           ^                    |
//!           +--------------------+  (mesh kept)
//! ```

use crate::adapt::{is_mesh_quality_good, run_mesh_adapter, AdaptSummary};
use crate::algs::communicator::Communicator;
use crate::algs::field_transfer::read_and_attach_fields;
use crate::config::{AdaptConfig, AdaptTrigger, SolverInput};
use crate::data::field::{Field, MESH_QUALITY_FIELD};
use crate::data::stream::{FieldStream, StreamKind};
use crate::debug_invariants::DebugInvariants;
use crate::engines::Collaborators;
use crate::io::checkpoint::{CheckpointWriter, PhaseRecord};
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// States of the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Load,
    Solve,
    EvaluateTermination,
    PrepareAdapt,
    DecideAdapt,
    Adapt,
    Resume,
    Finalize,
}

/// Physics step, phase start and sequence index.
///
/// `step` is set only by the solve, `phase` only by
/// [`advance_phase`](Self::advance_phase) and `seq` only by
/// [`next_sequence`](Self::next_sequence).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepCounters {
    pub step: u32,
    pub phase: u32,
    pub seq: u32,
}

impl StepCounters {
    /// Take the current sequence index and advance it.
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Start a new phase at the current step.
    ///
    /// Returns `(previous phase start, steps elapsed since it)`.
    pub fn advance_phase(&mut self) -> (u32, u32) {
        let start = self.phase;
        let elapsed = self.step.saturating_sub(start);
        self.phase = self.step;
        (start, elapsed)
    }
}

/// Command-line parameters of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopParams {
    /// Stop once the solver reaches this step.
    pub max_step: u32,
    /// Motion case passed to the coordinate update.
    pub case_id: i32,
}

/// What a finished run did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopReport {
    pub final_step: u32,
    pub solves: u32,
    /// One entry per adaptation, in order.
    pub adaptations: Vec<AdaptSummary>,
    /// Iterations where the trigger kept the mesh.
    pub skipped: u32,
    /// Sequence indices written, in order.
    pub sequences: Vec<u32>,
    pub phases: Vec<PhaseRecord>,
    pub counters: StepCounters,
    /// Every state entered, in order.
    pub trace: Vec<LoopState>,
}

fn not_loaded() -> LoopError {
    LoopError::MeshVerification("no mesh loaded".into())
}

/// Control loop of one worker.
pub struct LoopDriver<'c, C: Communicator> {
    comm: &'c C,
    params: LoopParams,
    config: AdaptConfig,
    input: SolverInput,
    parts: Collaborators<C>,
    checkpoints: CheckpointWriter,
    mesh: Option<Mesh>,
    size_field: Option<Field>,
    geom: FieldStream,
    restart: FieldStream,
    counters: StepCounters,
    report: LoopReport,
}

impl<'c, C: Communicator> LoopDriver<'c, C> {
    pub fn new(
        comm: &'c C,
        params: LoopParams,
        config: AdaptConfig,
        input: SolverInput,
        parts: Collaborators<C>,
    ) -> Self {
        let checkpoints =
            CheckpointWriter::new(config.checkpoint_dir.clone(), config.checkpoint_prefix.clone());
        Self {
            comm,
            params,
            config,
            input,
            parts,
            checkpoints,
            mesh: None,
            size_field: None,
            geom: FieldStream::new(StreamKind::GeomRestart),
            restart: FieldStream::new(StreamKind::Restart),
            counters: StepCounters::default(),
            report: LoopReport::default(),
        }
    }

    pub fn counters(&self) -> StepCounters {
        self.counters
    }

    /// Run the loop to completion.
    pub fn run(mut self) -> Result<LoopReport, LoopError> {
        let mut state = LoopState::Load;
        loop {
            self.report.trace.push(state);
            log::trace!("rank {}: entering {state:?}", self.comm.rank());
            state = match state {
                LoopState::Load => self.load()?,
                LoopState::Solve => self.solve()?,
                LoopState::EvaluateTermination => self.evaluate_termination(),
                LoopState::PrepareAdapt => self.prepare_adapt()?,
                LoopState::DecideAdapt => self.decide_adapt()?,
                LoopState::Adapt => self.adapt()?,
                LoopState::Resume => self.resume()?,
                LoopState::Finalize => break,
            };
        }
        Ok(self.finalize())
    }

    fn write_sequence(&mut self) -> Result<(), LoopError> {
        let mesh = self.mesh.as_ref().ok_or_else(not_loaded)?;
        let seq = self.counters.next_sequence();
        self.checkpoints.write_sequence(mesh, seq, self.comm)?;
        self.report.sequences.push(seq);
        Ok(())
    }

    fn load(&mut self) -> Result<LoopState, LoopError> {
        let mesh = self.parts.source.load(&self.config, self.comm)?;
        mesh.verify()?;
        self.parts
            .preprocessor
            .preprocess(&mesh, &self.config, &mut self.geom, self.comm)?;
        self.mesh = Some(mesh);
        self.write_sequence()?;
        if self.counters.step >= self.params.max_step {
            rank0_info!(self.comm, "max step {} reached before the first solve", self.params.max_step);
            return Ok(LoopState::Finalize);
        }
        Ok(LoopState::Solve)
    }

    fn solve(&mut self) -> Result<LoopState, LoopError> {
        let mesh = self.mesh.as_ref().ok_or_else(not_loaded)?;
        mesh.verify()?;
        self.size_field = Some(self.parts.size.estimate_size(mesh)?);

        let previous = self.counters.step;
        let step = self.parts.solver.solve(
            &self.input,
            &mut self.geom,
            &mut self.restart,
            self.comm,
        )?;
        self.report.solves += 1;
        if step <= previous {
            return Err(LoopError::Solver(format!(
                "solver did not advance: returned step {step} after step {previous}"
            )));
        }
        self.counters.step = step;
        self.config = self.config.with_restart(step);
        self.geom.clear();
        rank0_info!(self.comm, "ran to step {step}");
        Ok(LoopState::EvaluateTermination)
    }

    fn evaluate_termination(&mut self) -> LoopState {
        if self.counters.step >= self.params.max_step {
            LoopState::Finalize
        } else {
            LoopState::PrepareAdapt
        }
    }

    fn prepare_adapt(&mut self) -> Result<LoopState, LoopError> {
        let step = self.counters.step;
        self.config = self.config.for_step(step);
        if step > 0 {
            rank0_info!(self.comm, "error based adapt {step}");
            rank0_debug!(
                self.comm,
                "attribute file `{}` step {step}",
                self.config.attribute_file_name
            );
        }
        let mesh = self.mesh.as_mut().ok_or_else(not_loaded)?;
        let (payload_step, attached) = read_and_attach_fields(&mut self.restart, mesh)?;
        log::debug!(
            "rank {}: attached {attached:?} from restart step {payload_step}",
            self.comm.rank()
        );
        self.parts
            .motion
            .update_coordinates(&self.config, mesh, step, self.params.case_id)?;
        mesh.debug_assert_invariants();
        Ok(LoopState::DecideAdapt)
    }

    fn decide_adapt(&mut self) -> Result<LoopState, LoopError> {
        let mesh = self.mesh.as_mut().ok_or_else(not_loaded)?;
        mesh.verify()?;
        let adapt_now = match self.config.adapt_trigger {
            AdaptTrigger::Always => true,
            AdaptTrigger::QualityGated => {
                if mesh.find_field(MESH_QUALITY_FIELD).is_none() {
                    let quality = self.parts.quality.compute_quality(mesh)?;
                    mesh.attach_field(quality)?;
                }
                !is_mesh_quality_good(mesh, self.config.mesh_quality_threshold, self.comm)?
            }
        };
        if adapt_now {
            Ok(LoopState::Adapt)
        } else {
            self.report.skipped += 1;
            Ok(LoopState::Resume)
        }
    }

    fn adapt(&mut self) -> Result<LoopState, LoopError> {
        let (start, elapsed) = self.counters.advance_phase();
        let record = self
            .checkpoints
            .write_phase(start, elapsed, self.comm.size(), self.comm)?;
        self.report.phases.push(record);
        self.write_sequence()?;

        let size_field = self
            .size_field
            .take()
            .ok_or_else(|| LoopError::MissingField("size".into()))?;
        let mesh = self.mesh.as_mut().ok_or_else(not_loaded)?;
        let summary = run_mesh_adapter(
            self.parts.adapter.as_mut(),
            &self.config,
            mesh,
            &size_field,
            self.counters.step,
            self.comm,
        )?;
        self.report.adaptations.push(summary);
        self.write_sequence()?;
        Ok(LoopState::Resume)
    }

    fn resume(&mut self) -> Result<LoopState, LoopError> {
        let mesh = self.mesh.as_ref().ok_or_else(not_loaded)?;
        self.parts
            .preprocessor
            .preprocess(mesh, &self.config, &mut self.geom, self.comm)?;
        self.restart.clear();
        Ok(LoopState::Solve)
    }

    fn finalize(mut self) -> LoopReport {
        rank0_info!(
            self.comm,
            "finished at step {} after {} solves and {} adaptations",
            self.counters.step,
            self.report.solves,
            self.report.adaptations.len()
        );
        let mut report = std::mem::take(&mut self.report);
        report.final_step = self.counters.step;
        report.counters = self.counters;
        // streams, size field and mesh are released here
        drop(self);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_counter_hands_out_consecutive_indices() {
        let mut c = StepCounters::default();
        assert_eq!(c.next_sequence(), 0);
        assert_eq!(c.next_sequence(), 1);
        assert_eq!(c.seq, 2);
    }

    #[test]
    fn phase_tracks_elapsed_steps() {
        let mut c = StepCounters::default();
        c.step = 3;
        assert_eq!(c.advance_phase(), (0, 3));
        assert_eq!(c.phase, 3);
        c.step = 7;
        assert_eq!(c.advance_phase(), (3, 4));
        assert_eq!(c.phase, 7);
    }
}
