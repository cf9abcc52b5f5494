//! Explicit diffusion of a vertex scalar on the mesh graph.

use crate::algs::communicator::Communicator;
use crate::algs::field_transfer::mesh_from_geometry;
use crate::config::SolverInput;
use crate::data::field::{Association, Field};
use crate::data::stream::{FieldStream, StreamKind, StreamPayload};
use crate::engines::{QualityEstimator, Solver};
use crate::loop_error::LoopError;
use crate::mesh::Mesh;
use crate::reference::quality::EdgeRatioQuality;

/// Vertex solution written to the restart stream.
pub const SOLUTION_FIELD: &str = "solution";
/// Per-element error indicator written to the restart stream.
pub const ERROR_FIELD: &str = "errorIndicator";

/// Solver input key: steps advanced per call.
pub const KEY_STEPS: &str = "Number of Timesteps";
/// Solver input key: relaxation weight of one explicit step.
pub const KEY_DT: &str = "Time Step Size";

/// Reference solver.
///
/// Reads the partition from the geometric restart stream, relaxes
/// `solution` toward the mean of its graph neighbours for `Number of
/// Timesteps` steps and writes `solution`, `errorIndicator` and `meshQ` to
/// the restart stream. The step count persists across calls.
#[derive(Clone, Debug, Default)]
pub struct DiffusionSolver {
    current_step: u32,
}

impl DiffusionSolver {
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    fn initial_solution(mesh: &Mesh) -> Vec<f64> {
        mesh.coords()
            .iter()
            .map(|c| (std::f64::consts::PI * c[0]).sin() + c[1] * c[1] + c[2])
            .collect()
    }

    fn neighbours(mesh: &Mesh) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); mesh.num_vertices()];
        for (a, b) in mesh.edges() {
            adj[a].push(b);
            adj[b].push(a);
        }
        adj
    }

    fn relax(u: &mut Vec<f64>, adj: &[Vec<usize>], dt: f64) {
        let next: Vec<f64> = u
            .iter()
            .enumerate()
            .map(|(i, &ui)| {
                if adj[i].is_empty() {
                    return ui;
                }
                let mean = adj[i].iter().map(|&j| u[j]).sum::<f64>() / adj[i].len() as f64;
                ui + dt * (mean - ui)
            })
            .collect();
        *u = next;
    }

    fn error_indicator(mesh: &Mesh, u: &[f64]) -> Vec<f64> {
        mesh.elements()
            .iter()
            .map(|element| {
                let (lo, hi) = element
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(u[v]), hi.max(u[v]))
                    });
                hi - lo
            })
            .collect()
    }
}

impl<C: Communicator> Solver<C> for DiffusionSolver {
    fn solve(
        &mut self,
        input: &SolverInput,
        geom: &mut FieldStream,
        restart: &mut FieldStream,
        comm: &C,
    ) -> Result<u32, LoopError> {
        let steps: u32 = input.get_parsed(KEY_STEPS)?.unwrap_or(1);
        let dt: f64 = input.get_parsed(KEY_DT)?.unwrap_or(0.25);
        if steps == 0 {
            return Err(LoopError::Solver(format!("`{KEY_STEPS}` must be positive")));
        }
        if !(dt > 0.0 && dt <= 1.0) {
            return Err(LoopError::Solver(format!(
                "`{KEY_DT}` must lie in (0, 1], got {dt}"
            )));
        }

        let payload = geom.open_for_read(StreamKind::GeomRestart)?.decode()?;
        let mesh = mesh_from_geometry(&payload)?;
        let mut u = match mesh.find_field(SOLUTION_FIELD) {
            Some(f) if f.association() == Association::Vertex && f.components() == 1 => {
                f.values().to_vec()
            }
            _ => Self::initial_solution(&mesh),
        };

        let adj = Self::neighbours(&mesh);
        for _ in 0..steps {
            Self::relax(&mut u, &adj, dt);
        }
        self.current_step += steps;

        let error = Self::error_indicator(&mesh, &u);
        let quality = EdgeRatioQuality.compute_quality(&mesh)?;
        let out = StreamPayload::new(
            self.current_step,
            vec![
                Field::scalar(SOLUTION_FIELD, Association::Vertex, u),
                Field::scalar(ERROR_FIELD, Association::Element, error),
                quality,
            ],
        );
        restart.write(&out)?;
        log::debug!(
            "rank {}: diffusion advanced {steps} steps to {}",
            comm.rank(),
            self.current_step
        );
        Ok(self.current_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::field_transfer::geometry_payload;
    use crate::mesh_generation::triangle_mesh;

    fn primed_geom(mesh: &Mesh) -> FieldStream {
        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        geom.write(&geometry_payload(mesh, 0, true).unwrap()).unwrap();
        geom
    }

    #[test]
    fn advances_and_writes_restart_fields() {
        let mesh = triangle_mesh(3, 3, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let input = SolverInput::parse("Number of Timesteps: 2", "").unwrap();
        let mut solver = DiffusionSolver::default();
        let mut geom = primed_geom(&mesh);
        let mut rs = FieldStream::new(StreamKind::Restart);
        let step = solver.solve(&input, &mut geom, &mut rs, &NoComm).unwrap();
        assert_eq!(step, 2);

        let out = rs.open_for_read(StreamKind::Restart).unwrap().decode().unwrap();
        assert_eq!(out.step, 2);
        assert_eq!(out.field(SOLUTION_FIELD).unwrap().len(), mesh.num_vertices());
        assert_eq!(out.field(ERROR_FIELD).unwrap().len(), mesh.num_elements());
        assert!(out.field(crate::data::field::MESH_QUALITY_FIELD).is_some());
    }

    #[test]
    fn diffusion_shrinks_the_range() {
        let mesh = triangle_mesh(4, 4, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let u0 = DiffusionSolver::initial_solution(&mesh);
        let mut u = u0.clone();
        let adj = DiffusionSolver::neighbours(&mesh);
        for _ in 0..10 {
            DiffusionSolver::relax(&mut u, &adj, 0.5);
        }
        let range = |v: &[f64]| {
            v.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
                - v.iter().cloned().fold(f64::INFINITY, f64::min)
        };
        assert!(range(&u) < range(&u0));
    }

    #[test]
    fn requires_a_written_geometry_stream() {
        let input = SolverInput::default();
        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        let mut rs = FieldStream::new(StreamKind::Restart);
        let err = DiffusionSolver::default()
            .solve(&input, &mut geom, &mut rs, &NoComm)
            .unwrap_err();
        assert!(matches!(err, LoopError::EmptyStream { .. }));
    }

    #[test]
    fn rejects_bad_step_size() {
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let input = SolverInput::parse("Time Step Size: 2.5", "").unwrap();
        let mut geom = primed_geom(&mesh);
        let mut rs = FieldStream::new(StreamKind::Restart);
        let err = DiffusionSolver::default()
            .solve(&input, &mut geom, &mut rs, &NoComm)
            .unwrap_err();
        assert!(matches!(err, LoopError::Solver(_)));
    }
}
