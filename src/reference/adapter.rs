//! Size-driven vertex smoothing.
//!
//! Interior vertices move toward the size-weighted mean of their
//! neighbours, where a neighbour with a small target size pulls harder.
//! Topology never changes, so attached fields stay valid. A move that would
//! flip or collapse an incident element is rejected; boundary vertices
//! never move.

use crate::algs::communicator::Communicator;
use crate::config::AdaptConfig;
use crate::debug_invariants::DebugInvariants;
use crate::data::field::Field;
use crate::engines::MeshAdapter;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Signed length, area or volume of simplex `e`.
pub fn signed_measure(mesh: &Mesh, e: usize) -> f64 {
    let c = mesh.coords();
    let el = &mesh.elements()[e];
    let sub = |a: usize, b: usize| {
        [
            c[el[a]][0] - c[el[b]][0],
            c[el[a]][1] - c[el[b]][1],
            c[el[a]][2] - c[el[b]][2],
        ]
    };
    match mesh.dimension() {
        1 => sub(1, 0)[0],
        2 => {
            let (u, v) = (sub(1, 0), sub(2, 0));
            0.5 * (u[0] * v[1] - u[1] * v[0])
        }
        _ => {
            let (u, v, w) = (sub(1, 0), sub(2, 0), sub(3, 0));
            (u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
                + u[2] * (v[0] * w[1] - v[1] * w[0]))
                / 6.0
        }
    }
}

/// Reference adaptation engine.
#[derive(Clone, Debug)]
pub struct SmoothingAdapter {
    /// Fraction of the way each vertex moves per sweep.
    pub relaxation: f64,
    pub sweeps: usize,
    /// An element whose measure shrinks below this fraction of its
    /// original measure counts as collapsed.
    pub min_measure_ratio: f64,
}

impl Default for SmoothingAdapter {
    fn default() -> Self {
        Self {
            relaxation: 0.5,
            sweeps: 2,
            min_measure_ratio: 0.1,
        }
    }
}

impl SmoothingAdapter {
    /// One sweep; returns the number of vertices moved.
    pub fn sweep(&self, mesh: &mut Mesh, size: &Field) -> usize {
        let nv = mesh.num_vertices();
        let boundary = mesh.boundary_vertices();
        let mut neighbours = vec![Vec::new(); nv];
        for (a, b) in mesh.edges() {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
        let mut incident = vec![Vec::new(); nv];
        for (e, el) in mesh.elements().iter().enumerate() {
            for &v in el {
                incident[v].push(e);
            }
        }
        let reference: Vec<f64> = (0..mesh.num_elements())
            .map(|e| signed_measure(mesh, e))
            .collect();

        let mut moved = 0;
        for v in 0..nv {
            if boundary.contains(&v) || neighbours[v].is_empty() {
                continue;
            }
            let mut target = [0.0; 3];
            let mut total = 0.0;
            for &n in &neighbours[v] {
                let w = 1.0 / size.scalar_at(n).unwrap_or(1.0);
                for (t, x) in target.iter_mut().zip(mesh.coords()[n]) {
                    *t += w * x;
                }
                total += w;
            }
            let old = mesh.coords()[v];
            let mut new = old;
            for d in 0..3 {
                new[d] = old[d] + self.relaxation * (target[d] / total - old[d]);
            }
            mesh.coords_mut()[v] = new;
            let valid = incident[v].iter().all(|&e| {
                let m = signed_measure(mesh, e);
                m.signum() == reference[e].signum()
                    && m.abs() >= self.min_measure_ratio * reference[e].abs()
            });
            if valid {
                moved += 1;
            } else {
                mesh.coords_mut()[v] = old;
            }
        }
        moved
    }
}

impl<C: Communicator> MeshAdapter<C> for SmoothingAdapter {
    fn adapt(
        &mut self,
        config: &AdaptConfig,
        mesh: &mut Mesh,
        size_field: &Field,
        step: u32,
        comm: &C,
    ) -> Result<(), LoopError> {
        if !config.adapt_flag {
            log::debug!("rank {}: adapt flag off at step {step}", comm.rank());
        }
        let mut moved = 0;
        for _ in 0..self.sweeps {
            moved += self.sweep(mesh, size_field);
        }
        mesh.debug_assert_invariants();
        let mut total = [moved as u64];
        comm.allreduce_sum_u64(&mut total)?;
        rank0_info!(comm, "smoothing moved {} vertices at step {step}", total[0]);
        Ok(())
    }
}
