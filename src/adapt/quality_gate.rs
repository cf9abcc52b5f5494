//! Mesh quality gate: is the distributed mesh good enough to keep?
//!
//! Every worker computes the minimum of `meshQ` over its own elements, the
//! group reduces to the global minimum, and a barrier keeps any worker from
//! acting on the answer before all of them have it. The mesh is good iff the
//! global minimum is at least the threshold, so one bad element on one
//! worker makes the whole mesh bad.

use crate::algs::communicator::Communicator;
use crate::data::field::{Association, MESH_QUALITY_FIELD};
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Local minimum of the quality field; `+inf` on an empty partition.
///
/// # Errors
/// - `MissingField` if `meshQ` is not attached.
/// - `FieldLengthMismatch` if it is not an element field.
pub fn local_min_quality(mesh: &Mesh) -> Result<f64, LoopError> {
    let meshq = mesh
        .find_field(MESH_QUALITY_FIELD)
        .ok_or_else(|| LoopError::MissingField(MESH_QUALITY_FIELD.into()))?;
    if meshq.association() != Association::Element {
        return Err(LoopError::FieldLengthMismatch {
            name: MESH_QUALITY_FIELD.into(),
            expected: mesh.num_elements(),
            found: meshq.len(),
        });
    }
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        let width = meshq.components();
        Ok(meshq
            .values()
            .par_chunks(width)
            .map(|s| s[0])
            .reduce(|| f64::INFINITY, f64::min))
    }
    #[cfg(not(feature = "rayon"))]
    {
        Ok(meshq.min_scalar())
    }
}

/// Collective: true iff every element on every worker has quality ≥ `threshold`.
///
/// Must be called by all workers of `comm`.
pub fn is_mesh_quality_good<C: Communicator>(
    mesh: &Mesh,
    threshold: f64,
    comm: &C,
) -> Result<bool, LoopError> {
    let local = local_min_quality(mesh)?;
    let global = comm.allreduce_min_f64(local)?;
    comm.barrier()?;
    let good = global >= threshold;
    if good {
        rank0_info!(comm, "Mesh is good (min quality {global:.4} >= {threshold}); no need for adaptation");
    } else {
        rank0_info!(comm, "Mesh quality {global:.4} below {threshold}; adaptation required");
    }
    Ok(good)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use crate::data::field::Field;
    use crate::mesh_generation::triangle_mesh;

    fn mesh_with_quality(values: Vec<f64>) -> Mesh {
        let mut m = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        m.attach_field(Field::scalar(MESH_QUALITY_FIELD, Association::Element, values))
            .unwrap();
        m
    }

    #[test]
    fn missing_field_is_an_invariant_error() {
        let m = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        assert_eq!(
            is_mesh_quality_good(&m, 0.2, &NoComm),
            Err(LoopError::MissingField(MESH_QUALITY_FIELD.into()))
        );
    }

    #[test]
    fn vertex_quality_field_is_rejected() {
        let mut m = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        m.attach_field(Field::scalar(MESH_QUALITY_FIELD, Association::Vertex, vec![1.0; 4]))
            .unwrap();
        assert!(local_min_quality(&m).is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let m = mesh_with_quality(vec![0.2, 0.9]);
        assert!(is_mesh_quality_good(&m, 0.2, &NoComm).unwrap());
        assert!(!is_mesh_quality_good(&m, 0.2000001, &NoComm).unwrap());
    }

    #[test]
    fn one_bad_element_on_one_worker_fails_all() {
        let verdicts = ThreadComm::run(3, |comm| {
            let q = if comm.rank() == 1 {
                vec![0.9, 0.05]
            } else {
                vec![0.9, 0.8]
            };
            is_mesh_quality_good(&mesh_with_quality(q), 0.2, &comm).unwrap()
        });
        assert_eq!(verdicts, vec![false, false, false]);
    }

    #[test]
    fn all_workers_good() {
        let verdicts = ThreadComm::run(2, |comm| {
            is_mesh_quality_good(&mesh_with_quality(vec![0.5, 0.5]), 0.2, &comm).unwrap()
        });
        assert_eq!(verdicts, vec![true, true]);
    }
}
