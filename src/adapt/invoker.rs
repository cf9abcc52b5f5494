//! Adaptation invoker: glue between the driver and the adaptation engine.

use crate::algs::communicator::Communicator;
use crate::config::AdaptConfig;
use crate::data::field::{Association, Field, MESH_QUALITY_FIELD};
use crate::engines::MeshAdapter;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Partition sizes before and after one adaptation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdaptSummary {
    pub step: u32,
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub elements_before: usize,
    pub elements_after: usize,
}

fn check_size_field(mesh: &Mesh, size_field: &Field) -> Result<(), LoopError> {
    if size_field.association() != Association::Vertex || size_field.components() != 1 {
        return Err(LoopError::FieldLengthMismatch {
            name: size_field.name().to_string(),
            expected: mesh.num_vertices(),
            found: size_field.len(),
        });
    }
    size_field.check_len(mesh.num_vertices())?;
    if let Some((v, s)) = size_field
        .iter()
        .find(|(_, s)| !(s[0].is_finite() && s[0] > 0.0))
    {
        return Err(LoopError::MeshVerification(format!(
            "size field `{}` has invalid target size {} at vertex {v}",
            size_field.name(),
            s[0]
        )));
    }
    Ok(())
}

/// Adapt `mesh` in place toward `size_field` at `step`.
///
/// Collective. Without solution migration the attached fields are dropped
/// before the engine runs. The quality field is always dropped afterwards
/// since it describes the old elements.
pub fn run_mesh_adapter<C: Communicator>(
    adapter: &mut dyn MeshAdapter<C>,
    config: &AdaptConfig,
    mesh: &mut Mesh,
    size_field: &Field,
    step: u32,
    comm: &C,
) -> Result<AdaptSummary, LoopError> {
    check_size_field(mesh, size_field)?;
    let vertices_before = mesh.num_vertices();
    let elements_before = mesh.num_elements();

    if !config.solution_migration {
        let names: Vec<String> = mesh.field_names().map(str::to_string).collect();
        for name in names {
            mesh.remove_field(&name);
        }
        rank0_debug!(comm, "solution migration off; dropped attached fields");
    }

    rank0_info!(
        comm,
        "adapting at step {step} with strategy {:?} (split factor {}, tetrahedronize {})",
        config.adapt_strategy,
        config.split_factor,
        config.tetrahedronize
    );
    adapter.adapt(config, mesh, size_field, step, comm)?;
    mesh.remove_field(MESH_QUALITY_FIELD);
    mesh.verify()?;

    let summary = AdaptSummary {
        step,
        vertices_before,
        vertices_after: mesh.num_vertices(),
        elements_before,
        elements_after: mesh.num_elements(),
    };
    log::debug!("rank {}: {summary:?}", comm.rank());
    Ok(summary)
}
