//! Field transfer between mesh partitions and field streams.
//!
//! The geometric restart payload carries the partition itself: a
//! `coordinates` vertex field (3 components), a `connectivity` element
//! field (`dimension + 1` components holding local vertex indices) and,
//! when solution migration is on, every field attached to the mesh.
//! The restart payload carries solver output fields only.

use crate::data::field::{Association, Field};
use crate::data::stream::{FieldStream, StreamKind, StreamPayload};
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Reserved field name for vertex coordinates in geometry payloads.
pub const COORDINATES_FIELD: &str = "coordinates";
/// Reserved field name for element connectivity in geometry payloads.
pub const CONNECTIVITY_FIELD: &str = "connectivity";

/// Pack `mesh` into a geometry payload for `step`.
pub fn geometry_payload(mesh: &Mesh, step: u32, with_fields: bool) -> Result<StreamPayload, LoopError> {
    let coords: Vec<f64> = mesh.coords().iter().flatten().copied().collect();
    let width = mesh.dimension() + 1;
    let connectivity: Vec<f64> = mesh
        .elements()
        .iter()
        .flatten()
        .map(|&v| v as f64)
        .collect();
    let mut fields = vec![
        Field::from_values(COORDINATES_FIELD, Association::Vertex, 3, coords)?,
        Field::from_values(CONNECTIVITY_FIELD, Association::Element, width, connectivity)?,
    ];
    if with_fields {
        fields.extend(mesh.fields().cloned());
    }
    Ok(StreamPayload::new(step, fields))
}

/// Rebuild a partition (with its carried fields) from a geometry payload.
pub fn mesh_from_geometry(payload: &StreamPayload) -> Result<Mesh, LoopError> {
    let coords = payload
        .field(COORDINATES_FIELD)
        .ok_or_else(|| LoopError::MissingField(COORDINATES_FIELD.into()))?;
    let connectivity = payload
        .field(CONNECTIVITY_FIELD)
        .ok_or_else(|| LoopError::MissingField(CONNECTIVITY_FIELD.into()))?;
    if coords.components() != 3 {
        return Err(LoopError::FieldLengthMismatch {
            name: COORDINATES_FIELD.into(),
            expected: 3,
            found: coords.components(),
        });
    }
    let dimension = connectivity.components().saturating_sub(1);
    let vertices = coords
        .iter()
        .map(|(_, c)| [c[0], c[1], c[2]])
        .collect::<Vec<_>>();
    let elements = connectivity
        .iter()
        .map(|(_, ids)| {
            ids.iter()
                .map(|&v| {
                    if v < 0.0 || v.fract() != 0.0 {
                        Err(LoopError::MeshVerification(format!("bad vertex index {v}")))
                    } else {
                        Ok(v as usize)
                    }
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut mesh = Mesh::from_parts(dimension, vertices, elements)?;
    for field in &payload.fields {
        if field.name() != COORDINATES_FIELD && field.name() != CONNECTIVITY_FIELD {
            mesh.attach_field(field.clone())?;
        }
    }
    Ok(mesh)
}

/// Drain the restart stream and attach every field it carries to `mesh`.
///
/// Returns the step of the payload and the attached field names.
pub fn read_and_attach_fields(
    restart: &mut FieldStream,
    mesh: &mut Mesh,
) -> Result<(u32, Vec<String>), LoopError> {
    let payload = restart.open_for_read(StreamKind::Restart)?.decode()?;
    let mut names = Vec::with_capacity(payload.fields.len());
    for field in payload.fields {
        names.push(field.name().to_string());
        mesh.attach_field(field)?;
    }
    Ok((payload.step, names))
}
