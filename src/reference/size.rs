use crate::data::field::{Association, Field};
use crate::engines::SizeEstimator;
use crate::loop_error::LoopError;
use crate::mesh::{distance, Mesh};

/// Name of the field produced by [`IsoSize`].
pub const SIZE_FIELD: &str = "size";

/// Isotropic size field taken from the current mesh.
///
/// Each vertex gets the mean length of its incident edges, so adapting
/// toward this field keeps the resolution the mesh already has. Isolated
/// vertices get the mean edge length of the whole partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsoSize;

impl SizeEstimator for IsoSize {
    fn estimate_size(&self, mesh: &Mesh) -> Result<Field, LoopError> {
        let nv = mesh.num_vertices();
        let mut sum = vec![0.0; nv];
        let mut count = vec![0usize; nv];
        let mut total = 0.0;
        let edges = mesh.edges();
        for &(a, b) in &edges {
            let len = distance(mesh.coords()[a], mesh.coords()[b]);
            sum[a] += len;
            sum[b] += len;
            count[a] += 1;
            count[b] += 1;
            total += len;
        }
        let fallback = if edges.is_empty() {
            1.0
        } else {
            total / edges.len() as f64
        };
        let values = sum
            .into_iter()
            .zip(count)
            .map(|(s, n)| if n == 0 { fallback } else { s / n as f64 })
            .collect();
        Ok(Field::scalar(SIZE_FIELD, Association::Vertex, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::triangle_mesh;

    #[test]
    fn corner_vertex_averages_its_edges() {
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let size = IsoSize.estimate_size(&mesh).unwrap();
        assert_eq!(size.len(), 4);
        // vertex 1 touches two unit edges
        assert!((size.scalar_at(1).unwrap() - 1.0).abs() < 1e-12);
        // vertex 0 also touches the diagonal
        let expected = (2.0 + 2f64.sqrt()) / 3.0;
        assert!((size.scalar_at(0).unwrap() - expected).abs() < 1e-12);
    }
}
