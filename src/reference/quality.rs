use crate::data::field::{Association, Field, MESH_QUALITY_FIELD};
use crate::engines::QualityEstimator;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Shortest over longest edge of each element, in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeRatioQuality;

impl EdgeRatioQuality {
    pub fn element_quality(mesh: &Mesh, e: usize) -> f64 {
        let Some(lengths) = mesh.element_edge_lengths(e) else {
            return 0.0;
        };
        let (min, max) = lengths
            .iter()
            .fold((f64::INFINITY, 0.0f64), |(lo, hi), &l| (lo.min(l), hi.max(l)));
        if max > 0.0 { min / max } else { 0.0 }
    }
}

impl QualityEstimator for EdgeRatioQuality {
    fn compute_quality(&self, mesh: &Mesh) -> Result<Field, LoopError> {
        let values = (0..mesh.num_elements())
            .map(|e| Self::element_quality(mesh, e))
            .collect();
        Ok(Field::scalar(MESH_QUALITY_FIELD, Association::Element, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::triangle_mesh;

    #[test]
    fn right_triangles_score_inverse_sqrt_two() {
        let mesh = triangle_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let q = EdgeRatioQuality.compute_quality(&mesh).unwrap();
        assert_eq!(q.name(), MESH_QUALITY_FIELD);
        for (_, v) in q.iter() {
            assert!((v[0] - 1.0 / 2f64.sqrt()).abs() < 1e-12);
        }
    }

    #[test]
    fn stretched_cells_score_lower() {
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [10.0, 1.0]).unwrap();
        let q = EdgeRatioQuality.compute_quality(&mesh).unwrap();
        assert!(q.min_scalar() < 0.2);
    }
}
