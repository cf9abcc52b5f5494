//! Mesh: the local partition of the distributed simplicial mesh.
//!
//! Each worker owns one `Mesh`: vertex coordinates, top-dimension simplex
//! connectivity in local vertex indices, and the named fields attached to
//! vertices or elements. Cross-partition consistency is the adaptation
//! engine's business; the loop only verifies each partition locally.
//!
//! # Invariants
//! - `1 <= dimension <= 3`.
//! - Every element lists exactly `dimension + 1` distinct, in-range vertices.
//! - Every coordinate is finite.
//! - Every attached field covers exactly the entities of its association.
//!
//! These are checked by [`Mesh::verify`] and, in debug builds, after each
//! mutation that could break them.

use crate::data::field::{Association, Field};
use crate::debug_invariants::DebugInvariants;
use crate::loop_error::LoopError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Local mesh partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    dimension: usize,
    coords: Vec<[f64; 3]>,
    elements: Vec<Vec<usize>>,
    fields: BTreeMap<String, Field>,
}

impl Mesh {
    /// Build a partition from coordinates and simplex connectivity.
    ///
    /// # Errors
    /// `MeshVerification` if the result violates any mesh invariant.
    pub fn from_parts(
        dimension: usize,
        coords: Vec<[f64; 3]>,
        elements: Vec<Vec<usize>>,
    ) -> Result<Self, LoopError> {
        let mesh = Self {
            dimension,
            coords,
            elements,
            fields: BTreeMap::new(),
        };
        mesh.verify()?;
        Ok(mesh)
    }

    /// Topological dimension of the elements.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_vertices(&self) -> usize {
        self.coords.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Number of entities carrying a slice for `association`.
    pub fn count(&self, association: Association) -> usize {
        match association {
            Association::Vertex => self.num_vertices(),
            Association::Element => self.num_elements(),
        }
    }

    pub fn coords(&self) -> &[[f64; 3]] {
        &self.coords
    }

    /// Mutable coordinates; topology and fields are untouched.
    pub fn coords_mut(&mut self) -> &mut [[f64; 3]] {
        &mut self.coords
    }

    pub fn elements(&self) -> &[Vec<usize>] {
        &self.elements
    }

    /// Look up an attached field.
    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn find_field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    /// Attach `field`, replacing any field with the same name.
    ///
    /// # Errors
    /// `FieldLengthMismatch` if the field does not cover this partition.
    pub fn attach_field(&mut self, field: Field) -> Result<Option<Field>, LoopError> {
        field.check_len(self.count(field.association()))?;
        Ok(self.fields.insert(field.name().to_string(), field))
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        self.fields.remove(name)
    }

    /// Attached fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Unique undirected edges `(a, b)` with `a < b`, in sorted order.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.elements
            .iter()
            .flat_map(|element| element.iter().copied().tuple_combinations())
            .map(|(a, b): (usize, usize)| (a.min(b), a.max(b)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Edge lengths of element `e`, one per vertex pair.
    pub fn element_edge_lengths(&self, e: usize) -> Option<Vec<f64>> {
        let element = self.elements.get(e)?;
        Some(
            element
                .iter()
                .tuple_combinations()
                .map(|(&a, &b)| distance(self.coords[a], self.coords[b]))
                .collect(),
        )
    }

    /// Vertices lying on the partition boundary.
    ///
    /// A facet (element minus one vertex) owned by a single element is a
    /// boundary facet; its vertices are boundary vertices.
    pub fn boundary_vertices(&self) -> BTreeSet<usize> {
        let mut facet_count: HashMap<Vec<usize>, usize> = HashMap::new();
        for element in &self.elements {
            for skip in 0..element.len() {
                let mut facet: Vec<usize> = element
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != skip)
                    .map(|(_, &v)| v)
                    .collect();
                facet.sort_unstable();
                *facet_count.entry(facet).or_insert(0) += 1;
            }
        }
        facet_count
            .into_iter()
            .filter(|&(_, n)| n == 1)
            .flat_map(|(facet, _)| facet)
            .collect()
    }

    /// Structural consistency check.
    ///
    /// # Errors
    /// `MeshVerification` describing the first violated invariant, or
    /// `FieldLengthMismatch` for a field that no longer fits the mesh.
    pub fn verify(&self) -> Result<(), LoopError> {
        if !(1..=3).contains(&self.dimension) {
            return Err(LoopError::MeshVerification(format!(
                "unsupported dimension {}",
                self.dimension
            )));
        }
        let nv = self.coords.len();
        for (i, c) in self.coords.iter().enumerate() {
            if c.iter().any(|x| !x.is_finite()) {
                return Err(LoopError::MeshVerification(format!(
                    "vertex {i} has non-finite coordinates {c:?}"
                )));
            }
        }
        let width = self.dimension + 1;
        for (e, element) in self.elements.iter().enumerate() {
            if element.len() != width {
                return Err(LoopError::MeshVerification(format!(
                    "element {e} has {} vertices, expected {width}",
                    element.len()
                )));
            }
            if let Some(&v) = element.iter().find(|&&v| v >= nv) {
                return Err(LoopError::MeshVerification(format!(
                    "element {e} references vertex {v} of {nv}"
                )));
            }
            let distinct: BTreeSet<_> = element.iter().collect();
            if distinct.len() != element.len() {
                return Err(LoopError::MeshVerification(format!(
                    "element {e} repeats a vertex: {element:?}"
                )));
            }
        }
        for field in self.fields.values() {
            field.check_len(self.count(field.association()))?;
        }
        Ok(())
    }
}

impl DebugInvariants for Mesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.verify(), "Mesh");
    }

    fn validate_invariants(&self) -> Result<(), LoopError> {
        self.verify()
    }
}

static_assertions::assert_impl_all!(Mesh: Send, Sync);

#[inline]
pub(crate) fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Mesh {
        Mesh::from_parts(
            2,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![vec![0, 1, 2], vec![0, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn edges_are_unique_and_sorted() {
        let m = two_triangles();
        assert_eq!(m.edges(), vec![(0, 1), (0, 2), (0, 3), (1, 2), (2, 3)]);
    }

    #[test]
    fn all_vertices_of_a_square_are_boundary() {
        let m = two_triangles();
        assert_eq!(m.boundary_vertices().len(), 4);
    }

    #[test]
    fn verify_rejects_bad_connectivity() {
        let err = Mesh::from_parts(2, vec![[0.0; 3], [1.0, 0.0, 0.0]], vec![vec![0, 1, 5]]);
        assert!(matches!(err, Err(LoopError::MeshVerification(_))));
        let err = Mesh::from_parts(2, vec![[0.0; 3], [1.0, 0.0, 0.0]], vec![vec![0, 1, 1]]);
        assert!(matches!(err, Err(LoopError::MeshVerification(_))));
        let err = Mesh::from_parts(2, vec![[0.0; 3]], vec![vec![0]]);
        assert!(matches!(err, Err(LoopError::MeshVerification(_))));
    }

    #[test]
    fn verify_catches_non_finite_coords() {
        let mut m = two_triangles();
        m.coords_mut()[2][0] = f64::NAN;
        assert!(m.verify().is_err());
    }

    #[test]
    fn attach_checks_field_length() {
        let mut m = two_triangles();
        let bad = Field::scalar("q", Association::Element, vec![1.0]);
        assert!(m.attach_field(bad).is_err());
        let good = Field::scalar("q", Association::Element, vec![1.0, 0.5]);
        assert!(m.attach_field(good).unwrap().is_none());
        assert_eq!(m.find_field("q").unwrap().len(), 2);
        assert_eq!(m.field_names().collect::<Vec<_>>(), vec!["q"]);
    }
}
