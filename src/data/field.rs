//! Field: named per-entity data attached to a mesh partition.
//!
//! A `Field` stores `components` values per entity in one contiguous
//! buffer, the way a section packs degrees of freedom behind an atlas.
//! Entities are addressed by their local index within the association
//! (vertex index or element index).

use crate::loop_error::LoopError;
use serde::{Deserialize, Serialize};

/// Name of the per-element quality field consumed by the quality gate.
pub const MESH_QUALITY_FIELD: &str = "meshQ";

/// Mesh entities a field is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Association {
    /// One slice per mesh vertex.
    Vertex,
    /// One slice per top-dimension element.
    Element,
}

/// Named scalar or vector attribute over mesh entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    association: Association,
    components: usize,
    values: Vec<f64>,
}

impl Field {
    /// Zero-initialized field over `count` entities.
    pub fn zeros(
        name: impl Into<String>,
        association: Association,
        components: usize,
        count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            association,
            components,
            values: vec![0.0; components * count],
        }
    }

    /// Build a field from an existing buffer.
    ///
    /// # Errors
    /// `FieldLengthMismatch` if `values.len()` is not a multiple of
    /// `components`, or `components == 0`.
    pub fn from_values(
        name: impl Into<String>,
        association: Association,
        components: usize,
        values: Vec<f64>,
    ) -> Result<Self, LoopError> {
        let name = name.into();
        if components == 0 || values.len() % components != 0 {
            let expected = if components == 0 {
                0
            } else {
                values.len().div_ceil(components) * components
            };
            return Err(LoopError::FieldLengthMismatch {
                name,
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            name,
            association,
            components,
            values,
        })
    }

    /// Scalar field with one value per entity.
    pub fn scalar(name: impl Into<String>, association: Association, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            association,
            components: 1,
            values,
        }
    }

    /// Name the field is attached under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entities the field is attached to.
    pub fn association(&self) -> Association {
        self.association
    }

    /// Values per entity.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Number of entities carrying a slice.
    pub fn len(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    /// True if the field holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flat view of all values in entity order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable flat view of all values.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Read-only slice for entity `i`.
    ///
    /// Returns `None` if `i` is out of range.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&[f64]> {
        let start = i.checked_mul(self.components)?;
        self.values.get(start..start + self.components)
    }

    /// Scalar value of component 0 at entity `i`.
    #[inline]
    pub fn scalar_at(&self, i: usize) -> Option<f64> {
        self.get(i).and_then(|s| s.first().copied())
    }

    /// Overwrite the slice for entity `i`.
    pub fn try_set(&mut self, i: usize, val: &[f64]) -> Result<(), LoopError> {
        if val.len() != self.components {
            return Err(LoopError::FieldLengthMismatch {
                name: self.name.clone(),
                expected: self.components,
                found: val.len(),
            });
        }
        let count = self.len();
        let start = i * self.components;
        let target = self
            .values
            .get_mut(start..start + self.components)
            .ok_or_else(|| LoopError::FieldLengthMismatch {
                name: self.name.clone(),
                expected: count,
                found: i + 1,
            })?;
        target.copy_from_slice(val);
        Ok(())
    }

    /// Iterate `(entity, slice)` in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f64])> {
        self.values.chunks_exact(self.components.max(1)).enumerate()
    }

    /// Check that the field covers exactly `count` entities.
    pub fn check_len(&self, count: usize) -> Result<(), LoopError> {
        if self.len() != count || self.values.len() != count * self.components {
            return Err(LoopError::FieldLengthMismatch {
                name: self.name.clone(),
                expected: count,
                found: self.len(),
            });
        }
        Ok(())
    }

    /// Smallest component-0 value, `+inf` for an empty field.
    pub fn min_scalar(&self) -> f64 {
        self.iter()
            .filter_map(|(_, s)| s.first().copied())
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_field_slices() {
        let mut f = Field::zeros("velocity", Association::Vertex, 3, 2);
        f.try_set(1, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.get(0).unwrap(), &[0.0, 0.0, 0.0]);
        assert_eq!(f.get(1).unwrap(), &[1.0, 2.0, 3.0]);
        assert!(f.get(2).is_none());
    }

    #[test]
    fn set_rejects_wrong_width_and_range() {
        let mut f = Field::zeros("p", Association::Element, 1, 2);
        assert!(f.try_set(0, &[1.0, 2.0]).is_err());
        assert!(f.try_set(5, &[1.0]).is_err());
    }

    #[test]
    fn from_values_checks_components() {
        let err = Field::from_values("v", Association::Vertex, 2, vec![1.0, 2.0, 3.0]);
        assert!(matches!(err, Err(LoopError::FieldLengthMismatch { .. })));
        let ok = Field::from_values("v", Association::Vertex, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn min_scalar_of_empty_is_infinite() {
        let f = Field::scalar(MESH_QUALITY_FIELD, Association::Element, vec![]);
        assert_eq!(f.min_scalar(), f64::INFINITY);
        let g = Field::scalar(MESH_QUALITY_FIELD, Association::Element, vec![0.5, 0.1, 0.9]);
        assert_eq!(g.min_scalar(), 0.1);
    }
}
