//! Vertex geometry container
//!
//! [`BufferGeometry`] owns a name→attribute map, an optional index buffer,
//! material groups addressing sub-ranges, and lazily computed bounding
//! volumes. The bounds caches are invalidated only by an explicit recompute
//! call: attribute mutation does not auto-invalidate them, so callers must
//! re-invoke `compute_bounding_box`/`compute_bounding_sphere` after edits.

use std::collections::HashMap;

use thiserror::Error;

use super::attribute::{AttributeData, AttributeError, BufferAttribute};
use super::bounds::{Aabb, BoundingSphere};
use super::ATTRIBUTE_POSITION;
use crate::foundation::math::Vec3;

/// Errors raised by geometry operations that indicate caller bugs
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Operation requires a `position` attribute
    #[error("geometry has no position attribute")]
    MissingPosition,

    /// Index buffer references a vertex past the end of the attributes
    #[error("index value {index} exceeds vertex count {count}")]
    IndexOutOfRange {
        /// Offending index value
        index: u32,
        /// Number of vertices available
        count: usize,
    },

    /// Forwarded attribute accessor failure
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Sub-range of the geometry drawn with one material slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    /// First index (or vertex, when non-indexed) of the range
    pub start: usize,
    /// Number of indices (or vertices) in the range
    pub count: usize,
    /// Slot into the mesh's material list
    pub material_index: usize,
}

/// Per-vertex typed data plus index buffer and cached bounding volumes
#[derive(Debug, Clone, Default)]
pub struct BufferGeometry {
    /// Optional debug name
    pub name: String,
    attributes: HashMap<String, BufferAttribute>,
    morph_positions: Vec<BufferAttribute>,
    index: Option<BufferAttribute>,
    groups: Vec<GeometryGroup>,
    draw_range: Option<(usize, usize)>,
    bounding_box: Option<Aabb>,
    bounding_sphere: Option<BoundingSphere>,
}

impl BufferGeometry {
    /// Create an empty geometry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an attribute under a name, replacing any previous one
    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: BufferAttribute) {
        self.attributes.insert(name.into(), attribute);
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.get(name)
    }

    /// Look up an attribute by name for mutation
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut BufferAttribute> {
        self.attributes.get_mut(name)
    }

    /// Remove an attribute by name
    pub fn remove_attribute(&mut self, name: &str) -> Option<BufferAttribute> {
        self.attributes.remove(name)
    }

    /// Iterate attributes in deterministic (name-sorted) order
    pub fn attributes_sorted(&self) -> Vec<(&str, &BufferAttribute)> {
        let mut entries: Vec<_> = self
            .attributes
            .iter()
            .map(|(name, attribute)| (name.as_str(), attribute))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// Append a morph position target
    pub fn add_morph_positions(&mut self, attribute: BufferAttribute) {
        self.morph_positions.push(attribute);
    }

    /// Morph position targets
    pub fn morph_positions(&self) -> &[BufferAttribute] {
        &self.morph_positions
    }

    /// Set the index buffer, choosing the narrowest integer width
    ///
    /// Storage is 16-bit unless any index is ≥ 65535, else 32-bit. The width
    /// is final once chosen here; upload uses it as-is.
    pub fn set_index(&mut self, indices: &[u32]) {
        let wide = indices.iter().any(|&i| i >= u32::from(u16::MAX));
        let data = if wide {
            AttributeData::U32(indices.to_vec())
        } else {
            AttributeData::U16(indices.iter().map(|&i| i as u16).collect())
        };
        // item_size 1 over a flat list can never misalign
        self.index = Some(BufferAttribute::new(data, 1).unwrap_or_else(|_| unreachable!()));
    }

    /// Drop the index buffer
    pub fn clear_index(&mut self) {
        self.index = None;
    }

    /// The index attribute, when the geometry is indexed
    pub fn index(&self) -> Option<&BufferAttribute> {
        self.index.as_ref()
    }

    /// The index attribute for mutation
    pub fn index_mut(&mut self) -> Option<&mut BufferAttribute> {
        self.index.as_mut()
    }

    /// Read one index value widened to `u32`
    pub fn index_at(&self, i: usize) -> Option<u32> {
        let index = self.index.as_ref()?;
        match index.data() {
            AttributeData::U16(v) => v.get(i).map(|&x| u32::from(x)),
            AttributeData::U32(v) => v.get(i).copied(),
            _ => None,
        }
    }

    /// Add a material group over an index/vertex sub-range
    pub fn add_group(&mut self, start: usize, count: usize, material_index: usize) {
        self.groups.push(GeometryGroup {
            start,
            count,
            material_index,
        });
    }

    /// Material groups in insertion order
    pub fn groups(&self) -> &[GeometryGroup] {
        &self.groups
    }

    /// Clear all material groups
    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    /// Restrict drawing to a sub-range (start, count)
    pub fn set_draw_range(&mut self, start: usize, count: usize) {
        self.draw_range = Some((start, count));
    }

    /// The active draw range, when set
    pub fn draw_range(&self) -> Option<(usize, usize)> {
        self.draw_range
    }

    /// Number of vertices in the position attribute
    pub fn vertex_count(&self) -> usize {
        self.attribute(ATTRIBUTE_POSITION)
            .map_or(0, BufferAttribute::count)
    }

    /// Number of elements a draw covers (indices when indexed, else vertices)
    pub fn draw_count(&self) -> usize {
        let full = self
            .index
            .as_ref()
            .map_or_else(|| self.vertex_count(), BufferAttribute::count);
        match self.draw_range {
            Some((start, count)) => full.saturating_sub(start).min(count),
            None => full,
        }
    }

    /// Cached bounding box, if computed
    pub fn bounding_box(&self) -> Option<&Aabb> {
        self.bounding_box.as_ref()
    }

    /// Cached bounding sphere, if computed
    pub fn bounding_sphere(&self) -> Option<&BoundingSphere> {
        self.bounding_sphere.as_ref()
    }

    /// Recompute the bounding box over positions and morph targets
    ///
    /// O(n) over the position attribute, unioned with every morph position
    /// target. This is the only call that refreshes the cache.
    pub fn compute_bounding_box(&mut self) -> Result<Aabb, GeometryError> {
        let position = self
            .attributes
            .get(ATTRIBUTE_POSITION)
            .ok_or(GeometryError::MissingPosition)?;

        let mut aabb = Aabb::empty();
        expand_by_attribute(&mut aabb, position)?;
        for morph in &self.morph_positions {
            expand_by_attribute(&mut aabb, morph)?;
        }

        self.bounding_box = Some(aabb);
        Ok(aabb)
    }

    /// Recompute the bounding sphere over positions and morph targets
    ///
    /// Centers on the bounding box and takes the maximum distance to any
    /// position as the radius. This is the only call that refreshes the
    /// cache.
    pub fn compute_bounding_sphere(&mut self) -> Result<BoundingSphere, GeometryError> {
        let aabb = self.compute_bounding_box()?;
        let center = aabb.center();

        let mut radius_sq = 0.0_f32;
        let position = self
            .attributes
            .get(ATTRIBUTE_POSITION)
            .ok_or(GeometryError::MissingPosition)?;
        max_distance_sq(&mut radius_sq, center, position)?;
        for morph in &self.morph_positions {
            max_distance_sq(&mut radius_sq, center, morph)?;
        }

        let sphere = BoundingSphere::new(center, radius_sq.sqrt());
        self.bounding_sphere = Some(sphere);
        Ok(sphere)
    }

    /// Expand an indexed geometry into a flat, non-indexed copy
    ///
    /// Every attribute is rebuilt in index order. A non-indexed geometry is
    /// returned as an unmodified clone with a diagnostic, matching the
    /// soft-failure policy of the render loop.
    pub fn to_non_indexed(&self) -> Result<BufferGeometry, GeometryError> {
        let Some(index) = &self.index else {
            log::warn!("to_non_indexed called on a geometry that is already non-indexed");
            return Ok(self.clone());
        };

        let vertex_count = self.vertex_count();
        let mut out = BufferGeometry::new();
        out.name = self.name.clone();

        for (name, attribute) in &self.attributes {
            let item_size = attribute.item_size();
            let mut flat = Vec::with_capacity(index.count() * item_size);
            for i in 0..index.count() {
                let vertex = self.index_at(i).unwrap_or(0);
                if vertex as usize >= attribute.count() {
                    return Err(GeometryError::IndexOutOfRange {
                        index: vertex,
                        count: vertex_count,
                    });
                }
                for component in 0..item_size {
                    flat.push(attribute.component(vertex as usize, component)?);
                }
            }
            out.set_attribute(
                name.clone(),
                BufferAttribute::from_f32(&flat, item_size)?
                    .with_normalized(attribute.normalized()),
            );
        }

        // Groups address the same element ranges, now in vertex space
        out.groups = self.groups.clone();
        Ok(out)
    }

    /// Axis-aligned unit cube centered at the origin
    ///
    /// 24 vertices (4 per face, split normals), 36 indices.
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        #[rustfmt::skip]
        let face_data: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]]),
            ([0.0, 0.0, -1.0], [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]]),
            ([1.0, 0.0, 0.0], [[h, -h, h], [h, -h, -h], [h, h, -h], [h, h, h]]),
            ([-1.0, 0.0, 0.0], [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]]),
            ([0.0, 1.0, 0.0], [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]]),
            ([0.0, -1.0, 0.0], [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]]),
        ];

        let mut positions = Vec::with_capacity(6 * 4 * 3);
        let mut normals = Vec::with_capacity(6 * 4 * 3);
        let mut uvs = Vec::with_capacity(6 * 4 * 2);
        let mut indices = Vec::with_capacity(6 * 6);

        for (face, (normal, corners)) in face_data.iter().enumerate() {
            let base = (face * 4) as u32;
            for (corner, position) in corners.iter().enumerate() {
                positions.extend_from_slice(position);
                normals.extend_from_slice(normal);
                let (u, v) = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)][corner];
                uvs.extend_from_slice(&[u, v]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let mut geometry = Self::new();
        geometry.name = "cube".to_string();
        geometry.set_attribute(
            ATTRIBUTE_POSITION,
            BufferAttribute::from_f32(&positions, 3).unwrap_or_else(|_| unreachable!()),
        );
        geometry.set_attribute(
            super::ATTRIBUTE_NORMAL,
            BufferAttribute::from_f32(&normals, 3).unwrap_or_else(|_| unreachable!()),
        );
        geometry.set_attribute(
            super::ATTRIBUTE_UV,
            BufferAttribute::from_f32(&uvs, 2).unwrap_or_else(|_| unreachable!()),
        );
        geometry.set_index(&indices);
        geometry
    }
}

fn expand_by_attribute(aabb: &mut Aabb, attribute: &BufferAttribute) -> Result<(), GeometryError> {
    for i in 0..attribute.count() {
        let point = Vec3::new(attribute.x(i)?, attribute.y(i)?, attribute.z(i)?);
        aabb.expand_by_point(point);
    }
    Ok(())
}

fn max_distance_sq(
    radius_sq: &mut f32,
    center: Vec3,
    attribute: &BufferAttribute,
) -> Result<(), GeometryError> {
    for i in 0..attribute.count() {
        let point = Vec3::new(attribute.x(i)?, attribute.y(i)?, attribute.z(i)?);
        *radius_sq = radius_sq.max((point - center).magnitude_squared());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AttributeData;

    #[test]
    fn test_index_width_selection() {
        let mut geometry = BufferGeometry::new();
        geometry.set_index(&[0, 1, 2]);
        assert!(matches!(
            geometry.index().unwrap().data(),
            AttributeData::U16(_)
        ));

        geometry.set_index(&[0, 1, 65535]);
        assert!(matches!(
            geometry.index().unwrap().data(),
            AttributeData::U32(_)
        ));

        geometry.set_index(&[0, 1, 65534]);
        assert!(matches!(
            geometry.index().unwrap().data(),
            AttributeData::U16(_)
        ));
    }

    #[test]
    fn test_bounding_sphere_contains_all_positions() {
        let mut geometry = BufferGeometry::cube(1.0);
        let sphere = geometry.compute_bounding_sphere().unwrap();

        let position = geometry.attribute(ATTRIBUTE_POSITION).unwrap();
        for i in 0..position.count() {
            let p = Vec3::new(
                position.x(i).unwrap(),
                position.y(i).unwrap(),
                position.z(i).unwrap(),
            );
            assert!((p - sphere.center).magnitude() <= sphere.radius + 1e-5);
        }
    }

    #[test]
    fn test_bounds_cache_requires_explicit_recompute() {
        let mut geometry = BufferGeometry::cube(1.0);
        let before = geometry.compute_bounding_box().unwrap();

        geometry
            .attribute_mut(ATTRIBUTE_POSITION)
            .unwrap()
            .set_xyz(0, 10.0, 0.0, 0.0)
            .unwrap();
        // Mutation does not invalidate the cache
        assert_eq!(geometry.bounding_box(), Some(&before));

        let after = geometry.compute_bounding_box().unwrap();
        assert!(after.max.x >= 10.0);
    }

    #[test]
    fn test_morph_targets_union_into_bounds() {
        let mut geometry = BufferGeometry::new();
        geometry.set_attribute(
            ATTRIBUTE_POSITION,
            BufferAttribute::from_f32(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], 3).unwrap(),
        );
        geometry.add_morph_positions(
            BufferAttribute::from_f32(&[0.0, 5.0, 0.0, 1.0, 0.0, 0.0], 3).unwrap(),
        );

        let aabb = geometry.compute_bounding_box().unwrap();
        assert!((aabb.max.y - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_non_indexed_expands_vertices() {
        let geometry = BufferGeometry::cube(1.0);
        let flat = geometry.to_non_indexed().unwrap();

        assert!(flat.index().is_none());
        assert_eq!(flat.vertex_count(), 36);

        // First triangle follows the original index order
        let original = geometry.attribute(ATTRIBUTE_POSITION).unwrap();
        let expanded = flat.attribute(ATTRIBUTE_POSITION).unwrap();
        let first = geometry.index_at(0).unwrap() as usize;
        assert_eq!(expanded.x(0).unwrap(), original.x(first).unwrap());
    }

    #[test]
    fn test_draw_count_honors_draw_range() {
        let mut geometry = BufferGeometry::cube(1.0);
        assert_eq!(geometry.draw_count(), 36);
        geometry.set_draw_range(6, 12);
        assert_eq!(geometry.draw_count(), 12);
    }
}
