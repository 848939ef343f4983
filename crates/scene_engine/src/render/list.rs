//! Per-frame render lists
//!
//! The culled, sorted set of draws for one frame, bucketed by blending
//! behavior. Opaque draws sort by render-order, then material (which keeps
//! draws sharing a program adjacent), then front-to-back depth for early
//! depth rejection; transparent draws sort back-to-front for correct
//! blending. Transmissive draws render before everything else into the
//! offscreen transmission target.

use slotmap::Key;

use crate::geometry::{GeometryGroup, GeometryKey};
use crate::material::MaterialKey;
use crate::render::backend::Topology;
use crate::scene::NodeKey;

/// One draw extracted from the scene
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    /// Node the draw came from
    pub node: NodeKey,
    /// Geometry to draw
    pub geometry: GeometryKey,
    /// Material slot for this draw
    pub material: MaterialKey,
    /// Sub-range group, when the geometry is grouped
    pub group: Option<GeometryGroup>,
    /// Primitive topology
    pub topology: Topology,
    /// View-space depth of the node origin, for sorting
    pub depth: f32,
    /// Explicit draw-order override (lower draws first)
    pub render_order: i32,
    /// Instance count
    pub instances: usize,
}

/// Which bucket a draw landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// No blending; sorted for early depth rejection
    Opaque,
    /// Samples the transmission target; rendered first
    Transmissive,
    /// Alpha-blended; sorted back-to-front
    Transparent,
}

/// Culled, bucketed, sorted draws for one frame
#[derive(Debug, Default)]
pub struct RenderList {
    opaque: Vec<RenderItem>,
    transmissive: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
}

impl RenderList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all buckets for the next frame, keeping allocations
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
    }

    /// Add a draw to a bucket
    pub fn push(&mut self, bucket: Bucket, item: RenderItem) {
        match bucket {
            Bucket::Opaque => self.opaque.push(item),
            Bucket::Transmissive => self.transmissive.push(item),
            Bucket::Transparent => self.transparent.push(item),
        }
    }

    /// Sort every bucket into its draw order
    pub fn sort(&mut self) {
        // Material key groups draws that resolve to the same program
        self.opaque.sort_by(|a, b| {
            a.render_order
                .cmp(&b.render_order)
                .then_with(|| a.material.data().as_ffi().cmp(&b.material.data().as_ffi()))
                .then_with(|| a.depth.partial_cmp(&b.depth).unwrap_or(std::cmp::Ordering::Equal))
        });
        self.transmissive.sort_by(|a, b| {
            a.render_order
                .cmp(&b.render_order)
                .then_with(|| a.material.data().as_ffi().cmp(&b.material.data().as_ffi()))
                .then_with(|| a.depth.partial_cmp(&b.depth).unwrap_or(std::cmp::Ordering::Equal))
        });
        // Back-to-front for correct alpha compositing
        self.transparent.sort_by(|a, b| {
            a.render_order
                .cmp(&b.render_order)
                .then_with(|| b.depth.partial_cmp(&a.depth).unwrap_or(std::cmp::Ordering::Equal))
        });
    }

    /// Opaque draws in sorted order
    pub fn opaque(&self) -> &[RenderItem] {
        &self.opaque
    }

    /// Transmissive draws in sorted order
    pub fn transmissive(&self) -> &[RenderItem] {
        &self.transmissive
    }

    /// Transparent draws in sorted order
    pub fn transparent(&self) -> &[RenderItem] {
        &self.transparent
    }

    /// Total number of draws across buckets
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transmissive.len() + self.transparent.len()
    }

    /// Whether no draws were collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn item(depth: f32, render_order: i32, material: u64) -> RenderItem {
        RenderItem {
            node: NodeKey::from(KeyData::from_ffi(1)),
            geometry: GeometryKey::from(KeyData::from_ffi(1)),
            material: MaterialKey::from(KeyData::from_ffi(material)),
            group: None,
            topology: Topology::Triangles,
            depth,
            render_order,
            instances: 1,
        }
    }

    #[test]
    fn test_opaque_sorts_front_to_back() {
        let mut list = RenderList::new();
        list.push(Bucket::Opaque, item(10.0, 0, 1));
        list.push(Bucket::Opaque, item(5.0, 0, 1));
        list.sort();

        assert_eq!(list.opaque()[0].depth, 5.0);
        assert_eq!(list.opaque()[1].depth, 10.0);
    }

    #[test]
    fn test_transparent_sorts_back_to_front() {
        let mut list = RenderList::new();
        list.push(Bucket::Transparent, item(3.0, 0, 1));
        list.push(Bucket::Transparent, item(8.0, 0, 1));
        list.sort();

        assert_eq!(list.transparent()[0].depth, 8.0);
        assert_eq!(list.transparent()[1].depth, 3.0);
    }

    #[test]
    fn test_render_order_dominates_depth() {
        let mut list = RenderList::new();
        list.push(Bucket::Opaque, item(1.0, 5, 1));
        list.push(Bucket::Opaque, item(100.0, 0, 1));
        list.sort();

        assert_eq!(list.opaque()[0].depth, 100.0);
    }

    #[test]
    fn test_material_groups_between_order_and_depth() {
        let mut list = RenderList::new();
        list.push(Bucket::Opaque, item(1.0, 0, 2));
        list.push(Bucket::Opaque, item(2.0, 0, 1));
        list.push(Bucket::Opaque, item(3.0, 0, 2));
        list.sort();

        let materials: Vec<u64> = list
            .opaque()
            .iter()
            .map(|i| i.material.data().as_ffi())
            .collect();
        assert_eq!(materials, vec![1, 2, 2]);
    }
}
