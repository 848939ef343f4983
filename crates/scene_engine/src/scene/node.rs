//! Scene-graph nodes
//!
//! A [`Node`] is a hierarchical transform with cached local and world
//! matrices plus a kind-specific payload (mesh, camera, light, or plain
//! group). Nodes live in the scene's arena and reference each other through
//! non-owning [`NodeKey`] handles.

use bitflags::bitflags;

use super::camera::Camera;
use super::light::Light;
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::geometry::GeometryKey;
use crate::material::MaterialKey;

slotmap::new_key_type! {
    /// Non-owning handle to a [`Node`] in the scene arena
    pub struct NodeKey;
}

bitflags! {
    /// Layer membership mask
    ///
    /// A camera renders a node only when their layer masks intersect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Layers: u32 {
        /// The default layer every node and camera starts on
        const DEFAULT = 1;
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Layers {
    /// Membership mask for a single numbered layer (0..=31)
    pub fn layer(index: u32) -> Self {
        Self::from_bits_retain(1 << index)
    }

    /// Whether two masks share at least one layer
    pub fn test(self, other: Self) -> bool {
        self.intersects(other)
    }
}

/// Drawable payload shared by mesh, line, and point nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    /// Geometry drawn by this node
    pub geometry: GeometryKey,
    /// Material slots; geometry groups select into this list
    pub materials: Vec<MaterialKey>,
    /// Per-morph-target blend weights
    pub morph_influences: Vec<f32>,
    /// Instance count; 1 issues a non-instanced draw
    pub instances: usize,
    /// Participate in frustum culling
    pub frustum_culled: bool,
    /// Deform by skeleton in the vertex stage
    pub skinned: bool,
}

impl Renderable {
    /// Create a renderable over a geometry and material list
    pub fn new(geometry: GeometryKey, materials: Vec<MaterialKey>) -> Self {
        Self {
            geometry,
            materials,
            morph_influences: Vec::new(),
            instances: 1,
            frustum_culled: true,
            skinned: false,
        }
    }
}

/// Kind-specific payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Pure transform node with no payload
    Group,
    /// Triangle mesh
    Mesh(Renderable),
    /// Line segments
    Line(Renderable),
    /// Point sprites
    Points(Renderable),
    /// Projective camera
    Camera(Camera),
    /// Light source
    Light(Light),
}

impl NodeKind {
    /// The drawable payload, when this kind has one
    pub fn renderable(&self) -> Option<&Renderable> {
        match self {
            Self::Mesh(r) | Self::Line(r) | Self::Points(r) => Some(r),
            _ => None,
        }
    }

    /// The drawable payload for mutation, when this kind has one
    pub fn renderable_mut(&mut self) -> Option<&mut Renderable> {
        match self {
            Self::Mesh(r) | Self::Line(r) | Self::Points(r) => Some(r),
            _ => None,
        }
    }
}

/// Hierarchical transform node
#[derive(Debug, Clone)]
pub struct Node {
    /// Name used by lookups and animation track paths
    pub name: String,
    pub(super) parent: Option<NodeKey>,
    pub(super) children: Vec<NodeKey>,
    pub(super) transform: Transform,
    pub(super) matrix: Mat4,
    pub(super) matrix_world: Mat4,
    pub(super) world_dirty: bool,
    /// Recompose the local matrix from the transform each update
    pub matrix_auto_update: bool,
    /// Participate in automatic world-matrix propagation
    pub matrix_world_auto_update: bool,
    /// Invisible nodes are skipped along with their whole subtree
    pub visible: bool,
    /// Layer membership
    pub layers: Layers,
    /// Explicit draw-order override within a bucket (lower draws first)
    pub render_order: i32,
    /// Kind-specific payload
    pub kind: NodeKind,
}

impl Node {
    /// Create a node with a name and payload
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Transform::identity(),
            matrix: Mat4::identity(),
            matrix_world: Mat4::identity(),
            world_dirty: true,
            matrix_auto_update: true,
            matrix_world_auto_update: true,
            visible: true,
            layers: Layers::default(),
            render_order: 0,
            kind,
        }
    }

    /// Parent handle, `None` for detached nodes and the root
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Owned children in draw order
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Local transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Edit the local transform and mark the world matrix stale
    pub fn transform_mut(&mut self) -> &mut Transform {
        self.world_dirty = true;
        &mut self.transform
    }

    /// Set the local position
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.world_dirty = true;
    }

    /// Set the local rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.world_dirty = true;
    }

    /// Set the local scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.world_dirty = true;
    }

    /// Rotate so the local -Z axis points at a world-space target
    ///
    /// Meant for cameras and lights parented near the root; the target is
    /// interpreted against the local parent frame.
    pub fn look_at(&mut self, target: Vec3) {
        let eye = self.transform.position;
        let up = Vec3::new(0.0, 1.0, 0.0);
        self.set_rotation(Quat::face_towards(&(eye - target), &up));
    }

    /// Cached local matrix
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Replace the local matrix directly
    ///
    /// For nodes that opted out of `matrix_auto_update`; marks the world
    /// matrix stale so propagation picks the edit up.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
        self.world_dirty = true;
    }

    /// Cached world matrix, valid after `update_matrix_world`
    pub fn matrix_world(&self) -> &Mat4 {
        &self.matrix_world
    }

    /// World-space position column of the cached world matrix
    pub fn world_position(&self) -> Vec3 {
        Vec3::new(
            self.matrix_world.m14,
            self.matrix_world.m24,
            self.matrix_world.m34,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layers_intersection() {
        let a = Layers::layer(0);
        let b = Layers::layer(1);
        assert!(!a.test(b));
        assert!(a.test(a | b));
        assert!(Layers::default().test(Layers::layer(0)));
    }

    #[test]
    fn test_transform_edits_mark_world_dirty() {
        let mut node = Node::new("n", NodeKind::Group);
        node.world_dirty = false;
        node.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert!(node.world_dirty);
    }

    #[test]
    fn test_look_at_points_negative_z_at_target() {
        let mut node = Node::new("camera", NodeKind::Group);
        node.set_position(Vec3::new(0.0, 0.0, 5.0));
        node.look_at(Vec3::zeros());

        let forward = node.transform().rotation * Vec3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(forward, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }
}
