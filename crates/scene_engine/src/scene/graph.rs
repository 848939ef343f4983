//! The scene graph
//!
//! [`Scene`] owns every node in a generational arena and maintains the
//! parent/child topology between them. Parent references are non-owning
//! keys, so re-parenting is a pure bookkeeping operation and stale handles
//! fail lookups instead of dangling.
//!
//! Structural misuse (re-parenting a node under itself or its own subtree,
//! operating on a dead key) is rejected with a diagnostic and a no-op: one
//! bad call must never halt a real-time loop. Debug builds additionally
//! assert so tests catch the caller bug.

use slotmap::SlotMap;

use super::camera::Camera;
use super::light::Light;
use super::node::{Node, NodeKey, NodeKind, Renderable};
use super::resources::Resources;
use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::geometry::GeometryKey;
use crate::material::MaterialKey;

/// Linear distance fog parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    /// Fog color (RGB)
    pub color: [f32; 3],
    /// Distance where fog starts
    pub near: f32,
    /// Distance where fog fully covers
    pub far: f32,
}

/// Hierarchical scene of transform nodes plus the resource store
#[derive(Debug)]
pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    /// Clear color used when rendering this scene
    pub background: Option<[f32; 3]>,
    /// Linear fog, when enabled
    pub fog: Option<Fog>,
    resources: Resources,
}

impl Scene {
    /// Create a scene containing only a root group node
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("root", NodeKind::Group));
        Self {
            nodes,
            root,
            background: None,
            fog: None,
            resources: Resources::new(),
        }
    }

    /// The root node every attached node descends from
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// The shared geometry/material/texture store
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// The shared geometry/material/texture store for mutation
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// Look up a node
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Look up a node for mutation
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// Number of live nodes, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert a detached node into the arena
    pub fn add_node(&mut self, node: Node) -> NodeKey {
        self.nodes.insert(node)
    }

    /// Insert a detached group node
    pub fn add_group(&mut self, name: impl Into<String>) -> NodeKey {
        self.add_node(Node::new(name, NodeKind::Group))
    }

    /// Insert a detached mesh node over a geometry and material list
    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        geometry: GeometryKey,
        materials: Vec<MaterialKey>,
    ) -> NodeKey {
        self.add_node(Node::new(
            name,
            NodeKind::Mesh(Renderable::new(geometry, materials)),
        ))
    }

    /// Insert a detached line node
    pub fn add_line(
        &mut self,
        name: impl Into<String>,
        geometry: GeometryKey,
        material: MaterialKey,
    ) -> NodeKey {
        self.add_node(Node::new(
            name,
            NodeKind::Line(Renderable::new(geometry, vec![material])),
        ))
    }

    /// Insert a detached points node
    pub fn add_points(
        &mut self,
        name: impl Into<String>,
        geometry: GeometryKey,
        material: MaterialKey,
    ) -> NodeKey {
        self.add_node(Node::new(
            name,
            NodeKind::Points(Renderable::new(geometry, vec![material])),
        ))
    }

    /// Insert a detached camera node
    pub fn add_camera(&mut self, name: impl Into<String>, camera: Camera) -> NodeKey {
        self.add_node(Node::new(name, NodeKind::Camera(camera)))
    }

    /// Insert a detached light node
    pub fn add_light(&mut self, name: impl Into<String>, light: Light) -> NodeKey {
        self.add_node(Node::new(name, NodeKind::Light(light)))
    }

    /// Whether `candidate` is `node` or one of its descendants
    fn is_in_subtree(&self, node: NodeKey, candidate: NodeKey) -> bool {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == candidate {
                return true;
            }
            if let Some(n) = self.nodes.get(current) {
                stack.extend_from_slice(&n.children);
            }
        }
        false
    }

    /// Attach a child to a parent, maintaining single ownership
    ///
    /// A child already attached elsewhere is detached from its previous
    /// parent first. Attaching a node to itself or into its own subtree, or
    /// using a dead key, is rejected with a diagnostic and no structural
    /// change.
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) {
        if parent == child {
            log::warn!("add_child: node cannot be added to itself, ignoring");
            return;
        }
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            log::warn!("add_child: dead node key, ignoring");
            return;
        }
        if self.is_in_subtree(child, parent) {
            log::warn!("add_child: parent lies inside the child's subtree, ignoring");
            return;
        }

        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        // The child inherits a new parent frame
        self.nodes[child].world_dirty = true;
    }

    /// Detach a child from its parent, leaving it in the arena
    pub fn detach(&mut self, child: NodeKey) {
        let Some(previous) = self.nodes.get(child).and_then(Node::parent) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(previous) {
            parent.children.retain(|&c| c != child);
        }
        self.nodes[child].parent = None;
        self.nodes[child].world_dirty = true;
    }

    /// Detach a subtree and remove every node in it from the arena
    pub fn remove_subtree(&mut self, key: NodeKey) {
        if key == self.root {
            log::warn!("remove_subtree: the root cannot be removed, ignoring");
            return;
        }
        self.detach(key);
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend_from_slice(&node.children);
            }
        }
    }

    /// Update cached world matrices with a pre-order traversal
    ///
    /// Rebuilds a node's local matrix from its transform when
    /// `matrix_auto_update` is set, recomposes the world matrix from the
    /// parent's when the local matrix changed or `force` is set, and
    /// propagates force to children once a world matrix was rebuilt. Nodes
    /// with `matrix_world_auto_update` disabled keep their cached world
    /// matrix and prune propagation into their subtree; the caller is then
    /// responsible for upholding the world = parent_world * local invariant.
    pub fn update_matrix_world(&mut self, force: bool) {
        let mut stack = vec![(self.root, Mat4::identity(), force)];
        while let Some((key, parent_world, force)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            if !node.matrix_world_auto_update {
                continue;
            }

            if node.matrix_auto_update {
                node.matrix = node.transform.to_matrix();
                node.world_dirty = true;
            }

            let mut child_force = force;
            if node.world_dirty || force {
                node.matrix_world = parent_world * node.matrix;
                node.world_dirty = false;
                child_force = true;
            }

            let world = node.matrix_world;
            for &child in &node.children {
                stack.push((child, world, child_force));
            }
        }
    }

    /// Pre-order depth-first walk over a subtree
    pub fn traverse(&self, start: NodeKey, mut visit: impl FnMut(NodeKey, &Node)) {
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            visit(key, node);
            // Reverse so children visit in declaration order
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Pre-order walk that prunes entire subtrees at invisible nodes
    pub fn traverse_visible(&self, start: NodeKey, mut visit: impl FnMut(NodeKey, &Node)) {
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            visit(key, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// First node with a matching name, in pre-order from the root
    pub fn get_object_by_name(&self, name: &str) -> Option<NodeKey> {
        let mut found = None;
        self.traverse(self.root, |key, node| {
            if found.is_none() && node.name == name {
                found = Some(key);
            }
        });
        found
    }

    /// Deep-copy a subtree, returning the detached copy's root
    ///
    /// Node payloads are cloned; geometry/material handles keep referring
    /// to the same shared resources.
    pub fn clone_subtree(&mut self, key: NodeKey) -> Option<NodeKey> {
        if !self.nodes.contains_key(key) {
            log::warn!("clone_subtree: dead node key, ignoring");
            return None;
        }
        let copy = self.clone_recursive(key, None);
        Some(copy)
    }

    fn clone_recursive(&mut self, key: NodeKey, parent: Option<NodeKey>) -> NodeKey {
        let mut node = self.nodes[key].clone();
        let children = std::mem::take(&mut node.children);
        node.parent = parent;
        node.world_dirty = true;
        let copy = self.nodes.insert(node);
        for child in children {
            let child_copy = self.clone_recursive(child, Some(copy));
            self.nodes[copy].children.push(child_copy);
        }
        copy
    }

    /// Set a node's local position (no-op with a diagnostic on a dead key)
    pub fn set_position(&mut self, key: NodeKey, position: Vec3) {
        match self.nodes.get_mut(key) {
            Some(node) => node.set_position(position),
            None => log::warn!("set_position: dead node key, ignoring"),
        }
    }

    /// Set a node's local rotation (no-op with a diagnostic on a dead key)
    pub fn set_rotation(&mut self, key: NodeKey, rotation: Quat) {
        match self.nodes.get_mut(key) {
            Some(node) => node.set_rotation(rotation),
            None => log::warn!("set_rotation: dead node key, ignoring"),
        }
    }

    /// Set a node's local scale (no-op with a diagnostic on a dead key)
    pub fn set_scale(&mut self, key: NodeKey, scale: Vec3) {
        match self.nodes.get_mut(key) {
            Some(node) => node.set_scale(scale),
            None => log::warn!("set_scale: dead node key, ignoring"),
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
