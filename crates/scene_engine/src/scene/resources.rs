//! CPU-side resource store
//!
//! Geometries, materials, and textures live in arenas keyed by generational
//! handles; meshes reference them by key rather than by pointer. Disposal is
//! explicit and event-driven: removing a resource queues a
//! [`DisposeEvent`] the renderer's GPU managers drain on the next frame.
//! Nothing on the GPU side is ever reclaimed implicitly.

use slotmap::SlotMap;

use crate::events::{DisposeEvent, DisposeQueue};
use crate::geometry::{BufferGeometry, GeometryKey};
use crate::material::{Material, MaterialKey, Texture, TextureKey};

/// Arena store for geometries, materials, and textures
#[derive(Debug, Default)]
pub struct Resources {
    geometries: SlotMap<GeometryKey, BufferGeometry>,
    materials: SlotMap<MaterialKey, Material>,
    textures: SlotMap<TextureKey, Texture>,
    dispose_queue: DisposeQueue,
}

impl Resources {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a geometry, returning its handle
    pub fn add_geometry(&mut self, geometry: BufferGeometry) -> GeometryKey {
        self.geometries.insert(geometry)
    }

    /// Look up a geometry
    pub fn geometry(&self, key: GeometryKey) -> Option<&BufferGeometry> {
        self.geometries.get(key)
    }

    /// Look up a geometry for mutation
    pub fn geometry_mut(&mut self, key: GeometryKey) -> Option<&mut BufferGeometry> {
        self.geometries.get_mut(key)
    }

    /// Dispose a geometry, queueing release of its GPU buffers
    pub fn dispose_geometry(&mut self, key: GeometryKey) {
        if self.geometries.remove(key).is_some() {
            self.dispose_queue.push(DisposeEvent::Geometry(key));
        }
    }

    /// Add a material, returning its handle
    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Look up a material
    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Look up a material for mutation
    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    /// Dispose a material, queueing release of its program reference
    pub fn dispose_material(&mut self, key: MaterialKey) {
        if self.materials.remove(key).is_some() {
            self.dispose_queue.push(DisposeEvent::Material(key));
        }
    }

    /// Add a texture, returning its handle
    pub fn add_texture(&mut self, texture: Texture) -> TextureKey {
        self.textures.insert(texture)
    }

    /// Look up a texture
    pub fn texture(&self, key: TextureKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    /// Look up a texture for mutation
    pub fn texture_mut(&mut self, key: TextureKey) -> Option<&mut Texture> {
        self.textures.get_mut(key)
    }

    /// Dispose a texture, queueing release of its GPU image
    pub fn dispose_texture(&mut self, key: TextureKey) {
        if self.textures.remove(key).is_some() {
            self.dispose_queue.push(DisposeEvent::Texture(key));
        }
    }

    /// Iterate all geometries
    pub fn geometries(&self) -> impl Iterator<Item = (GeometryKey, &BufferGeometry)> {
        self.geometries.iter()
    }

    /// Iterate all materials
    pub fn materials(&self) -> impl Iterator<Item = (MaterialKey, &Material)> {
        self.materials.iter()
    }

    /// Iterate all textures
    pub fn textures(&self) -> impl Iterator<Item = (TextureKey, &Texture)> {
        self.textures.iter()
    }

    /// Pending dispose events for the renderer to drain
    pub fn dispose_queue_mut(&mut self) -> &mut DisposeQueue {
        &mut self.dispose_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_queues_exactly_one_event() {
        let mut resources = Resources::new();
        let key = resources.add_geometry(BufferGeometry::cube(1.0));

        resources.dispose_geometry(key);
        // Second dispose of a dead key is a no-op
        resources.dispose_geometry(key);

        let events = resources.dispose_queue_mut().drain();
        assert_eq!(events, vec![DisposeEvent::Geometry(key)]);
        assert!(resources.geometry(key).is_none());
    }

    #[test]
    fn test_keys_are_generational() {
        let mut resources = Resources::new();
        let first = resources.add_material(Material::basic());
        resources.dispose_material(first);
        let second = resources.add_material(Material::standard());

        assert_ne!(first, second);
        assert!(resources.material(first).is_none());
        assert!(resources.material(second).is_some());
    }
}
