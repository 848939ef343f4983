//! GPU resource managers
//!
//! Side tables from CPU resource key to `{GPU handle, synced version}`.
//! `update` is idempotent: a no-op while the synced version matches, a
//! ranged upload when the attribute carries dirty ranges, a full upload
//! otherwise. Entry lifetime ends only on an explicit dispose event drained
//! from the resource store; there is no implicit cleanup of GPU memory.

use std::collections::HashMap;

use crate::geometry::{AttributeData, BufferAttribute, BufferGeometry, GeometryKey};
use crate::material::{Texture, TextureKey};

use super::backend::{BackendResult, BufferHandle, BufferKind, RenderBackend, TextureHandle};

/// One synced GPU buffer
#[derive(Debug, Clone, Copy)]
pub struct BufferRecord {
    /// Backend handle
    pub handle: BufferHandle,
    /// Attribute version last uploaded
    pub version: u64,
}

/// GPU-side state for one geometry: a buffer per attribute plus the index
#[derive(Debug, Default)]
pub struct GeometryRecord {
    attributes: HashMap<String, BufferRecord>,
    index: Option<BufferRecord>,
}

impl GeometryRecord {
    /// Buffer record for a named attribute
    pub fn attribute(&self, name: &str) -> Option<&BufferRecord> {
        self.attributes.get(name)
    }

    /// Buffer record for the index buffer
    pub fn index(&self) -> Option<&BufferRecord> {
        self.index.as_ref()
    }
}

/// Upload statistics for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Buffers created
    pub created: u64,
    /// Full re-uploads
    pub full_uploads: u64,
    /// Ranged re-uploads
    pub range_uploads: u64,
}

/// Side table syncing geometries' attribute and index buffers
#[derive(Debug, Default)]
pub struct GeometryManager {
    records: HashMap<GeometryKey, GeometryRecord>,
    stats: UploadStats,
}

impl GeometryManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload statistics since construction
    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Synced record for a geometry, when one exists
    pub fn record(&self, key: GeometryKey) -> Option<&GeometryRecord> {
        self.records.get(&key)
    }

    /// Number of live side-table entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the side table is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bring a geometry's GPU buffers up to date
    ///
    /// Idempotent: attributes whose synced version matches are untouched.
    /// Dirty ranges are consumed and cleared after a ranged upload.
    pub fn update(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: GeometryKey,
        geometry: &mut BufferGeometry,
    ) -> BackendResult<()> {
        let record = self.records.entry(key).or_default();

        let names: Vec<String> = geometry
            .attributes_sorted()
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect();
        for name in names {
            let Some(attribute) = geometry.attribute_mut(&name) else {
                continue;
            };
            Self::sync_buffer(
                backend,
                &mut self.stats,
                record.attributes.entry(name),
                attribute,
                BufferKind::Vertex,
            )?;
        }

        if let Some(index) = geometry.index_mut() {
            match &mut record.index {
                None => {
                    let handle = backend.create_buffer(BufferKind::Index, index.as_bytes())?;
                    self.stats.created += 1;
                    record.index = Some(BufferRecord {
                        handle,
                        version: index.version(),
                    });
                }
                Some(existing) if existing.version != index.version() => {
                    backend.update_buffer(existing.handle, index.as_bytes())?;
                    self.stats.full_uploads += 1;
                    existing.version = index.version();
                    index.clear_update_ranges();
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn sync_buffer(
        backend: &mut dyn RenderBackend,
        stats: &mut UploadStats,
        entry: std::collections::hash_map::Entry<'_, String, BufferRecord>,
        attribute: &mut BufferAttribute,
        kind: BufferKind,
    ) -> BackendResult<()> {
        match entry {
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let handle = backend.create_buffer(kind, attribute.as_bytes())?;
                stats.created += 1;
                vacant.insert(BufferRecord {
                    handle,
                    version: attribute.version(),
                });
                attribute.clear_update_ranges();
            }
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.version == attribute.version() {
                    return Ok(());
                }
                if attribute.update_ranges().is_empty() {
                    backend.update_buffer(record.handle, attribute.as_bytes())?;
                    stats.full_uploads += 1;
                } else {
                    let component = attribute.component_size();
                    let bytes = attribute.as_bytes();
                    for range in attribute.update_ranges() {
                        let start = range.offset * component;
                        let end = (range.offset + range.count) * component;
                        let end = end.min(bytes.len());
                        if start >= end {
                            continue;
                        }
                        backend.update_buffer_range(record.handle, start, &bytes[start..end])?;
                        stats.range_uploads += 1;
                    }
                }
                record.version = attribute.version();
                attribute.clear_update_ranges();
            }
        }
        Ok(())
    }

    /// Free a geometry's GPU buffers after its dispose event
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend, key: GeometryKey) {
        let Some(record) = self.records.remove(&key) else {
            return;
        };
        log::debug!("freeing GPU buffers for disposed geometry");
        for buffer in record.attributes.values() {
            backend.delete_buffer(buffer.handle);
        }
        if let Some(index) = record.index {
            backend.delete_buffer(index.handle);
        }
    }

    /// Free every remaining record at renderer teardown
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        let keys: Vec<GeometryKey> = self.records.keys().copied().collect();
        for key in keys {
            self.dispose(backend, key);
        }
    }
}

/// One synced GPU texture
#[derive(Debug, Clone, Copy)]
pub struct TextureRecord {
    /// Backend handle
    pub handle: TextureHandle,
    /// Texture version last uploaded
    pub version: u64,
}

/// Side table syncing textures
#[derive(Debug, Default)]
pub struct TextureManager {
    records: HashMap<TextureKey, TextureRecord>,
}

impl TextureManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Synced record for a texture, when one exists
    pub fn record(&self, key: TextureKey) -> Option<&TextureRecord> {
        self.records.get(&key)
    }

    /// Number of live side-table entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the side table is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bring a texture's GPU image up to date; idempotent on version match
    pub fn update(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: TextureKey,
        texture: &Texture,
    ) -> BackendResult<TextureHandle> {
        if let Some(record) = self.records.get_mut(&key) {
            if record.version != texture.version() {
                backend.update_texture(record.handle, &texture.data)?;
                record.version = texture.version();
            }
            return Ok(record.handle);
        }

        let handle = backend.create_texture(
            texture.width,
            texture.height,
            texture.format,
            texture.filter,
            texture.wrap,
            &texture.data,
        )?;
        self.records.insert(
            key,
            TextureRecord {
                handle,
                version: texture.version(),
            },
        );
        Ok(handle)
    }

    /// Free a texture's GPU image after its dispose event
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend, key: TextureKey) {
        if let Some(record) = self.records.remove(&key) {
            log::debug!("freeing GPU image for disposed texture");
            backend.delete_texture(record.handle);
        }
    }

    /// Free every remaining record at renderer teardown
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        let keys: Vec<TextureKey> = self.records.keys().copied().collect();
        for key in keys {
            self.dispose(backend, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{HeadlessBackend, RecordedCommand};
    use crate::scene::Resources;

    #[test]
    fn test_update_is_idempotent_on_version_match() {
        let mut backend = HeadlessBackend::new();
        let mut manager = GeometryManager::new();
        let mut resources = Resources::new();
        let key = resources.add_geometry(BufferGeometry::cube(1.0));

        let geometry = resources.geometry_mut(key).unwrap();
        manager.update(&mut backend, key, geometry).unwrap();
        let created = manager.stats().created;
        assert!(created > 0);

        manager.update(&mut backend, key, geometry).unwrap();
        assert_eq!(manager.stats(), UploadStats {
            created,
            full_uploads: 0,
            range_uploads: 0,
        });
    }

    #[test]
    fn test_dirty_range_takes_partial_path_and_clears() {
        let mut backend = HeadlessBackend::new();
        let mut manager = GeometryManager::new();
        let mut resources = Resources::new();
        let key = resources.add_geometry(BufferGeometry::cube(1.0));

        let geometry = resources.geometry_mut(key).unwrap();
        manager.update(&mut backend, key, geometry).unwrap();
        backend.clear_commands();

        let position = geometry.attribute_mut(crate::geometry::ATTRIBUTE_POSITION).unwrap();
        position.set_xyz(0, 9.0, 9.0, 9.0).unwrap();
        position.add_update_range(0, 3);
        manager.update(&mut backend, key, geometry).unwrap();

        assert!(backend.commands().iter().any(|c| matches!(
            c,
            RecordedCommand::UpdateBufferRange(_, 0, 12)
        )));
        assert!(geometry
            .attribute(crate::geometry::ATTRIBUTE_POSITION)
            .unwrap()
            .update_ranges()
            .is_empty());
    }

    #[test]
    fn test_mutation_without_range_takes_full_path() {
        let mut backend = HeadlessBackend::new();
        let mut manager = GeometryManager::new();
        let mut resources = Resources::new();
        let key = resources.add_geometry(BufferGeometry::cube(1.0));

        let geometry = resources.geometry_mut(key).unwrap();
        manager.update(&mut backend, key, geometry).unwrap();

        geometry
            .attribute_mut(crate::geometry::ATTRIBUTE_POSITION)
            .unwrap()
            .set_x(0, 3.0)
            .unwrap();
        manager.update(&mut backend, key, geometry).unwrap();
        assert_eq!(manager.stats().full_uploads, 1);
    }

    #[test]
    fn test_dispose_frees_every_buffer_once() {
        let mut backend = HeadlessBackend::new();
        let mut manager = GeometryManager::new();
        let mut resources = Resources::new();
        let key = resources.add_geometry(BufferGeometry::cube(1.0));

        let geometry = resources.geometry_mut(key).unwrap();
        manager.update(&mut backend, key, geometry).unwrap();
        assert!(backend.live_buffers() > 0);

        manager.dispose(&mut backend, key);
        assert_eq!(backend.live_buffers(), 0);
        assert!(manager.is_empty());

        // A second dispose is a no-op
        manager.dispose(&mut backend, key);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_texture_manager_round_trip() {
        let mut backend = HeadlessBackend::new();
        let mut manager = TextureManager::new();
        let mut resources = Resources::new();
        let key = resources.add_texture(Texture::white());

        let first = manager
            .update(&mut backend, key, resources.texture(key).unwrap())
            .unwrap();
        let second = manager
            .update(&mut backend, key, resources.texture(key).unwrap())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.live_textures(), 1);

        manager.dispose(&mut backend, key);
        assert_eq!(backend.live_textures(), 0);
    }
}
