//! Versioned JSON scene description
//!
//! `to_json`/`from_json` persist a scene as a self-contained document:
//! a metadata block, geometry/material/texture tables de-duplicated by
//! identity (two meshes sharing a geometry serialize it once), and the
//! object graph referencing table indices.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::camera::{Camera, Projection};
use super::graph::{Fog, Scene};
use super::light::{Light, LightKind};
use super::node::{Layers, NodeKey, NodeKind, Renderable};
use crate::foundation::math::{Quat, Quaternion, Vec3};
use crate::geometry::{
    AttributeData, BufferAttribute, BufferGeometry, GeometryKey,
};
use crate::material::{Material, MaterialKey, Texture, TextureFormat, TextureKey};

/// Format version written into the metadata block
pub const FORMAT_VERSION: u32 = 1;

/// Errors raised while reading or writing scene documents
#[derive(Debug, Error)]
pub enum JsonError {
    /// Forwarded serde failure
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Document was written by an incompatible format version
    #[error("unsupported scene format version {0}")]
    UnsupportedVersion(u32),

    /// An object referenced a table index that does not exist
    #[error("dangling {kind} reference {index}")]
    DanglingReference {
        /// Table the reference pointed into
        kind: &'static str,
        /// Offending index
        index: usize,
    },

    /// Stored attribute data failed validation
    #[error("invalid attribute data: {0}")]
    InvalidAttribute(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    version: u32,
    #[serde(rename = "type")]
    kind: String,
    generator: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum StorageDto {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I8(Vec<i8>),
}

#[derive(Debug, Serialize, Deserialize)]
struct AttributeDto {
    item_size: usize,
    normalized: bool,
    storage: StorageDto,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupDto {
    start: usize,
    count: usize,
    material_index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeometryDto {
    name: String,
    attributes: HashMap<String, AttributeDto>,
    #[serde(default)]
    morph_positions: Vec<AttributeDto>,
    index: Option<Vec<u32>>,
    #[serde(default)]
    groups: Vec<GroupDto>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum MaterialKindDto {
    Basic { color: [f32; 3] },
    Standard {
        color: [f32; 3],
        metallic: f32,
        roughness: f32,
        flat_shading: bool,
    },
    Points { size: f32, size_attenuation: bool },
    Line { width: f32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct MaterialDto {
    name: String,
    kind: MaterialKindDto,
    map: Option<usize>,
    transparent: bool,
    opacity: f32,
    alpha_test: Option<f32>,
    transmission: f32,
    vertex_colors: bool,
    fog: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextureDto {
    name: String,
    width: u32,
    height: u32,
    format: String,
    data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum NodeKindDto {
    Group,
    Mesh {
        geometry: usize,
        materials: Vec<usize>,
    },
    Line {
        geometry: usize,
        materials: Vec<usize>,
    },
    Points {
        geometry: usize,
        materials: Vec<usize>,
    },
    PerspectiveCamera {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    OrthographicCamera {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
    Light {
        kind: String,
        color: [f32; 3],
        intensity: f32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeDto {
    name: String,
    position: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
    visible: bool,
    layers: u32,
    render_order: i32,
    #[serde(flatten)]
    kind: NodeKindDto,
    #[serde(default)]
    children: Vec<NodeDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneDocument {
    metadata: Metadata,
    geometries: Vec<GeometryDto>,
    materials: Vec<MaterialDto>,
    textures: Vec<TextureDto>,
    background: Option<[f32; 3]>,
    fog: Option<(f32, f32, [f32; 3])>,
    object: NodeDto,
}

impl Scene {
    /// Serialize this scene to the versioned JSON scene description
    pub fn to_json(&self) -> Result<String, JsonError> {
        to_json(self)
    }

    /// Build a scene from the versioned JSON scene description
    pub fn from_json(text: &str) -> Result<Self, JsonError> {
        from_json(text)
    }
}

/// Serialize a scene to a JSON document string
pub fn to_json(scene: &Scene) -> Result<String, JsonError> {
    let mut geometry_table = Vec::new();
    let mut geometry_index = HashMap::new();
    let mut material_table = Vec::new();
    let mut material_index = HashMap::new();
    let mut texture_table = Vec::new();
    let mut texture_index = HashMap::new();

    // Walk the graph first so only referenced resources persist
    let object = export_node(
        scene,
        scene.root(),
        &mut ExportTables {
            scene,
            geometry_table: &mut geometry_table,
            geometry_index: &mut geometry_index,
            material_table: &mut material_table,
            material_index: &mut material_index,
            texture_table: &mut texture_table,
            texture_index: &mut texture_index,
        },
    );

    let document = SceneDocument {
        metadata: Metadata {
            version: FORMAT_VERSION,
            kind: "Scene".to_string(),
            generator: "scene_engine".to_string(),
        },
        geometries: geometry_table,
        materials: material_table,
        textures: texture_table,
        background: scene.background,
        fog: scene.fog.map(|f| (f.near, f.far, f.color)),
        object,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Deserialize a scene from a JSON document string
pub fn from_json(text: &str) -> Result<Scene, JsonError> {
    let document: SceneDocument = serde_json::from_str(text)?;
    if document.metadata.version != FORMAT_VERSION {
        return Err(JsonError::UnsupportedVersion(document.metadata.version));
    }

    let mut scene = Scene::new();

    let mut textures = Vec::with_capacity(document.textures.len());
    for dto in &document.textures {
        textures.push(scene.resources_mut().add_texture(import_texture(dto)));
    }
    let mut materials = Vec::with_capacity(document.materials.len());
    for dto in &document.materials {
        materials.push(
            scene
                .resources_mut()
                .add_material(import_material(dto, &textures)?),
        );
    }
    let mut geometries = Vec::with_capacity(document.geometries.len());
    for dto in &document.geometries {
        geometries.push(scene.resources_mut().add_geometry(import_geometry(dto)?));
    }

    // The document root maps onto the fresh scene's root node
    scene.background = document.background;
    scene.fog = document.fog.map(|(near, far, color)| Fog { color, near, far });
    {
        let root = scene.root();
        let node = scene.node_mut(root).unwrap_or_else(|| unreachable!());
        node.name = document.object.name.clone();
        node.visible = document.object.visible;
    }
    for child in &document.object.children {
        let key = import_node(&mut scene, child, &geometries, &materials)?;
        let root = scene.root();
        scene.add_child(root, key);
    }
    Ok(scene)
}

struct ExportTables<'a> {
    scene: &'a Scene,
    geometry_table: &'a mut Vec<GeometryDto>,
    geometry_index: &'a mut HashMap<GeometryKey, usize>,
    material_table: &'a mut Vec<MaterialDto>,
    material_index: &'a mut HashMap<MaterialKey, usize>,
    texture_table: &'a mut Vec<TextureDto>,
    texture_index: &'a mut HashMap<TextureKey, usize>,
}

impl ExportTables<'_> {
    fn geometry(&mut self, key: GeometryKey) -> usize {
        if let Some(&index) = self.geometry_index.get(&key) {
            return index;
        }
        let dto = self
            .scene
            .resources()
            .geometry(key)
            .map(export_geometry)
            .unwrap_or_else(|| GeometryDto {
                name: String::new(),
                attributes: HashMap::new(),
                morph_positions: Vec::new(),
                index: None,
                groups: Vec::new(),
            });
        self.geometry_table.push(dto);
        let index = self.geometry_table.len() - 1;
        self.geometry_index.insert(key, index);
        index
    }

    fn material(&mut self, key: MaterialKey) -> usize {
        if let Some(&index) = self.material_index.get(&key) {
            return index;
        }
        let map = self
            .scene
            .resources()
            .material(key)
            .and_then(|m| m.map)
            .map(|t| self.texture(t));
        let dto = self
            .scene
            .resources()
            .material(key)
            .map(|m| export_material(m, map))
            .unwrap_or_else(|| export_material(&Material::basic(), None));
        self.material_table.push(dto);
        let index = self.material_table.len() - 1;
        self.material_index.insert(key, index);
        index
    }

    fn texture(&mut self, key: TextureKey) -> usize {
        if let Some(&index) = self.texture_index.get(&key) {
            return index;
        }
        let dto = self
            .scene
            .resources()
            .texture(key)
            .map(export_texture)
            .unwrap_or_else(|| TextureDto {
                name: String::new(),
                width: 0,
                height: 0,
                format: "rgba8".to_string(),
                data: Vec::new(),
            });
        self.texture_table.push(dto);
        let index = self.texture_table.len() - 1;
        self.texture_index.insert(key, index);
        index
    }
}

fn export_node(scene: &Scene, key: NodeKey, tables: &mut ExportTables<'_>) -> NodeDto {
    let node = scene.node(key).unwrap_or_else(|| unreachable!());
    let transform = node.transform();
    let rotation = transform.rotation.quaternion();

    let kind = match &node.kind {
        NodeKind::Group => NodeKindDto::Group,
        NodeKind::Mesh(renderable) => NodeKindDto::Mesh {
            geometry: tables.geometry(renderable.geometry),
            materials: renderable
                .materials
                .iter()
                .map(|&m| tables.material(m))
                .collect(),
        },
        NodeKind::Line(renderable) => NodeKindDto::Line {
            geometry: tables.geometry(renderable.geometry),
            materials: renderable
                .materials
                .iter()
                .map(|&m| tables.material(m))
                .collect(),
        },
        NodeKind::Points(renderable) => NodeKindDto::Points {
            geometry: tables.geometry(renderable.geometry),
            materials: renderable
                .materials
                .iter()
                .map(|&m| tables.material(m))
                .collect(),
        },
        NodeKind::Camera(camera) => match camera.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => NodeKindDto::PerspectiveCamera {
                fov_y,
                aspect,
                near,
                far,
            },
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => NodeKindDto::OrthographicCamera {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
        },
        NodeKind::Light(light) => NodeKindDto::Light {
            kind: match light.kind {
                LightKind::Ambient => "ambient".to_string(),
                LightKind::Directional => "directional".to_string(),
                LightKind::Point { .. } => "point".to_string(),
                LightKind::Spot { .. } => "spot".to_string(),
            },
            color: light.color,
            intensity: light.intensity,
        },
    };

    NodeDto {
        name: node.name.clone(),
        position: transform.position.into(),
        rotation: [rotation.i, rotation.j, rotation.k, rotation.w],
        scale: transform.scale.into(),
        visible: node.visible,
        layers: node.layers.bits(),
        render_order: node.render_order,
        kind,
        children: node
            .children()
            .iter()
            .map(|&child| export_node(scene, child, tables))
            .collect(),
    }
}

fn import_node(
    scene: &mut Scene,
    dto: &NodeDto,
    geometries: &[GeometryKey],
    materials: &[MaterialKey],
) -> Result<NodeKey, JsonError> {
    let resolve_geometry = |index: usize| {
        geometries
            .get(index)
            .copied()
            .ok_or(JsonError::DanglingReference {
                kind: "geometry",
                index,
            })
    };
    let resolve_materials = |indices: &[usize]| {
        indices
            .iter()
            .map(|&index| {
                materials
                    .get(index)
                    .copied()
                    .ok_or(JsonError::DanglingReference {
                        kind: "material",
                        index,
                    })
            })
            .collect::<Result<Vec<MaterialKey>, JsonError>>()
    };

    let kind = match &dto.kind {
        NodeKindDto::Group => NodeKind::Group,
        NodeKindDto::Mesh {
            geometry,
            materials: m,
        } => NodeKind::Mesh(Renderable::new(resolve_geometry(*geometry)?, resolve_materials(m)?)),
        NodeKindDto::Line {
            geometry,
            materials: m,
        } => NodeKind::Line(Renderable::new(resolve_geometry(*geometry)?, resolve_materials(m)?)),
        NodeKindDto::Points {
            geometry,
            materials: m,
        } => NodeKind::Points(Renderable::new(resolve_geometry(*geometry)?, resolve_materials(m)?)),
        NodeKindDto::PerspectiveCamera {
            fov_y,
            aspect,
            near,
            far,
        } => NodeKind::Camera(Camera::perspective(*fov_y, *aspect, *near, *far)),
        NodeKindDto::OrthographicCamera {
            left,
            right,
            bottom,
            top,
            near,
            far,
        } => NodeKind::Camera(Camera::orthographic(*left, *right, *bottom, *top, *near, *far)),
        NodeKindDto::Light {
            kind,
            color,
            intensity,
        } => {
            let light = match kind.as_str() {
                "ambient" => Light::ambient(),
                "directional" => Light::directional(),
                "spot" => Light::spot(std::f32::consts::FRAC_PI_4),
                _ => Light::point(),
            };
            NodeKind::Light(light.with_color(*color).with_intensity(*intensity))
        }
    };

    let mut node = super::node::Node::new(dto.name.clone(), kind);
    node.set_position(Vec3::from(dto.position));
    node.set_rotation(Quat::new_normalize(Quaternion::new(
        dto.rotation[3],
        dto.rotation[0],
        dto.rotation[1],
        dto.rotation[2],
    )));
    node.set_scale(Vec3::from(dto.scale));
    node.visible = dto.visible;
    node.layers = Layers::from_bits_retain(dto.layers);
    node.render_order = dto.render_order;
    let key = scene.add_node(node);

    for child in &dto.children {
        let child_key = import_node(scene, child, geometries, materials)?;
        scene.add_child(key, child_key);
    }
    Ok(key)
}

fn export_attribute(attribute: &BufferAttribute) -> AttributeDto {
    let storage = match attribute.data() {
        AttributeData::F32(v) => StorageDto::F32(v.clone()),
        AttributeData::U32(v) => StorageDto::U32(v.clone()),
        AttributeData::U16(v) => StorageDto::U16(v.clone()),
        AttributeData::U8(v) => StorageDto::U8(v.clone()),
        AttributeData::I16(v) => StorageDto::I16(v.clone()),
        AttributeData::I8(v) => StorageDto::I8(v.clone()),
    };
    AttributeDto {
        item_size: attribute.item_size(),
        normalized: attribute.normalized(),
        storage,
    }
}

fn import_attribute(dto: &AttributeDto) -> Result<BufferAttribute, JsonError> {
    let data = match &dto.storage {
        StorageDto::F32(v) => AttributeData::F32(v.clone()),
        StorageDto::U32(v) => AttributeData::U32(v.clone()),
        StorageDto::U16(v) => AttributeData::U16(v.clone()),
        StorageDto::U8(v) => AttributeData::U8(v.clone()),
        StorageDto::I16(v) => AttributeData::I16(v.clone()),
        StorageDto::I8(v) => AttributeData::I8(v.clone()),
    };
    BufferAttribute::new(data, dto.item_size)
        .map(|attribute| attribute.with_normalized(dto.normalized))
        .map_err(|err| JsonError::InvalidAttribute(err.to_string()))
}

fn export_geometry(geometry: &BufferGeometry) -> GeometryDto {
    GeometryDto {
        name: geometry.name.clone(),
        attributes: geometry
            .attributes_sorted()
            .into_iter()
            .map(|(name, attribute)| (name.to_string(), export_attribute(attribute)))
            .collect(),
        morph_positions: geometry.morph_positions().iter().map(export_attribute).collect(),
        index: geometry
            .index()
            .map(|index| (0..index.count()).filter_map(|i| geometry.index_at(i)).collect()),
        groups: geometry
            .groups()
            .iter()
            .map(|g| GroupDto {
                start: g.start,
                count: g.count,
                material_index: g.material_index,
            })
            .collect(),
    }
}

fn import_geometry(dto: &GeometryDto) -> Result<BufferGeometry, JsonError> {
    let mut geometry = BufferGeometry::new();
    geometry.name = dto.name.clone();
    for (name, attribute) in &dto.attributes {
        geometry.set_attribute(name.clone(), import_attribute(attribute)?);
    }
    for morph in &dto.morph_positions {
        geometry.add_morph_positions(import_attribute(morph)?);
    }
    if let Some(index) = &dto.index {
        geometry.set_index(index);
    }
    for group in &dto.groups {
        geometry.add_group(group.start, group.count, group.material_index);
    }
    Ok(geometry)
}

fn export_material(material: &Material, map: Option<usize>) -> MaterialDto {
    use crate::material::MaterialKind;
    MaterialDto {
        name: material.name.clone(),
        kind: match material.kind {
            MaterialKind::Basic { color } => MaterialKindDto::Basic { color },
            MaterialKind::Standard {
                color,
                metallic,
                roughness,
                flat_shading,
            } => MaterialKindDto::Standard {
                color,
                metallic,
                roughness,
                flat_shading,
            },
            MaterialKind::Points {
                size,
                size_attenuation,
            } => MaterialKindDto::Points {
                size,
                size_attenuation,
            },
            MaterialKind::Line { width } => MaterialKindDto::Line { width },
        },
        map,
        transparent: material.transparent,
        opacity: material.opacity,
        alpha_test: material.alpha_test,
        transmission: material.transmission,
        vertex_colors: material.vertex_colors,
        fog: material.fog,
    }
}

fn import_material(dto: &MaterialDto, textures: &[TextureKey]) -> Result<Material, JsonError> {
    use crate::material::MaterialKind;
    let mut material = match dto.kind {
        MaterialKindDto::Basic { color } => {
            let mut m = Material::basic();
            m.kind = MaterialKind::Basic { color };
            m
        }
        MaterialKindDto::Standard {
            color,
            metallic,
            roughness,
            flat_shading,
        } => {
            let mut m = Material::standard();
            m.kind = MaterialKind::Standard {
                color,
                metallic,
                roughness,
                flat_shading,
            };
            m
        }
        MaterialKindDto::Points {
            size,
            size_attenuation,
        } => {
            let mut m = Material::points();
            m.kind = MaterialKind::Points {
                size,
                size_attenuation,
            };
            m
        }
        MaterialKindDto::Line { width } => {
            let mut m = Material::line();
            m.kind = MaterialKind::Line { width };
            m
        }
    };
    material.name = dto.name.clone();
    if let Some(index) = dto.map {
        material.map = Some(*textures.get(index).ok_or(JsonError::DanglingReference {
            kind: "texture",
            index,
        })?);
    }
    material.transparent = dto.transparent;
    material.opacity = dto.opacity;
    material.alpha_test = dto.alpha_test;
    material.transmission = dto.transmission;
    material.vertex_colors = dto.vertex_colors;
    material.fog = dto.fog;
    if material.transparent {
        material.blend = crate::material::BlendMode::Normal;
        material.depth_write = false;
    }
    Ok(material)
}

fn export_texture(texture: &Texture) -> TextureDto {
    TextureDto {
        name: texture.name.clone(),
        width: texture.width,
        height: texture.height,
        format: match texture.format {
            TextureFormat::Rgba8 => "rgba8",
            TextureFormat::Rgb8 => "rgb8",
            TextureFormat::R8 => "r8",
            TextureFormat::Rgba16F => "rgba16f",
        }
        .to_string(),
        data: texture.data.clone(),
    }
}

fn import_texture(dto: &TextureDto) -> Texture {
    let format = match dto.format.as_str() {
        "rgb8" => TextureFormat::Rgb8,
        "r8" => TextureFormat::R8,
        "rgba16f" => TextureFormat::Rgba16F,
        _ => TextureFormat::Rgba8,
    };
    let mut texture = Texture::new(dto.width, dto.height, format, dto.data.clone());
    texture.name = dto.name.clone();
    texture
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::BlendMode;

    fn sample_scene() -> Scene {
        let mut scene = Scene::new();
        let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(1.0));
        let texture = scene.resources_mut().add_texture(Texture::white());
        let material = scene
            .resources_mut()
            .add_material(Material::standard().with_map(texture));

        let first = scene.add_mesh("first", geometry, vec![material]);
        let second = scene.add_mesh("second", geometry, vec![material]);
        scene.add_child(scene.root(), first);
        scene.add_child(first, second);
        scene.set_position(second, Vec3::new(0.0, 2.0, 0.0));
        scene.background = Some([0.1, 0.2, 0.3]);
        scene
    }

    #[test]
    fn test_shared_resources_serialize_once() {
        let scene = sample_scene();
        let text = to_json(&scene).unwrap();
        let document: SceneDocument = serde_json::from_str(&text).unwrap();

        // Two meshes, one geometry entry, one material entry, one texture
        assert_eq!(document.geometries.len(), 1);
        assert_eq!(document.materials.len(), 1);
        assert_eq!(document.textures.len(), 1);
    }

    #[test]
    fn test_round_trip_preserves_graph_and_transforms() {
        let scene = sample_scene();
        let text = to_json(&scene).unwrap();
        let restored = from_json(&text).unwrap();

        let second = restored.get_object_by_name("second").unwrap();
        let node = restored.node(second).unwrap();
        assert_eq!(node.transform().position, Vec3::new(0.0, 2.0, 0.0));

        let parent = node.parent().unwrap();
        assert_eq!(restored.node(parent).unwrap().name, "first");
        assert_eq!(restored.background, Some([0.1, 0.2, 0.3]));

        // The mesh kept a usable geometry reference
        let renderable = node.kind.renderable().unwrap();
        let geometry = restored.resources().geometry(renderable.geometry).unwrap();
        assert_eq!(geometry.vertex_count(), 24);
    }

    #[test]
    fn test_transparent_material_restores_render_state() {
        let mut scene = Scene::new();
        let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(1.0));
        let material = scene
            .resources_mut()
            .add_material(Material::standard().with_transparency(0.25));
        let mesh = scene.add_mesh("glassy", geometry, vec![material]);
        scene.add_child(scene.root(), mesh);

        let restored = from_json(&to_json(&scene).unwrap()).unwrap();
        let key = restored.get_object_by_name("glassy").unwrap();
        let renderable = restored.node(key).unwrap().kind.renderable().unwrap();
        let material = restored
            .resources()
            .material(renderable.materials[0])
            .unwrap();
        assert!(material.transparent);
        assert_eq!(material.blend, BlendMode::Normal);
        assert!((material.opacity - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let scene = Scene::new();
        let text = to_json(&scene).unwrap();
        let bumped = text.replace("\"version\": 1", "\"version\": 99");
        assert!(matches!(
            from_json(&bumped),
            Err(JsonError::UnsupportedVersion(99))
        ));
    }
}
