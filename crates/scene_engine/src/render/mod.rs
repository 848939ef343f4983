//! # Rendering System
//!
//! The per-frame orchestrator over the scene graph: matrix propagation,
//! frustum culling and light collection, render-list construction, program
//! resolution through the cache, GPU resource sync, state diffing, and draw
//! submission. The renderer owns every GPU-facing cache (programs, buffer
//! and texture side tables) and tears them down at `dispose`; nothing is
//! process-global, so renderer instances never leak state into each other.
//!
//! ## Frame phases
//!
//! `Idle → SceneProcess → ListBuild → Draw → Present`, fully serialized:
//! a frame runs to completion before the next begins, and a failure in one
//! object's draw path logs a diagnostic and moves on. `render` always
//! completes.

pub mod backend;
mod list;
mod resources;
mod state;

pub use backend::{
    BackendError, BackendResult, BufferHandle, BufferKind, Capabilities, DrawCall,
    HeadlessBackend, ProgramHandle, RecordedCommand, RenderBackend, RenderTargetHandle,
    TextureHandle, Topology, VertexBinding,
};
pub use list::{Bucket, RenderItem, RenderList};
pub use resources::{
    BufferRecord, GeometryManager, GeometryRecord, TextureManager, TextureRecord, UploadStats,
};
pub use state::{StateCommand, StateTracker, StencilState};

use std::collections::HashMap;

use thiserror::Error;

use crate::config::RendererConfig;
use crate::events::DisposeEvent;
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{Frustum, GeometryKey, Plane};
use crate::material::program::{FeatureFlags, ProgramCache, ProgramKey};
use crate::material::{Material, MaterialKey, UniformValue};
use crate::scene::{
    Camera, CollectedDirectional, CollectedPoint, CollectedSpot, LightKind, LightingEnvironment,
    NodeKey, NodeKind, Scene,
};

/// Errors surfaced by the renderer's public entry points
///
/// Per-object draw failures never reach here; they are logged and the frame
/// continues. These errors indicate caller bugs or backend loss.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The camera key did not resolve to a live node
    #[error("camera node not found in scene")]
    CameraNotFound,

    /// The node exists but carries no camera payload
    #[error("node '{0}' is not a camera")]
    NotACamera(String),

    /// Forwarded backend failure outside the per-object draw path
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Frame state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// Between frames
    #[default]
    Idle,
    /// Matrix propagation, culling, light collection
    SceneProcess,
    /// Bucketing and sorting
    ListBuild,
    /// Draw submission
    Draw,
    /// Frame presentation
    Present,
}

/// Statistics for the most recently completed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames completed since construction
    pub frames: u64,
    /// Draw calls issued last frame
    pub draw_calls: u64,
    /// Triangles submitted last frame
    pub triangles: u64,
    /// Objects rejected by frustum or layer culling last frame
    pub culled: u64,
    /// Programs compiled since construction
    pub programs_compiled: u64,
    /// State transitions emitted since construction
    pub state_transitions: u64,
}

struct Candidate {
    node: NodeKey,
    geometry: GeometryKey,
    materials: Vec<MaterialKey>,
    topology: Topology,
    instances: usize,
    frustum_culled: bool,
    render_order: i32,
    world: Mat4,
}

/// High-level rendering coordinator
///
/// Drives a [`RenderBackend`] through the abstract draw/state interface and
/// owns all GPU-facing caches for its lifetime.
pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    capabilities: Capabilities,
    config: RendererConfig,
    programs: ProgramCache,
    geometries: GeometryManager,
    textures: TextureManager,
    state: StateTracker,
    list: RenderList,
    lights: LightingEnvironment,
    clipping_planes: Vec<Plane>,
    material_programs: HashMap<MaterialKey, ProgramKey>,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    render_target: Option<RenderTargetHandle>,
    transmission_target: Option<RenderTargetHandle>,
    phase: FramePhase,
    stats: RenderStats,
}

impl Renderer {
    /// Create a renderer over a backend
    ///
    /// Capabilities are detected once here and cached; they are never
    /// rechecked per draw.
    pub fn new(backend: Box<dyn RenderBackend>, config: RendererConfig) -> Self {
        let capabilities = backend.capabilities();
        log::debug!("renderer capabilities: {capabilities:?}");
        Self {
            backend,
            capabilities,
            config,
            programs: ProgramCache::new(),
            geometries: GeometryManager::new(),
            textures: TextureManager::new(),
            state: StateTracker::new(),
            list: RenderList::new(),
            lights: LightingEnvironment::default(),
            clipping_planes: Vec::new(),
            material_programs: HashMap::new(),
            width: 800,
            height: 600,
            pixel_ratio: 1.0,
            render_target: None,
            transmission_target: None,
            phase: FramePhase::Idle,
            stats: RenderStats::default(),
        }
    }

    /// Create a renderer over a recording [`HeadlessBackend`]
    pub fn headless(config: RendererConfig) -> Self {
        Self::new(Box::new(HeadlessBackend::new()), config)
    }

    /// Detected backend capabilities
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Statistics for the most recently completed frame
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Current frame phase (`Idle` between frames)
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// The render list built by the last frame
    pub fn render_list(&self) -> &RenderList {
        &self.list
    }

    /// Lights collected by the last frame
    pub fn lights(&self) -> &LightingEnvironment {
        &self.lights
    }

    /// Set user clipping planes applied to every draw
    ///
    /// The plane count participates in the program fingerprint, so changing
    /// it regroups draws onto different compiled programs.
    pub fn set_clipping_planes(&mut self, planes: Vec<Plane>) {
        self.clipping_planes = planes;
    }

    /// Borrow the backend, e.g. to inspect a [`HeadlessBackend`] in tests
    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// Set the drawing-buffer size in logical pixels
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.drop_transmission_target();
        self.apply_viewport();
    }

    /// Set the device pixel ratio
    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(0.1);
        self.drop_transmission_target();
        self.apply_viewport();
    }

    /// Redirect output to an offscreen target, or back to the default
    pub fn set_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.render_target = target;
        // Driver state cannot be assumed across a target switch
        self.state.invalidate();
    }

    /// Create an offscreen render target at the current pixel size
    pub fn create_render_target(&mut self, samples: u32) -> RenderResult<RenderTargetHandle> {
        let (w, h) = self.physical_size();
        Ok(self.backend.create_render_target(w, h, samples)?)
    }

    fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.pixel_ratio) as u32,
            (self.height as f32 * self.pixel_ratio) as u32,
        )
    }

    fn apply_viewport(&mut self) {
        let (w, h) = self.physical_size();
        self.backend.set_viewport(0, 0, w, h);
    }

    fn drop_transmission_target(&mut self) {
        if let Some(target) = self.transmission_target.take() {
            self.backend.delete_render_target(target);
        }
    }

    /// Pre-warm the program cache for every material in a scene
    ///
    /// Resolves and compiles the programs `render` would need, without
    /// issuing draws. Useful to move compile stalls off the first frame.
    pub fn compile(&mut self, scene: &mut Scene, camera: NodeKey) -> RenderResult<()> {
        scene.update_matrix_world(false);
        let (_, camera_payload) = self.camera_of(scene, camera)?;
        self.collect_lights(scene, camera_payload);

        let mut materials = Vec::new();
        scene.traverse(scene.root(), |_, node| {
            if let Some(renderable) = node.kind.renderable() {
                for &material in &renderable.materials {
                    materials.push((
                        material,
                        renderable.morph_influences.len(),
                        renderable.instances > 1,
                        renderable.skinned,
                    ));
                }
            }
        });
        for (key, morph_targets, instanced, skinned) in materials {
            let Some(material) = scene.resources().material(key).cloned() else {
                continue;
            };
            self.resolve_program(key, &material, scene, morph_targets, instanced, skinned);
        }
        Ok(())
    }

    /// Render one frame of a scene through a camera node
    ///
    /// Runs the full phase sequence and always completes: per-object
    /// failures (missing resources, compile failures, backend draw errors)
    /// degrade to logged diagnostics and skipped draws.
    pub fn render(&mut self, scene: &mut Scene, camera: NodeKey) -> RenderResult<()> {
        // Dispose events queued since the last frame are honored first so
        // freed CPU resources cannot be resurrected by this frame's sync.
        self.process_dispose_events(scene);

        self.phase = FramePhase::SceneProcess;
        scene.update_matrix_world(false);

        let (camera_world, camera_payload) = self.camera_of(scene, camera)?;
        let view = camera_world
            .try_inverse()
            .unwrap_or_else(Mat4::identity);
        let projection = camera_payload.projection_matrix();
        let frustum = Frustum::from_matrix(&(projection * view));

        self.collect_lights(scene, camera_payload);
        let candidates = Self::collect_candidates(scene, camera_payload);

        self.phase = FramePhase::ListBuild;
        self.build_list(scene, &frustum, &view, candidates);
        self.list.sort();

        self.phase = FramePhase::Draw;
        self.state.invalidate();
        let background = scene.background.unwrap_or([0.0, 0.0, 0.0]);

        let mut frame_draws = 0_u64;
        let mut frame_triangles = 0_u64;

        // Transmissive draws render first, into the offscreen transmission
        // target the main pass samples from.
        if !self.list.transmissive().is_empty() {
            let target = self.ensure_transmission_target()?;
            self.backend.bind_render_target(Some(target));
            self.backend
                .clear([background[0], background[1], background[2], 1.0], 1.0);
            self.state.invalidate();
            let items: Vec<RenderItem> = self.list.transmissive().to_vec();
            for item in &items {
                self.draw_item(scene, item, &view, &projection, &mut frame_draws, &mut frame_triangles);
            }
            let blit = !self.capabilities.multisample_to_texture;
            self.backend.resolve_render_target(target, blit);
        }

        self.backend.bind_render_target(self.render_target);
        self.backend
            .clear([background[0], background[1], background[2], 1.0], 1.0);
        self.state.invalidate();

        let opaque: Vec<RenderItem> = self.list.opaque().to_vec();
        for item in &opaque {
            self.draw_item(scene, item, &view, &projection, &mut frame_draws, &mut frame_triangles);
        }
        let transparent: Vec<RenderItem> = self.list.transparent().to_vec();
        for item in &transparent {
            self.draw_item(scene, item, &view, &projection, &mut frame_draws, &mut frame_triangles);
        }

        self.phase = FramePhase::Present;
        self.backend.present();

        self.stats.frames += 1;
        self.stats.draw_calls = frame_draws;
        self.stats.triangles = frame_triangles;
        self.stats.programs_compiled = self.programs.compile_count();
        self.stats.state_transitions = self.state.transitions();

        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Tear down every GPU-facing cache
    ///
    /// With the leak check enabled, side-table entries still live here
    /// (resources the application never disposed) are reported before they
    /// are force-freed.
    pub fn dispose(&mut self) {
        if self.config.debug_leak_check
            && (!self.geometries.is_empty() || !self.textures.is_empty())
        {
            log::warn!(
                "renderer disposed with {} geometry and {} texture records still live; \
                 missing dispose calls on the CPU side",
                self.geometries.len(),
                self.textures.len()
            );
        }
        self.geometries.clear(self.backend.as_mut());
        self.textures.clear(self.backend.as_mut());
        self.programs.clear(self.backend.as_mut());
        self.material_programs.clear();
        self.drop_transmission_target();
        if let Some(target) = self.render_target.take() {
            self.backend.delete_render_target(target);
        }
    }

    fn camera_of(&self, scene: &Scene, camera: NodeKey) -> RenderResult<(Mat4, Camera)> {
        let node = scene.node(camera).ok_or(RenderError::CameraNotFound)?;
        match &node.kind {
            NodeKind::Camera(payload) => Ok((*node.matrix_world(), *payload)),
            _ => Err(RenderError::NotACamera(node.name.clone())),
        }
    }

    fn process_dispose_events(&mut self, scene: &mut Scene) {
        for event in scene.resources_mut().dispose_queue_mut().drain() {
            match event {
                DisposeEvent::Geometry(key) => self.geometries.dispose(self.backend.as_mut(), key),
                DisposeEvent::Texture(key) => self.textures.dispose(self.backend.as_mut(), key),
                DisposeEvent::Material(key) => {
                    if let Some(program_key) = self.material_programs.remove(&key) {
                        self.programs.release(self.backend.as_mut(), &program_key);
                    }
                }
            }
        }
    }

    fn collect_lights(&mut self, scene: &Scene, camera: Camera) {
        self.lights.clear();
        let lights = &mut self.lights;
        scene.traverse_visible(scene.root(), |_, node| {
            let NodeKind::Light(light) = &node.kind else {
                return;
            };
            if !node.layers.test(camera.layers) {
                return;
            }
            let color = [
                light.color[0] * light.intensity,
                light.color[1] * light.intensity,
                light.color[2] * light.intensity,
            ];
            let world = node.matrix_world();
            // Lights shine along their node's -Z axis
            let direction = -Vec3::new(world.m13, world.m23, world.m33).normalize();
            match light.kind {
                LightKind::Ambient => {
                    lights.ambient[0] += color[0];
                    lights.ambient[1] += color[1];
                    lights.ambient[2] += color[2];
                }
                LightKind::Directional => {
                    lights.directional.push(CollectedDirectional { direction, color });
                }
                LightKind::Point { distance, decay } => {
                    lights.point.push(CollectedPoint {
                        position: node.world_position(),
                        color,
                        distance,
                        decay,
                    });
                }
                LightKind::Spot { angle, penumbra, .. } => {
                    lights.spot.push(CollectedSpot {
                        position: node.world_position(),
                        direction,
                        color,
                        cos_angle: angle.cos(),
                        penumbra,
                    });
                }
            }
            lights.shadows |= light.cast_shadow;
        });
    }

    fn collect_candidates(scene: &Scene, camera: Camera) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        scene.traverse_visible(scene.root(), |key, node| {
            let Some(renderable) = node.kind.renderable() else {
                return;
            };
            if !node.layers.test(camera.layers) {
                return;
            }
            let topology = match node.kind {
                NodeKind::Line(_) => Topology::Lines,
                NodeKind::Points(_) => Topology::Points,
                _ => Topology::Triangles,
            };
            candidates.push(Candidate {
                node: key,
                geometry: renderable.geometry,
                materials: renderable.materials.clone(),
                topology,
                instances: renderable.instances,
                frustum_culled: renderable.frustum_culled,
                render_order: node.render_order,
                world: *node.matrix_world(),
            });
        });
        candidates
    }

    fn build_list(
        &mut self,
        scene: &mut Scene,
        frustum: &Frustum,
        view: &Mat4,
        candidates: Vec<Candidate>,
    ) {
        self.list.clear();
        let mut culled = 0_u64;

        for candidate in candidates {
            if candidate.frustum_culled {
                let sphere = match Self::world_bounding_sphere(scene, &candidate) {
                    Some(sphere) => sphere,
                    None => {
                        log::warn!("mesh references a disposed geometry, skipping");
                        continue;
                    }
                };
                if !frustum.intersects_sphere(&sphere) {
                    culled += 1;
                    continue;
                }
            }

            let origin = Vec3::new(candidate.world.m14, candidate.world.m24, candidate.world.m34);
            let view_pos = view.transform_point(&origin.into());
            let depth = -view_pos.z;

            let Some(geometry) = scene.resources().geometry(candidate.geometry) else {
                continue;
            };
            let groups = geometry.groups().to_vec();

            if groups.is_empty() {
                let Some(&material) = candidate.materials.first() else {
                    log::warn!("renderable without materials, skipping");
                    continue;
                };
                self.push_item(scene, &candidate, material, None, depth);
            } else {
                for group in groups {
                    let Some(&material) = candidate.materials.get(group.material_index) else {
                        log::warn!(
                            "group material index {} out of bounds, skipping group",
                            group.material_index
                        );
                        continue;
                    };
                    self.push_item(scene, &candidate, material, Some(group), depth);
                }
            }
        }

        self.stats.culled = culled;
    }

    fn push_item(
        &mut self,
        scene: &Scene,
        candidate: &Candidate,
        material_key: MaterialKey,
        group: Option<crate::geometry::GeometryGroup>,
        depth: f32,
    ) {
        let Some(material) = scene.resources().material(material_key) else {
            log::warn!("mesh references a disposed material, skipping");
            return;
        };
        let bucket = if material.transmission > 0.0 {
            Bucket::Transmissive
        } else if material.transparent {
            Bucket::Transparent
        } else {
            Bucket::Opaque
        };
        self.list.push(
            bucket,
            RenderItem {
                node: candidate.node,
                geometry: candidate.geometry,
                material: material_key,
                group,
                topology: candidate.topology,
                depth,
                render_order: candidate.render_order,
                instances: candidate.instances,
            },
        );
    }

    fn world_bounding_sphere(
        scene: &mut Scene,
        candidate: &Candidate,
    ) -> Option<crate::geometry::BoundingSphere> {
        let geometry = scene.resources_mut().geometry_mut(candidate.geometry)?;
        let sphere = match geometry.bounding_sphere() {
            Some(sphere) => *sphere,
            None => geometry.compute_bounding_sphere().ok()?,
        };
        Some(sphere.transformed(&candidate.world))
    }

    fn derive_program_key(
        &self,
        material: &Material,
        scene: &Scene,
        morph_targets: usize,
        instanced: bool,
        skinned: bool,
    ) -> ProgramKey {
        let mut flags = FeatureFlags::empty();
        flags.set(FeatureFlags::MAP, material.map.is_some());
        flags.set(FeatureFlags::ENV_MAP, material.env_map.is_some());
        flags.set(FeatureFlags::NORMAL_MAP, material.normal_map.is_some());
        flags.set(FeatureFlags::SKINNING, skinned);
        flags.set(FeatureFlags::MORPH_TARGETS, morph_targets > 0);
        flags.set(FeatureFlags::VERTEX_COLORS, material.vertex_colors);
        flags.set(
            FeatureFlags::FLAT_SHADING,
            matches!(
                material.kind,
                crate::material::MaterialKind::Standard { flat_shading: true, .. }
            ),
        );
        flags.set(FeatureFlags::FOG, material.fog && scene.fog.is_some());
        flags.set(FeatureFlags::INSTANCING, instanced);
        flags.set(FeatureFlags::ALPHA_TEST, material.alpha_test.is_some());
        flags.set(
            FeatureFlags::DOUBLE_SIDED,
            material.side == crate::material::Side::Double,
        );
        flags.set(FeatureFlags::TRANSMISSION, material.transmission > 0.0);
        flags.set(FeatureFlags::SHADOWS, self.lights.shadows);
        flags.set(FeatureFlags::TONE_MAPPING, self.config.tone_mapping);
        flags.set(FeatureFlags::SRGB_OUTPUT, self.config.srgb_output);

        ProgramKey {
            template: material.shader_template(),
            flags,
            dir_lights: self.lights.directional.len().min(255) as u8,
            point_lights: self.lights.point.len().min(255) as u8,
            spot_lights: self.lights.spot.len().min(255) as u8,
            clipping_planes: self.clipping_planes.len().min(255) as u8,
            morph_targets: morph_targets.min(255) as u8,
        }
    }

    fn resolve_program(
        &mut self,
        material_key: MaterialKey,
        material: &Material,
        scene: &Scene,
        morph_targets: usize,
        instanced: bool,
        skinned: bool,
    ) -> ProgramKey {
        let key = self.derive_program_key(material, scene, morph_targets, instanced, skinned);
        match self.material_programs.get(&material_key) {
            Some(cached) if *cached == key => {}
            Some(&stale) => {
                self.programs.acquire(self.backend.as_mut(), key);
                self.programs.release(self.backend.as_mut(), &stale);
                self.material_programs.insert(material_key, key);
            }
            None => {
                self.programs.acquire(self.backend.as_mut(), key);
                self.material_programs.insert(material_key, key);
            }
        }
        key
    }

    #[allow(clippy::too_many_lines)]
    fn draw_item(
        &mut self,
        scene: &mut Scene,
        item: &RenderItem,
        view: &Mat4,
        projection: &Mat4,
        frame_draws: &mut u64,
        frame_triangles: &mut u64,
    ) {
        let Some(material) = scene.resources().material(item.material).cloned() else {
            log::warn!("draw references a disposed material, skipping");
            return;
        };
        let Some(node_world) = scene.node(item.node).map(|n| *n.matrix_world()) else {
            return;
        };
        let (morph_targets, skinned) = scene
            .node(item.node)
            .and_then(|n| n.kind.renderable())
            .map_or((0, false), |r| (r.morph_influences.len(), r.skinned));

        // Program resolution (cache hit re-binds only differing uniforms)
        let program_key = self.resolve_program(
            item.material,
            &material,
            scene,
            morph_targets,
            item.instances > 1,
            skinned,
        );

        // Texture sync must happen before the program borrow below
        let map_handle = match material.map {
            Some(texture_key) => match scene.resources().texture(texture_key) {
                Some(texture) => {
                    match self
                        .textures
                        .update(self.backend.as_mut(), texture_key, texture)
                    {
                        Ok(handle) => Some(handle),
                        Err(err) => {
                            log::warn!("texture sync failed, drawing untextured: {err}");
                            None
                        }
                    }
                }
                None => {
                    log::warn!("material references a disposed texture, drawing untextured");
                    None
                }
            },
            None => None,
        };

        // Geometry sync (full or dirty-range upload)
        {
            let Some(geometry) = scene.resources_mut().geometry_mut(item.geometry) else {
                log::warn!("draw references a disposed geometry, skipping");
                return;
            };
            if let Err(err) = self
                .geometries
                .update(self.backend.as_mut(), item.geometry, geometry)
            {
                log::warn!("geometry sync failed, skipping draw: {err}");
                return;
            }
        }

        // State diff against the previous draw
        self.state.apply_material(self.backend.as_mut(), &material);

        let lights = self.lights.clone();
        let Some(program) = self.programs.get_mut(&program_key) else {
            return;
        };
        let Some(program_handle) = program.handle() else {
            // Compile failure already logged as a diagnostic; skip the draw
            return;
        };

        let backend = self.backend.as_mut();
        program.set_uniform(backend, "projection_matrix", UniformValue::Mat4(mat4_array(projection)));
        program.set_uniform(backend, "view_matrix", UniformValue::Mat4(mat4_array(view)));
        program.set_uniform(backend, "model_matrix", UniformValue::Mat4(mat4_array(&node_world)));
        program.set_uniform(backend, "opacity", UniformValue::Float(material.opacity));
        if let Some(cutoff) = material.alpha_test {
            program.set_uniform(backend, "alpha_test", UniformValue::Float(cutoff));
        }
        match material.kind {
            crate::material::MaterialKind::Basic { color } => {
                program.set_uniform(backend, "color", UniformValue::Vec3(color));
            }
            crate::material::MaterialKind::Standard {
                color,
                metallic,
                roughness,
                ..
            } => {
                program.set_uniform(backend, "color", UniformValue::Vec3(color));
                program.set_uniform(backend, "metallic", UniformValue::Float(metallic));
                program.set_uniform(backend, "roughness", UniformValue::Float(roughness));
            }
            crate::material::MaterialKind::Points { size, .. } => {
                program.set_uniform(backend, "point_size", UniformValue::Float(size));
            }
            crate::material::MaterialKind::Line { width } => {
                program.set_uniform(backend, "line_width", UniformValue::Float(width));
            }
        }
        program.set_uniform(backend, "ambient_color", UniformValue::Vec3(lights.ambient));
        for (i, light) in lights.directional.iter().enumerate() {
            program.set_uniform(
                backend,
                &format!("dir_lights[{i}].direction"),
                UniformValue::Vec3([light.direction.x, light.direction.y, light.direction.z]),
            );
            program.set_uniform(
                backend,
                &format!("dir_lights[{i}].color"),
                UniformValue::Vec3(light.color),
            );
        }
        for (i, light) in lights.point.iter().enumerate() {
            program.set_uniform(
                backend,
                &format!("point_lights[{i}].position"),
                UniformValue::Vec3([light.position.x, light.position.y, light.position.z]),
            );
            program.set_uniform(
                backend,
                &format!("point_lights[{i}].color"),
                UniformValue::Vec3(light.color),
            );
        }
        if let Some(handle) = map_handle {
            backend.bind_texture(0, handle);
            program.set_uniform(backend, "map", UniformValue::Sampler(0));
        }

        // Assemble the draw call from the synced records
        let Some(record) = self.geometries.record(item.geometry) else {
            return;
        };
        let Some(geometry) = scene.resources().geometry(item.geometry) else {
            return;
        };

        let mut vertex_buffers = Vec::new();
        for (name, attribute) in geometry.attributes_sorted() {
            let Some(buffer) = record.attribute(name) else {
                continue;
            };
            vertex_buffers.push(VertexBinding {
                buffer: buffer.handle,
                item_size: attribute.item_size(),
                normalized: attribute.normalized(),
            });
        }

        let index_u16 = geometry
            .index()
            .is_some_and(|i| matches!(i.data(), crate::geometry::AttributeData::U16(_)));
        let (start, count) = match item.group {
            Some(group) => {
                let full = geometry.draw_count();
                (group.start, group.count.min(full.saturating_sub(group.start)))
            }
            None => (
                geometry.draw_range().map_or(0, |(start, _)| start),
                geometry.draw_count(),
            ),
        };

        let call = DrawCall {
            program: program_handle,
            vertex_buffers,
            index_buffer: record.index().map(|r| r.handle),
            index_u16,
            start,
            count,
            instances: item.instances,
            topology: item.topology,
        };

        match self.backend.draw(&call) {
            Ok(()) => {
                *frame_draws += 1;
                if item.topology == Topology::Triangles {
                    *frame_triangles += (count as u64 / 3) * item.instances as u64;
                }
            }
            Err(err) => {
                // One failed object never aborts the render-list loop
                log::warn!("draw call failed, continuing frame: {err}");
            }
        }
    }

    fn ensure_transmission_target(&mut self) -> RenderResult<RenderTargetHandle> {
        if let Some(target) = self.transmission_target {
            return Ok(target);
        }
        let (w, h) = self.physical_size();
        let cap = self.config.max_transmission_size;
        let samples = if self.config.antialias { 4 } else { 1 };
        let target = self
            .backend
            .create_render_target(w.min(cap), h.min(cap), samples)?;
        self.transmission_target = Some(target);
        Ok(target)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn mat4_array(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}

#[cfg(test)]
mod render_tests;
