//! # Scene Engine
//!
//! A retained-mode 3D scene-graph and rendering core.
//!
//! ## Features
//!
//! - **Scene Graph**: Hierarchical transform nodes with lazy world-matrix propagation
//! - **Buffer Geometry**: Typed per-vertex attribute buffers with incremental GPU upload
//! - **Program Cache**: Shader programs shared across draws by feature fingerprint
//! - **State-Diffing Renderer**: Per-frame cull, sort and draw with minimal state transitions
//! - **Explicit GPU Lifetime**: Resources freed only on dispose events, never implicitly
//! - **Animation Mixer**: Keyframe track evaluation with weighted and additive blending
//!
//! The graphics API itself is not part of this crate: the renderer drives a
//! [`render::RenderBackend`] implementation through an abstract draw/state
//! interface, and ships a recording [`render::HeadlessBackend`] for tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! let mut scene = Scene::new();
//! let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(1.0));
//! let material = scene.resources_mut().add_material(Material::standard());
//! let mesh = scene.add_mesh("cube", geometry, vec![material]);
//! scene.add_child(scene.root(), mesh);
//!
//! let camera = Camera::perspective(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
//! let cam_node = scene.add_camera("main", camera);
//! scene.add_child(scene.root(), cam_node);
//! scene.set_position(cam_node, Vec3::new(0.0, 0.0, 5.0));
//!
//! let mut renderer = Renderer::headless(RendererConfig::default());
//! renderer.render(&mut scene, cam_node).unwrap();
//! ```

// Foundation layer
pub mod foundation;

// Core data model
pub mod geometry;
pub mod material;
pub mod scene;

// Renderer and GPU resource management
pub mod render;

// Animation evaluation and blending
pub mod animation;

// Ambient concerns
pub mod config;
pub mod events;

pub use config::{ConfigError, RendererConfig};
pub use render::Renderer;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        animation::{AnimationClip, AnimationMixer, KeyframeTrack, LoopMode},
        config::RendererConfig,
        foundation::math::{Mat4, Quat, Transform, Vec2, Vec3, Vec4},
        geometry::{AttributeData, BufferAttribute, BufferGeometry},
        material::{Material, Texture},
        render::{RenderBackend, Renderer},
        scene::{Camera, Light, Node, NodeKey, Scene},
    };
}
