//! Material system
//!
//! A [`Material`] is a pure render-state and uniform descriptor. It never
//! owns a compiled program: the renderer derives a feature fingerprint from
//! the material and the active scene and resolves it through the
//! [`program::ProgramCache`], so draws with identical requirements share one
//! compiled program.

pub mod program;
mod texture;

pub use program::{FeatureFlags, Program, ProgramCache, ProgramKey, ShaderTemplate, UniformValue};
pub use texture::{Texture, TextureFilter, TextureFormat, TextureWrap};

slotmap::new_key_type! {
    /// Non-owning handle to a [`Material`] in the resource store
    pub struct MaterialKey;

    /// Non-owning handle to a [`Texture`] in the resource store
    pub struct TextureKey;
}

/// Which faces are rasterized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    /// Cull back faces
    #[default]
    Front,
    /// Cull front faces
    Back,
    /// No face culling
    Double,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthFunc {
    /// Never passes
    Never,
    /// Passes when incoming depth is less
    #[default]
    Less,
    /// Passes when incoming depth is less or equal
    LessEqual,
    /// Passes on equality
    Equal,
    /// Passes when incoming depth is greater or equal
    GreaterEqual,
    /// Passes when incoming depth is greater
    Greater,
    /// Passes on inequality
    NotEqual,
    /// Always passes
    Always,
}

/// Blend equation for custom blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendEquation {
    /// src * srcFactor + dst * dstFactor
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

/// Blend factor for custom blending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
}

/// How a fragment is combined with the framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Overwrite (blending disabled)
    #[default]
    None,
    /// Standard alpha blending
    Normal,
    /// Additive accumulation
    Additive,
    /// Multiplicative darkening
    Multiply,
    /// Explicit equation and factors
    Custom {
        /// Blend equation
        equation: BlendEquation,
        /// Source factor
        src: BlendFactor,
        /// Destination factor
        dst: BlendFactor,
    },
}

/// Shading model and its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    /// Unlit flat color/texture shading
    Basic {
        /// Base color (RGB)
        color: [f32; 3],
    },
    /// Physically-based standard shading
    Standard {
        /// Base color (RGB)
        color: [f32; 3],
        /// Metallic factor (0.0 = dielectric, 1.0 = metallic)
        metallic: f32,
        /// Roughness factor (0.0 = mirror, 1.0 = completely rough)
        roughness: f32,
        /// Per-face normals instead of interpolated ones
        flat_shading: bool,
    },
    /// Screen-space point sprites
    Points {
        /// Point size in pixels
        size: f32,
        /// Shrink points with distance
        size_attenuation: bool,
    },
    /// Line segments
    Line {
        /// Line width in pixels
        width: f32,
    },
}

/// Render-state and uniform descriptor for a draw
///
/// A value type: freely clonable, never a GPU object. The version counter
/// participates in program-cache key derivation; the renderer re-derives
/// the fingerprint whenever the version moved.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Optional debug name
    pub name: String,
    /// Shading model
    pub kind: MaterialKind,
    /// Base color texture
    pub map: Option<TextureKey>,
    /// Environment map used for reflections
    pub env_map: Option<TextureKey>,
    /// Tangent-space normal map
    pub normal_map: Option<TextureKey>,
    /// Route through the transparent bucket and blend
    pub transparent: bool,
    /// Uniform opacity multiplier
    pub opacity: f32,
    /// Discard fragments below this alpha, when set
    pub alpha_test: Option<f32>,
    /// Fragment/framebuffer combination
    pub blend: BlendMode,
    /// Depth comparison enabled
    pub depth_test: bool,
    /// Depth buffer writes enabled
    pub depth_write: bool,
    /// Depth comparison function
    pub depth_func: DepthFunc,
    /// Face culling
    pub side: Side,
    /// Optical transmission factor; non-zero routes to the transmissive pass
    pub transmission: f32,
    /// Read per-vertex colors
    pub vertex_colors: bool,
    /// Apply scene fog
    pub fog: bool,
    version: u64,
}

impl Material {
    fn with_kind(kind: MaterialKind) -> Self {
        Self {
            name: String::new(),
            kind,
            map: None,
            env_map: None,
            normal_map: None,
            transparent: false,
            opacity: 1.0,
            alpha_test: None,
            blend: BlendMode::None,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::default(),
            side: Side::default(),
            transmission: 0.0,
            vertex_colors: false,
            fog: true,
            version: 0,
        }
    }

    /// Create an unlit material with default properties
    pub fn basic() -> Self {
        Self::with_kind(MaterialKind::Basic {
            color: [1.0, 1.0, 1.0],
        })
    }

    /// Create a standard PBR material with default properties
    pub fn standard() -> Self {
        Self::with_kind(MaterialKind::Standard {
            color: [1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            flat_shading: false,
        })
    }

    /// Create a point-sprite material
    pub fn points() -> Self {
        Self::with_kind(MaterialKind::Points {
            size: 1.0,
            size_attenuation: true,
        })
    }

    /// Create a line material
    pub fn line() -> Self {
        Self::with_kind(MaterialKind::Line { width: 1.0 })
    }

    /// Set the material name for debugging
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the base color texture
    pub fn with_map(mut self, map: TextureKey) -> Self {
        self.map = Some(map);
        self
    }

    /// Enable transparency with standard alpha blending
    pub fn with_transparency(mut self, opacity: f32) -> Self {
        self.transparent = true;
        self.opacity = opacity.clamp(0.0, 1.0);
        self.blend = BlendMode::Normal;
        self.depth_write = false;
        self
    }

    /// Set optical transmission (routes to the transmissive pass)
    pub fn with_transmission(mut self, transmission: f32) -> Self {
        self.transmission = transmission.clamp(0.0, 1.0);
        self
    }

    /// Monotonically increasing mutation counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record that render-state relevant fields were edited
    ///
    /// The renderer re-derives the program fingerprint for this material the
    /// next time it is drawn.
    pub fn mark_needs_update(&mut self) {
        self.version += 1;
    }

    /// The shader template this material shades with
    pub fn shader_template(&self) -> ShaderTemplate {
        match self.kind {
            MaterialKind::Basic { .. } => ShaderTemplate::Basic,
            MaterialKind::Standard { .. } => ShaderTemplate::Standard,
            MaterialKind::Points { .. } => ShaderTemplate::Points,
            MaterialKind::Line { .. } => ShaderTemplate::Line,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_builder_sets_render_state() {
        let material = Material::standard().with_transparency(0.5);
        assert!(material.transparent);
        assert_eq!(material.blend, BlendMode::Normal);
        assert!(!material.depth_write);
        assert!((material.opacity - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mark_needs_update_bumps_version() {
        let mut material = Material::basic();
        let before = material.version();
        material.mark_needs_update();
        assert_eq!(material.version(), before + 1);
    }

    #[test]
    fn test_shader_template_follows_kind() {
        assert_eq!(Material::basic().shader_template(), ShaderTemplate::Basic);
        assert_eq!(
            Material::standard().shader_template(),
            ShaderTemplate::Standard
        );
        assert_eq!(Material::points().shader_template(), ShaderTemplate::Points);
    }
}
