//! Shader program cache
//!
//! Programs are expensive to compile and cheap to share: two draws whose
//! feature fingerprints match use one compiled program. The fingerprint is a
//! typed key (template identity, a feature bitset, and small counts), never
//! a concatenated string. Source assembly stays a separate templated step so
//! the key is hashable and comparable without touching shader text.

use std::collections::HashMap;

use bitflags::bitflags;

use crate::render::backend::{ProgramHandle, RenderBackend};

/// Identity of a shader template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTemplate {
    /// Unlit color/texture shading
    Basic,
    /// Physically-based standard shading
    Standard,
    /// Screen-space point sprites
    Points,
    /// Line segments
    Line,
}

impl ShaderTemplate {
    /// Stable template name handed to the backend
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Points => "points",
            Self::Line => "line",
        }
    }
}

bitflags! {
    /// Boolean shader features participating in the cache key
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u32 {
        /// Base color texture bound
        const MAP = 1 << 0;
        /// Environment map bound
        const ENV_MAP = 1 << 1;
        /// Tangent-space normal map bound
        const NORMAL_MAP = 1 << 2;
        /// Skeletal skinning inputs
        const SKINNING = 1 << 3;
        /// Morph target position inputs
        const MORPH_TARGETS = 1 << 4;
        /// Per-vertex color input
        const VERTEX_COLORS = 1 << 5;
        /// Per-face normals
        const FLAT_SHADING = 1 << 6;
        /// Tone-mapping applied on output
        const TONE_MAPPING = 1 << 7;
        /// sRGB conversion applied on output
        const SRGB_OUTPUT = 1 << 8;
        /// Shadow-map sampling
        const SHADOWS = 1 << 9;
        /// Scene fog applied
        const FOG = 1 << 10;
        /// Instanced transform input
        const INSTANCING = 1 << 11;
        /// Alpha-test discard
        const ALPHA_TEST = 1 << 12;
        /// Both faces shaded
        const DOUBLE_SIDED = 1 << 13;
        /// Transmission sampling of the offscreen transmission target
        const TRANSMISSION = 1 << 14;
    }
}

/// Feature fingerprint keying the program cache
///
/// Draws whose keys compare equal share one compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    /// Shader template identity
    pub template: ShaderTemplate,
    /// Boolean feature set
    pub flags: FeatureFlags,
    /// Directional light count
    pub dir_lights: u8,
    /// Point light count
    pub point_lights: u8,
    /// Spot light count
    pub spot_lights: u8,
    /// Clipping-plane count
    pub clipping_planes: u8,
    /// Morph target count
    pub morph_targets: u8,
}

impl ProgramKey {
    /// Key for a template with no features
    pub fn bare(template: ShaderTemplate) -> Self {
        Self {
            template,
            flags: FeatureFlags::empty(),
            dir_lights: 0,
            point_lights: 0,
            spot_lights: 0,
            clipping_planes: 0,
            morph_targets: 0,
        }
    }
}

/// Assembled source descriptor handed to the backend compiler
///
/// The shading-language text itself is the backend's concern; the core
/// produces the template name and the define list derived from the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Template to instantiate
    pub template: &'static str,
    /// Preprocessor-style feature defines in stable order
    pub defines: Vec<String>,
}

impl ShaderSource {
    /// Assemble the source descriptor for a fingerprint
    pub fn assemble(key: &ProgramKey) -> Self {
        let mut defines = Vec::new();
        for (name, flag) in [
            ("USE_MAP", FeatureFlags::MAP),
            ("USE_ENV_MAP", FeatureFlags::ENV_MAP),
            ("USE_NORMAL_MAP", FeatureFlags::NORMAL_MAP),
            ("USE_SKINNING", FeatureFlags::SKINNING),
            ("USE_MORPH_TARGETS", FeatureFlags::MORPH_TARGETS),
            ("USE_VERTEX_COLORS", FeatureFlags::VERTEX_COLORS),
            ("FLAT_SHADING", FeatureFlags::FLAT_SHADING),
            ("TONE_MAPPING", FeatureFlags::TONE_MAPPING),
            ("SRGB_OUTPUT", FeatureFlags::SRGB_OUTPUT),
            ("USE_SHADOWS", FeatureFlags::SHADOWS),
            ("USE_FOG", FeatureFlags::FOG),
            ("USE_INSTANCING", FeatureFlags::INSTANCING),
            ("USE_ALPHA_TEST", FeatureFlags::ALPHA_TEST),
            ("DOUBLE_SIDED", FeatureFlags::DOUBLE_SIDED),
            ("USE_TRANSMISSION", FeatureFlags::TRANSMISSION),
        ] {
            if key.flags.contains(flag) {
                defines.push(name.to_string());
            }
        }
        defines.push(format!("NUM_DIR_LIGHTS {}", key.dir_lights));
        defines.push(format!("NUM_POINT_LIGHTS {}", key.point_lights));
        defines.push(format!("NUM_SPOT_LIGHTS {}", key.spot_lights));
        defines.push(format!("NUM_CLIPPING_PLANES {}", key.clipping_planes));
        defines.push(format!("NUM_MORPH_TARGETS {}", key.morph_targets));

        Self {
            template: key.template.name(),
            defines,
        }
    }
}

/// A uniform value with equality, so redundant writes can be suppressed
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Single float
    Float(f32),
    /// Signed integer
    Int(i32),
    /// 3-component vector
    Vec3([f32; 3]),
    /// 4-component vector
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix
    Mat4([f32; 16]),
    /// Sampler bound to a texture unit
    Sampler(u32),
}

/// One cached program: handle, reference count, memoized uniforms
#[derive(Debug)]
pub struct Program {
    handle: Option<ProgramHandle>,
    /// Compile/link log when compilation failed
    pub diagnostic: Option<String>,
    ref_count: usize,
    uniforms: HashMap<String, UniformValue>,
    uniform_writes: u64,
    uniform_skips: u64,
}

impl Program {
    /// Compiled handle, `None` when compilation failed
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    /// Number of acquisitions currently holding this program
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Uniform writes that reached the backend
    pub fn uniform_writes(&self) -> u64 {
        self.uniform_writes
    }

    /// Uniform writes suppressed because the value was unchanged
    pub fn uniform_skips(&self) -> u64 {
        self.uniform_skips
    }

    /// Write a uniform unless the last-written value is identical
    pub fn set_uniform(
        &mut self,
        backend: &mut dyn RenderBackend,
        name: &str,
        value: UniformValue,
    ) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.uniforms.get(name) == Some(&value) {
            self.uniform_skips += 1;
            return;
        }
        backend.set_uniform(handle, name, &value);
        self.uniforms.insert(name.to_string(), value);
        self.uniform_writes += 1;
    }
}

/// Map from feature fingerprint to compiled program
///
/// Renderer-owned: constructed at renderer init, torn down at dispose, never
/// shared across renderer instances.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<ProgramKey, Program>,
    compiles: u64,
}

impl ProgramCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a fingerprint, compiling on first use
    ///
    /// A cache hit bumps the reference count and reuses the compiled
    /// instance. Compile failure is recorded on the entry as a diagnostic:
    /// the draw is skipped, the frame continues, and the failure is not
    /// retried until the entry is released and re-acquired.
    pub fn acquire(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: ProgramKey,
    ) -> &mut Program {
        let compiles = &mut self.compiles;
        let entry = self.programs.entry(key).or_insert_with(|| {
            *compiles += 1;
            let source = ShaderSource::assemble(&key);
            log::debug!("compiling program template '{}'", source.template);
            match backend.compile_program(&source) {
                Ok(handle) => Program {
                    handle: Some(handle),
                    diagnostic: None,
                    ref_count: 0,
                    uniforms: HashMap::new(),
                    uniform_writes: 0,
                    uniform_skips: 0,
                },
                Err(err) => {
                    log::warn!("program compile failed, draws with this material are skipped: {err}");
                    Program {
                        handle: None,
                        diagnostic: Some(err.to_string()),
                        ref_count: 0,
                        uniforms: HashMap::new(),
                        uniform_writes: 0,
                        uniform_skips: 0,
                    }
                }
            }
        });
        entry.ref_count += 1;
        entry
    }

    /// Look up a cached program without acquiring it
    pub fn get_mut(&mut self, key: &ProgramKey) -> Option<&mut Program> {
        self.programs.get_mut(key)
    }

    /// Release one reference; frees the program when the count reaches zero
    pub fn release(&mut self, backend: &mut dyn RenderBackend, key: &ProgramKey) {
        let Some(program) = self.programs.get_mut(key) else {
            return;
        };
        program.ref_count = program.ref_count.saturating_sub(1);
        if program.ref_count == 0 {
            if let Some(handle) = program.handle {
                log::debug!("releasing program template '{}'", key.template.name());
                backend.delete_program(handle);
            }
            self.programs.remove(key);
        }
    }

    /// Free every cached program regardless of reference counts
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for program in self.programs.values() {
            if let Some(handle) = program.handle {
                backend.delete_program(handle);
            }
        }
        self.programs.clear();
    }

    /// Number of programs compiled since construction
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }

    /// Number of live cache entries
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the cache holds no programs
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::HeadlessBackend;

    fn standard_key() -> ProgramKey {
        ProgramKey {
            template: ShaderTemplate::Standard,
            flags: FeatureFlags::MAP | FeatureFlags::FOG,
            dir_lights: 1,
            point_lights: 2,
            spot_lights: 0,
            clipping_planes: 0,
            morph_targets: 0,
        }
    }

    #[test]
    fn test_identical_keys_share_one_program() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();

        let first = cache.acquire(&mut backend, standard_key()).handle();
        let second = cache.acquire(&mut backend, standard_key()).handle();

        assert_eq!(first, second);
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.get_mut(&standard_key()).unwrap().ref_count(), 2);
    }

    #[test]
    fn test_differing_key_compiles_again() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();

        cache.acquire(&mut backend, standard_key());
        let mut other = standard_key();
        other.point_lights = 3;
        cache.acquire(&mut backend, other);

        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn test_release_frees_at_zero() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();

        cache.acquire(&mut backend, standard_key());
        cache.acquire(&mut backend, standard_key());

        cache.release(&mut backend, &standard_key());
        assert_eq!(cache.len(), 1);
        cache.release(&mut backend, &standard_key());
        assert_eq!(cache.len(), 0);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_compile_failure_is_a_diagnostic_not_a_panic() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();
        backend.fail_templates.push("standard");

        let program = cache.acquire(&mut backend, standard_key());
        assert!(program.handle().is_none());
        assert!(program.diagnostic.is_some());
    }

    #[test]
    fn test_uniform_memoization_suppresses_redundant_writes() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();

        let program = cache.acquire(&mut backend, standard_key());
        program.set_uniform(&mut backend, "opacity", UniformValue::Float(1.0));
        program.set_uniform(&mut backend, "opacity", UniformValue::Float(1.0));
        program.set_uniform(&mut backend, "opacity", UniformValue::Float(0.5));

        assert_eq!(program.uniform_writes(), 2);
        assert_eq!(program.uniform_skips(), 1);
    }

    #[test]
    fn test_assembled_defines_are_stable() {
        let source = ShaderSource::assemble(&standard_key());
        assert_eq!(source.template, "standard");
        assert!(source.defines.contains(&"USE_MAP".to_string()));
        assert!(source.defines.contains(&"NUM_POINT_LIGHTS 2".to_string()));
        assert_eq!(source, ShaderSource::assemble(&standard_key()));
    }
}
