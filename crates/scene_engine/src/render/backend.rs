//! Backend abstraction for draw submission and state changes
//!
//! The renderer never talks to a graphics API directly: it drives an
//! implementation of [`RenderBackend`] through opaque handles. The crate
//! ships [`HeadlessBackend`], a recording implementation used by the test
//! suite and for render-list inspection without a GPU.

use thiserror::Error;

use super::state::StateCommand;
use crate::material::program::ShaderSource;
use crate::material::{TextureFilter, TextureFormat, TextureWrap, UniformValue};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by a rendering backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Shader compilation or linking failed
    #[error("shader compile failed for '{template}': {log}")]
    ShaderCompile {
        /// Template the compile was for
        template: &'static str,
        /// Backend compile/link log
        log: String,
    },

    /// A handle did not resolve to a live resource
    #[error("stale {kind} handle {id}")]
    StaleHandle {
        /// Resource kind the handle addressed
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// Backend ran out of memory for an allocation
    #[error("backend allocation failed: {0}")]
    OutOfMemory(String),
}

/// Handle to a GPU vertex/index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Handle to an offscreen render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub u64);

/// What a buffer stores, which the backend may use for placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-vertex attribute data
    Vertex,
    /// Index data
    Index,
}

/// Primitive topology for a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Triangle list
    Triangles,
    /// Line list
    Lines,
    /// Point list
    Points,
}

/// One bound attribute buffer in a draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexBinding {
    /// Buffer to read from
    pub buffer: BufferHandle,
    /// Components per vertex
    pub item_size: usize,
    /// Rescale integer storage on fetch
    pub normalized: bool,
}

/// A fully resolved draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Program to draw with
    pub program: ProgramHandle,
    /// Attribute bindings in attribute-name-sorted order
    pub vertex_buffers: Vec<VertexBinding>,
    /// Index buffer, when the draw is indexed
    pub index_buffer: Option<BufferHandle>,
    /// 16-bit indices when true, 32-bit otherwise
    pub index_u16: bool,
    /// First element of the range
    pub start: usize,
    /// Number of elements to draw
    pub count: usize,
    /// Number of instances (1 for non-instanced draws)
    pub instances: usize,
    /// Primitive topology
    pub topology: Topology,
}

/// Static capabilities detected once at renderer construction
///
/// Resolved a single time and cached; never rechecked per draw.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Largest square texture edge
    pub max_texture_size: u32,
    /// Hardware multisample-to-texture resolve support
    pub multisample_to_texture: bool,
    /// Instanced draw support
    pub instancing: bool,
    /// Maximum simultaneously bound textures
    pub max_texture_units: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            multisample_to_texture: true,
            instancing: true,
            max_texture_units: 16,
        }
    }
}

/// Main rendering backend trait
///
/// Everything the renderer needs from a graphics API: resource upload,
/// program compilation, state changes, and draw submission. Implementations
/// are single-threaded; the renderer serializes all calls.
pub trait RenderBackend {
    /// Static capability snapshot, queried once at renderer construction
    fn capabilities(&self) -> Capabilities;

    /// Create a GPU buffer and upload its initial contents
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BackendResult<BufferHandle>;

    /// Re-upload a buffer in full
    fn update_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> BackendResult<()>;

    /// Re-upload a byte sub-range of a buffer
    fn update_buffer_range(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Free a GPU buffer
    fn delete_buffer(&mut self, handle: BufferHandle);

    /// Create a GPU texture and upload its pixels
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        filter: TextureFilter,
        wrap: TextureWrap,
        data: &[u8],
    ) -> BackendResult<TextureHandle>;

    /// Re-upload a texture's pixels
    fn update_texture(&mut self, handle: TextureHandle, data: &[u8]) -> BackendResult<()>;

    /// Free a GPU texture
    fn delete_texture(&mut self, handle: TextureHandle);

    /// Compile and link a shader program from an assembled source descriptor
    fn compile_program(&mut self, source: &ShaderSource) -> BackendResult<ProgramHandle>;

    /// Free a compiled program
    fn delete_program(&mut self, handle: ProgramHandle);

    /// Write one uniform value on a program
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue);

    /// Bind a texture to a sampler unit
    fn bind_texture(&mut self, unit: u32, handle: TextureHandle);

    /// Apply one pipeline-state transition
    fn apply_state(&mut self, command: &StateCommand);

    /// Set the viewport in physical pixels
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Create an offscreen render target
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        samples: u32,
    ) -> BackendResult<RenderTargetHandle>;

    /// Bind a render target, or the default framebuffer when `None`
    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>);

    /// Resolve a multisampled target into its texture
    ///
    /// `blit` selects the copy path used when multisample-to-texture is
    /// unsupported by the hardware.
    fn resolve_render_target(&mut self, target: RenderTargetHandle, blit: bool);

    /// Free a render target
    fn delete_render_target(&mut self, handle: RenderTargetHandle);

    /// Clear the bound target
    fn clear(&mut self, color: [f32; 4], depth: f32);

    /// Issue a draw call
    fn draw(&mut self, call: &DrawCall) -> BackendResult<()>;

    /// Present the frame
    fn present(&mut self);

    /// Downcast to the concrete backend type
    ///
    /// Breaks the abstraction deliberately; used by tests to inspect the
    /// recording backend.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// What a [`HeadlessBackend`] recorded, for assertions in tests
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Buffer created
    CreateBuffer(BufferHandle, usize),
    /// Full buffer upload
    UpdateBuffer(BufferHandle, usize),
    /// Ranged buffer upload (handle, byte offset, byte length)
    UpdateBufferRange(BufferHandle, usize, usize),
    /// Buffer freed
    DeleteBuffer(BufferHandle),
    /// Texture created
    CreateTexture(TextureHandle),
    /// Texture freed
    DeleteTexture(TextureHandle),
    /// Program compiled
    CompileProgram(ProgramHandle, &'static str),
    /// Program freed
    DeleteProgram(ProgramHandle),
    /// Uniform written
    SetUniform(ProgramHandle, String),
    /// State transition applied
    ApplyState(StateCommand),
    /// Draw call issued
    Draw(DrawCall),
    /// Multisample resolve (blit path when true)
    Resolve(RenderTargetHandle, bool),
    /// Frame presented
    Present,
}

/// Recording backend with no GPU behind it
///
/// Allocates handles from counters and records every command. Tests inspect
/// the log to assert draw counts, upload ranges, and state transitions.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    capabilities: Capabilities,
    commands: Vec<RecordedCommand>,
    /// Templates whose compilation should fail, for diagnostics tests
    pub fail_templates: Vec<&'static str>,
    live_buffers: usize,
    live_textures: usize,
    live_programs: usize,
}

impl HeadlessBackend {
    /// Create a recording backend with default capabilities
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recording backend with explicit capabilities
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Everything recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Clear the command log (handles stay live)
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of draw calls recorded
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw(_)))
            .count()
    }

    /// Number of state transitions recorded
    pub fn state_change_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::ApplyState(_)))
            .count()
    }

    /// Buffers created and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    /// Textures created and not yet deleted
    pub fn live_textures(&self) -> usize {
        self.live_textures
    }

    /// Programs compiled and not yet deleted
    pub fn live_programs(&self) -> usize {
        self.live_programs
    }
}

impl RenderBackend for HeadlessBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, _kind: BufferKind, data: &[u8]) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        self.live_buffers += 1;
        self.commands
            .push(RecordedCommand::CreateBuffer(handle, data.len()));
        Ok(handle)
    }

    fn update_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> BackendResult<()> {
        self.commands
            .push(RecordedCommand::UpdateBuffer(handle, data.len()));
        Ok(())
    }

    fn update_buffer_range(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> BackendResult<()> {
        self.commands.push(RecordedCommand::UpdateBufferRange(
            handle,
            byte_offset,
            data.len(),
        ));
        Ok(())
    }

    fn delete_buffer(&mut self, handle: BufferHandle) {
        self.live_buffers = self.live_buffers.saturating_sub(1);
        self.commands.push(RecordedCommand::DeleteBuffer(handle));
    }

    fn create_texture(
        &mut self,
        _width: u32,
        _height: u32,
        _format: TextureFormat,
        _filter: TextureFilter,
        _wrap: TextureWrap,
        _data: &[u8],
    ) -> BackendResult<TextureHandle> {
        let handle = TextureHandle(self.next());
        self.live_textures += 1;
        self.commands.push(RecordedCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn update_texture(&mut self, _handle: TextureHandle, _data: &[u8]) -> BackendResult<()> {
        Ok(())
    }

    fn delete_texture(&mut self, handle: TextureHandle) {
        self.live_textures = self.live_textures.saturating_sub(1);
        self.commands.push(RecordedCommand::DeleteTexture(handle));
    }

    fn compile_program(&mut self, source: &ShaderSource) -> BackendResult<ProgramHandle> {
        if self.fail_templates.contains(&source.template) {
            return Err(BackendError::ShaderCompile {
                template: source.template,
                log: "forced failure".to_string(),
            });
        }
        let handle = ProgramHandle(self.next());
        self.live_programs += 1;
        self.commands
            .push(RecordedCommand::CompileProgram(handle, source.template));
        Ok(handle)
    }

    fn delete_program(&mut self, handle: ProgramHandle) {
        self.live_programs = self.live_programs.saturating_sub(1);
        self.commands.push(RecordedCommand::DeleteProgram(handle));
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, _value: &UniformValue) {
        self.commands
            .push(RecordedCommand::SetUniform(program, name.to_string()));
    }

    fn bind_texture(&mut self, _unit: u32, _handle: TextureHandle) {}

    fn apply_state(&mut self, command: &StateCommand) {
        self.commands
            .push(RecordedCommand::ApplyState(command.clone()));
    }

    fn set_viewport(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn create_render_target(
        &mut self,
        _width: u32,
        _height: u32,
        _samples: u32,
    ) -> BackendResult<RenderTargetHandle> {
        Ok(RenderTargetHandle(self.next()))
    }

    fn bind_render_target(&mut self, _target: Option<RenderTargetHandle>) {}

    fn resolve_render_target(&mut self, target: RenderTargetHandle, blit: bool) {
        self.commands.push(RecordedCommand::Resolve(target, blit));
    }

    fn delete_render_target(&mut self, _handle: RenderTargetHandle) {}

    fn clear(&mut self, _color: [f32; 4], _depth: f32) {}

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        self.commands.push(RecordedCommand::Draw(call.clone()));
        Ok(())
    }

    fn present(&mut self) {
        self.commands.push(RecordedCommand::Present);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_backend_tracks_live_resources() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(BufferKind::Vertex, &[0; 16]).unwrap();
        assert_eq!(backend.live_buffers(), 1);

        backend.delete_buffer(buffer);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_forced_compile_failure() {
        let mut backend = HeadlessBackend::new();
        backend.fail_templates.push("standard");
        let source = ShaderSource {
            template: "standard",
            defines: vec![],
        };
        assert!(matches!(
            backend.compile_program(&source),
            Err(BackendError::ShaderCompile { .. })
        ));
    }
}
