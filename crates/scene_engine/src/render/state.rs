//! GPU pipeline-state tracking and diffing
//!
//! The renderer's performance contract is minimizing redundant state
//! transitions: [`StateTracker`] mirrors the pipeline state the previous
//! draw left behind and emits only the commands whose values actually
//! differ. The mirror is cleared at frame start so the first draw always
//! establishes known state.

use crate::material::{BlendMode, DepthFunc, Material, Side};

use super::backend::RenderBackend;

/// Stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilState {
    /// Stencil test enabled
    pub enabled: bool,
    /// Reference value for the comparison
    pub reference: u8,
    /// AND-mask applied to both reference and stored value
    pub mask: u8,
}

/// One pipeline-state transition handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Toggle depth testing
    DepthTest(bool),
    /// Toggle depth writes
    DepthWrite(bool),
    /// Change the depth comparison function
    DepthFunc(DepthFunc),
    /// Change blending (mode carries equation and factors)
    Blend(BlendMode),
    /// Change face culling
    Cull(Side),
    /// Change the stencil configuration
    Stencil(StencilState),
    /// Change the color write mask
    ColorMask(bool),
}

/// Mirror of the GPU pipeline state with change detection
#[derive(Debug, Default)]
pub struct StateTracker {
    depth_test: Option<bool>,
    depth_write: Option<bool>,
    depth_func: Option<DepthFunc>,
    blend: Option<BlendMode>,
    cull: Option<Side>,
    stencil: Option<StencilState>,
    color_mask: Option<bool>,
    transitions: u64,
}

impl StateTracker {
    /// Create a tracker with unknown state
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the mirrored state
    ///
    /// Called at frame start and after render-target switches, where the
    /// driver-side state can no longer be assumed.
    pub fn invalidate(&mut self) {
        *self = Self {
            transitions: self.transitions,
            ..Self::default()
        };
    }

    /// Number of transitions emitted since construction
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    fn emit<T: PartialEq + Copy>(
        slot: &mut Option<T>,
        next: T,
        transitions: &mut u64,
        backend: &mut dyn RenderBackend,
        make: impl FnOnce(T) -> StateCommand,
    ) {
        if *slot != Some(next) {
            *slot = Some(next);
            *transitions += 1;
            backend.apply_state(&make(next));
        }
    }

    /// Set depth testing, emitting only on change
    pub fn set_depth_test(&mut self, backend: &mut dyn RenderBackend, enabled: bool) {
        Self::emit(
            &mut self.depth_test,
            enabled,
            &mut self.transitions,
            backend,
            StateCommand::DepthTest,
        );
    }

    /// Set depth writes, emitting only on change
    pub fn set_depth_write(&mut self, backend: &mut dyn RenderBackend, enabled: bool) {
        Self::emit(
            &mut self.depth_write,
            enabled,
            &mut self.transitions,
            backend,
            StateCommand::DepthWrite,
        );
    }

    /// Set the depth function, emitting only on change
    pub fn set_depth_func(&mut self, backend: &mut dyn RenderBackend, func: DepthFunc) {
        Self::emit(
            &mut self.depth_func,
            func,
            &mut self.transitions,
            backend,
            StateCommand::DepthFunc,
        );
    }

    /// Set blending, emitting only on change
    pub fn set_blend(&mut self, backend: &mut dyn RenderBackend, blend: BlendMode) {
        Self::emit(
            &mut self.blend,
            blend,
            &mut self.transitions,
            backend,
            StateCommand::Blend,
        );
    }

    /// Set face culling, emitting only on change
    pub fn set_cull(&mut self, backend: &mut dyn RenderBackend, side: Side) {
        Self::emit(
            &mut self.cull,
            side,
            &mut self.transitions,
            backend,
            StateCommand::Cull,
        );
    }

    /// Set the stencil configuration, emitting only on change
    pub fn set_stencil(&mut self, backend: &mut dyn RenderBackend, stencil: StencilState) {
        Self::emit(
            &mut self.stencil,
            stencil,
            &mut self.transitions,
            backend,
            StateCommand::Stencil,
        );
    }

    /// Set the color write mask, emitting only on change
    pub fn set_color_mask(&mut self, backend: &mut dyn RenderBackend, enabled: bool) {
        Self::emit(
            &mut self.color_mask,
            enabled,
            &mut self.transitions,
            backend,
            StateCommand::ColorMask,
        );
    }

    /// Apply everything a material requires before its draw
    pub fn apply_material(&mut self, backend: &mut dyn RenderBackend, material: &Material) {
        self.set_depth_test(backend, material.depth_test);
        self.set_depth_write(backend, material.depth_write);
        self.set_depth_func(backend, material.depth_func);
        self.set_blend(backend, material.blend);
        self.set_cull(backend, material.side);
        self.set_stencil(backend, StencilState::default());
        self.set_color_mask(backend, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::HeadlessBackend;

    #[test]
    fn test_identical_material_emits_no_second_transition() {
        let mut tracker = StateTracker::new();
        let mut backend = HeadlessBackend::new();
        let material = Material::standard();

        tracker.apply_material(&mut backend, &material);
        let first = backend.state_change_count();
        assert!(first > 0);

        tracker.apply_material(&mut backend, &material);
        assert_eq!(backend.state_change_count(), first);
    }

    #[test]
    fn test_only_differing_fields_emit_transitions() {
        let mut tracker = StateTracker::new();
        let mut backend = HeadlessBackend::new();

        tracker.apply_material(&mut backend, &Material::standard());
        let baseline = backend.state_change_count();

        let mut transparent = Material::standard().with_transparency(0.5);
        transparent.depth_test = true; // only blend/depth_write/transparent differ
        tracker.apply_material(&mut backend, &transparent);

        // depth_write and blend changed, nothing else
        assert_eq!(backend.state_change_count(), baseline + 2);
    }

    #[test]
    fn test_invalidate_forces_reemission() {
        let mut tracker = StateTracker::new();
        let mut backend = HeadlessBackend::new();
        let material = Material::standard();

        tracker.apply_material(&mut backend, &material);
        let first = backend.state_change_count();

        tracker.invalidate();
        tracker.apply_material(&mut backend, &material);
        assert_eq!(backend.state_change_count(), first * 2);
    }
}
