//! Per-action playback state machine
//!
//! An action schedules one clip on a mixer: it owns the local clip time,
//! the loop mode, a weight with optional scheduled fades, and the
//! stopped → scheduled → running → {paused, finished} lifecycle.

/// How a clip's local time wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play through once and finish
    Once,
    /// Play the clip this many times, wrapping at each boundary
    Repeat(u32),
    /// Play this many times, mirroring direction on odd repeats
    PingPong(u32),
}

/// Lifecycle state of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    /// Not contributing; local time holds
    #[default]
    Stopped,
    /// `play` was called; becomes running on the next mixer update
    Scheduled,
    /// Advancing and contributing
    Running,
    /// Holding the current pose, still contributing
    Paused,
    /// Ran to completion; contributes only when clamped
    Finished,
}

/// Boundary events produced while advancing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BoundaryEvent {
    /// Crossed a loop boundary this many times
    Loop(u32),
    /// Completed a non-repeating run
    Finished,
}

/// Linear weight fade scheduled over wall time
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fade {
    from: f32,
    to: f32,
    duration: f32,
    elapsed: f32,
}

/// One clip scheduled for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationAction {
    pub(super) clip: usize,
    state: ActionState,
    time: f32,
    /// Playback speed multiplier
    pub time_scale: f32,
    weight: f32,
    fade: Option<Fade>,
    /// Loop behavior
    pub loop_mode: LoopMode,
    loop_count: u32,
    /// Accumulate additively instead of blending normally
    pub additive: bool,
    /// Hold the final pose after finishing instead of disabling
    pub clamp_when_finished: bool,
}

impl AnimationAction {
    pub(super) fn new(clip: usize) -> Self {
        Self {
            clip,
            state: ActionState::Stopped,
            time: 0.0,
            time_scale: 1.0,
            weight: 1.0,
            fade: None,
            loop_mode: LoopMode::Repeat(u32::MAX),
            loop_count: 0,
            additive: false,
            clamp_when_finished: false,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Local clip time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Completed loop boundaries
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Base weight before fading
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Set the base weight
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.max(0.0);
    }

    /// Schedule playback from the start
    pub fn play(&mut self) {
        self.time = 0.0;
        self.loop_count = 0;
        self.state = ActionState::Scheduled;
    }

    /// Stop contributing and rewind
    pub fn stop(&mut self) {
        self.time = 0.0;
        self.loop_count = 0;
        self.fade = None;
        self.state = ActionState::Stopped;
    }

    /// Hold the current pose
    pub fn pause(&mut self) {
        if self.state == ActionState::Running {
            self.state = ActionState::Paused;
        }
    }

    /// Resume from a pause
    pub fn resume(&mut self) {
        if self.state == ActionState::Paused {
            self.state = ActionState::Running;
        }
    }

    /// Fade the effective weight from zero up to the base weight
    pub fn fade_in(&mut self, duration: f32) {
        self.fade = Some(Fade {
            from: 0.0,
            to: self.weight,
            duration: duration.max(f32::EPSILON),
            elapsed: 0.0,
        });
    }

    /// Fade the effective weight from its current value to zero
    pub fn fade_out(&mut self, duration: f32) {
        self.fade = Some(Fade {
            from: self.effective_weight(),
            to: 0.0,
            duration: duration.max(f32::EPSILON),
            elapsed: 0.0,
        });
    }

    /// Weight after applying any active fade
    pub fn effective_weight(&self) -> f32 {
        match self.state {
            ActionState::Stopped | ActionState::Scheduled => 0.0,
            ActionState::Finished if !self.clamp_when_finished => 0.0,
            _ => match self.fade {
                Some(fade) => {
                    let alpha = (fade.elapsed / fade.duration).clamp(0.0, 1.0);
                    fade.from + (fade.to - fade.from) * alpha
                }
                None => self.weight,
            },
        }
    }

    /// Whether the action contributes to the blend this update
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ActionState::Running | ActionState::Paused
        ) || (self.state == ActionState::Finished && self.clamp_when_finished)
    }

    /// Clip-local sample time, mirrored on odd ping-pong repeats
    pub(super) fn sample_time(&self, duration: f32) -> f32 {
        match self.loop_mode {
            LoopMode::PingPong(_) if self.loop_count % 2 == 1 => duration - self.time,
            _ => self.time,
        }
    }

    /// Advance local time by scaled `dt`, handling loop boundaries
    pub(super) fn advance(&mut self, dt: f32, duration: f32) -> Vec<BoundaryEvent> {
        let mut events = Vec::new();

        if let Some(fade) = &mut self.fade {
            fade.elapsed += dt.abs();
            if fade.elapsed >= fade.duration {
                self.weight = fade.to;
                self.fade = None;
            }
        }

        if self.state == ActionState::Scheduled {
            self.state = ActionState::Running;
        }
        if self.state != ActionState::Running || duration <= 0.0 {
            return events;
        }

        self.time += dt * self.time_scale;

        let repetitions = match self.loop_mode {
            LoopMode::Once => 1,
            LoopMode::Repeat(n) | LoopMode::PingPong(n) => n.max(1),
        };

        // Backward playback finishes at zero
        if self.time < 0.0 {
            self.time = 0.0;
            self.state = ActionState::Finished;
            events.push(BoundaryEvent::Finished);
            return events;
        }

        let mut loops = 0;
        while self.time >= duration {
            if self.loop_count + 1 >= repetitions {
                self.time = duration;
                self.state = ActionState::Finished;
                if loops > 0 {
                    events.push(BoundaryEvent::Loop(loops));
                }
                events.push(BoundaryEvent::Finished);
                return events;
            }
            self.time -= duration;
            self.loop_count += 1;
            loops += 1;
        }
        if loops > 0 {
            events.push(BoundaryEvent::Loop(loops));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_stopped_scheduled_running() {
        let mut action = AnimationAction::new(0);
        assert_eq!(action.state(), ActionState::Stopped);

        action.play();
        assert_eq!(action.state(), ActionState::Scheduled);
        assert_eq!(action.effective_weight(), 0.0);

        action.advance(0.1, 2.0);
        assert_eq!(action.state(), ActionState::Running);
        assert!(action.effective_weight() > 0.0);
    }

    #[test]
    fn test_repeat_boundary_matches_modulo() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::Repeat(2);
        action.play();

        let events = action.advance(2.5, 2.0);

        assert_eq!(action.loop_count(), 1);
        assert!((action.time() - 0.5).abs() < 1e-6);
        assert_eq!(events, vec![BoundaryEvent::Loop(1)]);
    }

    #[test]
    fn test_repeat_finishes_after_repetitions() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::Repeat(2);
        action.play();

        action.advance(2.5, 2.0);
        let events = action.advance(2.0, 2.0);

        assert_eq!(action.state(), ActionState::Finished);
        assert!(events.contains(&BoundaryEvent::Finished));
        assert!((action.time() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_once_without_clamp_disables_contribution() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::Once;
        action.play();

        action.advance(3.0, 2.0);
        assert_eq!(action.state(), ActionState::Finished);
        assert_eq!(action.effective_weight(), 0.0);
        assert!(!action.is_active());
    }

    #[test]
    fn test_once_with_clamp_holds_final_pose() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::Once;
        action.clamp_when_finished = true;
        action.play();

        action.advance(3.0, 2.0);
        assert_eq!(action.state(), ActionState::Finished);
        assert!(action.is_active());
        assert!((action.sample_time(2.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_ping_pong_mirrors_on_odd_repeats() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::PingPong(4);
        action.play();

        action.advance(2.5, 2.0);
        assert_eq!(action.loop_count(), 1);
        // Local time 0.5 mirrors to 1.5 on the odd repeat
        assert!((action.sample_time(2.0) - 1.5).abs() < 1e-6);

        action.advance(2.0, 2.0);
        assert_eq!(action.loop_count(), 2);
        assert!((action.sample_time(2.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fade_in_ramps_weight() {
        let mut action = AnimationAction::new(0);
        action.play();
        action.fade_in(1.0);

        action.advance(0.25, 10.0);
        assert!((action.effective_weight() - 0.25).abs() < 1e-5);

        action.advance(1.0, 10.0);
        assert!((action.effective_weight() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_multiple_boundaries_in_one_update() {
        let mut action = AnimationAction::new(0);
        action.loop_mode = LoopMode::Repeat(10);
        action.play();

        let events = action.advance(5.0, 1.0);
        assert_eq!(events, vec![BoundaryEvent::Loop(5)]);
        assert_eq!(action.loop_count(), 5);
    }
}
