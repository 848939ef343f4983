//! Animation blending mixer
//!
//! The mixer owns clips and their scheduled actions, advances every active
//! action per update, evaluates each track's interpolant, and accumulates
//! the results into per-property blend buffers. Buffers are written back to
//! the bound nodes exactly once per update: multiple actions targeting the
//! same property combine by weighted normal blending, or accumulate on top
//! additively when the action is flagged additive.

use std::collections::HashMap;

use slotmap::SlotMap;

use super::action::{ActionState, AnimationAction, BoundaryEvent};
use super::binding::{BoundProperty, PropertyBinding};
use super::clip::AnimationClip;
use super::track::{slerp, TrackSample};
use crate::foundation::math::{Quat, Vec3};
use crate::scene::Scene;

slotmap::new_key_type! {
    /// Non-owning handle to an action scheduled on a mixer
    pub struct ActionKey;
}

/// Events queued during updates and drained by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEvent {
    /// An action crossed one or more loop boundaries
    Loop {
        /// Action that looped
        action: ActionKey,
        /// Boundaries crossed during the update
        loop_delta: u32,
    },
    /// A non-repeating action ran to completion
    Finished {
        /// Action that finished
        action: ActionKey,
    },
}

#[derive(Debug, Clone, Copy)]
enum Accumulator {
    Scalar {
        sum: f32,
        weight: f32,
        additive: f32,
    },
    Vector {
        sum: Vec3,
        weight: f32,
        additive: Vec3,
    },
    Quaternion {
        value: Quat,
        weight: f32,
        additive: Quat,
    },
}

/// Evaluates and blends scheduled clips onto scene nodes
#[derive(Debug)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: SlotMap<ActionKey, AnimationAction>,
    bindings: HashMap<(usize, usize), Option<PropertyBinding>>,
    time: f32,
    /// Global playback speed multiplier
    pub time_scale: f32,
    events: Vec<AnimationEvent>,
}

impl Default for AnimationMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationMixer {
    /// Create an empty mixer
    pub fn new() -> Self {
        Self {
            clips: Vec::new(),
            actions: SlotMap::with_key(),
            bindings: HashMap::new(),
            time: 0.0,
            time_scale: 1.0,
            events: Vec::new(),
        }
    }

    /// Accumulated mixer time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Schedule a clip, returning the handle of its new action
    pub fn clip_action(&mut self, clip: AnimationClip) -> ActionKey {
        let clip_index = self.clips.len();
        self.clips.push(clip);
        self.actions.insert(AnimationAction::new(clip_index))
    }

    /// Borrow an action
    pub fn action(&self, key: ActionKey) -> Option<&AnimationAction> {
        self.actions.get(key)
    }

    /// Borrow an action for mutation
    pub fn action_mut(&mut self, key: ActionKey) -> Option<&mut AnimationAction> {
        self.actions.get_mut(key)
    }

    /// Start an action from the beginning
    pub fn play(&mut self, key: ActionKey) {
        match self.actions.get_mut(key) {
            Some(action) => action.play(),
            None => log::warn!("play: dead action handle, ignoring"),
        }
    }

    /// Stop an action and rewind it
    pub fn stop(&mut self, key: ActionKey) {
        match self.actions.get_mut(key) {
            Some(action) => action.stop(),
            None => log::warn!("stop: dead action handle, ignoring"),
        }
    }

    /// Play an action while fading its weight in
    pub fn fade_in(&mut self, key: ActionKey, duration: f32) {
        if let Some(action) = self.actions.get_mut(key) {
            action.play();
            action.fade_in(duration);
        }
    }

    /// Fade an action's weight out over a duration
    pub fn fade_out(&mut self, key: ActionKey, duration: f32) {
        if let Some(action) = self.actions.get_mut(key) {
            action.fade_out(duration);
        }
    }

    /// Cross-fade: fade `from` out and `to` in over the same window
    pub fn cross_fade_to(&mut self, from: ActionKey, to: ActionKey, duration: f32) {
        self.fade_out(from, duration);
        self.fade_in(to, duration);
    }

    /// Take all events queued since the last call
    pub fn take_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advance all active actions and write blended results to the scene
    pub fn update(&mut self, scene: &mut Scene, dt: f32) {
        let dt = dt * self.time_scale;
        self.time += dt;

        let keys: Vec<ActionKey> = self.actions.keys().collect();
        for key in &keys {
            let action = &mut self.actions[*key];
            let duration = self.clips[action.clip].duration;
            for event in action.advance(dt, duration) {
                self.events.push(match event {
                    BoundaryEvent::Loop(loop_delta) => AnimationEvent::Loop {
                        action: *key,
                        loop_delta,
                    },
                    BoundaryEvent::Finished => AnimationEvent::Finished { action: *key },
                });
            }
        }

        let mut accumulators: HashMap<PropertyBinding, Accumulator> = HashMap::new();
        for key in &keys {
            let action = &self.actions[*key];
            if !action.is_active() {
                continue;
            }
            let weight = action.effective_weight();
            if weight <= 0.0 {
                continue;
            }
            let clip_index = action.clip;
            let duration = self.clips[clip_index].duration;
            let sample_time = action.sample_time(duration);
            let additive = action.additive;

            for track_index in 0..self.clips[clip_index].tracks.len() {
                let binding = *self
                    .bindings
                    .entry((clip_index, track_index))
                    .or_insert_with(|| {
                        PropertyBinding::resolve(
                            scene,
                            &self.clips[clip_index].tracks[track_index].path,
                        )
                    });
                let Some(binding) = binding else {
                    continue;
                };
                let sample = self.clips[clip_index].tracks[track_index].sample(sample_time);
                accumulate(&mut accumulators, binding, sample, weight, additive);
            }
        }

        write_back(scene, accumulators);
    }

    /// Seek the whole mixer to an absolute time
    ///
    /// Deterministic: the resulting bound properties are independent of any
    /// `update` path previously taken. Active actions rewind (clearing
    /// scheduled fades) and replay to `t` in one step.
    pub fn set_time(&mut self, scene: &mut Scene, t: f32) {
        self.time = 0.0;
        let keys: Vec<ActionKey> = self.actions.keys().collect();
        for key in keys {
            let action = &mut self.actions[key];
            if action.state() != ActionState::Stopped {
                action.stop();
                action.play();
            }
        }
        self.update(scene, t);
        // Seeking is not playback; boundary events from the replay are noise
        self.events.clear();
    }
}

fn accumulate(
    accumulators: &mut HashMap<PropertyBinding, Accumulator>,
    binding: PropertyBinding,
    sample: TrackSample,
    weight: f32,
    additive: bool,
) {
    let entry = accumulators
        .entry(binding)
        .or_insert_with(|| match sample {
            TrackSample::Scalar(_) => Accumulator::Scalar {
                sum: 0.0,
                weight: 0.0,
                additive: 0.0,
            },
            TrackSample::Vector(_) => Accumulator::Vector {
                sum: Vec3::zeros(),
                weight: 0.0,
                additive: Vec3::zeros(),
            },
            TrackSample::Quaternion(_) => Accumulator::Quaternion {
                value: Quat::identity(),
                weight: 0.0,
                additive: Quat::identity(),
            },
        });

    match (entry, sample) {
        (
            Accumulator::Scalar { sum, weight: w, additive: add },
            TrackSample::Scalar(value),
        ) => {
            if additive {
                *add += value * weight;
            } else {
                *sum += value * weight;
                *w += weight;
            }
        }
        (
            Accumulator::Vector { sum, weight: w, additive: add },
            TrackSample::Vector(value),
        ) => {
            if additive {
                *add += value * weight;
            } else {
                *sum += value * weight;
                *w += weight;
            }
        }
        (
            Accumulator::Quaternion { value: acc, weight: w, additive: add },
            TrackSample::Quaternion(value),
        ) => {
            if additive {
                *add = *add * slerp(&Quat::identity(), &value, weight);
            } else if *w <= 0.0 {
                *acc = value;
                *w = weight;
            } else {
                // Progressive spherical accumulation keeps the result unit
                *acc = slerp(acc, &value, weight / (*w + weight));
                *w += weight;
            }
        }
        _ => {
            log::warn!("track sample type does not match its bound property, skipping");
        }
    }
}

fn write_back(scene: &mut Scene, accumulators: HashMap<PropertyBinding, Accumulator>) {
    for (binding, accumulator) in accumulators {
        let Some(node) = scene.node_mut(binding.node) else {
            continue;
        };
        match (binding.property, accumulator) {
            (BoundProperty::Position, Accumulator::Vector { sum, weight, additive }) => {
                let base = if weight > 0.0 {
                    sum / weight
                } else {
                    node.transform().position
                };
                node.set_position(base + additive);
            }
            (BoundProperty::Scale, Accumulator::Vector { sum, weight, additive }) => {
                let base = if weight > 0.0 {
                    sum / weight
                } else {
                    node.transform().scale
                };
                node.set_scale(base + additive);
            }
            (BoundProperty::Rotation, Accumulator::Quaternion { value, weight, additive }) => {
                let base = if weight > 0.0 {
                    value
                } else {
                    node.transform().rotation
                };
                node.set_rotation(base * additive);
            }
            (
                BoundProperty::MorphInfluence(index),
                Accumulator::Scalar { sum, weight, additive },
            ) => {
                let Some(renderable) = node.kind.renderable_mut() else {
                    continue;
                };
                if renderable.morph_influences.len() <= index {
                    renderable.morph_influences.resize(index + 1, 0.0);
                }
                let base = if weight > 0.0 {
                    sum / weight
                } else {
                    renderable.morph_influences[index]
                };
                renderable.morph_influences[index] = base + additive;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::track::{Interpolation, KeyframeTrack, TrackValues};
    use crate::animation::LoopMode;
    use approx::assert_relative_eq;

    fn position_clip(node: &str, duration: f32, from: Vec3, to: Vec3) -> AnimationClip {
        AnimationClip::from_tracks(
            "move",
            vec![KeyframeTrack::new(
                format!("{node}.position"),
                vec![0.0, duration],
                TrackValues::Vector(vec![from, to]),
                Interpolation::Linear,
            )
            .unwrap()],
        )
    }

    fn scene_with(name: &str) -> Scene {
        let mut scene = Scene::new();
        let node = scene.add_group(name);
        scene.add_child(scene.root(), node);
        scene
    }

    #[test]
    fn test_repeat_scenario_loop_count_and_local_time() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let clip = position_clip("n", 2.0, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        let action = mixer.clip_action(clip);
        mixer.action_mut(action).unwrap().loop_mode = LoopMode::Repeat(2);
        mixer.play(action);

        mixer.update(&mut scene, 2.5);

        let action_ref = mixer.action(action).unwrap();
        assert_eq!(action_ref.loop_count(), 1);
        assert_relative_eq!(action_ref.time(), 0.5, epsilon = 1e-6);
        assert_eq!(
            mixer.take_events(),
            vec![AnimationEvent::Loop {
                action,
                loop_delta: 1
            }]
        );
    }

    #[test]
    fn test_track_writes_bound_position() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let action =
            mixer.clip_action(position_clip("n", 2.0, Vec3::zeros(), Vec3::new(2.0, 0.0, 0.0)));
        mixer.play(action);

        mixer.update(&mut scene, 1.0);

        let node = scene.get_object_by_name("n").unwrap();
        assert_relative_eq!(
            scene.node(node).unwrap().transform().position,
            Vec3::new(1.0, 0.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_two_actions_blend_by_weight() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let hold_zero =
            mixer.clip_action(position_clip("n", 10.0, Vec3::zeros(), Vec3::zeros()));
        let hold_two = mixer.clip_action(position_clip(
            "n",
            10.0,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ));
        mixer.play(hold_zero);
        mixer.play(hold_two);
        mixer.action_mut(hold_zero).unwrap().set_weight(3.0);
        mixer.action_mut(hold_two).unwrap().set_weight(1.0);

        mixer.update(&mut scene, 0.1);

        let node = scene.get_object_by_name("n").unwrap();
        // Weighted average: (3*0 + 1*2) / 4
        assert_relative_eq!(
            scene.node(node).unwrap().transform().position.x,
            0.5,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_additive_action_accumulates_on_top() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let base = mixer.clip_action(position_clip(
            "n",
            10.0,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ));
        let offset = mixer.clip_action(position_clip(
            "n",
            10.0,
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        ));
        mixer.action_mut(offset).unwrap().additive = true;
        mixer.play(base);
        mixer.play(offset);

        mixer.update(&mut scene, 0.1);

        let node = scene.get_object_by_name("n").unwrap();
        let position = scene.node(node).unwrap().transform().position;
        assert_relative_eq!(position, Vec3::new(1.0, 0.5, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_set_time_matches_incremental_updates() {
        let target = 1.3_f32;

        let mut scene_a = scene_with("n");
        let mut mixer_a = AnimationMixer::new();
        let action_a =
            mixer_a.clip_action(position_clip("n", 2.0, Vec3::zeros(), Vec3::new(4.0, 0.0, 0.0)));
        mixer_a.action_mut(action_a).unwrap().loop_mode = LoopMode::Repeat(4);
        mixer_a.play(action_a);
        for _ in 0..13 {
            mixer_a.update(&mut scene_a, target / 13.0);
        }

        let mut scene_b = scene_with("n");
        let mut mixer_b = AnimationMixer::new();
        let action_b =
            mixer_b.clip_action(position_clip("n", 2.0, Vec3::zeros(), Vec3::new(4.0, 0.0, 0.0)));
        mixer_b.action_mut(action_b).unwrap().loop_mode = LoopMode::Repeat(4);
        mixer_b.play(action_b);
        mixer_b.set_time(&mut scene_b, target);

        let node_a = scene_a.get_object_by_name("n").unwrap();
        let node_b = scene_b.get_object_by_name("n").unwrap();
        assert_relative_eq!(
            scene_a.node(node_a).unwrap().transform().position,
            scene_b.node(node_b).unwrap().transform().position,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_finished_event_and_cross_fade() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let first =
            mixer.clip_action(position_clip("n", 1.0, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)));
        let second =
            mixer.clip_action(position_clip("n", 1.0, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)));
        mixer.action_mut(first).unwrap().loop_mode = LoopMode::Once;
        mixer.play(first);

        mixer.cross_fade_to(first, second, 0.5);
        mixer.update(&mut scene, 2.0);

        let events = mixer.take_events();
        assert!(events.contains(&AnimationEvent::Finished { action: first }));
        // The faded-in action carries full weight after the window
        assert_relative_eq!(
            mixer.action(second).unwrap().effective_weight(),
            1.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_rotation_track_slerps_onto_node() {
        let mut scene = scene_with("n");
        let mut mixer = AnimationMixer::new();
        let clip = AnimationClip::from_tracks(
            "spin",
            vec![KeyframeTrack::new(
                "n.rotation",
                vec![0.0, 2.0],
                TrackValues::Quaternion(vec![
                    Quat::identity(),
                    Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::PI),
                ]),
                Interpolation::Linear,
            )
            .unwrap()],
        );
        let action = mixer.clip_action(clip);
        mixer.play(action);

        mixer.update(&mut scene, 1.0);

        let node = scene.get_object_by_name("n").unwrap();
        let rotation = scene.node(node).unwrap().transform().rotation;
        let expected = Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(rotation.angle_to(&expected), 0.0, epsilon = 1e-5);
    }
}
