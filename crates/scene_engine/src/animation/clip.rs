//! Animation clips

use super::track::KeyframeTrack;

/// A named set of keyframe tracks evaluated together
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    /// Clip name, used for lookups and diagnostics
    pub name: String,
    /// Clip duration in seconds
    pub duration: f32,
    /// Tracks evaluated by this clip
    pub tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    /// Create a clip with an explicit duration
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<KeyframeTrack>) -> Self {
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Create a clip whose duration is the latest key time of its tracks
    pub fn from_tracks(name: impl Into<String>, tracks: Vec<KeyframeTrack>) -> Self {
        let duration = tracks
            .iter()
            .map(KeyframeTrack::end_time)
            .fold(0.0, f32::max);
        Self::new(name, duration, tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::track::{Interpolation, TrackValues};

    #[test]
    fn test_duration_from_tracks() {
        let tracks = vec![
            KeyframeTrack::new(
                "a.morph[0]",
                vec![0.0, 1.5],
                TrackValues::Scalar(vec![0.0, 1.0]),
                Interpolation::Linear,
            )
            .unwrap(),
            KeyframeTrack::new(
                "a.morph[1]",
                vec![0.0, 3.0],
                TrackValues::Scalar(vec![0.0, 1.0]),
                Interpolation::Linear,
            )
            .unwrap(),
        ];
        let clip = AnimationClip::from_tracks("blink", tracks);
        assert!((clip.duration - 3.0).abs() < f32::EPSILON);
    }
}
